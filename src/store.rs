//! Persistence for generated guides, keyed by game title.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};

/// A freshly generated walkthrough awaiting persistence.
#[derive(Debug, Clone)]
pub struct GeneratedGuide {
    /// Game the guide was generated for.
    pub game_title: String,
    /// Markdown guide body.
    pub content: String,
    /// The question that triggered generation.
    pub source_question: String,
}

/// Upsert-by-title storage for generated guides.
#[async_trait]
pub trait GuideStore: Send + Sync {
    /// Looks up an existing guide for `title`.
    async fn find_by_title(&self, title: &str) -> Result<Option<GeneratedGuide>>;

    /// Inserts a new guide row.
    async fn insert(&self, guide: &GeneratedGuide) -> Result<()>;

    /// Replaces the guide stored under `title`.
    async fn update(&self, title: &str, guide: &GeneratedGuide) -> Result<()>;
}

/// Postgres-backed guide store using a single shared connection.
pub struct PostgresGuideStore {
    client: Client,
}

impl PostgresGuideStore {
    /// Connects to Postgres and ensures the guide table exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to Postgres at {database_url}"))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(%err, "postgres connection error");
            }
        });
        let store = Self { client };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<()> {
        self.client
            .execute(
                "CREATE TABLE IF NOT EXISTS game_guides (
                    game_name TEXT PRIMARY KEY,
                    guide_content TEXT NOT NULL,
                    question TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )",
                &[],
            )
            .await
            .context("failed to ensure game_guides table")?;
        Ok(())
    }
}

#[async_trait]
impl GuideStore for PostgresGuideStore {
    async fn find_by_title(&self, title: &str) -> Result<Option<GeneratedGuide>> {
        let row = self
            .client
            .query_opt(
                "SELECT game_name, guide_content, question FROM game_guides WHERE game_name = $1",
                &[&title],
            )
            .await
            .context("failed to query game_guides")?;
        Ok(row.map(|row| GeneratedGuide {
            game_title: row.get("game_name"),
            content: row.get("guide_content"),
            source_question: row.get("question"),
        }))
    }

    async fn insert(&self, guide: &GeneratedGuide) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO game_guides (game_name, guide_content, question) VALUES ($1, $2, $3)",
                &[&guide.game_title, &guide.content, &guide.source_question],
            )
            .await
            .context("failed to insert guide")?;
        Ok(())
    }

    async fn update(&self, title: &str, guide: &GeneratedGuide) -> Result<()> {
        self.client
            .execute(
                "UPDATE game_guides SET guide_content = $2, question = $3, updated_at = now() \
                 WHERE game_name = $1",
                &[&title, &guide.content, &guide.source_question],
            )
            .await
            .context("failed to update guide")?;
        Ok(())
    }
}
