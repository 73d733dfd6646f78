use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use guideseek::embedder::{Embedder, EmbedderConfig, OpenAiEmbedder};
use guideseek::llm::{ChatCompletionsProvider, LlmProvider};
use guideseek::service::{GuideService, ServiceConfig, ServiceError, SourceKind};
use guideseek::store::{GuideStore, PostgresGuideStore};
use guideseek::GuideIndex;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "guideseek-api",
    about = "HTTP API answering game walkthrough questions over an embedded passage index"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "GUIDESEEK_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Vector document produced by guideseek-vectorize.
    #[arg(long, env = "GUIDESEEK_VECTORS", default_value = "guide_vectors.json")]
    vectors: PathBuf,

    /// Postgres connection string for persisting generated guides.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// API key for query embeddings.
    #[arg(long, env = "OPENAI_API_KEY")]
    embedding_api_key: Option<String>,

    /// Embedding model identifier.
    #[arg(
        long,
        env = "GUIDESEEK_EMBED_MODEL",
        default_value = "text-embedding-3-small"
    )]
    embedding_model: String,

    /// Optional embedding dimension override.
    #[arg(long, env = "GUIDESEEK_EMBED_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Base URL for OpenAI-compatible embedding endpoints.
    #[arg(
        long,
        env = "GUIDESEEK_EMBED_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    embedding_base_url: String,

    /// Seconds before embedding requests time out.
    #[arg(long, env = "GUIDESEEK_EMBED_TIMEOUT_SECS", default_value_t = 30)]
    embedding_timeout_secs: u64,

    /// Retry attempts for transient embedding errors.
    #[arg(long, env = "GUIDESEEK_EMBED_MAX_RETRIES", default_value_t = 5)]
    embedding_max_retries: usize,

    /// Max inputs per embedding request.
    #[arg(long, env = "GUIDESEEK_EMBED_BATCH", default_value_t = 32)]
    embedding_batch_size: usize,

    /// API key for the answering chat model.
    #[arg(long, env = "DEEPSEEK_API_KEY")]
    chat_api_key: Option<String>,

    /// Chat model used for answers and guide generation.
    #[arg(long, env = "GUIDESEEK_CHAT_MODEL", default_value = "deepseek-chat")]
    chat_model: String,

    /// Base URL for the OpenAI-compatible chat endpoint.
    #[arg(
        long,
        env = "GUIDESEEK_CHAT_BASE",
        default_value = "https://api.deepseek.com/v1"
    )]
    chat_base_url: String,

    /// Default top-k when the client does not override it.
    #[arg(long, default_value_t = 3)]
    default_top_k: usize,

    /// Maximum top-k allowed per request.
    #[arg(long, default_value_t = 12)]
    max_top_k: usize,

    /// Similarity a best match must reach for high-confidence answering.
    #[arg(long, default_value_t = 0.7)]
    similarity_threshold: f32,

    /// Similarity two game titles must reach to count as the same game.
    #[arg(long, default_value_t = 0.6)]
    title_match_threshold: f32,

    /// Max cached query embeddings kept in-memory (0 disables caching).
    #[arg(long, default_value_t = 1024)]
    embedding_cache_size: usize,

    /// Browser origins allowed by CORS, comma separated.
    #[arg(
        long,
        env = "GUIDESEEK_ALLOWED_ORIGINS",
        default_value = "http://localhost:3000,http://127.0.0.1:3000"
    )]
    allowed_origins: String,
}

#[derive(Clone)]
struct AppState {
    service: Arc<GuideService>,
    default_top_k: usize,
    max_top_k: usize,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
    relevant_chunks: Vec<String>,
    source: SourceKind,
    game_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    vectors_loaded: bool,
    chunks_count: usize,
}

#[derive(Debug, Serialize)]
struct RootResponse {
    message: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = ApiCli::parse();

    // Startup order matters: embedding model, then index, then store.
    let embedder: Option<Arc<dyn Embedder>> = match &cli.embedding_api_key {
        Some(key) => {
            let embedder = OpenAiEmbedder::new(EmbedderConfig {
                api_key: key.clone(),
                base_url: cli.embedding_base_url.clone(),
                model: cli.embedding_model.clone(),
                dimensions: cli.embedding_dimensions,
                timeout: Duration::from_secs(cli.embedding_timeout_secs.max(1)),
                max_retries: cli.embedding_max_retries.max(1),
                batch_size: cli.embedding_batch_size.max(1),
            })?;
            Some(Arc::new(embedder))
        }
        None => {
            tracing::warn!("no embeddings API key configured; questions cannot be answered");
            None
        }
    };

    let index = match GuideIndex::load(&cli.vectors) {
        Ok(index) => Some(index),
        Err(err) => {
            tracing::warn!(%err, "passage index unavailable; questions will be rejected");
            None
        }
    };

    let store: Option<Arc<dyn GuideStore>> = match &cli.database_url {
        Some(url) => match PostgresGuideStore::connect(url).await {
            Ok(store) => {
                tracing::info!("guide store connected");
                Some(Arc::new(store))
            }
            Err(err) => {
                tracing::warn!(%err, "guide store unavailable; generated guides will not be persisted");
                None
            }
        },
        None => {
            tracing::warn!("no DATABASE_URL configured; generated guides will not be persisted");
            None
        }
    };

    let llm: Option<Arc<dyn LlmProvider>> = match &cli.chat_api_key {
        Some(key) => Some(Arc::new(ChatCompletionsProvider::new(
            key.clone(),
            cli.chat_base_url.clone(),
            cli.chat_model.clone(),
        )?)),
        None => {
            tracing::warn!("no chat API key configured; canned answers will be substituted");
            None
        }
    };

    let service = Arc::new(GuideService::new(
        embedder,
        llm,
        index,
        store,
        ServiceConfig {
            similarity_threshold: cli.similarity_threshold,
            title_match_threshold: cli.title_match_threshold,
            embedding_cache_size: cli.embedding_cache_size,
        },
    ));
    let state = AppState {
        service,
        default_top_k: cli.default_top_k.max(1),
        max_top_k: cli.max_top_k.max(1),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ask", post(ask))
        .layer(cors_layer(&cli.allowed_origins)?)
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    tracing::info!(%addr, "guideseek api listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server shutdown")?;
    Ok(())
}

fn cors_layer(origins: &str) -> Result<CorsLayer> {
    let parsed = origins
        .split(',')
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]))
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "游戏攻略问答 API",
        status: "running",
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.service.status();
    Json(HealthResponse {
        status: "healthy",
        model_loaded: status.model_ready,
        vectors_loaded: status.index_ready,
        chunks_count: status.passage_count,
    })
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<ErrorBody>)> {
    if request.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let top_k = request
        .top_k
        .unwrap_or(state.default_top_k)
        .clamp(1, state.max_top_k);
    match state.service.answer(&request.question, top_k).await {
        Ok(answer) => Ok(Json(AskResponse {
            answer: answer.answer,
            relevant_chunks: answer.passages,
            source: answer.source,
            game_name: answer.game_title,
        })),
        Err(err @ (ServiceError::IndexNotLoaded | ServiceError::ModelNotLoaded)) => {
            Err(service_unavailable(err))
        }
        Err(err) => Err(internal_error(err)),
    }
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            detail: message.into(),
        }),
    )
}

fn service_unavailable(err: ServiceError) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorBody {
            detail: err.to_string(),
        }),
    )
}

fn internal_error(err: ServiceError) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            detail: err.to_string(),
        }),
    )
}
