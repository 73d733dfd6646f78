use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "guideseek-ask",
    about = "Ask the guideseek API a walkthrough question from the terminal"
)]
struct AskCli {
    /// Question to answer from the walkthrough index
    #[arg(long)]
    question: String,

    /// guideseek-api ask endpoint
    #[arg(
        long,
        env = "GUIDESEEK_API_URL",
        default_value = "http://127.0.0.1:8000/ask"
    )]
    api_url: String,

    /// Number of passages requested
    #[arg(long, default_value_t = 3)]
    top_k: usize,
}

fn main() -> Result<()> {
    let cli = AskCli::parse();
    let client = Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("failed to build HTTP client")?;
    let request = AskRequest {
        question: &cli.question,
        top_k: cli.top_k,
    };
    let resp = client
        .post(&cli.api_url)
        .json(&request)
        .send()
        .with_context(|| format!("failed to call guideseek api at {}", cli.api_url))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp
            .text()
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        bail!("guideseek api returned {}: {}", status, body);
    }
    let parsed: AskResponse = resp.json().context("failed to parse ask response")?;

    if let Some(game) = &parsed.game_name {
        println!("game: {game}");
    }
    println!("--- Answer ({}) ---", parsed.source);
    println!("{}", parsed.answer);
    if !parsed.relevant_chunks.is_empty() {
        println!("\n--- Passages ---");
        for (i, chunk) in parsed.relevant_chunks.iter().enumerate() {
            println!("[{}] {}\n", i + 1, chunk.trim());
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    answer: String,
    relevant_chunks: Vec<String>,
    source: String,
    game_name: Option<String>,
}
