use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use quizgen::budget::{TiktokenCounter, UnicodeSegmenter};
use quizgen::document::EpubParser;
use quizgen::fetch::HttpFetcher;
use quizgen::llm::OpenAiClient;
use quizgen::models::QuizRequest;
use quizgen::store::{ContentStore, SqliteStore};
use quizgen::{AppConfig, QuizService};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();

    let mut args = std::env::args().skip(1);
    let usage = "usage: quizgen <epub url or path> <href,href,...> [num questions]";
    let doc_ref = args.next().context(usage)?;
    let selected_hrefs: Vec<String> = args
        .next()
        .context(usage)?
        .split(',')
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(String::from)
        .collect();
    let num_questions = args
        .next()
        .map(|v| v.parse())
        .transpose()
        .context("number of questions must be an integer")?
        .unwrap_or(4);

    let store = Arc::new(SqliteStore::new(&config).await?);

    // A local file skips the origin fetch entirely: seed the cache with its
    // bytes so the pipeline finds them on first lookup.
    if Path::new(&doc_ref).is_file() {
        let bytes = tokio::fs::read(&doc_ref).await?;
        store.put_document(&doc_ref, &bytes).await?;
    }

    let service = QuizService::new(
        config.clone(),
        store,
        Arc::new(HttpFetcher::new()),
        Arc::new(EpubParser),
        Arc::new(OpenAiClient::new(&config)),
        Arc::new(TiktokenCounter::new()?),
        Arc::new(UnicodeSegmenter),
    );

    let quiz = service
        .generate_quiz(&QuizRequest {
            doc_ref,
            selected_hrefs,
            num_questions,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&quiz)?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
