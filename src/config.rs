use std::env;
use std::path::PathBuf;

use crate::models::SplitStrategy;

#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub model: String,
    pub api_base_url: String,
    pub api_key: String,
    pub options_per_question: usize,
    /// How often the generator retries on unparseable model output before
    /// giving up on the batch.
    pub max_invalid_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// Token ceiling for one unit of content handed to the model.
    pub token_budget: usize,
    pub split_strategy: SplitStrategy,
    /// Additional whole-request attempts after a failed quiz validation.
    pub max_validation_retries: u32,
    pub generation: GenerationConfig,
    pub fetch: FetchConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env::var("QUIZGEN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let split_strategy = match env::var("QUIZGEN_SPLIT_STRATEGY").as_deref() {
            Ok("batch") => SplitStrategy::Batch,
            _ => SplitStrategy::Sample,
        };

        Self {
            data_dir,
            token_budget: env::var("QUIZGEN_TOKEN_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(13_800),
            split_strategy,
            max_validation_retries: env::var("QUIZGEN_VALIDATION_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            generation: GenerationConfig {
                model: env::var("QUIZGEN_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                api_base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                options_per_question: env::var("QUIZGEN_OPTIONS_PER_QUESTION")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(4),
                max_invalid_attempts: env::var("QUIZGEN_GENERATION_RETRIES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
            },
            fetch: FetchConfig {
                max_attempts: env::var("QUIZGEN_FETCH_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
                backoff_base_ms: env::var("QUIZGEN_FETCH_BACKOFF_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(250),
            },
        }
    }

    pub fn sqlite_dsn(&self) -> String {
        format!(
            "sqlite://{}",
            self.data_dir.join("quizgen.sqlite3").display()
        )
    }
}
