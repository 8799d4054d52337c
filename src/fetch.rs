use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::FetchConfig;
use crate::error::QuizError;

/// Retrieves raw document bytes from their origin location.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, doc_ref: &str) -> Result<Vec<u8>>;
}

/// HTTP origin fetcher.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, doc_ref: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(doc_ref)
            .send()
            .await
            .context("failed to request document origin")?
            .error_for_status()
            .context("document origin returned non-success status")?;

        let bytes = response
            .bytes()
            .await
            .context("failed to read document body")?;

        Ok(bytes.to_vec())
    }
}

/// Bounded-retry wrapper around a fetcher.
///
/// Transient origin failures are retried with exponential backoff up to a
/// fixed attempt cap, then surface as [`QuizError::TransientFetch`] instead
/// of looping forever.
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
        }
    }

    pub async fn fetch_with_retry(
        &self,
        fetcher: &dyn DocumentFetcher,
        doc_ref: &str,
    ) -> Result<Vec<u8>, QuizError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let exponent = (attempt - 2).min(10);
                tokio::time::sleep(self.base_delay * 2u32.saturating_pow(exponent)).await;
            }

            match fetcher.fetch(doc_ref).await {
                Ok(bytes) => {
                    if attempt > 1 {
                        tracing::info!(doc_ref, attempt, "document fetched after retries");
                    }
                    return Ok(bytes);
                }
                Err(err) => {
                    tracing::warn!(doc_ref, attempt, error = %format!("{err:#}"), "document fetch failed");
                    last_error = format!("{err:#}");
                }
            }
        }

        Err(QuizError::TransientFetch {
            url: doc_ref.to_string(),
            attempts: self.max_attempts,
            reason: last_error,
        })
    }
}
