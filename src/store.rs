use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::config::AppConfig;

/// Read-through cache of document bytes and extracted section text.
///
/// Values are pure functions of their key, so concurrent writers racing on
/// the same key may both compute and both write; the store only has to keep
/// each key consistent, not compute-once.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_document(&self, doc_ref: &str) -> Result<Option<Vec<u8>>>;
    async fn put_document(&self, doc_ref: &str, bytes: &[u8]) -> Result<()>;
    async fn get_section(&self, doc_ref: &str, href: &str) -> Result<Option<String>>;
    async fn put_section(&self, doc_ref: &str, href: &str, text: &str) -> Result<()>;
}

/// Process-local store, mainly for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    sections: RwLock<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_document(&self, doc_ref: &str) -> Result<Option<Vec<u8>>> {
        let documents = self
            .documents
            .read()
            .map_err(|_| anyhow!("document lock poisoned"))?;
        Ok(documents.get(doc_ref).cloned())
    }

    async fn put_document(&self, doc_ref: &str, bytes: &[u8]) -> Result<()> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| anyhow!("document lock poisoned"))?;
        documents.insert(doc_ref.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get_section(&self, doc_ref: &str, href: &str) -> Result<Option<String>> {
        let sections = self
            .sections
            .read()
            .map_err(|_| anyhow!("section lock poisoned"))?;
        Ok(sections
            .get(&(doc_ref.to_string(), href.to_string()))
            .cloned())
    }

    async fn put_section(&self, doc_ref: &str, href: &str, text: &str) -> Result<()> {
        let mut sections = self
            .sections
            .write()
            .map_err(|_| anyhow!("section lock poisoned"))?;
        sections.insert((doc_ref.to_string(), href.to_string()), text.to_string());
        Ok(())
    }
}

/// SQLite-backed store shared by every request of a process.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let options = SqliteConnectOptions::from_str(&config.sqlite_dsn())?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                doc_ref TEXT PRIMARY KEY,
                content BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sections (
                doc_ref TEXT NOT NULL,
                href TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (doc_ref, href)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn get_document(&self, doc_ref: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT content FROM documents WHERE doc_ref = ?")
            .bind(doc_ref)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<Vec<u8>, _>("content")))
    }

    async fn put_document(&self, doc_ref: &str, bytes: &[u8]) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO documents (doc_ref, content, created_at) VALUES (?, ?, ?)")
            .bind(doc_ref)
            .bind(bytes)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_section(&self, doc_ref: &str, href: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT content FROM sections WHERE doc_ref = ? AND href = ?")
            .bind(doc_ref)
            .bind(href)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<String, _>("content")))
    }

    async fn put_section(&self, doc_ref: &str, href: &str, text: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sections (doc_ref, href, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(doc_ref)
        .bind(href)
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchConfig, GenerationConfig};
    use crate::models::SplitStrategy;

    fn test_config(data_dir: std::path::PathBuf) -> AppConfig {
        AppConfig {
            data_dir,
            token_budget: 100,
            split_strategy: SplitStrategy::Sample,
            max_validation_retries: 3,
            generation: GenerationConfig {
                model: "test-model".to_string(),
                api_base_url: "http://localhost".to_string(),
                api_key: String::new(),
                options_per_question: 4,
                max_invalid_attempts: 3,
            },
            fetch: FetchConfig {
                max_attempts: 3,
                backoff_base_ms: 0,
            },
        }
    }

    #[tokio::test]
    async fn memory_store_round_trips_documents_and_sections() {
        let store = MemoryStore::new();

        assert!(store.get_document("book").await.unwrap().is_none());
        store.put_document("book", b"bytes").await.unwrap();
        assert_eq!(
            store.get_document("book").await.unwrap().as_deref(),
            Some(b"bytes".as_slice())
        );

        assert!(store.get_section("book", "ch01").await.unwrap().is_none());
        store.put_section("book", "ch01", "text").await.unwrap();
        assert_eq!(
            store.get_section("book", "ch01").await.unwrap().as_deref(),
            Some("text")
        );
    }

    #[tokio::test]
    async fn sqlite_store_round_trips_and_overwrites_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&test_config(dir.path().to_path_buf()))
            .await
            .unwrap();

        store.put_document("book", b"v1").await.unwrap();
        store.put_document("book", b"v1").await.unwrap();
        assert_eq!(
            store.get_document("book").await.unwrap().as_deref(),
            Some(b"v1".as_slice())
        );

        store.put_section("book", "ch01.xhtml#a", "alpha").await.unwrap();
        assert_eq!(
            store
                .get_section("book", "ch01.xhtml#a")
                .await
                .unwrap()
                .as_deref(),
            Some("alpha")
        );
        assert!(store.get_section("book", "ch02.xhtml").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn section_keys_distinguish_anchors() {
        let store = MemoryStore::new();
        store.put_section("book", "ch.xhtml", "whole").await.unwrap();
        store.put_section("book", "ch.xhtml#a", "part").await.unwrap();

        assert_eq!(
            store.get_section("book", "ch.xhtml").await.unwrap().as_deref(),
            Some("whole")
        );
        assert_eq!(
            store
                .get_section("book", "ch.xhtml#a")
                .await
                .unwrap()
                .as_deref(),
            Some("part")
        );
    }
}
