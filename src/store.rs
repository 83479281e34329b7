//! SQLite-backed vector store.
//!
//! # Schema
//!
//! | Table | Contents |
//! |-------|----------|
//! | `documents` | one row per harvested record (title, owner, repo, body) |
//! | `chunks` | record bodies split by [`chunk_text`](crate::chunk::chunk_text) |
//! | `chunk_vectors` | one embedding per chunk, little-endian `f32` BLOB |
//! | `index_meta` | key/value facts about the last build (dataset, model) |
//!
//! The database runs in WAL mode. Similarity search is brute force: vectors
//! are loaded with [`VectorStore::all_vectors`] and scored in Rust by
//! [`retrieve::top_k`](crate::retrieve::top_k).

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use crate::config::Config;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Chunk, DocumentRecord};

/// Metadata key holding the dataset the index was built from.
pub const META_DATASET: &str = "dataset";
/// Metadata key holding the SHA-256 of the dataset file's contents.
pub const META_DATASET_SHA256: &str = "dataset_sha256";
/// Metadata key holding the embedding model name.
pub const META_MODEL: &str = "embedding_model";

/// A stored chunk vector joined with its text and record metadata.
#[derive(Debug, Clone)]
pub struct StoredVector {
    pub chunk_id: String,
    pub title: String,
    pub owner: String,
    pub repo: String,
    pub text: String,
    pub dims: usize,
    pub embedding: Vec<f32>,
}

pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Open (creating if missing) the database at `db.path` and apply the
    /// schema.
    pub async fn open(config: &Config) -> Result<Self> {
        let db_path = &config.db.path;
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                owner TEXT NOT NULL,
                repo TEXT NOT NULL,
                body TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                UNIQUE(document_id, chunk_index),
                FOREIGN KEY (document_id) REFERENCES documents(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                content_hash TEXT NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Remove every document, chunk, vector and metadata row.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["chunk_vectors", "chunks", "documents", "index_meta"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_document(&self, id: &str, record: &DocumentRecord) -> Result<()> {
        sqlx::query("INSERT INTO documents (id, title, owner, repo, body) VALUES (?, ?, ?, ?, ?)")
            .bind(id)
            .bind(&record.title)
            .bind(&record.source.owner)
            .bind(&record.source.repo)
            .bind(&record.body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert all chunks of one document in a single transaction.
    pub async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_vector(&self, chunk: &Chunk, model: &str, vector: &[f32]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, embedding, content_hash)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding,
                content_hash = excluded.content_hash
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .bind(&chunk.hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every stored vector with its chunk text and record metadata.
    pub async fn all_vectors(&self) -> Result<Vec<StoredVector>> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.dims, cv.embedding, c.text, d.title, d.owner, d.repo
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = cv.document_id
            ORDER BY cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let dims: i64 = row.get("dims");
                StoredVector {
                    chunk_id: row.get("chunk_id"),
                    title: row.get("title"),
                    owner: row.get("owner"),
                    repo: row.get("repo"),
                    text: row.get("text"),
                    dims: dims as usize,
                    embedding: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    pub async fn document_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn chunk_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn vector_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn meta_get(&self, key: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
