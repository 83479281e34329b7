//! Core data models shared by the harvester and the retriever.
//!
//! [`DocumentRecord`] is the interchange format between the two stages and is
//! serialized one-per-line into the harvested JSONL file. The remaining types
//! only live inside the retriever.

use serde::{Deserialize, Serialize};

use crate::config::RepoDescriptor;

/// Repository a record was harvested from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSource {
    pub owner: String,
    pub repo: String,
}

impl From<&RepoDescriptor> for RecordSource {
    fn from(descriptor: &RepoDescriptor) -> Self {
        Self {
            owner: descriptor.owner.clone(),
            repo: descriptor.repo.clone(),
        }
    }
}

/// One harvested documentation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// File name the record was built from, e.g. `installation.md`.
    pub title: String,
    pub body: String,
    pub source: RecordSource,
}

/// A chunk of a record body, the unit that gets embedded.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned by top-k retrieval, joined with its record metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub chunk_id: String,
    pub title: String,
    pub owner: String,
    pub repo: String,
    pub text: String,
    pub score: f32,
}
