//! Top-k retrieval by cosine similarity.
//!
//! Scoring is brute force over every stored vector. Results are ordered by
//! descending similarity with ties broken by ascending chunk id, so the
//! same query against the same index always yields the same passages.

use anyhow::Result;
use std::cmp::Ordering;
use std::path::PathBuf;

use crate::config::Config;
use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::index::prepare_index;
use crate::models::RetrievedPassage;
use crate::progress::ProgressReporter;
use crate::store::{StoredVector, VectorStore};

/// Rank `candidates` against `query` and keep the best `k`.
///
/// Vectors whose dimensionality differs from the query are skipped, as are
/// rows whose recorded `dims` disagrees with the stored BLOB.
pub fn rank(query: &[f32], candidates: Vec<StoredVector>, k: usize) -> Vec<RetrievedPassage> {
    let mut scored: Vec<RetrievedPassage> = candidates
        .into_iter()
        .filter(|v| v.dims == query.len() && v.embedding.len() == v.dims)
        .map(|v| RetrievedPassage {
            score: cosine_similarity(query, &v.embedding),
            chunk_id: v.chunk_id,
            title: v.title,
            owner: v.owner,
            repo: v.repo,
            text: v.text,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    scored.truncate(k);
    scored
}

/// The `k` stored passages most similar to `query_vec`.
pub async fn top_k(
    store: &VectorStore,
    query_vec: &[f32],
    k: usize,
) -> Result<Vec<RetrievedPassage>> {
    let candidates = store.all_vectors().await?;
    Ok(rank(query_vec, candidates, k))
}

/// Embed `query` and return its `k` nearest passages.
pub async fn retrieve(
    store: &VectorStore,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<Vec<RetrievedPassage>> {
    let query_vec = embed_query(embedder, query).await?;
    top_k(store, &query_vec, k).await
}

/// CLI entry point for `docchat search`.
pub async fn run_search_cmd(
    config: &Config,
    query: &str,
    input: Option<PathBuf>,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let (store, embedder) = prepare_index(config, input.as_deref(), false, progress).await?;
    let k = limit.unwrap_or(config.retrieval.top_k);
    let passages = retrieve(&store, embedder.as_ref(), query, k).await?;

    if passages.is_empty() {
        println!("No results.");
    }
    for (i, passage) in passages.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({}/{})",
            i + 1,
            passage.score,
            passage.title,
            passage.owner,
            passage.repo
        );
        println!("    {}", snippet(&passage.text, 160));
    }

    store.close().await;
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().nth(max_chars).is_some() {
        out.push('…');
    }
    out
}
