//! Index construction: harvested records → chunks → embeddings → store.
//!
//! [`build_index`] always starts from an empty store. [`ensure_index`] decides
//! whether an existing index can be reused:
//!
//! | Situation | Action |
//! |-----------|--------|
//! | `--reindex` given | rebuild |
//! | store has no documents | rebuild |
//! | stored model ≠ configured model | rebuild |
//! | stored dataset ≠ selected dataset | rebuild |
//! | dataset contents changed since the build | rebuild |
//! | otherwise | reuse |

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::harvest::find_latest_output;
use crate::models::{Chunk, DocumentRecord};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::records::load_records;
use crate::store::{VectorStore, META_DATASET, META_DATASET_SHA256, META_MODEL};

/// Counts from one index build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub documents: u64,
    pub chunks: u64,
    pub vectors: u64,
}

/// Result of [`ensure_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Reused,
    Rebuilt(IndexSummary),
}

/// Pick the dataset to index: explicit `input`, then `chat.dataset`, then
/// the newest harvest output in `harvest.output_dir`.
pub fn resolve_dataset(config: &Config, input: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = input.or(config.chat.dataset.as_deref()) {
        if !path.exists() {
            bail!("Dataset not found: {}", path.display());
        }
        return Ok(path.to_path_buf());
    }

    find_latest_output(&config.harvest.output_dir, &config.harvest.language)?.ok_or_else(|| {
        anyhow::anyhow!(
            "No harvested dataset in {}. Run `docchat harvest` or pass --input.",
            config.harvest.output_dir.display()
        )
    })
}

/// Hex SHA-256 of the file at `path`.
pub fn dataset_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open dataset: {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Clear the store and index `records` from scratch.
pub async fn build_index(
    config: &Config,
    store: &VectorStore,
    embedder: &dyn Embedder,
    records: &[DocumentRecord],
    dataset: &Path,
    progress: &dyn ProgressReporter,
) -> Result<IndexSummary> {
    let digest = dataset_digest(dataset)?;
    store.clear().await?;

    let mut summary = IndexSummary::default();
    let mut pending: Vec<Chunk> = Vec::new();

    for record in records {
        let document_id = Uuid::new_v4().to_string();
        store.insert_document(&document_id, record).await?;
        let chunks = chunk_text(
            &document_id,
            &record.body,
            config.chunking.max_tokens,
            config.chunking.overlap_tokens,
        );
        store.insert_chunks(&chunks).await?;
        summary.documents += 1;
        summary.chunks += chunks.len() as u64;
        pending.extend(chunks.into_iter().filter(|c| !c.text.is_empty()));
    }

    let total = pending.len() as u64;
    let model = embedder.model_name().to_string();
    for batch in pending.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .context("Embedding batch failed")?;
        for (chunk, vector) in batch.iter().zip(vectors.iter()) {
            store.upsert_vector(chunk, &model, vector).await?;
            summary.vectors += 1;
        }
        progress.report(ProgressEvent::Embedding {
            n: summary.vectors,
            total,
        });
    }

    store
        .meta_set(META_DATASET, &dataset.display().to_string())
        .await?;
    store.meta_set(META_DATASET_SHA256, &digest).await?;
    store.meta_set(META_MODEL, &model).await?;

    tracing::info!(
        documents = summary.documents,
        chunks = summary.chunks,
        vectors = summary.vectors,
        "index built"
    );
    Ok(summary)
}

/// Reuse the existing index when it was built by the embedder's model from
/// `dataset` with its current contents, otherwise rebuild it.
pub async fn ensure_index(
    config: &Config,
    store: &VectorStore,
    embedder: &dyn Embedder,
    dataset: &Path,
    reindex: bool,
    progress: &dyn ProgressReporter,
) -> Result<IndexOutcome> {
    if !reindex && index_is_current(store, embedder, dataset).await? {
        tracing::debug!(dataset = %dataset.display(), "reusing existing index");
        return Ok(IndexOutcome::Reused);
    }

    let records = load_records(dataset)?;
    let summary = build_index(config, store, embedder, &records, dataset, progress).await?;
    Ok(IndexOutcome::Rebuilt(summary))
}

async fn index_is_current(
    store: &VectorStore,
    embedder: &dyn Embedder,
    dataset: &Path,
) -> Result<bool> {
    if store.document_count().await? == 0 {
        return Ok(false);
    }
    let model = store.meta_get(META_MODEL).await?;
    let indexed = store.meta_get(META_DATASET).await?;
    if model.as_deref() != Some(embedder.model_name())
        || indexed.as_deref() != Some(dataset.display().to_string().as_str())
    {
        return Ok(false);
    }
    let digest = store.meta_get(META_DATASET_SHA256).await?;
    Ok(digest.as_deref() == Some(dataset_digest(dataset)?.as_str()))
}

/// Open the store and embedder and make sure the index is ready to query.
pub async fn prepare_index(
    config: &Config,
    input: Option<&Path>,
    reindex: bool,
    progress: &dyn ProgressReporter,
) -> Result<(VectorStore, Box<dyn Embedder>)> {
    let dataset = resolve_dataset(config, input)?;
    let embedder = create_embedder(&config.embedding)?;
    let store = VectorStore::open(config).await?;
    ensure_index(config, &store, embedder.as_ref(), &dataset, reindex, progress).await?;
    Ok((store, embedder))
}

/// CLI entry point for `docchat index`.
pub async fn run_index_cmd(
    config: &Config,
    input: Option<PathBuf>,
    reindex: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let dataset = resolve_dataset(config, input.as_deref())?;
    let embedder = create_embedder(&config.embedding)?;
    let store = VectorStore::open(config).await?;

    let outcome =
        ensure_index(config, &store, embedder.as_ref(), &dataset, reindex, progress).await?;

    println!("index");
    println!("  dataset: {}", dataset.display());
    println!("  model: {}", embedder.model_name());
    match outcome {
        IndexOutcome::Reused => {
            println!("  documents: {}", store.document_count().await?);
            println!("  chunks: {}", store.chunk_count().await?);
            println!("  up to date (use --reindex to rebuild)");
        }
        IndexOutcome::Rebuilt(summary) => {
            println!("  documents: {}", summary.documents);
            println!("  chunks: {}", summary.chunks);
            println!("  embedded: {}", summary.vectors);
        }
    }
    println!("ok");

    store.close().await;
    Ok(())
}
