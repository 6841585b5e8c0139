//! Nearest-neighbor retrieval over the active document.
//!
//! Prefers the in-memory session index. When the process has restarted, the
//! index is reconstructed from the persisted flat files: the serialized
//! vector store if it is intact, otherwise by re-embedding the page records,
//! otherwise the legacy single-document text. A malformed page-aware file
//! silently falls back to the legacy path.
//!
//! The two named error messages below are matched by substring at the HTTP
//! boundary, so they must propagate verbatim; any other reload failure
//! collapses into [`VECTOR_STORE_NOT_FOUND`].

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, RetrievalConfig};
use crate::embedding;
use crate::index::{IndexEntry, VectorIndex};
use crate::session::SessionState;
use crate::store;

/// Matched by the HTTP layer to produce a 404.
pub const VECTOR_STORE_NOT_FOUND: &str = "Vector store not found. Please upload a PDF first.";

/// Persisted files exist but hold no usable text.
pub const INVALID_PERSISTED_STATE: &str =
    "Persisted document is empty or invalid. Please upload the PDF again.";

/// One scored retrieval hit. Derived, read-only, produced fresh per query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// Bounded-length preview of the matching text.
    pub content: String,
    /// Relevance in `[0, 1]`, descending across the result list.
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// Runs a nearest-neighbor lookup for `query`, reloading the index from disk
/// if the session has none.
pub async fn retrieve(
    config: &Config,
    session: &SessionState,
    query: &str,
) -> Result<Vec<RetrievalResult>> {
    let index = match session.index() {
        Some(index) => index,
        None => {
            let index = Arc::new(reload_index(config).await?);
            session.set_index(index.clone());
            index
        }
    };

    // An empty index can only produce an empty result; skip the embedding
    // call so the no-results turn never touches the network.
    if index.entries.is_empty() {
        return Ok(Vec::new());
    }

    let query_vec = embedding::embed_query(&config.embedding, query).await?;
    Ok(rank_entries(&query_vec, &index.entries, &config.retrieval))
}

/// Scores, orders, and bounds the result list: cosine similarity clamped to
/// `[0, 1]`, descending order, at most `top_k` results, snippets cut to
/// `snippet_chars`.
fn rank_entries(
    query_vec: &[f32],
    entries: &[IndexEntry],
    cfg: &RetrievalConfig,
) -> Vec<RetrievalResult> {
    let mut scored: Vec<(f32, &IndexEntry)> = entries
        .iter()
        .map(|entry| {
            let score = embedding::cosine_similarity(query_vec, &entry.embedding).max(0.0);
            (score, entry)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(cfg.top_k);

    scored
        .into_iter()
        .map(|(score, entry)| RetrievalResult {
            content: truncate_chars(&entry.text, cfg.snippet_chars),
            score,
            page: entry.metadata.page,
        })
        .collect()
}

/// Reconstructs the index from persisted files.
///
/// Order: intact serialized vector store → page records (re-embedded) →
/// legacy document text (re-embedded as one node). Unexpected failures
/// collapse into the not-found message; the two named messages propagate.
async fn reload_index(config: &Config) -> Result<VectorIndex> {
    match try_reload(config).await {
        Ok(index) => Ok(index),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains(VECTOR_STORE_NOT_FOUND) || msg.contains(INVALID_PERSISTED_STATE) {
                Err(e)
            } else {
                tracing::warn!("index reload failed: {:#}", e);
                bail!(VECTOR_STORE_NOT_FOUND)
            }
        }
    }
}

async fn try_reload(config: &Config) -> Result<VectorIndex> {
    let data_dir = &config.storage.data_dir;

    // Fast path: the serialized store, embeddings included.
    match store::load_index(data_dir) {
        Ok(Some(index)) if !index.entries.is_empty() => {
            tracing::info!(entries = index.entries.len(), "reloaded vector store");
            return Ok(index);
        }
        Ok(_) => {}
        Err(e) => tracing::debug!("unusable vector store file: {:#}", e),
    }

    // Page-aware format. A malformed file must not abort retrieval.
    match store::load_pages(data_dir) {
        Ok(Some(pages)) => {
            let nodes: Vec<(String, Option<u32>)> = pages
                .into_iter()
                .filter(|p| !p.text.trim().is_empty())
                .map(|p| (p.text, Some(p.page)))
                .collect();
            if !nodes.is_empty() {
                tracing::info!(pages = nodes.len(), "rebuilding index from page records");
                return VectorIndex::build(config, store::PAGES_FILE, nodes).await;
            }
        }
        Ok(None) => {}
        Err(e) => tracing::debug!("unusable page records, trying legacy format: {:#}", e),
    }

    // Legacy single-document format.
    match store::load_document(data_dir)? {
        Some(text) => {
            if text.trim().is_empty() {
                bail!(INVALID_PERSISTED_STATE);
            }
            tracing::info!("rebuilding index from legacy document text");
            VectorIndex::build(config, store::DOCUMENT_FILE, vec![(text, None)]).await
        }
        None => bail!(VECTOR_STORE_NOT_FOUND),
    }
}

/// The first `max_chars` characters of `text` (char-boundary safe).
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
