//! Vector index construction (ingestion).
//!
//! Coordinates the upload flow: extract text and page count from the PDF,
//! segment into pages, embed each non-empty page, and persist the result.
//! Persistence is best-effort: the in-memory index satisfies the request,
//! and the flat files only back a warm restart.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding;
use crate::extract;
use crate::segment::segment;
use crate::store::{self, PageRecord};

/// Page and source tags carried by an index entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// 1-based page number; `None` for a legacy whole-document entry.
    pub page: Option<u32>,
    pub source: String,
}

/// One embedded text node. Immutable after ingestion; replaced wholesale by
/// the next upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// The in-memory vector index for the active document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub model: String,
    pub dims: usize,
    pub entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Builds an index from `(text, page)` pairs by embedding every text.
    pub async fn build(
        config: &Config,
        source: &str,
        nodes: Vec<(String, Option<u32>)>,
    ) -> Result<Self> {
        let texts: Vec<String> = nodes.iter().map(|(t, _)| t.clone()).collect();
        let embeddings = embedding::embed_texts(&config.embedding, &texts).await?;

        let entries = nodes
            .into_iter()
            .zip(embeddings)
            .map(|((text, page), embedding)| IndexEntry {
                id: Uuid::new_v4().to_string(),
                text,
                embedding,
                metadata: EntryMetadata {
                    page,
                    source: source.to_string(),
                },
            })
            .collect();

        Ok(Self {
            model: config.embedding.model.clone(),
            dims: config.embedding.dims,
            entries,
        })
    }
}

/// Ingests an uploaded PDF: extract, segment, embed, persist.
///
/// Fails when the buffer is empty, when the PDF has no extractable text, or
/// when extraction/embedding fails. Persistence failures are logged and
/// swallowed.
pub async fn ingest(config: &Config, bytes: &[u8], source: &str) -> Result<VectorIndex> {
    let pdf = extract::extract_pdf(bytes)?;
    let pages = segment(&pdf.text, pdf.page_count, &config.segmenter);

    // Page numbers are assigned before filtering so they stay 1-based and
    // aligned with the segmenter's output.
    let nodes: Vec<(String, Option<u32>)> = pages
        .iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| (text.clone(), Some(i as u32 + 1)))
        .collect();

    let index = VectorIndex::build(config, source, nodes).await?;

    persist(config, &pdf.text, &pages, &index);

    tracing::info!(
        pages = pages.len(),
        entries = index.entries.len(),
        "ingested document"
    );

    Ok(index)
}

/// Best-effort persistence of all three flat files.
fn persist(config: &Config, full_text: &str, pages: &[String], index: &VectorIndex) {
    let data_dir = &config.storage.data_dir;

    if let Err(e) = store::save_document(data_dir, full_text) {
        tracing::warn!("could not persist document text: {:#}", e);
    }

    let records: Vec<PageRecord> = pages
        .iter()
        .enumerate()
        .map(|(i, text)| PageRecord {
            page: i as u32 + 1,
            text: text.clone(),
        })
        .collect();
    if let Err(e) = store::save_pages(data_dir, &records) {
        tracing::warn!("could not persist page records: {:#}", e);
    }

    if let Err(e) = store::save_index(data_dir, index) {
        tracing::warn!("could not persist vector store: {:#}", e);
    }
}
