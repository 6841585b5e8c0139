//! Flat-file persistence for the ingested document.
//!
//! One document is live at a time; each upload overwrites the previous
//! files wholesale. Layout under the configured data directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `document.txt` | full extracted text |
//! | `pages.json` | array of `{page, text}` records |
//! | `vector_store.json` | serialized vector index |
//!
//! There is no schema versioning; files left on disk back a cold-start
//! reload after a restart.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::index::VectorIndex;

pub const DOCUMENT_FILE: &str = "document.txt";
pub const PAGES_FILE: &str = "pages.json";
pub const VECTOR_STORE_FILE: &str = "vector_store.json";

/// One page of the ingested document, 1-based and contiguous.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRecord {
    pub page: u32,
    pub text: String,
}

fn path_of(data_dir: &Path, file: &str) -> PathBuf {
    data_dir.join(file)
}

fn ensure_dir(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))
}

/// Writes the full extracted document text.
pub fn save_document(data_dir: &Path, text: &str) -> Result<()> {
    ensure_dir(data_dir)?;
    fs::write(path_of(data_dir, DOCUMENT_FILE), text)
        .with_context(|| "Failed to write document.txt")
}

/// Writes the per-page records.
pub fn save_pages(data_dir: &Path, pages: &[PageRecord]) -> Result<()> {
    ensure_dir(data_dir)?;
    let json = serde_json::to_string(pages)?;
    fs::write(path_of(data_dir, PAGES_FILE), json).with_context(|| "Failed to write pages.json")
}

/// Serializes the vector index, embeddings included.
pub fn save_index(data_dir: &Path, index: &VectorIndex) -> Result<()> {
    ensure_dir(data_dir)?;
    let json = serde_json::to_string(index)?;
    fs::write(path_of(data_dir, VECTOR_STORE_FILE), json)
        .with_context(|| "Failed to write vector_store.json")
}

/// Reads the full document text. `Ok(None)` when the file does not exist.
pub fn load_document(data_dir: &Path) -> Result<Option<String>> {
    let path = path_of(data_dir, DOCUMENT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).with_context(|| "Failed to read document.txt")?;
    Ok(Some(text))
}

/// Reads the per-page records. `Ok(None)` when the file does not exist;
/// a malformed file is an error the caller may treat as absent.
pub fn load_pages(data_dir: &Path) -> Result<Option<Vec<PageRecord>>> {
    let path = path_of(data_dir, PAGES_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(&path).with_context(|| "Failed to read pages.json")?;
    let pages: Vec<PageRecord> =
        serde_json::from_str(&json).with_context(|| "Failed to parse pages.json")?;
    Ok(Some(pages))
}

/// Reads the serialized vector index. `Ok(None)` when the file does not
/// exist; a malformed file is an error the caller may treat as absent.
pub fn load_index(data_dir: &Path) -> Result<Option<VectorIndex>> {
    let path = path_of(data_dir, VECTOR_STORE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(&path).with_context(|| "Failed to read vector_store.json")?;
    let index: VectorIndex =
        serde_json::from_str(&json).with_context(|| "Failed to parse vector_store.json")?;
    Ok(Some(index))
}
