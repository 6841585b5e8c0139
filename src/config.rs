use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration. Every section carries defaults so the service
/// can run without a config file at all.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub memory: MemoryConfig,
    pub retrieval: RetrievalConfig,
    pub segmenter: SegmenterConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `document.txt`, `pages.json`, and `vector_store.json`.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dims: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_string(),
            dims: 768,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub token_limit: usize,
    /// Fraction of the token budget reserved for the most recent messages,
    /// which are kept verbatim.
    pub short_term_ratio: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            token_limit: 4000,
            short_term_ratio: 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Maximum length of the `content` preview in a retrieval result.
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            snippet_chars: 500,
        }
    }
}

/// Tuning constants for the page segmenter. Empirically chosen values,
/// kept configurable rather than "improved".
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SegmenterConfig {
    /// A statistical page is flushed once it reaches this fraction of the
    /// average page length.
    pub length_target_ratio: f64,
    /// Candidate header/footer lines must be at least this many characters.
    pub repeat_min_len: usize,
    /// Candidate header/footer lines must be at most this many characters.
    pub repeat_max_len: usize,
    /// How many of the longest candidate lines to try.
    pub repeat_candidates: usize,
    /// A marker pattern is accepted only when its match count is at most
    /// `marker_slack` times the declared page count.
    pub marker_slack: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            length_target_ratio: 0.7,
            repeat_min_len: 5,
            repeat_max_len: 100,
            repeat_candidates: 3,
            marker_slack: 2,
        }
    }
}

/// Loads configuration from a TOML file, or returns the defaults when no
/// path is given.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.memory.token_limit == 0 {
        anyhow::bail!("memory.token_limit must be > 0");
    }
    if !(0.0..=1.0).contains(&config.memory.short_term_ratio) {
        anyhow::bail!("memory.short_term_ratio must be in [0.0, 1.0]");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.segmenter.marker_slack == 0 {
        anyhow::bail!("segmenter.marker_slack must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_config_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.memory.token_limit, 4000);
        assert!((config.memory.short_term_ratio - 0.7).abs() < 1e-9);
        assert_eq!(config.segmenter.repeat_candidates, 3);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[retrieval]\ntop_k = 8").unwrap();
        let config = load_config(Some(f.path())).unwrap();
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.snippet_chars, 500);
        assert_eq!(config.server.bind, "127.0.0.1:3000");
    }

    #[test]
    fn rejects_invalid_ratio() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[memory]\nshort_term_ratio = 1.5").unwrap();
        assert!(load_config(Some(f.path())).is_err());
    }
}
