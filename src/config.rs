use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Root directory for persisted per-project indexes.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Passage length in characters.
    pub chunk_size: usize,
    /// Re-coverage length in characters; each window reads ahead by this much.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_overlap() -> usize {
    0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Result cap for similarity ranking.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Relevance floor; candidates at or below it are discarded.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    /// Upper bound on concatenated passage text in the assembled prompt.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_min_similarity() -> f32 {
    0.3
}
fn default_max_context_chars() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Texts longer than this are rejected before the provider call.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            max_input_chars: default_max_input_chars(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_input_chars() -> usize {
    24_000
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_similarity) {
        anyhow::bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.provider == "openai" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
        }
        if config.embedding.model.is_none() {
            anyhow::bail!("embedding.model must be specified when provider is 'openai'");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "mock" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or mock.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "mock" => {}
        "openai" => {
            if config.llm.model.is_none() {
                anyhow::bail!("llm.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or mock.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let f = write_config(
            r#"
[db]
path = "/tmp/docchat.sqlite"

[storage]
dir = "/tmp/docchat-storage"

[chunking]
chunk_size = 1000
overlap = 200
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.retrieval.top_k, 10);
        assert!((cfg.retrieval.min_similarity - 0.3).abs() < 1e-6);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.llm.provider, "disabled");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let f = write_config(
            r#"
[db]
path = "/tmp/docchat.sqlite"

[storage]
dir = "/tmp/docchat-storage"

[chunking]
chunk_size = 100
overlap = 100
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn openai_embedding_requires_model_and_dims() {
        let f = write_config(
            r#"
[db]
path = "/tmp/docchat.sqlite"

[storage]
dir = "/tmp/docchat-storage"

[chunking]
chunk_size = 1000

[embedding]
provider = "openai"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
