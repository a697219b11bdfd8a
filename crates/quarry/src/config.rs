use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use quarry_core::chunk::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use quarry_core::hybrid::{DEFAULT_KEYWORD_WEIGHT, DEFAULT_VECTOR_WEIGHT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            top_k: default_top_k(),
        }
    }
}

fn default_vector_weight() -> f32 {
    DEFAULT_VECTOR_WEIGHT
}
fn default_keyword_weight() -> f32 {
    DEFAULT_KEYWORD_WEIGHT
}
fn default_top_k() -> usize {
    5
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
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
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

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    for (name, w) in [
        ("retrieval.vector_weight", config.retrieval.vector_weight),
        ("retrieval.keyword_weight", config.retrieval.keyword_weight),
    ] {
        if !(0.0..=1.0).contains(&w) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
            other
        ),
    }
    if config.embedding.provider == "openai"
        && (config.embedding.model.is_none() || config.embedding.dims.is_none())
    {
        anyhow::bail!(
            "embedding.model and embedding.dims must be set when provider is 'openai'"
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config("[db]\npath = \"/tmp/quarry.db\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.db.max_connections, 5);
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.chunking.overlap, 50);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.embedding.provider, "local");
    }

    #[test]
    fn zero_connection_pool_is_rejected() {
        let f = write_config("[db]\npath = \"/tmp/quarry.db\"\nmax_connections = 0\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let f = write_config(
            "[db]\npath = \"/tmp/quarry.db\"\n[chunking]\nchunk_size = 100\noverlap = 100\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let f = write_config(
            "[db]\npath = \"/tmp/quarry.db\"\n[embedding]\nprovider = \"bedrock\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn openai_requires_model_and_dims() {
        let f = write_config(
            "[db]\npath = \"/tmp/quarry.db\"\n[embedding]\nprovider = \"openai\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }
}
