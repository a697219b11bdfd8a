//! Embedding providers behind the core [`Embedder`] trait.
//!
//! Three backends, selected by `embedding.provider` in the config:
//! - `"disabled"` — every embed call fails; search still works in
//!   keyword mode.
//! - `"openai"` — calls the OpenAI embeddings API with retry and
//!   exponential backoff. Requires `OPENAI_API_KEY`.
//! - `"local"` — runs models via fastembed; no network after the first
//!   model download. Needs the `local-embeddings` feature. Loaded
//!   models are cached process-wide, so only the first call per model
//!   pays the initialization cost.
//!
//! All returned vectors are L2-normalized before they leave this
//! module, so retrieval can score with a plain dot product.
//!
//! # Retry Strategy (OpenAI)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use quarry_core::embedding::{l2_normalize, Embedder};
use quarry_core::error::{Error, Result};

use crate::config::EmbeddingConfig;

/// Config-driven embedding provider implementing the core [`Embedder`]
/// seam.
pub struct ProviderEmbedder {
    config: EmbeddingConfig,
    model: String,
    dims: usize,
}

impl ProviderEmbedder {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = match config.provider.as_str() {
            "disabled" => ("disabled".to_string(), 0),
            "openai" => {
                let model = config.model.clone().ok_or_else(|| {
                    Error::ModelUnavailable("embedding.model required for OpenAI".to_string())
                })?;
                let dims = config.dims.ok_or_else(|| {
                    Error::ModelUnavailable("embedding.dims required for OpenAI".to_string())
                })?;
                (model, dims)
            }
            "local" => resolve_local_model(config),
            other => {
                return Err(Error::ModelUnavailable(format!(
                    "unknown embedding provider: {}",
                    other
                )))
            }
        };
        Ok(Self {
            config: config.clone(),
            model,
            dims,
        })
    }

    /// Embed a batch of texts, one normalized vector per input, in
    /// input order.
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = match self.config.provider.as_str() {
            "openai" => embed_openai(&self.config, texts).await?,
            #[cfg(feature = "local-embeddings")]
            "local" => embed_local_fastembed(&self.config, texts).await?,
            #[cfg(not(feature = "local-embeddings"))]
            "local" => {
                return Err(Error::ModelUnavailable(
                    "local embedding provider requires the local-embeddings feature".to_string(),
                ))
            }
            "disabled" => {
                return Err(Error::ModelUnavailable(
                    "embedding provider is disabled".to_string(),
                ))
            }
            other => {
                return Err(Error::ModelUnavailable(format!(
                    "unknown embedding provider: {}",
                    other
                )))
            }
        };
        for vector in &mut vectors {
            l2_normalize(vector);
        }
        debug!(count = vectors.len(), model = %self.model, "embedded batch");
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_all(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::ModelUnavailable("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_all(texts).await
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

/// Call the OpenAI embeddings API with retry/backoff.
async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| Error::ModelUnavailable("OPENAI_API_KEY not set".to_string()))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| Error::ModelUnavailable("embedding.model required".to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| Error::ModelUnavailable(e.to_string()))?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            warn!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| Error::ModelUnavailable(e.to_string()))?;
                    return parse_openai_response(&json);
                }

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(Error::ModelUnavailable(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                    continue;
                }

                // Client error (not 429), don't retry
                let body_text = response.text().await.unwrap_or_default();
                return Err(Error::ModelUnavailable(format!(
                    "OpenAI API error {}: {}",
                    status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(Error::ModelUnavailable(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| Error::ModelUnavailable("embedding failed after retries".to_string())))
}

/// Extract the `data[].embedding` arrays in input order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            Error::ModelUnavailable("invalid OpenAI response: missing data array".to_string())
        })?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                Error::ModelUnavailable("invalid OpenAI response: missing embedding".to_string())
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Name-keyed registry of lazily initialized models.
///
/// Initialization runs at most once per name for the lifetime of the
/// process; callers share the stored instance through its mutex.
struct ModelRegistry<T> {
    models: Mutex<HashMap<String, Arc<Mutex<T>>>>,
}

impl<T> ModelRegistry<T> {
    fn new() -> Self {
        Self {
            models: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_init(
        &self,
        name: &str,
        init: impl FnOnce() -> Result<T>,
    ) -> Result<Arc<Mutex<T>>> {
        let mut models = self.models.lock().unwrap();
        if let Some(model) = models.get(name) {
            return Ok(model.clone());
        }
        let model = Arc::new(Mutex::new(init()?));
        models.insert(name.to_string(), model.clone());
        Ok(model)
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(Error::ModelUnavailable(format!(
            "unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings")]
fn local_models() -> &'static ModelRegistry<fastembed::TextEmbedding> {
    static MODELS: std::sync::OnceLock<ModelRegistry<fastembed::TextEmbedding>> =
        std::sync::OnceLock::new();
    MODELS.get_or_init(ModelRegistry::new)
}

#[cfg(feature = "local-embeddings")]
async fn embed_local_fastembed(
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let fastembed_model = config_to_fastembed_model(&model_name)?;
    let batch_size = config.batch_size;
    let texts = texts.to_vec();

    tokio::task::spawn_blocking(move || {
        // Model load is expensive; initialize once per process and
        // reuse across calls.
        let model = local_models().get_or_init(&model_name, || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| {
                Error::ModelUnavailable(format!(
                    "failed to initialize local embedding model: {}",
                    e
                ))
            })
        })?;

        let mut model = model.lock().unwrap();
        model
            .embed(texts, Some(batch_size))
            .map_err(|e| Error::ModelUnavailable(format!("local embedding failed: {}", e)))
    })
    .await
    .map_err(|e| Error::ModelUnavailable(format!("embedding task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_provider_fails_to_embed() {
        let config = EmbeddingConfig {
            provider: "disabled".to_string(),
            ..Default::default()
        };
        let embedder = ProviderEmbedder::from_config(&config).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        assert_eq!(embedder.dims(), 0);

        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }

    #[test]
    fn local_model_dims_are_resolved_from_name() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            model: Some("bge-base-en-v1.5".to_string()),
            ..Default::default()
        };
        let embedder = ProviderEmbedder::from_config(&config).unwrap();
        assert_eq!(embedder.dims(), 768);
    }

    #[test]
    fn explicit_dims_override_the_model_table() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            model: Some("all-minilm-l6-v2".to_string()),
            dims: Some(256),
            ..Default::default()
        };
        let embedder = ProviderEmbedder::from_config(&config).unwrap();
        assert_eq!(embedder.dims(), 256);
    }

    #[test]
    fn openai_without_model_is_rejected() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            ..Default::default()
        };
        assert!(ProviderEmbedder::from_config(&config).is_err());
    }

    #[test]
    fn registry_initializes_each_model_once() {
        let registry: ModelRegistry<u32> = ModelRegistry::new();
        let mut inits = 0;
        let first = registry
            .get_or_init("m", || {
                inits += 1;
                Ok(7)
            })
            .unwrap();
        let second = registry
            .get_or_init("m", || {
                inits += 1;
                Ok(8)
            })
            .unwrap();
        assert_eq!(inits, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second.lock().unwrap(), 7);

        registry
            .get_or_init("other", || {
                inits += 1;
                Ok(9)
            })
            .unwrap();
        assert_eq!(inits, 2);
    }

    #[test]
    fn registry_does_not_cache_failed_initialization() {
        let registry: ModelRegistry<u32> = ModelRegistry::new();
        let err = registry.get_or_init("m", || {
            Err(Error::ModelUnavailable("download failed".to_string()))
        });
        assert!(err.is_err());

        // A later attempt gets to run its initializer.
        let model = registry.get_or_init("m", || Ok(3)).unwrap();
        assert_eq!(*model.lock().unwrap(), 3);
    }

    #[test]
    fn openai_response_is_parsed_in_order() {
        let json = serde_json::json!({
            "data": [
                {"index": 0, "embedding": [1.0, 0.0]},
                {"index": 1, "embedding": [0.0, 1.0]},
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn malformed_openai_response_is_an_error() {
        let json = serde_json::json!({"unexpected": true});
        assert!(parse_openai_response(&json).is_err());
    }
}
