//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingClient`] trait and concrete implementations:
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API with batching,
//!   retry, and backoff.
//! - **[`MockEmbedder`]** — deterministic bag-of-words vectors for tests and
//!   offline runs.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 encoding for
//!   SQLite BLOB storage
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Boundary to an external text-to-vector service.
///
/// Callers must pre-truncate: texts over the provider's input budget fail
/// with [`Error::InputTooLarge`] before any network call, and the adapter
/// never chunks on the caller's behalf.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning vectors in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector dimensionality, fixed per provider/model.
    fn dims(&self) -> usize;

    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
}

/// Build the configured embedding client.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "mock" => Ok(Box::new(MockEmbedder::new(config.dims.unwrap_or(64)))),
        "disabled" => Err(Error::Provider("embedding provider is disabled".into())),
        other => Err(Error::Provider(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

// ============ OpenAI provider ============

/// Embedding client for the OpenAI `POST /v1/embeddings` endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    max_retries: u32,
    timeout: Duration,
    max_input_chars: usize,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Provider("embedding.model required for openai".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::Provider("embedding.dims required for openai".into()))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(Error::Provider(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Provider(e.to_string()))?;

        Ok(Self {
            model,
            dims,
            max_retries: config.max_retries,
            timeout,
            max_input_chars: config.max_input_chars,
            client,
        })
    }

    fn check_input_sizes(&self, texts: &[String]) -> Result<()> {
        for text in texts {
            let chars = text.chars().count();
            if chars > self.max_input_chars {
                return Err(Error::InputTooLarge {
                    chars,
                    max: self.max_input_chars,
                });
            }
        }
        Ok(())
    }

    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Provider("OPENAI_API_KEY not set".into()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {api_key}"))
                .header("Content-Type", "application/json")
                .timeout(self.timeout)
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
                            .map_err(|e| Error::Provider(e.to_string()))?;
                        return parse_embedding_response(&json, self.dims);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Provider(format!(
                            "OpenAI API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::Provider(format!(
                        "OpenAI API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::Provider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Provider("embedding failed after retries".into())))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.check_input_sizes(texts)?;
        self.call_api(texts).await
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Parse the OpenAI embeddings API response JSON.
fn parse_embedding_response(json: &serde_json::Value, dims: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Provider("invalid response: missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::Provider("invalid response: missing embedding".into()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if vec.len() != dims {
            return Err(Error::Provider(format!(
                "embedding has {} dims, expected {}",
                vec.len(),
                dims
            )));
        }

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Mock provider ============

/// Deterministic offline embedder: lowercased tokens hashed into a fixed
/// number of buckets, L2-normalized. Texts sharing words score high cosine
/// similarity, which is all the tests and offline demos need.
pub struct MockEmbedder {
    dims: usize,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes(digest[..8].try_into().unwrap()) as usize % self.dims;
            vec[bucket] += 1.0;
        }
        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingClient for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_one(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or when
/// either vector is all-zero (avoiding division by zero).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
