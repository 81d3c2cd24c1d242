//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - A local sentence-transformer run with candle (default)
//! - OpenAI-compatible `/embeddings` endpoints
//! - A deterministic hashing embedder for tests and the `mock` provider

mod local;

pub use local::LocalEmbedder;

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        let dimension = match config.model.as_str() {
            "text-embedding-ada-002" => 1536,
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            _ => config.dimension,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries: config.max_retries.max(1),
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingError {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));

        let request = OpenAIRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| {
            AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            }
        })?;

        if result.data.len() != texts.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Expected {} embeddings, received {}",
                    texts.len(),
                    result.data.len()
                ),
            });
        }

        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // OpenAI has a limit of 2048 texts per request
        const BATCH_SIZE: usize = 100;

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Feature-hashing embedder for tests and the `mock` provider.
///
/// Each lowercase alphanumeric token is hashed into one signed bucket and the
/// vector is L2-normalized. It matches shared vocabulary only, with no notion
/// of meaning.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn model_name(&self) -> &str {
        "feature-hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalEmbedder::load(config)?)),
        "openai" => {
            let key = config.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
                AppError::Configuration {
                    message: "embedding.api_key is required for the openai provider".to_string(),
                }
            })?;
            Ok(Arc::new(OpenAIEmbedder::new(key, config)?))
        }
        "mock" => {
            tracing::warn!("Using the mock embedder; retrieval matches words, not meaning");
            Ok(Arc::new(HashEmbedder::new(config.dimension)))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}
