//! Local sentence embeddings
//!
//! Runs a BERT-family sentence encoder (all-MiniLM-L6-v2 by default) on the CPU
//! with candle. Vectors are the attention-masked mean of the last hidden state,
//! L2-normalized, so cosine similarity reduces to a dot product.

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Files a model directory must contain
const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Embedder backed by a local sentence-transformer checkpoint
pub struct LocalEmbedder {
    encoder: Arc<SentenceEncoder>,
    model: String,
    batch_size: usize,
}

struct SentenceEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    max_tokens: usize,
    dimension: usize,
    pad_id: u32,
}

impl LocalEmbedder {
    /// Load the tokenizer, config and weights from `config.model_dir`
    pub fn load(config: &EmbeddingConfig) -> Result<Self> {
        let start = Instant::now();
        let dir = resolve_model_dir(&config.model_dir)?;

        let mut tokenizer = Tokenizer::from_file(dir.join(TOKENIZER_FILE)).map_err(|e| {
            AppError::Configuration {
                message: format!("Failed to load tokenizer from {}: {}", dir.display(), e),
            }
        })?;
        // Batches are padded to their longest row in `encode`
        tokenizer.with_padding(None);
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        let raw_config = std::fs::read_to_string(dir.join(CONFIG_FILE)).map_err(|e| {
            AppError::Configuration {
                message: format!("Failed to read {} in {}: {}", CONFIG_FILE, dir.display(), e),
            }
        })?;
        let bert_config: BertConfig = serde_json::from_str(&raw_config)?;

        let device = Device::Cpu;
        let weights = dir.join(WEIGHTS_FILE);
        // SAFETY: the weights file is mapped read-only and must not change while loaded.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DTYPE, &device) }
            .map_err(model_error)?;
        let model = BertModel::load(vb, &bert_config).map_err(model_error)?;

        info!(
            model = %config.model,
            dir = %dir.display(),
            dimension = config.dimension,
            duration_ms = start.elapsed().as_millis() as u64,
            "Local embedding model loaded"
        );

        Ok(Self {
            encoder: Arc::new(SentenceEncoder {
                model,
                tokenizer,
                device,
                max_tokens: config.max_tokens.max(1),
                dimension: config.dimension,
                pad_id,
            }),
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
        })
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let encoder = self.encoder.clone();
        tokio::task::spawn_blocking(move || encoder.encode(&texts))
            .await
            .map_err(|e| AppError::Internal {
                message: format!("Embedding task failed: {}", e),
            })?
    }
}

impl SentenceEncoder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::with_capacity(texts.len());
        for text in texts {
            let encoding = self.tokenizer.encode(text.as_str(), true).map_err(|e| {
                AppError::EmbeddingError {
                    message: format!("Tokenization failed: {}", e),
                }
            })?;
            let mut ids = encoding.get_ids().to_vec();
            ids.truncate(self.max_tokens);
            rows.push(ids);
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let mut ids = Vec::with_capacity(rows.len() * width);
        let mut mask = Vec::with_capacity(rows.len() * width);
        for row in &rows {
            let pad = width - row.len();
            ids.extend_from_slice(row);
            ids.extend(std::iter::repeat(self.pad_id).take(pad));
            mask.extend(std::iter::repeat(1u32).take(row.len()));
            mask.extend(std::iter::repeat(0u32).take(pad));
        }

        let started = Instant::now();
        let vectors = self.forward(ids, mask, rows.len(), width).map_err(model_error)?;
        debug!(
            texts = rows.len(),
            tokens = width,
            duration_ms = started.elapsed().as_millis() as u64,
            "Local embedding batch"
        );

        if let Some(v) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Model produced {}-dimensional vectors, embedding.dimension is {}",
                    v.len(),
                    self.dimension
                ),
            });
        }
        Ok(vectors)
    }

    fn forward(
        &self,
        ids: Vec<u32>,
        mask: Vec<u32>,
        batch: usize,
        width: usize,
    ) -> candle_core::Result<Vec<Vec<f32>>> {
        let input_ids = Tensor::from_vec(ids, (batch, width), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (batch, width), &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        // [batch, tokens, hidden]
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        // Every row holds at least the [CLS] and [SEP] tokens
        let counts = mask.sum(1)?;
        let pooled = summed.broadcast_div(&counts)?;

        let norms = (pooled.sqr()?.sum_keepdim(1)?.sqrt()? + 1e-12)?;
        pooled.broadcast_div(&norms)?.to_vec2::<f32>()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.encode(vec![text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            all_embeddings.extend(self.encode(chunk.to_vec()).await?);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.encoder.dimension
    }
}

fn resolve_model_dir(configured: &str) -> Result<PathBuf> {
    let dir = Path::new(configured);
    let missing: Vec<&str> = [CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE]
        .into_iter()
        .filter(|file| !dir.join(file).is_file())
        .collect();

    if missing.is_empty() {
        Ok(dir.to_path_buf())
    } else {
        Err(AppError::Configuration {
            message: format!(
                "embedding.model_dir {} is missing {}; download the sentence-transformers checkpoint there or choose another embedding provider",
                dir.display(),
                missing.join(", ")
            ),
        })
    }
}

fn model_error(e: candle_core::Error) -> AppError {
    AppError::EmbeddingError {
        message: format!("Local model failure: {}", e),
    }
}
