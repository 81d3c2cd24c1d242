//! Similarity index over embedded chunks
//!
//! The index is built once from a full set of chunks and queried per question.
//! Rebuilds replace the whole index; there is no incremental update.

use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Provenance of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Uploaded file name
    pub source_name: String,

    /// 1-based page number, when the source has pages
    pub page: Option<u32>,
}

/// Bounded-size window of document text, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_name: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            text: text.into(),
            metadata: ChunkMetadata {
                source_name: source_name.into(),
                page,
            },
        }
    }
}

/// Passage returned for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// 1-based similarity rank
    pub rank: usize,
    pub text: String,
    pub source_name: String,
    pub page: Option<u32>,
    /// Cosine similarity to the question
    pub score: f32,
}

/// Queryable nearest-neighbour structure
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Return the `k` passages most similar to the question, best first
    async fn query(&self, question: &str, k: usize) -> Result<Vec<RetrievedPassage>>;

    /// Number of indexed chunks
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flat index: every chunk vector is compared against the question.
pub struct InMemoryIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex")
            .field("chunks", &self.chunks.len())
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl InMemoryIndex {
    /// Embed every chunk and build the index.
    ///
    /// Either every chunk is embedded or an error is returned; a partial index
    /// is never produced.
    pub async fn build(chunks: Vec<Chunk>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(AppError::NoDocuments);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                ),
            });
        }

        debug!(
            chunks = chunks.len(),
            model = embedder.model_name(),
            "Similarity index built"
        );

        Ok(Self {
            chunks,
            vectors,
            embedder,
        })
    }
}

#[async_trait]
impl SimilarityIndex for InMemoryIndex {
    async fn query(&self, question: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(question).await?;

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(&query_vector, v)))
            .collect();

        // Stable sort keeps chunk order on ties
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(rank, (i, score))| {
                let chunk = &self.chunks[i];
                RetrievedPassage {
                    rank: rank + 1,
                    text: chunk.text.clone(),
                    source_name: chunk.metadata.source_name.clone(),
                    page: chunk.metadata.page,
                    score,
                }
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

/// Cosine similarity; zero when either vector has no magnitude or lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
        }

        fn model_name(&self) -> &str {
            "short"
        }

        fn dimension(&self) -> usize {
            1
        }
    }

    fn sample_chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("Chickens need fresh water and layer feed every day.", "poultry.pdf", Some(1)),
            Chunk::new("Rainwater barrels should be screened against mosquitoes.", "water.txt", None),
            Chunk::new("Rotate the chickens to fresh pasture weekly.", "poultry.pdf", Some(2)),
        ]
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let index = InMemoryIndex::build(sample_chunks(), Arc::new(HashEmbedder::new(256)))
            .await
            .unwrap();

        let passages = index.query("how often do chickens need fresh pasture", 2).await.unwrap();

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].rank, 1);
        assert_eq!(passages[1].rank, 2);
        assert!(passages[0].score >= passages[1].score);
        assert_eq!(passages[0].source_name, "poultry.pdf");
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let index = InMemoryIndex::build(sample_chunks(), Arc::new(HashEmbedder::new(64)))
            .await
            .unwrap();

        let passages = index.query("water", 10).await.unwrap();
        assert_eq!(passages.len(), 3);
        assert_eq!(index.len(), 3);
    }

    #[tokio::test]
    async fn test_build_rejects_empty_input() {
        let result = InMemoryIndex::build(Vec::new(), Arc::new(HashEmbedder::new(8))).await;
        assert!(matches!(result, Err(AppError::NoDocuments)));
    }

    #[tokio::test]
    async fn test_build_is_all_or_nothing() {
        let result = InMemoryIndex::build(sample_chunks(), Arc::new(ShortEmbedder)).await;
        assert!(matches!(result, Err(AppError::EmbeddingError { .. })));
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
