//! Text chunking module
//!
//! Splits document segments into overlapping, bounded-size chunks for embedding.

use crate::errors::IngestionError;
use crate::loader::DocumentSegment;
use askdocs_common::config::RetrievalConfig;
use askdocs_common::index::Chunk;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl From<&RetrievalConfig> for ChunkingConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    fn splitter(&self) -> Result<TextSplitter<text_splitter::Characters>, IngestionError> {
        if self.chunk_size == 0 {
            return Err(IngestionError::ConfigError(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|e| IngestionError::ConfigError(e.to_string()))?;

        Ok(TextSplitter::new(config))
    }
}

/// Split segments into chunks.
///
/// Each chunk inherits its segment's source name and page; blank chunks are
/// dropped.
pub fn chunk_segments(
    segments: &[DocumentSegment],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, IngestionError> {
    let splitter = config.splitter()?;

    let chunks: Vec<Chunk> = segments
        .iter()
        .flat_map(|segment| {
            splitter
                .chunks(&segment.text)
                .filter(|text| !text.trim().is_empty())
                .map(move |text| Chunk::new(text, segment.source_name.as_str(), segment.page))
        })
        .collect();

    debug!(
        segments = segments.len(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Segments chunked"
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, page: Option<u32>) -> DocumentSegment {
        DocumentSegment {
            text: text.to_string(),
            source_name: "manual.pdf".to_string(),
            page,
        }
    }

    #[test]
    fn test_chunks_respect_size_and_keep_metadata() {
        let text = "Check the water trough daily. ".repeat(40);
        let config = ChunkingConfig {
            chunk_size: 200,
            chunk_overlap: 50,
        };

        let chunks = chunk_segments(&[segment(&text, Some(7))], &config).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 200);
            assert_eq!(chunk.metadata.source_name, "manual.pdf");
            assert_eq!(chunk.metadata.page, Some(7));
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (1..=60).map(|i| format!("word{} ", i)).collect::<String>();
        let config = ChunkingConfig {
            chunk_size: 80,
            chunk_overlap: 30,
        };

        let chunks = chunk_segments(&[segment(&text, None)], &config).unwrap();

        assert!(chunks.len() >= 2);
        let last_word_of_first = chunks[0].text.split_whitespace().last().unwrap();
        assert!(chunks[1].text.contains(last_word_of_first));
    }

    #[test]
    fn test_short_segment_is_single_chunk() {
        let chunks = chunk_segments(&[segment("Short note.", Some(1))], &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Short note.");
    }

    #[test]
    fn test_pages_stay_separate() {
        let segments = vec![segment("Page one text.", Some(1)), segment("Page two text.", Some(2))];
        let chunks = chunk_segments(&segments, &ChunkingConfig::default()).unwrap();
        let pages: Vec<Option<u32>> = chunks.iter().map(|c| c.metadata.page).collect();
        assert_eq!(pages, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_overlap_not_smaller_than_size_is_rejected() {
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
        };
        assert!(matches!(
            chunk_segments(&[segment("text", None)], &config),
            Err(IngestionError::ConfigError(_))
        ));
    }

    #[test]
    fn test_empty_input() {
        let chunks = chunk_segments(&[], &ChunkingConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }
}
