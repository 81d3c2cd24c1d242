//! AskDocs Ingestion
//!
//! Loads uploaded documents and splits them into chunks:
//! 1. Detect the format from the file name
//! 2. Extract text (per page for PDFs)
//! 3. Chunk with overlap, keeping source and page on every chunk

pub mod chunker;
pub mod errors;
pub mod loader;
pub mod pdf;

pub use chunker::{chunk_segments, ChunkingConfig};
pub use errors::IngestionError;
pub use loader::{load_directory, load_document, DocumentKind, DocumentSegment, LoadedFile};

use askdocs_common::pipeline::PreparedDocument;
use tracing::info;

/// Load and chunk one upload, ready for indexing
pub fn prepare_document(
    name: &str,
    bytes: &[u8],
    config: &ChunkingConfig,
) -> Result<PreparedDocument, IngestionError> {
    let segments = load_document(name, bytes)?;
    let chunks = chunk_segments(&segments, config)?;

    info!(
        document = name,
        size_bytes = bytes.len(),
        segments = segments.len(),
        chunks = chunks.len(),
        "Document prepared"
    );

    Ok(PreparedDocument::new(name, bytes, chunks))
}

/// Load and chunk every supported file in a directory
pub fn prepare_directory(
    path: &std::path::Path,
    config: &ChunkingConfig,
) -> Result<Vec<PreparedDocument>, IngestionError> {
    load_directory(path)?
        .into_iter()
        .map(|file| {
            let chunks = chunk_segments(&file.segments, config)?;
            Ok(PreparedDocument::new(file.name, &file.bytes, chunks))
        })
        .collect()
}
