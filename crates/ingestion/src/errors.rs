//! Ingestion error types

use askdocs_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Unsupported document format: {name} (expected .pdf, .txt or .md)")]
    UnsupportedFormat { name: String },

    #[error("PDF parse error for {name}: {message}")]
    PdfParseError { name: String, message: String },

    #[error("No text content in {name}")]
    EmptyDocument { name: String },

    #[error("Chunking error: {0}")]
    ChunkingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::UnsupportedFormat { ref name }
            | IngestionError::PdfParseError { ref name, .. }
            | IngestionError::EmptyDocument { ref name } => AppError::UnsupportedDocument {
                name: name.clone(),
                message: e.to_string(),
            },
            IngestionError::ConfigError(message) => AppError::Configuration { message },
            IngestionError::ChunkingError(message) => AppError::Internal { message },
            IngestionError::IoError(err) => AppError::from(err),
        }
    }
}
