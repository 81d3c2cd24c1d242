//! Document loading
//!
//! Turns uploaded bytes into text segments: one per PDF page, one per text file.

use crate::errors::IngestionError;
use crate::pdf::extract_pages;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Text from one page or one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSegment {
    pub text: String,
    pub source_name: String,
    pub page: Option<u32>,
}

/// A file read from disk, with its raw bytes kept for fingerprinting
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub segments: Vec<DocumentSegment>,
}

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Detect the format from the file extension (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

/// Load one uploaded document
pub fn load_document(name: &str, bytes: &[u8]) -> Result<Vec<DocumentSegment>, IngestionError> {
    let kind = DocumentKind::from_name(name).ok_or_else(|| IngestionError::UnsupportedFormat {
        name: name.to_string(),
    })?;

    let segments = match kind {
        DocumentKind::Pdf => extract_pages(name, bytes)?,
        DocumentKind::Text => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim_start_matches('\u{FEFF}');
            if text.trim().is_empty() {
                return Err(IngestionError::EmptyDocument {
                    name: name.to_string(),
                });
            }
            vec![DocumentSegment {
                text: text.to_string(),
                source_name: name.to_string(),
                page: None,
            }]
        }
    };

    debug!(document = name, segments = segments.len(), "Document loaded");
    Ok(segments)
}

/// Load every supported file in a directory, in file-name order.
///
/// Unsupported files are skipped; a supported file that fails to load is an
/// error.
pub fn load_directory(path: &Path) -> Result<Vec<LoadedFile>, IngestionError> {
    let mut names: Vec<String> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    let mut loaded = Vec::new();
    for name in names {
        if DocumentKind::from_name(&name).is_none() {
            debug!(file = %name, "Skipping unsupported file");
            continue;
        }

        let bytes = std::fs::read(path.join(&name))?;
        let segments = load_document(&name, &bytes)?;
        loaded.push(LoadedFile { name, bytes, segments });
    }

    info!(directory = %path.display(), documents = loaded.len(), "Directory loaded");
    Ok(loaded)
}
