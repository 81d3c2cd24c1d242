//! PDF text extraction module
//!
//! Extracts per-page text from in-memory PDF bytes using lopdf.

use crate::errors::IngestionError;
use crate::loader::DocumentSegment;
use tracing::{debug, warn};

/// Extract one segment per page that carries text.
///
/// Page numbers are 1-based. Pages without extractable text are skipped; a
/// PDF with no text at all is an error.
pub fn extract_pages(name: &str, bytes: &[u8]) -> Result<Vec<DocumentSegment>, IngestionError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| IngestionError::PdfParseError {
        name: name.to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    debug!(document = name, page_count = pages.len(), "Extracting text from PDF");

    let mut segments = Vec::new();
    for &page_number in pages.keys() {
        let text = match doc.extract_text(&[page_number]) {
            Ok(text) => clean_text(&text),
            Err(e) => {
                warn!(document = name, page = page_number, error = %e, "Failed to extract page text, skipping");
                continue;
            }
        };

        if text.is_empty() {
            continue;
        }

        segments.push(DocumentSegment {
            text,
            source_name: name.to_string(),
            page: Some(page_number),
        });
    }

    if segments.is_empty() {
        return Err(IngestionError::EmptyDocument {
            name: name.to_string(),
        });
    }

    Ok(segments)
}

/// Collapse whitespace runs and strip byte-order marks
fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
