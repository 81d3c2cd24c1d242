//! Context Assembler - Turns retrieved passages and web snippets into one prompt context
//!
//! Provides:
//! - Numbered `[n]` entries that citation markers can point back to
//! - Document / web sections for hybrid answers
//! - Character budget enforcement

use crate::context::query_router::AnswerMode;
use crate::errors::AppError;
use crate::index::RetrievedPassage;
use crate::web_search::WebResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Default character budget for the assembled context
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// Appended when the context is cut to the budget
pub const TRUNCATION_MARKER: &str = "\n\n[Context truncated]";

const DOCUMENT_SECTION: &str = "DOCUMENT CONTEXT:";
const WEB_SECTION: &str = "WEB CONTEXT:";

/// Nothing usable was retrieved for the question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no context available for this question")]
pub struct EmptyContext;

impl From<EmptyContext> for AppError {
    fn from(_: EmptyContext) -> Self {
        AppError::EmptyContext
    }
}

/// Origin of a numbered context entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Document,
    Web,
}

/// One numbered entry in the assembled text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextEntry {
    /// Marker number, 1-based and continuous across sections
    pub index: usize,
    pub kind: EntryKind,
    /// Document name or URL
    pub source: String,
    pub page: Option<u32>,
}

/// Assembled context for one question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextBundle {
    pub text: String,
    pub document_sources: BTreeSet<String>,
    pub web_sources: Vec<String>,
    pub entries: Vec<ContextEntry>,
    pub truncated: bool,
}

impl ContextBundle {
    /// Look up the entry a `[n]` marker refers to
    pub fn entry(&self, index: usize) -> Option<&ContextEntry> {
        self.entries.iter().find(|e| e.index == index)
    }
}

/// Assembler configuration
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Maximum characters before truncation
    pub max_context_chars: usize,

    /// Suffix added to truncated context
    pub truncation_marker: String,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            truncation_marker: TRUNCATION_MARKER.to_string(),
        }
    }
}

/// Context assembler
pub struct ContextAssembler {
    config: AssemblerConfig,
}

impl ContextAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    /// Assemble the context for `mode`.
    ///
    /// Inputs the mode does not use are ignored. Returns `EmptyContext` when
    /// nothing non-blank remains.
    pub fn assemble(
        &self,
        mode: AnswerMode,
        doc_passages: &[RetrievedPassage],
        web_results: &[WebResult],
    ) -> Result<ContextBundle, EmptyContext> {
        let mut document_sources = BTreeSet::new();
        let mut web_sources = Vec::new();
        let mut entries = Vec::new();
        let mut next_index = 1;

        let mut doc_blocks = Vec::new();
        if mode.uses_documents() {
            let mut passages: Vec<&RetrievedPassage> = doc_passages
                .iter()
                .filter(|p| !p.text.trim().is_empty())
                .collect();
            passages.sort_by_key(|p| p.rank);

            for passage in passages {
                doc_blocks.push(format!(
                    "[{}] {}\n{}",
                    next_index,
                    source_label(&passage.source_name, passage.page),
                    passage.text.trim()
                ));
                document_sources.insert(passage.source_name.clone());
                entries.push(ContextEntry {
                    index: next_index,
                    kind: EntryKind::Document,
                    source: passage.source_name.clone(),
                    page: passage.page,
                });
                next_index += 1;
            }
        }

        let mut web_blocks = Vec::new();
        if mode.uses_web() {
            for result in web_results.iter().filter(|r| !r.content.trim().is_empty()) {
                let heading = if result.title.trim().is_empty() {
                    format!("[{}] ({})", next_index, result.url)
                } else {
                    format!("[{}] {} ({})", next_index, result.title.trim(), result.url)
                };
                web_blocks.push(format!("{}\n{}", heading, result.content.trim()));
                web_sources.push(result.url.clone());
                entries.push(ContextEntry {
                    index: next_index,
                    kind: EntryKind::Web,
                    source: result.url.clone(),
                    page: None,
                });
                next_index += 1;
            }
        }

        let text = match mode {
            AnswerMode::Hybrid => {
                let mut sections = Vec::new();
                if !doc_blocks.is_empty() {
                    sections.push(format!("{}\n{}", DOCUMENT_SECTION, doc_blocks.join("\n\n")));
                }
                if !web_blocks.is_empty() {
                    sections.push(format!("{}\n{}", WEB_SECTION, web_blocks.join("\n\n")));
                }
                sections.join("\n\n")
            }
            AnswerMode::Doc => doc_blocks.join("\n\n"),
            AnswerMode::Web => web_blocks.join("\n\n"),
        };

        if text.is_empty() {
            return Err(EmptyContext);
        }

        let (text, truncated) = self.apply_budget(text);

        Ok(ContextBundle {
            text,
            document_sources,
            web_sources,
            entries,
            truncated,
        })
    }

    /// Cut to the character budget, never splitting a code point
    fn apply_budget(&self, text: String) -> (String, bool) {
        let limit = self.config.max_context_chars;
        match text.char_indices().nth(limit) {
            Some((byte_offset, _)) => {
                let mut cut = text;
                cut.truncate(byte_offset);
                cut.push_str(&self.config.truncation_marker);
                (cut, true)
            }
            None => (text, false),
        }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}

fn source_label(source_name: &str, page: Option<u32>) -> String {
    match page {
        Some(page) => format!("(source: {}, page {})", source_name, page),
        None => format!("(source: {})", source_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(rank: usize, text: &str, source: &str, page: Option<u32>) -> RetrievedPassage {
        RetrievedPassage {
            rank,
            text: text.to_string(),
            source_name: source.to_string(),
            page,
            score: 1.0 / rank as f32,
        }
    }

    fn web(title: &str, content: &str, url: &str) -> WebResult {
        WebResult {
            title: title.to_string(),
            content: content.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_doc_mode_numbering_and_sources() {
        let assembler = ContextAssembler::default();
        let passages = vec![
            passage(2, "Second passage.", "b.pdf", None),
            passage(1, "First passage.", "a.pdf", Some(4)),
            passage(3, "Third passage.", "a.pdf", Some(9)),
        ];

        let bundle = assembler.assemble(AnswerMode::Doc, &passages, &[]).unwrap();

        assert_eq!(
            bundle.text,
            "[1] (source: a.pdf, page 4)\nFirst passage.\n\n\
             [2] (source: b.pdf)\nSecond passage.\n\n\
             [3] (source: a.pdf, page 9)\nThird passage."
        );
        let sources: Vec<&str> = bundle.document_sources.iter().map(String::as_str).collect();
        assert_eq!(sources, vec!["a.pdf", "b.pdf"]);
        assert!(bundle.web_sources.is_empty());
        assert!(!bundle.truncated);
        assert_eq!(bundle.entry(2).map(|e| e.source.as_str()), Some("b.pdf"));
    }

    #[test]
    fn test_web_mode_keeps_order_and_duplicates() {
        let assembler = ContextAssembler::default();
        let results = vec![
            web("Z", "zeta", "https://z.example"),
            web("A", "alpha", "https://a.example"),
            web("Z again", "zeta two", "https://z.example"),
        ];

        let bundle = assembler.assemble(AnswerMode::Web, &[], &results).unwrap();

        assert_eq!(
            bundle.web_sources,
            vec!["https://z.example", "https://a.example", "https://z.example"]
        );
        assert!(bundle.text.starts_with("[1] Z (https://z.example)\nzeta"));
        assert!(bundle.document_sources.is_empty());
    }

    #[test]
    fn test_hybrid_sections_in_order_with_continuous_numbering() {
        let assembler = ContextAssembler::default();
        let passages = vec![passage(1, "Local fact.", "notes.md", None)];
        let results = vec![
            web("One", "first web", "https://one.example"),
            web("Two", "second web", "https://two.example"),
        ];

        let bundle = assembler.assemble(AnswerMode::Hybrid, &passages, &results).unwrap();

        let doc_at = bundle.text.find("DOCUMENT CONTEXT:").unwrap();
        let web_at = bundle.text.find("WEB CONTEXT:").unwrap();
        assert!(doc_at < web_at);
        assert!(bundle.text.contains("[2] One (https://one.example)"));
        assert!(bundle.text.contains("[3] Two (https://two.example)"));
        assert_eq!(bundle.entries.len(), 3);
        assert_eq!(bundle.entries[0].kind, EntryKind::Document);
        assert_eq!(bundle.entries[2].kind, EntryKind::Web);
    }

    #[test]
    fn test_hybrid_omits_empty_section() {
        let assembler = ContextAssembler::default();
        let results = vec![web("Only", "web only", "https://only.example")];

        let bundle = assembler.assemble(AnswerMode::Hybrid, &[], &results).unwrap();

        assert!(bundle.text.starts_with("WEB CONTEXT:\n[1] Only"));
        assert!(!bundle.text.contains("DOCUMENT CONTEXT:"));
    }

    #[test]
    fn test_unused_inputs_are_ignored() {
        let assembler = ContextAssembler::default();
        let passages = vec![passage(1, "Ignored in web mode.", "a.pdf", None)];
        let results = vec![web("W", "used", "https://w.example")];

        let bundle = assembler.assemble(AnswerMode::Web, &passages, &results).unwrap();
        assert!(bundle.document_sources.is_empty());
        assert!(!bundle.text.contains("Ignored"));

        let result = assembler.assemble(AnswerMode::Doc, &[], &results);
        assert_eq!(result, Err(EmptyContext));
    }

    #[test]
    fn test_blank_inputs_yield_empty_context() {
        let assembler = ContextAssembler::default();
        let passages = vec![passage(1, "   \n", "a.pdf", None)];
        let results = vec![web("Blank", "", "https://blank.example")];

        assert_eq!(
            assembler.assemble(AnswerMode::Hybrid, &passages, &results),
            Err(EmptyContext)
        );
        assert_eq!(assembler.assemble(AnswerMode::Hybrid, &[], &[]), Err(EmptyContext));
    }

    #[test]
    fn test_truncation_to_budget() {
        let assembler = ContextAssembler::new(AssemblerConfig {
            max_context_chars: 50,
            ..AssemblerConfig::default()
        });
        let passages = vec![passage(1, &"x".repeat(200), "big.txt", None)];

        let bundle = assembler.assemble(AnswerMode::Doc, &passages, &[]).unwrap();

        assert!(bundle.truncated);
        assert!(bundle.text.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            bundle.text.chars().count(),
            50 + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let assembler = ContextAssembler::new(AssemblerConfig {
            max_context_chars: 30,
            ..AssemblerConfig::default()
        });
        let passages = vec![passage(1, &"é".repeat(100), "accents.txt", None)];

        let bundle = assembler.assemble(AnswerMode::Doc, &passages, &[]).unwrap();

        let body = bundle.text.strip_suffix(TRUNCATION_MARKER).unwrap();
        assert_eq!(body.chars().count(), 30);
    }

    #[test]
    fn test_exact_budget_is_not_truncated() {
        let text = "[1] (source: a)\nabc";
        let assembler = ContextAssembler::new(AssemblerConfig {
            max_context_chars: text.chars().count(),
            ..AssemblerConfig::default()
        });
        let passages = vec![passage(1, "abc", "a", None)];

        let bundle = assembler.assemble(AnswerMode::Doc, &passages, &[]).unwrap();
        assert_eq!(bundle.text, text);
        assert!(!bundle.truncated);
    }
}
