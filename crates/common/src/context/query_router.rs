//! Query Router - Decides where the context for a question comes from
//!
//! Provides:
//! - Freshness override for time-sensitive questions
//! - Mode selection from the caller's toggles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keywords that mark a question as time-sensitive.
///
/// Uploaded documents cannot answer these, so they always go to the web.
pub const RECENCY_KEYWORDS: &[&str] = &["latest", "recent", "current", "today", "news"];

/// Where the context for an answer is retrieved from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Passages from the session's similarity index
    Doc,
    /// Live web-search snippets
    Web,
    /// Both, documents first
    Hybrid,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::Doc => "doc",
            AnswerMode::Web => "web",
            AnswerMode::Hybrid => "hybrid",
        }
    }

    /// Whether this mode reads from the similarity index
    pub fn uses_documents(&self) -> bool {
        matches!(self, AnswerMode::Doc | AnswerMode::Hybrid)
    }

    /// Whether this mode calls the web-search adapter
    pub fn uses_web(&self) -> bool {
        matches!(self, AnswerMode::Web | AnswerMode::Hybrid)
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller toggles
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeFlags {
    /// Web search enabled
    #[serde(default)]
    pub web_search: bool,

    /// Hybrid search enabled (takes precedence over `web_search`)
    #[serde(default)]
    pub hybrid: bool,
}

/// Resolve the answer mode for a question.
///
/// A recency keyword anywhere in the question (case-insensitive substring)
/// forces `Web`; otherwise the toggles decide.
pub fn resolve_mode(question: &str, flags: ModeFlags) -> AnswerMode {
    if is_time_sensitive(question) {
        return AnswerMode::Web;
    }

    if flags.hybrid {
        AnswerMode::Hybrid
    } else if flags.web_search {
        AnswerMode::Web
    } else {
        AnswerMode::Doc
    }
}

/// Check whether the question contains a recency keyword
pub fn is_time_sensitive(question: &str) -> bool {
    let lowered = question.to_lowercase();
    RECENCY_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}
