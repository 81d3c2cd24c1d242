//! Context Engine Core Components
//!
//! The question path from routing to answer:
//! - Mode selection (documents, web, or both)
//! - Context assembly under a character budget
//! - Grounded answer synthesis

mod context_assembler;
mod query_router;
mod synthesizer;

pub use context_assembler::{
    AssemblerConfig, ContextAssembler, ContextBundle, ContextEntry, EmptyContext, EntryKind,
    DEFAULT_MAX_CONTEXT_CHARS, TRUNCATION_MARKER,
};
pub use query_router::{is_time_sensitive, resolve_mode, AnswerMode, ModeFlags, RECENCY_KEYWORDS};
pub use synthesizer::{
    extract_citations, AnswerResult, AnswerStatus, Citation, SynthesisOptions, Synthesizer,
    DEFAULT_TEMPERATURE, EMPTY_CONTEXT_ADVISORY, MODEL_ERROR_ADVISORY,
};
