//! AskDocs Common Library
//!
//! Shared code for the AskDocs gateway and ingestion crates:
//! - Mode routing, context assembly and answer synthesis
//! - Embedder, similarity index, web search and language model adapters
//! - The caller-facing question pipeline and session state
//! - Error types, configuration and metrics

pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod web_search;

// Re-export commonly used types
pub use config::AppConfig;
pub use context::{AnswerMode, AnswerResult, AnswerStatus, ModeFlags};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use index::{Chunk, ChunkMetadata, RetrievedPassage, SimilarityIndex};
pub use llm::LanguageModel;
pub use pipeline::{AskRequest, PreparedDocument, RagPipeline, SessionState};
pub use web_search::{SearchOutcome, WebResult, WebSearchAdapter};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
