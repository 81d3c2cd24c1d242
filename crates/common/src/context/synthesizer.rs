//! Answer Synthesizer - Generates grounded answers from assembled context
//!
//! Provides:
//! - Context-only prompting with inline citation markers
//! - Advisory answers for empty context and model failures
//! - Citation extraction back to context entries

use crate::context::context_assembler::{ContextBundle, EmptyContext, EntryKind};
use crate::context::query_router::AnswerMode;
use crate::llm::LanguageModel;
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, warn};

/// Returned when neither documents nor the web produced context
pub const EMPTY_CONTEXT_ADVISORY: &str =
    "No context available to answer this question. Please upload documents or enable web search.";

/// Returned when the language model call fails
pub const MODEL_ERROR_ADVISORY: &str =
    "The AI model could not process this request. Try asking a more specific question or uploading fewer documents.";

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// How an answer was produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    EmptyContext,
    ModelError,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Answered => "answered",
            AnswerStatus::EmptyContext => "empty_context",
            AnswerStatus::ModelError => "model_error",
        }
    }
}

/// Citation marker used in an answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// Marker number (1-based)
    pub index: usize,

    /// Document name or URL
    pub source: String,

    pub kind: EntryKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// Answer with provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    pub answer_text: String,

    /// Sorted, deduplicated
    pub document_sources: Vec<String>,

    /// Adapter order, duplicates kept
    pub web_sources: Vec<String>,

    pub mode: AnswerMode,
    pub status: AnswerStatus,
    pub citations: Vec<Citation>,
}

/// Synthesis options
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Temperature (0.0 - 2.0)
    pub temperature: f32,

    /// Ask the model for inline `[n]` markers
    pub include_citations: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            include_citations: true,
        }
    }
}

/// Answer synthesizer
pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
    options: SynthesisOptions,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, options: SynthesisOptions) -> Self {
        Self { model, options }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Produce the answer for one question.
    ///
    /// Calls the model at most once and never fails: empty context and model
    /// errors both come back as advisory answers.
    pub async fn synthesize(
        &self,
        question: &str,
        mode: AnswerMode,
        assembled: Result<ContextBundle, EmptyContext>,
    ) -> AnswerResult {
        let bundle = match assembled {
            Ok(bundle) => bundle,
            Err(EmptyContext) => {
                debug!(mode = %mode, "No context retrieved, skipping model call");
                return AnswerResult {
                    answer_text: EMPTY_CONTEXT_ADVISORY.to_string(),
                    document_sources: Vec::new(),
                    web_sources: Vec::new(),
                    mode,
                    status: AnswerStatus::EmptyContext,
                    citations: Vec::new(),
                };
            }
        };

        let prompt = self.build_prompt(question, &bundle);

        let start = Instant::now();
        let completion = self.model.complete(&prompt, self.options.temperature).await;
        let elapsed = start.elapsed();
        metrics::record_model_call(elapsed.as_secs_f64(), self.model.model_name(), completion.is_ok());

        let document_sources: Vec<String> = bundle.document_sources.iter().cloned().collect();
        let web_sources = bundle.web_sources.clone();

        match completion {
            Ok(answer) => {
                let answer_text = answer.trim().to_string();
                let citations = if self.options.include_citations {
                    extract_citations(&answer_text, &bundle)
                } else {
                    Vec::new()
                };

                debug!(
                    mode = %mode,
                    latency_ms = elapsed.as_millis() as u64,
                    citations = citations.len(),
                    "Answer synthesized"
                );

                AnswerResult {
                    answer_text,
                    document_sources,
                    web_sources,
                    mode,
                    status: AnswerStatus::Answered,
                    citations,
                }
            }
            Err(e) => {
                warn!(
                    mode = %mode,
                    model = self.model.model_name(),
                    error = %e,
                    "Language model invocation failed"
                );

                AnswerResult {
                    answer_text: MODEL_ERROR_ADVISORY.to_string(),
                    document_sources,
                    web_sources,
                    mode,
                    status: AnswerStatus::ModelError,
                    citations: Vec::new(),
                }
            }
        }
    }

    /// Build the synthesis prompt
    pub fn build_prompt(&self, question: &str, bundle: &ContextBundle) -> String {
        let citation_instruction = if self.options.include_citations {
            "Cite the context entries you rely on with inline markers such as [1] or [2], \
            using the numbers shown in the context."
        } else {
            "Do not include citation markers."
        };

        format!(
            "Use ONLY the context below to answer the question.\n\
            If the answer is not present in the context, say so clearly.\n\
            {}\n\n\
            Context:\n{}\n\n\
            Question:\n{}\n",
            citation_instruction,
            bundle.text,
            question.trim()
        )
    }
}

fn citation_pattern() -> Option<&'static regex_lite::Regex> {
    static PATTERN: OnceLock<Option<regex_lite::Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| regex_lite::Regex::new(r"\[(\d+)\]").ok())
        .as_ref()
}

/// Collect the `[n]` markers that resolve to a context entry, sorted by index
pub fn extract_citations(answer: &str, bundle: &ContextBundle) -> Vec<Citation> {
    let Some(pattern) = citation_pattern() else {
        return Vec::new();
    };

    let indices: BTreeSet<usize> = pattern
        .captures_iter(answer)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .collect();

    indices
        .into_iter()
        .filter_map(|index| bundle.entry(index))
        .map(|entry| Citation {
            index: entry.index,
            source: entry.source.clone(),
            kind: entry.kind,
            page: entry.page,
        })
        .collect()
}
