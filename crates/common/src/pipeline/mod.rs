//! Question pipeline
//!
//! Session state is owned by the caller and threaded through every call:
//! `ask` takes a session and hands back the updated one, `index_documents`
//! borrows it and returns a new one only when the rebuild succeeded.

use crate::config::AppConfig;
use crate::context::{
    resolve_mode, AnswerMode, AnswerResult, AssemblerConfig, ContextAssembler, ModeFlags,
    SynthesisOptions, Synthesizer,
};
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::index::{Chunk, InMemoryIndex, RetrievedPassage, SimilarityIndex};
use crate::llm::LanguageModel;
use crate::metrics;
use crate::web_search::{SearchOutcome, WebResult, WebSearchAdapter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A document that is part of a session's index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub name: String,
    /// Hex sha-256 of the uploaded bytes
    pub fingerprint: String,
    pub chunk_count: usize,
}

/// An upload that has already been loaded and chunked
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub name: String,
    pub fingerprint: String,
    pub chunks: Vec<Chunk>,
}

impl PreparedDocument {
    pub fn new(name: impl Into<String>, bytes: &[u8], chunks: Vec<Chunk>) -> Self {
        Self {
            name: name.into(),
            fingerprint: hex::encode(Sha256::digest(bytes)),
            chunks,
        }
    }
}

/// One question and its answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: AnswerResult,
    pub asked_at: DateTime<Utc>,
}

/// Everything one conversation owns.
///
/// Chunks and the index are shared, so cloning a session copies only its
/// document list and the bounded history.
#[derive(Clone)]
pub struct SessionState {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<IndexedDocument>,
    pub chunks: Arc<[Chunk]>,
    pub index: Option<Arc<dyn SimilarityIndex>>,
    /// Oldest first, capped at the pipeline's `max_history`
    pub history: Vec<Exchange>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            documents: Vec::new(),
            chunks: Arc::from(Vec::new()),
            index: None,
            history: Vec::new(),
        }
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("id", &self.id)
            .field("documents", &self.documents)
            .field("chunks", &self.chunks.len())
            .field("indexed", &self.has_index())
            .field("history", &self.history.len())
            .finish()
    }
}

/// One question with the caller's toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(flatten)]
    pub flags: ModeFlags,
}

impl AskRequest {
    pub fn new(question: impl Into<String>, flags: ModeFlags) -> Self {
        Self {
            question: question.into(),
            flags,
        }
    }
}

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Passages retrieved per question
    pub top_k: usize,

    /// Web results requested per question
    pub max_web_results: usize,

    /// Exchanges kept per session
    pub max_history: usize,

    pub assembler: AssemblerConfig,
    pub synthesis: SynthesisOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_web_results: 3,
            max_history: 20,
            assembler: AssemblerConfig::default(),
            synthesis: SynthesisOptions::default(),
        }
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_web_results: config.web_search.max_results,
            max_history: config.retrieval.max_history,
            assembler: AssemblerConfig {
                max_context_chars: config.retrieval.max_context_chars,
                ..AssemblerConfig::default()
            },
            synthesis: SynthesisOptions {
                temperature: config.llm.temperature,
                include_citations: config.llm.include_citations,
            },
        }
    }
}

/// Routes, retrieves, assembles and answers
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    web_search: Arc<dyn WebSearchAdapter>,
    assembler: ContextAssembler,
    synthesizer: Synthesizer,
    top_k: usize,
    max_web_results: usize,
    max_history: usize,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        web_search: Arc<dyn WebSearchAdapter>,
        model: Arc<dyn LanguageModel>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            web_search,
            assembler: ContextAssembler::new(config.assembler),
            synthesizer: Synthesizer::new(model, config.synthesis),
            top_k: config.top_k,
            max_web_results: config.max_web_results,
            max_history: config.max_history,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn web_search(&self) -> &Arc<dyn WebSearchAdapter> {
        &self.web_search
    }

    pub fn model_name(&self) -> &str {
        self.synthesizer.model_name()
    }

    /// Answer one question against the session.
    ///
    /// Never fails; the exchange is appended to the returned session's history,
    /// dropping the oldest exchanges beyond `max_history`.
    #[instrument(skip(self, session, request), fields(session_id = %session.id))]
    pub async fn ask(&self, mut session: SessionState, request: &AskRequest) -> (SessionState, AnswerResult) {
        let question = request.question.as_str();
        let mode = resolve_mode(question, request.flags);

        let (passages, web_results) = tokio::join!(
            self.retrieve_documents(session.index.as_deref(), question, mode),
            self.retrieve_web(question, mode),
        );

        let assembled = self.assembler.assemble(mode, &passages, &web_results);
        let answer = self.synthesizer.synthesize(question, mode, assembled).await;

        metrics::record_question(mode.as_str(), answer.status.as_str());
        info!(
            mode = %mode,
            status = answer.status.as_str(),
            passages = passages.len(),
            web_results = web_results.len(),
            "Question answered"
        );

        session.history.push(Exchange {
            question: question.to_string(),
            answer: answer.clone(),
            asked_at: Utc::now(),
        });
        if session.history.len() > self.max_history {
            let excess = session.history.len() - self.max_history;
            session.history.drain(..excess);
        }

        (session, answer)
    }

    async fn retrieve_documents(
        &self,
        index: Option<&dyn SimilarityIndex>,
        question: &str,
        mode: AnswerMode,
    ) -> Vec<RetrievedPassage> {
        if !mode.uses_documents() {
            return Vec::new();
        }
        let Some(index) = index else {
            return Vec::new();
        };

        match index.query(question, self.top_k).await {
            Ok(passages) => passages,
            Err(e) => {
                warn!(error = %e, "Similarity query failed, continuing without passages");
                Vec::new()
            }
        }
    }

    async fn retrieve_web(&self, question: &str, mode: AnswerMode) -> Vec<WebResult> {
        if !mode.uses_web() {
            return Vec::new();
        }

        let provider = self.web_search.provider_name();
        match self.web_search.search(question, self.max_web_results).await {
            SearchOutcome::Results(results) => {
                let outcome = if results.is_empty() { "empty" } else { "results" };
                metrics::record_web_search(provider, outcome);
                results
            }
            SearchOutcome::Unavailable(reason) => {
                metrics::record_web_search(provider, "unavailable");
                warn!(provider, reason = %reason, "Web search unavailable, continuing without results");
                Vec::new()
            }
        }
    }

    /// Merge documents into the session and rebuild its index.
    ///
    /// A document with the same name as an existing one replaces it, and when
    /// one batch repeats a name the last copy wins. On error the borrowed
    /// session is left as it was.
    #[instrument(skip(self, session, documents), fields(session_id = %session.id, uploads = documents.len()))]
    pub async fn index_documents(
        &self,
        session: &SessionState,
        documents: Vec<PreparedDocument>,
    ) -> Result<SessionState> {
        let mut latest: Vec<PreparedDocument> = Vec::with_capacity(documents.len());
        for document in documents {
            latest.retain(|d| d.name != document.name);
            latest.push(document);
        }
        let documents = latest;

        let incoming: HashSet<&str> = documents.iter().map(|d| d.name.as_str()).collect();

        let mut indexed: Vec<IndexedDocument> = session
            .documents
            .iter()
            .filter(|d| !incoming.contains(d.name.as_str()))
            .cloned()
            .collect();
        let mut chunks: Vec<Chunk> = session
            .chunks
            .iter()
            .filter(|c| !incoming.contains(c.metadata.source_name.as_str()))
            .cloned()
            .collect();

        for document in &documents {
            indexed.push(IndexedDocument {
                name: document.name.clone(),
                fingerprint: document.fingerprint.clone(),
                chunk_count: document.chunks.len(),
            });
            chunks.extend(document.chunks.iter().cloned());
        }

        let start = Instant::now();
        let built = InMemoryIndex::build(chunks.clone(), self.embedder.clone()).await;
        let elapsed = start.elapsed().as_secs_f64();
        metrics::record_index_build(elapsed, chunks.len(), built.is_ok());

        let index = built?;

        info!(
            documents = indexed.len(),
            chunks = chunks.len(),
            duration_ms = (elapsed * 1000.0) as u64,
            "Session index rebuilt"
        );

        Ok(SessionState {
            id: session.id,
            created_at: session.created_at,
            documents: indexed,
            chunks: chunks.into(),
            index: Some(Arc::new(index)),
            history: session.history.clone(),
        })
    }
}
