//! Configuration management for AskDocs services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Web search configuration
    #[serde(default)]
    pub web_search: WebSearchConfig,

    /// Retrieval and context budget configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Sessions untouched for this long are evicted (0 keeps them until deleted)
    #[serde(default = "default_session_idle_timeout")]
    pub session_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai-compatible, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key for the hosted model
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature, kept low for factual answers
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Ask the model for inline [n] citation markers
    #[serde(default = "default_enabled")]
    pub include_citations: bool,

    /// System prompt override
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: local, openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Directory holding `config.json`, `tokenizer.json` and `model.safetensors`
    /// for the local provider
    #[serde(default = "default_embedding_model_dir")]
    pub model_dir: String,

    /// Tokens per text before truncation (local provider)
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Texts per forward pass (local provider)
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Embedding dimension (checked against the local model, used by the mock embedder)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per batch
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSearchConfig {
    /// Provider: tavily, disabled
    #[serde(default = "default_search_provider")]
    pub provider: String,

    /// API key for the search provider
    pub api_key: Option<String>,

    /// Search endpoint
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Results requested per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Passages fetched from the similarity index per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Context budget in characters
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Directory whose documents are indexed into every new session
    #[serde(default)]
    pub seed_dir: Option<String>,

    /// Exchanges kept per session; older ones are dropped first
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_upload_bytes() -> usize { 25 * 1024 * 1024 }
fn default_session_idle_timeout() -> u64 { 3600 }
fn default_llm_provider() -> String { "openai-compatible".to_string() }
fn default_llm_endpoint() -> String { "https://api.groq.com/openai/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "llama3-8b-8192".to_string() }
fn default_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> usize { 1024 }
fn default_llm_timeout() -> u64 { 60 }
fn default_embedding_provider() -> String { "local".to_string() }
fn default_embedding_model() -> String { "all-MiniLM-L6-v2".to_string() }
fn default_embedding_model_dir() -> String { "models/all-MiniLM-L6-v2".to_string() }
fn default_embedding_max_tokens() -> usize { 256 }
fn default_embedding_batch_size() -> usize { 32 }
fn default_embedding_dimension() -> usize { 384 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_search_provider() -> String { "tavily".to_string() }
fn default_search_endpoint() -> String { "https://api.tavily.com/search".to_string() }
fn default_max_results() -> usize { 3 }
fn default_search_timeout() -> u64 { 15 }
fn default_top_k() -> usize { 3 }
fn default_max_context_chars() -> usize { 12_000 }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_max_history() -> usize { 20 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "askdocs".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__API_KEY=gsk_...
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Idle time after which a session is evicted, if eviction is enabled
    pub fn session_idle_timeout(&self) -> Option<Duration> {
        match self.server.session_idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(ConfigError::Message(format!(
                "retrieval.chunk_overlap ({}) must be smaller than retrieval.chunk_size ({})",
                self.retrieval.chunk_overlap, self.retrieval.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Message(
                "retrieval.top_k must be positive".to_string(),
            ));
        }
        if self.retrieval.max_context_chars == 0 {
            return Err(ConfigError::Message(
                "retrieval.max_context_chars must be positive".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 || self.embedding.max_tokens == 0 {
            return Err(ConfigError::Message(
                "embedding.batch_size and embedding.max_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Message(format!(
                "llm.temperature {} is outside 0.0..=2.0",
                self.llm.temperature
            )));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
            session_idle_timeout_secs: default_session_idle_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            include_citations: default_enabled(),
            system_prompt: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            model_dir: default_embedding_model_dir(),
            max_tokens: default_embedding_max_tokens(),
            batch_size: default_embedding_batch_size(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key: None,
            endpoint: default_search_endpoint(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            seed_dir: None,
            max_history: default_max_history(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            web_search: WebSearchConfig::default(),
            retrieval: RetrievalConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
