//! Language model clients
//!
//! One completion call per question: no retries, no streaming.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Hosted language model completion interface
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt at the given temperature
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;

    /// Model name for logs and readiness checks
    fn model_name(&self) -> &str;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenAI, Groq, vLLM, ...)
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    system_prompt: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatCompletionsClient {
    /// Create a new client
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature,
        };

        let response = self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ModelInvocation {
                message: format!("LLM API request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ModelInvocation {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await
            .map_err(|e| AppError::ModelInvocation {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        chat_response.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::ModelInvocation {
                message: "Empty response from LLM".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Offline stand-in that answers from the prompt itself.
///
/// Echoes the first context entry so local runs exercise the full pipeline
/// without a hosted model.
pub struct EchoLanguageModel;

#[async_trait]
impl LanguageModel for EchoLanguageModel {
    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String> {
        let first_entry = prompt
            .lines()
            .skip_while(|line| !line.starts_with("[1]"))
            .nth(1)
            .map(str::trim)
            .filter(|line| !line.is_empty());

        Ok(match first_entry {
            Some(line) => format!("According to the provided context: {} [1]", line),
            None => "The answer is not contained in the provided context.".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

/// Create a language model client based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai-compatible" | "openai" | "groq" => {
            let key = config.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
                AppError::Configuration {
                    message: "llm.api_key is required for hosted providers".to_string(),
                }
            })?;
            Ok(Arc::new(ChatCompletionsClient::new(key, config)?))
        }
        "mock" => Ok(Arc::new(EchoLanguageModel)),
        other => Err(AppError::Configuration {
            message: format!("Unknown LLM provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_model_quotes_first_entry() {
        let prompt = "Context:\n[1] (source: a.pdf)\nGoats browse rather than graze.\n\nQuestion:\nWhat do goats do?";
        let answer = EchoLanguageModel.complete(prompt, 0.3).await.unwrap();
        assert_eq!(
            answer,
            "According to the provided context: Goats browse rather than graze. [1]"
        );
    }

    #[tokio::test]
    async fn test_echo_model_without_context() {
        let answer = EchoLanguageModel.complete("Question:\nanything", 0.3).await.unwrap();
        assert!(answer.contains("not contained"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_model_invocation_error() {
        let config = LlmConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            timeout_secs: 1,
            ..LlmConfig::default()
        };
        let client = ChatCompletionsClient::new("key".to_string(), &config).unwrap();

        let result = client.complete("hello", 0.3).await;
        assert!(matches!(result, Err(AppError::ModelInvocation { .. })));
    }

    #[test]
    fn test_factory_requires_key_for_hosted_provider() {
        assert!(create_language_model(&LlmConfig::default()).is_err());

        let mock = LlmConfig {
            provider: "mock".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(create_language_model(&mock).unwrap().model_name(), "echo");
    }
}
