//! Provider adapters
//!
//! The orchestrator requests three kinds of provider calls: speech-to-text,
//! chat, and short inner tasks (consent decisions). Each kind is a trait so
//! the executor can hold any implementation behind an `Arc<dyn _>`:
//!
//! - [`whisper::WhisperSttProvider`] for a whisper.cpp compatible server
//! - [`ollama::OllamaChatProvider`] and [`ollama::OllamaInnerTaskProvider`]
//! - [`stub`] providers for development without any model running
//!
//! Providers do not enforce the fixed time budgets themselves; the executor
//! wraps every call in `tokio::time::timeout`.

use async_trait::async_trait;
use kiosk_sdk::errors::EngineError;
use kiosk_sdk::types::{InnerTaskKind, MemoryCandidate, Mode, ProviderKind};
use std::sync::Arc;

use crate::config::ProvidersConfig;

pub mod ollama;
pub mod stub;
pub mod whisper;

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during provider calls
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Map a transport error, naming the endpoint for connection failures
    pub(crate) fn from_reqwest(err: reqwest::Error, base_url: &str) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::Unavailable(format!("Cannot connect to {}", base_url))
        } else {
            ProviderError::Network(err.to_string())
        }
    }

    pub fn into_engine_error(self, kind: ProviderKind) -> EngineError {
        match self {
            ProviderError::Timeout => EngineError::ProviderTimeout(kind),
            other => EngineError::Provider(kind, other.to_string()),
        }
    }
}

/// Reply from the chat provider
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub assistant_text: String,
    pub memory_candidate: Option<MemoryCandidate>,
}

impl ChatReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            assistant_text: text.into(),
            memory_candidate: None,
        }
    }
}

/// Speech-to-text provider
#[async_trait]
pub trait SttProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe one push-to-talk recording (WAV bytes)
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;

    async fn check_health(&self) -> bool {
        true
    }
}

/// Conversation provider
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Answer one utterance in the given conversation scope
    async fn chat(&self, mode: &Mode, text: &str) -> Result<ChatReply>;

    async fn check_health(&self) -> bool {
        true
    }
}

/// Background decision provider
#[async_trait]
pub trait InnerTaskProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run a task and return its raw JSON reply.
    ///
    /// The reply is validated by the orchestrator, not here.
    async fn run(&self, task: InnerTaskKind, input: &str) -> Result<String>;

    async fn check_health(&self) -> bool {
        true
    }
}

/// The provider for each kind
#[derive(Clone)]
pub struct Providers {
    pub stt: Arc<dyn SttProvider>,
    pub chat: Arc<dyn ChatProvider>,
    pub inner_task: Arc<dyn InnerTaskProvider>,
}

impl Providers {
    /// Build providers from configuration
    pub fn from_config(config: &ProvidersConfig) -> std::result::Result<Self, EngineError> {
        let stt: Arc<dyn SttProvider> = match config.stt.kind.as_str() {
            "whisper" => Arc::new(whisper::WhisperSttProvider::new(
                config.stt.base_url.clone(),
                config.stt.language.clone(),
            )),
            "stub" => Arc::new(stub::StubSttProvider),
            other => {
                return Err(EngineError::Config(format!(
                    "Unknown stt provider '{}'",
                    other
                )))
            }
        };

        let chat: Arc<dyn ChatProvider> = match config.chat.kind.as_str() {
            "ollama" => Arc::new(ollama::OllamaChatProvider::new(
                config.chat.base_url.clone(),
                config.chat.model.clone(),
            )),
            "stub" => Arc::new(stub::StubChatProvider),
            other => {
                return Err(EngineError::Config(format!(
                    "Unknown chat provider '{}'",
                    other
                )))
            }
        };

        let inner_task: Arc<dyn InnerTaskProvider> = match config.inner_task.kind.as_str() {
            "ollama" => Arc::new(ollama::OllamaInnerTaskProvider::new(
                config.inner_task.base_url.clone(),
                config.inner_task.model.clone(),
            )),
            "stub" => Arc::new(stub::StubInnerTaskProvider),
            other => {
                return Err(EngineError::Config(format!(
                    "Unknown inner_task provider '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            stt,
            chat,
            inner_task,
        })
    }

    /// Development providers that need no running model
    pub fn stub() -> Self {
        Self {
            stt: Arc::new(stub::StubSttProvider),
            chat: Arc::new(stub::StubChatProvider),
            inner_task: Arc::new(stub::StubInnerTaskProvider),
        }
    }
}

/// Find the JSON object in a model reply.
///
/// Handles, in order:
/// 1. The whole reply being a JSON object
/// 2. A fenced block (with or without trailing prose)
/// 3. An object embedded in prose, found by brace matching
pub(crate) fn extract_json_object(content: &str) -> Option<&str> {
    let trimmed = content.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed);
    }

    if let Some(inner) = extract_fenced_block(trimmed) {
        let inner = inner.trim();
        if serde_json::from_str::<serde_json::Value>(inner).is_ok() {
            return Some(inner);
        }
    }

    let start = trimmed.find('{')?;
    extract_balanced_json(&trimmed[start..])
}

/// Body of the first markdown code fence in the text
fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Balanced JSON object starting at position 0 of `s`, respecting string literals
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_extract_raw_json() {
        let content = r#"{"task":"consent_decision","answer":"yes"}"#;
        assert_eq!(extract_json_object(content), Some(content));
    }

    #[test]
    fn test_extract_fenced_json_with_trailing_prose() {
        let content = "```json\n{\"answer\":\"no\"}\n```\nThat's my decision.";
        assert_eq!(extract_json_object(content), Some("{\"answer\":\"no\"}"));
    }

    #[test]
    fn test_extract_embedded_json() {
        let content = r#"Sure! {"assistant_text":"やあ {笑}","memory_candidate":null} hope that helps"#;
        assert_eq!(
            extract_json_object(content),
            Some(r#"{"assistant_text":"やあ {笑}","memory_candidate":null}"#)
        );
    }

    #[test]
    fn test_extract_none() {
        assert_eq!(extract_json_object("ただの返事だよ"), None);
        assert_eq!(extract_json_object("{ unterminated"), None);
    }

    #[test]
    fn test_providers_from_default_config() {
        let config = Config::default_config();
        let providers = Providers::from_config(&config.providers).unwrap();
        assert_eq!(providers.stt.name(), "whisper");
        assert_eq!(providers.chat.name(), "ollama");
        assert_eq!(providers.inner_task.name(), "ollama");
    }

    #[test]
    fn test_timeout_maps_to_engine_timeout() {
        let err = ProviderError::Timeout.into_engine_error(ProviderKind::Chat);
        assert!(matches!(err, EngineError::ProviderTimeout(ProviderKind::Chat)));
    }
}
