//! Ollama Providers
//!
//! Chat and inner-task providers backed by a local Ollama server, typically
//! at http://localhost:11434. Both use `/api/chat` in non-streaming mode with
//! `"format": "json"` so the model answers with a single JSON object.
//!
//! Chat replies are expected as
//! `{"assistant_text": "...", "memory_candidate": null | {"kind", "value", "source_quote"}}`.
//! A reply that is not JSON is still spoken, just without a memory candidate.

use async_trait::async_trait;
use kiosk_sdk::types::{InnerTaskKind, MemoryCandidate, Mode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    extract_json_object, ChatProvider, ChatReply, InnerTaskProvider, ProviderError, Result,
};

const CHAT_SYSTEM_PROMPT: &str = r#"あなたは学童保育のキオスクにいるマスコットです。
小学生にやさしく、短く（2文以内）、ひらがな多めで答えてください。
個人情報（住所、電話番号、学校名など）は聞き出さないでください。
子どもが自分の好きなもの・好きな食べ物・遊び・趣味を話したときだけ、
memory_candidate にその内容を入れてください。それ以外は null にしてください。
必ず次の JSON だけを出力してください:
{"assistant_text": "返事", "memory_candidate": null}
または
{"assistant_text": "返事", "memory_candidate": {"kind": "likes|food|play|hobby", "value": "短い内容", "source_quote": "子どもの発言"}}"#;

const CONSENT_SYSTEM_PROMPT: &str = r#"子どもが「おぼえていてもいい？」という質問に答えました。
答えが同意なら yes、拒否なら no、どちらかわからなければ unknown です。
必ず次の JSON だけを出力してください:
{"task":"consent_decision","answer":"yes"}"#;

/// Ollama chat API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    format: &'static str,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl OllamaMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

/// Shared HTTP plumbing for both providers
#[derive(Debug, Clone)]
struct OllamaClient {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaClient {
    fn new(base_url: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn complete(&self, messages: Vec<OllamaMessage>) -> Result<String> {
        tracing::debug!(
            "Ollama request: model={}, messages={}",
            self.model,
            messages.len()
        );

        let request = OllamaRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: "json",
        };

        let url = format!("{}/api/chat", self.base_url);
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        let content = body.message.content.trim().to_string();
        if content.is_empty() {
            return Err(ProviderError::Parse("Empty content".to_string()));
        }
        Ok(content)
    }

    async fn check_health(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Ollama conversation provider
#[derive(Debug, Clone)]
pub struct OllamaChatProvider {
    inner: OllamaClient,
}

impl OllamaChatProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            inner: OllamaClient::new(base_url.into(), model.into()),
        }
    }

    fn scope_prompt(mode: &Mode) -> String {
        match mode {
            Mode::Room => "いまはみんなといっしょにお話ししています。名前で呼びかけないでください。"
                .to_string(),
            Mode::Personal { name } => format!("いまお話ししているのは{}さんです。", name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatJson {
    assistant_text: String,
    #[serde(default)]
    memory_candidate: Option<serde_json::Value>,
}

/// Interpret a chat model reply
pub(crate) fn parse_chat_reply(content: &str) -> ChatReply {
    let parsed = extract_json_object(content)
        .and_then(|json| serde_json::from_str::<ChatJson>(json).ok());

    match parsed {
        Some(reply) => ChatReply {
            assistant_text: reply.assistant_text.trim().to_string(),
            // A malformed candidate is dropped, the answer is still spoken
            memory_candidate: reply
                .memory_candidate
                .and_then(|value| serde_json::from_value::<MemoryCandidate>(value).ok())
                .filter(|candidate| !candidate.value.trim().is_empty()),
        },
        None => ChatReply::text(content.trim()),
    }
}

#[async_trait]
impl ChatProvider for OllamaChatProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, mode: &Mode, text: &str) -> Result<ChatReply> {
        let messages = vec![
            OllamaMessage::system(CHAT_SYSTEM_PROMPT),
            OllamaMessage::system(Self::scope_prompt(mode)),
            OllamaMessage::user(text),
        ];

        let content = self.inner.complete(messages).await?;
        Ok(parse_chat_reply(&content))
    }

    async fn check_health(&self) -> bool {
        self.inner.check_health().await
    }
}

/// Ollama inner-task provider
#[derive(Debug, Clone)]
pub struct OllamaInnerTaskProvider {
    inner: OllamaClient,
}

impl OllamaInnerTaskProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            inner: OllamaClient::new(base_url.into(), model.into()),
        }
    }
}

#[async_trait]
impl InnerTaskProvider for OllamaInnerTaskProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn run(&self, task: InnerTaskKind, input: &str) -> Result<String> {
        let system = match task {
            InnerTaskKind::ConsentDecision => CONSENT_SYSTEM_PROMPT,
        };
        let messages = vec![OllamaMessage::system(system), OllamaMessage::user(input)];

        let content = self.inner.complete(messages).await?;
        Ok(extract_json_object(&content)
            .unwrap_or(content.as_str())
            .to_string())
    }

    async fn check_health(&self) -> bool {
        self.inner.check_health().await
    }
}
