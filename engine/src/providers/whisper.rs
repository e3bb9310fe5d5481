//! Whisper STT Provider
//!
//! Talks to a whisper.cpp compatible HTTP server (`whisper-server`), which
//! accepts a multipart upload at `/inference` and answers `{"text": "..."}`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{ProviderError, Result, SttProvider};

/// whisper.cpp server provider
#[derive(Debug, Clone)]
pub struct WhisperSttProvider {
    /// Base URL of the server (typically http://localhost:8080)
    base_url: String,

    /// Language hint passed to the model
    language: String,

    client: Client,
}

impl WhisperSttProvider {
    pub fn new(base_url: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            language: language.into(),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    text: String,
}

#[async_trait]
impl SttProvider for WhisperSttProvider {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        if audio.is_empty() {
            return Err(ProviderError::InvalidRequest("empty recording".to_string()));
        }

        let part = Part::bytes(audio.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        let form = Form::new()
            .part("file", part)
            .text("response_format", "json")
            .text("language", self.language.clone())
            .text("temperature", "0.0");

        let url = format!("{}/inference", self.base_url);
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "whisper server error ({}): {}",
                status, error_text
            )));
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse transcription: {}", e)))?;

        tracing::debug!(
            "Transcribed {} bytes in {:.1}s",
            audio.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(body.text.trim().to_string())
    }

    async fn check_health(&self) -> bool {
        self.client
            .get(&self.base_url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok()
    }
}
