//! Stub providers for development
//!
//! These let the console kiosk run end to end without a speech or language
//! model: the "recording" is the typed text, chat echoes it back, and consent
//! is decided by keywords.

use async_trait::async_trait;
use kiosk_sdk::types::{
    ConsentAnswer, ConsentDecision, InnerTaskKind, MemoryCandidate, MemoryKind, Mode,
};

use super::{ChatProvider, ChatReply, InnerTaskProvider, ProviderError, Result, SttProvider};

const YES_WORDS: &[&str] = &["いいよ", "いいね", "うん", "はい", "おぼえて"];
const NO_WORDS: &[&str] = &["だめ", "ダメ", "いや", "いいえ", "やめて"];

/// Decodes the recording as UTF-8 text
#[derive(Debug, Clone, Default)]
pub struct StubSttProvider;

#[async_trait]
impl SttProvider for StubSttProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        String::from_utf8(audio.to_vec())
            .map(|text| text.trim().to_string())
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

/// Echoes the utterance and spots "〜が好き" as a memory candidate
#[derive(Debug, Clone, Default)]
pub struct StubChatProvider;

#[async_trait]
impl ChatProvider for StubChatProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn chat(&self, mode: &Mode, text: &str) -> Result<ChatReply> {
        let assistant_text = match mode {
            Mode::Room => format!("「{}」なんだね！", text),
            Mode::Personal { name } => format!("{}さん、「{}」なんだね！", name, text),
        };

        let memory_candidate = text
            .split_once("が好き")
            .map(|(liked, _)| liked.trim())
            .filter(|liked| !liked.is_empty())
            .map(|liked| MemoryCandidate {
                kind: MemoryKind::Likes,
                value: liked.to_string(),
                source_quote: Some(text.to_string()),
            });

        Ok(ChatReply {
            assistant_text,
            memory_candidate,
        })
    }
}

/// Keyword consent decisions
#[derive(Debug, Clone, Default)]
pub struct StubInnerTaskProvider;

#[async_trait]
impl InnerTaskProvider for StubInnerTaskProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn run(&self, task: InnerTaskKind, input: &str) -> Result<String> {
        let answer = if NO_WORDS.iter().any(|w| input.contains(w)) {
            ConsentAnswer::No
        } else if YES_WORDS.iter().any(|w| input.contains(w)) {
            ConsentAnswer::Yes
        } else {
            ConsentAnswer::Unknown
        };

        serde_json::to_string(&ConsentDecision { task, answer })
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::parse_consent_answer;

    #[tokio::test]
    async fn test_stub_stt_decodes_text() {
        let text = StubSttProvider.transcribe("やあ ".as_bytes()).await.unwrap();
        assert_eq!(text, "やあ");
    }

    #[tokio::test]
    async fn test_stub_chat_spots_likes() {
        let reply = StubChatProvider
            .chat(&Mode::personal("ゆうた"), "サッカーが好き")
            .await
            .unwrap();
        assert!(reply.assistant_text.contains("ゆうた"));
        let candidate = reply.memory_candidate.unwrap();
        assert_eq!(candidate.value, "サッカー");
        assert_eq!(candidate.kind, MemoryKind::Likes);
    }

    #[tokio::test]
    async fn test_stub_chat_without_candidate() {
        let reply = StubChatProvider.chat(&Mode::Room, "こんにちは").await.unwrap();
        assert!(reply.memory_candidate.is_none());
    }

    #[tokio::test]
    async fn test_stub_inner_task_answers_contract_json() {
        let provider = StubInnerTaskProvider;
        let yes = provider
            .run(InnerTaskKind::ConsentDecision, "うん、いいよ")
            .await
            .unwrap();
        assert_eq!(parse_consent_answer(&yes), ConsentAnswer::Yes);

        let no = provider
            .run(InnerTaskKind::ConsentDecision, "いいえ")
            .await
            .unwrap();
        assert_eq!(parse_consent_answer(&no), ConsentAnswer::No);

        let unknown = provider
            .run(InnerTaskKind::ConsentDecision, "えーと")
            .await
            .unwrap();
        assert_eq!(parse_consent_answer(&unknown), ConsentAnswer::Unknown);
    }
}
