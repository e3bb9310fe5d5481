//! Event, effect and memory wire types
//!
//! Events and effects are internally tagged on `"type"` with the
//! SCREAMING_SNAKE_CASE names used by the kiosk front-end, e.g.
//! `{"type":"STT_RESULT","request_id":"stt-3","text":"こんにちは"}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Correlation id for a provider request
pub type RequestId = String;

/// Provider kinds the orchestrator talks to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Stt,
    Chat,
    InnerTask,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Stt, ProviderKind::Chat, ProviderKind::InnerTask];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Stt => "stt",
            ProviderKind::Chat => "chat",
            ProviderKind::InnerTask => "inner_task",
        }
    }

    /// Fixed per-provider time budget. Calls are never retried.
    pub fn timeout_ms(&self) -> u64 {
        match self {
            ProviderKind::Stt => 12_000,
            ProviderKind::Chat => 12_000,
            ProviderKind::InnerTask => 4_000,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Shared group context
    #[default]
    Room,

    /// Context bound to one named child
    Personal { name: String },
}

impl Mode {
    pub fn personal(name: impl Into<String>) -> Self {
        Mode::Personal { name: name.into() }
    }

    pub fn personal_name(&self) -> Option<&str> {
        match self {
            Mode::Room => None,
            Mode::Personal { name } => Some(name),
        }
    }

    pub fn is_personal(&self) -> bool {
        matches!(self, Mode::Personal { .. })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Room => write!(f, "ROOM"),
            Mode::Personal { name } => write!(f, "PERSONAL({})", name),
        }
    }
}

/// Category of a remembered fact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Likes,
    Food,
    Play,
    Hobby,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Likes => "likes",
            MemoryKind::Food => "food",
            MemoryKind::Play => "play",
            MemoryKind::Hobby => "hobby",
        }
    }
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "likes" => Ok(MemoryKind::Likes),
            "food" => Ok(MemoryKind::Food),
            "play" => Ok(MemoryKind::Play),
            "hobby" => Ok(MemoryKind::Hobby),
            other => Err(format!("unknown memory kind '{}'", other)),
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a stored memory item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    Pending,
    Confirmed,
    Rejected,
    Deleted,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStatus::Pending => "pending",
            MemoryStatus::Confirmed => "confirmed",
            MemoryStatus::Rejected => "rejected",
            MemoryStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for MemoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MemoryStatus::Pending),
            "confirmed" => Ok(MemoryStatus::Confirmed),
            "rejected" => Ok(MemoryStatus::Rejected),
            "deleted" => Ok(MemoryStatus::Deleted),
            other => Err(format!("unknown memory status '{}'", other)),
        }
    }
}

impl fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fact the chat provider extracted from what a child said
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryCandidate {
    pub kind: MemoryKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_quote: Option<String>,
}

/// Answer to "may I remember this?"
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsentAnswer {
    Yes,
    No,
    Unknown,
}

/// Background tasks the inner-task provider can run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InnerTaskKind {
    ConsentDecision,
}

impl InnerTaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InnerTaskKind::ConsentDecision => "consent_decision",
        }
    }
}

/// Inner-task reply: `{"task":"consent_decision","answer":"yes"|"no"|"unknown"}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConsentDecision {
    pub task: InnerTaskKind,
    pub answer: ConsentAnswer,
}

/// Inputs to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    StaffPttDown,
    StaffPttUp,
    UiConsentButton {
        answer: ConsentAnswer,
    },
    StaffForceRoom,
    StaffEmergencyStop,
    StaffResume,
    SttResult {
        request_id: RequestId,
        text: String,
    },
    SttFailed {
        request_id: RequestId,
        #[serde(default)]
        reason: String,
    },
    ChatResult {
        request_id: RequestId,
        assistant_text: String,
        #[serde(default)]
        memory_candidate: Option<MemoryCandidate>,
    },
    ChatFailed {
        request_id: RequestId,
        #[serde(default)]
        reason: String,
    },
    InnerTaskResult {
        request_id: RequestId,
        json_text: String,
    },
    InnerTaskFailed {
        request_id: RequestId,
        #[serde(default)]
        reason: String,
    },
    Tick,
    StaffMemoryConfirm {
        memory_id: String,
    },
    StaffMemoryReject {
        memory_id: String,
    },
}

impl Event {
    /// Wire name of the event, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::StaffPttDown => "STAFF_PTT_DOWN",
            Event::StaffPttUp => "STAFF_PTT_UP",
            Event::UiConsentButton { .. } => "UI_CONSENT_BUTTON",
            Event::StaffForceRoom => "STAFF_FORCE_ROOM",
            Event::StaffEmergencyStop => "STAFF_EMERGENCY_STOP",
            Event::StaffResume => "STAFF_RESUME",
            Event::SttResult { .. } => "STT_RESULT",
            Event::SttFailed { .. } => "STT_FAILED",
            Event::ChatResult { .. } => "CHAT_RESULT",
            Event::ChatFailed { .. } => "CHAT_FAILED",
            Event::InnerTaskResult { .. } => "INNER_TASK_RESULT",
            Event::InnerTaskFailed { .. } => "INNER_TASK_FAILED",
            Event::Tick => "TICK",
            Event::StaffMemoryConfirm { .. } => "STAFF_MEMORY_CONFIRM",
            Event::StaffMemoryReject { .. } => "STAFF_MEMORY_REJECT",
        }
    }

    /// Provider correlation carried by result events
    pub fn provider_request(&self) -> Option<(ProviderKind, &str)> {
        match self {
            Event::SttResult { request_id, .. } | Event::SttFailed { request_id, .. } => {
                Some((ProviderKind::Stt, request_id))
            }
            Event::ChatResult { request_id, .. } | Event::ChatFailed { request_id, .. } => {
                Some((ProviderKind::Chat, request_id))
            }
            Event::InnerTaskResult { request_id, .. }
            | Event::InnerTaskFailed { request_id, .. } => {
                Some((ProviderKind::InnerTask, request_id))
            }
            _ => None,
        }
    }
}

/// I/O requested by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effect {
    KioskRecordStart,
    KioskRecordStop,
    CallStt {
        request_id: RequestId,
    },
    CallChat {
        request_id: RequestId,
        mode: Mode,
        text: String,
    },
    CallInnerTask {
        request_id: RequestId,
        task: InnerTaskKind,
        input: String,
    },
    CancelProviderCall {
        kind: ProviderKind,
        request_id: RequestId,
    },
    Say {
        text: String,
    },
    SayInterrupt,
    SetMode {
        mode: Mode,
    },
    ShowConsentUi {
        visible: bool,
    },
    StoreWritePending {
        personal_name: String,
        candidate: MemoryCandidate,
    },
    StoreWriteConfirmed {
        memory_id: String,
    },
    StoreWriteRejected {
        memory_id: String,
    },
}

impl Effect {
    pub fn say(text: impl Into<String>) -> Self {
        Effect::Say { text: text.into() }
    }

    /// Wire name of the effect, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Effect::KioskRecordStart => "KIOSK_RECORD_START",
            Effect::KioskRecordStop => "KIOSK_RECORD_STOP",
            Effect::CallStt { .. } => "CALL_STT",
            Effect::CallChat { .. } => "CALL_CHAT",
            Effect::CallInnerTask { .. } => "CALL_INNER_TASK",
            Effect::CancelProviderCall { .. } => "CANCEL_PROVIDER_CALL",
            Effect::Say { .. } => "SAY",
            Effect::SayInterrupt => "SAY_INTERRUPT",
            Effect::SetMode { .. } => "SET_MODE",
            Effect::ShowConsentUi { .. } => "SHOW_CONSENT_UI",
            Effect::StoreWritePending { .. } => "STORE_WRITE_PENDING",
            Effect::StoreWriteConfirmed { .. } => "STORE_WRITE_CONFIRMED",
            Effect::StoreWriteRejected { .. } => "STORE_WRITE_REJECTED",
        }
    }
}
