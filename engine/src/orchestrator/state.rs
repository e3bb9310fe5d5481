//! Orchestrator state

use kiosk_sdk::types::{MemoryCandidate, Mode, ProviderKind, RequestId};
use serde::{Deserialize, Serialize};

/// Silence in PERSONAL mode before the kiosk drops back to ROOM
pub const IDLE_TIMEOUT_MS: i64 = 300_000;

/// Time a child has to answer "may I remember this?"
pub const CONSENT_TIMEOUT_MS: i64 = 30_000;

/// Finite state of the current turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Listening,
    WaitingStt,
    WaitingChat,
    AskingConsent,
    WaitingInnerTask,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Listening => "listening",
            Phase::WaitingStt => "waiting_stt",
            Phase::WaitingChat => "waiting_chat",
            Phase::AskingConsent => "asking_consent",
            Phase::WaitingInnerTask => "waiting_inner_task",
        }
    }
}

/// Outstanding provider requests, at most one per kind
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InFlight {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_task: Option<RequestId>,
}

impl InFlight {
    fn slot(&mut self, kind: ProviderKind) -> &mut Option<RequestId> {
        match kind {
            ProviderKind::Stt => &mut self.stt,
            ProviderKind::Chat => &mut self.chat,
            ProviderKind::InnerTask => &mut self.inner_task,
        }
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::Stt => self.stt.as_deref(),
            ProviderKind::Chat => self.chat.as_deref(),
            ProviderKind::InnerTask => self.inner_task.as_deref(),
        }
    }

    /// True when `request_id` is the request currently tracked for `kind`
    pub fn matches(&self, kind: ProviderKind, request_id: &str) -> bool {
        self.get(kind) == Some(request_id)
    }

    pub fn track(&mut self, kind: ProviderKind, request_id: RequestId) {
        *self.slot(kind) = Some(request_id);
    }

    pub fn forget(&mut self, kind: ProviderKind) -> Option<RequestId> {
        self.slot(kind).take()
    }

    /// Forget every outstanding request, returning what was tracked
    pub fn drain(&mut self) -> Vec<(ProviderKind, RequestId)> {
        ProviderKind::ALL
            .into_iter()
            .filter_map(|kind| self.forget(kind).map(|id| (kind, id)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stt.is_none() && self.chat.is_none() && self.inner_task.is_none()
    }
}

/// The single memory candidate waiting for a child's consent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingConsent {
    pub personal_name: String,
    pub candidate: MemoryCandidate,
    /// Fixed when the question is first asked; an unclear answer does not move it
    pub deadline_at_ms: i64,
}

/// Everything the orchestrator knows between two events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorState {
    pub mode: Mode,
    pub phase: Phase,
    pub last_action_at_ms: i64,
    pub in_flight: InFlight,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_consent: Option<PendingConsent>,
    /// Emergency-stop latch
    #[serde(default)]
    pub stopped: bool,
    #[serde(default)]
    pub next_request_seq: u64,
}

impl OrchestratorState {
    /// Fresh state at process start: ROOM, idle, nothing in flight
    pub fn new(now_ms: i64) -> Self {
        Self {
            mode: Mode::Room,
            phase: Phase::Idle,
            last_action_at_ms: now_ms,
            in_flight: InFlight::default(),
            pending_consent: None,
            stopped: false,
            next_request_seq: 0,
        }
    }

    pub fn personal_name(&self) -> Option<&str> {
        self.mode.personal_name()
    }

    /// Deadline of the consent question, only while it is being asked
    pub fn consent_deadline_at_ms(&self) -> Option<i64> {
        match self.phase {
            Phase::AskingConsent => self.pending_consent.as_ref().map(|p| p.deadline_at_ms),
            _ => None,
        }
    }

    /// Mint the next request id for `kind` and start tracking it
    pub(crate) fn issue_request(&mut self, kind: ProviderKind) -> RequestId {
        self.next_request_seq += 1;
        let id = format!("{}-{}", kind.as_str(), self.next_request_seq);
        self.in_flight.track(kind, id.clone());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_sdk::types::MemoryKind;

    #[test]
    fn test_new_state() {
        let state = OrchestratorState::new(1_000);
        assert_eq!(state.mode, Mode::Room);
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.personal_name(), None);
        assert_eq!(state.consent_deadline_at_ms(), None);
        assert!(state.in_flight.is_empty());
    }

    #[test]
    fn test_issue_request_ids_are_unique() {
        let mut state = OrchestratorState::new(0);
        let a = state.issue_request(ProviderKind::Stt);
        let b = state.issue_request(ProviderKind::Chat);
        assert_eq!(a, "stt-1");
        assert_eq!(b, "chat-2");
        assert!(state.in_flight.matches(ProviderKind::Stt, "stt-1"));
        assert!(!state.in_flight.matches(ProviderKind::Chat, "stt-1"));
    }

    #[test]
    fn test_drain_forgets_everything() {
        let mut state = OrchestratorState::new(0);
        state.issue_request(ProviderKind::Stt);
        state.issue_request(ProviderKind::InnerTask);
        let drained = state.in_flight.drain();
        assert_eq!(drained.len(), 2);
        assert!(state.in_flight.is_empty());
    }

    #[test]
    fn test_deadline_only_visible_while_asking() {
        let mut state = OrchestratorState::new(0);
        state.mode = Mode::personal("ゆうた");
        state.pending_consent = Some(PendingConsent {
            personal_name: "ゆうた".to_string(),
            candidate: MemoryCandidate {
                kind: MemoryKind::Food,
                value: "カレー".to_string(),
                source_quote: None,
            },
            deadline_at_ms: 30_000,
        });

        state.phase = Phase::AskingConsent;
        assert_eq!(state.consent_deadline_at_ms(), Some(30_000));

        state.phase = Phase::WaitingInnerTask;
        assert_eq!(state.consent_deadline_at_ms(), None);
    }
}
