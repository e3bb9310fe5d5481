//! The transition function

use kiosk_sdk::types::{
    ConsentAnswer, Effect, Event, InnerTaskKind, MemoryCandidate, Mode, ProviderKind,
};

use super::command::{normalize_utterance, parse_command, Command};
use super::consent::parse_consent_answer;
use super::speech;
use super::state::{OrchestratorState, PendingConsent, Phase, CONSENT_TIMEOUT_MS, IDLE_TIMEOUT_MS};

/// Apply one event at time `now_ms`.
///
/// Returns the next state and the effects to execute, in order.
pub fn transition(
    state: &OrchestratorState,
    event: &Event,
    now_ms: i64,
) -> (OrchestratorState, Vec<Effect>) {
    let mut next = state.clone();
    let mut effects = Vec::new();

    // Stale or duplicate provider results never touch the state
    if let Some((kind, request_id)) = event.provider_request() {
        if !state.in_flight.matches(kind, request_id) {
            return (next, effects);
        }
    }

    if next.stopped {
        if let Event::StaffResume = event {
            next.stopped = false;
            next.mode = Mode::Room;
            next.phase = Phase::Idle;
            next.last_action_at_ms = now_ms;
            effects.push(Effect::SetMode { mode: Mode::Room });
        }
        return (next, effects);
    }

    match event {
        Event::StaffForceRoom => {
            interrupt_all(&mut next, &mut effects);
            next.mode = Mode::Room;
            next.phase = Phase::Idle;
            next.last_action_at_ms = now_ms;
            effects.push(Effect::SetMode { mode: Mode::Room });
        }

        Event::StaffEmergencyStop => {
            interrupt_all(&mut next, &mut effects);
            next.stopped = true;
            next.phase = Phase::Idle;
            next.last_action_at_ms = now_ms;
        }

        // Only meaningful while stopped, handled above
        Event::StaffResume => {}

        Event::StaffPttDown => {
            if matches!(next.phase, Phase::Idle | Phase::AskingConsent) {
                next.phase = Phase::Listening;
                next.last_action_at_ms = now_ms;
                effects.push(Effect::KioskRecordStart);
            }
        }

        Event::StaffPttUp => {
            if next.phase == Phase::Listening {
                let request_id = next.issue_request(ProviderKind::Stt);
                next.phase = Phase::WaitingStt;
                next.last_action_at_ms = now_ms;
                effects.push(Effect::KioskRecordStop);
                effects.push(Effect::CallStt { request_id });
            }
        }

        Event::SttResult { text, .. } => {
            next.in_flight.forget(ProviderKind::Stt);
            on_transcript(&mut next, &mut effects, text, now_ms);
        }

        Event::SttFailed { .. } => {
            next.in_flight.forget(ProviderKind::Stt);
            effects.push(Effect::say(speech::STT_FALLBACK));
            if next.pending_consent.is_some() && !expire_consent(&mut next, &mut effects, now_ms) {
                next.phase = Phase::AskingConsent;
            } else {
                next.phase = Phase::Idle;
            }
        }

        Event::ChatResult {
            assistant_text,
            memory_candidate,
            ..
        } => {
            next.in_flight.forget(ProviderKind::Chat);
            on_chat_reply(
                &mut next,
                &mut effects,
                assistant_text,
                memory_candidate.as_ref(),
                now_ms,
            );
        }

        Event::ChatFailed { .. } => {
            next.in_flight.forget(ProviderKind::Chat);
            effects.push(Effect::say(speech::CHAT_FALLBACK));
            next.phase = Phase::Idle;
        }

        Event::UiConsentButton { answer } => {
            let awaiting = next.pending_consent.is_some()
                && matches!(next.phase, Phase::AskingConsent | Phase::WaitingInnerTask);
            if awaiting && *answer != ConsentAnswer::Unknown {
                if let Some(request_id) = next.in_flight.forget(ProviderKind::InnerTask) {
                    effects.push(Effect::CancelProviderCall {
                        kind: ProviderKind::InnerTask,
                        request_id,
                    });
                }
                next.last_action_at_ms = now_ms;
                resolve_consent(&mut next, &mut effects, *answer);
            }
        }

        Event::InnerTaskResult { json_text, .. } => {
            next.in_flight.forget(ProviderKind::InnerTask);
            match parse_consent_answer(json_text) {
                ConsentAnswer::Unknown => rearm_consent(&mut next, &mut effects, now_ms),
                answer => resolve_consent(&mut next, &mut effects, answer),
            }
        }

        Event::InnerTaskFailed { .. } => {
            next.in_flight.forget(ProviderKind::InnerTask);
            rearm_consent(&mut next, &mut effects, now_ms);
        }

        Event::Tick => on_tick(&mut next, &mut effects, now_ms),

        Event::StaffMemoryConfirm { memory_id } => {
            effects.push(Effect::StoreWriteConfirmed {
                memory_id: memory_id.clone(),
            });
        }

        Event::StaffMemoryReject { memory_id } => {
            effects.push(Effect::StoreWriteRejected {
                memory_id: memory_id.clone(),
            });
        }
    }

    (next, effects)
}

/// Stop speech and recording, forget every request and any pending consent
fn interrupt_all(next: &mut OrchestratorState, effects: &mut Vec<Effect>) {
    effects.push(Effect::SayInterrupt);
    if next.phase == Phase::Listening {
        effects.push(Effect::KioskRecordStop);
    }
    for (kind, request_id) in next.in_flight.drain() {
        effects.push(Effect::CancelProviderCall { kind, request_id });
    }
    if next.pending_consent.take().is_some() {
        effects.push(Effect::ShowConsentUi { visible: false });
    }
}

fn on_transcript(
    next: &mut OrchestratorState,
    effects: &mut Vec<Effect>,
    raw_text: &str,
    now_ms: i64,
) {
    let text = normalize_utterance(raw_text);

    if next.pending_consent.is_some() {
        if text.is_empty() {
            rearm_consent(next, effects, now_ms);
        } else {
            let request_id = next.issue_request(ProviderKind::InnerTask);
            next.phase = Phase::WaitingInnerTask;
            effects.push(Effect::CallInnerTask {
                request_id,
                task: InnerTaskKind::ConsentDecision,
                input: text,
            });
        }
        return;
    }

    if text.is_empty() {
        next.phase = Phase::Idle;
        return;
    }

    match parse_command(&text) {
        Some(Command::Personal { name }) => {
            effects.push(Effect::say(speech::personal_ack(&name)));
            next.mode = Mode::Personal { name };
            next.phase = Phase::Idle;
            effects.push(Effect::SetMode {
                mode: next.mode.clone(),
            });
        }
        Some(Command::Room) => {
            next.mode = Mode::Room;
            next.phase = Phase::Idle;
            effects.push(Effect::SetMode { mode: Mode::Room });
            effects.push(Effect::say(speech::ROOM_ACK));
        }
        None => {
            let request_id = next.issue_request(ProviderKind::Chat);
            next.phase = Phase::WaitingChat;
            effects.push(Effect::CallChat {
                request_id,
                mode: next.mode.clone(),
                text,
            });
        }
    }
}

fn on_chat_reply(
    next: &mut OrchestratorState,
    effects: &mut Vec<Effect>,
    assistant_text: &str,
    candidate: Option<&MemoryCandidate>,
    now_ms: i64,
) {
    if !assistant_text.trim().is_empty() {
        effects.push(Effect::say(assistant_text.trim()));
    }

    // Candidates are only kept for a named child
    match (&next.mode, candidate) {
        (Mode::Personal { name }, Some(candidate)) => {
            effects.push(Effect::say(speech::consent_question(candidate)));
            effects.push(Effect::ShowConsentUi { visible: true });
            next.pending_consent = Some(PendingConsent {
                personal_name: name.clone(),
                candidate: candidate.clone(),
                deadline_at_ms: now_ms.saturating_add(CONSENT_TIMEOUT_MS),
            });
            next.phase = Phase::AskingConsent;
        }
        _ => next.phase = Phase::Idle,
    }
}

fn resolve_consent(next: &mut OrchestratorState, effects: &mut Vec<Effect>, answer: ConsentAnswer) {
    if let Some(pending) = next.pending_consent.take() {
        match answer {
            ConsentAnswer::Yes => {
                effects.push(Effect::StoreWritePending {
                    personal_name: pending.personal_name,
                    candidate: pending.candidate,
                });
                effects.push(Effect::say(speech::CONSENT_THANKS));
            }
            _ => effects.push(Effect::say(speech::CONSENT_DECLINED)),
        }
        effects.push(Effect::ShowConsentUi { visible: false });
    }
    next.phase = Phase::Idle;
}

/// Ask again, keeping the original deadline. Past the deadline the
/// candidate is forgotten instead.
fn rearm_consent(next: &mut OrchestratorState, effects: &mut Vec<Effect>, now_ms: i64) {
    if next.pending_consent.is_some() && !expire_consent(next, effects, now_ms) {
        effects.push(Effect::say(speech::CONSENT_REASK));
        next.phase = Phase::AskingConsent;
    } else {
        next.phase = Phase::Idle;
    }
}

/// Forget the pending candidate once its deadline has passed.
/// Returns whether it was forgotten.
fn expire_consent(next: &mut OrchestratorState, effects: &mut Vec<Effect>, now_ms: i64) -> bool {
    let expired = next
        .pending_consent
        .as_ref()
        .is_some_and(|pending| now_ms >= pending.deadline_at_ms);
    if expired {
        next.pending_consent = None;
        next.phase = Phase::Idle;
        effects.push(Effect::say(speech::CONSENT_FORGET));
        effects.push(Effect::ShowConsentUi { visible: false });
    }
    expired
}

fn on_tick(next: &mut OrchestratorState, effects: &mut Vec<Effect>, now_ms: i64) {
    if next.phase == Phase::AskingConsent {
        expire_consent(next, effects, now_ms);
    }

    if next.mode.is_personal()
        && now_ms.saturating_sub(next.last_action_at_ms) >= IDLE_TIMEOUT_MS
    {
        next.mode = Mode::Room;
        effects.push(Effect::SetMode { mode: Mode::Room });

        // The candidate belonged to the named child, drop it silently
        if next.pending_consent.take().is_some() {
            effects.push(Effect::ShowConsentUi { visible: false });
            if matches!(next.phase, Phase::AskingConsent | Phase::WaitingInnerTask) {
                if let Some(request_id) = next.in_flight.forget(ProviderKind::InnerTask) {
                    effects.push(Effect::CancelProviderCall {
                        kind: ProviderKind::InnerTask,
                        request_id,
                    });
                }
                next.phase = Phase::Idle;
            }
        }
    }
}
