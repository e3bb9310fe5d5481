//! Conversation Orchestrator
//!
//! The orchestrator is a pure state machine. The host hands it the current
//! [`OrchestratorState`], one [`Event`](kiosk_sdk::Event) and the current time;
//! it returns the next state and the [`Effect`](kiosk_sdk::Effect)s the
//! executor must perform. It never performs I/O, never awaits and never reads
//! the clock itself, so the same inputs always produce the same outputs.
//!
//! # Turn flow
//!
//! ```text
//! idle -> listening -> waiting_stt -> waiting_chat -> idle
//!                                                  \-> asking_consent
//! asking_consent -> listening -> waiting_stt -> waiting_inner_task -> idle
//!                                                                  \-> asking_consent
//! ```
//!
//! # Priorities
//!
//! - `STAFF_EMERGENCY_STOP` latches the machine; only `STAFF_RESUME` is
//!   honoured until then.
//! - `STAFF_FORCE_ROOM` resets any turn to `ROOM`/`idle`.
//! - Provider results are correlated by request id. A result whose id is not
//!   the one currently tracked for its provider kind changes nothing.

pub mod command;
pub mod consent;
pub mod speech;
pub mod state;
pub mod transition;

pub use command::{normalize_utterance, parse_command, Command};
pub use consent::parse_consent_answer;
pub use state::{
    InFlight, OrchestratorState, PendingConsent, Phase, CONSENT_TIMEOUT_MS, IDLE_TIMEOUT_MS,
};
pub use transition::transition;
