//! Kiosk SDK
//!
//! Shared contracts for the kiosk conversation engine: the events fed into
//! the orchestrator, the effects it requests, the memory model and the error
//! taxonomy. The kiosk front-end and staff console speak these types on the wire.

/// Error types and handling
pub mod errors;

/// Event, effect and memory wire types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, KioskErrorExt};
pub use types::{
    ConsentAnswer, ConsentDecision, Effect, Event, InnerTaskKind, MemoryCandidate, MemoryKind,
    MemoryStatus, Mode, ProviderKind, RequestId,
};
