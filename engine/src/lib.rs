//! Kiosk Engine Library
//!
//! The conversation core of the speech kiosk and everything that drives it.
//! It is used by both the `kiosk` binary and the integration tests.

/// Configuration management module
pub mod config;

/// Pure conversation state machine
pub mod orchestrator;

/// STT, chat and inner-task provider adapters
pub mod providers;

/// Database persistence module
pub mod db;

/// Effect execution and the kiosk device boundary
pub mod executor;

/// Event loop owning the orchestrator state
pub mod host;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
