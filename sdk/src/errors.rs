//! Error types and handling
//!
//! This module provides the error types used throughout the kiosk engine.
//! All errors implement the `KioskErrorExt` trait which provides hints that
//! are safe to show on the staff console and indicates whether the
//! conversation loop can keep going.
//!
//! Provider failures never surface here during a conversation: the
//! orchestrator turns them into fallback utterances. These errors cover the
//! edges of the system (configuration, persistence, devices, the CLI).

use crate::types::ProviderKind;
use thiserror::Error;

/// Trait for kiosk error extensions
pub trait KioskErrorExt {
    /// Returns a hint for the staff console
    ///
    /// The hint never contains file paths, endpoint URLs or provider payloads.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors leave the conversation loop running. Non-recoverable
    /// errors require a restart with a corrected configuration.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use kiosk_sdk::errors::{EngineError, KioskErrorExt};
/// use kiosk_sdk::types::ProviderKind;
///
/// let error = EngineError::ProviderTimeout(ProviderKind::Stt);
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Config("bad log level".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Memory store errors
    #[error("Memory item not found: {0}")]
    MemoryNotFound(String),

    #[error("Invalid memory transition for {id}: {from} -> {to}")]
    InvalidMemoryTransition {
        id: String,
        from: String,
        to: String,
    },

    // Provider errors
    #[error("{0} provider error: {1}")]
    Provider(ProviderKind, String),

    #[error("{0} provider timed out")]
    ProviderTimeout(ProviderKind),

    // Device errors
    #[error("Kiosk device error: {0}")]
    Device(String),

    // Event log errors
    #[error("Invalid event at line {line}: {reason}")]
    InvalidEvent { line: usize, reason: String },

    // Host errors
    #[error("Event channel closed")]
    ChannelClosed,

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KioskErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",

            // Memory store errors
            Self::MemoryNotFound(_) => "No memory item with that id. List items with 'kiosk memory list'",
            Self::InvalidMemoryTransition { .. } => "That memory item can no longer be changed",

            // Provider errors
            Self::Provider(_, _) => "Speech or chat service unavailable. Check that it is running",
            Self::ProviderTimeout(_) => "Speech or chat service took too long to respond",

            // Device errors
            Self::Device(_) => "Microphone or speaker problem. Check the kiosk audio devices",

            // Event log errors
            Self::InvalidEvent { .. } => "Event log line could not be read",

            // Host errors
            Self::ChannelClosed => "Kiosk loop stopped. Restart the kiosk",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::ChannelClosed => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
