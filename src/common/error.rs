//! Error types for the test-case engine and CLI
//!
//! Command-level failures (validation timeouts, listener timeouts, declined
//! prompts) are not errors: they are folded into the case failure policy.
//! The variants below cover structural problems and execution faults.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    // === Tree Errors ===
    #[error("Test case '{0}' not found")]
    CaseNotFound(String),

    #[error("Command '{0}' not found")]
    CommandNotFound(String),

    #[error("Command index {index} out of range for case '{case_id}'")]
    CommandIndexOutOfRange { case_id: String, index: usize },

    #[error("Cannot nest '{case_id}' below depth {max_depth}")]
    DepthExceeded { case_id: String, max_depth: usize },

    #[error("Unique id '{0}' is already used by another test case")]
    DuplicateUniqueId(String),

    #[error("Duplicate id '{0}' in test case tree")]
    DuplicateId(String),

    #[error("Command '{id}' is not a {expected} command")]
    KindMismatch { id: String, expected: String },

    // === Transport Errors ===
    #[error("Transport failed to start: {0}")]
    TransportStartFailed(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Invalid hex payload '{payload}': {reason}")]
    InvalidHex { payload: String, reason: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario file '{path}': {reason}")]
    ScenarioParse { path: String, reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a depth exceeded error
    pub fn depth_exceeded(case_id: &str, max_depth: usize) -> Self {
        Self::DepthExceeded {
            case_id: case_id.to_string(),
            max_depth,
        }
    }

    /// Create a kind mismatch error
    pub fn kind_mismatch(id: &str, expected: &str) -> Self {
        Self::KindMismatch {
            id: id.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Create an invalid hex error
    pub fn invalid_hex(payload: &str, reason: impl ToString) -> Self {
        Self::InvalidHex {
            payload: payload.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a scenario parse error
    pub fn scenario_parse(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::ScenarioParse {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
