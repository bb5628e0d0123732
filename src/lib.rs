//! atcase - test case execution engine for AT-command serial devices
//!
//! This library walks hierarchical test cases, sends AT commands, validates
//! responses, matches unsolicited result codes and carries extracted values
//! between commands.

pub mod cli;
pub mod commands;
pub mod common;
pub mod engine;
pub mod model;
pub mod prompt;
pub mod scenario;
pub mod transport;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use engine::{Engine, EngineEvent, RunOutcome, RunResult};
pub use model::{CaseTree, Command, TestCase};
