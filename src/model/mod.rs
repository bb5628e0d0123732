//! Test-case tree model
//!
//! Commands are leaf steps, cases group commands and up to two levels of
//! nested sub-cases. The engine only mutates run state in place
//! (`status`, `selected`, `current_command`, `is_running`).

mod case;
mod command;
mod tree;

pub use case::{CasePolicy, CaseStatus, RunMode, TestCase};
pub use command::{
    Channel, Command, CommandKind, CommandStatus, DataFormat, ExecutionSpec, FailureHandling,
    JumpConfig, LineEnding, ListenMode, ListenerSpec, MatchMode, OnReceived, ParseConfig,
    ParseType, Severity, Validation,
};
pub use tree::{CaseNode, CaseTree, MAX_DEPTH};
