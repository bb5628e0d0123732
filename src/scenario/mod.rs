//! Scenario files
//!
//! YAML files describing a tree of test cases, plus the static checker and
//! the terminal reporter used by the CLI.

mod check;
mod config;
pub mod report;

pub use check::{check_tree, CheckReport, WalkStep};
pub use config::{load_scenario, Scenario};
