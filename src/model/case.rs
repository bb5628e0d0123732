//! Test cases: named, ordered command lists with nested sub-cases

use serde::{Deserialize, Serialize};

use super::command::{Command, Severity};

/// How commands of a case are paced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    #[default]
    #[serde(alias = "auto")]
    Continuous,
    /// Every command waits for a confirmation before it is sent
    #[serde(alias = "single")]
    SingleStep,
}

/// Case-level reaction to a failed command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePolicy {
    Stop,
    Continue,
    Prompt,
}

/// Status of a case run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Partial,
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

fn default_run_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// A node of the test-case tree in its nested, serializable form
///
/// The engine works on the arena form ([`super::CaseTree`]); this shape is
/// what scenario files contain and what tree snapshots are published as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    /// Stable external reference, empty on ephemeral clones
    #[serde(default)]
    pub unique_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub sub_cases: Vec<TestCase>,
    #[serde(default = "default_true")]
    pub selected: bool,
    #[serde(default = "default_run_count")]
    pub run_count: u32,
    #[serde(default)]
    pub run_mode: RunMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error_failure: Option<CasePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_warning_failure: Option<CasePolicy>,
    /// Legacy single policy used when the severity-specific one is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_strategy: Option<CasePolicy>,
    /// `Warning` makes warnings alone mark the run partial
    #[serde(default)]
    pub validation_level: Severity,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub status: CaseStatus,
    #[serde(default)]
    pub current_command: usize,
}

impl TestCase {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            unique_id: String::new(),
            name: name.into(),
            description: String::new(),
            commands: Vec::new(),
            sub_cases: Vec::new(),
            selected: true,
            run_count: 1,
            run_mode: RunMode::Continuous,
            on_error_failure: None,
            on_warning_failure: None,
            failure_strategy: None,
            validation_level: Severity::Error,
            is_running: false,
            status: CaseStatus::Pending,
            current_command: 0,
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_sub_case(mut self, sub_case: TestCase) -> Self {
        self.sub_cases.push(sub_case);
        self
    }

    /// Policy applied to a failure of the given severity
    ///
    /// Falls back to the legacy strategy, then to stop-on-error and
    /// continue-on-warning.
    pub fn policy_for(&self, severity: Severity) -> CasePolicy {
        let keyed = match severity {
            Severity::Error => self.on_error_failure,
            Severity::Warning => self.on_warning_failure,
        };
        keyed.or(self.failure_strategy).unwrap_or(match severity {
            Severity::Error => CasePolicy::Stop,
            Severity::Warning => CasePolicy::Continue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_fallbacks() {
        let mut case = TestCase::new("t1", "case");
        assert_eq!(case.policy_for(Severity::Error), CasePolicy::Stop);
        assert_eq!(case.policy_for(Severity::Warning), CasePolicy::Continue);

        case.failure_strategy = Some(CasePolicy::Prompt);
        assert_eq!(case.policy_for(Severity::Error), CasePolicy::Prompt);
        assert_eq!(case.policy_for(Severity::Warning), CasePolicy::Prompt);

        case.on_warning_failure = Some(CasePolicy::Stop);
        assert_eq!(case.policy_for(Severity::Warning), CasePolicy::Stop);
        assert_eq!(case.policy_for(Severity::Error), CasePolicy::Prompt);
    }

    #[test]
    fn test_legacy_run_mode_names() {
        let case: TestCase = serde_json::from_str(
            r#"{"id": "t1", "name": "n", "runMode": "single", "runCount": 2}"#,
        )
        .unwrap();
        assert_eq!(case.run_mode, RunMode::SingleStep);
        assert_eq!(case.run_count, 2);
        assert!(case.selected);
        assert!(case.unique_id.is_empty());
    }
}
