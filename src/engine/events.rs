//! What the engine reports to the UI layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::navigation::StepRef;
use super::variables::Variables;
use crate::model::{CaseStatus, TestCase};

/// Level of a status-line message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Notification emitted by the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Full tree snapshot after a status or selection change
    TreeChanged(Vec<TestCase>),
    /// Command currently highlighted as executing, `None` when cleared
    Executing(Option<StepRef>),
    /// Status-line message
    Status { level: StatusLevel, message: String },
    /// A listener extracted values into the variable store
    VariablesExtracted {
        command_id: String,
        variables: Variables,
    },
    /// A top-level run finished
    RunCompleted(RunResult),
}

/// One failed command in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureLog {
    /// `None` for faults not tied to a command
    pub command_index: Option<usize>,
    pub command_text: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Structured result of a case run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub case_id: String,
    pub case_name: String,
    pub status: CaseStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_commands: usize,
    pub passed_commands: usize,
    pub failed_commands: usize,
    pub warnings: usize,
    pub errors: usize,
    pub failure_logs: Vec<FailureLog>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_results: Vec<RunResult>,
}

impl RunResult {
    /// Empty result for a run starting now
    pub fn start(case_id: impl Into<String>, case_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            case_id: case_id.into(),
            case_name: case_name.into(),
            status: CaseStatus::Running,
            start_time: now,
            end_time: now,
            duration_ms: 0,
            total_commands: 0,
            passed_commands: 0,
            failed_commands: 0,
            warnings: 0,
            errors: 0,
            failure_logs: Vec::new(),
            sub_results: Vec::new(),
        }
    }

    /// Append a failure log entry, keeping at most `limit` of them
    pub fn log_failure(
        &mut self,
        command_index: Option<usize>,
        command_text: &str,
        error: impl Into<String>,
        limit: usize,
    ) {
        if self.failure_logs.len() >= limit {
            return;
        }
        self.failure_logs.push(FailureLog {
            command_index,
            command_text: command_text.to_string(),
            error: error.into(),
            timestamp: Utc::now(),
        });
    }

    /// Stamp the end time and final status
    pub fn finish(&mut self, status: CaseStatus) {
        self.status = status;
        self.end_time = Utc::now();
        self.duration_ms = (self.end_time - self.start_time).num_milliseconds().max(0) as u64;
    }

    /// Result of a run that died with an execution fault
    pub fn fault(case_id: &str, case_name: &str, error: impl Into<String>) -> Self {
        let mut result = Self::start(case_id, case_name);
        result.errors = 1;
        result.log_failure(None, "", error, 1);
        result.finish(CaseStatus::Failed);
        result
    }

    pub fn is_failed(&self) -> bool {
        self.status == CaseStatus::Failed
    }

    /// This result and all nested sub-results, depth-first
    pub fn iter(&self) -> impl Iterator<Item = &RunResult> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.sub_results.iter().rev());
            Some(next)
        })
    }
}

/// How a call to run a case ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunResult),
    /// The run was paused; no result is reported
    Paused,
}

impl RunOutcome {
    pub fn result(&self) -> Option<&RunResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Paused => None,
        }
    }

    pub fn into_result(self) -> Option<RunResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Paused => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_log_limit() {
        let mut result = RunResult::start("t1", "case");
        for i in 0..5 {
            result.log_failure(Some(i), "AT", "timeout", 3);
        }
        assert_eq!(result.failure_logs.len(), 3);
        assert_eq!(result.failure_logs[2].command_index, Some(2));
    }

    #[test]
    fn test_fault_result() {
        let result = RunResult::fault("t1", "case", "transport closed");
        assert!(result.is_failed());
        assert_eq!(result.failure_logs[0].command_index, None);
        assert_eq!(result.failure_logs[0].error, "transport closed");
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut result = RunResult::start("t1", "case");
        result.finish(CaseStatus::Partial);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["passedCommands"], 0);
        assert!(json.get("subResults").is_none());
    }

    #[test]
    fn test_iter_is_depth_first() {
        let mut root = RunResult::start("a", "a");
        let mut mid = RunResult::start("b", "b");
        mid.sub_results.push(RunResult::start("c", "c"));
        root.sub_results.push(mid);
        root.sub_results.push(RunResult::start("d", "d"));
        let ids: Vec<&str> = root.iter().map(|r| r.case_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }
}
