//! Case executor
//!
//! Drives a full run of a case: run-count iterations, selected commands in
//! document order, the failure policy per severity, then the selected
//! sub-cases. Pausing is cooperative: the run checks that it still owns its
//! top-level case before every iteration and every command.

use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::time::sleep;
use uuid::Uuid;

use super::command::CommandOutcome;
use super::events::{EngineEvent, RunOutcome, RunResult, StatusLevel};
use super::Engine;
use crate::common::{Error, Result};
use crate::model::{
    CasePolicy, CaseStatus, Command, CommandStatus, FailureHandling, RunMode, Severity, TestCase,
};
use crate::prompt;

/// Ownership of a top-level run, checked at every pause checkpoint
#[derive(Debug, Clone)]
pub(crate) struct RunToken {
    pub(super) root_id: String,
    token: Uuid,
}

impl Engine {
    /// Run a case by id or unique id
    ///
    /// Calling this for a case that is already running pauses it instead
    /// and returns [`RunOutcome::Paused`]; the first call then returns
    /// `Paused` as well once it reaches its next checkpoint.
    pub async fn run_case(&self, case_ref: &str) -> Result<RunOutcome> {
        let case_id = self
            .session()
            .with_tree(|t| t.resolve_case_id(case_ref))
            .ok_or_else(|| Error::CaseNotFound(case_ref.to_string()))?;

        let Some(token) = self.session().begin_run(&case_id) else {
            self.pause(&case_id)?;
            return Ok(RunOutcome::Paused);
        };
        let run = RunToken {
            root_id: case_id.clone(),
            token,
        };

        self.session().clear_variables();
        self.session().clear_triggered();
        tracing::info!(case = %case_id, "Run started");

        let engine = self.clone();
        let body_run = run.clone();
        let body_id = case_id.clone();
        let joined = tokio::spawn(async move { engine.run_case_body(&body_run, &body_id).await }).await;

        let outcome = match joined {
            Ok(Ok(Some(result))) => RunOutcome::Completed(result),
            Ok(Ok(None)) => RunOutcome::Paused,
            Ok(Err(e)) => RunOutcome::Completed(self.fault(&case_id, e.to_string())),
            Err(e) => RunOutcome::Completed(self.fault(&case_id, format!("Run task failed: {}", e))),
        };
        self.session().end_run(&case_id, token);

        match &outcome {
            RunOutcome::Completed(result) => {
                tracing::info!(case = %case_id, status = %result.status, "Run finished");
                let level = match result.status {
                    CaseStatus::Failed => StatusLevel::Error,
                    CaseStatus::Partial => StatusLevel::Warning,
                    _ => StatusLevel::Success,
                };
                self.session().status(
                    level,
                    format!(
                        "{}: {} ({}/{} passed)",
                        result.case_name, result.status, result.passed_commands, result.total_commands
                    ),
                );
                self.session().emit(EngineEvent::RunCompleted(result.clone()));
            }
            RunOutcome::Paused => {
                tracing::info!(case = %case_id, "Run paused");
                // A newer run may already own the case
                if !self.session().is_running(&case_id) {
                    self.revert_to_pending(&case_id);
                }
            }
        }
        Ok(outcome)
    }

    /// Pause a running case, returning whether it was running
    pub fn pause(&self, case_ref: &str) -> Result<bool> {
        let case_id = self
            .session()
            .with_tree(|t| t.resolve_case_id(case_ref))
            .ok_or_else(|| Error::CaseNotFound(case_ref.to_string()))?;
        if !self.session().stop_run(&case_id) {
            return Ok(false);
        }
        self.revert_to_pending(&case_id);
        self.session()
            .status(StatusLevel::Info, format!("Paused {}", case_id));
        Ok(true)
    }

    /// Whether a top-level run currently owns `case_id`
    pub fn is_running(&self, case_id: &str) -> bool {
        self.session().is_running(case_id)
    }

    pub(super) fn is_active(&self, run: &RunToken) -> bool {
        self.session().is_active(&run.root_id, run.token)
    }

    /// Put every running case and command below `case_id` back to pending
    fn revert_to_pending(&self, case_id: &str) {
        self.session().update_tree(|t| {
            for id in t.subtree(case_id) {
                if let Some(case) = t.case_mut(&id) {
                    if case.status == CaseStatus::Running || case.is_running {
                        case.status = CaseStatus::Pending;
                        case.is_running = false;
                    }
                    for cmd in &mut case.commands {
                        if cmd.status == CommandStatus::Running {
                            cmd.status = CommandStatus::Pending;
                        }
                    }
                }
            }
        });
    }

    /// Turn an execution fault into a failed result
    fn fault(&self, case_id: &str, error: String) -> RunResult {
        tracing::error!(case = %case_id, error = %error, "Run failed with an execution fault");
        let name = self
            .session()
            .with_tree(|t| t.case(case_id).map(|c| c.name.clone()))
            .unwrap_or_default();
        self.session().update_tree(|t| {
            if let Some(case) = t.case_mut(case_id) {
                case.status = CaseStatus::Failed;
                case.is_running = false;
            }
        });
        RunResult::fault(case_id, &name, error)
    }

    /// Run one case and its selected sub-cases
    ///
    /// `Ok(None)` means the run was paused.
    fn run_case_body<'a>(
        &'a self,
        run: &'a RunToken,
        case_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<RunResult>>> {
        async move {
            let case = self
                .session()
                .with_tree(|t| t.case(case_id).cloned())
                .ok_or_else(|| Error::CaseNotFound(case_id.to_string()))?;
            let sub_case_ids = self.session().with_tree(|t| t.children(case_id).to_vec());

            let mut to_run: Vec<usize> = case
                .commands
                .iter()
                .enumerate()
                .filter(|(_, c)| c.selected)
                .map(|(i, _)| i)
                .collect();
            if to_run.is_empty() {
                to_run = (0..case.commands.len()).collect();
            }
            let run_count = case.run_count.max(1);

            let mut result = RunResult::start(&case.id, &case.name);
            result.total_commands = to_run.len() * run_count as usize;

            self.session().update_tree(|t| {
                if let Some(c) = t.case_mut(case_id) {
                    c.status = CaseStatus::Running;
                    c.is_running = true;
                    c.current_command = to_run.first().copied().unwrap_or(0);
                    for &i in &to_run {
                        if let Some(cmd) = c.commands.get_mut(i) {
                            cmd.status = CommandStatus::Pending;
                        }
                    }
                }
            });

            let mut aborted = false;
            'iterations: for iteration in 0..run_count {
                if !self.is_active(run) {
                    return Ok(None);
                }
                if run_count > 1 {
                    tracing::debug!(case = %case_id, iteration = iteration + 1, run_count, "Iteration");
                }

                for (position, &index) in to_run.iter().enumerate() {
                    if !self.is_active(run) {
                        return Ok(None);
                    }
                    let command = self
                        .session()
                        .with_tree(|t| t.command(case_id, index).cloned())
                        .ok_or_else(|| Error::CommandIndexOutOfRange {
                            case_id: case_id.to_string(),
                            index,
                        })?;
                    self.session().update_tree(|t| {
                        if let Some(c) = t.case_mut(case_id) {
                            c.current_command = index;
                        }
                    });

                    if case.run_mode == RunMode::SingleStep {
                        let text = prompt::single_step_text(position + 1, to_run.len(), &command);
                        if !self.prompter().prompt_user_action(&text).await {
                            result.failed_commands += 1;
                            result.errors += 1;
                            result.log_failure(
                                Some(index),
                                &command.text,
                                "step declined",
                                self.config().output.max_failure_logs,
                            );
                            aborted = true;
                            break 'iterations;
                        }
                    }

                    let outcome = self.execute_command(case_id, index, Some(run)).await?;
                    if !self.is_active(run) {
                        return Ok(None);
                    }

                    if outcome.success {
                        result.passed_commands += 1;
                    } else if !self.apply_failure_policy(&case, &command, index, outcome, &mut result).await {
                        aborted = true;
                        break 'iterations;
                    }

                    if command.wait_time_ms > 0 {
                        sleep(Duration::from_millis(command.wait_time_ms)).await;
                    }
                }
            }

            if aborted {
                self.skip_pending(case_id, &to_run);
            } else {
                for sub_id in &sub_case_ids {
                    let selected = self
                        .session()
                        .with_tree(|t| t.case(sub_id).map(|c| c.selected))
                        .unwrap_or(false);
                    if !selected {
                        continue;
                    }
                    if !self.is_active(run) {
                        return Ok(None);
                    }
                    match self.run_case_body(run, sub_id).await? {
                        Some(sub) => result.sub_results.push(sub),
                        None => return Ok(None),
                    }
                }
            }

            let status = final_status(&case, &result, aborted);
            result.finish(status);
            self.session().update_tree(|t| {
                if let Some(c) = t.case_mut(case_id) {
                    c.status = status;
                    c.is_running = false;
                }
            });
            Ok(Some(result))
        }
        .boxed()
    }

    /// Record a failed command and decide whether the case goes on
    async fn apply_failure_policy(
        &self,
        case: &TestCase,
        command: &Command,
        index: usize,
        outcome: CommandOutcome,
        result: &mut RunResult,
    ) -> bool {
        let severity = command.failure_severity;
        result.failed_commands += 1;
        match severity {
            Severity::Error => result.errors += 1,
            Severity::Warning => result.warnings += 1,
        }
        let error = outcome.error.unwrap_or_else(|| "command failed".to_string());
        result.log_failure(
            Some(index),
            &command.text,
            error.clone(),
            self.config().output.max_failure_logs,
        );

        let policy = if command.failure_handling == FailureHandling::Stop {
            CasePolicy::Stop
        } else {
            case.policy_for(severity)
        };
        tracing::info!(
            case = %case.id,
            command = %command.id,
            %severity,
            ?policy,
            error = %error,
            "Command failed"
        );
        let level = match severity {
            Severity::Error => StatusLevel::Error,
            Severity::Warning => StatusLevel::Warning,
        };
        self.session()
            .status(level, format!("{} failed: {}", command.text, error));

        match policy {
            CasePolicy::Stop => false,
            CasePolicy::Continue => true,
            CasePolicy::Prompt => {
                let text = prompt::failure_text(command, severity);
                self.prompter().prompt_failure_decision(&text).await
            }
        }
    }

    /// Mark commands that never ran after a stop as skipped
    fn skip_pending(&self, case_id: &str, to_run: &[usize]) {
        self.session().update_tree(|t| {
            if let Some(c) = t.case_mut(case_id) {
                for &i in to_run {
                    if let Some(cmd) = c.commands.get_mut(i) {
                        if cmd.status == CommandStatus::Pending {
                            cmd.status = CommandStatus::Skipped;
                        }
                    }
                }
            }
        });
    }
}

/// Failed on any error, stop or failed sub-case; Partial on warnings when
/// the case validates at warning level, or on a partial sub-case
fn final_status(case: &TestCase, result: &RunResult, aborted: bool) -> CaseStatus {
    let sub_failed = result.sub_results.iter().any(|r| r.status == CaseStatus::Failed);
    let sub_partial = result.sub_results.iter().any(|r| r.status == CaseStatus::Partial);
    if aborted || result.errors > 0 || sub_failed {
        CaseStatus::Failed
    } else if (result.warnings > 0 && case.validation_level == Severity::Warning) || sub_partial {
        CaseStatus::Partial
    } else {
        CaseStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(level: Severity) -> TestCase {
        let mut case = TestCase::new("t1", "case");
        case.validation_level = level;
        case
    }

    #[test]
    fn test_final_status_rules() {
        let mut result = RunResult::start("t1", "case");
        assert_eq!(final_status(&case(Severity::Error), &result, false), CaseStatus::Success);
        assert_eq!(final_status(&case(Severity::Error), &result, true), CaseStatus::Failed);

        result.warnings = 1;
        assert_eq!(final_status(&case(Severity::Error), &result, false), CaseStatus::Success);
        assert_eq!(final_status(&case(Severity::Warning), &result, false), CaseStatus::Partial);

        result.errors = 1;
        assert_eq!(final_status(&case(Severity::Warning), &result, false), CaseStatus::Failed);
    }

    #[test]
    fn test_sub_case_status_propagates() {
        let mut result = RunResult::start("t1", "case");
        let mut sub = RunResult::start("t2", "sub");
        sub.finish(CaseStatus::Partial);
        result.sub_results.push(sub.clone());
        assert_eq!(final_status(&case(Severity::Error), &result, false), CaseStatus::Partial);

        sub.finish(CaseStatus::Failed);
        result.sub_results.push(sub);
        assert_eq!(final_status(&case(Severity::Error), &result, false), CaseStatus::Failed);
    }
}
