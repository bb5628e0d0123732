//! Command executor
//!
//! Sends one execution command, optionally waiting for a valid response
//! with retries, or arms one listener command.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Instant};

use super::case::RunToken;
use super::events::StatusLevel;
use super::matcher::validate_response;
use super::navigation::StepRef;
use super::Engine;
use crate::common::{Error, Result};
use crate::model::{
    Command, CommandStatus, ExecutionSpec, FailureHandling, ListenMode, ListenerSpec, Validation,
};
use crate::prompt;
use crate::transport::SendRequest;

/// Result of executing one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl Engine {
    /// Execute the command at `(case_id, index)`
    ///
    /// Command failures are reported in the outcome. `Err` is only returned
    /// when the command does not exist. When `run` is given and loses its
    /// case while the command is in flight, the outcome is returned without
    /// touching the tree.
    pub(crate) async fn execute_command(
        &self,
        case_id: &str,
        index: usize,
        run: Option<&RunToken>,
    ) -> Result<CommandOutcome> {
        let command = self
            .session()
            .with_tree(|t| t.command(case_id, index).cloned())
            .ok_or_else(|| Error::CommandIndexOutOfRange {
                case_id: case_id.to_string(),
                index,
            })?;
        let step = StepRef::new(case_id, index);

        if command.requires_user_action {
            let text = prompt::user_action_text(&command);
            if !self.prompter().prompt_user_action(&text).await {
                tracing::info!(command = %command.id, "User cancelled command");
                if !self.is_stale(run) {
                    self.set_command_status(&step, CommandStatus::Failed);
                }
                return Ok(CommandOutcome::fail("user cancelled"));
            }
        }

        let started = Instant::now();
        self.session().set_executing(step.clone());
        self.set_command_status(&step, CommandStatus::Running);

        let outcome = if let Some(spec) = command.execution_spec() {
            self.send_and_validate(&command, spec).await
        } else if let Some(spec) = command.listener_spec() {
            self.arm_listener(&step, &command, spec).await
        } else {
            return Err(Error::kind_mismatch(&command.id, "execution or listener"));
        };

        if let Some(r) = run.filter(|r| !self.is_active(r)) {
            tracing::debug!(command = %command.id, "Run paused while in flight, result discarded");
            if !self.session().is_running(&r.root_id) {
                self.session().clear_executing(&step);
            }
            return Ok(outcome);
        }

        let status = if outcome.success {
            CommandStatus::Success
        } else {
            CommandStatus::Failed
        };
        self.set_command_status(&step, status);
        self.release_highlight(step, started, command.wait_time_ms);

        if let Some(error) = &outcome.error {
            tracing::debug!(command = %command.id, error, "Command failed");
        }
        Ok(outcome)
    }

    fn is_stale(&self, run: Option<&RunToken>) -> bool {
        run.is_some_and(|r| !self.is_active(r))
    }

    fn set_command_status(&self, step: &StepRef, status: CommandStatus) {
        self.session().update_tree(|t| {
            if let Some(cmd) = t.command_mut(&step.case_id, step.index) {
                cmd.status = status;
            }
        });
    }

    /// Clear the highlight once `wait_time_ms` has passed since the start
    fn release_highlight(&self, step: StepRef, started: Instant, wait_time_ms: u64) {
        let remaining = Duration::from_millis(wait_time_ms).saturating_sub(started.elapsed());
        if remaining.is_zero() {
            self.session().clear_executing(&step);
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            sleep(remaining).await;
            engine.session().clear_executing(&step);
        });
    }

    fn send_request(&self, command: &Command, spec: &ExecutionSpec) -> SendRequest {
        SendRequest {
            payload: self.session().substitute(&command.text, self.default_policy()),
            format: spec.data_format,
            line_ending: spec
                .line_ending
                .unwrap_or(self.config().transport.line_ending),
            channel: spec.channel,
        }
    }

    async fn send_and_validate(&self, command: &Command, spec: &ExecutionSpec) -> CommandOutcome {
        let request = self.send_request(command, spec);
        tracing::debug!(command = %command.id, payload = %request.payload, "Sending");

        if !spec.validation.is_enabled() {
            return match self.transport().send_command(request) {
                Ok(()) => CommandOutcome::ok(),
                Err(e) => CommandOutcome::fail(e.to_string()),
            };
        }

        let engine = &self.config().engine;
        let timeout_ms = spec
            .timeout_ms
            .unwrap_or(engine.default_timeout_ms)
            .max(engine.min_validation_timeout_ms);
        let (attempts, retry_delay_ms) = match command.failure_handling {
            FailureHandling::Retry => (
                command
                    .max_attempts
                    .unwrap_or(engine.default_max_attempts)
                    .max(1),
                command.retry_delay_ms.unwrap_or(engine.default_retry_delay_ms),
            ),
            _ => (1, 0),
        };

        for attempt in 1..=attempts {
            // Subscribe before sending so a fast response is not missed
            let mut rx = self.transport().subscribe();
            if let Err(e) = self.transport().send_command(request.clone()) {
                return CommandOutcome::fail(e.to_string());
            }

            match timeout(
                Duration::from_millis(timeout_ms),
                wait_for_response(&mut rx, &spec.validation),
            )
            .await
            {
                Ok(true) => return CommandOutcome::ok(),
                Ok(false) => return CommandOutcome::fail(Error::TransportClosed.to_string()),
                Err(_) => {
                    tracing::debug!(command = %command.id, attempt, attempts, "Response timed out");
                }
            }
            drop(rx);

            if attempt < attempts {
                self.session().status(
                    StatusLevel::Warning,
                    format!(
                        "Retrying {} ({}/{})",
                        request.payload,
                        attempt + 1,
                        attempts
                    ),
                );
                sleep(Duration::from_millis(retry_delay_ms)).await;
            }
        }

        CommandOutcome::fail(format!(
            "No valid response within {}ms after {} attempt(s)",
            timeout_ms, attempts
        ))
    }

    async fn arm_listener(
        &self,
        step: &StepRef,
        command: &Command,
        spec: &ListenerSpec,
    ) -> CommandOutcome {
        let once_timeout = match spec.listen_mode {
            ListenMode::Once => spec.listen_timeout_ms,
            ListenMode::Permanent => None,
        };

        let Some(ms) = once_timeout else {
            self.set_listener_armed(step, true);
            return CommandOutcome::ok();
        };

        // Register before arming so the dispatcher can't match in between
        let waiter = self.session().register_once(&command.id);
        self.set_listener_armed(step, true);

        match timeout(Duration::from_millis(ms), waiter).await {
            Ok(Ok(())) => CommandOutcome::ok(),
            Ok(Err(_)) => CommandOutcome::fail("listener wait superseded"),
            Err(_) => {
                self.session().cancel_once(&command.id);
                self.set_listener_armed(step, false);
                CommandOutcome::fail(format!(
                    "No '{}' within {}ms ({})",
                    spec.pattern, ms, command.failure_severity
                ))
            }
        }
    }

    fn set_listener_armed(&self, step: &StepRef, armed: bool) {
        self.session().update_tree(|t| {
            if let Some(cmd) = t.command_mut(&step.case_id, step.index) {
                cmd.selected = armed;
            }
        });
    }
}

/// Accumulate received lines until the validation passes
///
/// Returns `false` if the transport closed first.
async fn wait_for_response(rx: &mut broadcast::Receiver<String>, validation: &Validation) -> bool {
    let mut buffer = String::new();
    loop {
        match rx.recv().await {
            Ok(line) => {
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(&line);
                if validate_response(validation, &buffer, &line) {
                    return true;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Response subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}
