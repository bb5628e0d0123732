//! Listener dispatcher
//!
//! One subscription for the lifetime of the engine. Every received line is
//! checked against every armed listener in the tree, whether or not its
//! case is running.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use super::command::CommandOutcome;
use super::events::{EngineEvent, StatusLevel};
use super::extract::extract_parameters;
use super::matcher::check_urc_match;
use super::navigation::{find_command_location, get_next_step_from, StepRef};
use super::Engine;
use crate::common::{Error, Result};
use crate::model::{Command, CommandStatus, JumpConfig, ListenMode, OnReceived};

impl Engine {
    /// Start the listener dispatcher
    ///
    /// Only the first call subscribes; later calls return `false`. The
    /// dispatcher stops when the transport closes or the last engine handle
    /// is dropped. Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        if self.inner.dispatcher_started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut rx = self.transport().subscribe();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(line) => {
                        let Some(inner) = weak.upgrade() else { break };
                        Engine { inner }.dispatch_line(&line);
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Listener dispatcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Listener dispatcher stopped");
        });
        tracing::debug!("Listener dispatcher started");
        true
    }

    /// Match one received line against every armed listener
    ///
    /// Returns the ids of the listeners that matched.
    pub fn dispatch_line(&self, line: &str) -> Vec<String> {
        let matched: Vec<(StepRef, Command)> = self.session().with_tree(|t| {
            t.walk()
                .iter()
                .filter_map(|case_id| t.case(case_id).map(|c| (case_id, c)))
                .flat_map(|(case_id, case)| {
                    case.commands.iter().enumerate().filter_map(move |(i, cmd)| {
                        let spec = cmd.listener_spec()?;
                        (cmd.selected && check_urc_match(line, &spec.pattern, spec.match_mode))
                            .then(|| (StepRef::new(case_id.as_str(), i), cmd.clone()))
                    })
                })
                .collect()
        });

        let mut ids = Vec::with_capacity(matched.len());
        for (step, command) in matched {
            let Some(spec) = command.listener_spec() else { continue };
            tracing::debug!(listener = %command.id, line, "Listener matched");

            if let Some(parse_config) = &spec.parse_config {
                let extracted = extract_parameters(line, parse_config);
                if !extracted.is_empty() {
                    self.session().merge_variables(extracted.clone());
                    self.session().emit(EngineEvent::VariablesExtracted {
                        command_id: command.id.clone(),
                        variables: extracted,
                    });
                }
            }

            let once = spec.listen_mode == ListenMode::Once;
            self.session().update_tree(|t| {
                if let Some(cmd) = t.command_mut(&step.case_id, step.index) {
                    cmd.status = CommandStatus::Success;
                    if once {
                        cmd.selected = false;
                    }
                }
            });
            self.session()
                .status(StatusLevel::Success, format!("Matched {}: {}", command.text, line));

            let fire = if once {
                self.session().resolve_once(&command.id);
                true
            } else {
                self.session().mark_triggered(&command.id)
            };
            if fire {
                if let Some(jump) = &spec.jump_config {
                    self.schedule_jump(&step, jump);
                }
            }
            ids.push(command.id);
        }
        ids
    }

    /// Resolve a listener's continuation and run it after the jump delay
    fn schedule_jump(&self, from: &StepRef, jump: &JumpConfig) {
        let target = self.session().with_tree(|t| match jump.on_received {
            OnReceived::Continue => get_next_step_from(t, &from.case_id, from.index),
            OnReceived::Jump => jump
                .target_id
                .as_deref()
                .and_then(|id| find_command_location(t, id)),
        });

        let Some(target) = target else {
            if jump.on_received == OnReceived::Jump {
                tracing::warn!(target = ?jump.target_id, "Jump target not found");
                self.session().status(
                    StatusLevel::Warning,
                    format!(
                        "Jump target {} not found",
                        jump.target_id.as_deref().unwrap_or("<unset>")
                    ),
                );
            }
            return;
        };

        let engine = self.clone();
        let delay = Duration::from_millis(self.config().engine.jump_delay_ms);
        tracing::debug!(%from, %target, "Scheduling step");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = engine.run_step(&target.case_id, target.index).await {
                tracing::warn!(%target, error = %e, "Scheduled step failed");
            }
        });
    }

    /// Execute a single command outside of a case run
    pub async fn run_step(&self, case_id: &str, index: usize) -> Result<CommandOutcome> {
        let exists = self
            .session()
            .with_tree(|t| t.command(case_id, index).is_some());
        if !exists {
            return Err(Error::CommandIndexOutOfRange {
                case_id: case_id.to_string(),
                index,
            });
        }
        let outcome = self.execute_command(case_id, index, None).await?;
        if let Some(error) = &outcome.error {
            self.session().status(StatusLevel::Error, error.clone());
        }
        Ok(outcome)
    }
}
