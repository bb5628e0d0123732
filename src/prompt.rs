//! Confirmation collaborator
//!
//! Runs suspend on these prompts: single-step confirmation, commands that
//! require a user action, and the `Prompt` failure policy. Each case run has
//! at most one prompt outstanding.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::model::{Command, Severity};

/// Which question is being asked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptKind {
    UserAction,
    FailureDecision,
}

/// Answers yes/no questions on behalf of the user
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Confirm a step before it is sent
    async fn prompt_user_action(&self, text: &str) -> bool;

    /// Decide whether to continue after a failed command
    async fn prompt_failure_decision(&self, text: &str) -> bool;
}

/// Answers every prompt the same way
#[derive(Debug, Clone, Copy)]
pub struct AutoPrompter {
    pub accept: bool,
}

impl AutoPrompter {
    pub fn accept() -> Self {
        Self { accept: true }
    }

    pub fn decline() -> Self {
        Self { accept: false }
    }
}

#[async_trait]
impl Prompter for AutoPrompter {
    async fn prompt_user_action(&self, text: &str) -> bool {
        tracing::debug!(text, accept = self.accept, "Auto-answered user action");
        self.accept
    }

    async fn prompt_failure_decision(&self, text: &str) -> bool {
        tracing::debug!(text, accept = self.accept, "Auto-answered failure decision");
        self.accept
    }
}

/// A question forwarded to a UI
#[derive(Debug)]
pub struct PromptRequest {
    pub kind: PromptKind,
    pub text: String,
    pub reply: oneshot::Sender<bool>,
}

/// Forwards prompts over a channel and awaits the reply
///
/// A dropped reply sender or a closed channel counts as "no".
#[derive(Debug, Clone)]
pub struct ChannelPrompter {
    tx: mpsc::UnboundedSender<PromptRequest>,
}

impl ChannelPrompter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PromptRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    async fn ask(&self, kind: PromptKind, text: &str) -> bool {
        let (reply, answer) = oneshot::channel();
        let request = PromptRequest {
            kind,
            text: text.to_string(),
            reply,
        };
        if self.tx.send(request).is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

#[async_trait]
impl Prompter for ChannelPrompter {
    async fn prompt_user_action(&self, text: &str) -> bool {
        self.ask(PromptKind::UserAction, text).await
    }

    async fn prompt_failure_decision(&self, text: &str) -> bool {
        self.ask(PromptKind::FailureDecision, text).await
    }
}

/// Interactive y/N prompt on the terminal
#[derive(Debug, Default)]
pub struct StdinPrompter {
    lock: tokio::sync::Mutex<()>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ask(&self, text: &str) -> bool {
        let _guard = self.lock.lock().await;
        let text = text.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            use std::io::Write;
            eprint!("{} [y/N] ", text);
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => false,
                Ok(_) => parse_answer(&line),
            }
        })
        .await;
        answer.unwrap_or(false)
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn prompt_user_action(&self, text: &str) -> bool {
        self.ask(text).await
    }

    async fn prompt_failure_decision(&self, text: &str) -> bool {
        self.ask(text).await
    }
}

fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Question asked before a command marked as requiring user action
pub(crate) fn user_action_text(command: &Command) -> String {
    command
        .user_prompt
        .clone()
        .unwrap_or_else(|| format!("About to send: {}. Continue?", command.text))
}

/// Question asked before each step of a single-step run
pub(crate) fn single_step_text(step: usize, total: usize, command: &Command) -> String {
    format!("Step {}/{}: {}. Continue?", step, total, command.text)
}

/// Question asked by the `Prompt` failure policy
pub(crate) fn failure_text(command: &Command, severity: Severity) -> String {
    command.failure_prompt.clone().unwrap_or_else(|| {
        format!("Command failed ({}): {}. Continue?", severity, command.text)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer(" YES "));
        assert!(!parse_answer("\n"));
        assert!(!parse_answer("nope"));
    }

    #[test]
    fn test_prompt_texts() {
        let mut cmd = Command::execution("c1", "AT+CFUN=1");
        assert_eq!(user_action_text(&cmd), "About to send: AT+CFUN=1. Continue?");
        assert_eq!(single_step_text(2, 5, &cmd), "Step 2/5: AT+CFUN=1. Continue?");
        assert_eq!(
            failure_text(&cmd, Severity::Warning),
            "Command failed (warning): AT+CFUN=1. Continue?"
        );

        cmd.user_prompt = Some("Insert the SIM card".to_string());
        assert_eq!(user_action_text(&cmd), "Insert the SIM card");
    }

    #[tokio::test]
    async fn test_channel_prompter_replies() {
        let (prompter, mut rx) = ChannelPrompter::new();
        let ui = tokio::spawn(async move {
            let first = rx.recv().await.unwrap();
            assert_eq!(first.kind, PromptKind::UserAction);
            first.reply.send(true).unwrap();

            let second = rx.recv().await.unwrap();
            assert_eq!(second.kind, PromptKind::FailureDecision);
            drop(second.reply);
        });

        assert!(prompter.prompt_user_action("go?").await);
        assert!(!prompter.prompt_failure_decision("continue?").await);
        ui.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_prompter_closed_declines() {
        let (prompter, rx) = ChannelPrompter::new();
        drop(rx);
        assert!(!prompter.prompt_user_action("go?").await);
    }
}
