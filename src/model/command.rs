//! Command steps: outgoing executions and URC listeners
//!
//! A command's kind is fixed when it is created. The kind-specific fields
//! live in a private body so that no mutation path can turn an execution
//! into a listener or back.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Line ending appended to an outgoing payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    None,
    Lf,
    Cr,
    #[default]
    CrLf,
}

impl LineEnding {
    /// Bytes appended after the payload
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::None => b"",
            Self::Lf => b"\n",
            Self::Cr => b"\r",
            Self::CrLf => b"\r\n",
        }
    }
}

/// Encoding of an outgoing payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    #[serde(alias = "string", alias = "utf8")]
    Text,
    Hex,
}

/// Port a payload is sent to in dual-channel setups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    #[default]
    All,
    P1,
    P2,
}

/// Response validation for an execution command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "method", content = "pattern", rename_all = "lowercase")]
pub enum Validation {
    /// Fire-and-forget
    #[default]
    None,
    /// Accumulated response contains the pattern
    Contains(String),
    /// Response line equals the pattern after trimming
    Equals(String),
    /// Accumulated response matches the regex
    Regex(String),
}

impl Validation {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Severity of a command failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Command-level failure handling
///
/// Only `Stop` overrides the case policy. `Retry` re-sends a validated
/// command before the failure reaches the case policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailureHandling {
    Stop,
    #[default]
    Continue,
    Prompt,
    Retry,
}

/// Execution status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// How a listener pattern is compared with an incoming line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MatchMode {
    #[default]
    Contains,
    Exact,
    StartsWith,
    EndsWith,
    Regex,
}

/// Whether a listener stays armed after its first match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListenMode {
    #[default]
    Permanent,
    Once,
}

/// How values are pulled out of a matched line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseType {
    #[default]
    Regex,
    Split,
    Json,
}

/// Parameter extraction settings of a listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParseConfig {
    #[serde(default)]
    pub parse_type: ParseType,
    /// Regex, literal separator, or ignored for Json
    #[serde(default)]
    pub parse_pattern: String,
    /// Extraction key (group name/index, split index, json path) to variable name
    #[serde(default)]
    pub parameter_map: BTreeMap<String, String>,
}

/// What happens after a listener matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnReceived {
    #[default]
    Continue,
    Jump,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JumpConfig {
    #[serde(default)]
    pub on_received: OnReceived,
    /// Target command id for `Jump`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

/// Fields specific to execution commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSpec {
    /// Falls back to the transport default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_ending: Option<LineEnding>,
    #[serde(default)]
    pub data_format: DataFormat,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub validation: Validation,
}

/// Fields specific to URC listener commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
    pub pattern: String,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub listen_mode: ListenMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_config: Option<ParseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump_config: Option<JumpConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
enum CommandBody {
    #[serde(rename = "execution")]
    Execution(ExecutionSpec),
    #[serde(rename = "urc")]
    UrcListener(ListenerSpec),
}

/// Kind of a command, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Execution,
    UrcListener,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution => write!(f, "execution"),
            Self::UrcListener => write!(f, "urc listener"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A leaf step of a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    /// Outgoing payload template, or the display label of a listener
    #[serde(alias = "command")]
    pub text: String,
    #[serde(default = "default_true")]
    pub selected: bool,
    #[serde(default)]
    pub status: CommandStatus,
    /// Fixed delay after the command before the next one starts
    #[serde(default)]
    pub wait_time_ms: u64,
    #[serde(default)]
    pub failure_severity: Severity,
    #[serde(default)]
    pub failure_handling: FailureHandling,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub requires_user_action: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_prompt: Option<String>,
    #[serde(flatten)]
    body: CommandBody,
}

impl Command {
    fn with_body(id: impl Into<String>, text: impl Into<String>, body: CommandBody) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            selected: true,
            status: CommandStatus::Pending,
            wait_time_ms: 0,
            failure_severity: Severity::Error,
            failure_handling: FailureHandling::Continue,
            max_attempts: None,
            retry_delay_ms: None,
            requires_user_action: false,
            user_prompt: None,
            failure_prompt: None,
            body,
        }
    }

    /// Create an execution command sending `text`
    pub fn execution(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_body(id, text, CommandBody::Execution(ExecutionSpec::default()))
    }

    /// Create a URC listener matching `pattern`
    pub fn listener(id: impl Into<String>, pattern: impl Into<String>, match_mode: MatchMode) -> Self {
        let pattern = pattern.into();
        Self::with_body(
            id,
            pattern.clone(),
            CommandBody::UrcListener(ListenerSpec {
                pattern,
                match_mode,
                ..ListenerSpec::default()
            }),
        )
    }

    pub fn kind(&self) -> CommandKind {
        match self.body {
            CommandBody::Execution(_) => CommandKind::Execution,
            CommandBody::UrcListener(_) => CommandKind::UrcListener,
        }
    }

    pub fn is_listener(&self) -> bool {
        self.kind() == CommandKind::UrcListener
    }

    pub fn execution_spec(&self) -> Option<&ExecutionSpec> {
        match &self.body {
            CommandBody::Execution(spec) => Some(spec),
            CommandBody::UrcListener(_) => None,
        }
    }

    pub fn execution_spec_mut(&mut self) -> Option<&mut ExecutionSpec> {
        match &mut self.body {
            CommandBody::Execution(spec) => Some(spec),
            CommandBody::UrcListener(_) => None,
        }
    }

    pub fn listener_spec(&self) -> Option<&ListenerSpec> {
        match &self.body {
            CommandBody::UrcListener(spec) => Some(spec),
            CommandBody::Execution(_) => None,
        }
    }

    pub fn listener_spec_mut(&mut self) -> Option<&mut ListenerSpec> {
        match &mut self.body {
            CommandBody::UrcListener(spec) => Some(spec),
            CommandBody::Execution(_) => None,
        }
    }

    /// Set response validation, no-op on listeners
    pub fn with_validation(mut self, validation: Validation) -> Self {
        if let Some(spec) = self.execution_spec_mut() {
            spec.validation = validation;
        }
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        if let Some(spec) = self.execution_spec_mut() {
            spec.timeout_ms = Some(timeout_ms);
        }
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.failure_severity = severity;
        self
    }

    pub fn with_failure_handling(mut self, handling: FailureHandling) -> Self {
        self.failure_handling = handling;
        self
    }

    /// Make a listener one-shot with an optional timeout
    pub fn once(mut self, listen_timeout_ms: Option<u64>) -> Self {
        if let Some(spec) = self.listener_spec_mut() {
            spec.listen_mode = ListenMode::Once;
            spec.listen_timeout_ms = listen_timeout_ms;
        }
        self
    }

    pub fn with_parse_config(mut self, config: ParseConfig) -> Self {
        if let Some(spec) = self.listener_spec_mut() {
            spec.parse_config = Some(config);
        }
        self
    }

    pub fn with_jump(mut self, config: JumpConfig) -> Self {
        if let Some(spec) = self.listener_spec_mut() {
            spec.jump_config = Some(config);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_from_json() {
        let cmd: Command = serde_json::from_str(
            r#"{
                "id": "c1",
                "type": "execution",
                "command": "AT+CSQ",
                "validation": {"method": "contains", "pattern": "+CSQ:"},
                "timeoutMs": 2000,
                "lineEnding": "crlf"
            }"#,
        )
        .unwrap();

        assert_eq!(cmd.kind(), CommandKind::Execution);
        assert_eq!(cmd.text, "AT+CSQ");
        assert!(cmd.selected);
        let spec = cmd.execution_spec().unwrap();
        assert_eq!(spec.validation, Validation::Contains("+CSQ:".to_string()));
        assert_eq!(spec.timeout_ms, Some(2000));
        assert_eq!(spec.line_ending, Some(LineEnding::CrLf));
    }

    #[test]
    fn test_listener_from_json() {
        let cmd: Command = serde_json::from_str(
            r#"{
                "id": "u1",
                "type": "urc",
                "text": "network registration",
                "pattern": "+CREG:",
                "matchMode": "startsWith",
                "listenMode": "once",
                "listenTimeoutMs": 3000,
                "jumpConfig": {"onReceived": "jump", "targetId": "c9"}
            }"#,
        )
        .unwrap();

        assert!(cmd.is_listener());
        let spec = cmd.listener_spec().unwrap();
        assert_eq!(spec.match_mode, MatchMode::StartsWith);
        assert_eq!(spec.listen_mode, ListenMode::Once);
        assert_eq!(spec.listen_timeout_ms, Some(3000));
        assert_eq!(
            spec.jump_config.as_ref().and_then(|j| j.target_id.as_deref()),
            Some("c9")
        );
    }

    #[test]
    fn test_kind_specific_builders_ignore_other_kind() {
        let cmd = Command::listener("u1", "RING", MatchMode::Exact)
            .with_validation(Validation::Equals("OK".to_string()));
        assert!(cmd.execution_spec().is_none());

        let cmd = Command::execution("c1", "AT").once(Some(100));
        assert!(cmd.listener_spec().is_none());
        assert_eq!(cmd.kind(), CommandKind::Execution);
    }

    #[test]
    fn test_line_ending_bytes() {
        assert_eq!(LineEnding::None.as_bytes(), b"");
        assert_eq!(LineEnding::CrLf.as_bytes(), b"\r\n");
    }
}
