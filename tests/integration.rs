//! End-to-end tests for the atcase CLI
//!
//! These tests run the real binary against the mock modem:
//! 1. Loading a YAML scenario from tests/fixtures
//! 2. Spawning mock_modem as the device over stdio
//! 3. Checking the report, JSON results and exit codes

use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;

/// Test context with paths and an isolated config directory
struct TestContext {
    /// Keeps the config directory alive for the test
    _temp_dir: tempfile::TempDir,
    /// Config directory (XDG_CONFIG_HOME)
    config_dir: PathBuf,
    /// Path to fixtures directory
    fixtures_dir: PathBuf,
}

/// Result of one CLI invocation
struct CliOutput {
    stdout: String,
    stderr: String,
    code: Option<i32>,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("config");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        let fixtures_dir = PathBuf::from(manifest_dir).join("tests").join("fixtures");

        Self {
            _temp_dir: temp_dir,
            config_dir,
            fixtures_dir,
        }
    }

    fn scenario(&self) -> String {
        self.fixtures_dir
            .join("modem.yaml")
            .display()
            .to_string()
    }

    /// Run the CLI with the given arguments
    fn run(&self, args: &[&str]) -> CliOutput {
        let output = Command::new(env!("CARGO_BIN_EXE_atcase"))
            .args(args)
            .env("XDG_CONFIG_HOME", &self.config_dir)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to run atcase");

        CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        }
    }

    /// Run cases of the fixture scenario against the mock modem
    fn run_against_modem(&self, extra: &[&str]) -> CliOutput {
        let scenario = self.scenario();
        let mut args = vec![
            "run",
            scenario.as_str(),
            "--spawn",
            env!("CARGO_BIN_EXE_mock_modem"),
            "--yes",
        ];
        args.extend_from_slice(extra);
        self.run(&args)
    }
}

fn case_result<'a>(results: &'a Value, case_id: &str) -> &'a Value {
    results
        .as_array()
        .and_then(|all| all.iter().find(|r| r["caseId"] == case_id))
        .unwrap_or_else(|| panic!("No result for {} in {}", case_id, results))
}

// ============== Tests ==============

#[test]
fn test_run_all_cases_json() {
    let ctx = TestContext::new();
    let output = ctx.run_against_modem(&["--json"]);

    assert_eq!(
        output.code,
        Some(1),
        "Expected exit code 1 for a failed case, stderr: {}",
        output.stderr
    );

    let results: Value = serde_json::from_str(&output.stdout)
        .unwrap_or_else(|e| panic!("Invalid JSON ({}): {}", e, output.stdout));

    let registration = case_result(&results, "registration");
    assert_eq!(registration["status"], "success", "{}", registration);
    assert_eq!(registration["passedCommands"], 5);
    assert_eq!(registration["totalCommands"], 5);

    let failing = case_result(&results, "failing");
    assert_eq!(failing["status"], "failed");
    assert_eq!(failing["passedCommands"], 0);
    assert_eq!(failing["failedCommands"], 1);
    assert_eq!(failing["failureLogs"][0]["commandText"], "AT+BOGUS");
}

#[test]
fn test_run_single_case_by_unique_id() {
    let ctx = TestContext::new();
    let output = ctx.run_against_modem(&["--case", "REG-001"]);

    assert_eq!(
        output.code,
        Some(0),
        "Expected success, stdout: {}\nstderr: {}",
        output.stdout,
        output.stderr
    );
    assert!(
        output.stdout.contains("Network registration"),
        "Expected case name in report: {}",
        output.stdout
    );
    assert!(!output.stdout.contains("Unsupported command"));
}

#[test]
fn test_run_unknown_case() {
    let ctx = TestContext::new();
    let output = ctx.run_against_modem(&["--case", "NOPE-404"]);

    assert_eq!(output.code, Some(2));
    assert!(
        output.stderr.contains("NOPE-404"),
        "Expected unknown case in error: {}",
        output.stderr
    );
}

#[test]
fn test_run_without_device() {
    let ctx = TestContext::new();
    let scenario = ctx.scenario();
    let output = ctx.run(&["run", &scenario]);

    assert_eq!(output.code, Some(2));
    assert!(output.stderr.contains("--spawn"), "stderr: {}", output.stderr);
}

#[test]
fn test_check_prints_execution_order() {
    let ctx = TestContext::new();
    let scenario = ctx.scenario();
    let output = ctx.run(&["check", &scenario]);

    assert_eq!(output.code, Some(0), "stderr: {}", output.stderr);
    assert!(output.stdout.contains("no problems found"), "{}", output.stdout);

    let creg = output.stdout.find("AT+CREG?").expect("AT+CREG? listed");
    let csq = output.stdout.find("AT+CSQ").expect("AT+CSQ listed");
    assert!(creg < csq, "Expected AT+CREG? before AT+CSQ: {}", output.stdout);
    assert!(output.stdout.contains("[failing#0]"));
}

#[test]
fn test_render_substitutes_variables() {
    let ctx = TestContext::new();

    let output = ctx.run(&["render", "AT+CGDCONT=1,\"IP\",\"{apn}\"", "--var", "apn=cmnet"]);
    assert_eq!(output.stdout.trim(), "AT+CGDCONT=1,\"IP\",\"cmnet\"");

    let output = ctx.run(&["render", "AT+COPS={mode|0}"]);
    assert_eq!(output.stdout.trim(), "AT+COPS={mode|0}");

    let output = ctx.run(&["render", "AT+COPS={mode|0}", "--defaults"]);
    assert_eq!(output.stdout.trim(), "AT+COPS=0");
}
