//! CLI command definitions
//!
//! Defines the clap commands for the atcase CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a scenario file and show its execution order
    Check {
        /// Path to the YAML scenario
        scenario: PathBuf,
    },

    /// Run test cases of a scenario against a device
    Run {
        /// Path to the YAML scenario
        scenario: PathBuf,

        /// Case id or unique id to run (default: every root case)
        /// Can be specified multiple times: --case REG-001 --case signal
        #[arg(long = "case", short = 'c')]
        cases: Vec<String>,

        /// Device simulator to spawn and talk to over stdio
        #[arg(long, conflicts_with = "tcp")]
        spawn: Option<PathBuf>,

        /// Arguments for the spawned program
        #[arg(last = true)]
        args: Vec<String>,

        /// Serial port exposed over TCP (host:port)
        #[arg(long)]
        tcp: Option<String>,

        /// Answer every prompt with yes
        #[arg(long, short = 'y')]
        yes: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Mirror logs into a file in the platform data directory
        #[arg(long)]
        log: bool,

        /// Mirror logs into a file in this directory instead
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Substitute variables into a command template
    Render {
        /// Command template, e.g. 'AT+CGDCONT=1,"IP","{apn|internet}"'
        template: String,

        /// Variable assignment name=value, can be repeated
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Replace {name|default} with its default when name is unset
        #[arg(long)]
        defaults: bool,
    },
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    if name.is_empty() {
        return Err("variable name is empty".to_string());
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("apn=cmnet").unwrap(),
            ("apn".to_string(), "cmnet".to_string())
        );
        assert_eq!(
            parse_var("cmd=AT+X=1").unwrap(),
            ("cmd".to_string(), "AT+X=1".to_string())
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }
}
