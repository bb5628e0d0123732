//! atcase - run AT-command test cases against serial devices
//!
//! Loads YAML scenarios of hierarchical test cases and executes them over a
//! spawned device simulator or a TCP-exposed serial port.

use std::path::PathBuf;

use atcase::common::config::Config;
use atcase::{cli, commands::Commands};
use clap::Parser;

#[derive(Parser)]
#[command(name = "atcase", about = "AT-command test case runner")]
#[command(version, long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let result = match config {
        Ok(config) => cli::dispatch(cli.command, config, cli.verbose).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
