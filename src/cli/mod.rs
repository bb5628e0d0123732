//! CLI command handling
//!
//! Builds the engine for a scenario, runs the requested cases and formats
//! the output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{logging, paths, Error, Result};
use crate::engine::{
    substitute_variables, DefaultPolicy, Engine, EngineEvent, RunOutcome, RunResult,
    VariableStore,
};
use crate::prompt::{AutoPrompter, Prompter, StdinPrompter};
use crate::scenario::{check_tree, load_scenario, report};
use crate::transport::{StreamTransport, Transport};

/// Dispatch a CLI command
///
/// Returns `false` when the command ran but its checks did not pass.
pub async fn dispatch(command: Commands, config: Config, verbose: bool) -> Result<bool> {
    match command {
        Commands::Check { scenario } => {
            logging::init_cli(verbose);
            let loaded = load_scenario(&scenario)?;
            let tree = loaded.to_tree()?;
            let report = check_tree(&tree);
            report::print_check(&loaded.name, &report);
            Ok(true)
        }

        Commands::Run {
            scenario,
            cases,
            spawn,
            args,
            tcp,
            yes,
            json,
            log,
            log_dir,
        } => {
            let log_dir = log_dir.or_else(|| if log { paths::log_dir() } else { None });
            let _guard = match log_dir {
                Some(dir) => {
                    let (path, guard) = logging::init_with_file(&dir, verbose)?;
                    tracing::info!(path = %path.display(), "Logging to file");
                    Some(guard)
                }
                None => {
                    logging::init_cli(verbose);
                    None
                }
            };

            let options = RunOptions {
                scenario,
                cases,
                spawn,
                args,
                tcp,
                yes,
                json,
            };
            run(options, config).await
        }

        Commands::Render {
            template,
            vars,
            defaults,
        } => {
            let mut store = VariableStore::new();
            for (name, value) in vars {
                store.set(name, value);
            }
            let policy = if defaults || config.engine.apply_placeholder_defaults {
                DefaultPolicy::Apply
            } else {
                DefaultPolicy::Passthrough
            };
            println!("{}", substitute_variables(&template, &store, policy));
            Ok(true)
        }
    }
}

struct RunOptions {
    scenario: PathBuf,
    cases: Vec<String>,
    spawn: Option<PathBuf>,
    args: Vec<String>,
    tcp: Option<String>,
    yes: bool,
    json: bool,
}

async fn connect(options: &RunOptions, config: &Config) -> Result<Arc<dyn Transport>> {
    let capacity = config.transport.channel_capacity;
    match (&options.spawn, &options.tcp) {
        (Some(program), _) => Ok(Arc::new(
            StreamTransport::spawn(&resolve_program(program), &options.args, capacity).await?,
        )),
        (None, Some(addr)) => Ok(Arc::new(StreamTransport::connect_tcp(addr, capacity).await?)),
        (None, None) => Err(Error::Config(
            "No device given, use --spawn <program> or --tcp <host:port>".to_string(),
        )),
    }
}

/// Programs given with a path are made absolute, bare names go through PATH
fn resolve_program(program: &Path) -> PathBuf {
    if program.components().count() > 1 {
        program.canonicalize().unwrap_or_else(|_| program.to_path_buf())
    } else {
        program.to_path_buf()
    }
}

async fn run(options: RunOptions, config: Config) -> Result<bool> {
    let scenario = load_scenario(&options.scenario)?;
    let tree = scenario.to_tree()?;

    let targets: Vec<String> = if options.cases.is_empty() {
        tree.roots().to_vec()
    } else {
        options.cases.clone()
    };
    for target in &targets {
        if tree.resolve_case_id(target).is_none() {
            return Err(Error::CaseNotFound(target.clone()));
        }
    }

    let transport = connect(&options, &config).await?;
    let prompter: Arc<dyn Prompter> = if options.yes {
        Arc::new(AutoPrompter::accept())
    } else {
        Arc::new(StdinPrompter::new())
    };

    let engine = Engine::new(tree, transport, prompter, config);
    if let Some(mut events) = engine.take_event_receiver() {
        let show = !options.json;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let EngineEvent::Status { level, message } = event {
                    if show {
                        report::print_status(level, &message);
                    }
                }
            }
        });
    }
    engine.start();

    if !options.json {
        println!(
            "\n{} {}",
            "Running Scenario:".blue().bold(),
            scenario.name.white().bold()
        );
        if let Some(desc) = &scenario.description {
            println!("  {}", desc.dimmed());
        }
    }

    let mut results: Vec<RunResult> = Vec::new();
    for target in &targets {
        match engine.run_case(target).await? {
            RunOutcome::Completed(result) => {
                if !options.json {
                    println!();
                    report::print_result(&result);
                }
                results.push(result);
            }
            RunOutcome::Paused => {
                tracing::warn!(case = %target, "Run paused before completion");
            }
        }
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        report::print_summary(&results);
    }

    Ok(results.iter().all(|r| !r.is_failed()))
}
