//! Terminal output for runs and checks

use colored::Colorize;

use super::check::CheckReport;
use crate::engine::{RunResult, StatusLevel};
use crate::model::CaseStatus;

fn status_label(status: CaseStatus) -> colored::ColoredString {
    match status {
        CaseStatus::Success => "✓ success".green().bold(),
        CaseStatus::Partial => "~ partial".yellow().bold(),
        CaseStatus::Failed => "✗ failed".red().bold(),
        CaseStatus::Running => "… running".cyan(),
        CaseStatus::Pending => "- pending".dimmed(),
    }
}

/// Print one result and its sub-results
pub fn print_result(result: &RunResult) {
    print_result_at(result, 0);
}

fn print_result_at(result: &RunResult, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{}{} {} {}",
        indent,
        status_label(result.status),
        result.case_name.white().bold(),
        format!("({})", result.case_id).dimmed()
    );
    println!(
        "{}  {}/{} passed, {} failed, {} warning(s), {} error(s) in {}ms",
        indent,
        result.passed_commands,
        result.total_commands,
        result.failed_commands,
        result.warnings,
        result.errors,
        result.duration_ms
    );
    for log in &result.failure_logs {
        let at = match log.command_index {
            Some(i) => format!("#{}", i),
            None => "run".to_string(),
        };
        println!(
            "{}  {} {} {}: {}",
            indent,
            "✗".red(),
            at.dimmed(),
            log.command_text,
            log.error.red()
        );
    }
    for sub in &result.sub_results {
        print_result_at(sub, depth + 1);
    }
}

/// Print the closing line of a run
pub fn print_summary(results: &[RunResult]) {
    let failed = results.iter().filter(|r| r.is_failed()).count();
    let partial = results
        .iter()
        .filter(|r| r.status == CaseStatus::Partial)
        .count();
    let line = format!(
        "{} case(s): {} passed, {} partial, {} failed",
        results.len(),
        results.len() - failed - partial,
        partial,
        failed
    );
    if failed > 0 {
        println!("\n{}", line.red().bold());
    } else if partial > 0 {
        println!("\n{}", line.yellow().bold());
    } else {
        println!("\n{}", line.green().bold());
    }
}

/// Print a status-line message on stderr
pub fn print_status(level: StatusLevel, message: &str) {
    let tag = match level {
        StatusLevel::Info => "info".cyan(),
        StatusLevel::Success => "ok".green(),
        StatusLevel::Warning => "warn".yellow(),
        StatusLevel::Error => "error".red(),
    };
    eprintln!("  [{}] {}", tag, message.dimmed());
}

/// Print warnings and the execution order found by a check
pub fn print_check(name: &str, report: &CheckReport) {
    println!("{} {}", "Scenario:".blue().bold(), name.white().bold());

    if report.warnings.is_empty() {
        println!("  {} no problems found", "✓".green());
    } else {
        println!("\n{}", "Warnings:".yellow());
        for warning in &report.warnings {
            println!("  {} {}", "!".yellow(), warning);
        }
    }

    for (root, steps) in &report.walks {
        println!("\n{} {}", "Execution order:".cyan(), root);
        if steps.is_empty() {
            println!("  {}", "(no commands)".dimmed());
        }
        for (n, step) in steps.iter().enumerate() {
            println!(
                "  {:>3}. {}{} {}",
                n + 1,
                "  ".repeat(step.depth.saturating_sub(1)),
                step.text,
                format!("[{}#{}]", step.case_id, step.index).dimmed()
            );
        }
    }
}
