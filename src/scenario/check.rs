//! Static checks on a scenario
//!
//! Everything reported here is a warning: the engine tolerates all of it at
//! run time (bad regexes never match, unknown jump targets are skipped).

use std::collections::BTreeSet;

use serde::Serialize;

use crate::engine::{compile_pattern, find_command_location, placeholder_names, walk_from_root};
use crate::model::{CaseTree, Command, MatchMode, OnReceived, ParseType, Validation};

/// One step of the document-order walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkStep {
    pub case_id: String,
    pub index: usize,
    pub command_id: String,
    pub text: String,
    pub depth: usize,
}

/// Outcome of checking a scenario
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub warnings: Vec<String>,
    /// Execution order per root case
    pub walks: Vec<(String, Vec<WalkStep>)>,
}

/// Check every command of the tree and compute the execution order
pub fn check_tree(tree: &CaseTree) -> CheckReport {
    let mut report = CheckReport::default();

    let extracted: BTreeSet<&str> = tree
        .walk()
        .iter()
        .filter_map(|id| tree.case(id))
        .flat_map(|case| case.commands.iter())
        .filter_map(|cmd| cmd.listener_spec()?.parse_config.as_ref())
        .flat_map(|pc| pc.parameter_map.values().map(String::as_str))
        .collect();

    for case_id in tree.walk() {
        let Some(case) = tree.case(&case_id) else { continue };
        for cmd in &case.commands {
            check_command(tree, &case_id, cmd, &extracted, &mut report.warnings);
        }
    }

    for root in tree.roots() {
        let steps = walk_from_root(tree, root)
            .into_iter()
            .filter_map(|step| {
                let cmd = tree.command(&step.case_id, step.index)?;
                Some(WalkStep {
                    command_id: cmd.id.clone(),
                    text: cmd.text.clone(),
                    depth: tree.depth_of(&step.case_id).unwrap_or(1),
                    case_id: step.case_id,
                    index: step.index,
                })
            })
            .collect();
        report.walks.push((root.clone(), steps));
    }
    report
}

fn check_command(
    tree: &CaseTree,
    case_id: &str,
    cmd: &Command,
    extracted: &BTreeSet<&str>,
    warnings: &mut Vec<String>,
) {
    let mut bad_regex = |what: &str, pattern: &str| {
        if compile_pattern(pattern).is_none() {
            warnings.push(format!(
                "{}/{}: invalid {} regex '{}' never matches",
                case_id, cmd.id, what, pattern
            ));
        }
    };

    if let Some(spec) = cmd.execution_spec() {
        if let Validation::Regex(pattern) = &spec.validation {
            bad_regex("validation", pattern);
        }
    }

    if let Some(spec) = cmd.listener_spec() {
        if spec.match_mode == MatchMode::Regex {
            bad_regex("listener", &spec.pattern);
        }
        if let Some(pc) = &spec.parse_config {
            if pc.parse_type == ParseType::Regex {
                bad_regex("parse", &pc.parse_pattern);
            }
        }
        if let Some(jump) = &spec.jump_config {
            if jump.on_received == OnReceived::Jump {
                let found = jump
                    .target_id
                    .as_deref()
                    .and_then(|id| find_command_location(tree, id));
                if found.is_none() {
                    warnings.push(format!(
                        "{}/{}: jump target '{}' not found",
                        case_id,
                        cmd.id,
                        jump.target_id.as_deref().unwrap_or("")
                    ));
                }
            }
        }
    }

    if cmd.execution_spec().is_some() {
        for name in placeholder_names(&cmd.text) {
            if !extracted.contains(name.as_str()) {
                warnings.push(format!(
                    "{}/{}: no listener extracts '{}', placeholder stays unresolved",
                    case_id, cmd.id, name
                ));
            }
        }
    }
}
