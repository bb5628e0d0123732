//! Variable substitution in outgoing command templates
//!
//! Recognized placeholders for a variable `v`: `{v}`, `{P1.v}`, `{P2.v}` and
//! `{v|default}`. Unresolved placeholders are left in place, so substituting
//! an already-substituted string is a no-op.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::variables::VariableStore;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(?:P[12]\.)?([^{}|.\s]+)(?:\|([^{}]*))?\}").expect("placeholder regex is valid")
});

/// How unresolved `{v|default}` placeholders are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultPolicy {
    /// Leave `{v|default}` intact when `v` is unset
    #[default]
    Passthrough,
    /// Replace `{v|default}` with `default` when `v` is unset
    Apply,
}

/// Passes over values that themselves hold placeholders
const MAX_PASSES: usize = 8;

/// Rewrite `template` against the variable store
///
/// Stored values may contain placeholders of their own, so the template is
/// rewritten until it stops changing. Values that refer to each other in a
/// cycle stop after `MAX_PASSES` passes.
pub fn substitute_variables(template: &str, store: &VariableStore, policy: DefaultPolicy) -> String {
    let mut current = template.to_string();
    for _ in 0..MAX_PASSES {
        let next = substitute_once(&current, store, policy);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn substitute_once(template: &str, store: &VariableStore, policy: DefaultPolicy) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            if let Some(value) = store.get(name) {
                return value.to_string();
            }
            match (policy, caps.get(2)) {
                (DefaultPolicy::Apply, Some(default)) => default.as_str().to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Names of all placeholders referenced by `template`
pub fn placeholder_names(template: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}
