//! Variable store shared by listeners and command templates

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A value extracted from an incoming line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

impl Variable {
    pub fn now(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Extracted values keyed by variable name
pub type Variables = BTreeMap<String, Variable>;

/// Last-write-wins mapping of variable names to values
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    vars: Variables,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.value.as_str())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), Variable::now(value));
    }

    /// Merge extracted values, newer entries overwrite older ones by key
    pub fn merge(&mut self, extracted: Variables) {
        for (name, var) in extracted {
            match self.vars.get(&name) {
                Some(existing) if existing.timestamp > var.timestamp => {}
                _ => {
                    self.vars.insert(name, var);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn snapshot(&self) -> Variables {
        self.vars.clone()
    }
}
