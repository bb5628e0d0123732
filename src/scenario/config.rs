//! Scenario file types
//!
//! A scenario is a YAML file holding a named list of test cases in the same
//! camelCase shape the tree model serializes to.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::model::{CaseTree, TestCase};

/// A complete scenario loaded from a YAML file
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Scenario {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Root test cases, in run order
    pub cases: Vec<TestCase>,
}

impl Scenario {
    /// Parse a scenario from YAML text
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::scenario_parse(path, e))
    }

    /// Build the case tree, enforcing the tree invariants
    pub fn to_tree(&self) -> Result<CaseTree> {
        CaseTree::from_cases(self.cases.clone())
    }
}

/// Load and parse a scenario file
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    Scenario::from_yaml(&content, path)
}
