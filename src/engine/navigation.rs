//! Execution order over the case tree
//!
//! Document order: a case's commands first, then its sub-cases in list
//! order, depth-first. Jumps and listener continuations are resolved here.

use serde::{Deserialize, Serialize};

use crate::model::{CaseTree, MAX_DEPTH};

/// Position of a command in the tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRef {
    pub case_id: String,
    pub index: usize,
}

impl StepRef {
    pub fn new(case_id: impl Into<String>, index: usize) -> Self {
        Self {
            case_id: case_id.into(),
            index,
        }
    }
}

impl std::fmt::Display for StepRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.case_id, self.index)
    }
}

/// Locate a command by id, searching commands before sub-cases
///
/// Cases deeper than [`MAX_DEPTH`] are never searched.
pub fn find_command_location(tree: &CaseTree, command_id: &str) -> Option<StepRef> {
    tree.roots()
        .iter()
        .find_map(|root| find_in_case(tree, root, command_id))
}

fn find_in_case(tree: &CaseTree, case_id: &str, command_id: &str) -> Option<StepRef> {
    let node = tree.node(case_id)?;
    if node.depth > MAX_DEPTH {
        return None;
    }
    if let Some(index) = node.case.commands.iter().position(|c| c.id == command_id) {
        return Some(StepRef::new(case_id, index));
    }
    node.children
        .iter()
        .find_map(|child| find_in_case(tree, child, command_id))
}

/// First command of a case, or of its first sub-case that has one
pub fn first_executable_in(tree: &CaseTree, case_id: &str) -> Option<StepRef> {
    let case = tree.case(case_id)?;
    if !case.commands.is_empty() {
        return Some(StepRef::new(case_id, 0));
    }
    tree.children(case_id)
        .iter()
        .find_map(|child| first_executable_in(tree, child))
}

/// Step following `(case_id, index)` in document order
///
/// Tries the next command of the same case, then the case's sub-cases, then
/// the following siblings of the case and of its ancestors. The walk stays
/// inside the root the position belongs to.
pub fn get_next_step_from(tree: &CaseTree, case_id: &str, index: usize) -> Option<StepRef> {
    let case = tree.case(case_id)?;
    if index + 1 < case.commands.len() {
        return Some(StepRef::new(case_id, index + 1));
    }

    if let Some(step) = tree
        .children(case_id)
        .iter()
        .find_map(|child| first_executable_in(tree, child))
    {
        return Some(step);
    }

    let mut current = case_id;
    while let Some(parent) = tree.parent(current) {
        let siblings = tree.children(parent);
        let position = siblings.iter().position(|s| s == current)?;
        if let Some(step) = siblings[position + 1..]
            .iter()
            .find_map(|sibling| first_executable_in(tree, sibling))
        {
            return Some(step);
        }
        current = parent;
    }
    None
}

/// Whether a sub-case may be added below `case_id`
pub fn can_add_sub_case(tree: &CaseTree, case_id: &str) -> bool {
    tree.can_add_sub_case(case_id)
}

/// Every step reachable from the first command of `root_id`, in order
pub fn walk_from_root(tree: &CaseTree, root_id: &str) -> Vec<StepRef> {
    let mut steps = Vec::new();
    let mut next = first_executable_in(tree, root_id);
    while let Some(step) = next {
        next = get_next_step_from(tree, &step.case_id, step.index);
        steps.push(step);
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Command, TestCase};

    /// root(a1, a2) → [mid(b1) → [leaf(c1, c2)], empty → [tail(e1)], last(d1)]
    fn tree() -> CaseTree {
        let leaf = TestCase::new("leaf", "leaf")
            .with_command(Command::execution("c1", "AT+C1"))
            .with_command(Command::execution("c2", "AT+C2"));
        let mid = TestCase::new("mid", "mid")
            .with_command(Command::execution("b1", "AT+B1"))
            .with_sub_case(leaf);
        let empty = TestCase::new("empty", "no commands")
            .with_sub_case(TestCase::new("tail", "tail").with_command(Command::execution("e1", "AT+E1")));
        let last = TestCase::new("last", "last").with_command(Command::execution("d1", "AT+D1"));
        let root = TestCase::new("root", "root")
            .with_command(Command::execution("a1", "AT+A1"))
            .with_command(Command::execution("a2", "AT+A2"))
            .with_sub_case(mid)
            .with_sub_case(empty)
            .with_sub_case(last);
        let other = TestCase::new("other", "other").with_command(Command::execution("z1", "AT+Z"));
        CaseTree::from_cases(vec![root, other]).unwrap()
    }

    #[test]
    fn test_find_command_location() {
        let tree = tree();
        assert_eq!(find_command_location(&tree, "c2"), Some(StepRef::new("leaf", 1)));
        assert_eq!(find_command_location(&tree, "z1"), Some(StepRef::new("other", 0)));
        assert_eq!(find_command_location(&tree, "nope"), None);
    }

    #[test]
    fn test_next_step_rules() {
        let tree = tree();
        assert_eq!(get_next_step_from(&tree, "root", 0), Some(StepRef::new("root", 1)));
        assert_eq!(get_next_step_from(&tree, "root", 1), Some(StepRef::new("mid", 0)));
        assert_eq!(get_next_step_from(&tree, "mid", 0), Some(StepRef::new("leaf", 0)));
        assert_eq!(get_next_step_from(&tree, "leaf", 1), Some(StepRef::new("tail", 0)));
        assert_eq!(get_next_step_from(&tree, "tail", 0), Some(StepRef::new("last", 0)));
        assert_eq!(get_next_step_from(&tree, "last", 0), None);
        assert_eq!(get_next_step_from(&tree, "missing", 0), None);
    }

    #[test]
    fn test_walk_visits_every_command_once_in_document_order() {
        let tree = tree();
        let ids: Vec<String> = walk_from_root(&tree, "root")
            .iter()
            .filter_map(|s| tree.command(&s.case_id, s.index))
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, vec!["a1", "a2", "b1", "c1", "c2", "e1", "d1"]);
    }

    #[test]
    fn test_can_add_sub_case_follows_depth() {
        let tree = tree();
        assert!(can_add_sub_case(&tree, "root"));
        assert!(can_add_sub_case(&tree, "mid"));
        assert!(!can_add_sub_case(&tree, "leaf"));
    }
}
