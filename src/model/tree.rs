//! Arena form of the test-case tree
//!
//! Cases are stored in a flat map keyed by id with parent/children links,
//! so status updates by id and depth queries don't copy the tree.

use std::collections::{HashMap, HashSet};

use crate::common::{Error, Result};

use super::case::TestCase;
use super::command::Command;

/// Maximum nesting depth: root → sub-case → sub-case
pub const MAX_DEPTH: usize = 3;

/// A case stored in the arena
///
/// `case.sub_cases` is always empty here, the hierarchy is kept in
/// `parent`/`children`.
#[derive(Debug, Clone)]
pub struct CaseNode {
    pub case: TestCase,
    pub parent: Option<String>,
    pub children: Vec<String>,
    /// 1 for roots
    pub depth: usize,
}

/// Test-case tree with O(1) lookup by case id
#[derive(Debug, Clone, Default)]
pub struct CaseTree {
    nodes: HashMap<String, CaseNode>,
    roots: Vec<String>,
}

impl CaseTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from nested cases, enforcing the tree invariants
    pub fn from_cases(cases: Vec<TestCase>) -> Result<Self> {
        let mut tree = Self::new();
        for case in cases {
            tree.add_root_case(case)?;
        }
        Ok(tree)
    }

    /// Nested snapshot of the whole tree
    pub fn to_cases(&self) -> Vec<TestCase> {
        self.roots.iter().filter_map(|id| self.nested(id)).collect()
    }

    fn nested(&self, id: &str) -> Option<TestCase> {
        let node = self.nodes.get(id)?;
        let mut case = node.case.clone();
        case.sub_cases = node.children.iter().filter_map(|c| self.nested(c)).collect();
        Some(case)
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, case_id: &str) -> Option<&CaseNode> {
        self.nodes.get(case_id)
    }

    pub fn case(&self, case_id: &str) -> Option<&TestCase> {
        self.nodes.get(case_id).map(|n| &n.case)
    }

    pub fn case_mut(&mut self, case_id: &str) -> Option<&mut TestCase> {
        self.nodes.get_mut(case_id).map(|n| &mut n.case)
    }

    pub fn children(&self, case_id: &str) -> &[String] {
        self.nodes
            .get(case_id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, case_id: &str) -> Option<&str> {
        self.nodes.get(case_id).and_then(|n| n.parent.as_deref())
    }

    pub fn depth_of(&self, case_id: &str) -> Option<usize> {
        self.nodes.get(case_id).map(|n| n.depth)
    }

    pub fn command(&self, case_id: &str, index: usize) -> Option<&Command> {
        self.case(case_id).and_then(|c| c.commands.get(index))
    }

    pub fn command_mut(&mut self, case_id: &str, index: usize) -> Option<&mut Command> {
        self.case_mut(case_id).and_then(|c| c.commands.get_mut(index))
    }

    /// Case ids in document order (pre-order, roots in list order)
    pub fn walk(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<&String> = self.roots.iter().rev().collect();
        while let Some(id) = stack.pop() {
            out.push(id.clone());
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Case ids of `case_id` and all its descendants, in document order
    pub fn subtree(&self, case_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![case_id.to_string()];
        while let Some(id) = stack.pop() {
            if !self.nodes.contains_key(&id) {
                continue;
            }
            stack.extend(self.children(&id).iter().rev().cloned());
            out.push(id);
        }
        out
    }

    /// Levels below and including `case`, 1 for a leaf
    fn height(case: &TestCase) -> usize {
        1 + case.sub_cases.iter().map(Self::height).max().unwrap_or(0)
    }

    /// Add a new root case with its nested sub-cases
    pub fn add_root_case(&mut self, case: TestCase) -> Result<()> {
        if Self::height(&case) > MAX_DEPTH {
            return Err(Error::depth_exceeded(&case.id, MAX_DEPTH));
        }
        self.check_ids(&case)?;
        let id = case.id.clone();
        self.insert(case, None, 1);
        self.roots.push(id);
        Ok(())
    }

    /// Attach a case (with its sub-cases) below `parent_id`
    pub fn add_sub_case(&mut self, parent_id: &str, case: TestCase) -> Result<()> {
        let parent_depth = self
            .depth_of(parent_id)
            .ok_or_else(|| Error::CaseNotFound(parent_id.to_string()))?;
        if parent_depth + Self::height(&case) > MAX_DEPTH {
            return Err(Error::depth_exceeded(&case.id, MAX_DEPTH));
        }
        self.check_ids(&case)?;
        let id = case.id.clone();
        self.insert(case, Some(parent_id.to_string()), parent_depth + 1);
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(id);
        }
        Ok(())
    }

    /// Whether a sub-case may be added below `case_id`
    pub fn can_add_sub_case(&self, case_id: &str) -> bool {
        self.depth_of(case_id).is_some_and(|d| d < MAX_DEPTH)
    }

    fn check_ids(&self, case: &TestCase) -> Result<()> {
        let mut case_ids = HashSet::new();
        let mut unique_ids = HashSet::new();
        let mut command_ids = HashSet::new();
        let mut stack = vec![case];
        while let Some(c) = stack.pop() {
            if self.nodes.contains_key(&c.id) || !case_ids.insert(c.id.as_str()) {
                return Err(Error::DuplicateId(c.id.clone()));
            }
            if !c.unique_id.is_empty()
                && (self.find_case_by_unique_id(&c.unique_id).is_some()
                    || !unique_ids.insert(c.unique_id.as_str()))
            {
                return Err(Error::DuplicateUniqueId(c.unique_id.clone()));
            }
            for cmd in &c.commands {
                if self.contains_command(&cmd.id) || !command_ids.insert(cmd.id.as_str()) {
                    return Err(Error::DuplicateId(cmd.id.clone()));
                }
            }
            stack.extend(c.sub_cases.iter());
        }
        Ok(())
    }

    fn insert(&mut self, mut case: TestCase, parent: Option<String>, depth: usize) {
        let sub_cases = std::mem::take(&mut case.sub_cases);
        let id = case.id.clone();
        let children = sub_cases.iter().map(|c| c.id.clone()).collect();
        self.nodes.insert(
            id.clone(),
            CaseNode {
                case,
                parent,
                children,
                depth,
            },
        );
        for sub in sub_cases {
            self.insert(sub, Some(id.clone()), depth + 1);
        }
    }

    fn contains_command(&self, command_id: &str) -> bool {
        self.nodes
            .values()
            .any(|n| n.case.commands.iter().any(|c| c.id == command_id))
    }

    /// Resolve a case by its stable external reference
    pub fn find_case_by_unique_id(&self, unique_id: &str) -> Option<&str> {
        if unique_id.is_empty() {
            return None;
        }
        self.nodes
            .values()
            .find(|n| n.case.unique_id == unique_id)
            .map(|n| n.case.id.as_str())
    }

    /// Resolve a case by id, falling back to its unique id
    pub fn resolve_case_id(&self, reference: &str) -> Option<String> {
        if self.nodes.contains_key(reference) {
            return Some(reference.to_string());
        }
        self.find_case_by_unique_id(reference).map(str::to_string)
    }

    /// Deep-copy `source_id` under `parent_id` with fresh ids
    ///
    /// The clone is ephemeral: its `unique_id` and those of its sub-cases are
    /// left empty. Returns the id of the new case.
    pub fn clone_case_as_sub_case(&mut self, source_id: &str, parent_id: &str) -> Result<String> {
        let mut copy = self
            .nested(source_id)
            .ok_or_else(|| Error::CaseNotFound(source_id.to_string()))?;
        fn refresh(case: &mut TestCase, renamed: &mut HashMap<String, String>) {
            case.id = uuid::Uuid::new_v4().to_string();
            case.unique_id.clear();
            case.is_running = false;
            case.status = Default::default();
            case.current_command = 0;
            for cmd in &mut case.commands {
                let fresh = uuid::Uuid::new_v4().to_string();
                renamed.insert(std::mem::replace(&mut cmd.id, fresh.clone()), fresh);
                cmd.status = Default::default();
            }
            for sub in &mut case.sub_cases {
                refresh(sub, renamed);
            }
        }
        // Jumps inside the copied subtree follow the copy
        fn retarget(case: &mut TestCase, renamed: &HashMap<String, String>) {
            for cmd in &mut case.commands {
                let jump = cmd
                    .listener_spec_mut()
                    .and_then(|spec| spec.jump_config.as_mut());
                if let Some(target) = jump.and_then(|j| j.target_id.as_mut()) {
                    if let Some(fresh) = renamed.get(target.as_str()) {
                        *target = fresh.clone();
                    }
                }
            }
            for sub in &mut case.sub_cases {
                retarget(sub, renamed);
            }
        }
        let mut renamed = HashMap::new();
        refresh(&mut copy, &mut renamed);
        retarget(&mut copy, &renamed);
        let id = copy.id.clone();
        self.add_sub_case(parent_id, copy)?;
        Ok(id)
    }

    /// Set the `selected` flag of a command anywhere in the tree
    pub fn set_command_selected(&mut self, command_id: &str, selected: bool) -> Result<()> {
        let cmd = self
            .nodes
            .values_mut()
            .flat_map(|n| n.case.commands.iter_mut())
            .find(|c| c.id == command_id)
            .ok_or_else(|| Error::CommandNotFound(command_id.to_string()))?;
        cmd.selected = selected;
        Ok(())
    }

    pub fn set_case_selected(&mut self, case_id: &str, selected: bool) -> Result<()> {
        let case = self
            .case_mut(case_id)
            .ok_or_else(|| Error::CaseNotFound(case_id.to_string()))?;
        case.selected = selected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Command;

    fn sample() -> CaseTree {
        let leaf = TestCase::new("c", "leaf").with_command(Command::execution("c1", "AT+C"));
        let mid = TestCase::new("b", "mid")
            .with_command(Command::execution("b1", "AT+B"))
            .with_sub_case(leaf);
        let mut root = TestCase::new("a", "root")
            .with_command(Command::execution("a1", "AT"))
            .with_sub_case(mid);
        root.unique_id = "TC-1".to_string();
        CaseTree::from_cases(vec![root]).unwrap()
    }

    #[test]
    fn test_depths_and_links() {
        let tree = sample();
        assert_eq!(tree.depth_of("a"), Some(1));
        assert_eq!(tree.depth_of("c"), Some(3));
        assert_eq!(tree.parent("c"), Some("b"));
        assert_eq!(tree.walk(), vec!["a", "b", "c"]);
        assert!(tree.can_add_sub_case("b"));
        assert!(!tree.can_add_sub_case("c"));
        assert!(!tree.can_add_sub_case("missing"));
    }

    #[test]
    fn test_add_sub_case_rejects_fourth_level() {
        let mut tree = sample();
        let err = tree
            .add_sub_case("c", TestCase::new("d", "too deep"))
            .unwrap_err();
        assert!(matches!(err, Error::DepthExceeded { .. }));
        assert!(tree.case("d").is_none());
    }

    #[test]
    fn test_from_cases_rejects_deep_input() {
        let deep = TestCase::new("a", "1").with_sub_case(
            TestCase::new("b", "2")
                .with_sub_case(TestCase::new("c", "3").with_sub_case(TestCase::new("d", "4"))),
        );
        assert!(CaseTree::from_cases(vec![deep]).is_err());
    }

    #[test]
    fn test_duplicate_unique_id_rejected() {
        let mut tree = sample();
        let mut other = TestCase::new("x", "other");
        other.unique_id = "TC-1".to_string();
        assert!(matches!(
            tree.add_root_case(other),
            Err(Error::DuplicateUniqueId(_))
        ));
    }

    #[test]
    fn test_duplicate_command_id_rejected() {
        let mut tree = sample();
        let other = TestCase::new("x", "other").with_command(Command::execution("a1", "AT"));
        assert!(matches!(tree.add_root_case(other), Err(Error::DuplicateId(_))));
    }

    #[test]
    fn test_round_trip_keeps_nesting() {
        let tree = sample();
        let cases = tree.to_cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].sub_cases[0].sub_cases[0].id, "c");
    }

    #[test]
    fn test_clone_is_ephemeral() {
        let mut tree = sample();
        let new_id = tree.clone_case_as_sub_case("c", "a").unwrap();
        let clone = tree.case(&new_id).unwrap();
        assert!(clone.unique_id.is_empty());
        assert_ne!(clone.commands[0].id, "c1");
        assert_eq!(tree.depth_of(&new_id), Some(2));
        assert_eq!(tree.children("a").len(), 2);
    }

    #[test]
    fn test_clone_retargets_internal_jumps() {
        use crate::model::{JumpConfig, MatchMode, OnReceived};

        let jump = |target: &str| JumpConfig {
            on_received: OnReceived::Jump,
            target_id: Some(target.to_string()),
        };
        let source = TestCase::new("s", "source")
            .with_command(Command::execution("s1", "AT+CFUN=1"))
            .with_command(Command::listener("ring", "RING", MatchMode::Exact).with_jump(jump("s1")))
            .with_command(Command::listener("out", "NO CARRIER", MatchMode::Exact).with_jump(jump("a1")));
        let mut tree = sample();
        tree.add_root_case(source).unwrap();

        let new_id = tree.clone_case_as_sub_case("s", "a").unwrap();
        let clone = tree.case(&new_id).unwrap();
        let target = |i: usize| {
            clone.commands[i]
                .listener_spec()
                .and_then(|l| l.jump_config.as_ref())
                .and_then(|j| j.target_id.clone())
                .unwrap()
        };
        assert_eq!(target(1), clone.commands[0].id);
        assert_ne!(target(1), "s1");
        assert_eq!(target(2), "a1");

        let original = tree.case("s").unwrap().commands[1].clone();
        assert_eq!(
            original.listener_spec().unwrap().jump_config.as_ref().unwrap().target_id.as_deref(),
            Some("s1")
        );
    }

    #[test]
    fn test_selection_flags() {
        let mut tree = sample();
        tree.set_case_selected("b", false).unwrap();
        tree.set_command_selected("c1", false).unwrap();
        assert!(!tree.case("b").unwrap().selected);
        assert!(!tree.command("c", 0).unwrap().selected);
        assert!(matches!(
            tree.set_command_selected("zz", true),
            Err(Error::CommandNotFound(_))
        ));
        assert!(tree.set_case_selected("zz", true).is_err());
    }

    #[test]
    fn test_resolve_by_unique_id() {
        let tree = sample();
        assert_eq!(tree.resolve_case_id("TC-1").as_deref(), Some("a"));
        assert_eq!(tree.resolve_case_id("b").as_deref(), Some("b"));
        assert_eq!(tree.resolve_case_id("nope"), None);
    }
}
