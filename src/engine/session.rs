//! Shared engine state
//!
//! The tree, the variable store, the running-case set and the listener
//! bookkeeping are the only mutable state shared between concurrent runs
//! and the listener dispatcher. Every lock is held for a short synchronous
//! section, never across an await.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::events::{EngineEvent, StatusLevel};
use super::navigation::StepRef;
use super::substitute::{substitute_variables, DefaultPolicy};
use super::variables::{VariableStore, Variables};
use crate::model::{CaseTree, TestCase};

pub struct EngineSession {
    tree: Mutex<CaseTree>,
    variables: Mutex<VariableStore>,
    /// Top-level case id to the token of the run currently owning it
    running: Mutex<HashMap<String, Uuid>>,
    /// Permanent listeners whose jump already fired in this run
    triggered: Mutex<HashSet<String>>,
    /// Once listeners awaited by a command executor
    pending_once: Mutex<HashMap<String, oneshot::Sender<()>>>,
    executing: Mutex<Option<StepRef>>,
    /// Created when the event receiver is taken; events before that are dropped
    events: Mutex<Option<mpsc::UnboundedSender<EngineEvent>>>,
    events_taken: AtomicBool,
}

impl EngineSession {
    pub fn new(tree: CaseTree) -> Self {
        Self {
            tree: Mutex::new(tree),
            variables: Mutex::new(VariableStore::new()),
            running: Mutex::new(HashMap::new()),
            triggered: Mutex::new(HashSet::new()),
            pending_once: Mutex::new(HashMap::new()),
            executing: Mutex::new(None),
            events: Mutex::new(None),
            events_taken: AtomicBool::new(false),
        }
    }

    /// Open the event channel, only the first call gets a receiver
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        if self.events_taken.swap(true, Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock() = Some(tx);
        Some(rx)
    }

    fn has_listener(&self) -> bool {
        self.events.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn emit(&self, event: EngineEvent) {
        let mut events = self.events.lock();
        if let Some(tx) = events.as_ref() {
            if tx.send(event).is_err() {
                *events = None;
            }
        }
    }

    pub fn status(&self, level: StatusLevel, message: impl Into<String>) {
        self.emit(EngineEvent::Status {
            level,
            message: message.into(),
        });
    }

    // === Tree ===

    pub fn with_tree<R>(&self, f: impl FnOnce(&CaseTree) -> R) -> R {
        f(&self.tree.lock())
    }

    /// Mutate the tree and publish the new snapshot
    pub fn update_tree<R>(&self, f: impl FnOnce(&mut CaseTree) -> R) -> R {
        let publish = self.has_listener();
        let (out, snapshot) = {
            let mut tree = self.tree.lock();
            let out = f(&mut tree);
            (out, publish.then(|| tree.to_cases()))
        };
        if let Some(snapshot) = snapshot {
            self.emit(EngineEvent::TreeChanged(snapshot));
        }
        out
    }

    pub fn snapshot(&self) -> Vec<TestCase> {
        self.tree.lock().to_cases()
    }

    // === Variables ===

    pub fn variables(&self) -> Variables {
        self.variables.lock().snapshot()
    }

    pub fn merge_variables(&self, extracted: Variables) {
        self.variables.lock().merge(extracted);
    }

    pub fn clear_variables(&self) {
        self.variables.lock().clear();
    }

    pub fn set_variable(&self, name: &str, value: &str) {
        self.variables.lock().set(name, value);
    }

    pub fn substitute(&self, template: &str, policy: DefaultPolicy) -> String {
        substitute_variables(template, &self.variables.lock(), policy)
    }

    // === Running cases ===

    /// Claim `case_id` for a new run, `None` if it is already running
    pub fn begin_run(&self, case_id: &str) -> Option<Uuid> {
        let mut running = self.running.lock();
        if running.contains_key(case_id) {
            return None;
        }
        let token = Uuid::new_v4();
        running.insert(case_id.to_string(), token);
        Some(token)
    }

    /// Whether the run identified by `token` still owns `case_id`
    pub fn is_active(&self, case_id: &str, token: Uuid) -> bool {
        self.running.lock().get(case_id) == Some(&token)
    }

    pub fn is_running(&self, case_id: &str) -> bool {
        self.running.lock().contains_key(case_id)
    }

    /// Release `case_id`, returning whether it was running
    pub fn stop_run(&self, case_id: &str) -> bool {
        self.running.lock().remove(case_id).is_some()
    }

    /// Release `case_id` only if `token` still owns it
    pub fn end_run(&self, case_id: &str, token: Uuid) {
        let mut running = self.running.lock();
        if running.get(case_id) == Some(&token) {
            running.remove(case_id);
        }
    }

    // === Listener bookkeeping ===

    pub fn clear_triggered(&self) {
        self.triggered.lock().clear();
    }

    /// Record a permanent listener trigger, `false` if it already fired
    pub fn mark_triggered(&self, command_id: &str) -> bool {
        self.triggered.lock().insert(command_id.to_string())
    }

    /// Register a waiter for a Once listener match
    ///
    /// A previous waiter for the same listener is dropped, which resolves it
    /// as cancelled.
    pub fn register_once(&self, command_id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.pending_once.lock().insert(command_id.to_string(), tx);
        rx
    }

    /// Resolve a pending Once wait, returning whether one was pending
    pub fn resolve_once(&self, command_id: &str) -> bool {
        match self.pending_once.lock().remove(command_id) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn cancel_once(&self, command_id: &str) {
        self.pending_once.lock().remove(command_id);
    }

    // === Executing highlight ===

    pub fn set_executing(&self, step: StepRef) {
        *self.executing.lock() = Some(step.clone());
        self.emit(EngineEvent::Executing(Some(step)));
    }

    /// Clear the highlight if it still points at `step`
    pub fn clear_executing(&self, step: &StepRef) {
        let cleared = {
            let mut executing = self.executing.lock();
            if executing.as_ref() == Some(step) {
                *executing = None;
                true
            } else {
                false
            }
        };
        if cleared {
            self.emit(EngineEvent::Executing(None));
        }
    }

    pub fn executing(&self) -> Option<StepRef> {
        self.executing.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Command, TestCase};

    fn session() -> (EngineSession, mpsc::UnboundedReceiver<EngineEvent>) {
        let tree = CaseTree::from_cases(vec![
            TestCase::new("t1", "case").with_command(Command::execution("c1", "AT"))
        ])
        .unwrap();
        let session = EngineSession::new(tree);
        let rx = session.take_event_receiver().unwrap();
        (session, rx)
    }

    #[test]
    fn test_events_dropped_until_receiver_taken() {
        let tree = CaseTree::from_cases(vec![TestCase::new("t1", "case")]).unwrap();
        let session = EngineSession::new(tree);
        for _ in 0..10 {
            session.status(StatusLevel::Info, "nobody listens");
            session.update_tree(|_| ());
        }

        let mut rx = session.take_event_receiver().unwrap();
        assert!(session.take_event_receiver().is_none());
        assert!(rx.try_recv().is_err());

        session.status(StatusLevel::Info, "heard");
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Status { .. })));

        drop(rx);
        session.status(StatusLevel::Info, "receiver gone");
        assert!(!session.has_listener());
    }

    #[test]
    fn test_run_tokens() {
        let (session, _rx) = session();
        let token = session.begin_run("t1").unwrap();
        assert!(session.begin_run("t1").is_none());
        assert!(session.is_active("t1", token));

        assert!(session.stop_run("t1"));
        assert!(!session.is_active("t1", token));

        let second = session.begin_run("t1").unwrap();
        session.end_run("t1", token);
        assert!(session.is_active("t1", second));
        session.end_run("t1", second);
        assert!(!session.is_running("t1"));
    }

    #[test]
    fn test_update_tree_publishes_snapshot() {
        let (session, mut rx) = session();
        session.update_tree(|t| t.set_command_selected("c1", false)).unwrap();
        match rx.try_recv().unwrap() {
            EngineEvent::TreeChanged(cases) => assert!(!cases[0].commands[0].selected),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_once_waiters() {
        let (session, _rx) = session();
        assert!(!session.resolve_once("u1"));

        let first = session.register_once("u1");
        let second = session.register_once("u1");
        assert!(first.await.is_err());

        assert!(session.resolve_once("u1"));
        assert!(second.await.is_ok());
    }

    #[test]
    fn test_executing_highlight() {
        let (session, mut rx) = session();
        let a = StepRef::new("t1", 0);
        let b = StepRef::new("t1", 1);
        session.set_executing(a.clone());
        session.set_executing(b.clone());
        session.clear_executing(&a);
        assert_eq!(session.executing(), Some(b.clone()));
        session.clear_executing(&b);
        assert_eq!(session.executing(), None);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(events.last(), Some(EngineEvent::Executing(None))));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_triggered_set() {
        let (session, _rx) = session();
        assert!(session.mark_triggered("u1"));
        assert!(!session.mark_triggered("u1"));
        session.clear_triggered();
        assert!(session.mark_triggered("u1"));
    }
}
