//! Test case execution engine
//!
//! [`Engine`] is a cheap, cloneable handle. Case runs, single steps and the
//! listener dispatcher all work against the same [`EngineSession`] and talk
//! to the device through a [`Transport`].

mod case;
mod command;
mod dispatcher;
mod events;
mod extract;
mod matcher;
mod navigation;
mod session;
mod substitute;
mod variables;

pub use command::CommandOutcome;
pub use events::{EngineEvent, FailureLog, RunOutcome, RunResult, StatusLevel};
pub use extract::extract_parameters;
pub use matcher::{check_urc_match, validate_response};
pub use navigation::{
    can_add_sub_case, find_command_location, first_executable_in, get_next_step_from,
    walk_from_root, StepRef,
};
pub use session::EngineSession;
pub use substitute::{placeholder_names, substitute_variables, DefaultPolicy};
pub use variables::{Variable, VariableStore, Variables};

pub(crate) use matcher::compile as compile_pattern;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::common::config::Config;
use crate::model::{CaseTree, TestCase};
use crate::prompt::Prompter;
use crate::transport::Transport;

/// Handle to a running engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    session: EngineSession,
    transport: Arc<dyn Transport>,
    prompter: Arc<dyn Prompter>,
    config: Config,
    dispatcher_started: AtomicBool,
}

impl Engine {
    pub fn new(
        tree: CaseTree,
        transport: Arc<dyn Transport>,
        prompter: Arc<dyn Prompter>,
        config: Config,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                session: EngineSession::new(tree),
                transport,
                prompter,
                config,
                dispatcher_started: AtomicBool::new(false),
            }),
        }
    }

    /// Take the event receiver (can only be called once)
    ///
    /// Events are only queued from this point on.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.inner.session.take_event_receiver()
    }

    pub fn session(&self) -> &EngineSession {
        &self.inner.session
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Nested snapshot of the current tree
    pub fn tree_snapshot(&self) -> Vec<TestCase> {
        self.inner.session.snapshot()
    }

    /// Current contents of the variable store
    pub fn variables(&self) -> Variables {
        self.inner.session.variables()
    }

    /// Edit the tree from the UI layer and publish the change
    pub fn edit_tree<R>(&self, f: impl FnOnce(&mut CaseTree) -> R) -> R {
        self.inner.session.update_tree(f)
    }

    fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    fn prompter(&self) -> &dyn Prompter {
        self.inner.prompter.as_ref()
    }

    fn default_policy(&self) -> DefaultPolicy {
        if self.inner.config.engine.apply_placeholder_defaults {
            DefaultPolicy::Apply
        } else {
            DefaultPolicy::Passthrough
        }
    }
}
