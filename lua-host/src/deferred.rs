//! Deferred actions
//!
//! Scripts call `defer(function() ... end)` to queue work the host runs
//! once the run has finished, e.g. after every registry is populated. The
//! queued functions are run through an [`Invoker`], so they see the same
//! sandbox identity as the unit that queued them and a failing action never
//! takes the host down.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mlua::{Function, Value};
use scriptbox_runtime::{Invocation, Invoker, Reloadable};

use crate::{
    binding::{is_running, LuaBinding},
    engine::LuaEngine,
    error::BindingError,
};

/// Counts from one [`DeferredActions::run_pending`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeferredSummary {
    /// Actions that completed
    pub completed: usize,
    /// Actions that raised an error or panicked
    pub failed: usize,
}

/// Queue of Lua functions to call after a run
#[derive(Clone, Default)]
pub struct DeferredActions {
    queue: Arc<Mutex<Vec<Function>>>,
}

impl DeferredActions {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Function>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queued actions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Binding installing the `defer(fn)` global
    pub fn binding(&self) -> LuaBinding {
        let queue = self.clone();
        LuaBinding::native(move |lua| {
            let queue = queue.clone();
            lua.create_function(move |lua, action: Function| {
                if !is_running(lua) {
                    return Err(BindingError::InactiveContext("defer".to_string()).into());
                }
                queue.lock().push(action);
                Ok(())
            })
            .map(Value::Function)
        })
    }

    /// Runs and drains every queued action
    ///
    /// Actions queued while draining run in the same call. Failures are
    /// logged and counted.
    pub fn run_pending(&self, engine: &LuaEngine, invoker: &mut Invoker) -> DeferredSummary {
        let mut summary = DeferredSummary::default();
        loop {
            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                break;
            }
            for action in batch {
                match invoker.invoke(|context| engine.call_in_context(&action, context)) {
                    Invocation::Completed(()) => summary.completed = summary.completed.saturating_add(1),
                    Invocation::Failed(err) => {
                        log::error!("Deferred action failed: {}", err);
                        summary.failed = summary.failed.saturating_add(1);
                    }
                }
            }
        }
        summary
    }
}

impl Reloadable for DeferredActions {
    fn on_reload(&mut self) {
        let stale = std::mem::take(&mut *self.lock());
        if !stale.is_empty() {
            log::debug!("Dropping {} deferred actions from the previous run", stale.len());
        }
    }
}

impl std::fmt::Debug for DeferredActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredActions").field("queued", &self.len()).finish()
    }
}
