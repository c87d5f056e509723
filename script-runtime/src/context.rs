//! Execution context for script units
//!
//! The context records which sandbox, if any, is currently executing code.
//! It is an explicit value: the sandbox owns one for its runs, every
//! [`Invoker`](crate::invoker::Invoker) owns one for its callbacks, and a
//! reference is handed to the engine for every unit it executes. Host code
//! reached from a script reads the sandbox identity from that reference
//! instead of from global state.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::unit::UnitId;

static NEXT_SANDBOX_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a sandbox instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SandboxId(u64);

impl SandboxId {
    /// Allocates a process-unique id
    pub fn next() -> Self {
        Self(NEXT_SANDBOX_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ambient execution state
///
/// A default context is inactive: no sandbox, not running, no unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    sandbox: Option<SandboxId>,
    running: bool,
    unit: Option<UnitId>,
}

impl ExecutionContext {
    /// Creates an inactive context
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `sandbox` as executing in this context
    pub fn activate(&mut self, sandbox: SandboxId) {
        self.sandbox = Some(sandbox);
        self.running = true;
    }

    /// Clears the running flag but keeps the sandbox identity
    pub fn finish(&mut self) {
        self.running = false;
    }

    /// Clears every field, whatever the current state
    pub fn deactivate(&mut self) {
        self.sandbox = None;
        self.running = false;
        self.unit = None;
    }

    /// Records the unit about to execute
    pub fn enter_unit(&mut self, unit: UnitId) {
        self.unit = Some(unit);
    }

    /// Clears the executing unit
    pub fn leave_unit(&mut self) {
        self.unit = None;
    }

    /// The sandbox currently executing here, if any
    pub fn current_sandbox(&self) -> Option<SandboxId> {
        self.sandbox
    }

    /// The unit currently executing here, if any
    pub fn current_unit(&self) -> Option<&UnitId> {
        self.unit.as_ref()
    }

    /// Whether a run or callback is in progress
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether `sandbox` is the active sandbox and is running
    pub fn is_running_in(&self, sandbox: SandboxId) -> bool {
        self.running && self.sandbox == Some(sandbox)
    }
}

/// Scoped activation of an [`ExecutionContext`]
///
/// Activates on construction and deactivates when dropped, including during
/// unwinding.
pub struct ContextGuard<'a> {
    context: &'a mut ExecutionContext,
}

impl<'a> ContextGuard<'a> {
    /// Activates `context` for `sandbox` until the guard is dropped
    pub fn activate(context: &'a mut ExecutionContext, sandbox: SandboxId) -> Self {
        context.activate(sandbox);
        Self { context }
    }
}

impl Deref for ContextGuard<'_> {
    type Target = ExecutionContext;

    fn deref(&self) -> &ExecutionContext {
        self.context
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.context.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_starts_inactive() {
        let context = ExecutionContext::new();
        assert_eq!(context.current_sandbox(), None);
        assert!(!context.is_running());
        assert!(context.current_unit().is_none());
    }

    #[test]
    fn test_activate_and_deactivate() {
        let id = SandboxId::next();
        let mut context = ExecutionContext::new();

        context.activate(id);
        assert_eq!(context.current_sandbox(), Some(id));
        assert!(context.is_running_in(id));

        context.enter_unit(UnitId::new("scripts/main.lua"));
        assert_eq!(context.current_unit().map(UnitId::as_str), Some("scripts/main.lua"));

        context.finish();
        assert!(!context.is_running());
        assert_eq!(context.current_sandbox(), Some(id));

        context.deactivate();
        assert_eq!(context, ExecutionContext::default());
    }

    #[test]
    fn test_guard_deactivates_on_drop() {
        let id = SandboxId::next();
        let mut context = ExecutionContext::new();
        {
            let guard = ContextGuard::activate(&mut context, id);
            assert!(guard.is_running_in(id));
        }
        assert_eq!(context.current_sandbox(), None);
        assert!(!context.is_running());
    }

    #[test]
    fn test_guard_deactivates_on_panic() {
        let id = SandboxId::next();
        let mut context = ExecutionContext::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ContextGuard::activate(&mut context, id);
            panic!("unit blew up");
        }));

        assert!(result.is_err());
        assert_eq!(context.current_sandbox(), None);
        assert!(!context.is_running());
    }

    #[test]
    fn test_sandbox_ids_are_unique() {
        let a = SandboxId::next();
        let b = SandboxId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_contexts_on_separate_threads_are_independent() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    let id = SandboxId::next();
                    let mut context = ExecutionContext::new();
                    let guard = ContextGuard::activate(&mut context, id);
                    guard.current_sandbox() == Some(id)
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
