//! Callback invocation outside a run
//!
//! Scripts hand the host functions to call later (event handlers, deferred
//! actions). Those calls happen after the run that created them has
//! finished, so the [`Invoker`] re-establishes the sandbox's execution
//! context for the duration of each call and captures anything the callback
//! throws at it.

use std::any::Any;
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};

use crate::{
    context::{ContextGuard, ExecutionContext, SandboxId},
    error::CallbackError,
};

/// Result of a single callback invocation
#[derive(Debug)]
pub enum Invocation<R> {
    /// The callable returned normally
    Completed(R),
    /// The callable returned an error or panicked
    Failed(CallbackError),
}

impl<R> Invocation<R> {
    /// Whether the callable returned normally
    pub fn is_completed(&self) -> bool {
        matches!(self, Invocation::Completed(_))
    }

    /// Converts into a standard `Result`
    pub fn into_result(self) -> Result<R, CallbackError> {
        match self {
            Invocation::Completed(value) => Ok(value),
            Invocation::Failed(err) => Err(err),
        }
    }

    /// The returned value, or `R::default()` after logging the failure
    pub fn unwrap_or_default_logged(self) -> R
    where
        R: Default,
    {
        match self {
            Invocation::Completed(value) => value,
            Invocation::Failed(err) => {
                log::error!("{}", err);
                R::default()
            }
        }
    }
}

/// Calls host-held callbacks inside a sandbox's execution context
///
/// Each clone carries its own context, so invokers may be used from any
/// call depth and from other threads without touching the sandbox's run
/// state.
#[derive(Debug, Clone)]
pub struct Invoker {
    sandbox: SandboxId,
    context: ExecutionContext,
}

impl Invoker {
    /// Creates an invoker for `sandbox`
    pub fn new(sandbox: SandboxId) -> Self {
        Self {
            sandbox,
            context: ExecutionContext::new(),
        }
    }

    /// Sandbox the callbacks run in
    pub fn sandbox(&self) -> SandboxId {
        self.sandbox
    }

    /// The invoker's context; inactive between calls
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Runs `callable` with the context active
    ///
    /// The context is deactivated on every exit path. Errors and panics are
    /// returned as [`Invocation::Failed`].
    pub fn invoke<R, E, F>(&mut self, callable: F) -> Invocation<R>
    where
        F: FnOnce(&ExecutionContext) -> Result<R, E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let sandbox = self.sandbox;
        let guard = ContextGuard::activate(&mut self.context, sandbox);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callable(&*guard)));
        drop(guard);

        match outcome {
            Ok(Ok(value)) => Invocation::Completed(value),
            Ok(Err(err)) => Invocation::Failed(CallbackError::Raised {
                sandbox,
                source: err.into(),
            }),
            Err(payload) => Invocation::Failed(CallbackError::Panicked {
                sandbox,
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Runs `callable`, logging any failure and substituting `R::default()`
    pub fn invoke_or_default<R, E, F>(&mut self, callable: F) -> R
    where
        R: Default,
        F: FnOnce(&ExecutionContext) -> Result<R, E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.invoke(callable).unwrap_or_default_logged()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
