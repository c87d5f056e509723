//! Error types for the script sandbox

use std::path::PathBuf;

use thiserror::Error;

use crate::{context::SandboxId, unit::UnitId};

/// Result type for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors reported by a [`ScriptEngine`](crate::engine::ScriptEngine)
///
/// Everything except [`EngineError::Setup`] is scoped to a single unit and
/// never aborts a run on its own.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine's compiled index does not know this unit
    ///
    /// Expected for units created after the engine indexed its roots; the
    /// loader falls back to a direct scan of the roots.
    #[error("Unit '{0}' is not known to the engine index")]
    UnknownResource(UnitId),

    /// Reading a unit from disk failed
    #[error("Failed to read '{}': {source}", .path.display())]
    Io {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Unit source exceeds the configured size limit
    #[error("Unit '{unit}' is {size} bytes (max {limit})")]
    UnitTooLarge {
        /// The offending unit
        unit: UnitId,
        /// Actual size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// Unit source failed to compile
    #[error("Failed to compile '{unit}': {message}")]
    Compile {
        /// The unit being compiled
        unit: UnitId,
        /// Engine diagnostic
        message: String,
    },

    /// Unit entry point raised an error
    #[error("Unit '{unit}' raised: {message}")]
    Execution {
        /// The unit being executed
        unit: UnitId,
        /// Engine diagnostic
        message: String,
    },

    /// Engine construction or configuration failed
    #[error("Engine setup failed: {0}")]
    Setup(String),
}

/// Errors that escape a sandbox operation
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A sandbox needs at least one environment root
    #[error("Script environment must contain at least one root")]
    EmptyEnvironment,

    /// Binding registration was rejected
    #[error("Invalid binding name: {0:?}")]
    InvalidBinding(String),

    /// The engine could not be prepared; nothing ran
    #[error("Sandbox {sandbox} failed during preparation: {source}")]
    Setup {
        /// Sandbox that failed
        sandbox: SandboxId,
        /// Underlying engine error
        #[source]
        source: EngineError,
    },
}

/// Errors loading a run configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read run config '{}': {source}", .path.display())]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for a run config
    #[error("Failed to parse run config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The config parsed but is unusable
    #[error("Invalid run config: {0}")]
    Invalid(String),
}

/// Error captured by the [`Invoker`](crate::invoker::Invoker)
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The callable returned an error
    #[error("Callback in sandbox {sandbox} failed: {source}")]
    Raised {
        /// Owning sandbox
        sandbox: SandboxId,
        /// Error returned by the callable
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The callable panicked
    #[error("Callback in sandbox {sandbox} panicked: {message}")]
    Panicked {
        /// Owning sandbox
        sandbox: SandboxId,
        /// Panic payload, if it was a string
        message: String,
    },
}

/// An addition rejected before it touched the registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{context}: {}", .problems.join("; "))]
pub struct ValidationError {
    /// What was being added, e.g. "Error adding alloy recipe"
    pub context: String,
    /// Individual problems found
    pub problems: Vec<String>,
}

impl ValidationError {
    /// Creates an empty error for the given context
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            problems: Vec::new(),
        }
    }

    /// Adds a problem if `failed` holds
    pub fn add_if(mut self, failed: bool, problem: impl Into<String>) -> Self {
        if failed {
            self.problems.push(problem.into());
        }
        self
    }

    /// Returns `Err(self)` if any problem was recorded
    pub fn into_result(self) -> std::result::Result<(), ValidationError> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}
