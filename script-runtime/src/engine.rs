//! Script engine abstraction
//!
//! The sandbox does not compile or interpret anything itself. A
//! [`ScriptEngine`] implementation owns the language runtime and the
//! compiled-unit index; the sandbox only decides what to load, in which
//! order, and what to do when it fails.

use std::path::{Path, PathBuf};

use crate::{
    bindings::Bindings,
    context::ExecutionContext,
    error::EngineError,
    unit::{Unit, UnitId},
};

/// Engine tuning applied when a run prepares a fresh engine
///
/// Hosts adjust a copy per run through
/// [`SandboxHost::configure_engine`](crate::sandbox::SandboxHost::configure_engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Enable engine debug output
    pub debug: bool,

    /// Largest unit source accepted, in bytes
    pub max_unit_bytes: u64,

    /// File extensions the engine indexes; empty means the engine's default
    pub extensions: Vec<String>,

    /// Give units access to facilities outside the sandbox (files, OS)
    pub privileged: bool,
}

impl EngineConfig {
    /// Default unit size limit (512 KiB)
    pub const DEFAULT_MAX_UNIT_BYTES: u64 = 512 * 1024;

    /// Whether a file with this extension should be indexed
    ///
    /// `fallback` is the engine's own extension list, used when the config
    /// does not name any.
    pub fn accepts_extension(&self, extension: &str, fallback: &[&str]) -> bool {
        if self.extensions.is_empty() {
            fallback.iter().any(|ext| ext.eq_ignore_ascii_case(extension))
        } else {
            self.extensions.iter().any(|ext| ext.eq_ignore_ascii_case(extension))
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug: false,
            max_unit_bytes: Self::DEFAULT_MAX_UNIT_BYTES,
            extensions: Vec::new(),
            privileged: false,
        }
    }
}

/// A script language runtime driven by the sandbox
///
/// One engine is created per run and retained until the next run starts.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scriptbox_runtime::{engine::{EngineConfig, ScriptEngine}, Bindings, EngineError,
///     ExecutionContext, Unit, UnitId};
///
/// struct MyEngine { /* runtime handle, compiled index */ }
///
/// impl ScriptEngine for MyEngine {
///     type Binding = MyValue;
///     type Compiled = MyProgram;
///
///     fn create(roots: &[PathBuf], config: &EngineConfig) -> Result<Self, EngineError> {
///         // Build the runtime and index the roots
///         todo!()
///     }
///
///     fn bind(&mut self, bindings: &Bindings<MyValue>) -> Result<(), EngineError> {
///         // Expose bindings as globals
///         todo!()
///     }
///
///     fn load_indexed(&mut self, id: &UnitId) -> Result<Option<Unit<MyProgram>>, EngineError> {
///         // Err(EngineError::UnknownResource(..)) for ids missing from the index
///         todo!()
///     }
///
///     fn compile_file(&mut self, id: &UnitId, path: &Path) -> Result<Unit<MyProgram>, EngineError> {
///         todo!()
///     }
///
///     fn execute(&mut self, unit: &Unit<MyProgram>, context: &ExecutionContext) -> Result<(), EngineError> {
///         todo!()
///     }
/// }
/// ```
pub trait ScriptEngine: Sized {
    /// Value type stored in the binding namespace
    type Binding: Clone;

    /// Compiled form of a unit
    type Compiled;

    /// Builds an engine over the given environment roots
    ///
    /// Failure is fatal to the run.
    fn create(roots: &[PathBuf], config: &EngineConfig) -> Result<Self, EngineError>;

    /// Makes the run-scoped bindings visible to every unit executed afterwards
    ///
    /// Failure is fatal to the run.
    fn bind(&mut self, bindings: &Bindings<Self::Binding>) -> Result<(), EngineError>;

    /// Loads a unit through the index built by [`ScriptEngine::create`]
    ///
    /// Returns [`EngineError::UnknownResource`] for units the index has never
    /// seen, which makes the loader fall back to a direct scan of the roots.
    fn load_indexed(&mut self, id: &UnitId) -> Result<Option<Unit<Self::Compiled>>, EngineError>;

    /// Compiles a unit directly from a file
    fn compile_file(&mut self, id: &UnitId, path: &Path) -> Result<Unit<Self::Compiled>, EngineError>;

    /// Runs a unit's entry point
    fn execute(&mut self, unit: &Unit<Self::Compiled>, context: &ExecutionContext) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(!config.debug);
        assert!(!config.privileged);
        assert_eq!(config.max_unit_bytes, 512 * 1024);
    }

    #[test]
    fn test_accepts_extension_uses_fallback_when_unset() {
        let config = EngineConfig::default();
        assert!(config.accepts_extension("lua", &["lua"]));
        assert!(config.accepts_extension("LUA", &["lua"]));
        assert!(!config.accepts_extension("txt", &["lua"]));
    }

    #[test]
    fn test_accepts_extension_prefers_configured_list() {
        let config = EngineConfig {
            extensions: vec!["luau".to_string()],
            ..EngineConfig::default()
        };
        assert!(config.accepts_extension("luau", &["lua"]));
        assert!(!config.accepts_extension("lua", &["lua"]));
    }
}
