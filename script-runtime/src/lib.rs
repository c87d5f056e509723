//! Scriptbox Runtime
//!
//! This crate runs third-party script packs against registries owned by a
//! host application, and undoes everything those scripts changed before the
//! next reload. It knows nothing about any script language: engines plug in
//! through the [`ScriptEngine`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Host application               │
//! │  (owns registries, triggers reloads)    │
//! └────────────────┬────────────────────────┘
//!                  │
//!                  │ register bindings / reloadables
//!                  │ run() / reload()
//!                  ▼
//! ┌─────────────────────────────────────────┐
//! │    scriptbox-runtime (this crate)       │
//! │  ┌─────────────────────────────────┐    │
//! │  │    Sandbox                      │    │
//! │  │  - class units, then scripts    │    │
//! │  │  - per-unit failure isolation   │    │
//! │  │  - ExecutionContext activation  │    │
//! │  └─────────────────────────────────┘    │
//! │  ┌─────────────────────────────────┐    │
//! │  │    VirtualizedRegistry          │    │
//! │  │  - scripted / backup tracking   │    │
//! │  │  - reconcile on reload          │    │
//! │  └─────────────────────────────────┘    │
//! │  ┌─────────────────────────────────┐    │
//! │  │    Invoker                      │    │
//! │  │  - callbacks after the run      │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │     ScriptEngine impl (separate)        │
//! │  - e.g. scriptbox-lua (mlua)            │
//! │  - index, compile, execute units        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use scriptbox_runtime::{RunConfig, Sandbox, SandboxHost, UnitId, VirtualizedRegistry};
//! use std::sync::{Arc, Mutex};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Load the run config
//!     let config = RunConfig::load("scripts/run_config.json".as_ref())?;
//!
//!     // 2. Wrap host registries in overlays
//!     let recipes = Arc::new(Mutex::new(VirtualizedRegistry::new("recipes", Vec::new())));
//!
//!     // 3. Create the sandbox and expose the overlay
//!     let mut sandbox = Sandbox::<MyEngine, _>::new(config.roots.clone(), MyHost::from(config))?;
//!     sandbox.register_binding("Recipes", my_binding_for(&recipes))?;
//!     sandbox.register_reloadable(Arc::clone(&recipes));
//!
//!     // 4. Run, and reload whenever the pack changes
//!     let report = sandbox.run()?;
//!     let report = sandbox.reload()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

pub mod bindings;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod loader;
pub mod registry;
pub mod report;
pub mod sandbox;
pub mod unit;

#[cfg(test)]
mod testing;

// Re-export main types
pub use bindings::{AliasPolicy, BindingNamespace, Bindings, CaseAliases, ExactName};
pub use config::RunConfig;
pub use context::{ContextGuard, ExecutionContext, SandboxId};
pub use engine::{EngineConfig, ScriptEngine};
pub use error::{CallbackError, ConfigError, EngineError, Result, SandboxError, ValidationError};
pub use invoker::{Invocation, Invoker};
pub use loader::{Resolution, UnitLoader};
pub use registry::{HostCollection, ReconcileSummary, Reloadable, VirtualizedRegistry};
pub use report::{Diagnostic, Phase, RunReport, Severity, UnitOutcome, UnitRecord};
pub use sandbox::{RunState, Sandbox, SandboxHost};
pub use unit::{Unit, UnitId, UnitKind};
