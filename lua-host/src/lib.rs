//! Scriptbox Lua
//!
//! This crate provides the Lua 5.4 backend for `scriptbox-runtime`. Script
//! packs are plain `.lua` files; a unit whose header carries a
//! `---@class Name` annotation is a class unit, everything else is a script.
//!
//! # Architecture
//!
//! Each run gets a fresh [`LuaEngine`]:
//!
//! 1. A restricted VM is created ([`TrustLevel`] picks the standard libraries)
//! 2. The environment roots are indexed for `.lua` files
//! 3. Bindings are installed as globals ([`LuaBinding`])
//! 4. Units are compiled to functions and called with the run's
//!    `ExecutionContext` stored as VM app data
//!
//! # Available Bindings
//!
//! ## Registries
//! - [`RegistryBinding`] - `add`, `remove`, `remove_if`, `remove_all`, `list`
//!   over a shared `VirtualizedRegistry`
//!
//! ## Deferred actions
//! - [`DeferredActions`] - `defer(fn)`, run by the host after the run
//!
//! # Usage
//!
//! ```rust,ignore
//! use scriptbox_lua::{DeferredActions, LuaEngine, RegistryBinding};
//! use scriptbox_runtime::{RunConfig, Sandbox, VirtualizedRegistry};
//! use std::sync::{Arc, Mutex};
//!
//! let config = RunConfig::load("scripts/run_config.json".as_ref())?;
//! let mut sandbox = Sandbox::<LuaEngine, _>::new(config.roots.clone(), config)?;
//!
//! let recipes = Arc::new(Mutex::new(VirtualizedRegistry::new("Recipes", Vec::<Recipe>::new())));
//! sandbox.register_binding("Recipes", RegistryBinding::new(Arc::clone(&recipes)).into_binding())?;
//! sandbox.register_reloadable(Arc::clone(&recipes));
//!
//! let deferred = DeferredActions::new();
//! sandbox.register_binding("defer", deferred.binding())?;
//! sandbox.register_reloadable(deferred.clone());
//!
//! sandbox.run()?;
//! if let Some(engine) = sandbox.engine() {
//!     deferred.run_pending(engine, &mut sandbox.invoker());
//! }
//! ```

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

pub mod binding;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod json;
pub mod registry;
pub mod vm;

pub use binding::{current_context, LuaBinding, NativeInstaller};
pub use deferred::{DeferredActions, DeferredSummary};
pub use engine::{classify, LuaEngine, LuaUnit};
pub use error::BindingError;
pub use registry::{RegistryBinding, SharedRegistry, Validator};
pub use vm::{create_sandboxed_vm, TrustLevel};
