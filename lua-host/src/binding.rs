//! Values bound into the Lua globals of every run

use std::fmt;
use std::sync::Arc;

use mlua::{Lua, Result as LuaResult, Value};
use scriptbox_runtime::ExecutionContext;
use serde::Serialize;

use crate::json::json_to_lua;

/// Builds a Lua value inside a freshly created VM
pub type NativeInstaller = Arc<dyn Fn(&Lua) -> LuaResult<Value> + Send + Sync>;

/// A binding value for the Lua engine
///
/// The engine is recreated for every run, so bindings describe how to build
/// their value rather than holding Lua values themselves.
#[derive(Clone)]
pub enum LuaBinding {
    /// Plain data, converted to Lua tables and scalars
    Value(serde_json::Value),
    /// Native functions or tables built by an installer
    Native(NativeInstaller),
}

impl LuaBinding {
    /// Binds any serializable value as plain data
    pub fn value<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(LuaBinding::Value)
    }

    /// Binds the value produced by `installer`
    pub fn native<F>(installer: F) -> Self
    where
        F: Fn(&Lua) -> LuaResult<Value> + Send + Sync + 'static,
    {
        LuaBinding::Native(Arc::new(installer))
    }

    /// Builds the Lua value in `lua`
    pub fn install(&self, lua: &Lua) -> LuaResult<Value> {
        match self {
            LuaBinding::Value(value) => json_to_lua(lua, value),
            LuaBinding::Native(installer) => installer(lua),
        }
    }
}

impl fmt::Debug for LuaBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaBinding::Value(value) => f.debug_tuple("Value").field(value).finish(),
            LuaBinding::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// Execution context of the unit or callback currently calling into Rust
///
/// `None` when Lua code runs outside [`LuaEngine`](crate::LuaEngine)'s
/// control, e.g. from a callback stored and called by hand.
pub fn current_context(lua: &Lua) -> Option<ExecutionContext> {
    lua.app_data_ref::<ExecutionContext>().map(|context| ExecutionContext::clone(&context))
}

/// Whether a sandbox is running on `lua` right now
pub fn is_running(lua: &Lua) -> bool {
    lua.app_data_ref::<ExecutionContext>()
        .is_some_and(|context| context.is_running())
}
