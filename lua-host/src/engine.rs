//! Lua implementation of [`ScriptEngine`]
//!
//! Each run gets a fresh [`LuaEngine`]: a restricted VM plus an index of the
//! `.lua` files found under the environment roots when the engine was
//! created. Units are compiled into Lua functions and called with the run's
//! [`ExecutionContext`] installed as VM app data, so native bindings can tell
//! which sandbox is calling them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use mlua::{Function, Lua};
use scriptbox_runtime::{
    Bindings, EngineConfig, EngineError, ExecutionContext, ScriptEngine, Unit, UnitId, UnitKind,
};
use walkdir::WalkDir;

use crate::{
    binding::LuaBinding,
    vm::{create_sandboxed_vm, TrustLevel},
};

/// Extensions indexed when the engine config does not name any
pub const DEFAULT_EXTENSIONS: &[&str] = &["lua"];

/// Header annotation marking a class unit
const CLASS_ANNOTATION: &str = "---@class";

/// A compiled Lua unit
pub type LuaUnit = Unit<Function>;

/// Lua 5.4 script engine
pub struct LuaEngine {
    lua: Lua,
    index: HashMap<UnitId, PathBuf>,
    config: EngineConfig,
    trust: TrustLevel,
}

impl LuaEngine {
    /// The engine's VM
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Trust level the VM was created with
    pub fn trust(&self) -> TrustLevel {
        self.trust
    }

    /// Whether `id` was found when the roots were indexed
    pub fn is_indexed(&self, id: &UnitId) -> bool {
        self.index.contains_key(id)
    }

    /// Number of indexed units
    pub fn indexed_len(&self) -> usize {
        self.index.len()
    }

    /// Calls `function` with `context` visible to native bindings
    ///
    /// The previous context, if any, is restored afterwards, so callbacks
    /// may be nested inside a running unit.
    pub fn call_in_context(&self, function: &Function, context: &ExecutionContext) -> mlua::Result<()> {
        let previous = self.lua.set_app_data(context.clone());
        let result = function.call::<()>(());
        match previous {
            Some(previous) => {
                self.lua.set_app_data(previous);
            }
            None => {
                self.lua.remove_app_data::<ExecutionContext>();
            }
        }
        result
    }

    fn index_roots(roots: &[PathBuf], config: &EngineConfig) -> HashMap<UnitId, PathBuf> {
        let mut index = HashMap::new();
        for root in roots {
            if !root.is_dir() {
                log::warn!("Skipping missing script root '{}'", root.display());
                continue;
            }
            for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                let accepted = entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| config.accepts_extension(ext, DEFAULT_EXTENSIONS));
                if !accepted {
                    continue;
                }
                if let Some(id) = UnitId::from_relative(root, entry.path()) {
                    index.entry(id).or_insert_with(|| entry.into_path());
                }
            }
        }
        index
    }

    fn compile(&self, id: &UnitId, path: &Path) -> Result<LuaUnit, EngineError> {
        let io_error = |source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        };

        let size = fs::metadata(path).map_err(io_error)?.len();
        if size > self.config.max_unit_bytes {
            return Err(EngineError::UnitTooLarge {
                unit: id.clone(),
                size,
                limit: self.config.max_unit_bytes,
            });
        }

        let source = fs::read_to_string(path).map_err(io_error)?;
        let kind = classify(&source);
        let function = self
            .lua
            .load(source.as_str())
            .set_name(format!("@{id}"))
            .into_function()
            .map_err(|err| EngineError::Compile {
                unit: id.clone(),
                message: err.to_string(),
            })?;

        if self.config.debug {
            log::debug!("Compiled {} unit {} ({} bytes)", kind, id, size);
        }
        Ok(Unit::new(id.clone(), kind, function).with_source(path))
    }
}

impl ScriptEngine for LuaEngine {
    type Binding = LuaBinding;
    type Compiled = Function;

    fn create(roots: &[PathBuf], config: &EngineConfig) -> Result<Self, EngineError> {
        let trust = TrustLevel::from_privileged(config.privileged);
        let lua = create_sandboxed_vm(trust).map_err(|err| EngineError::Setup(err.to_string()))?;
        let index = Self::index_roots(roots, config);
        log::debug!("Indexed {} Lua units under {} roots ({:?})", index.len(), roots.len(), trust);

        Ok(Self {
            lua,
            index,
            config: config.clone(),
            trust,
        })
    }

    fn bind(&mut self, bindings: &Bindings<LuaBinding>) -> Result<(), EngineError> {
        let globals = self.lua.globals();
        for (name, binding) in bindings.iter() {
            let value = binding
                .install(&self.lua)
                .map_err(|err| EngineError::Setup(format!("binding '{name}': {err}")))?;
            globals
                .set(name, value)
                .map_err(|err| EngineError::Setup(format!("binding '{name}': {err}")))?;
        }
        Ok(())
    }

    fn load_indexed(&mut self, id: &UnitId) -> Result<Option<LuaUnit>, EngineError> {
        let path = self
            .index
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownResource(id.clone()))?;
        self.compile(id, &path).map(Some)
    }

    fn compile_file(&mut self, id: &UnitId, path: &Path) -> Result<LuaUnit, EngineError> {
        self.compile(id, path)
    }

    fn execute(&mut self, unit: &LuaUnit, context: &ExecutionContext) -> Result<(), EngineError> {
        self.call_in_context(&unit.compiled, context)
            .map_err(|err| EngineError::Execution {
                unit: unit.id.clone(),
                message: err.to_string(),
            })
    }
}

impl std::fmt::Debug for LuaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaEngine")
            .field("indexed", &self.index.len())
            .field("trust", &self.trust)
            .finish_non_exhaustive()
    }
}

/// Reads the unit kind from the leading comment block
///
/// A `---@class Name` annotation before the first line of code marks a
/// class unit. Everything else is a script.
pub fn classify(source: &str) -> UnitKind {
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with("--") {
            break;
        }
        if line.starts_with(CLASS_ANNOTATION) {
            return UnitKind::Class;
        }
    }
    UnitKind::Script
}
