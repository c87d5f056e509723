//! File-backed engine used by the unit tests
//!
//! Units are plain text files with `key: value` lines:
//!
//! ```text
//! kind: class        # or script (default)
//! compile: error     # compilation fails
//! execute: error     # entry point returns an error
//! execute: panic     # entry point panics
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{
    bindings::Bindings,
    context::ExecutionContext,
    engine::{EngineConfig, ScriptEngine},
    error::EngineError,
    unit::{Unit, UnitId, UnitKind},
};

pub(crate) const UNIT_EXTENSION: &str = "unit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Behavior {
    Succeed,
    Fail,
    Panic,
}

#[derive(Debug)]
pub(crate) struct FileEngine {
    index: HashMap<UnitId, PathBuf>,
    bound: Vec<String>,
    pub(crate) executed: Vec<UnitId>,
    pub(crate) contexts: Vec<ExecutionContext>,
    pub(crate) visible: Vec<(UnitId, Vec<String>)>,
    pub(crate) dynamic_loads: Vec<UnitId>,
}

impl FileEngine {
    fn parse(id: &UnitId, path: &Path) -> Result<Unit<Behavior>, EngineError> {
        let source = fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut kind = UnitKind::Script;
        let mut behavior = Behavior::Succeed;
        for line in source.lines() {
            match line.split_once(':').map(|(k, v)| (k.trim(), v.trim())) {
                Some(("kind", "class")) => kind = UnitKind::Class,
                Some(("compile", "error")) => {
                    return Err(EngineError::Compile {
                        unit: id.clone(),
                        message: "unexpected token".to_string(),
                    })
                }
                Some(("execute", "error")) => behavior = Behavior::Fail,
                Some(("execute", "panic")) => behavior = Behavior::Panic,
                _ => {}
            }
        }
        Ok(Unit::new(id.clone(), kind, behavior).with_source(path))
    }

    fn index_root(root: &Path, index: &mut HashMap<UnitId, PathBuf>) -> Result<(), walkdir::Error> {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            let is_unit = entry.path().extension().and_then(|e| e.to_str()) == Some(UNIT_EXTENSION);
            if !entry.file_type().is_file() || !is_unit {
                continue;
            }
            if let Some(id) = UnitId::from_relative(root, entry.path()) {
                index.entry(id).or_insert_with(|| entry.into_path());
            }
        }
        Ok(())
    }
}

impl ScriptEngine for FileEngine {
    type Binding = String;
    type Compiled = Behavior;

    fn create(roots: &[PathBuf], _config: &EngineConfig) -> Result<Self, EngineError> {
        let mut index = HashMap::new();
        for root in roots {
            if !root.is_dir() {
                return Err(EngineError::Setup(format!("missing root {}", root.display())));
            }
            Self::index_root(root, &mut index).map_err(|e| EngineError::Setup(e.to_string()))?;
        }
        Ok(Self {
            index,
            bound: Vec::new(),
            executed: Vec::new(),
            contexts: Vec::new(),
            visible: Vec::new(),
            dynamic_loads: Vec::new(),
        })
    }

    fn bind(&mut self, bindings: &Bindings<String>) -> Result<(), EngineError> {
        self.bound = bindings.iter().map(|(name, value)| format!("{name}={value}")).collect();
        Ok(())
    }

    fn load_indexed(&mut self, id: &UnitId) -> Result<Option<Unit<Behavior>>, EngineError> {
        let path = self
            .index
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownResource(id.clone()))?;
        Self::parse(id, &path).map(Some)
    }

    fn compile_file(&mut self, id: &UnitId, path: &Path) -> Result<Unit<Behavior>, EngineError> {
        self.dynamic_loads.push(id.clone());
        Self::parse(id, path)
    }

    fn execute(&mut self, unit: &Unit<Behavior>, context: &ExecutionContext) -> Result<(), EngineError> {
        self.contexts.push(context.clone());
        self.visible.push((unit.id.clone(), self.bound.clone()));
        match unit.compiled {
            Behavior::Succeed => {
                self.executed.push(unit.id.clone());
                Ok(())
            }
            Behavior::Fail => Err(EngineError::Execution {
                unit: unit.id.clone(),
                message: "attempt to index a nil value".to_string(),
            }),
            Behavior::Panic => panic!("unit {} panicked", unit.id),
        }
    }
}

/// Writes a unit file under `root`, creating parent directories
pub(crate) fn write_unit(root: &Path, id: &str, body: &str) {
    let path = root.join(UnitId::new(id).to_path());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
}
