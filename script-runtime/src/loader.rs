//! Unit resolution
//!
//! The engine's index only knows units that existed when the engine was
//! created. Units added later (a pack edited between reloads) are found by
//! scanning the environment roots directly.

use std::path::PathBuf;

use crate::{
    engine::ScriptEngine,
    error::EngineError,
    unit::{Unit, UnitId},
};

/// Outcome of resolving a unit id
#[derive(Debug)]
pub enum Resolution<C> {
    /// The unit was found and compiled
    Loaded(Unit<C>),
    /// No root contains the unit
    NotFound,
    /// The unit exists but could not be read or compiled
    Failed(EngineError),
}

/// Resolves unit ids against a fixed list of environment roots
#[derive(Debug, Clone, Copy)]
pub struct UnitLoader<'a> {
    roots: &'a [PathBuf],
}

impl<'a> UnitLoader<'a> {
    /// Creates a loader over `roots`, searched in order
    pub fn new(roots: &'a [PathBuf]) -> Self {
        Self { roots }
    }

    /// Resolves `id`, preferring the engine's index
    pub fn resolve<E: ScriptEngine>(&self, engine: &mut E, id: &UnitId) -> Resolution<E::Compiled> {
        match engine.load_indexed(id) {
            Ok(Some(unit)) => Resolution::Loaded(unit),
            Ok(None) | Err(EngineError::UnknownResource(_)) => self.load_dynamic(engine, id),
            Err(err) => Resolution::Failed(err),
        }
    }

    /// First root that contains `id` as a file
    pub fn locate(&self, id: &UnitId) -> Option<PathBuf> {
        let relative = id.to_path();
        self.roots
            .iter()
            .map(|root| root.join(&relative))
            .find(|path| path.is_file())
    }

    fn load_dynamic<E: ScriptEngine>(&self, engine: &mut E, id: &UnitId) -> Resolution<E::Compiled> {
        let Some(path) = self.locate(id) else {
            return Resolution::NotFound;
        };

        log::debug!("Found path '{}' for dynamic unit {}", path.display(), id);

        match engine.compile_file(id, &path) {
            Ok(unit) => Resolution::Loaded(unit),
            Err(err) => Resolution::Failed(err),
        }
    }
}
