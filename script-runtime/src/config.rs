//! Run configuration
//!
//! A run config is a JSON file naming the environment roots and the class
//! and script units of a sandbox:
//!
//! ```json
//! {
//!   "name": "demo",
//!   "roots": ["."],
//!   "classes": ["classes/recipe_util.lua"],
//!   "scripts": ["scripts/main.lua"],
//!   "disabled": [],
//!   "debug": false
//! }
//! ```
//!
//! Relative roots are resolved against the directory holding the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    engine::{EngineConfig, ScriptEngine},
    error::ConfigError,
    sandbox::SandboxHost,
    unit::UnitId,
};

/// Parsed run configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Display name of the script pack
    pub name: String,
    /// Environment roots; empty means the config directory
    pub roots: Vec<PathBuf>,
    /// Class units in execution order
    pub classes: Vec<String>,
    /// Script units in execution order
    pub scripts: Vec<String>,
    /// Units that are resolved but never executed
    pub disabled: Vec<String>,
    /// Enables engine debug output
    pub debug: bool,
}

impl RunConfig {
    /// Reads and validates a config file
    ///
    /// Roots come back absolute, resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&text)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_roots(base);
        log::debug!(
            "Loaded run config '{}' from {} ({} classes, {} scripts)",
            config.name,
            path.display(),
            config.classes.len(),
            config.scripts.len()
        );
        Ok(config)
    }

    /// Parses and validates config JSON without touching the roots
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Makes relative roots absolute against `base`
    ///
    /// An empty root list becomes `[base]`.
    pub fn resolve_roots(&mut self, base: &Path) {
        if self.roots.is_empty() {
            self.roots.push(base.to_path_buf());
            return;
        }
        for root in &mut self.roots {
            if root.is_relative() {
                *root = base.join(&*root);
            }
        }
    }

    /// Class unit ids in execution order
    pub fn class_units(&self) -> Vec<UnitId> {
        self.classes.iter().map(UnitId::new).collect()
    }

    /// Script unit ids in execution order
    pub fn script_units(&self) -> Vec<UnitId> {
        self.scripts.iter().map(UnitId::new).collect()
    }

    /// Whether `unit` may execute
    pub fn is_enabled(&self, unit: &UnitId) -> bool {
        !self.disabled.iter().any(|disabled| UnitId::new(disabled) == *unit)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(blank) = self.classes.iter().chain(&self.scripts).find(|id| id.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("blank unit id {blank:?}")));
        }
        if let Some(duplicate) = self.classes.iter().find(|id| self.scripts.contains(id)) {
            return Err(ConfigError::Invalid(format!(
                "'{duplicate}' is listed as both a class and a script"
            )));
        }
        Ok(())
    }
}

impl<E: ScriptEngine> SandboxHost<E> for RunConfig {
    fn class_units(&self) -> Vec<UnitId> {
        RunConfig::class_units(self)
    }

    fn script_units(&self) -> Vec<UnitId> {
        RunConfig::script_units(self)
    }

    fn configure_engine(&mut self, config: &mut EngineConfig) {
        config.debug |= self.debug;
    }

    fn should_run(&self, unit: &UnitId) -> bool {
        self.is_enabled(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        report::UnitOutcome,
        sandbox::Sandbox,
        testing::{write_unit, FileEngine},
    };

    #[test]
    fn test_parse_full_config() {
        let config = RunConfig::from_json_str(
            r#"{
                "name": "demo",
                "roots": ["packs/base"],
                "classes": ["classes/recipe_util.lua"],
                "scripts": ["scripts/main.lua", "scripts/extra.lua"],
                "disabled": ["scripts/extra.lua"],
                "debug": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.name, "demo");
        assert!(config.debug);
        assert_eq!(config.class_units(), vec![UnitId::new("classes/recipe_util.lua")]);
        assert_eq!(config.script_units().len(), 2);
        assert!(config.is_enabled(&UnitId::new("scripts/main.lua")));
        assert!(!config.is_enabled(&UnitId::new("scripts/extra.lua")));
    }

    #[test]
    fn test_missing_fields_default() {
        let config = RunConfig::from_json_str(r#"{"scripts": ["main.lua"]}"#).unwrap();
        assert!(config.roots.is_empty());
        assert!(config.classes.is_empty());
        assert!(!config.debug);
    }

    #[test]
    fn test_rejects_unknown_fields_and_bad_json() {
        assert!(matches!(
            RunConfig::from_json_str(r#"{"scirpts": []}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(RunConfig::from_json_str("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_unit_in_both_lists() {
        let err = RunConfig::from_json_str(r#"{"classes": ["a.lua"], "scripts": ["a.lua"]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_resolves_roots_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_config.json");
        fs::write(&path, r#"{"roots": ["scripts", "/abs/root"]}"#).unwrap();

        let config = RunConfig::load(&path).unwrap();

        assert_eq!(config.roots, vec![dir.path().join("scripts"), PathBuf::from("/abs/root")]);
    }

    #[test]
    fn test_load_defaults_root_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_config.json");
        fs::write(&path, "{}").unwrap();

        assert_eq!(RunConfig::load(&path).unwrap().roots, vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RunConfig::load(&dir.path().join("nope.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_config_drives_a_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "classes/util.unit", "kind: class");
        write_unit(dir.path(), "scripts/main.unit", "");
        write_unit(dir.path(), "scripts/off.unit", "");
        let path = dir.path().join("run_config.json");
        fs::write(
            &path,
            r#"{
                "classes": ["classes/util.unit"],
                "scripts": ["scripts/main.unit", "scripts/off.unit"],
                "disabled": ["scripts/off.unit"]
            }"#,
        )
        .unwrap();

        let config = RunConfig::load(&path).unwrap();
        let mut sandbox = Sandbox::<FileEngine, _>::new(config.roots.clone(), config).unwrap();
        let report = sandbox.run().unwrap();

        assert_eq!(report.count(UnitOutcome::Executed), 2);
        assert_eq!(
            report.outcome_of(&UnitId::new("scripts/off.unit")),
            Some(UnitOutcome::SkippedByPredicate)
        );
    }
}
