//! Unit identity and classification

use std::fmt;
use std::path::{Path, PathBuf};

/// Relative identifier of a unit, always `/`-separated
///
/// The same id is resolved against every environment root in turn, so it
/// never carries a leading separator and never climbs out of a root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(String);

impl UnitId {
    /// Creates a unit id, normalizing separators
    ///
    /// Empty, `.` and `..` segments are dropped, so `../util.lua` names
    /// `util.lua` inside each root.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into().replace('\\', "/");
        let segments: Vec<&str> = id
            .split('/')
            .filter(|segment| !matches!(*segment, "" | "." | ".."))
            .collect();
        Self(segments.join("/"))
    }

    /// Creates a unit id from a path relative to an environment root
    ///
    /// Returns `None` if `path` is not under `root`.
    pub fn from_relative(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(Self::new(parts.join("/")))
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as a relative path, suitable for joining onto a root
    pub fn to_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UnitId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// What a loaded unit declares itself to be
///
/// Assigned by the engine from static metadata when the unit is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Shared definitions; runs before every script unit
    Class,
    /// A top-level program run once per pass
    Script,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Class => f.write_str("class"),
            UnitKind::Script => f.write_str("script"),
        }
    }
}

/// A compiled unit ready to execute
#[derive(Debug)]
pub struct Unit<C> {
    /// Identifier the unit was resolved from
    pub id: UnitId,
    /// Classification read at load time
    pub kind: UnitKind,
    /// File the unit was compiled from, if it came from disk
    pub source: Option<PathBuf>,
    /// Engine-specific compiled form
    pub compiled: C,
}

impl<C> Unit<C> {
    /// Creates a unit
    pub fn new(id: UnitId, kind: UnitKind, compiled: C) -> Self {
        Self {
            id,
            kind,
            source: None,
            compiled,
        }
    }

    /// Records the file the unit was compiled from
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_normalizes_separators() {
        assert_eq!(UnitId::new("scripts\\main.lua").as_str(), "scripts/main.lua");
        assert_eq!(UnitId::new("/classes/util.lua").as_str(), "classes/util.lua");
    }

    #[test]
    fn test_unit_id_stays_inside_roots() {
        assert_eq!(UnitId::new("../secrets.lua").as_str(), "secrets.lua");
        assert_eq!(UnitId::new("scripts/../../etc/passwd").as_str(), "scripts/etc/passwd");
        assert_eq!(UnitId::new("./scripts//main.lua").as_str(), "scripts/main.lua");

        let joined = Path::new("/pack").join(UnitId::new("../../outside.lua").to_path());
        assert_eq!(joined, Path::new("/pack/outside.lua"));
    }

    #[test]
    fn test_unit_id_from_relative() {
        let root = Path::new("/pack/scripts");
        let id = UnitId::from_relative(root, Path::new("/pack/scripts/classes/util.lua")).unwrap();
        assert_eq!(id, UnitId::new("classes/util.lua"));

        assert!(UnitId::from_relative(root, Path::new("/elsewhere/util.lua")).is_none());
    }

    #[test]
    fn test_unit_id_to_path_joins_onto_root() {
        let id = UnitId::new("classes/util.lua");
        let joined = Path::new("/pack").join(id.to_path());
        assert_eq!(joined, Path::new("/pack/classes/util.lua"));
    }
}
