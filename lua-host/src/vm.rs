//! Lua VM construction with restricted standard libraries
//!
//! Units run with string, table, math, utf8 and coroutine only. I/O, OS and
//! module loading are opened for privileged engines alone.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};

/// Controls which Lua standard libraries a VM opens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrustLevel {
    /// string, table, math, utf8, coroutine; no I/O or OS
    #[default]
    Basic,
    /// Everything in `Basic` plus io, os and package
    Elevated,
}

impl TrustLevel {
    /// Trust level for an engine configured with `privileged`
    pub fn from_privileged(privileged: bool) -> Self {
        if privileged {
            Self::Elevated
        } else {
            Self::Basic
        }
    }

    /// Standard libraries opened at this level
    pub fn libraries(self) -> StdLib {
        let basic = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE;
        match self {
            TrustLevel::Basic => basic,
            TrustLevel::Elevated => basic | StdLib::IO | StdLib::OS | StdLib::PACKAGE,
        }
    }
}

/// Creates a new Lua VM with sandbox restrictions applied
pub fn create_sandboxed_vm(trust: TrustLevel) -> LuaResult<Lua> {
    Lua::new_with(trust.libraries(), LuaOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_global(lua: &Lua, name: &str) -> bool {
        !matches!(lua.globals().get::<mlua::Value>(name).unwrap(), mlua::Value::Nil)
    }

    #[test]
    fn test_basic_vm_has_no_io_or_os() {
        let lua = create_sandboxed_vm(TrustLevel::Basic).unwrap();
        assert!(has_global(&lua, "string"));
        assert!(has_global(&lua, "table"));
        assert!(has_global(&lua, "math"));
        assert!(!has_global(&lua, "io"));
        assert!(!has_global(&lua, "os"));
        assert!(!has_global(&lua, "require"));
    }

    #[test]
    fn test_elevated_vm_opens_io_and_os() {
        let lua = create_sandboxed_vm(TrustLevel::Elevated).unwrap();
        assert!(has_global(&lua, "io"));
        assert!(has_global(&lua, "os"));
        assert!(has_global(&lua, "require"));
    }

    #[test]
    fn test_trust_from_privileged_flag() {
        assert_eq!(TrustLevel::from_privileged(false), TrustLevel::Basic);
        assert_eq!(TrustLevel::from_privileged(true), TrustLevel::Elevated);
    }
}
