//! Errors raised by Lua-facing bindings

use thiserror::Error as ThisError;

/// Binding error types
///
/// Raised inside native functions and surfaced to the calling script as a
/// Lua error.
#[derive(Debug, ThisError)]
pub enum BindingError {
    /// A registry was mutated while no sandbox was running
    #[error("{0} can only be modified while a script is running")]
    InactiveContext(String),

    /// A Lua value could not be turned into a record
    #[error("Invalid {registry} record: {source}")]
    InvalidRecord {
        /// Registry the record was meant for
        registry: String,
        /// Decoding error
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be handed to Lua
    #[error("Failed to encode {registry} record: {source}")]
    Encode {
        /// Registry the record came from
        registry: String,
        /// Encoding error
        #[source]
        source: serde_json::Error,
    },

    /// A Lua value has no JSON representation
    #[error("Cannot convert a Lua {0} to a record value")]
    Unconvertible(&'static str),

    /// Tables nested deeper than the conversion limit, or cyclic
    #[error("Table nesting exceeds {0} levels")]
    TooDeep(usize),
}

impl From<BindingError> for mlua::Error {
    fn from(err: BindingError) -> Self {
        mlua::Error::external(err)
    }
}
