//! Conversion between Lua values and JSON values
//!
//! Records and bindings cross the Lua boundary as `serde_json::Value`, which
//! lets any `serde` type be exposed to scripts. A table is an array when its
//! keys are exactly `1..=n`; everything else becomes an object with string
//! keys. Empty tables become empty objects; [`from_record_json`] reads them
//! back as empty arrays when the target type needs a sequence there.

use mlua::{Lua, Result as LuaResult, Table, Value};
use serde::de::DeserializeOwned;

use crate::error::BindingError;

/// Deepest table nesting converted before giving up
pub const MAX_DEPTH: usize = 64;

/// Converts a Lua value to JSON
pub fn lua_to_json(value: &Value) -> LuaResult<serde_json::Value> {
    convert_value(value, 0)
}

fn convert_value(value: &Value, depth: usize) -> LuaResult<serde_json::Value> {
    match value {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Integer(i) => Ok(serde_json::json!(i)),
        Value::Number(n) => Ok(serde_json::json!(n)),
        Value::String(s) => Ok(serde_json::Value::String(s.to_string_lossy())),
        Value::Table(table) => convert_table(table, depth),
        other => Err(BindingError::Unconvertible(other.type_name()).into()),
    }
}

fn convert_table(table: &Table, depth: usize) -> LuaResult<serde_json::Value> {
    if depth >= MAX_DEPTH {
        return Err(BindingError::TooDeep(MAX_DEPTH).into());
    }
    let depth = depth.saturating_add(1);

    let pairs = table.pairs::<Value, Value>().collect::<LuaResult<Vec<_>>>()?;
    let len = table.raw_len();

    if len > 0 && pairs.len() == len {
        let mut items = Vec::with_capacity(len);
        for value in table.sequence_values::<Value>() {
            items.push(convert_value(&value?, depth)?);
        }
        return Ok(serde_json::Value::Array(items));
    }

    let mut map = serde_json::Map::new();
    for (key, value) in pairs {
        let key = match key {
            Value::String(s) => s.to_string_lossy(),
            Value::Integer(i) => i.to_string(),
            other => return Err(BindingError::Unconvertible(other.type_name()).into()),
        };
        map.insert(key, convert_value(&value, depth)?);
    }
    Ok(serde_json::Value::Object(map))
}

/// Deserializes JSON produced by [`lua_to_json`]
///
/// Lua cannot tell an empty array from an empty map. When the value does not
/// fit `T` as converted, it is retried once with every empty object read as
/// an empty array, and the first error is reported if that fails too.
pub fn from_record_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, serde_json::Error> {
    let relaxed = has_empty_object(&value).then(|| {
        let mut relaxed = value.clone();
        empty_objects_to_arrays(&mut relaxed);
        relaxed
    });
    match serde_json::from_value(value) {
        Ok(record) => Ok(record),
        Err(err) => match relaxed {
            Some(relaxed) => serde_json::from_value(relaxed).map_err(|_| err),
            None => Err(err),
        },
    }
}

fn has_empty_object(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(map) => map.is_empty() || map.values().any(has_empty_object),
        serde_json::Value::Array(items) => items.iter().any(has_empty_object),
        _ => false,
    }
}

fn empty_objects_to_arrays(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) if map.is_empty() => {
            *value = serde_json::Value::Array(Vec::new());
        }
        serde_json::Value::Object(map) => map.values_mut().for_each(empty_objects_to_arrays),
        serde_json::Value::Array(items) => items.iter_mut().for_each(empty_objects_to_arrays),
        _ => {}
    }
}

/// Converts a JSON value to a Lua value
pub fn json_to_lua(lua: &Lua, value: &serde_json::Value) -> LuaResult<Value> {
    match value {
        serde_json::Value::Null => Ok(Value::Nil),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Integer(i)),
            None => Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
        },
        serde_json::Value::String(s) => Ok(Value::String(lua.create_string(s.as_str())?)),
        serde_json::Value::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for item in items {
                table.raw_push(json_to_lua(lua, item)?)?;
            }
            Ok(Value::Table(table))
        }
        serde_json::Value::Object(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (key, item) in map {
                table.raw_set(key.as_str(), json_to_lua(lua, item)?)?;
            }
            Ok(Value::Table(table))
        }
    }
}
