//! Registry overlays exposed to Lua
//!
//! A [`RegistryBinding`] installs a table of functions over a shared
//! [`VirtualizedRegistry`]:
//!
//! ```lua
//! Recipes.add({ output = "steel", inputs = { "iron", "coal" } })  -- true / false
//! Recipes.remove({ output = "bronze", inputs = { "copper", "tin" } })
//! Recipes.remove_if(function(r) return r.output == "gold" end)
//! Recipes.remove_all()
//! for _, r in ipairs(Recipes.list()) do print(r.output) end
//! ```
//!
//! Records cross the boundary as JSON, so any `serde` type works. Mutations
//! are only accepted while a sandbox is running on the VM; everything they
//! do is undone by the next reload.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mlua::{Function, Lua, Result as LuaResult, Table, Value};
use scriptbox_runtime::{HostCollection, ValidationError, VirtualizedRegistry};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    binding::{is_running, LuaBinding},
    error::BindingError,
    json::{from_record_json, json_to_lua, lua_to_json},
};

/// Checks a record before it is added
pub type Validator<T> = Arc<dyn Fn(&T) -> Result<(), ValidationError> + Send + Sync>;

/// Shared overlay handle
pub type SharedRegistry<T, H> = Arc<Mutex<VirtualizedRegistry<T, H>>>;

/// Lua table adapter for a shared registry overlay
pub struct RegistryBinding<T, H> {
    registry: SharedRegistry<T, H>,
    validator: Option<Validator<T>>,
}

impl<T, H> Clone for RegistryBinding<T, H> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            validator: self.validator.clone(),
        }
    }
}

impl<T, H> RegistryBinding<T, H>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Send + 'static,
    H: HostCollection<T> + Send + 'static,
{
    /// Creates an adapter for `registry`
    pub fn new(registry: SharedRegistry<T, H>) -> Self {
        Self {
            registry,
            validator: None,
        }
    }

    /// Rejects records `validator` does not accept
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// The wrapped overlay
    pub fn registry(&self) -> &SharedRegistry<T, H> {
        &self.registry
    }

    /// Binding value for [`Sandbox::register_binding`](scriptbox_runtime::Sandbox::register_binding)
    pub fn into_binding(self) -> LuaBinding {
        LuaBinding::native(move |lua| self.install(lua).map(Value::Table))
    }

    /// Builds the adapter table in `lua`
    pub fn install(&self, lua: &Lua) -> LuaResult<Table> {
        let table = lua.create_table()?;

        let add = {
            let this = self.clone();
            lua.create_function(move |lua, record: Value| this.add(lua, record))?
        };
        let remove = {
            let this = self.clone();
            lua.create_function(move |lua, record: Value| this.remove(lua, record))?
        };
        let remove_if = {
            let this = self.clone();
            lua.create_function(move |lua, predicate: Function| this.remove_if(lua, predicate))?
        };
        let remove_all = {
            let this = self.clone();
            lua.create_function(move |lua, ()| this.remove_all(lua))?
        };
        let list = {
            let this = self.clone();
            lua.create_function(move |lua, ()| this.list(lua))?
        };

        table.set("add", add)?;
        table.set("remove", remove)?;
        table.set("remove_if", remove_if)?;
        table.set("remove_all", remove_all)?;
        table.set("list", list)?;
        Ok(table)
    }

    fn lock(&self) -> MutexGuard<'_, VirtualizedRegistry<T, H>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn name(&self) -> String {
        self.lock().name().to_string()
    }

    fn ensure_running(&self, lua: &Lua) -> Result<(), BindingError> {
        if is_running(lua) {
            Ok(())
        } else {
            Err(BindingError::InactiveContext(self.name()))
        }
    }

    fn decode(&self, record: Value) -> LuaResult<T> {
        let json = lua_to_json(&record)?;
        from_record_json(json).map_err(|source| {
            BindingError::InvalidRecord {
                registry: self.name(),
                source,
            }
            .into()
        })
    }

    fn encode(&self, lua: &Lua, item: &T) -> LuaResult<Value> {
        let json = serde_json::to_value(item).map_err(|source| BindingError::Encode {
            registry: self.name(),
            source,
        })?;
        json_to_lua(lua, &json)
    }

    fn add(&self, lua: &Lua, record: Value) -> LuaResult<bool> {
        self.ensure_running(lua)?;
        let item = self.decode(record)?;

        let mut registry = self.lock();
        let result = match &self.validator {
            Some(validator) => registry.try_add(item, |item| (validator.as_ref())(item)),
            None => {
                registry.add(item);
                Ok(())
            }
        };
        match result {
            Ok(()) => Ok(true),
            Err(err) => {
                log::warn!("[{}] {}", registry.name(), err);
                Ok(false)
            }
        }
    }

    fn remove(&self, lua: &Lua, record: Value) -> LuaResult<bool> {
        self.ensure_running(lua)?;
        let item = self.decode(record)?;

        let removed = self.lock().remove(&item);
        if !removed {
            log::debug!("[{}] no matching entry to remove", self.name());
        }
        Ok(removed)
    }

    fn remove_if(&self, lua: &Lua, predicate: Function) -> LuaResult<usize> {
        self.ensure_running(lua)?;

        // The predicate may call back into this registry, so it runs on a
        // snapshot without holding the lock.
        let items = self.lock().host().items();
        let mut matched = Vec::new();
        for item in items {
            if predicate.call::<bool>(self.encode(lua, &item)?)? {
                matched.push(item);
            }
        }

        Ok(self.lock().remove_matching(|item| matched.contains(item)))
    }

    fn remove_all(&self, lua: &Lua) -> LuaResult<usize> {
        self.ensure_running(lua)?;
        Ok(self.lock().remove_all())
    }

    fn list(&self, lua: &Lua) -> LuaResult<Table> {
        let items = self.lock().host().items();
        let table = lua.create_table_with_capacity(items.len(), 0)?;
        for item in &items {
            table.raw_push(self.encode(lua, item)?)?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptbox_runtime::{ExecutionContext, SandboxId};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Recipe {
        output: String,
        inputs: Vec<String>,
    }

    fn recipe(output: &str, inputs: &[&str]) -> Recipe {
        Recipe {
            output: output.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn setup(host: Vec<Recipe>) -> (Lua, SharedRegistry<Recipe, Vec<Recipe>>) {
        let lua = Lua::new();
        let registry = Arc::new(Mutex::new(VirtualizedRegistry::new("Recipes", host)));
        let binding = RegistryBinding::new(Arc::clone(&registry)).with_validator(|recipe: &Recipe| {
            ValidationError::new("Error adding recipe")
                .add_if(recipe.output.is_empty(), "must name an output")
                .into_result()
        });
        lua.globals().set("Recipes", binding.install(&lua).unwrap()).unwrap();
        (lua, registry)
    }

    fn activate(lua: &Lua) {
        let mut context = ExecutionContext::new();
        context.activate(SandboxId::next());
        lua.set_app_data(context);
    }

    #[test]
    fn test_add_and_remove_are_recorded() {
        let (lua, registry) = setup(vec![recipe("bronze", &["copper", "tin"])]);
        activate(&lua);

        let added: bool = lua
            .load("return Recipes.add({ output = 'steel', inputs = { 'iron', 'coal' } })")
            .eval()
            .unwrap();
        let removed: bool = lua
            .load("return Recipes.remove({ output = 'bronze', inputs = { 'copper', 'tin' } })")
            .eval()
            .unwrap();

        assert!(added && removed);
        let registry = registry.lock().unwrap();
        assert_eq!(registry.host(), &vec![recipe("steel", &["iron", "coal"])]);
        assert_eq!(registry.scripted(), &[recipe("steel", &["iron", "coal"])]);
        assert_eq!(registry.backup(), &[recipe("bronze", &["copper", "tin"])]);
    }

    #[test]
    fn test_rejected_record_returns_false() {
        let (lua, registry) = setup(Vec::new());
        activate(&lua);

        let added: bool = lua
            .load("return Recipes.add({ output = '', inputs = { 'air' } })")
            .eval()
            .unwrap();

        assert!(!added);
        assert!(registry.lock().unwrap().host().is_empty());
        assert!(registry.lock().unwrap().scripted().is_empty());
    }

    #[test]
    fn test_malformed_record_raises() {
        let (lua, _registry) = setup(Vec::new());
        activate(&lua);

        let err = lua.load("Recipes.add({ output = 5 })").exec().unwrap_err();
        assert!(err.to_string().contains("Invalid Recipes record"), "{err}");
    }

    #[test]
    fn test_mutation_outside_run_raises() {
        let (lua, registry) = setup(Vec::new());

        let err = lua
            .load("Recipes.add({ output = 'steel', inputs = { 'iron' } })")
            .exec()
            .unwrap_err();

        assert!(err.to_string().contains("only be modified while a script is running"), "{err}");
        assert!(registry.lock().unwrap().host().is_empty());
    }

    #[test]
    fn test_list_is_readable_outside_run() {
        let (lua, _registry) = setup(vec![recipe("bronze", &["copper", "tin"])]);

        let output: String = lua.load("return Recipes.list()[1].output").eval().unwrap();
        assert_eq!(output, "bronze");
    }

    #[test]
    fn test_listed_records_with_empty_fields_can_be_removed() {
        let (lua, registry) = setup(vec![recipe("ash", &[]), recipe("glass", &["sand"])]);
        activate(&lua);

        lua.load("for _, r in ipairs(Recipes.list()) do assert(Recipes.remove(r)) end")
            .exec()
            .unwrap();

        assert!(registry.lock().unwrap().host().is_empty());
        assert_eq!(registry.lock().unwrap().backup().len(), 2);
    }

    #[test]
    fn test_add_with_empty_inputs_reaches_validator() {
        let (lua, registry) = setup(Vec::new());
        activate(&lua);

        let added: bool = lua
            .load("return Recipes.add({ output = 'slag', inputs = {} })")
            .eval()
            .unwrap();
        let rejected: bool = lua
            .load("return Recipes.add({ output = '', inputs = {} })")
            .eval()
            .unwrap();

        assert!(added);
        assert!(!rejected);
        assert_eq!(registry.lock().unwrap().host(), &vec![recipe("slag", &[])]);
    }

    #[test]
    fn test_remove_if_and_remove_all() {
        let (lua, registry) = setup(vec![
            recipe("gold", &["ore"]),
            recipe("iron", &["ore"]),
            recipe("glass", &["sand"]),
        ]);
        activate(&lua);

        let removed: usize = lua
            .load("return Recipes.remove_if(function(r) return r.inputs[1] == 'ore' end)")
            .eval()
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(registry.lock().unwrap().host(), &vec![recipe("glass", &["sand"])]);

        let removed: usize = lua.load("return Recipes.remove_all()").eval().unwrap();
        assert_eq!(removed, 1);

        registry.lock().unwrap().reconcile();
        assert_eq!(registry.lock().unwrap().host().len(), 3);
    }
}
