//! Binding namespace shared with executing units
//!
//! Values registered on the sandbox live in a [`BindingNamespace`] for the
//! sandbox's whole lifetime; it is never cleared between runs. Each run works
//! on a [`Bindings`] snapshot so run-scoped additions do not leak back.

use indexmap::IndexMap;

use crate::error::{Result, SandboxError};

/// Derives the names a binding is visible under
pub trait AliasPolicy: Send + Sync {
    /// Every visible name for `name`, including `name` itself
    fn aliases(&self, name: &str) -> Vec<String>;
}

/// Exposes a binding under its own name only
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactName;

impl AliasPolicy for ExactName {
    fn aliases(&self, name: &str) -> Vec<String> {
        vec![name.to_string()]
    }
}

/// Case variants of a name
///
/// `InjectionChamber` is also visible as `injectionChamber`,
/// `injectionchamber` and `injection_chamber`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseAliases;

impl AliasPolicy for CaseAliases {
    fn aliases(&self, name: &str) -> Vec<String> {
        let mut aliases = vec![name.to_string()];
        let mut push = |alias: String| {
            if !alias.is_empty() && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        };

        let mut chars = name.chars();
        if let Some(first) = chars.next() {
            push(first.to_lowercase().chain(chars).collect());
        }
        push(name.to_lowercase());
        push(snake_case(name));
        aliases
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len().saturating_add(4));
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Name to value map visible to every unit of a run
#[derive(Debug, Clone)]
pub struct Bindings<B> {
    entries: IndexMap<String, B>,
}

impl<B> Default for Bindings<B> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<B> Bindings<B> {
    /// Creates an empty binding set
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: B) -> Option<B> {
        self.entries.insert(name.into(), value)
    }

    /// Looks up a binding
    pub fn get(&self, name: &str) -> Option<&B> {
        self.entries.get(name)
    }

    /// Whether `name` is bound
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Bound names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All bindings in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &B)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of visible names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Long-lived binding registry of a sandbox
pub struct BindingNamespace<B> {
    bindings: Bindings<B>,
    policy: Box<dyn AliasPolicy>,
}

impl<B: Clone> BindingNamespace<B> {
    /// Creates a namespace using the given alias policy
    pub fn new(policy: Box<dyn AliasPolicy>) -> Self {
        Self {
            bindings: Bindings::new(),
            policy,
        }
    }

    /// Registers `value` under `name` and every alias derived from it
    ///
    /// Later registrations overwrite earlier ones for the same visible name.
    pub fn register(&mut self, name: &str, value: B) -> Result<()> {
        if name.trim().is_empty() {
            return Err(SandboxError::InvalidBinding(name.to_string()));
        }
        for alias in self.policy.aliases(name) {
            self.bindings.insert(alias, value.clone());
        }
        Ok(())
    }

    /// Looks up a visible name
    pub fn get(&self, name: &str) -> Option<&B> {
        self.bindings.get(name)
    }

    /// Number of visible names
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Copies the namespace into a run-scoped binding set
    pub fn snapshot(&self) -> Bindings<B> {
        self.bindings.clone()
    }
}

impl<B: Clone> Default for BindingNamespace<B> {
    fn default() -> Self {
        Self::new(Box::new(CaseAliases))
    }
}

impl<B> std::fmt::Debug for BindingNamespace<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingNamespace")
            .field("names", &self.bindings.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
