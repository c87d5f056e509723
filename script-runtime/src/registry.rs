//! Virtualized registries
//!
//! A [`VirtualizedRegistry`] wraps a collection owned by the host
//! application and remembers every change scripts make to it: entries added
//! during the current pass (`scripted`) and original entries that were
//! removed or replaced (`backup`). Reconciling before the next pass undoes
//! both, so every pass starts from the host's baseline.
//!
//! The overlay has no locking of its own. The sandbox serializes runs and
//! reloads, and shared host handles bring their own `Mutex`.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexSet;

use crate::error::ValidationError;

/// A host-owned collection an overlay can mutate in place
///
/// Implemented for common std collections, [`IndexSet`], and shared
/// `Arc<Mutex<_>>` handles around any of them.
pub trait HostCollection<T> {
    /// Adds an entry
    ///
    /// # Returns
    /// * `true` if the collection changed
    /// * `false` if a set already held an equal entry
    fn insert(&mut self, item: T) -> bool;

    /// Removes one entry equal to `item`
    ///
    /// # Returns
    /// * `true` if an entry was removed
    /// * `false` if no entry matched
    fn remove(&mut self, item: &T) -> bool;

    /// Removes and returns every entry matching `predicate`
    fn take_matching(&mut self, predicate: &mut dyn FnMut(&T) -> bool) -> Vec<T>;

    /// Whether an entry equal to `item` is present
    fn contains(&self, item: &T) -> bool;

    /// Copies of every entry, in iteration order
    fn items(&self) -> Vec<T>
    where
        T: Clone;

    /// Number of entries
    fn len(&self) -> usize;

    /// Whether the collection is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: PartialEq> HostCollection<T> for Vec<T> {
    fn insert(&mut self, item: T) -> bool {
        self.push(item);
        true
    }

    fn remove(&mut self, item: &T) -> bool {
        match self.iter().position(|existing| existing == item) {
            Some(index) => {
                Vec::remove(self, index);
                true
            }
            None => false,
        }
    }

    fn take_matching(&mut self, predicate: &mut dyn FnMut(&T) -> bool) -> Vec<T> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.len());
        for item in self.drain(..) {
            if predicate(&item) {
                taken.push(item);
            } else {
                kept.push(item);
            }
        }
        *self = kept;
        taken
    }

    fn contains(&self, item: &T) -> bool {
        self.as_slice().contains(item)
    }

    fn items(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.clone()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

impl<T: Eq + Hash> HostCollection<T> for HashSet<T> {
    fn insert(&mut self, item: T) -> bool {
        HashSet::insert(self, item)
    }

    fn remove(&mut self, item: &T) -> bool {
        HashSet::remove(self, item)
    }

    fn take_matching(&mut self, predicate: &mut dyn FnMut(&T) -> bool) -> Vec<T> {
        let mut taken = Vec::new();
        let kept: HashSet<T> = self
            .drain()
            .filter_map(|item| {
                if predicate(&item) {
                    taken.push(item);
                    None
                } else {
                    Some(item)
                }
            })
            .collect();
        *self = kept;
        taken
    }

    fn contains(&self, item: &T) -> bool {
        HashSet::contains(self, item)
    }

    fn items(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }

    fn len(&self) -> usize {
        HashSet::len(self)
    }
}

impl<T: Eq + Hash> HostCollection<T> for IndexSet<T> {
    fn insert(&mut self, item: T) -> bool {
        IndexSet::insert(self, item)
    }

    fn remove(&mut self, item: &T) -> bool {
        self.shift_remove(item)
    }

    fn take_matching(&mut self, predicate: &mut dyn FnMut(&T) -> bool) -> Vec<T> {
        let mut taken = Vec::new();
        let kept: IndexSet<T> = self
            .drain(..)
            .filter_map(|item| {
                if predicate(&item) {
                    taken.push(item);
                    None
                } else {
                    Some(item)
                }
            })
            .collect();
        *self = kept;
        taken
    }

    fn contains(&self, item: &T) -> bool {
        IndexSet::contains(self, item)
    }

    fn items(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }

    fn len(&self) -> usize {
        IndexSet::len(self)
    }
}

impl<T, C: HostCollection<T>> HostCollection<T> for Arc<Mutex<C>> {
    fn insert(&mut self, item: T) -> bool {
        self.lock().unwrap_or_else(PoisonError::into_inner).insert(item)
    }

    fn remove(&mut self, item: &T) -> bool {
        self.lock().unwrap_or_else(PoisonError::into_inner).remove(item)
    }

    fn take_matching(&mut self, predicate: &mut dyn FnMut(&T) -> bool) -> Vec<T> {
        self.lock().unwrap_or_else(PoisonError::into_inner).take_matching(predicate)
    }

    fn contains(&self, item: &T) -> bool {
        self.lock().unwrap_or_else(PoisonError::into_inner).contains(item)
    }

    fn items(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.lock().unwrap_or_else(PoisonError::into_inner).items()
    }

    fn len(&self) -> usize {
        self.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Something that must be reset before every reload
pub trait Reloadable {
    /// Undo everything recorded during the previous pass
    fn on_reload(&mut self);
}

impl<R: Reloadable> Reloadable for Arc<Mutex<R>> {
    fn on_reload(&mut self) {
        self.lock().unwrap_or_else(PoisonError::into_inner).on_reload();
    }
}

/// Counts from one [`VirtualizedRegistry::reconcile`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Script-added entries removed from the host
    pub removed: usize,
    /// Script-added entries that were already gone from the host
    pub missing: usize,
    /// Backed-up entries put back into the host
    pub restored: usize,
}

/// Overlay tracking script mutations of a host collection
#[derive(Debug)]
pub struct VirtualizedRegistry<T, H> {
    name: String,
    host: H,
    scripted: Vec<T>,
    backup: Vec<T>,
}

impl<T, H: HostCollection<T>> VirtualizedRegistry<T, H> {
    /// Wraps `host`, which stays owned by the caller's handle
    pub fn new(name: impl Into<String>, host: H) -> Self {
        Self {
            name: name.into(),
            host,
            scripted: Vec::new(),
            backup: Vec::new(),
        }
    }

    /// Registry name, used for bindings and diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped host collection
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the wrapped host collection
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Entries added by scripts during the current pass
    pub fn scripted(&self) -> &[T] {
        &self.scripted
    }

    /// Original entries displaced during the current pass
    pub fn backup(&self) -> &[T] {
        &self.backup
    }

    /// Attributes an addition to scripts
    ///
    /// Only tracks; the caller inserts into the host.
    pub fn record_added(&mut self, item: T) {
        self.scripted.push(item);
    }

    /// Returns and clears the scripted entries
    pub fn drain_scripted(&mut self) -> Vec<T> {
        std::mem::take(&mut self.scripted)
    }

    /// Remembers an original entry that left the host
    pub fn record_displaced(&mut self, item: T) {
        self.backup.push(item);
    }

    /// Returns and clears the displaced entries
    pub fn drain_backup(&mut self) -> Vec<T> {
        std::mem::take(&mut self.backup)
    }

    /// Restores the host to its state before the pass
    ///
    /// Every scripted entry is removed before any backed-up entry is
    /// re-added.
    pub fn reconcile(&mut self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for item in self.drain_scripted() {
            if self.host.remove(&item) {
                summary.removed = summary.removed.saturating_add(1);
            } else {
                summary.missing = summary.missing.saturating_add(1);
            }
        }

        for item in self.drain_backup() {
            self.host.insert(item);
            summary.restored = summary.restored.saturating_add(1);
        }

        summary
    }
}

impl<T: Clone + PartialEq, H: HostCollection<T>> VirtualizedRegistry<T, H> {
    /// Inserts into the host and attributes the entry to scripts
    ///
    /// An entry a set host already holds is not attributed, so reconciling
    /// cannot take a baseline entry with it.
    ///
    /// # Returns
    /// Whether the host changed
    pub fn add(&mut self, item: T) -> bool {
        let inserted = self.host.insert(item.clone());
        if inserted {
            self.record_added(item);
        }
        inserted
    }

    /// Validates, then adds
    ///
    /// A rejected entry leaves both the host and the scripted list untouched.
    pub fn try_add<F>(&mut self, item: T, validate: F) -> Result<(), ValidationError>
    where
        F: FnOnce(&T) -> Result<(), ValidationError>,
    {
        validate(&item)?;
        self.add(item);
        Ok(())
    }

    /// Removes one entry from the host
    ///
    /// An entry added by a script during this pass is simply forgotten;
    /// anything else is backed up for restoration.
    pub fn remove(&mut self, item: &T) -> bool {
        if !self.host.remove(item) {
            return false;
        }
        match self.scripted.iter().position(|added| added == item) {
            Some(index) => {
                self.scripted.remove(index);
            }
            None => self.record_displaced(item.clone()),
        }
        true
    }

    /// Removes every host entry matching `predicate`
    ///
    /// # Returns
    /// The number of entries removed
    pub fn remove_matching<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let taken = self.host.take_matching(&mut predicate);
        let count = taken.len();
        for item in taken {
            match self.scripted.iter().position(|added| *added == item) {
                Some(index) => {
                    self.scripted.remove(index);
                }
                None => self.record_displaced(item),
            }
        }
        count
    }

    /// Removes every host entry
    pub fn remove_all(&mut self) -> usize {
        self.remove_matching(|_| true)
    }
}

impl<T, H: HostCollection<T>> Reloadable for VirtualizedRegistry<T, H> {
    fn on_reload(&mut self) {
        let summary = self.reconcile();
        log::debug!(
            "Reloaded registry '{}': removed {} scripted ({} already gone), restored {}",
            self.name,
            summary.removed,
            summary.missing,
            summary.restored
        );
    }
}
