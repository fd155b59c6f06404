use super::ItemError;
use super::key::{ItemKey, Scope};
use super::registry::BroadcastRegistry;
use super::slot::{ItemFlags, Slot, TypeTag};
use crate::core::pool::{PoolError, PoolExt, ProcessPool};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, type_name};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

/// One broadcast-registered item as announced by the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ManifestEntry {
    key: ItemKey,
    type_name: String,
}

/// Named, type-erased values owned by one worker.
///
/// Items are addressed by [`ItemKey`] and kept in key order, so every worker walks its
/// store in the same order regardless of insertion history. Each item carries a version
/// that is bumped once for every committed write.
#[derive(Debug, Default)]
pub struct ItemStore {
    items: BTreeMap<ItemKey, Slot>,
    registry: BroadcastRegistry,
}

impl ItemStore {
    /// Creates an empty store with an empty broadcast registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose registry already broadcasts the result types used by the
    /// built-in nodes and modules.
    pub fn with_standard_types() -> Self {
        Self {
            items: BTreeMap::new(),
            registry: BroadcastRegistry::standard(),
        }
    }

    pub fn registry(&self) -> &BroadcastRegistry {
        &self.registry
    }

    /// Registers the broadcast function for `T`. See [`BroadcastRegistry::register`].
    pub fn register_broadcaster<T, F>(&mut self, broadcast: F) -> Result<(), ItemError>
    where
        T: Any + Send + Sync + Default,
        F: Fn(&mut T, &dyn ProcessPool, usize) -> Result<(), PoolError> + Send + Sync + 'static,
    {
        self.registry.register::<T, F>(broadcast)
    }

    pub fn register_serde<T>(&mut self) -> Result<(), ItemError>
    where
        T: Any + Send + Sync + Default + Serialize + DeserializeOwned,
    {
        self.registry.register_serde::<T>()
    }

    /// Creates or overwrites an item and returns its new version.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::TypeMismatch`] if the item exists with a different type.
    pub fn insert<T: Any + Send + Sync>(
        &mut self,
        name: &str,
        scope: &Scope,
        value: T,
    ) -> Result<u64, ItemError> {
        self.insert_with_flags(name, scope, value, ItemFlags::NONE)
    }

    /// As [`ItemStore::insert`], additionally setting `flags` on the slot.
    pub fn insert_with_flags<T: Any + Send + Sync>(
        &mut self,
        name: &str,
        scope: &Scope,
        value: T,
        flags: ItemFlags,
    ) -> Result<u64, ItemError> {
        let key = ItemKey::new(scope.clone(), name);
        match self.items.get_mut(&key) {
            Some(slot) => {
                let found = slot.type_tag().name;
                let stored = slot
                    .downcast_mut::<T>()
                    .ok_or_else(|| ItemError::TypeMismatch {
                        key: key.clone(),
                        expected: type_name::<T>(),
                        found,
                    })?;
                *stored = value;
                slot.flags = slot.flags | flags;
                let version = slot.version.increment();
                trace!(item = %key, version, "Item overwritten.");
                Ok(version)
            }
            None => {
                let mut slot = Slot::new(value, flags);
                let version = slot.version.increment();
                trace!(item = %key, version, "Item created.");
                self.items.insert(key, slot);
                Ok(version)
            }
        }
    }

    /// Borrows an item as `T`.
    ///
    /// # Errors
    ///
    /// [`ItemError::NotFound`] if absent, [`ItemError::TypeMismatch`] if it holds another type.
    pub fn retrieve<T: Any>(&self, name: &str, scope: &Scope) -> Result<&T, ItemError> {
        let key = ItemKey::new(scope.clone(), name);
        let slot = self
            .items
            .get(&key)
            .ok_or_else(|| ItemError::NotFound { key: key.clone() })?;
        slot.downcast_ref::<T>()
            .ok_or_else(|| ItemError::TypeMismatch {
                expected: type_name::<T>(),
                found: slot.type_tag().name,
                key,
            })
    }

    /// Mutably borrows an item as `T`, bumping its version.
    pub fn retrieve_mut<T: Any>(&mut self, name: &str, scope: &Scope) -> Result<&mut T, ItemError> {
        let key = ItemKey::new(scope.clone(), name);
        let slot = self
            .items
            .get_mut(&key)
            .ok_or_else(|| ItemError::NotFound { key: key.clone() })?;
        Self::checked_mut(key, slot)
    }

    /// Mutably borrows an item as `T`, creating it from `T::default()` if absent.
    /// The version is bumped in both cases.
    pub fn realise<T: Any + Send + Sync + Default>(
        &mut self,
        name: &str,
        scope: &Scope,
    ) -> Result<&mut T, ItemError> {
        let key = ItemKey::new(scope.clone(), name);
        let slot = self
            .items
            .entry(key.clone())
            .or_insert_with(|| Slot::new(T::default(), ItemFlags::NONE));
        Self::checked_mut(key, slot)
    }

    fn checked_mut<T: Any>(key: ItemKey, slot: &mut Slot) -> Result<&mut T, ItemError> {
        let found = slot.type_tag().name;
        if slot.downcast_ref::<T>().is_none() {
            return Err(ItemError::TypeMismatch {
                key,
                expected: type_name::<T>(),
                found,
            });
        }
        slot.version.increment();
        slot.downcast_mut::<T>().ok_or(ItemError::TypeMismatch {
            key,
            expected: type_name::<T>(),
            found,
        })
    }

    pub fn contains(&self, name: &str, scope: &Scope) -> bool {
        self.items.contains_key(&ItemKey::new(scope.clone(), name))
    }

    /// Current version of an item, or `None` if it does not exist.
    pub fn version(&self, name: &str, scope: &Scope) -> Option<u64> {
        self.items
            .get(&ItemKey::new(scope.clone(), name))
            .map(|slot| slot.version.current())
    }

    pub fn type_name(&self, name: &str, scope: &Scope) -> Option<&'static str> {
        self.items
            .get(&ItemKey::new(scope.clone(), name))
            .map(|slot| slot.type_tag().name)
    }

    /// Removes an item, returning whether it existed.
    pub fn remove(&mut self, name: &str, scope: &Scope) -> bool {
        self.items
            .remove(&ItemKey::new(scope.clone(), name))
            .is_some()
    }

    /// Moves an item to a new name in the same scope, keeping value, type, flags and version.
    pub fn rename(&mut self, name: &str, scope: &Scope, new_name: &str) -> Result<(), ItemError> {
        let old_key = ItemKey::new(scope.clone(), name);
        let new_key = ItemKey::new(scope.clone(), new_name);
        if self.items.contains_key(&new_key) {
            return Err(ItemError::AlreadyExists { key: new_key });
        }
        let slot = self
            .items
            .remove(&old_key)
            .ok_or(ItemError::NotFound { key: old_key })?;
        self.items.insert(new_key, slot);
        Ok(())
    }

    /// Removes every item that is not [`ItemFlags::PROTECTED`].
    pub fn clear(&mut self) {
        self.items
            .retain(|_, slot| slot.flags.contains(ItemFlags::PROTECTED));
    }

    /// Removes every item, protected or not.
    pub fn clear_all(&mut self) {
        self.items.clear();
    }

    /// Removes every item owned by `scope`. Called when the scope's owner is torn down.
    pub fn clear_scope(&mut self, scope: &Scope) -> usize {
        let before = self.items.len();
        self.items.retain(|key, _| &key.scope != scope);
        let removed = before - self.items.len();
        debug!(%scope, removed, "Cleared item scope.");
        removed
    }

    /// Removes every item whose name ends with `suffix`, returning how many were removed.
    pub fn prune_with_suffix(&mut self, suffix: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|key, _| !key.name.ends_with(suffix));
        before - self.items.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ItemKey> {
        self.items.keys()
    }

    pub fn keys_in_scope<'a>(&'a self, scope: &'a Scope) -> impl Iterator<Item = &'a ItemKey> {
        self.items.keys().filter(move |key| &key.scope == scope)
    }

    pub fn keys_of_type<T: Any>(&self) -> impl Iterator<Item = &ItemKey> {
        let tag = TypeTag::of::<T>();
        self.items
            .iter()
            .filter(move |(_, slot)| slot.type_tag() == tag)
            .map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Broadcast-registered items of this worker, in key order.
    fn manifest(&self) -> Vec<ManifestEntry> {
        self.items
            .iter()
            .filter_map(|(key, slot)| {
                self.registry
                    .get(slot.type_tag().id)
                    .map(|broadcaster| ManifestEntry {
                        key: key.clone(),
                        type_name: broadcaster.type_name.to_string(),
                    })
            })
            .collect()
    }

    /// Keys of `manifest` that this worker cannot hold with the announced type.
    fn disagreements(&self, manifest: &[ManifestEntry]) -> Vec<ItemKey> {
        manifest
            .iter()
            .filter(|entry| match self.items.get(&entry.key) {
                Some(slot) => slot.type_tag().name != entry.type_name,
                None => self.registry.get_by_name(&entry.type_name).is_none(),
            })
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Replicates the root's broadcast-registered items onto every worker.
    ///
    /// Every worker must call this at the same point. The root first announces its
    /// manifest of broadcast-registered items; workers create the items they lack and
    /// agree that every announced type matches before any value is sent. Items are then
    /// broadcast one by one in key order and their versions bumped on receivers.
    ///
    /// # Errors
    ///
    /// - [`ItemError::Desynchronised`] if this worker cannot hold an announced item.
    /// - [`ItemError::RemoteDesynchronised`] if another worker cannot.
    /// - [`ItemError::Broadcast`] naming the first item whose broadcast failed on any
    ///   worker. Workers whose own broadcast succeeded report
    ///   [`PoolError::RemoteFailure`] as the source.
    pub fn broadcast_all(&mut self, pool: &dyn ProcessPool, root: usize) -> Result<(), ItemError> {
        pool.check_root(root)?;
        let is_root = pool.is_root(root);

        let mut manifest = if is_root {
            self.manifest()
        } else {
            Vec::new()
        };
        pool.broadcast_value(&mut manifest, root)?;

        let disagreements = self.disagreements(&manifest);
        if !pool.all_true(disagreements.is_empty())? {
            return Err(match disagreements.into_iter().next() {
                Some(key) => {
                    warn!(item = %key, "Item cannot be synchronised with the root.");
                    ItemError::Desynchronised { key }
                }
                None => ItemError::RemoteDesynchronised,
            });
        }

        let Self { items, registry } = self;
        for entry in &manifest {
            if !items.contains_key(&entry.key) {
                if let Some(broadcaster) = registry.get_by_name(&entry.type_name) {
                    items.insert(
                        entry.key.clone(),
                        Slot::from_erased(broadcaster.create(), ItemFlags::NONE),
                    );
                }
            }
        }

        for entry in &manifest {
            let outcome = Self::broadcast_slot(items, registry, entry, pool, root);
            if !pool.all_true(outcome.is_ok())? {
                warn!(item = %entry.key, rank = pool.rank(), "Item broadcast failed.");
                return Err(match outcome {
                    Err(e) => e,
                    Ok(()) => ItemError::Broadcast {
                        key: entry.key.clone(),
                        source: PoolError::RemoteFailure {
                            operation: "broadcast_all",
                        },
                    },
                });
            }
            if !is_root {
                if let Some(slot) = items.get_mut(&entry.key) {
                    slot.version.increment();
                }
            }
        }

        debug!(
            rank = pool.rank(),
            root,
            items = manifest.len(),
            "Item store synchronised."
        );
        Ok(())
    }

    /// Runs the registered broadcaster of one announced item on this worker.
    fn broadcast_slot(
        items: &mut BTreeMap<ItemKey, Slot>,
        registry: &BroadcastRegistry,
        entry: &ManifestEntry,
        pool: &dyn ProcessPool,
        root: usize,
    ) -> Result<(), ItemError> {
        let slot = items
            .get_mut(&entry.key)
            .ok_or_else(|| ItemError::NotFound {
                key: entry.key.clone(),
            })?;
        let broadcaster = registry
            .get(slot.type_tag().id)
            .ok_or_else(|| ItemError::NotRegistered {
                type_name: entry.type_name.clone(),
            })?;
        broadcaster.broadcast(&entry.key, slot.value.as_mut(), pool, root)
    }

    /// Collectively compares every worker's broadcast-registered items with the root's.
    ///
    /// Returns, on every worker, the sorted keys that are missing, extra or of a different
    /// type on at least one worker. An empty list means the stores are consistent.
    pub fn check_consistency(
        &self,
        pool: &dyn ProcessPool,
        root: usize,
    ) -> Result<Vec<ItemKey>, ItemError> {
        pool.check_root(root)?;

        let mut manifest = if pool.is_root(root) {
            self.manifest()
        } else {
            Vec::new()
        };
        pool.broadcast_value(&mut manifest, root)?;

        let mut local: Vec<ItemKey> = manifest
            .iter()
            .filter(|entry| {
                self.items
                    .get(&entry.key)
                    .is_none_or(|slot| slot.type_tag().name != entry.type_name)
            })
            .map(|entry| entry.key.clone())
            .collect();
        let announced: BTreeSet<&ItemKey> = manifest.iter().map(|entry| &entry.key).collect();
        local.extend(
            self.manifest()
                .into_iter()
                .filter(|entry| !announced.contains(&entry.key))
                .map(|entry| entry.key),
        );

        let mut inconsistent = BTreeSet::new();
        for rank in 0..pool.n_processes() {
            let mut reported = if pool.is_root(rank) {
                local.clone()
            } else {
                Vec::new()
            };
            pool.broadcast_value(&mut reported, rank)?;
            inconsistent.extend(reported);
        }

        if !inconsistent.is_empty() {
            warn!(
                count = inconsistent.len(),
                "Item stores differ between workers."
            );
        }
        Ok(inconsistent.into_iter().collect())
    }
}
