use super::ItemError;
use super::key::ItemKey;
use super::slot::{ErasedItem, ItemCell, TypeTag};
use crate::core::data::{Data1D, Histogram1D};
use crate::core::forcefield::term::EnergyTerm;
use crate::core::pool::{PoolError, PoolExt, ProcessPool};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

type ErasedBroadcastFn = Box<
    dyn Fn(&ItemKey, &mut dyn ErasedItem, &dyn ProcessPool, usize) -> Result<(), ItemError>
        + Send
        + Sync,
>;

pub(crate) struct Broadcaster {
    pub type_name: &'static str,
    broadcast: ErasedBroadcastFn,
    create: fn() -> Box<dyn ErasedItem>,
}

impl Broadcaster {
    pub fn broadcast(
        &self,
        key: &ItemKey,
        item: &mut dyn ErasedItem,
        pool: &dyn ProcessPool,
        root: usize,
    ) -> Result<(), ItemError> {
        (self.broadcast)(key, item, pool, root)
    }

    /// Default-constructed value of the registered type, used to create the receiving
    /// slot on workers that do not hold the item yet.
    pub fn create(&self) -> Box<dyn ErasedItem> {
        (self.create)()
    }
}

fn create_default<T: Any + Send + Sync + Default>() -> Box<dyn ErasedItem> {
    Box::new(ItemCell(T::default()))
}

/// Per-type table of broadcast functions, keyed by [`TypeId`].
///
/// At most one broadcaster may be registered for a type. Types are also indexed by their
/// type name, which is how the root's manifest refers to them on the wire.
#[derive(Default)]
pub struct BroadcastRegistry {
    entries: HashMap<TypeId, Broadcaster>,
    by_name: HashMap<&'static str, TypeId>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry broadcasting the result types used by the built-in nodes and modules.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.insert_serde::<f64>();
        registry.insert_serde::<i64>();
        registry.insert_serde::<u64>();
        registry.insert_serde::<bool>();
        registry.insert_serde::<String>();
        registry.insert_serde::<Vec<f64>>();
        registry.insert_serde::<Vec<[f64; 3]>>();
        registry.insert_serde::<EnergyTerm>();
        registry.insert_serde::<Histogram1D>();
        registry.insert_serde::<Data1D>();
        registry
    }

    /// Registers the broadcast function for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::AlreadyRegistered`] if `T` already has a broadcaster.
    pub fn register<T, F>(&mut self, broadcast: F) -> Result<(), ItemError>
    where
        T: Any + Send + Sync + Default,
        F: Fn(&mut T, &dyn ProcessPool, usize) -> Result<(), PoolError> + Send + Sync + 'static,
    {
        let tag = TypeTag::of::<T>();
        if self.entries.contains_key(&tag.id) {
            return Err(ItemError::AlreadyRegistered {
                type_name: tag.name,
            });
        }
        self.insert::<T, F>(broadcast);
        Ok(())
    }

    /// Registers a broadcaster that replicates `T` through its serde encoding.
    pub fn register_serde<T>(&mut self) -> Result<(), ItemError>
    where
        T: Any + Send + Sync + Default + Serialize + DeserializeOwned,
    {
        self.register::<T, _>(|value, pool, root| pool.broadcast_value(value, root))
    }

    fn insert_serde<T>(&mut self)
    where
        T: Any + Send + Sync + Default + Serialize + DeserializeOwned,
    {
        self.insert::<T, _>(|value, pool, root| pool.broadcast_value(value, root));
    }

    /// Stores the broadcaster of `T`, replacing any earlier one.
    fn insert<T, F>(&mut self, broadcast: F)
    where
        T: Any + Send + Sync + Default,
        F: Fn(&mut T, &dyn ProcessPool, usize) -> Result<(), PoolError> + Send + Sync + 'static,
    {
        let tag = TypeTag::of::<T>();
        let erased: ErasedBroadcastFn = Box::new(
            move |key: &ItemKey, item: &mut dyn ErasedItem, pool: &dyn ProcessPool, root: usize| {
                let found = item.type_tag().name;
                let cell = item
                    .as_any_mut()
                    .downcast_mut::<ItemCell<T>>()
                    .ok_or_else(|| ItemError::TypeMismatch {
                        key: key.clone(),
                        expected: tag.name,
                        found,
                    })?;
                broadcast(&mut cell.0, pool, root).map_err(|source| ItemError::Broadcast {
                    key: key.clone(),
                    source,
                })
            },
        );

        self.entries.insert(
            tag.id,
            Broadcaster {
                type_name: tag.name,
                broadcast: erased,
                create: create_default::<T>,
            },
        );
        self.by_name.insert(tag.name, tag.id);
    }

    pub fn is_registered<T: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn get(&self, id: TypeId) -> Option<&Broadcaster> {
        self.entries.get(&id)
    }

    pub(crate) fn get_by_name(&self, type_name: &str) -> Option<&Broadcaster> {
        self.by_name
            .get(type_name)
            .and_then(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for BroadcastRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("BroadcastRegistry")
            .field("types", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::SerialPool;

    #[test]
    fn registering_the_same_type_twice_is_rejected() {
        let mut registry = BroadcastRegistry::new();
        registry.register_serde::<f64>().unwrap();
        assert!(matches!(
            registry.register::<f64, _>(|_, _, _| Ok(())),
            Err(ItemError::AlreadyRegistered { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn standard_registry_covers_the_built_in_result_types() {
        let mut registry = BroadcastRegistry::standard();
        assert_eq!(registry.len(), 10);
        assert!(registry.is_registered::<Histogram1D>());
        assert!(registry.is_registered::<EnergyTerm>());
        assert!(matches!(
            registry.register_serde::<f64>(),
            Err(ItemError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn broadcasters_are_found_by_type_name() {
        let mut registry = BroadcastRegistry::new();
        registry.register_serde::<Vec<f64>>().unwrap();
        let broadcaster = registry
            .get_by_name(std::any::type_name::<Vec<f64>>())
            .unwrap();
        let created = broadcaster.create();
        assert_eq!(created.type_tag(), TypeTag::of::<Vec<f64>>());
        assert!(registry.is_registered::<Vec<f64>>());
        assert!(!registry.is_registered::<f64>());
    }

    #[test]
    fn erased_broadcast_invokes_the_registered_function() {
        let mut registry = BroadcastRegistry::new();
        registry
            .register::<i64, _>(|value, _, _| {
                *value += 1;
                Ok(())
            })
            .unwrap();

        let mut item: Box<dyn ErasedItem> = Box::new(ItemCell(41_i64));
        let broadcaster = registry.get(TypeId::of::<i64>()).unwrap();
        broadcaster
            .broadcast(&ItemKey::global("x"), item.as_mut(), &SerialPool, 0)
            .unwrap();

        let value = item.as_any().downcast_ref::<ItemCell<i64>>().unwrap();
        assert_eq!(value.0, 42);
    }
}
