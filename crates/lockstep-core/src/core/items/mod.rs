//! # Item Store Module
//!
//! A type-erased store of named results shared by every node and module of a worker, and
//! the protocol that keeps it identical across the workers of a process pool.
//!
//! Values of any `'static + Send + Sync` type can be stored. Types that must be kept in
//! sync across workers register a broadcast function in the store's
//! [`registry::BroadcastRegistry`]; [`store::ItemStore::broadcast_all`] then walks every
//! broadcast-registered item in key order and replicates the root's value.

pub mod key;
pub mod registry;
pub mod slot;
pub mod store;

use crate::core::pool::PoolError;
use thiserror::Error;

pub use key::{ItemKey, Scope};
pub use registry::BroadcastRegistry;
pub use slot::{ItemFlags, TypeTag};
pub use store::ItemStore;

#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Item '{key}' does not exist")]
    NotFound { key: ItemKey },

    #[error("Item '{key}' holds type '{found}' but '{expected}' was requested")]
    TypeMismatch {
        key: ItemKey,
        expected: &'static str,
        found: &'static str,
    },

    #[error("A broadcaster for type '{type_name}' is already registered")]
    AlreadyRegistered { type_name: &'static str },

    #[error("No broadcaster is registered for type '{type_name}'")]
    NotRegistered { type_name: String },

    #[error("Item '{key}' already exists")]
    AlreadyExists { key: ItemKey },

    #[error("Broadcast of item '{key}' failed: {source}")]
    Broadcast {
        key: ItemKey,
        #[source]
        source: PoolError,
    },

    #[error("Item '{key}' cannot be synchronised with the root's copy")]
    Desynchronised { key: ItemKey },

    #[error("Item store of another worker cannot be synchronised with the root's copy")]
    RemoteDesynchronised,

    #[error("Collective operation failed: {0}")]
    Collective(#[from] PoolError),
}
