use crate::core::utils::version::VersionCounter;
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::ops::BitOr;

/// Runtime identity of a stored type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeTag {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Bit flags attached to an item slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemFlags(u8);

impl ItemFlags {
    pub const NONE: ItemFlags = ItemFlags(0);
    /// The item survives [`super::ItemStore::clear`].
    pub const PROTECTED: ItemFlags = ItemFlags(1);

    pub fn contains(self, other: ItemFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ItemFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        ItemFlags(self.0 | rhs.0)
    }
}

/// Closed interface over a stored value.
pub trait ErasedItem: Any + Send + Sync {
    fn type_tag(&self) -> TypeTag;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Concrete wrapper through which a `T` is stored and recovered.
#[derive(Debug, Default)]
pub(crate) struct ItemCell<T>(pub T);

impl<T: Any + Send + Sync> ErasedItem for ItemCell<T> {
    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) struct Slot {
    pub value: Box<dyn ErasedItem>,
    pub version: VersionCounter,
    pub flags: ItemFlags,
}

impl Slot {
    pub fn new<T: Any + Send + Sync>(value: T, flags: ItemFlags) -> Self {
        Self::from_erased(Box::new(ItemCell(value)), flags)
    }

    pub fn from_erased(value: Box<dyn ErasedItem>, flags: ItemFlags) -> Self {
        Self {
            value,
            version: VersionCounter::new(),
            flags,
        }
    }

    #[inline]
    pub fn type_tag(&self) -> TypeTag {
        self.value.type_tag()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value
            .as_any()
            .downcast_ref::<ItemCell<T>>()
            .map(|cell| &cell.0)
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value
            .as_any_mut()
            .downcast_mut::<ItemCell<T>>()
            .map(|cell| &mut cell.0)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("type", &self.type_tag().name)
            .field("version", &self.version.current())
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_downcasts_only_to_the_stored_type() {
        let mut slot = Slot::new(42_i64, ItemFlags::NONE);
        assert_eq!(slot.downcast_ref::<i64>(), Some(&42));
        assert!(slot.downcast_ref::<f64>().is_none());

        *slot.downcast_mut::<i64>().unwrap() = 7;
        assert_eq!(slot.downcast_ref::<i64>(), Some(&7));
        assert_eq!(slot.type_tag(), TypeTag::of::<i64>());
    }

    #[test]
    fn item_flags_combine_with_bitor() {
        let flags = ItemFlags::NONE | ItemFlags::PROTECTED;
        assert!(flags.contains(ItemFlags::PROTECTED));
        assert!(!ItemFlags::NONE.contains(ItemFlags::PROTECTED));
    }
}
