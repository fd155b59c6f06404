use super::KernelError;
use crate::core::models::atom::Atom;
use std::fmt;
use std::ops::BitOr;

/// Exclusion and periodicity options of a kernel evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelFlags(u8);

impl KernelFlags {
    pub const NONE: KernelFlags = KernelFlags(0);
    /// Skip the pair when both atoms are the same atom.
    pub const EXCLUDE_SELF: KernelFlags = KernelFlags(1);
    /// Skip the pair when `index(i) >= index(j)`.
    pub const EXCLUDE_I_GE_J: KernelFlags = KernelFlags(1 << 1);
    /// Skip the pair when `index(i) >= index(j)` and both atoms share a molecule.
    pub const EXCLUDE_INTRA_I_GE_J: KernelFlags = KernelFlags(1 << 2);
    /// Use the minimum-image displacement between the atoms.
    pub const APPLY_MINIMUM_IMAGE: KernelFlags = KernelFlags(1 << 3);

    const EXCLUSIONS: u8 = 0b0111;

    pub fn contains(self, other: KernelFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Validates the combination and turns it into a [`PairPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::ConflictingExclusions`] when more than one exclusion flag is set.
    pub fn resolve(self) -> Result<PairPolicy, KernelError> {
        let exclusion = match self.0 & Self::EXCLUSIONS {
            0 => Exclusion::None,
            1 => Exclusion::SelfPair,
            2 => Exclusion::IndexOrder,
            4 => Exclusion::IntraMolecularIndexOrder,
            _ => return Err(KernelError::ConflictingExclusions(self)),
        };
        Ok(PairPolicy {
            exclusion,
            minimum_image: self.contains(Self::APPLY_MINIMUM_IMAGE),
        })
    }
}

impl BitOr for KernelFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        KernelFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for KernelFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::EXCLUDE_SELF, "ExcludeSelf"),
            (Self::EXCLUDE_I_GE_J, "ExcludeIGEJ"),
            (Self::EXCLUDE_INTRA_I_GE_J, "ExcludeIntraIGEJ"),
            (Self::APPLY_MINIMUM_IMAGE, "ApplyMinimumImage"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        if names.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    None,
    SelfPair,
    IndexOrder,
    IntraMolecularIndexOrder,
}

/// Validated form of [`KernelFlags`], applied to every pair of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairPolicy {
    pub exclusion: Exclusion,
    pub minimum_image: bool,
}

impl PairPolicy {
    #[inline]
    pub fn excludes(&self, i: &Atom, j: &Atom) -> bool {
        match self.exclusion {
            Exclusion::None => false,
            Exclusion::SelfPair => i.index() == j.index(),
            Exclusion::IndexOrder => i.index() >= j.index(),
            Exclusion::IntraMolecularIndexOrder => i.same_molecule(j) && i.index() >= j.index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_self_with_minimum_image_is_accepted() {
        let policy = (KernelFlags::EXCLUDE_SELF | KernelFlags::APPLY_MINIMUM_IMAGE)
            .resolve()
            .unwrap();
        assert_eq!(policy.exclusion, Exclusion::SelfPair);
        assert!(policy.minimum_image);
    }

    #[test]
    fn two_exclusion_flags_are_rejected() {
        let flags = KernelFlags::EXCLUDE_SELF | KernelFlags::EXCLUDE_I_GE_J;
        assert!(matches!(
            flags.resolve(),
            Err(KernelError::ConflictingExclusions(f)) if f == flags
        ));
        assert!(
            (KernelFlags::EXCLUDE_I_GE_J
                | KernelFlags::EXCLUDE_INTRA_I_GE_J
                | KernelFlags::APPLY_MINIMUM_IMAGE)
                .resolve()
                .is_err()
        );
    }

    #[test]
    fn no_flags_resolve_to_a_plain_policy() {
        let policy = KernelFlags::NONE.resolve().unwrap();
        assert_eq!(policy.exclusion, Exclusion::None);
        assert!(!policy.minimum_image);
    }

    #[test]
    fn display_lists_set_flags() {
        let flags = KernelFlags::EXCLUDE_SELF | KernelFlags::APPLY_MINIMUM_IMAGE;
        assert_eq!(flags.to_string(), "ExcludeSelf | ApplyMinimumImage");
        assert_eq!(KernelFlags::NONE.to_string(), "None");
    }
}
