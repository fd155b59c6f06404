use super::ids::MoleculeId;
use nalgebra::Point3;

/// A single particle within a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Index into the owning configuration's atom type list.
    pub type_index: usize,
    pub position: Point3<f64>,
    pub molecule_id: MoleculeId,
    index: usize,
}

impl Atom {
    pub(crate) fn new(
        index: usize,
        type_index: usize,
        molecule_id: MoleculeId,
        position: Point3<f64>,
    ) -> Self {
        Self {
            type_index,
            position,
            molecule_id,
            index,
        }
    }

    /// Global index of the atom within its configuration.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn same_molecule(&self, other: &Atom) -> bool {
        self.molecule_id == other.molecule_id
    }
}
