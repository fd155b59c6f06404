use super::atom::Atom;
use super::cell::PeriodicBox;
use super::ids::{ConfigurationId, MoleculeId};
use super::molecule::{Molecule, MoleculeTemplate};
use crate::core::utils::version::VersionCounter;
use nalgebra::Point3;
use slotmap::SlotMap;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Atom index {index} is out of range for a configuration of {n_atoms} atoms")]
    AtomOutOfRange { index: usize, n_atoms: usize },
    #[error("Configuration named '{0}' already exists")]
    DuplicateName(String),
    #[error("Configuration {0:?} does not exist")]
    UnknownConfiguration(ConfigurationId),
    #[error("Configuration {0:?} was requested more than once as a target")]
    RepeatedTarget(ConfigurationId),
}

/// A set of atoms, grouped into molecules, inside a periodic box.
///
/// This is the subject of computation handed to nodes and modules. Every committed
/// mutation bumps the contents version so that dependent caches (for instance a stored
/// energy) can detect that they are stale.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    /// Human readable name, also used to build item names for results.
    name: String,
    /// Atoms in insertion order; the position in this vector is the atom's global index.
    atoms: Vec<Atom>,
    /// Molecules, each referencing a contiguous run of atoms.
    molecules: SlotMap<MoleculeId, Molecule>,
    /// Names of the atom types used by the configuration, indexed by `Atom::type_index`.
    atom_types: Vec<String>,
    /// Periodic boundary conditions.
    periodic_box: PeriodicBox,
    /// Counter bumped once per committed mutation.
    contents_version: VersionCounter,
}

impl Configuration {
    /// Creates a new, empty, non-periodic configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all atoms, ordered by global index.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Retrieves an atom by its global index.
    ///
    /// # Return
    ///
    /// Returns `Some(&Atom)` if the index is in range, otherwise `None`.
    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn molecule(&self, id: MoleculeId) -> Option<&Molecule> {
        self.molecules.get(id)
    }

    pub fn molecules_iter(&self) -> impl Iterator<Item = (MoleculeId, &Molecule)> {
        self.molecules.iter()
    }

    pub fn n_molecules(&self) -> usize {
        self.molecules.len()
    }

    /// Names of the atom types present, indexed by `Atom::type_index`.
    pub fn atom_types(&self) -> &[String] {
        &self.atom_types
    }

    /// Finds the type index registered for an atom type name.
    pub fn type_index(&self, atom_type: &str) -> Option<usize> {
        self.atom_types.iter().position(|name| name == atom_type)
    }

    /// Returns an iterator over the atoms of the given type index.
    pub fn atoms_of_type(&self, type_index: usize) -> impl Iterator<Item = &Atom> {
        self.atoms
            .iter()
            .filter(move |atom| atom.type_index == type_index)
    }

    pub fn periodic_box(&self) -> &PeriodicBox {
        &self.periodic_box
    }

    /// Replaces the periodic box and folds every atom back into the new primary cell.
    pub fn set_box(&mut self, periodic_box: PeriodicBox) {
        self.periodic_box = periodic_box;
        for atom in &mut self.atoms {
            atom.position = periodic_box.fold(&atom.position);
        }
        self.contents_version.increment();
    }

    /// Adds a copy of a molecule template with its first atom placed relative to `origin`.
    ///
    /// Atom types named by the template are registered on first use. Positions are folded
    /// into the periodic box.
    ///
    /// # Arguments
    ///
    /// * `template` - The molecule blueprint to copy.
    /// * `origin` - Position to which the template offsets are added.
    ///
    /// # Return
    ///
    /// The key of the newly created molecule.
    pub fn add_molecule(&mut self, template: &MoleculeTemplate, origin: Point3<f64>) -> MoleculeId {
        let first_index = self.atoms.len();
        let indices: Vec<usize> = (first_index..first_index + template.atoms.len()).collect();
        let molecule_id = self
            .molecules
            .insert(Molecule::new(template.name.clone(), indices));

        for template_atom in &template.atoms {
            let type_index = self.intern_type(&template_atom.atom_type);
            let position = self.periodic_box.fold(&(origin + template_atom.offset));
            let index = self.atoms.len();
            self.atoms
                .push(Atom::new(index, type_index, molecule_id, position));
        }

        self.contents_version.increment();
        molecule_id
    }

    /// Moves a single atom, folding the new position into the box.
    pub fn set_atom_position(
        &mut self,
        index: usize,
        position: Point3<f64>,
    ) -> Result<(), ConfigurationError> {
        let n_atoms = self.atoms.len();
        let folded = self.periodic_box.fold(&position);
        let atom = self
            .atoms
            .get_mut(index)
            .ok_or(ConfigurationError::AtomOutOfRange { index, n_atoms })?;
        atom.position = folded;
        self.contents_version.increment();
        Ok(())
    }

    /// Removes all atoms, molecules and atom types, keeping the box.
    pub fn clear(&mut self) {
        self.atoms.clear();
        self.molecules.clear();
        self.atom_types.clear();
        self.contents_version.increment();
    }

    /// Atomic number density, or `None` for a non-periodic box.
    pub fn atomic_density(&self) -> Option<f64> {
        self.periodic_box
            .volume()
            .map(|volume| self.atoms.len() as f64 / volume)
    }

    /// Current value of the contents version counter.
    pub fn contents_version(&self) -> u64 {
        self.contents_version.current()
    }

    fn intern_type(&mut self, atom_type: &str) -> usize {
        match self.type_index(atom_type) {
            Some(index) => index,
            None => {
                self.atom_types.push(atom_type.to_string());
                self.atom_types.len() - 1
            }
        }
    }
}

/// Named collection of configurations shared by a simulation.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationSet {
    configurations: SlotMap<ConfigurationId, Configuration>,
    by_name: HashMap<String, ConfigurationId>,
}

impl ConfigurationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, configuration: Configuration) -> Result<ConfigurationId, ConfigurationError> {
        if self.by_name.contains_key(configuration.name()) {
            return Err(ConfigurationError::DuplicateName(
                configuration.name().to_string(),
            ));
        }
        let name = configuration.name().to_string();
        let id = self.configurations.insert(configuration);
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<ConfigurationId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: ConfigurationId) -> Option<&Configuration> {
        self.configurations.get(id)
    }

    pub fn get_mut(&mut self, id: ConfigurationId) -> Option<&mut Configuration> {
        self.configurations.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConfigurationId, &Configuration)> {
        self.configurations.iter()
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Borrows several distinct configurations mutably, in the order requested.
    pub fn targets_mut(
        &mut self,
        ids: &[ConfigurationId],
    ) -> Result<Vec<&mut Configuration>, ConfigurationError> {
        for (position, id) in ids.iter().enumerate() {
            if ids[..position].contains(id) {
                return Err(ConfigurationError::RepeatedTarget(*id));
            }
            if !self.configurations.contains_key(*id) {
                return Err(ConfigurationError::UnknownConfiguration(*id));
            }
        }

        let mut borrowed: HashMap<ConfigurationId, &mut Configuration> = self
            .configurations
            .iter_mut()
            .filter(|(id, _)| ids.contains(id))
            .collect();

        ids.iter()
            .map(|id| {
                borrowed
                    .remove(id)
                    .ok_or(ConfigurationError::UnknownConfiguration(*id))
            })
            .collect()
    }
}
