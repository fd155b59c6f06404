use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAtom {
    pub atom_type: String,
    pub offset: Vector3<f64>,
}

/// Blueprint from which copies of a molecule are added to a configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MoleculeTemplate {
    pub name: String,
    pub atoms: Vec<TemplateAtom>,
}

impl MoleculeTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            atoms: Vec::new(),
        }
    }

    pub fn with_atom(mut self, atom_type: impl Into<String>, offset: Vector3<f64>) -> Self {
        self.atoms.push(TemplateAtom {
            atom_type: atom_type.into(),
            offset,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

/// A molecule instance living in a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    pub template_name: String,
    atoms: Vec<usize>,
}

impl Molecule {
    pub(crate) fn new(template_name: impl Into<String>, atoms: Vec<usize>) -> Self {
        Self {
            template_name: template_name.into(),
            atoms,
        }
    }

    /// Global indices of the atoms belonging to this molecule.
    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }
}
