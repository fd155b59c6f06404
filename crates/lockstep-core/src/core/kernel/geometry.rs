use super::KernelError;
use super::flags::PairPolicy;
use crate::core::forcefield::params::{PairPotential, PotentialMap};
use crate::core::models::atom::Atom;
use crate::core::models::configuration::Configuration;
use nalgebra::Vector3;

/// Mixed pair potentials for every combination of a configuration's atom types.
#[derive(Debug, Clone)]
pub struct PairTable {
    n_types: usize,
    pairs: Vec<PairPotential>,
}

impl PairTable {
    /// Mixes the parameters of `atom_types`, indexed the same way as `Atom::type_index`.
    pub fn build(potentials: &PotentialMap, atom_types: &[String]) -> Result<Self, KernelError> {
        let params = atom_types
            .iter()
            .map(|name| {
                potentials
                    .get(name)
                    .ok_or_else(|| KernelError::MissingParameters {
                        atom_type: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let n_types = params.len();
        let mut pairs = Vec::with_capacity(n_types * n_types);
        for a in &params {
            for b in &params {
                pairs.push(PotentialMap::mix(a, b));
            }
        }
        Ok(Self { n_types, pairs })
    }

    #[inline]
    pub fn get(&self, type_a: usize, type_b: usize) -> &PairPotential {
        &self.pairs[type_a * self.n_types + type_b]
    }
}

/// Geometry and parameters shared by the energy and force kernels.
#[derive(Debug, Clone)]
pub(crate) struct KernelGeometry<'a> {
    pub configuration: &'a Configuration,
    pub table: PairTable,
    pub cutoff_squared: f64,
    pub dielectric: f64,
}

impl<'a> KernelGeometry<'a> {
    pub fn new(
        configuration: &'a Configuration,
        potentials: &PotentialMap,
    ) -> Result<Self, KernelError> {
        let cutoff = potentials.cutoff();
        Ok(Self {
            configuration,
            table: PairTable::build(potentials, configuration.atom_types())?,
            cutoff_squared: if cutoff > 0.0 {
                cutoff * cutoff
            } else {
                f64::INFINITY
            },
            dielectric: potentials.dielectric(),
        })
    }

    pub fn atom(&self, index: usize) -> Result<&'a Atom, KernelError> {
        self.configuration
            .atom(index)
            .ok_or(KernelError::AtomOutOfRange {
                index,
                n_atoms: self.configuration.n_atoms(),
            })
    }

    /// Displacement `j - i` under `policy`, or `None` when the pair is excluded or lies
    /// beyond the cutoff.
    #[inline]
    pub fn displacement(&self, policy: &PairPolicy, i: &Atom, j: &Atom) -> Option<Vector3<f64>> {
        if policy.excludes(i, j) {
            return None;
        }
        let delta = if policy.minimum_image {
            self.configuration
                .periodic_box()
                .minimum_image_vector(&i.position, &j.position)
        } else {
            j.position - i.position
        };
        (delta.norm_squared() <= self.cutoff_squared).then_some(delta)
    }

    #[inline]
    pub fn pair(&self, i: &Atom, j: &Atom) -> &PairPotential {
        self.table.get(i.type_index, j.type_index)
    }

    /// Flags used for whole-configuration sums: each unordered pair once, with the
    /// minimum image applied when the box is periodic.
    pub fn unique_pair_policy(&self) -> PairPolicy {
        PairPolicy {
            exclusion: super::flags::Exclusion::IndexOrder,
            minimum_image: self.configuration.periodic_box().is_periodic(),
        }
    }
}
