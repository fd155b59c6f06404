use super::{KernelError, PairSum};
use super::flags::{KernelFlags, PairPolicy};
use super::geometry::KernelGeometry;
use crate::core::forcefield::params::PotentialMap;
use crate::core::forcefield::term::EnergyTerm;
use crate::core::models::atom::Atom;
use crate::core::models::configuration::Configuration;
use crate::core::pool::ProcessPool;
use tracing::{instrument, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Evaluates pair energies within one configuration.
#[derive(Debug, Clone)]
pub struct EnergyKernel<'a> {
    geometry: KernelGeometry<'a>,
}

impl<'a> EnergyKernel<'a> {
    pub fn new(
        configuration: &'a Configuration,
        potentials: &PotentialMap,
    ) -> Result<Self, KernelError> {
        Ok(Self {
            geometry: KernelGeometry::new(configuration, potentials)?,
        })
    }

    /// Energy of the pair `(i, j)`, zero if the pair is excluded or beyond the cutoff.
    pub fn pair_energy(
        &self,
        i: &Atom,
        j: &Atom,
        flags: KernelFlags,
    ) -> Result<EnergyTerm, KernelError> {
        let policy = flags.resolve()?;
        Ok(self.pair_energy_with(&policy, i, j))
    }

    /// Energy of atom `i` with every atom of `neighbours`.
    pub fn atom_energy<'n, I>(
        &self,
        i: &Atom,
        neighbours: I,
        flags: KernelFlags,
    ) -> Result<EnergyTerm, KernelError>
    where
        I: IntoIterator<Item = &'n Atom>,
    {
        let policy = flags.resolve()?;
        Ok(neighbours
            .into_iter()
            .map(|j| self.pair_energy_with(&policy, i, j))
            .sum())
    }

    /// Energy of atom `index` with every other atom of the configuration.
    pub fn atom_energy_by_index(&self, index: usize) -> Result<EnergyTerm, KernelError> {
        let i = self.geometry.atom(index)?;
        let flags = if self.geometry.configuration.periodic_box().is_periodic() {
            KernelFlags::EXCLUDE_SELF | KernelFlags::APPLY_MINIMUM_IMAGE
        } else {
            KernelFlags::EXCLUDE_SELF
        };
        self.atom_energy(i, self.geometry.configuration.atoms(), flags)
    }

    /// Total pair energy of the configuration, counting each unordered pair once.
    ///
    /// Must be called by every worker of `pool` with the same `sum`; each evaluates the
    /// share of the outer loop given by its strategy and the shares are summed with
    /// [`ProcessPool::all_sum_by`].
    #[instrument(skip_all, name = "total_pair_energy", fields(strategy = %sum.strategy))]
    pub fn total_pair_energy(
        &self,
        pool: &dyn ProcessPool,
        sum: PairSum,
    ) -> Result<EnergyTerm, KernelError> {
        let policy = self.geometry.unique_pair_policy();
        let atoms = self.geometry.configuration.atoms();
        let share: Vec<usize> = pool.interleaved_loop(atoms.len(), sum.strategy).collect();

        #[cfg(not(feature = "parallel"))]
        let iterator = share.iter();

        #[cfg(feature = "parallel")]
        let iterator = share.par_iter();

        let local: EnergyTerm = iterator
            .map(|&index| {
                let i = &atoms[index];
                atoms[index + 1..]
                    .iter()
                    .filter(|j| sum.counts(i, j))
                    .map(|j| self.pair_energy_with(&policy, i, j))
                    .sum::<EnergyTerm>()
            })
            .sum();

        let mut totals = local.to_array();
        pool.all_sum_by(&mut totals, sum.strategy)?;
        let total = EnergyTerm::from_array(totals);
        trace!(
            rank = pool.rank(),
            local = local.total(),
            total = total.total(),
            "Pair energy reduced."
        );
        Ok(total)
    }

    #[inline]
    fn pair_energy_with(&self, policy: &PairPolicy, i: &Atom, j: &Atom) -> EnergyTerm {
        match self.geometry.displacement(policy, i, j) {
            Some(delta) => self
                .geometry
                .pair(i, j)
                .energy(delta.norm(), self.geometry.dielectric),
            None => EnergyTerm::default(),
        }
    }
}
