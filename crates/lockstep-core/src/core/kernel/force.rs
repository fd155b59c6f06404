use super::{KernelError, PairSum};
use super::flags::{KernelFlags, PairPolicy};
use super::geometry::KernelGeometry;
use crate::core::forcefield::params::PotentialMap;
use crate::core::models::atom::Atom;
use crate::core::models::configuration::Configuration;
use crate::core::pool::ProcessPool;
use nalgebra::Vector3;
use tracing::instrument;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Evaluates pair forces within one configuration.
#[derive(Debug, Clone)]
pub struct ForceKernel<'a> {
    geometry: KernelGeometry<'a>,
}

impl<'a> ForceKernel<'a> {
    pub fn new(
        configuration: &'a Configuration,
        potentials: &PotentialMap,
    ) -> Result<Self, KernelError> {
        Ok(Self {
            geometry: KernelGeometry::new(configuration, potentials)?,
        })
    }

    /// Force exerted on `i` by `j`. The force on `j` is its negation.
    pub fn pair_force(
        &self,
        i: &Atom,
        j: &Atom,
        flags: KernelFlags,
    ) -> Result<Vector3<f64>, KernelError> {
        let policy = flags.resolve()?;
        Ok(self.pair_force_with(&policy, i, j))
    }

    /// Force exerted on `i` by every atom of `neighbours`.
    pub fn atom_force<'n, I>(
        &self,
        i: &Atom,
        neighbours: I,
        flags: KernelFlags,
    ) -> Result<Vector3<f64>, KernelError>
    where
        I: IntoIterator<Item = &'n Atom>,
    {
        let policy = flags.resolve()?;
        Ok(neighbours
            .into_iter()
            .map(|j| self.pair_force_with(&policy, i, j))
            .fold(Vector3::zeros(), |acc, f| acc + f))
    }

    /// Net force on every atom of the configuration, ordered by atom index.
    ///
    /// Must be called by every worker of `pool` with the same `sum`. Each unordered pair
    /// is evaluated once, by the share owning its lower index, and the per-worker arrays
    /// are summed with [`ProcessPool::all_sum_by`].
    #[instrument(skip_all, name = "total_forces", fields(strategy = %sum.strategy))]
    pub fn total_forces(
        &self,
        pool: &dyn ProcessPool,
        sum: PairSum,
    ) -> Result<Vec<Vector3<f64>>, KernelError> {
        let policy = self.geometry.unique_pair_policy();
        let atoms = self.geometry.configuration.atoms();
        let n_atoms = atoms.len();
        let share: Vec<usize> = pool.interleaved_loop(n_atoms, sum.strategy).collect();

        let accumulate = |mut forces: Vec<Vector3<f64>>, index: usize| {
            let i = &atoms[index];
            for j in atoms[index + 1..].iter().filter(|j| sum.counts(i, j)) {
                let f = self.pair_force_with(&policy, i, j);
                forces[i.index()] += f;
                forces[j.index()] -= f;
            }
            forces
        };

        #[cfg(not(feature = "parallel"))]
        let local = share
            .iter()
            .fold(vec![Vector3::zeros(); n_atoms], |forces, &index| {
                accumulate(forces, index)
            });

        #[cfg(feature = "parallel")]
        let local = share
            .par_iter()
            .fold(
                || vec![Vector3::zeros(); n_atoms],
                |forces, &index| accumulate(forces, index),
            )
            .reduce(
                || vec![Vector3::zeros(); n_atoms],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                    a
                },
            );

        let mut flat: Vec<f64> = local.iter().flat_map(|f| [f.x, f.y, f.z]).collect();
        pool.all_sum_by(&mut flat, sum.strategy)?;
        Ok(flat
            .chunks_exact(3)
            .map(|c| Vector3::new(c[0], c[1], c[2]))
            .collect())
    }

    #[inline]
    fn pair_force_with(&self, policy: &PairPolicy, i: &Atom, j: &Atom) -> Vector3<f64> {
        match self.geometry.displacement(policy, i, j) {
            Some(delta) => {
                let distance = delta.norm();
                if distance < 1e-12 {
                    return Vector3::zeros();
                }
                let magnitude = self
                    .geometry
                    .pair(i, j)
                    .force(distance, self.geometry.dielectric);
                -delta * (magnitude / distance)
            }
            None => Vector3::zeros(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::params::{AtomTypeParams, ShortRangeFunctional};
    use crate::core::models::cell::PeriodicBox;
    use crate::core::models::molecule::MoleculeTemplate;
    use crate::core::pool::{DivisionStrategy, LocalPool, SerialPool};
    use nalgebra::Point3;

    fn potentials() -> PotentialMap {
        PotentialMap::new(10.0)
            .with_type(AtomTypeParams::new(
                "Na",
                1.0,
                ShortRangeFunctional::LennardJonesGeometric {
                    epsilon: 0.1,
                    sigma: 2.5,
                },
            ))
            .with_type(AtomTypeParams::new(
                "Cl",
                -1.0,
                ShortRangeFunctional::LennardJonesGeometric {
                    epsilon: 0.1,
                    sigma: 4.0,
                },
            ))
    }

    fn ion(name: &str) -> MoleculeTemplate {
        MoleculeTemplate::new(name).with_atom(name, Vector3::zeros())
    }

    fn salt() -> Configuration {
        let mut cfg = Configuration::new("salt");
        cfg.set_box(PeriodicBox::Cubic { length: 16.0 });
        let positions = [
            (0.0, 0.0, 0.0),
            (3.0, 0.5, 0.0),
            (0.2, 3.1, 0.4),
            (3.3, 3.0, 0.1),
            (7.5, 8.0, 9.0),
            (11.0, 12.5, 2.0),
        ];
        for (n, (x, y, z)) in positions.into_iter().enumerate() {
            let name = if n % 2 == 0 { "Na" } else { "Cl" };
            cfg.add_molecule(&ion(name), Point3::new(x, y, z));
        }
        cfg
    }

    #[test]
    fn opposite_charges_attract() {
        let mut cfg = Configuration::new("pair");
        cfg.add_molecule(&ion("Na"), Point3::origin());
        cfg.add_molecule(&ion("Cl"), Point3::new(6.0, 0.0, 0.0));
        let map = potentials();
        let kernel = ForceKernel::new(&cfg, &map).unwrap();
        let (na, cl) = (cfg.atom(0).unwrap(), cfg.atom(1).unwrap());

        let on_na = kernel.pair_force(na, cl, KernelFlags::NONE).unwrap();
        let on_cl = kernel.pair_force(cl, na, KernelFlags::NONE).unwrap();
        assert!(on_na.x > 0.0, "sodium is pulled towards chloride");
        assert!((on_na + on_cl).norm() < 1e-12);
    }

    #[test]
    fn pair_force_is_the_negative_gradient_of_pair_energy() {
        use crate::core::kernel::EnergyKernel;

        let mut cfg = Configuration::new("pair");
        cfg.add_molecule(&ion("Na"), Point3::origin());
        cfg.add_molecule(&ion("Cl"), Point3::new(3.2, 0.0, 0.0));
        let map = potentials();
        let force = ForceKernel::new(&cfg, &map)
            .unwrap()
            .pair_force(cfg.atom(1).unwrap(), cfg.atom(0).unwrap(), KernelFlags::NONE)
            .unwrap();

        let h = 1e-6;
        let energy_at = |x: f64| {
            let mut shifted = cfg.clone();
            shifted.set_atom_position(1, Point3::new(x, 0.0, 0.0)).unwrap();
            let kernel = EnergyKernel::new(&shifted, &map).unwrap();
            kernel
                .pair_energy(
                    shifted.atom(1).unwrap(),
                    shifted.atom(0).unwrap(),
                    KernelFlags::NONE,
                )
                .unwrap()
                .total()
        };
        let numerical = -(energy_at(3.2 + h) - energy_at(3.2 - h)) / (2.0 * h);
        assert!((force.x - numerical).abs() < 1e-4);
    }

    #[test]
    fn total_forces_sum_to_zero_and_match_atom_forces() {
        let cfg = salt();
        let map = potentials();
        let kernel = ForceKernel::new(&cfg, &map).unwrap();
        let forces = kernel.total_forces(&SerialPool, PairSum::new()).unwrap();

        let net = forces.iter().fold(Vector3::zeros(), |acc, f| acc + f);
        assert!(net.norm() < 1e-9);

        let flags = KernelFlags::EXCLUDE_SELF | KernelFlags::APPLY_MINIMUM_IMAGE;
        for atom in cfg.atoms() {
            let direct = kernel.atom_force(atom, cfg.atoms(), flags).unwrap();
            assert!((direct - forces[atom.index()]).norm() < 1e-9);
        }
    }

    #[test]
    fn distributed_forces_match_the_serial_result() {
        let cfg = salt();
        let map = potentials();
        let serial = ForceKernel::new(&cfg, &map)
            .unwrap()
            .total_forces(&SerialPool, PairSum::new())
            .unwrap();

        let distributed = LocalPool::run_grouped(3, 2, |pool| {
            let kernel = ForceKernel::new(&cfg, &map).unwrap();
            let pooled = kernel.total_forces(&pool, PairSum::new()).unwrap();
            let grouped = kernel
                .total_forces(
                    &pool,
                    PairSum::new().with_strategy(DivisionStrategy::Groups),
                )
                .unwrap();
            pooled.into_iter().chain(grouped).collect::<Vec<_>>()
        })
        .unwrap();

        for forces in distributed {
            assert_eq!(forces.len(), 2 * serial.len());
            for (a, b) in forces.iter().zip(serial.iter().cycle()) {
                assert!((a - b).norm() < 1e-9);
            }
        }
    }

    #[test]
    fn intermolecular_forces_ignore_bonded_partners() {
        let pair = MoleculeTemplate::new("NaCl")
            .with_atom("Na", Vector3::zeros())
            .with_atom("Cl", Vector3::new(3.0, 0.0, 0.0));
        let mut cfg = Configuration::new("ion-pair");
        cfg.add_molecule(&pair, Point3::origin());
        let map = potentials();
        let kernel = ForceKernel::new(&cfg, &map).unwrap();

        let all = kernel.total_forces(&SerialPool, PairSum::new()).unwrap();
        let inter = kernel
            .total_forces(&SerialPool, PairSum::new().intermolecular_only())
            .unwrap();
        assert!(all[0].norm() > 0.0);
        assert!(inter.iter().all(|f| f.norm() == 0.0));
    }
}
