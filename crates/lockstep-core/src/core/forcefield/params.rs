use super::potentials;
use super::term::EnergyTerm;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Short-range functional form chosen by the external forcefield for an atom type.
///
/// The core treats this as opaque data: it only knows how to mix two forms into a pair
/// potential and evaluate it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "kebab-case")]
pub enum ShortRangeFunctional {
    #[default]
    None,
    /// Lennard-Jones in `sigma` form, mixed geometrically with other geometric types.
    LennardJonesGeometric { epsilon: f64, sigma: f64 },
    /// Lennard-Jones in `r_min` form.
    LennardJones126 { epsilon: f64, r_min: f64 },
}

impl ShortRangeFunctional {
    /// `(epsilon, sigma)` of the form, or `None` for a type without short-range interactions.
    fn epsilon_sigma(&self) -> Option<(f64, f64)> {
        match *self {
            ShortRangeFunctional::None => None,
            ShortRangeFunctional::LennardJonesGeometric { epsilon, sigma } => Some((epsilon, sigma)),
            ShortRangeFunctional::LennardJones126 { epsilon, r_min } => {
                Some((epsilon, r_min / 2.0_f64.powf(1.0 / 6.0)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomTypeParams {
    pub name: String,
    pub charge: f64,
    pub short_range: ShortRangeFunctional,
}

impl AtomTypeParams {
    pub fn new(name: impl Into<String>, charge: f64, short_range: ShortRangeFunctional) -> Self {
        Self {
            name: name.into(),
            charge,
            short_range,
        }
    }
}

/// Fully mixed interaction between two atom types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairPotential {
    /// Mixed `(epsilon, sigma)`, absent when either type has no short-range form.
    pub short_range: Option<(f64, f64)>,
    pub charge_product: f64,
}

impl PairPotential {
    #[inline]
    pub fn energy(&self, distance: f64, dielectric: f64) -> EnergyTerm {
        let short_range = self
            .short_range
            .map(|(epsilon, sigma)| potentials::lennard_jones_sigma(distance, sigma, epsilon))
            .unwrap_or(0.0);
        let coulomb = if self.charge_product == 0.0 {
            0.0
        } else {
            potentials::coulomb(distance, self.charge_product, 1.0, dielectric)
        };
        EnergyTerm::new(short_range, coulomb)
    }

    /// Radial force `-dU/dr`; positive values push the pair apart.
    #[inline]
    pub fn force(&self, distance: f64, dielectric: f64) -> f64 {
        let short_range = self
            .short_range
            .map(|(epsilon, sigma)| {
                potentials::lennard_jones_sigma_force(distance, sigma, epsilon)
            })
            .unwrap_or(0.0);
        let coulomb = if self.charge_product == 0.0 {
            0.0
        } else {
            potentials::coulomb_force(distance, self.charge_product, 1.0, dielectric)
        };
        short_range + coulomb
    }
}

/// Per-atom-type parameters handed to the kernels by the forcefield boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialMap {
    types: HashMap<String, AtomTypeParams>,
    cutoff: f64,
    dielectric: f64,
}

impl PotentialMap {
    pub fn new(cutoff: f64) -> Self {
        Self {
            types: HashMap::new(),
            cutoff,
            dielectric: 1.0,
        }
    }

    pub fn with_dielectric(mut self, dielectric: f64) -> Self {
        self.dielectric = dielectric;
        self
    }

    pub fn with_type(mut self, params: AtomTypeParams) -> Self {
        self.insert(params);
        self
    }

    /// Adds or replaces the parameters of an atom type.
    pub fn insert(&mut self, params: AtomTypeParams) {
        self.types.insert(params.name.clone(), params);
    }

    pub fn get(&self, atom_type: &str) -> Option<&AtomTypeParams> {
        self.types.get(atom_type)
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn dielectric(&self) -> f64 {
        self.dielectric
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Mixes two atom types into a pair potential.
    ///
    /// Two geometric forms combine geometrically in both `epsilon` and `sigma`; any other
    /// combination uses the Lorentz-Berthelot rule (arithmetic `sigma`, geometric `epsilon`).
    pub fn mix(a: &AtomTypeParams, b: &AtomTypeParams) -> PairPotential {
        let short_range = match (a.short_range.epsilon_sigma(), b.short_range.epsilon_sigma()) {
            (Some((eps_a, sig_a)), Some((eps_b, sig_b))) => {
                let epsilon = (eps_a * eps_b).sqrt();
                let both_geometric = matches!(
                    (a.short_range, b.short_range),
                    (
                        ShortRangeFunctional::LennardJonesGeometric { .. },
                        ShortRangeFunctional::LennardJonesGeometric { .. }
                    )
                );
                let sigma = if both_geometric {
                    (sig_a * sig_b).sqrt()
                } else {
                    0.5 * (sig_a + sig_b)
                };
                Some((epsilon, sigma))
            }
            _ => None,
        };
        PairPotential {
            short_range,
            charge_product: a.charge * b.charge,
        }
    }
}
