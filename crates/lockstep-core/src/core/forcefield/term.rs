use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Pair energy split into its short-range and electrostatic parts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnergyTerm {
    pub short_range: f64,
    pub coulomb: f64,
}

impl EnergyTerm {
    pub fn new(short_range: f64, coulomb: f64) -> Self {
        Self {
            short_range,
            coulomb,
        }
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.short_range + self.coulomb
    }

    /// Flattened representation used for pool reductions.
    pub(crate) fn to_array(self) -> [f64; 2] {
        [self.short_range, self.coulomb]
    }

    pub(crate) fn from_array(values: [f64; 2]) -> Self {
        Self::new(values[0], values[1])
    }
}

impl Add for EnergyTerm {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            short_range: self.short_range + rhs.short_range,
            coulomb: self.coulomb + rhs.coulomb,
        }
    }
}

impl AddAssign for EnergyTerm {
    fn add_assign(&mut self, rhs: Self) {
        self.short_range += rhs.short_range;
        self.coulomb += rhs.coulomb;
    }
}

impl Sum for EnergyTerm {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, term| acc + term)
    }
}
