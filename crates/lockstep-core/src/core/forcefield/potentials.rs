const COULOMB_CONSTANT: f64 = 332.0637; // In kcal·Å/(mol·e²)

#[inline]
pub fn lennard_jones_12_6(dist: f64, r_min: f64, well_depth: f64) -> f64 {
    if dist < 1e-6 {
        return 1e10;
    }
    let rho = r_min / dist;
    let rho6 = rho.powi(6);
    let rho12 = rho6 * rho6;
    well_depth * (rho12 - 2.0 * rho6)
}

/// Lennard-Jones in the `sigma` form, `4ε[(σ/r)^12 - (σ/r)^6]`.
#[inline]
pub fn lennard_jones_sigma(dist: f64, sigma: f64, epsilon: f64) -> f64 {
    if dist < 1e-6 {
        return 1e10;
    }
    let sr6 = (sigma / dist).powi(6);
    4.0 * epsilon * (sr6 * sr6 - sr6)
}

/// Radial force `-dU/dr` of [`lennard_jones_sigma`]; positive values are repulsive.
#[inline]
pub fn lennard_jones_sigma_force(dist: f64, sigma: f64, epsilon: f64) -> f64 {
    if dist < 1e-6 {
        return 1e10;
    }
    let sr6 = (sigma / dist).powi(6);
    24.0 * epsilon * (2.0 * sr6 * sr6 - sr6) / dist
}

#[inline]
pub fn coulomb(dist: f64, q1: f64, q2: f64, dielectric: f64) -> f64 {
    if dist < 1e-6 {
        return q1.signum() * q2.signum() * 1e10;
    }
    COULOMB_CONSTANT * q1 * q2 / (dielectric * dist)
}

/// Radial force `-dU/dr` of [`coulomb`].
#[inline]
pub fn coulomb_force(dist: f64, q1: f64, q2: f64, dielectric: f64) -> f64 {
    if dist < 1e-6 {
        return q1.signum() * q2.signum() * 1e10;
    }
    COULOMB_CONSTANT * q1 * q2 / (dielectric * dist * dist)
}
