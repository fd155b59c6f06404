use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Periodic boundary description of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PeriodicBox {
    #[default]
    NonPeriodic,
    Cubic {
        length: f64,
    },
    Orthorhombic {
        lengths: Vector3<f64>,
    },
}

impl PeriodicBox {
    /// Builds the tightest box description for the supplied side lengths.
    pub fn from_lengths(lengths: Vector3<f64>) -> Self {
        if lengths.x == lengths.y && lengths.y == lengths.z {
            PeriodicBox::Cubic { length: lengths.x }
        } else {
            PeriodicBox::Orthorhombic { lengths }
        }
    }

    pub fn lengths(&self) -> Option<Vector3<f64>> {
        match *self {
            PeriodicBox::NonPeriodic => None,
            PeriodicBox::Cubic { length } => Some(Vector3::repeat(length)),
            PeriodicBox::Orthorhombic { lengths } => Some(lengths),
        }
    }

    pub fn is_periodic(&self) -> bool {
        !matches!(self, PeriodicBox::NonPeriodic)
    }

    pub fn volume(&self) -> Option<f64> {
        self.lengths().map(|l| l.x * l.y * l.z)
    }

    /// Displacement `to - from`, wrapped onto the nearest periodic image.
    ///
    /// For a non-periodic box this is the plain displacement.
    pub fn minimum_image_vector(&self, from: &Point3<f64>, to: &Point3<f64>) -> Vector3<f64> {
        let delta = to - from;
        match self.lengths() {
            None => delta,
            Some(lengths) => Vector3::new(
                wrap(delta.x, lengths.x),
                wrap(delta.y, lengths.y),
                wrap(delta.z, lengths.z),
            ),
        }
    }

    #[inline]
    pub fn minimum_distance_squared(&self, from: &Point3<f64>, to: &Point3<f64>) -> f64 {
        self.minimum_image_vector(from, to).norm_squared()
    }

    #[inline]
    pub fn minimum_distance(&self, from: &Point3<f64>, to: &Point3<f64>) -> f64 {
        self.minimum_image_vector(from, to).norm()
    }

    /// Maps a position back into the primary cell `[0, L)`.
    pub fn fold(&self, position: &Point3<f64>) -> Point3<f64> {
        match self.lengths() {
            None => *position,
            Some(lengths) => Point3::new(
                position.x.rem_euclid(lengths.x),
                position.y.rem_euclid(lengths.y),
                position.z.rem_euclid(lengths.z),
            ),
        }
    }

    /// Radius of the largest sphere that fits inside the box, beyond which the
    /// minimum image convention no longer yields unique pairs.
    pub fn inscribed_radius(&self) -> Option<f64> {
        self.lengths().map(|l| 0.5 * l.x.min(l.y).min(l.z))
    }
}

#[inline]
fn wrap(delta: f64, length: f64) -> f64 {
    delta - length * (delta / length).round()
}

/// Volume of the spherical shell between `r_inner` and `r_outer`.
#[inline]
pub fn spherical_shell_volume(r_inner: f64, r_outer: f64) -> f64 {
    4.0 / 3.0 * PI * (r_outer.powi(3) - r_inner.powi(3))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn from_lengths_detects_cubic_boxes() {
        assert_eq!(
            PeriodicBox::from_lengths(Vector3::new(5.0, 5.0, 5.0)),
            PeriodicBox::Cubic { length: 5.0 }
        );
        assert!(matches!(
            PeriodicBox::from_lengths(Vector3::new(5.0, 6.0, 5.0)),
            PeriodicBox::Orthorhombic { .. }
        ));
    }

    #[test]
    fn minimum_image_wraps_across_the_boundary() {
        let cell = PeriodicBox::Cubic { length: 10.0 };
        let a = Point3::new(0.5, 5.0, 5.0);
        let b = Point3::new(9.5, 5.0, 5.0);

        let d = cell.minimum_image_vector(&a, &b);
        assert!((d.x + 1.0).abs() < TOLERANCE);
        assert!((cell.minimum_distance(&a, &b) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn non_periodic_box_uses_plain_displacement() {
        let cell = PeriodicBox::NonPeriodic;
        let a = Point3::new(0.5, 0.0, 0.0);
        let b = Point3::new(9.5, 0.0, 0.0);
        assert!((cell.minimum_distance(&a, &b) - 9.0).abs() < TOLERANCE);
        assert_eq!(cell.volume(), None);
    }

    #[test]
    fn orthorhombic_box_wraps_each_axis_independently() {
        let cell = PeriodicBox::Orthorhombic {
            lengths: Vector3::new(10.0, 20.0, 30.0),
        };
        let a = Point3::new(1.0, 1.0, 1.0);
        let b = Point3::new(9.0, 19.0, 16.0);
        let d = cell.minimum_image_vector(&a, &b);
        assert!((d.x + 2.0).abs() < TOLERANCE);
        assert!((d.y + 2.0).abs() < TOLERANCE);
        assert!((d.z - 15.0).abs() < TOLERANCE);
        assert!((cell.volume().unwrap() - 6000.0).abs() < TOLERANCE);
    }

    #[test]
    fn fold_maps_positions_into_primary_cell() {
        let cell = PeriodicBox::Cubic { length: 10.0 };
        let folded = cell.fold(&Point3::new(-1.0, 12.0, 5.0));
        assert!((folded.x - 9.0).abs() < TOLERANCE);
        assert!((folded.y - 2.0).abs() < TOLERANCE);
        assert!((folded.z - 5.0).abs() < TOLERANCE);
    }

    #[test]
    fn spherical_shell_volume_of_unit_sphere() {
        assert!((spherical_shell_volume(0.0, 1.0) - 4.0 / 3.0 * PI).abs() < TOLERANCE);
    }
}
