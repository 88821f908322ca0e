use super::lattice::{Lattice, Shift, ZERO_SHIFT};
use itertools::iproduct;
use nalgebra::{Point3, Vector3};

/// Displacement from `origin` to the `shift` image of `target`.
///
/// This is the single source of truth for edge geometry: every neighbor search
/// strategy evaluates inclusion through this function so that their edge sets
/// agree bit for bit.
#[inline]
pub fn image_displacement(
    origin: &Point3<f64>,
    target: &Point3<f64>,
    lattice: Option<&Lattice>,
    shift: &Shift,
) -> Vector3<f64> {
    let direct = target - origin;
    match lattice {
        Some(lattice) if *shift != ZERO_SHIFT => direct + lattice.shift_vector(shift),
        _ => direct,
    }
}

/// Closed-interval cutoff test used by all neighbor searches.
#[inline]
pub fn within_cutoff(displacement: &Vector3<f64>, cutoff: f64) -> bool {
    displacement.norm() <= cutoff
}

/// All periodic image shifts of `target` lying within `cutoff` of `origin`.
///
/// Without a lattice only the zero shift is considered. The zero shift is
/// reported even when `origin` and `target` are the same point; callers that
/// build graphs are responsible for dropping zero-shift self pairs.
pub fn periodic_images(
    origin: &Point3<f64>,
    target: &Point3<f64>,
    lattice: Option<&Lattice>,
    cutoff: f64,
) -> Vec<Shift> {
    let Some(lattice) = lattice else {
        let displacement = target - origin;
        return if within_cutoff(&displacement, cutoff) {
            vec![ZERO_SHIFT]
        } else {
            Vec::new()
        };
    };

    let delta = lattice.to_fractional(&(target - origin));
    let ranges = [
        lattice.shift_range(0, delta[0], cutoff),
        lattice.shift_range(1, delta[1], cutoff),
        lattice.shift_range(2, delta[2], cutoff),
    ];

    iproduct!(ranges[0].clone(), ranges[1].clone(), ranges[2].clone())
        .map(|(a, b, c)| [a, b, c])
        .filter(|shift| {
            let displacement = image_displacement(origin, target, Some(lattice), shift);
            within_cutoff(&displacement, cutoff)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    #[test]
    fn non_periodic_pair_inside_cutoff_has_zero_shift() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        assert_eq!(periodic_images(&a, &b, None, 1.5), vec![ZERO_SHIFT]);
        assert!(periodic_images(&a, &b, None, 0.5).is_empty());
    }

    #[test]
    fn distance_equal_to_cutoff_is_included() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(0.0, 2.0, 0.0);
        assert_eq!(periodic_images(&a, &b, None, 2.0), vec![ZERO_SHIFT]);
    }

    #[test]
    fn atom_sees_its_own_images_in_small_cell() {
        let lattice = Lattice::cubic(1.0).unwrap();
        let origin = Point3::new(0.5, 0.5, 0.5);
        let shifts = periodic_images(&origin, &origin, Some(&lattice), 1.0);
        assert_eq!(shifts.len(), 7);
        assert!(shifts.contains(&ZERO_SHIFT));
        assert!(shifts.contains(&[1, 0, 0]));
        assert!(shifts.contains(&[0, 0, -1]));
    }

    #[test]
    fn far_apart_atoms_use_nearest_images() {
        let lattice = Lattice::cubic(10.0).unwrap();
        let a = Point3::new(0.5, 5.0, 5.0);
        let b = Point3::new(9.5, 5.0, 5.0);
        assert_eq!(periodic_images(&a, &b, Some(&lattice), 1.5), vec![[-1, 0, 0]]);
    }

    #[test]
    fn atoms_outside_home_cell_are_handled() {
        let lattice = Lattice::cubic(4.0).unwrap();
        let a = Point3::new(-13.0, 0.0, 0.0);
        let b = Point3::new(22.5, 0.0, 0.0);
        let shifts = periodic_images(&a, &b, Some(&lattice), 1.0);
        assert_eq!(shifts, vec![[-9, 0, 0]]);
        let d = image_displacement(&a, &b, Some(&lattice), &shifts[0]);
        assert!((d.norm() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn strongly_skewed_cell_finds_all_images() {
        let matrix = Matrix3::new(1.0, 0.0, 0.0, 5.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        let lattice = Lattice::new(matrix, [true; 3]).unwrap();
        let origin = Point3::origin();
        let cutoff = 1.2;

        let shifts = periodic_images(&origin, &origin, Some(&lattice), cutoff);

        let mut reference = Vec::new();
        for a in -20..=20 {
            for b in -20..=20 {
                for c in -20..=20 {
                    let shift = [a, b, c];
                    if lattice.shift_vector(&shift).norm() <= cutoff {
                        reference.push(shift);
                    }
                }
            }
        }
        let mut shifts_sorted = shifts.clone();
        shifts_sorted.sort();
        reference.sort();
        assert_eq!(shifts_sorted, reference);
    }

    #[test]
    fn non_periodic_axis_never_shifts() {
        let matrix = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 1.0));
        let lattice = Lattice::new(matrix, [true, true, false]).unwrap();
        let origin = Point3::origin();
        let shifts = periodic_images(&origin, &origin, Some(&lattice), 1.0);
        assert!(shifts.iter().all(|s| s[2] == 0));
        assert_eq!(shifts.len(), 5);
    }
}
