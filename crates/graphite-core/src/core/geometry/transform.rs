use nalgebra::{Point3, Rotation3, Unit, Vector3};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle_degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle_degrees.to_radians())
}

/// Uniformly distributed random rotation (normalized Gaussian quaternion).
pub fn random_rotation(rng: &mut impl Rng) -> Rotation3<f64> {
    let q: [f64; 4] = [
        StandardNormal.sample(rng),
        StandardNormal.sample(rng),
        StandardNormal.sample(rng),
        StandardNormal.sample(rng),
    ];
    let quaternion = nalgebra::Quaternion::new(q[0], q[1], q[2], q[3]);
    nalgebra::UnitQuaternion::from_quaternion(quaternion).to_rotation_matrix()
}

/// Root-mean-square displacement between two conformations of the same atoms.
pub fn rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

/// Largest per-atom displacement between two conformations, with its index.
pub fn max_displacement(
    coords1: &[Point3<f64>],
    coords2: &[Point3<f64>],
) -> Option<(f64, usize)> {
    if coords1.len() != coords2.len() {
        return None;
    }
    coords1
        .iter()
        .zip(coords2.iter())
        .enumerate()
        .map(|(idx, (p1, p2))| ((p1 - p2).norm(), idx))
        .max_by(|(dist1, _), (dist2, _)| {
            dist1
                .partial_cmp(dist2)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}
