use super::Candidates;
use crate::core::geometry::images::{image_displacement, within_cutoff};
use crate::core::geometry::lattice::{Shift, ZERO_SHIFT};
use crate::core::models::structure::Structure;
use itertools::iproduct;
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

type BinKey = (i64, i64, i64);

#[derive(Debug, Clone, Copy)]
struct ImagePoint {
    atom: usize,
    // Shift relative to the wrapped copy of `atom`.
    wrapped_shift: Shift,
    position: Point3<f64>,
}

/// Spatial binning of periodic images for sub-quadratic neighbor search.
///
/// Atoms are first wrapped into the home cell. Every periodic image of a
/// wrapped atom that can lie within the cutoff of some wrapped atom is placed
/// into a cubic bin whose edge equals the (slightly padded) cutoff, so all
/// neighbors of a query point live in the 27 surrounding bins.
#[derive(Debug)]
pub struct CellList<'a> {
    structure: &'a Structure,
    cutoff: f64,
    inv_bin_size: f64,
    wrapped: Vec<Point3<f64>>,
    offsets: Vec<Shift>,
    images: Vec<ImagePoint>,
    bins: HashMap<BinKey, Vec<usize>>,
}

impl<'a> CellList<'a> {
    pub fn new(structure: &'a Structure, cutoff: f64) -> Self {
        let (wrapped, offsets): (Vec<_>, Vec<_>) = match structure.lattice() {
            Some(lattice) => structure.positions().iter().map(|p| lattice.wrap(p)).unzip(),
            None => structure
                .positions()
                .iter()
                .map(|p| (*p, ZERO_SHIFT))
                .unzip(),
        };

        let margin = 1e-6 * cutoff.max(1.0);
        let bin_size = cutoff + margin;
        let (lower, upper) = bounding_box(&wrapped, bin_size);

        let reach = structure
            .lattice()
            .map(|l| l.image_reach(cutoff))
            .unwrap_or([0; 3]);

        let mut images = Vec::new();
        for (atom, position) in wrapped.iter().enumerate() {
            for (a, b, c) in iproduct!(
                -reach[0]..=reach[0],
                -reach[1]..=reach[1],
                -reach[2]..=reach[2]
            ) {
                let wrapped_shift = [a, b, c];
                let image = match structure.lattice() {
                    Some(lattice) => position + lattice.shift_vector(&wrapped_shift),
                    None => *position,
                };
                let inside = (0..3).all(|k| image[k] >= lower[k] && image[k] <= upper[k]);
                if inside {
                    images.push(ImagePoint {
                        atom,
                        wrapped_shift,
                        position: image,
                    });
                }
            }
        }

        let inv_bin_size = 1.0 / bin_size;
        let mut bins: HashMap<BinKey, Vec<usize>> = HashMap::new();
        for (idx, image) in images.iter().enumerate() {
            bins.entry(bin_of(&image.position, inv_bin_size))
                .or_default()
                .push(idx);
        }

        Self {
            structure,
            cutoff,
            inv_bin_size,
            wrapped,
            offsets,
            images,
            bins,
        }
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    /// Neighbors of `source`, with shifts expressed for the unwrapped positions.
    pub fn neighbors_of(&self, source: usize) -> Candidates {
        let positions = self.structure.positions();
        let lattice = self.structure.lattice();
        let (bx, by, bz) = bin_of(&self.wrapped[source], self.inv_bin_size);
        let source_offset = self.offsets[source];

        let mut found = Vec::new();
        for (dx, dy, dz) in iproduct!(-1..=1, -1..=1, -1..=1) {
            let Some(members) = self.bins.get(&(bx + dx, by + dy, bz + dz)) else {
                continue;
            };
            for &idx in members {
                let image = &self.images[idx];
                let target_offset = self.offsets[image.atom];
                // x_j + S.A - x_i == w_j + S'.A - w_i  with  S = S' - n_j + n_i
                let shift = [
                    image.wrapped_shift[0] - target_offset[0] + source_offset[0],
                    image.wrapped_shift[1] - target_offset[1] + source_offset[1],
                    image.wrapped_shift[2] - target_offset[2] + source_offset[2],
                ];
                if image.atom == source && shift == ZERO_SHIFT {
                    continue;
                }
                let displacement =
                    image_displacement(&positions[source], &positions[image.atom], lattice, &shift);
                if within_cutoff(&displacement, self.cutoff) {
                    found.push((image.atom, shift));
                }
            }
        }
        found
    }
}

fn bin_of(position: &Point3<f64>, inv_bin_size: f64) -> BinKey {
    (
        (position.x * inv_bin_size).floor() as i64,
        (position.y * inv_bin_size).floor() as i64,
        (position.z * inv_bin_size).floor() as i64,
    )
}

fn bounding_box(points: &[Point3<f64>], padding: f64) -> (Vector3<f64>, Vector3<f64>) {
    let mut lower = Vector3::repeat(f64::INFINITY);
    let mut upper = Vector3::repeat(f64::NEG_INFINITY);
    for p in points {
        lower = lower.inf(&p.coords);
        upper = upper.sup(&p.coords);
    }
    (lower.add_scalar(-padding), upper.add_scalar(padding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::species::Species;
    use crate::core::neighbors::brute;
    use nalgebra::Matrix3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sorted(mut c: Candidates) -> Candidates {
        c.sort();
        c
    }

    fn random_structure(n: usize, cell: Matrix3<f64>, pbc: [bool; 3], seed: u64) -> Structure {
        let mut rng = StdRng::seed_from_u64(seed);
        let positions = (0..n)
            .map(|_| {
                // Deliberately spill outside the home cell.
                let f = Vector3::new(
                    rng.gen_range(-0.5..1.5),
                    rng.gen_range(-0.5..1.5),
                    rng.gen_range(-0.5..1.5),
                );
                Point3::from(cell.transpose() * f)
            })
            .collect();
        Structure::periodic(vec![Species(1); n], positions, cell, pbc).unwrap()
    }

    fn assert_matches_brute_force(structure: &Structure, cutoff: f64) {
        let cells = CellList::new(structure, cutoff);
        for i in 0..structure.len() {
            assert_eq!(
                sorted(cells.neighbors_of(i)),
                sorted(brute::neighbors_of(structure, i, cutoff)),
                "atom {i}"
            );
        }
    }

    #[test]
    fn matches_brute_force_in_cubic_cell() {
        let structure = random_structure(40, Matrix3::from_diagonal_element(6.0), [true; 3], 1);
        assert_matches_brute_force(&structure, 2.5);
    }

    #[test]
    fn matches_brute_force_in_skewed_small_cell() {
        let cell = Matrix3::new(3.0, 0.0, 0.0, 2.4, 2.0, 0.0, 0.7, 0.9, 2.6);
        let structure = random_structure(12, cell, [true; 3], 2);
        assert_matches_brute_force(&structure, 4.0);
    }

    #[test]
    fn matches_brute_force_for_slab() {
        let cell = Matrix3::new(5.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 7.0);
        let structure = random_structure(30, cell, [true, true, false], 3);
        assert_matches_brute_force(&structure, 3.0);
    }

    #[test]
    fn matches_brute_force_without_lattice() {
        let mut rng = StdRng::seed_from_u64(4);
        let positions = (0..50)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                )
            })
            .collect();
        let structure = Structure::new(vec![Species(6); 50], positions).unwrap();
        assert_matches_brute_force(&structure, 2.0);
    }

    #[test]
    fn non_periodic_structure_has_one_image_per_atom() {
        let structure = Structure::new(
            vec![Species(1), Species(1)],
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
        )
        .unwrap();
        let cells = CellList::new(&structure, 1.5);
        assert_eq!(cells.num_images(), 2);
        assert_eq!(cells.neighbors_of(0), vec![(1, ZERO_SHIFT)]);
    }
}
