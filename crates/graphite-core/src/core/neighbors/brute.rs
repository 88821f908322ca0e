use super::Candidates;
use crate::core::geometry::images::periodic_images;
use crate::core::geometry::lattice::ZERO_SHIFT;
use crate::core::models::structure::Structure;

/// Exhaustive O(N^2) search for the neighbors of one source atom.
///
/// Every target atom, including the source itself, is tested against all
/// candidate shifts of its periodic images. Zero-shift self pairs are dropped.
pub fn neighbors_of(structure: &Structure, source: usize, cutoff: f64) -> Candidates {
    let positions = structure.positions();
    let origin = &positions[source];
    let mut found = Vec::new();
    for (target, position) in positions.iter().enumerate() {
        for shift in periodic_images(origin, position, structure.lattice(), cutoff) {
            if target == source && shift == ZERO_SHIFT {
                continue;
            }
            found.push((target, shift));
        }
    }
    found
}
