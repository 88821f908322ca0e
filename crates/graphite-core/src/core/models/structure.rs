use super::species::Species;
use crate::core::geometry::lattice::{CellError, Lattice};
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructureError {
    #[error("Structure has {species} species but {positions} positions")]
    LengthMismatch { species: usize, positions: usize },

    #[error("Atom {atom} has a non-finite position")]
    NonFinitePosition { atom: usize },

    #[error("Invalid periodic cell: {0}")]
    InvalidCell(#[from] CellError),

    #[error("Permutation of length {found} does not match structure with {expected} atoms")]
    InvalidPermutation { expected: usize, found: usize },
}

/// An ordered collection of atoms with an optional periodic cell.
///
/// A `Structure` is immutable once built; operations that move atoms return a
/// new value. Every position is finite and the species and position lists have
/// the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    species: Vec<Species>,
    positions: Vec<Point3<f64>>,
    lattice: Option<Lattice>,
}

impl Structure {
    /// Non-periodic structure (molecule or cluster).
    pub fn new(species: Vec<Species>, positions: Vec<Point3<f64>>) -> Result<Self, StructureError> {
        Self::with_lattice(species, positions, None)
    }

    /// Periodic structure; `cell` rows are the lattice vectors.
    pub fn periodic(
        species: Vec<Species>,
        positions: Vec<Point3<f64>>,
        cell: Matrix3<f64>,
        pbc: [bool; 3],
    ) -> Result<Self, StructureError> {
        let lattice = if pbc.iter().any(|&p| p) {
            Some(Lattice::new(cell, pbc)?)
        } else {
            None
        };
        Self::with_lattice(species, positions, lattice)
    }

    pub fn with_lattice(
        species: Vec<Species>,
        positions: Vec<Point3<f64>>,
        lattice: Option<Lattice>,
    ) -> Result<Self, StructureError> {
        if species.len() != positions.len() {
            return Err(StructureError::LengthMismatch {
                species: species.len(),
                positions: positions.len(),
            });
        }
        if let Some(atom) = first_non_finite(&positions) {
            return Err(StructureError::NonFinitePosition { atom });
        }
        Ok(Self {
            species,
            positions,
            lattice,
        })
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn lattice(&self) -> Option<&Lattice> {
        self.lattice.as_ref()
    }

    pub fn is_periodic(&self) -> bool {
        self.lattice.is_some()
    }

    /// Same atoms and cell at new positions.
    pub fn with_positions(&self, positions: Vec<Point3<f64>>) -> Result<Self, StructureError> {
        Self::with_lattice(self.species.clone(), positions, self.lattice.clone())
    }

    /// Positions folded into the home cell along periodic axes.
    pub fn wrapped(&self) -> Self {
        let Some(lattice) = &self.lattice else {
            return self.clone();
        };
        let positions = self
            .positions
            .iter()
            .map(|p| lattice.wrap(p).0)
            .collect();
        Self {
            species: self.species.clone(),
            positions,
            lattice: self.lattice.clone(),
        }
    }

    /// Relabels atoms so that new atom `k` is old atom `order[k]`.
    pub fn permuted(&self, order: &[usize]) -> Result<Self, StructureError> {
        let mut seen = vec![false; self.len()];
        let valid = order.len() == self.len()
            && order
                .iter()
                .all(|&idx| idx < seen.len() && !std::mem::replace(&mut seen[idx], true));
        if !valid {
            return Err(StructureError::InvalidPermutation {
                expected: self.len(),
                found: order.len(),
            });
        }
        Ok(Self {
            species: order.iter().map(|&i| self.species[i]).collect(),
            positions: order.iter().map(|&i| self.positions[i]).collect(),
            lattice: self.lattice.clone(),
        })
    }

    /// Applies a rigid motion to positions and lattice vectors.
    pub fn transformed(
        &self,
        rotation: &Rotation3<f64>,
        translation: &Vector3<f64>,
    ) -> Result<Self, StructureError> {
        let positions = self
            .positions
            .iter()
            .map(|p| rotation * p + translation)
            .collect();
        let lattice = match &self.lattice {
            Some(lattice) => Some(lattice.rotated(rotation)?),
            None => None,
        };
        Self::with_lattice(self.species.clone(), positions, lattice)
    }
}

pub(crate) fn first_non_finite(positions: &[Point3<f64>]) -> Option<usize> {
    positions
        .iter()
        .position(|p| p.coords.iter().any(|c| !c.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::transform::rotation_from_axis_angle;

    fn water() -> Structure {
        Structure::new(
            vec![Species(8), Species(1), Species(1)],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.96, 0.0, 0.0),
                Point3::new(-0.24, 0.93, 0.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let result = Structure::new(vec![Species(1)], vec![]);
        assert_eq!(
            result,
            Err(StructureError::LengthMismatch {
                species: 1,
                positions: 0
            })
        );
    }

    #[test]
    fn non_finite_position_reports_atom_index() {
        let result = Structure::new(
            vec![Species(1), Species(1)],
            vec![Point3::origin(), Point3::new(0.0, f64::NAN, 0.0)],
        );
        assert_eq!(result, Err(StructureError::NonFinitePosition { atom: 1 }));
    }

    #[test]
    fn degenerate_periodic_cell_is_rejected() {
        let result = Structure::periodic(
            vec![Species(1)],
            vec![Point3::origin()],
            Matrix3::zeros(),
            [true, true, true],
        );
        assert!(matches!(
            result,
            Err(StructureError::InvalidCell(CellError::ZeroExtent { axis: 0 }))
        ));
    }

    #[test]
    fn all_false_pbc_yields_non_periodic_structure() {
        let structure = Structure::periodic(
            vec![Species(1)],
            vec![Point3::origin()],
            Matrix3::zeros(),
            [false; 3],
        )
        .unwrap();
        assert!(!structure.is_periodic());
    }

    #[test]
    fn permuted_reorders_species_and_positions() {
        let structure = water();
        let permuted = structure.permuted(&[2, 0, 1]).unwrap();
        assert_eq!(permuted.species()[0], Species(1));
        assert_eq!(permuted.positions()[1], Point3::origin());
    }

    #[test]
    fn permuted_rejects_repeated_indices() {
        let structure = water();
        assert!(structure.permuted(&[0, 0, 1]).is_err());
        assert!(structure.permuted(&[0, 1]).is_err());
    }

    #[test]
    fn transformed_preserves_interatomic_distances() {
        let structure = water();
        let rotation = rotation_from_axis_angle(&Vector3::new(1.0, 2.0, 3.0), 37.0);
        let moved = structure
            .transformed(&rotation, &Vector3::new(5.0, -1.0, 2.0))
            .unwrap();
        let d0 = (structure.positions()[1] - structure.positions()[2]).norm();
        let d1 = (moved.positions()[1] - moved.positions()[2]).norm();
        assert!((d0 - d1).abs() < 1e-12);
    }

    #[test]
    fn wrapped_moves_atoms_into_home_cell() {
        let structure = Structure::periodic(
            vec![Species(1)],
            vec![Point3::new(-0.5, 4.5, 2.0)],
            Matrix3::from_diagonal_element(4.0),
            [true; 3],
        )
        .unwrap();
        let wrapped = structure.wrapped();
        assert!((wrapped.positions()[0] - Point3::new(3.5, 0.5, 2.0)).norm() < 1e-12);
    }
}
