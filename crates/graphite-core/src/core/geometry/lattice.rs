use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use std::ops::RangeInclusive;
use thiserror::Error;

/// Integer multiples of the three lattice vectors identifying a periodic image.
pub type Shift = [i32; 3];

/// The identity image.
pub const ZERO_SHIFT: Shift = [0, 0, 0];

const EXTENT_TOLERANCE: f64 = 1e-10;
const DETERMINANT_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CellError {
    #[error("Cell is periodic along axis {axis} but its lattice vector has zero length")]
    ZeroExtent { axis: usize },

    #[error("Cell matrix is degenerate (relative determinant {determinant:e})")]
    Degenerate { determinant: f64 },

    #[error("Cell matrix has a non-finite entry in lattice vector {axis}")]
    NonFinite { axis: usize },
}

/// A periodic simulation cell.
///
/// Lattice vectors are stored as the rows of the user-facing matrix. Internally
/// the vectors are kept as the columns of `basis`, so that a fractional
/// coordinate `f` maps to the Cartesian position `basis * f`.
///
/// Non-periodic axes may carry a zero lattice vector (slabs, wires, molecules in
/// a box). Those axes are completed with unit vectors orthogonal to the
/// remaining ones so that fractional coordinates stay well defined; they never
/// contribute a non-zero shift.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    matrix: Matrix3<f64>,
    basis: Matrix3<f64>,
    basis_inverse: Matrix3<f64>,
    pbc: [bool; 3],
}

impl Lattice {
    /// Builds a lattice from a matrix whose rows are the lattice vectors.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::ZeroExtent`] when a periodic axis has a zero-length
    /// lattice vector, [`CellError::Degenerate`] when the (completed) cell has
    /// a vanishing determinant, and [`CellError::NonFinite`] for NaN/inf entries.
    pub fn new(matrix: Matrix3<f64>, pbc: [bool; 3]) -> Result<Self, CellError> {
        let mut rows: [Vector3<f64>; 3] = [
            matrix.row(0).transpose(),
            matrix.row(1).transpose(),
            matrix.row(2).transpose(),
        ];

        for (axis, row) in rows.iter().enumerate() {
            if row.iter().any(|v| !v.is_finite()) {
                return Err(CellError::NonFinite { axis });
            }
            if pbc[axis] && row.norm() <= EXTENT_TOLERANCE {
                return Err(CellError::ZeroExtent { axis });
            }
        }

        complete_basis(&mut rows)?;

        let basis = Matrix3::from_columns(&rows);
        let scale: f64 = rows.iter().map(|r| r.norm()).product();
        let determinant = basis.determinant();
        if determinant.abs() <= DETERMINANT_TOLERANCE * scale {
            return Err(CellError::Degenerate {
                determinant: determinant / scale,
            });
        }
        let basis_inverse = basis
            .try_inverse()
            .ok_or(CellError::Degenerate { determinant: 0.0 })?;

        Ok(Self {
            matrix,
            basis,
            basis_inverse,
            pbc,
        })
    }

    /// Fully periodic cubic cell of side `a`.
    pub fn cubic(a: f64) -> Result<Self, CellError> {
        Self::new(Matrix3::from_diagonal_element(a), [true; 3])
    }

    /// Fully periodic orthorhombic cell.
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self, CellError> {
        Self::new(Matrix3::from_diagonal(&Vector3::new(a, b, c)), [true; 3])
    }

    /// The lattice matrix as supplied (rows are lattice vectors).
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.pbc[axis]
    }

    /// Lattice vector `axis`, after completion of degenerate non-periodic axes.
    pub fn vector(&self, axis: usize) -> Vector3<f64> {
        self.basis.column(axis).into_owned()
    }

    /// Absolute volume of the (completed) cell.
    pub fn volume(&self) -> f64 {
        self.basis.determinant().abs()
    }

    /// Distance between neighboring lattice planes for each axis.
    ///
    /// The planes spanned by the two other lattice vectors are `1 / |b*_a|`
    /// apart, where `b*_a` is the dual (reciprocal) vector of axis `a`.
    pub fn interplanar_spacings(&self) -> [f64; 3] {
        let mut spacings = [0.0; 3];
        for (axis, spacing) in spacings.iter_mut().enumerate() {
            *spacing = 1.0 / self.basis_inverse.row(axis).norm();
        }
        spacings
    }

    pub fn to_fractional(&self, position: &Vector3<f64>) -> Vector3<f64> {
        self.basis_inverse * position
    }

    pub fn to_cartesian(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        self.basis * fractional
    }

    /// Cartesian translation corresponding to an integer image shift.
    #[inline]
    pub fn shift_vector(&self, shift: &Shift) -> Vector3<f64> {
        self.basis * Vector3::new(shift[0] as f64, shift[1] as f64, shift[2] as f64)
    }

    /// Candidate shifts along one axis for a pair whose fractional difference
    /// along that axis is `delta`.
    ///
    /// Any image within `cutoff` satisfies `|delta + s| * h <= cutoff`, with `h`
    /// the inter-planar spacing, so the returned range is exhaustive for every
    /// cell shape. Non-periodic axes only admit the zero shift.
    pub fn shift_range(&self, axis: usize, delta: f64, cutoff: f64) -> RangeInclusive<i32> {
        if !self.pbc[axis] {
            return 0..=0;
        }
        let reach = cutoff / self.interplanar_spacings()[axis];
        let low = (-reach - delta).floor() as i32;
        let high = (reach - delta).ceil() as i32;
        low..=high
    }

    /// Number of shifts per axis needed to reach every image within `cutoff`
    /// of any atom whose fractional coordinates lie in the home cell.
    pub fn image_reach(&self, cutoff: f64) -> [i32; 3] {
        let spacings = self.interplanar_spacings();
        let mut reach = [0; 3];
        for axis in 0..3 {
            if self.pbc[axis] {
                reach[axis] = (cutoff / spacings[axis]).ceil() as i32 + 1;
            }
        }
        reach
    }

    /// Folds a position into the home cell along periodic axes.
    ///
    /// Returns the wrapped position and the integer offset `n` such that
    /// `position = wrapped + n . cell`.
    pub fn wrap(&self, position: &Point3<f64>) -> (Point3<f64>, Shift) {
        let fractional = self.to_fractional(&position.coords);
        let mut offset = ZERO_SHIFT;
        for axis in 0..3 {
            if self.pbc[axis] {
                offset[axis] = fractional[axis].floor() as i32;
            }
        }
        (position - self.shift_vector(&offset), offset)
    }

    /// The same cell after a rigid rotation of space.
    pub fn rotated(&self, rotation: &Rotation3<f64>) -> Result<Self, CellError> {
        let rotated = self.matrix * rotation.matrix().transpose();
        Self::new(rotated, self.pbc)
    }
}

fn complete_basis(rows: &mut [Vector3<f64>; 3]) -> Result<(), CellError> {
    let missing: Vec<usize> = (0..3)
        .filter(|&axis| rows[axis].norm() <= EXTENT_TOLERANCE)
        .collect();

    match missing.as_slice() {
        [] => {}
        &[axis] => {
            let normal = rows[(axis + 1) % 3].cross(&rows[(axis + 2) % 3]);
            if normal.norm() <= EXTENT_TOLERANCE {
                return Err(CellError::Degenerate { determinant: 0.0 });
            }
            rows[axis] = normal.normalize();
        }
        &[first, second] => {
            let keep = 3 - first - second;
            let direction = rows[keep].normalize();
            let helper = if direction.x.abs() < 0.9 {
                Vector3::x()
            } else {
                Vector3::y()
            };
            let e1 = (helper - direction * direction.dot(&helper)).normalize();
            let e2 = direction.cross(&e1);
            rows[(keep + 1) % 3] = e1;
            rows[(keep + 2) % 3] = e2;
        }
        _ => {
            *rows = [Vector3::x(), Vector3::y(), Vector3::z()];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn hexagonal(a: f64, c: f64) -> Lattice {
        let matrix = Matrix3::new(
            a,
            0.0,
            0.0,
            -0.5 * a,
            0.5 * 3f64.sqrt() * a,
            0.0,
            0.0,
            0.0,
            c,
        );
        Lattice::new(matrix, [true; 3]).unwrap()
    }

    #[test]
    fn cubic_cell_has_side_length_spacings() {
        let lattice = Lattice::cubic(4.0).unwrap();
        for spacing in lattice.interplanar_spacings() {
            assert!((spacing - 4.0).abs() < TOLERANCE);
        }
        assert!((lattice.volume() - 64.0).abs() < 1e-9);
    }

    #[test]
    fn skewed_cell_spacing_is_smaller_than_vector_length() {
        let lattice = hexagonal(3.0, 5.0);
        let spacings = lattice.interplanar_spacings();
        let expected = 3.0 * 3f64.sqrt() / 2.0;
        assert!((spacings[0] - expected).abs() < 1e-9);
        assert!((spacings[1] - expected).abs() < 1e-9);
        assert!((spacings[2] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn zero_vector_on_periodic_axis_is_rejected() {
        let matrix = Matrix3::from_diagonal(&Vector3::new(3.0, 0.0, 3.0));
        let result = Lattice::new(matrix, [true, true, true]);
        assert_eq!(result, Err(CellError::ZeroExtent { axis: 1 }));
    }

    #[test]
    fn coplanar_lattice_vectors_are_degenerate() {
        let matrix = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0);
        let result = Lattice::new(matrix, [true; 3]);
        assert!(matches!(result, Err(CellError::Degenerate { .. })));
    }

    #[test]
    fn zero_vector_on_non_periodic_axis_is_completed() {
        let matrix = Matrix3::from_diagonal(&Vector3::new(3.0, 4.0, 0.0));
        let lattice = Lattice::new(matrix, [true, true, false]).unwrap();
        let normal = lattice.vector(2);
        assert!((normal - Vector3::z()).norm() < TOLERANCE);
        assert_eq!(lattice.shift_range(2, 0.3, 10.0), 0..=0);
    }

    #[test]
    fn wire_with_single_periodic_axis_is_completed() {
        let matrix = Matrix3::new(0.0, 0.0, 2.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let lattice = Lattice::new(matrix, [true, false, false]).unwrap();
        assert!((lattice.interplanar_spacings()[0] - 2.5).abs() < 1e-12);
        assert!(lattice.volume() > 0.0);
    }

    #[test]
    fn wrap_returns_offset_that_restores_position() {
        let lattice = hexagonal(3.0, 5.0);
        let position = Point3::new(7.3, -4.1, 12.2);
        let (wrapped, offset) = lattice.wrap(&position);
        let fractional = lattice.to_fractional(&wrapped.coords);
        for axis in 0..3 {
            assert!(fractional[axis] >= -1e-12 && fractional[axis] < 1.0 + 1e-12);
        }
        let restored = wrapped + lattice.shift_vector(&offset);
        assert!((restored - position).norm() < 1e-9);
    }

    #[test]
    fn shift_range_covers_large_cutoff() {
        let lattice = Lattice::cubic(2.0).unwrap();
        let range = lattice.shift_range(0, 0.0, 5.0);
        assert!(range.contains(&-3) && range.contains(&3));
    }

    #[test]
    fn fractional_round_trip_is_identity() {
        let lattice = hexagonal(2.0, 7.0);
        let cartesian = Vector3::new(0.4, 1.7, -2.2);
        let back = lattice.to_cartesian(&lattice.to_fractional(&cartesian));
        assert!((back - cartesian).norm() < 1e-12);
    }

    #[test]
    fn non_finite_entry_is_rejected() {
        let mut matrix = Matrix3::identity();
        matrix[(1, 2)] = f64::NAN;
        assert_eq!(
            Lattice::new(matrix, [true; 3]),
            Err(CellError::NonFinite { axis: 1 })
        );
    }
}
