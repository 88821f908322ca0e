use nalgebra::DMatrix;
use std::f64::consts::E;

/// Normalization constant of the smooth finite bump, `1.14136 * e^2`.
const BUMP_SCALE: f64 = 1.14136 * E * E;

#[inline]
fn soft_unit_step(x: f64) -> f64 {
    if x > 0.0 { (-1.0 / x).exp() } else { 0.0 }
}

/// Smooth, finitely supported radial basis over `[0, cutoff]`.
///
/// `size` bumps are centered on the interior points of an evenly spaced grid
/// with `size + 2` points from `0` to `cutoff`, so every basis function and
/// all of its derivatives vanish at the cutoff. Values are scaled by
/// `sqrt(size)` to keep the expansion of unit order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialBasis {
    cutoff: f64,
    size: usize,
}

impl RadialBasis {
    pub fn new(cutoff: f64, size: usize) -> Self {
        Self { cutoff, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn step(&self) -> f64 {
        self.cutoff / (self.size + 1) as f64
    }

    /// Basis values for one distance.
    pub fn evaluate(&self, distance: f64) -> Vec<f64> {
        let step = self.step();
        let scale = (self.size as f64).sqrt();
        (1..=self.size)
            .map(|k| {
                let diff = (distance - k as f64 * step) / step;
                BUMP_SCALE * soft_unit_step(diff + 1.0) * soft_unit_step(1.0 - diff) * scale
            })
            .collect()
    }

    /// `E x size` expansion of a list of distances.
    pub fn expand(&self, distances: &[f64]) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(distances.len(), self.size);
        for (row, &distance) in distances.iter().enumerate() {
            for (col, value) in self.evaluate(distance).into_iter().enumerate() {
                out[(row, col)] = value;
            }
        }
        out
    }
}
