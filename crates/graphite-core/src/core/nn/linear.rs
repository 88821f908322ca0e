use super::{NnError, check_shape};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Rows per block when an MLP is evaluated over many rows.
///
/// Blocking is applied in both serial and parallel builds so that the two
/// produce the same floating-point results.
const ROW_BLOCK: usize = 512;

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
pub fn silu(x: f64) -> f64 {
    x * sigmoid(x)
}

/// Fully connected layer `y = x W^T + b` applied to every row of `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    /// `out x in` weight matrix.
    pub weight: DMatrix<f64>,
    pub bias: Option<DVector<f64>>,
}

impl Linear {
    pub fn zeros(in_features: usize, out_features: usize, bias: bool) -> Self {
        Self {
            weight: DMatrix::zeros(out_features, in_features),
            bias: bias.then(|| DVector::zeros(out_features)),
        }
    }

    /// Random weights drawn from `N(0, 1/in_features)`, zero bias.
    pub fn initialize(
        in_features: usize,
        out_features: usize,
        bias: bool,
        rng: &mut impl Rng,
    ) -> Self {
        let std_dev = 1.0 / (in_features.max(1) as f64).sqrt();
        Self {
            weight: DMatrix::from_fn(out_features, in_features, |_, _| {
                let z: f64 = StandardNormal.sample(&mut *rng);
                z * std_dev
            }),
            bias: bias.then(|| DVector::zeros(out_features)),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn forward(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, NnError> {
        check_shape(
            "linear layer input",
            (x.nrows(), self.in_features()),
            x.shape(),
        )?;
        let mut out = x * self.weight.transpose();
        if let Some(bias) = &self.bias {
            let bias_row = bias.transpose();
            for mut row in out.row_iter_mut() {
                row += &bias_row;
            }
        }
        Ok(out)
    }

    pub fn validate(
        &self,
        context: &str,
        in_features: usize,
        out_features: usize,
    ) -> Result<(), NnError> {
        check_shape(
            format!("{context} weight"),
            (out_features, in_features),
            self.weight.shape(),
        )?;
        if let Some(bias) = &self.bias {
            check_shape(format!("{context} bias"), (out_features, 1), bias.shape())?;
        }
        Ok(())
    }
}

/// Per-row layer normalization with learned scale and offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerNorm {
    pub gamma: DVector<f64>,
    pub beta: DVector<f64>,
    pub eps: f64,
}

impl LayerNorm {
    pub const DEFAULT_EPS: f64 = 1e-5;

    pub fn new(width: usize) -> Self {
        Self {
            gamma: DVector::from_element(width, 1.0),
            beta: DVector::zeros(width),
            eps: Self::DEFAULT_EPS,
        }
    }

    pub fn width(&self) -> usize {
        self.gamma.len()
    }

    pub fn forward(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, NnError> {
        check_shape("layer norm input", (x.nrows(), self.width()), x.shape())?;
        let width = self.width() as f64;
        let mut out = x.clone();
        for mut row in out.row_iter_mut() {
            let mean = row.sum() / width;
            let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / width;
            let inv_std = 1.0 / (var + self.eps).sqrt();
            for (c, value) in row.iter_mut().enumerate() {
                *value = (*value - mean) * inv_std * self.gamma[c] + self.beta[c];
            }
        }
        Ok(out)
    }

    pub fn validate(&self, context: &str, width: usize) -> Result<(), NnError> {
        check_shape(format!("{context} gamma"), (width, 1), self.gamma.shape())?;
        check_shape(format!("{context} beta"), (width, 1), self.beta.shape())
    }
}

/// Stack of linear layers with SiLU between consecutive layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    pub layers: Vec<Linear>,
}

impl Mlp {
    /// `widths` lists input, hidden and output widths, e.g. `[3F, F, F, F]`.
    pub fn initialize(widths: &[usize], rng: &mut impl Rng) -> Self {
        Self {
            layers: widths
                .windows(2)
                .map(|w| Linear::initialize(w[0], w[1], true, &mut *rng))
                .collect(),
        }
    }

    pub fn in_features(&self) -> usize {
        self.layers.first().map_or(0, Linear::in_features)
    }

    pub fn out_features(&self) -> usize {
        self.layers.last().map_or(0, Linear::out_features)
    }

    pub fn forward(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, NnError> {
        let rows = x.nrows();
        if rows <= ROW_BLOCK {
            return self.forward_block(x);
        }

        let starts: Vec<usize> = (0..rows).step_by(ROW_BLOCK).collect();

        #[cfg(not(feature = "parallel"))]
        let iterator = starts.iter();

        #[cfg(feature = "parallel")]
        let iterator = starts.par_iter();

        let blocks = iterator
            .map(|&start| {
                let len = ROW_BLOCK.min(rows - start);
                self.forward_block(&x.rows(start, len).into_owned())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = DMatrix::zeros(rows, self.out_features());
        for (start, block) in starts.into_iter().zip(blocks) {
            out.rows_mut(start, block.nrows()).copy_from(&block);
        }
        Ok(out)
    }

    fn forward_block(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, NnError> {
        let mut h = x.clone();
        let last = self.layers.len().saturating_sub(1);
        for (idx, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h)?;
            if idx < last {
                h.apply(|v| *v = silu(*v));
            }
        }
        Ok(h)
    }

    pub fn validate(&self, context: &str, widths: &[usize]) -> Result<(), NnError> {
        check_shape(
            format!("{context} depth"),
            (widths.len().saturating_sub(1), 1),
            (self.layers.len(), 1),
        )?;
        for (idx, (layer, w)) in self.layers.iter().zip(widths.windows(2)).enumerate() {
            layer.validate(&format!("{context} layer {idx}"), w[0], w[1])?;
        }
        Ok(())
    }
}

/// Copies the rows `indices` of `m` into a new matrix.
pub fn gather_rows(m: &DMatrix<f64>, indices: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(indices.len(), m.ncols(), |r, c| m[(indices[r], c)])
}

/// Concatenates matrices with equal row counts side by side.
pub fn hstack(parts: &[&DMatrix<f64>]) -> Result<DMatrix<f64>, NnError> {
    let rows = parts.first().map_or(0, |m| m.nrows());
    for (idx, part) in parts.iter().enumerate() {
        if part.nrows() != rows {
            return Err(NnError::ShapeMismatch {
                context: format!("concatenated block {idx}"),
                expected: (rows, part.ncols()),
                found: part.shape(),
            });
        }
    }
    let cols = parts.iter().map(|m| m.ncols()).sum();
    let mut out = DMatrix::zeros(rows, cols);
    let mut col = 0;
    for part in parts {
        out.columns_mut(col, part.ncols()).copy_from(*part);
        col += part.ncols();
    }
    Ok(out)
}
