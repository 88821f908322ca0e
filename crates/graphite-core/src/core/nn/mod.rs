//! # Neural Network Module
//!
//! Message-passing networks over batched atomic graphs.
//!
//! Features are dense row-major tables: node features are `N x F` matrices,
//! edge features `E x F`, and equivariant vector channels are stored as three
//! `N x F` matrices (one per Cartesian component). Every operation acts on rows
//! independently or reduces over the edges of one target node, so computations
//! on a [`Batch`](crate::core::models::batch::Batch) never mix graphs.
//!
//! - [`linear`] - Dense layers, layer normalization and MLPs
//! - [`basis`] - Smooth radial basis expansion of edge lengths
//! - [`aggregation`] - Permutation-invariant neighborhood and graph reductions
//! - [`layers`] - Invariant and equivariant message-passing layers
//! - [`stack`] - Encoder plus the full layer stack
//! - [`readout`] - Per-graph and per-node prediction heads
//! - [`weights`] - Serializable weight sets with their architecture header

pub mod aggregation;
pub mod basis;
pub mod layers;
pub mod linear;
pub mod readout;
pub mod stack;
pub mod state;
pub mod weights;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NnError {
    #[error("Shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Incompatible model: {field} is {found} in the weights but {expected} was requested")]
    IncompatibleModel {
        field: &'static str,
        expected: String,
        found: String,
    },

    #[error("Atom {atom} has species {species}, but the model only embeds {num_species} species")]
    SpeciesOutOfRange {
        atom: usize,
        species: u32,
        num_species: usize,
    },
}

pub(crate) fn check_shape(
    context: impl Into<String>,
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<(), NnError> {
    if expected == found {
        Ok(())
    } else {
        Err(NnError::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        })
    }
}
