//! # Neighbor Graph Module
//!
//! Turns a [`Structure`](crate::core::models::structure::Structure) and a
//! cutoff radius into a [`Graph`](crate::core::models::graph::Graph).
//!
//! Two search strategies are available. [`brute`] tests every ordered atom pair
//! against every candidate periodic image, while [`cell_list`] bins periodic
//! images of the wrapped atoms into cubic cells and only tests atoms in
//! adjacent bins. Both strategies run the same closed-interval inclusion test
//! from [`crate::core::geometry::images`], so they always agree on the edge set.

pub mod brute;
pub mod builder;
pub mod cell_list;

pub use builder::NeighborGraphBuilder;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NeighborError {
    #[error("Cutoff radius must be positive and finite, got {0}")]
    InvalidCutoff(f64),
}

/// Which half-edges of each neighbor pair are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeMode {
    /// Both `i -> j` and `j -> i` (required by message passing).
    #[default]
    Bidirectional,
    /// One canonical half-edge per pair: `i < j`, or `i == j` with a
    /// lexicographically positive shift.
    DirectedOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NeighborStrategy {
    /// Cell lists above the configured atom count threshold, brute force below.
    #[default]
    Auto,
    BruteForce,
    CellList,
}

/// Candidate `(target, shift)` pairs found for one source atom.
pub type Candidates = Vec<(usize, crate::core::geometry::lattice::Shift)>;
