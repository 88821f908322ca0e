//! Message-passing layers.
//!
//! Both variants read a [`LayerState`] by value and return the next one. Edge
//! messages are computed from `(source, target, edge)` features and reduced at
//! the target node, so a layer only ever mixes information along edges.

pub mod equivariant;
pub mod invariant;

pub use equivariant::EquivariantLayer;
pub use invariant::InvariantLayer;

use super::NnError;
use super::aggregation::Aggregation;
use super::linear::{LayerNorm, Mlp, gather_rows, hstack};
use super::state::LayerState;
use nalgebra::{DMatrix, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Edge endpoints and unit edge directions of a batch.
#[derive(Debug, Clone)]
pub struct Topology<'a> {
    pub sources: &'a [usize],
    pub targets: &'a [usize],
    pub unit_vectors: Vec<Vector3<f64>>,
    pub num_nodes: usize,
}

impl<'a> Topology<'a> {
    /// Directions below this length are treated as zero vectors.
    pub const MIN_EDGE_LENGTH: f64 = 1e-12;

    pub fn new(
        sources: &'a [usize],
        targets: &'a [usize],
        edge_vectors: &[Vector3<f64>],
        num_nodes: usize,
    ) -> Self {
        let unit_vectors = edge_vectors
            .iter()
            .map(|r| {
                let length = r.norm();
                if length > Self::MIN_EDGE_LENGTH {
                    r / length
                } else {
                    Vector3::zeros()
                }
            })
            .collect();
        Self {
            sources,
            targets,
            unit_vectors,
            num_nodes,
        }
    }

    pub fn num_edges(&self) -> usize {
        self.sources.len()
    }

    /// `[x_source, x_target, e]` for every edge.
    pub(crate) fn edge_inputs(
        &self,
        nodes: &DMatrix<f64>,
        edges: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>, NnError> {
        let x_src = gather_rows(nodes, self.sources);
        let x_dst = gather_rows(nodes, self.targets);
        hstack(&[&x_src, &x_dst, edges])
    }
}

/// Residual edge update `e' = LN(MLP([x_src, x_dst, e])) + e`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeUpdate {
    pub mlp: Mlp,
    pub norm: LayerNorm,
}

impl EdgeUpdate {
    pub fn initialize(width: usize, rng: &mut impl Rng) -> Self {
        Self {
            mlp: Mlp::initialize(&[3 * width, width, width, width], rng),
            norm: LayerNorm::new(width),
        }
    }

    pub fn apply(
        &self,
        nodes: &DMatrix<f64>,
        edges: &DMatrix<f64>,
        topology: &Topology<'_>,
    ) -> Result<DMatrix<f64>, NnError> {
        let input = topology.edge_inputs(nodes, edges)?;
        let out = self.norm.forward(&self.mlp.forward(&input)?)?;
        Ok(out + edges)
    }

    pub fn validate(&self, context: &str, width: usize) -> Result<(), NnError> {
        self.mlp
            .validate(&format!("{context} edge MLP"), &[3 * width, width, width, width])?;
        self.norm.validate(&format!("{context} edge norm"), width)
    }
}

/// One layer of either variant; serialized with a `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MessagePassingLayer {
    Invariant(InvariantLayer),
    Equivariant(EquivariantLayer),
}

impl MessagePassingLayer {
    pub fn is_equivariant(&self) -> bool {
        matches!(self, Self::Equivariant(_))
    }

    pub fn forward(
        &self,
        state: LayerState,
        topology: &Topology<'_>,
        aggregation: Aggregation,
        update_edges: bool,
    ) -> Result<LayerState, NnError> {
        match self {
            Self::Invariant(layer) => layer.forward(state, topology, aggregation, update_edges),
            Self::Equivariant(layer) => layer.forward(state, topology, aggregation),
        }
    }

    pub fn validate(&self, context: &str, width: usize, update_edges: bool) -> Result<(), NnError> {
        match self {
            Self::Invariant(layer) => layer.validate(context, width),
            Self::Equivariant(layer) => layer.validate(context, width, update_edges),
        }
    }
}
