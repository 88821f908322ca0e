use super::{EdgeUpdate, Topology};
use crate::core::nn::NnError;
use crate::core::nn::aggregation::Aggregation;
use crate::core::nn::linear::{LayerNorm, Mlp, hstack};
use crate::core::nn::state::LayerState;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// MeshGraphNets processor block.
///
/// ```text
/// e' = LN(MLP([x_src, x_dst, e])) + e
/// x' = LN(MLP([x, agg(e')])) + x
/// ```
///
/// When edge updates are disabled `e'` is still used as the message, but the
/// outgoing state keeps the incoming edge features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantLayer {
    pub edge_update: EdgeUpdate,
    pub node_mlp: Mlp,
    pub node_norm: LayerNorm,
}

impl InvariantLayer {
    pub fn initialize(width: usize, rng: &mut impl Rng) -> Self {
        Self {
            edge_update: EdgeUpdate::initialize(width, rng),
            node_mlp: Mlp::initialize(&[2 * width, width, width, width], rng),
            node_norm: LayerNorm::new(width),
        }
    }

    pub fn forward(
        &self,
        state: LayerState,
        topology: &Topology<'_>,
        aggregation: Aggregation,
        update_edges: bool,
    ) -> Result<LayerState, NnError> {
        let LayerState {
            nodes,
            vectors,
            edges,
        } = state;

        let messages = self.edge_update.apply(&nodes, &edges, topology)?;
        let aggregated = aggregation.scatter(&messages, topology.targets, topology.num_nodes);
        let input = hstack(&[&nodes, &aggregated])?;
        let updated = self.node_norm.forward(&self.node_mlp.forward(&input)?)? + &nodes;

        Ok(LayerState {
            nodes: updated,
            vectors,
            edges: if update_edges { messages } else { edges },
        })
    }

    pub fn validate(&self, context: &str, width: usize) -> Result<(), NnError> {
        self.edge_update.validate(context, width)?;
        self.node_mlp
            .validate(&format!("{context} node MLP"), &[2 * width, width, width, width])?;
        self.node_norm.validate(&format!("{context} node norm"), width)
    }
}
