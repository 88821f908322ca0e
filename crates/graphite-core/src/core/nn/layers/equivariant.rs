use super::{EdgeUpdate, Topology};
use crate::core::nn::NnError;
use crate::core::nn::aggregation::Aggregation;
use crate::core::nn::linear::{LayerNorm, Linear, Mlp, gather_rows, hstack, sigmoid};
use crate::core::nn::state::LayerState;
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Gated message passing with scalar and vector channels.
///
/// For every edge the message MLP maps `[s_src, s_dst, e]` to three blocks
/// `(a, b, c)` of width `F`. The scalar message is `a`; the vector message of
/// channel `f` is `b_f v_src,f + c_f u` with `u` the unit edge direction. Only
/// invariant quantities (scalars, vector norms) enter nonlinearities, and
/// vectors are mixed linearly across channels and scaled by sigmoid gates, so
/// the vector channels rotate with the input structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivariantLayer {
    pub message_mlp: Mlp,
    pub update_mlp: Mlp,
    pub update_norm: LayerNorm,
    pub vector_mix: Linear,
    pub gate: Linear,
    pub edge_update: Option<EdgeUpdate>,
}

impl EquivariantLayer {
    pub fn initialize(width: usize, update_edges: bool, rng: &mut impl Rng) -> Self {
        Self {
            message_mlp: Mlp::initialize(&[3 * width, width, 3 * width], rng),
            update_mlp: Mlp::initialize(&[3 * width, width, width], rng),
            update_norm: LayerNorm::new(width),
            vector_mix: Linear::initialize(width, width, false, rng),
            gate: Linear::initialize(width, width, true, rng),
            edge_update: update_edges.then(|| EdgeUpdate::initialize(width, rng)),
        }
    }

    pub fn forward(
        &self,
        state: LayerState,
        topology: &Topology<'_>,
        aggregation: Aggregation,
    ) -> Result<LayerState, NnError> {
        let LayerState {
            nodes,
            vectors,
            edges,
        } = state;
        let width = nodes.ncols();
        let num_nodes = topology.num_nodes;
        let vectors =
            vectors.unwrap_or_else(|| std::array::from_fn(|_| DMatrix::zeros(num_nodes, width)));

        let input = topology.edge_inputs(&nodes, &edges)?;
        let abc = self.message_mlp.forward(&input)?;
        let a = abc.columns(0, width).into_owned();
        let b = abc.columns(width, width).into_owned();
        let c = abc.columns(2 * width, width).into_owned();

        let aggregated_scalars = aggregation.scatter(&a, topology.targets, num_nodes);
        let vector_aggregation = aggregation.vector_reduction();

        let mixed = vectors
            .iter()
            .enumerate()
            .map(|(k, component)| {
                let mut message = b.component_mul(&gather_rows(component, topology.sources));
                for (edge, mut row) in message.row_iter_mut().enumerate() {
                    row += c.row(edge) * topology.unit_vectors[edge][k];
                }
                let aggregated = vector_aggregation.scatter(&message, topology.targets, num_nodes);
                self.vector_mix.forward(&(component + aggregated))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let norms = DMatrix::from_fn(num_nodes, width, |n, f| {
            (mixed[0][(n, f)].powi(2) + mixed[1][(n, f)].powi(2) + mixed[2][(n, f)].powi(2))
                .sqrt()
        });
        let update_input = hstack(&[&nodes, &aggregated_scalars, &norms])?;
        let scalars = self
            .update_norm
            .forward(&self.update_mlp.forward(&update_input)?)?
            + &nodes;

        let gates = self.gate.forward(&scalars)?.map(sigmoid);
        let vectors: [DMatrix<f64>; 3] = std::array::from_fn(|k| mixed[k].component_mul(&gates));

        let edges = match &self.edge_update {
            Some(update) => update.apply(&scalars, &edges, topology)?,
            None => edges,
        };

        Ok(LayerState {
            nodes: scalars,
            vectors: Some(vectors),
            edges,
        })
    }

    pub fn validate(&self, context: &str, width: usize, update_edges: bool) -> Result<(), NnError> {
        self.message_mlp.validate(
            &format!("{context} message MLP"),
            &[3 * width, width, 3 * width],
        )?;
        self.update_mlp
            .validate(&format!("{context} update MLP"), &[3 * width, width, width])?;
        self.update_norm
            .validate(&format!("{context} update norm"), width)?;
        self.vector_mix
            .validate(&format!("{context} vector mix"), width, width)?;
        self.gate.validate(&format!("{context} gate"), width, width)?;
        match (&self.edge_update, update_edges) {
            (Some(update), true) => update.validate(context, width),
            (None, false) => Ok(()),
            (present, _) => Err(NnError::ShapeMismatch {
                context: format!("{context} edge update blocks"),
                expected: (usize::from(update_edges), 1),
                found: (usize::from(present.is_some()), 1),
            }),
        }
    }
}
