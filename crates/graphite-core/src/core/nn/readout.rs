use super::aggregation::ReadoutAggregation;
use super::layers::Topology;
use super::state::LayerState;
use super::weights::ReadoutWeights;
use super::{NnError, check_shape};
use crate::core::models::batch::Batch;
use nalgebra::{DVector, Vector3};

/// Maps the final layer state to per-graph and per-node predictions.
#[derive(Debug, Clone, Copy)]
pub struct ReadoutHead<'w> {
    weights: &'w ReadoutWeights,
    aggregation: ReadoutAggregation,
}

impl<'w> ReadoutHead<'w> {
    pub fn new(weights: &'w ReadoutWeights, aggregation: ReadoutAggregation) -> Self {
        Self {
            weights,
            aggregation,
        }
    }

    /// One scalar per node.
    pub fn node_scalars(&self, state: &LayerState) -> Result<DVector<f64>, NnError> {
        let out = self.weights.scalar_mlp.forward(&state.nodes)?;
        check_shape("node scalar readout", (state.num_nodes(), 1), out.shape())?;
        Ok(out.column(0).into_owned())
    }

    /// One scalar per graph, pooled over that graph's nodes only.
    pub fn graph_scalars(
        &self,
        state: &LayerState,
        batch: &Batch,
    ) -> Result<DVector<f64>, NnError> {
        check_nodes(state, batch)?;
        let per_node = self.node_scalars(state)?;
        Ok(self.aggregation.pool(&per_node, batch))
    }

    /// One 3-vector per node that rotates with the input structure.
    ///
    /// Equivariant states contract their vector channels with learned channel
    /// weights. Invariant states sum unit edge directions over the incoming
    /// edges of each node, weighted by a learned projection of the edge
    /// features.
    pub fn node_vectors(
        &self,
        state: &LayerState,
        batch: &Batch,
    ) -> Result<Vec<Vector3<f64>>, NnError> {
        check_nodes(state, batch)?;
        let head = &self.weights.vector_head;

        if let Some(channels) = &state.vectors {
            let [x, y, z] = channels;
            let (x, y, z) = (head.forward(x)?, head.forward(y)?, head.forward(z)?);
            return Ok((0..state.num_nodes())
                .map(|n| Vector3::new(x[(n, 0)], y[(n, 0)], z[(n, 0)]))
                .collect());
        }

        check_shape(
            "edge features",
            (batch.num_edges(), state.width()),
            state.edges.shape(),
        )?;
        let weights = head.forward(&state.edges)?;
        let topology = Topology::new(
            batch.sources(),
            batch.targets(),
            batch.edge_vectors(),
            batch.num_nodes(),
        );
        let mut out = vec![Vector3::zeros(); state.num_nodes()];
        for (edge, &target) in batch.targets().iter().enumerate() {
            out[target] += topology.unit_vectors[edge] * weights[(edge, 0)];
        }
        Ok(out)
    }
}

fn check_nodes(state: &LayerState, batch: &Batch) -> Result<(), NnError> {
    check_shape(
        "layer state nodes",
        (batch.num_nodes(), state.width()),
        state.nodes.shape(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::graph::{Edge, Graph};
    use crate::core::models::species::Species;
    use crate::core::models::structure::Structure;
    use crate::core::nn::linear::{Linear, Mlp};
    use nalgebra::{DMatrix, Point3};

    fn identity_head() -> ReadoutWeights {
        ReadoutWeights {
            scalar_mlp: Mlp {
                layers: vec![Linear {
                    weight: DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
                    bias: None,
                }],
            },
            vector_head: Linear {
                weight: DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
                bias: None,
            },
        }
    }

    fn batch() -> Batch {
        let a = Structure::new(
            vec![Species(1), Species(1)],
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
        )
        .unwrap();
        let b = Structure::new(vec![Species(1)], vec![Point3::origin()]).unwrap();
        let ga = Graph::from_edges(
            &a,
            vec![Edge::new(0, 1, [0; 3]), Edge::new(1, 0, [0; 3])],
            1.5,
        )
        .unwrap();
        let gb = Graph::from_edges(&b, vec![], 1.5).unwrap();
        Batch::assemble(&[ga, gb]).unwrap()
    }

    fn state() -> LayerState {
        LayerState {
            nodes: DMatrix::from_row_slice(3, 2, &[1.0, 9.0, 2.0, 9.0, 5.0, 9.0]),
            vectors: None,
            edges: DMatrix::from_row_slice(2, 2, &[0.5, 0.5, 2.0, 0.0]),
        }
    }

    #[test]
    fn graph_scalars_pool_within_each_graph() {
        let weights = identity_head();
        let batch = batch();
        let sum = ReadoutHead::new(&weights, ReadoutAggregation::Sum)
            .graph_scalars(&state(), &batch)
            .unwrap();
        assert_eq!(sum, DVector::from_vec(vec![3.0, 5.0]));
        let mean = ReadoutHead::new(&weights, ReadoutAggregation::Mean)
            .graph_scalars(&state(), &batch)
            .unwrap();
        assert_eq!(mean, DVector::from_vec(vec![1.5, 5.0]));
    }

    #[test]
    fn invariant_vectors_sum_weighted_incoming_directions() {
        let weights = identity_head();
        let head = ReadoutHead::new(&weights, ReadoutAggregation::Sum);
        let vectors = head.node_vectors(&state(), &batch()).unwrap();
        // Edge 0->1 points along +x with weight 1, edge 1->0 along -x with weight 2.
        assert_eq!(vectors[1], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(vectors[0], Vector3::new(-2.0, 0.0, 0.0));
        assert_eq!(vectors[2], Vector3::zeros());
    }

    #[test]
    fn equivariant_vectors_contract_channels() {
        let weights = identity_head();
        let head = ReadoutHead::new(&weights, ReadoutAggregation::Sum);
        let mut state = state();
        state.vectors = Some([
            DMatrix::from_element(3, 2, 1.0),
            DMatrix::zeros(3, 2),
            DMatrix::from_element(3, 2, -0.5),
        ]);
        let vectors = head.node_vectors(&state, &batch()).unwrap();
        assert!(vectors.iter().all(|v| *v == Vector3::new(2.0, 0.0, -1.0)));
    }

    #[test]
    fn mismatched_state_is_rejected() {
        let weights = identity_head();
        let head = ReadoutHead::new(&weights, ReadoutAggregation::Sum);
        let mut state = state();
        state.nodes = DMatrix::zeros(4, 2);
        assert!(head.graph_scalars(&state, &batch()).is_err());
    }
}
