use super::aggregation::Aggregation;
use super::basis::RadialBasis;
use super::layers::Topology;
use super::state::LayerState;
use super::weights::ModelWeights;
use super::{NnError, check_shape};
use crate::core::models::batch::Batch;
use nalgebra::DMatrix;
use tracing::{instrument, trace};

/// Encoder followed by the configured message-passing layers.
#[derive(Debug, Clone, Copy)]
pub struct MessagePassingStack<'w> {
    weights: &'w ModelWeights,
    aggregation: Aggregation,
    basis: RadialBasis,
}

impl<'w> MessagePassingStack<'w> {
    pub fn new(weights: &'w ModelWeights, aggregation: Aggregation) -> Self {
        let basis = RadialBasis::new(
            weights.cutoff_radius(),
            weights.architecture().num_radial_basis,
        );
        Self {
            weights,
            aggregation,
            basis,
        }
    }

    pub fn weights(&self) -> &'w ModelWeights {
        self.weights
    }

    /// Initial node and edge features of a batch.
    ///
    /// Node features are the species embedding, plus a projection of the node
    /// attributes and `ln(sigma) * w_noise` when those are present. Edge
    /// features are the projected radial basis expansion of edge lengths, plus a
    /// projection of the edge attributes.
    pub fn encode(&self, batch: &Batch, noise_level: Option<f64>) -> Result<LayerState, NnError> {
        let arch = self.weights.architecture();
        let encoder = &self.weights.encoder;
        let width = arch.feature_width;

        let mut nodes = DMatrix::zeros(batch.num_nodes(), width);
        for (atom, species) in batch.species().iter().enumerate() {
            if species.index() >= arch.num_species {
                return Err(NnError::SpeciesOutOfRange {
                    atom,
                    species: species.0,
                    num_species: arch.num_species,
                });
            }
            nodes
                .row_mut(atom)
                .copy_from(&encoder.species_embedding.row(species.index()));
        }

        if let Some(projection) = &encoder.node_attr_projection {
            let attrs = require_attributes(
                "node attributes",
                batch.node_attrs(),
                batch.num_nodes(),
                arch.node_attr_width,
            )?;
            nodes += projection.forward(attrs)?;
        } else if let Some(attrs) = batch.node_attrs() {
            check_shape("node attributes", (attrs.nrows(), 0), attrs.shape())?;
        }

        if let Some(sigma) = noise_level {
            let shift = encoder.noise_embedding.transpose() * sigma.ln();
            for mut row in nodes.row_iter_mut() {
                row += &shift;
            }
        }

        let lengths: Vec<f64> = batch.edge_vectors().iter().map(|r| r.norm()).collect();
        let mut edges = encoder.edge_encoder.forward(&self.basis.expand(&lengths))?;
        if let Some(projection) = &encoder.edge_attr_projection {
            let attrs = require_attributes(
                "edge attributes",
                batch.edge_attrs(),
                batch.num_edges(),
                arch.edge_attr_width,
            )?;
            edges += projection.forward(attrs)?;
        } else if let Some(attrs) = batch.edge_attrs() {
            check_shape("edge attributes", (attrs.nrows(), 0), attrs.shape())?;
        }

        let vectors = arch
            .equivariant
            .then(|| std::array::from_fn(|_| DMatrix::zeros(batch.num_nodes(), width)));

        Ok(LayerState {
            nodes,
            vectors,
            edges,
        })
    }

    #[instrument(
        skip_all,
        name = "message_passing",
        fields(nodes = batch.num_nodes(), edges = batch.num_edges())
    )]
    pub fn forward(&self, batch: &Batch, noise_level: Option<f64>) -> Result<LayerState, NnError> {
        let topology = Topology::new(
            batch.sources(),
            batch.targets(),
            batch.edge_vectors(),
            batch.num_nodes(),
        );
        let update_edges = self.weights.architecture().update_edges;

        let mut state = self.encode(batch, noise_level)?;
        for (idx, layer) in self.weights.layers.iter().enumerate() {
            state = layer.forward(state, &topology, self.aggregation, update_edges)?;
            trace!(layer = idx, "Layer finished.");
        }
        Ok(state)
    }
}

fn require_attributes<'a>(
    context: &str,
    attrs: Option<&'a DMatrix<f64>>,
    rows: usize,
    width: usize,
) -> Result<&'a DMatrix<f64>, NnError> {
    let found = attrs.map_or((rows, 0), |m| m.shape());
    check_shape(context, (rows, width), found)?;
    attrs.ok_or_else(|| NnError::ShapeMismatch {
        context: context.to_string(),
        expected: (rows, width),
        found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::graph::Graph;
    use crate::core::models::species::Species;
    use crate::core::models::structure::Structure;
    use crate::core::neighbors::NeighborGraphBuilder;
    use crate::core::nn::weights::Architecture;
    use nalgebra::Point3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn weights(equivariant: bool, node_attr_width: usize) -> ModelWeights {
        let arch = Architecture {
            feature_width: 8,
            num_layers: 2,
            num_species: 9,
            num_radial_basis: 6,
            equivariant,
            update_edges: true,
            node_attr_width,
            edge_attr_width: 0,
        };
        ModelWeights::initialize("fixture", &arch, 3.0, &mut StdRng::seed_from_u64(17))
    }

    fn water_graph() -> Graph {
        let structure = Structure::new(
            vec![Species(8), Species(1), Species(1)],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.96, 0.0, 0.0),
                Point3::new(-0.24, 0.93, 0.0),
            ],
        )
        .unwrap();
        NeighborGraphBuilder::new(3.0).unwrap().build(&structure)
    }

    #[test]
    fn forward_produces_features_of_configured_width() {
        for equivariant in [false, true] {
            let weights = weights(equivariant, 0);
            let stack = MessagePassingStack::new(&weights, Aggregation::Sum);
            let batch = Batch::from_graph(&water_graph());
            let state = stack.forward(&batch, Some(0.5)).unwrap();
            assert_eq!(state.nodes.shape(), (3, 8));
            assert_eq!(state.edges.shape(), (6, 8));
            assert_eq!(state.vectors.is_some(), equivariant);
            assert!(state.nodes.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn unknown_species_is_reported_with_atom_index() {
        let weights = weights(false, 0);
        let stack = MessagePassingStack::new(&weights, Aggregation::Mean);
        let structure = Structure::new(
            vec![Species(1), Species(26)],
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
        )
        .unwrap();
        let graph = NeighborGraphBuilder::new(3.0).unwrap().build(&structure);
        let result = stack.forward(&Batch::from_graph(&graph), None);
        assert_eq!(
            result,
            Err(NnError::SpeciesOutOfRange {
                atom: 1,
                species: 26,
                num_species: 9
            })
        );
    }

    #[test]
    fn missing_node_attributes_are_a_shape_mismatch() {
        let weights = weights(false, 2);
        let stack = MessagePassingStack::new(&weights, Aggregation::Sum);
        let result = stack.forward(&Batch::from_graph(&water_graph()), None);
        assert!(matches!(result, Err(NnError::ShapeMismatch { .. })));

        let graph = water_graph()
            .with_node_attrs(DMatrix::from_element(3, 2, 0.5))
            .unwrap();
        assert!(stack.forward(&Batch::from_graph(&graph), None).is_ok());
    }

    #[test]
    fn noise_level_changes_node_encoding() {
        let weights = weights(false, 0);
        let stack = MessagePassingStack::new(&weights, Aggregation::Sum);
        let batch = Batch::from_graph(&water_graph());
        let quiet = stack.encode(&batch, None).unwrap();
        let unit = stack.encode(&batch, Some(1.0)).unwrap();
        let noisy = stack.encode(&batch, Some(2.0)).unwrap();
        // ln(1) = 0 leaves the embedding unchanged.
        assert_eq!(quiet.nodes, unit.nodes);
        assert_ne!(quiet.nodes, noisy.nodes);
    }
}
