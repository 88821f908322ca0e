use super::config::ModelConfig;
use super::error::EngineError;
use super::sampler::NoisePredictor;
use crate::core::models::batch::Batch;
use crate::core::models::graph::Graph;
use crate::core::models::structure::Structure;
use crate::core::neighbors::NeighborGraphBuilder;
use crate::core::nn::readout::ReadoutHead;
use crate::core::nn::stack::MessagePassingStack;
use crate::core::nn::weights::ModelWeights;
use nalgebra::{DVector, Vector3};
use std::sync::Arc;
use tracing::debug;

/// Outputs of one forward pass over a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// One value per graph in the batch.
    pub graph_scalars: DVector<f64>,
    /// One value per node in the batch.
    pub node_scalars: DVector<f64>,
    /// One rotation-equivariant vector per node in the batch.
    pub node_vectors: Vec<Vector3<f64>>,
}

/// A configured network bound to a shared, validated weight set.
#[derive(Debug, Clone)]
pub struct Model {
    config: ModelConfig,
    weights: Arc<ModelWeights>,
    builder: NeighborGraphBuilder,
}

impl Model {
    pub fn new(config: ModelConfig, weights: Arc<ModelWeights>) -> Result<Self, EngineError> {
        weights.check_compatible(&config.architecture, config.cutoff_radius())?;
        weights.validate()?;
        let builder = config.graph.neighbor_builder()?;
        debug!(
            model = weights.name(),
            version = %weights.header.version,
            layers = config.architecture.num_layers,
            "Model weights accepted."
        );
        Ok(Self {
            config,
            weights,
            builder,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn weights(&self) -> &Arc<ModelWeights> {
        &self.weights
    }

    pub fn build_graph(&self, structure: &Structure) -> Graph {
        self.builder.build(structure)
    }

    pub fn forward(
        &self,
        batch: &Batch,
        noise_level: Option<f64>,
    ) -> Result<Prediction, EngineError> {
        let stack = MessagePassingStack::new(&self.weights, self.config.aggregation);
        let state = stack.forward(batch, noise_level)?;
        let head = ReadoutHead::new(&self.weights.readout, self.config.readout_aggregation);
        Ok(Prediction {
            graph_scalars: head.graph_scalars(&state, batch)?,
            node_scalars: head.node_scalars(&state)?,
            node_vectors: head.node_vectors(&state, batch)?,
        })
    }

    pub fn predict(
        &self,
        structure: &Structure,
        noise_level: Option<f64>,
    ) -> Result<Prediction, EngineError> {
        let graph = self.build_graph(structure);
        self.forward(&Batch::from_graph(&graph), noise_level)
    }
}

impl NoisePredictor for Model {
    fn predict_noise(
        &self,
        structure: &Structure,
        noise_level: f64,
    ) -> Result<Vec<Vector3<f64>>, EngineError> {
        Ok(self.predict(structure, Some(noise_level))?.node_vectors)
    }
}
