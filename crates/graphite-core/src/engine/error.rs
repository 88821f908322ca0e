use super::config::ConfigError;
use crate::core::geometry::lattice::CellError;
use crate::core::models::batch::BatchError;
use crate::core::models::graph::GraphError;
use crate::core::models::structure::StructureError;
use crate::core::neighbors::NeighborError;
use crate::core::nn::NnError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid structure: {source}")]
    Structure {
        #[from]
        source: StructureError,
    },

    #[error("Invalid periodic cell: {source}")]
    Cell {
        #[from]
        source: CellError,
    },

    #[error("Neighbor search failed: {source}")]
    Neighbors {
        #[from]
        source: NeighborError,
    },

    #[error("Invalid graph: {source}")]
    Graph {
        #[from]
        source: GraphError,
    },

    #[error("Batch assembly failed: {source}")]
    Batch {
        #[from]
        source: BatchError,
    },

    #[error("Model evaluation failed: {source}")]
    Model {
        #[from]
        source: NnError,
    },

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Predictor returned {found} noise vectors for {expected} atoms")]
    PredictionLength { expected: usize, found: usize },

    #[error(
        "Sampling diverged at step {step} (noise level {noise_level}): atom {atom} axis {axis} is not finite; last good step: {last_good_step:?}"
    )]
    DivergedSampling {
        step: usize,
        noise_level: f64,
        last_good_step: Option<usize>,
        atom: usize,
        axis: usize,
    },

    #[error("Sampling cancelled before step {step}")]
    Cancelled { step: usize },
}
