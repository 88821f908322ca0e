use crate::core::models::batch::Batch;
use crate::core::models::graph::Graph;
use crate::core::models::structure::Structure;
use crate::engine::error::EngineError;
use crate::engine::model::Model;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::Vector3;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, instrument};

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Model outputs for one input structure.
#[derive(Debug, Clone, PartialEq)]
pub struct StructurePrediction {
    pub graph_scalar: f64,
    pub node_scalars: Vec<f64>,
    pub node_vectors: Vec<Vector3<f64>>,
    pub num_edges: usize,
}

/// Evaluates `model` on every structure, `batch_size` structures per forward
/// pass, returning predictions in input order.
#[instrument(
    skip_all,
    name = "predict_workflow",
    fields(structures = structures.len(), batch_size = batch_size)
)]
pub fn run(
    model: &Model,
    structures: &[Structure],
    noise_level: Option<f64>,
    batch_size: usize,
    reporter: &ProgressReporter,
) -> Result<Vec<StructurePrediction>, EngineError> {
    let graphs = {
        let _phase = reporter.phase("Building Graphs");
        build_graphs(model, structures)
    };
    let total_edges: usize = graphs.iter().map(Graph::num_edges).sum();
    info!(graphs = graphs.len(), edges = total_edges, "Neighbor graphs built.");

    let _phase = reporter.phase("Evaluating Model");
    let chunks = graphs.chunks(batch_size.max(1));
    reporter.report(Progress::TaskStart {
        total_steps: chunks.len() as u64,
    });

    let mut predictions = Vec::with_capacity(structures.len());
    for chunk in chunks {
        let batch = Batch::assemble(chunk)?;
        predictions.extend(evaluate(model, &batch, noise_level)?);
        reporter.report(Progress::TaskIncrement);
    }
    reporter.report(Progress::TaskFinish);

    info!(
        "Prediction complete for {} structure(s).",
        predictions.len()
    );
    Ok(predictions)
}

fn build_graphs(model: &Model, structures: &[Structure]) -> Vec<Graph> {
    #[cfg(not(feature = "parallel"))]
    let iterator = structures.iter();

    #[cfg(feature = "parallel")]
    let iterator = structures.par_iter();

    iterator.map(|s| model.build_graph(s)).collect()
}

/// Runs one forward pass and splits the outputs back per graph.
pub fn evaluate(
    model: &Model,
    batch: &Batch,
    noise_level: Option<f64>,
) -> Result<Vec<StructurePrediction>, EngineError> {
    let prediction = model.forward(batch, noise_level)?;
    let node_scalars = batch.split_nodes(prediction.node_scalars.as_slice());
    let node_vectors = batch.split_nodes(&prediction.node_vectors);

    Ok(node_scalars
        .into_iter()
        .zip(node_vectors)
        .enumerate()
        .map(|(graph, (node_scalars, node_vectors))| StructurePrediction {
            graph_scalar: prediction.graph_scalars[graph],
            node_scalars,
            node_vectors,
            num_edges: batch.edge_range(graph).len(),
        })
        .collect())
}
