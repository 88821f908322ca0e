use crate::cli::PredictArgs;
use crate::commands::load_model;
use crate::config::PartialConfig;
use crate::error::{CliError, Result};
use crate::records;
use crate::utils::progress::CliProgressHandler;
use graphite::core::models::structure::Structure;
use graphite::engine::progress::ProgressReporter;
use graphite::engine::store::WeightStore;
use graphite::workflows::predict::{self, StructurePrediction};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

#[derive(Serialize, Debug)]
struct PredictionRecord {
    id: String,
    graph_scalar: f64,
    node_scalars: Vec<f64>,
    node_vectors: Vec<[f64; 3]>,
    num_edges: usize,
}

impl PredictionRecord {
    fn new(id: String, prediction: StructurePrediction) -> Self {
        Self {
            id,
            graph_scalar: prediction.graph_scalar,
            node_scalars: prediction.node_scalars,
            node_vectors: prediction
                .node_vectors
                .iter()
                .map(|v| [v.x, v.y, v.z])
                .collect(),
            num_edges: prediction.num_edges,
        }
    }
}

pub async fn run(args: PredictArgs) -> Result<()> {
    let config = PartialConfig::load(&args.config)?;
    let store = WeightStore::new();
    let model = load_model(&config, args.model.as_deref(), &store)?;

    info!("Loading input structures from {:?}", &args.input);
    let (ids, structures): (Vec<Option<String>>, Vec<Structure>) =
        records::read_structures(&args.input)?.into_iter().unzip();

    let noise_level = config.noise_level(args.noise_level);
    let batch_size = config.batch_size(args.batch_size);

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.callback());

    println!(
        "Evaluating '{}' on {} structure(s)...",
        model.weights().name(),
        structures.len()
    );
    let predictions = tokio::task::block_in_place(|| {
        predict::run(&model, &structures, noise_level, batch_size, &reporter)
    })?;

    let output: Vec<PredictionRecord> = ids
        .into_iter()
        .enumerate()
        .zip(predictions)
        .map(|((idx, id), prediction)| {
            PredictionRecord::new(id.unwrap_or_else(|| idx.to_string()), prediction)
        })
        .collect();
    write_predictions(&args.output, &output)?;

    println!(
        "✓ {} prediction(s) written to: {}",
        output.len(),
        args.output.display()
    );
    Ok(())
}

fn write_predictions(path: &Path, predictions: &[PredictionRecord]) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, predictions).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}
