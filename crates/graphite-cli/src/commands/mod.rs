pub mod denoise;
pub mod graph;
pub mod init_weights;
pub mod models;
pub mod predict;

use crate::config::PartialConfig;
use crate::data::{self, ModelDirectory};
use crate::error::Result;
use graphite::engine::model::Model;
use graphite::engine::store::WeightStore;
use std::sync::Arc;
use tracing::info;

/// Resolves, loads and validates the weights named on the command line or
/// in the config file.
pub(crate) fn load_model(
    config: &PartialConfig,
    cli_reference: Option<&str>,
    store: &WeightStore,
) -> Result<Model> {
    let reference = config.weights_reference(cli_reference)?;
    let directory = ModelDirectory::new()?;
    let path = directory.resolve_reference(reference)?;
    info!("Loading model weights '{}' from {:?}", reference, &path);

    let weights = store.get_or_load(reference, || data::read_weights(&path))?;
    let model_config = config.model_config(Some(&weights))?;
    Ok(Model::new(model_config, Arc::clone(&weights))?)
}
