use crate::cli::InitWeightsArgs;
use crate::config::PartialConfig;
use crate::data::{self, ModelDirectory};
use crate::error::{CliError, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

pub async fn run(args: InitWeightsArgs) -> Result<()> {
    let config = PartialConfig::load(&args.config)?;
    let model_config = config.model_config(None)?;
    let arch = &model_config.architecture;
    info!(
        layers = arch.num_layers,
        width = arch.feature_width,
        equivariant = arch.equivariant,
        seed = args.seed,
        "Initializing untrained weights."
    );

    let weights =
        model_config.initialize_weights(&args.name, &mut StdRng::seed_from_u64(args.seed));

    let path = match args.output {
        Some(path) => {
            if path.exists() && !args.force {
                return Err(CliError::Argument(format!(
                    "Output file already exists: {}. Use --force to overwrite.",
                    path.display()
                )));
            }
            data::write_weights(&path, &weights)?;
            path
        }
        None => ModelDirectory::new()?.install(&weights, &args.tag, args.force)?,
    };

    println!(
        "✓ Wrote untrained '{}' weights ({} layers, width {}, {}) to: {}",
        args.name,
        arch.num_layers,
        arch.feature_width,
        if arch.equivariant { "equivariant" } else { "invariant" },
        path.display()
    );
    Ok(())
}
