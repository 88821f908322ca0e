use crate::cli::{ModelsArgs, ModelsCommands};
use crate::data::ModelDirectory;
use crate::error::Result;
use std::path::PathBuf;
use tracing::info;

pub async fn run(args: ModelsArgs) -> Result<()> {
    match args.command {
        ModelsCommands::Path => handle_path(),
        ModelsCommands::List => handle_list(),
        ModelsCommands::SetPath { path } => handle_set_path(path),
        ModelsCommands::ResetPath => handle_reset_path(),
    }
}

fn handle_path() -> Result<()> {
    let directory = ModelDirectory::new()?;
    println!("{}", directory.path().display());
    Ok(())
}

fn handle_list() -> Result<()> {
    let directory = ModelDirectory::new()?;
    let models = directory.list()?;
    if models.is_empty() {
        println!("No models installed in {}", directory.path().display());
        return Ok(());
    }
    for model in models {
        println!("{}@{}\t{}", model.name, model.tag, model.path.display());
    }
    Ok(())
}

fn handle_set_path(path: PathBuf) -> Result<()> {
    ModelDirectory::set_custom_path(&path)?;
    info!("Model directory set to {:?}", &path);
    println!("✓ Model directory set to: {}", path.display());
    Ok(())
}

fn handle_reset_path() -> Result<()> {
    ModelDirectory::reset_path()?;
    let directory = ModelDirectory::new()?;
    println!(
        "✓ Model directory reset to default: {}",
        directory.path().display()
    );
    Ok(())
}
