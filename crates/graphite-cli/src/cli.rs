use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Graphite Developers",
    version,
    about = "Graphite CLI - neighbor graphs, message-passing predictions and denoising for atomistic structures.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build neighbor graphs and report their statistics.
    Graph(GraphArgs),
    /// Evaluate a model on one or more structures.
    Predict(PredictArgs),
    /// Refine structures with a noise-conditioned model.
    Denoise(DenoiseArgs),
    /// Write a randomly initialized (untrained) weight set.
    InitWeights(InitWeightsArgs),
    /// Manage the local model directory.
    Models(ModelsArgs),
}

/// Options shared by every command that reads a configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the neighbor cutoff radius.
    #[arg(short = 'r', long, value_name = "FLOAT")]
    pub cutoff: Option<f64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S sampler.step-scale=0.5
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `graph` subcommand.
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Input structures (JSON record, JSON array of records, or JSON lines).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Write every edge as a CSV row to this file.
    #[arg(long, value_name = "PATH")]
    pub edges: Option<PathBuf>,

    /// Also report the mean Steinhardt order parameters q_l and w_l of this degree.
    #[arg(long, value_name = "L")]
    pub order: Option<u32>,
}

/// Arguments for the `predict` subcommand.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Input structures (JSON record, JSON array of records, or JSON lines).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Output file for the predictions (JSON).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Model weights. Can be a path or a logical name (e.g., 'demo@v1').
    #[arg(short, long, value_name = "NAME_OR_PATH")]
    pub model: Option<String>,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Condition the model on this noise level.
    #[arg(long, value_name = "FLOAT")]
    pub noise_level: Option<f64>,

    /// Number of structures evaluated per forward pass.
    #[arg(short, long, value_name = "INT")]
    pub batch_size: Option<usize>,
}

/// Arguments for the `denoise` subcommand.
#[derive(Args, Debug)]
pub struct DenoiseArgs {
    /// Input structures (JSON record, JSON array of records, or JSON lines).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Output file for the refined structures (same format as the input).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Model weights. Can be a path or a logical name (e.g., 'demo@v1').
    #[arg(short, long, value_name = "NAME_OR_PATH")]
    pub model: Option<String>,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Override the number of sampling steps of the geometric schedule.
    #[arg(short = 'n', long, value_name = "INT")]
    pub steps: Option<usize>,

    /// Override the random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Noise the input at the first schedule level before sampling.
    #[arg(long)]
    pub perturb: bool,

    /// Also write the per-step trajectory summary as CSV.
    #[arg(long, value_name = "PATH")]
    pub trajectory: Option<PathBuf>,
}

/// Arguments for the `init-weights` subcommand.
#[derive(Args, Debug)]
pub struct InitWeightsArgs {
    /// Name recorded in the weights header.
    #[arg(long, required = true)]
    pub name: String,

    /// Output path. Defaults to installing into the model directory.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Version tag used when installing into the model directory.
    #[arg(long, default_value = "v1")]
    pub tag: String,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Seed for the weight initialization.
    #[arg(long, value_name = "INT", default_value_t = 0)]
    pub seed: u64,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `models` subcommand.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommands,
}

/// Available commands for model directory management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommands {
    /// Show the absolute path to the local model directory.
    Path,
    /// List the installed weight sets.
    List,
    /// Set a custom absolute path for the local model directory.
    SetPath {
        /// The new path to use for storing weights.
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Reset the model path to its default, OS-specific location.
    ResetPath,
}
