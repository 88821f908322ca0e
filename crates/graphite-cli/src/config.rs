mod defaults;

pub use defaults::DefaultsConfig;

use crate::cli::ConfigArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use graphite::core::neighbors::{EdgeMode, NeighborStrategy};
use graphite::core::nn::aggregation::{Aggregation, ReadoutAggregation};
use graphite::core::nn::weights::ModelWeights;
use graphite::engine::config::{
    GraphConfig, GraphConfigBuilder, ModelConfig, ModelConfigBuilder, SamplerConfig,
    SamplerConfigBuilder,
};
use graphite::engine::schedule::NoiseSchedule;
use serde::Deserialize;
use serde::de::IntoDeserializer;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialGraphConfig {
    cutoff_radius: Option<f64>,
    edge_mode: Option<EdgeMode>,
    strategy: Option<NeighborStrategy>,
    cell_list_threshold: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialModelConfig {
    weights: Option<String>,
    num_layers: Option<usize>,
    feature_width: Option<usize>,
    num_species: Option<usize>,
    num_radial_basis: Option<usize>,
    equivariant: Option<bool>,
    update_edges: Option<bool>,
    node_attr_width: Option<usize>,
    edge_attr_width: Option<usize>,
    aggregation: Option<Aggregation>,
    readout_aggregation: Option<ReadoutAggregation>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
enum ScheduleKind {
    #[default]
    Geometric,
    Linear,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSamplerConfig {
    /// Explicit levels; takes precedence over the interpolated schedule.
    noise_schedule: Option<Vec<f64>>,
    schedule: Option<ScheduleKind>,
    sigma_max: Option<f64>,
    sigma_min: Option<f64>,
    num_sampling_steps: Option<usize>,
    seed: Option<u64>,
    step_scale: Option<f64>,
    wrap_positions: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPredictConfig {
    batch_size: Option<usize>,
    noise_level: Option<f64>,
}

/// Configuration file contents, every field optional.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    graph: Option<PartialGraphConfig>,
    model: Option<PartialModelConfig>,
    sampler: Option<PartialSamplerConfig>,
    predict: Option<PartialPredictConfig>,
}

impl PartialConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Config file (if any) with `--set` values and `--cutoff` applied on top.
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_set_values(&args.set_values)?;
        if let Some(cutoff) = args.cutoff {
            config.graph.get_or_insert_with(Default::default).cutoff_radius = Some(cutoff);
        }
        Ok(config)
    }

    /// Weights reference from the command line, else from `[model] weights`.
    pub fn weights_reference<'a>(&'a self, cli: Option<&'a str>) -> Result<&'a str> {
        cli.or_else(|| self.model.as_ref().and_then(|m| m.weights.as_deref()))
            .ok_or_else(|| {
                CliError::Config(
                    "A model is required either via --model or `model.weights` in the config file."
                        .to_string(),
                )
            })
    }

    pub fn graph_config(&self) -> Result<GraphConfig> {
        let defaults = DefaultsConfig::default();
        let graph = self.graph.clone().unwrap_or_default();
        let mut builder = GraphConfigBuilder::new()
            .cutoff_radius(graph.cutoff_radius.unwrap_or(defaults.cutoff_radius));
        if let Some(mode) = graph.edge_mode {
            builder = builder.edge_mode(mode);
        }
        if let Some(strategy) = graph.strategy {
            builder = builder.strategy(strategy);
        }
        if let Some(threshold) = graph.cell_list_threshold {
            builder = builder.cell_list_threshold(threshold);
        }
        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    /// Model configuration, starting from the header of `weights` when given
    /// and from the CLI defaults otherwise. Explicit settings always win, so a
    /// conflicting setting surfaces as an incompatible model.
    pub fn model_config(&self, weights: Option<&ModelWeights>) -> Result<ModelConfig> {
        let defaults = DefaultsConfig::default();
        let graph = self.graph.clone().unwrap_or_default();
        let model = self.model.clone().unwrap_or_default();

        let mut builder = match weights {
            Some(weights) => ModelConfigBuilder::from_weights(weights),
            None => ModelConfigBuilder::new()
                .cutoff_radius(defaults.cutoff_radius)
                .num_layers(defaults.num_layers)
                .feature_width(defaults.feature_width)
                .num_species(defaults.num_species)
                .num_radial_basis(defaults.num_radial_basis)
                .equivariant(defaults.equivariant),
        }
        .aggregation(model.aggregation.unwrap_or(defaults.aggregation))
        .readout_aggregation(
            model
                .readout_aggregation
                .unwrap_or(defaults.readout_aggregation),
        );

        if let Some(cutoff) = graph.cutoff_radius {
            builder = builder.cutoff_radius(cutoff);
        }
        if let Some(mode) = graph.edge_mode {
            builder = builder.edge_mode(mode);
        }
        if let Some(strategy) = graph.strategy {
            builder = builder.neighbor_strategy(strategy);
        }
        if let Some(threshold) = graph.cell_list_threshold {
            builder = builder.cell_list_threshold(threshold);
        }
        if let Some(n) = model.num_layers {
            builder = builder.num_layers(n);
        }
        if let Some(width) = model.feature_width {
            builder = builder.feature_width(width);
        }
        if let Some(n) = model.num_species {
            builder = builder.num_species(n);
        }
        if let Some(n) = model.num_radial_basis {
            builder = builder.num_radial_basis(n);
        }
        if let Some(equivariant) = model.equivariant {
            builder = builder.equivariant(equivariant);
        }
        if let Some(update) = model.update_edges {
            builder = builder.update_edges(update);
        }
        if let Some(width) = model.node_attr_width {
            builder = builder.node_attr_width(width);
        }
        if let Some(width) = model.edge_attr_width {
            builder = builder.edge_attr_width(width);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    pub fn sampler_config(&self, steps: Option<usize>, seed: Option<u64>) -> Result<SamplerConfig> {
        let defaults = DefaultsConfig::default();
        let sampler = self.sampler.clone().unwrap_or_default();
        let to_config_error =
            |e: graphite::engine::config::ConfigError| CliError::Config(e.to_string());

        let schedule = match sampler.noise_schedule {
            Some(levels) => {
                if steps.is_some() {
                    return Err(CliError::Argument(
                        "--steps cannot be combined with an explicit `sampler.noise-schedule`."
                            .to_string(),
                    ));
                }
                NoiseSchedule::new(levels)
            }
            None => {
                let sigma_max = sampler.sigma_max.unwrap_or(defaults.sigma_max);
                let sigma_min = sampler.sigma_min.unwrap_or(defaults.sigma_min);
                let steps = steps
                    .or(sampler.num_sampling_steps)
                    .unwrap_or(defaults.num_sampling_steps);
                match sampler.schedule.unwrap_or_default() {
                    ScheduleKind::Geometric => {
                        NoiseSchedule::geometric(sigma_max, sigma_min, steps)
                    }
                    ScheduleKind::Linear => NoiseSchedule::linear(sigma_max, sigma_min, steps),
                }
            }
        }
        .map_err(to_config_error)?;

        let mut builder = SamplerConfigBuilder::new().schedule(schedule);
        if let Some(seed) = seed.or(sampler.seed) {
            builder = builder.seed(seed);
        }
        if let Some(scale) = sampler.step_scale {
            builder = builder.step_scale(scale);
        }
        if let Some(wrap) = sampler.wrap_positions {
            builder = builder.wrap_positions(wrap);
        }
        builder.build().map_err(to_config_error)
    }

    pub fn batch_size(&self, cli: Option<usize>) -> usize {
        cli.or_else(|| self.predict.as_ref().and_then(|p| p.batch_size))
            .unwrap_or(DefaultsConfig::default().batch_size)
    }

    pub fn noise_level(&self, cli: Option<f64>) -> Option<f64> {
        cli.or_else(|| self.predict.as_ref().and_then(|p| p.noise_level))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for assignment in set_values {
            let (key, value) = parser::parse_assignment(assignment)
                .map_err(|e| CliError::Config(e.to_string()))?;
            match key {
                "graph.cutoff-radius" => {
                    self.graph_section().cutoff_radius = Some(scalar(key, value)?);
                }
                "graph.edge-mode" => {
                    self.graph_section().edge_mode = Some(variant(key, value)?);
                }
                "graph.strategy" => {
                    self.graph_section().strategy = Some(variant(key, value)?);
                }
                "graph.cell-list-threshold" => {
                    self.graph_section().cell_list_threshold =
                        Some(scalar(key, value)?);
                }
                "model.weights" => {
                    self.model_section().weights = Some(value.to_string());
                }
                "model.num-layers" => self.model_section().num_layers = Some(scalar(key, value)?),
                "model.feature-width" => {
                    self.model_section().feature_width = Some(scalar(key, value)?);
                }
                "model.num-species" => self.model_section().num_species = Some(scalar(key, value)?),
                "model.num-radial-basis" => {
                    self.model_section().num_radial_basis = Some(scalar(key, value)?);
                }
                "model.equivariant" => self.model_section().equivariant = Some(scalar(key, value)?),
                "model.update-edges" => {
                    self.model_section().update_edges = Some(scalar(key, value)?);
                }
                "model.aggregation" => {
                    self.model_section().aggregation = Some(variant(key, value)?);
                }
                "model.readout-aggregation" => {
                    self.model_section().readout_aggregation = Some(variant(key, value)?);
                }
                "sampler.sigma-max" => self.sampler_section().sigma_max = Some(scalar(key, value)?),
                "sampler.sigma-min" => self.sampler_section().sigma_min = Some(scalar(key, value)?),
                "sampler.num-sampling-steps" => {
                    self.sampler_section().num_sampling_steps = Some(scalar(key, value)?);
                }
                "sampler.schedule" => self.sampler_section().schedule = Some(variant(key, value)?),
                "sampler.seed" => self.sampler_section().seed = Some(scalar(key, value)?),
                "sampler.step-scale" => {
                    self.sampler_section().step_scale = Some(scalar(key, value)?);
                }
                "sampler.wrap-positions" => {
                    self.sampler_section().wrap_positions = Some(scalar(key, value)?);
                }
                "predict.batch-size" => {
                    self.predict.get_or_insert_with(Default::default).batch_size =
                        Some(scalar(key, value)?);
                }
                "predict.noise-level" => {
                    self.predict.get_or_insert_with(Default::default).noise_level =
                        Some(scalar(key, value)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    fn graph_section(&mut self) -> &mut PartialGraphConfig {
        self.graph.get_or_insert_with(Default::default)
    }

    fn model_section(&mut self) -> &mut PartialModelConfig {
        self.model.get_or_insert_with(Default::default)
    }

    fn sampler_section(&mut self) -> &mut PartialSamplerConfig {
        self.sampler.get_or_insert_with(Default::default)
    }
}

fn scalar<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CliError::Config(format!(
            "Invalid {} value for {}: {}",
            std::any::type_name::<T>(),
            key,
            value
        ))
    })
}

fn variant<'de, T: Deserialize<'de>>(key: &str, value: &'de str) -> Result<T> {
    T::deserialize(value.into_deserializer()).map_err(|e: serde::de::value::Error| {
        CliError::Config(format!("Invalid value for {}: {} ({})", key, value, e))
    })
}
