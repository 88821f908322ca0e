use super::schedule::NoiseSchedule;
use crate::core::neighbors::builder::DEFAULT_CELL_LIST_THRESHOLD;
use crate::core::neighbors::{EdgeMode, NeighborGraphBuilder, NeighborStrategy};
use crate::core::nn::aggregation::{Aggregation, ReadoutAggregation};
use crate::core::nn::weights::{Architecture, ModelWeights};
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for {parameter}: {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

fn invalid(parameter: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        parameter,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphConfig {
    pub cutoff_radius: f64,
    pub edge_mode: EdgeMode,
    pub strategy: NeighborStrategy,
    pub cell_list_threshold: usize,
}

impl GraphConfig {
    pub fn neighbor_builder(&self) -> Result<NeighborGraphBuilder, ConfigError> {
        NeighborGraphBuilder::new(self.cutoff_radius)
            .map(|builder| {
                builder
                    .edge_mode(self.edge_mode)
                    .strategy(self.strategy)
                    .cell_list_threshold(self.cell_list_threshold)
            })
            .map_err(|e| invalid("cutoff_radius", e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub graph: GraphConfig,
    pub architecture: Architecture,
    pub aggregation: Aggregation,
    pub readout_aggregation: ReadoutAggregation,
}

impl ModelConfig {
    pub fn cutoff_radius(&self) -> f64 {
        self.graph.cutoff_radius
    }

    /// Random, untrained weights matching this configuration.
    pub fn initialize_weights(&self, name: &str, rng: &mut impl Rng) -> ModelWeights {
        ModelWeights::initialize(name, &self.architecture, self.cutoff_radius(), rng)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub schedule: NoiseSchedule,
    pub num_sampling_steps: usize,
    pub seed: Option<u64>,
    pub step_scale: f64,
    pub wrap_positions: bool,
}

#[derive(Default)]
pub struct GraphConfigBuilder {
    cutoff_radius: Option<f64>,
    edge_mode: Option<EdgeMode>,
    strategy: Option<NeighborStrategy>,
    cell_list_threshold: Option<usize>,
}

impl GraphConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cutoff_radius(mut self, cutoff: f64) -> Self {
        self.cutoff_radius = Some(cutoff);
        self
    }
    pub fn edge_mode(mut self, mode: EdgeMode) -> Self {
        self.edge_mode = Some(mode);
        self
    }
    pub fn strategy(mut self, strategy: NeighborStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
    pub fn cell_list_threshold(mut self, threshold: usize) -> Self {
        self.cell_list_threshold = Some(threshold);
        self
    }

    pub fn build(self) -> Result<GraphConfig, ConfigError> {
        let cutoff_radius = self
            .cutoff_radius
            .ok_or(ConfigError::MissingParameter("cutoff_radius"))?;
        if !(cutoff_radius.is_finite() && cutoff_radius > 0.0) {
            return Err(invalid(
                "cutoff_radius",
                format!("must be positive and finite, got {cutoff_radius}"),
            ));
        }
        Ok(GraphConfig {
            cutoff_radius,
            edge_mode: self.edge_mode.unwrap_or_default(),
            strategy: self.strategy.unwrap_or_default(),
            cell_list_threshold: self
                .cell_list_threshold
                .unwrap_or(DEFAULT_CELL_LIST_THRESHOLD),
        })
    }
}

#[derive(Default)]
pub struct ModelConfigBuilder {
    graph: GraphConfigBuilder,
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

impl ModelConfigBuilder {
    pub const DEFAULT_NUM_RADIAL_BASIS: usize = 16;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn cutoff_radius(mut self, cutoff: f64) -> Self {
        self.graph = self.graph.cutoff_radius(cutoff);
        self
    }
    pub fn neighbor_strategy(mut self, strategy: NeighborStrategy) -> Self {
        self.graph = self.graph.strategy(strategy);
        self
    }
    pub fn cell_list_threshold(mut self, threshold: usize) -> Self {
        self.graph = self.graph.cell_list_threshold(threshold);
        self
    }
    pub fn edge_mode(mut self, mode: EdgeMode) -> Self {
        self.graph = self.graph.edge_mode(mode);
        self
    }
    pub fn num_layers(mut self, n: usize) -> Self {
        self.num_layers = Some(n);
        self
    }
    pub fn feature_width(mut self, width: usize) -> Self {
        self.feature_width = Some(width);
        self
    }
    pub fn num_species(mut self, n: usize) -> Self {
        self.num_species = Some(n);
        self
    }
    pub fn num_radial_basis(mut self, n: usize) -> Self {
        self.num_radial_basis = Some(n);
        self
    }
    pub fn equivariant(mut self, equivariant: bool) -> Self {
        self.equivariant = Some(equivariant);
        self
    }
    pub fn update_edges(mut self, update: bool) -> Self {
        self.update_edges = Some(update);
        self
    }
    pub fn node_attr_width(mut self, width: usize) -> Self {
        self.node_attr_width = Some(width);
        self
    }
    pub fn edge_attr_width(mut self, width: usize) -> Self {
        self.edge_attr_width = Some(width);
        self
    }
    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }
    pub fn readout_aggregation(mut self, aggregation: ReadoutAggregation) -> Self {
        self.readout_aggregation = Some(aggregation);
        self
    }

    /// Adopts the architecture and cutoff declared by a weight set.
    pub fn from_weights(weights: &ModelWeights) -> Self {
        let arch = weights.architecture();
        Self::new()
            .cutoff_radius(weights.cutoff_radius())
            .num_layers(arch.num_layers)
            .feature_width(arch.feature_width)
            .num_species(arch.num_species)
            .num_radial_basis(arch.num_radial_basis)
            .equivariant(arch.equivariant)
            .update_edges(arch.update_edges)
            .node_attr_width(arch.node_attr_width)
            .edge_attr_width(arch.edge_attr_width)
    }

    pub fn build(self) -> Result<ModelConfig, ConfigError> {
        let graph = self.graph.build()?;
        if graph.edge_mode != EdgeMode::Bidirectional {
            return Err(invalid(
                "edge_mode",
                "message passing requires both half-edges of every pair",
            ));
        }

        let num_layers = self
            .num_layers
            .ok_or(ConfigError::MissingParameter("num_layers"))?;
        let feature_width = self
            .feature_width
            .ok_or(ConfigError::MissingParameter("feature_width"))?;
        let num_species = self
            .num_species
            .ok_or(ConfigError::MissingParameter("num_species"))?;
        let num_radial_basis = self
            .num_radial_basis
            .unwrap_or(Self::DEFAULT_NUM_RADIAL_BASIS);

        for (parameter, value) in [
            ("num_layers", num_layers),
            ("feature_width", feature_width),
            ("num_species", num_species),
            ("num_radial_basis", num_radial_basis),
        ] {
            if value == 0 {
                return Err(invalid(parameter, "must be at least 1"));
            }
        }

        Ok(ModelConfig {
            graph,
            architecture: Architecture {
                feature_width,
                num_layers,
                num_species,
                num_radial_basis,
                equivariant: self
                    .equivariant
                    .ok_or(ConfigError::MissingParameter("equivariant"))?,
                update_edges: self.update_edges.unwrap_or(true),
                node_attr_width: self.node_attr_width.unwrap_or(0),
                edge_attr_width: self.edge_attr_width.unwrap_or(0),
            },
            aggregation: self.aggregation.unwrap_or_default(),
            readout_aggregation: self.readout_aggregation.unwrap_or_default(),
        })
    }
}

#[derive(Default)]
pub struct SamplerConfigBuilder {
    schedule: Option<NoiseSchedule>,
    num_sampling_steps: Option<usize>,
    seed: Option<u64>,
    step_scale: Option<f64>,
    wrap_positions: Option<bool>,
}

impl SamplerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(mut self, schedule: NoiseSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }
    pub fn num_sampling_steps(mut self, steps: usize) -> Self {
        self.num_sampling_steps = Some(steps);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn step_scale(mut self, scale: f64) -> Self {
        self.step_scale = Some(scale);
        self
    }
    pub fn wrap_positions(mut self, wrap: bool) -> Self {
        self.wrap_positions = Some(wrap);
        self
    }

    pub fn build(self) -> Result<SamplerConfig, ConfigError> {
        let schedule = self
            .schedule
            .ok_or(ConfigError::MissingParameter("schedule"))?;
        let num_sampling_steps = self.num_sampling_steps.unwrap_or(schedule.len());
        if num_sampling_steps == 0 {
            return Err(invalid("num_sampling_steps", "must be at least 1"));
        }
        if num_sampling_steps != schedule.len() {
            return Err(invalid(
                "num_sampling_steps",
                format!(
                    "{num_sampling_steps} steps requested but the schedule has {} levels",
                    schedule.len()
                ),
            ));
        }
        let step_scale = self.step_scale.unwrap_or(1.0);
        if !(step_scale.is_finite() && step_scale > 0.0) {
            return Err(invalid(
                "step_scale",
                format!("must be positive and finite, got {step_scale}"),
            ));
        }
        Ok(SamplerConfig {
            schedule,
            num_sampling_steps,
            seed: self.seed,
            step_scale,
            wrap_positions: self.wrap_positions.unwrap_or(false),
        })
    }
}
