use graphite::core::nn::aggregation::{Aggregation, ReadoutAggregation};

/// Values used when neither the config file nor the command line sets them.
pub struct DefaultsConfig {
    pub cutoff_radius: f64,
    pub num_layers: usize,
    pub feature_width: usize,
    /// Covers every element up to Og.
    pub num_species: usize,
    pub num_radial_basis: usize,
    pub equivariant: bool,
    pub aggregation: Aggregation,
    pub readout_aggregation: ReadoutAggregation,
    pub sigma_max: f64,
    pub sigma_min: f64,
    pub num_sampling_steps: usize,
    pub batch_size: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            cutoff_radius: 5.0,
            num_layers: 3,
            feature_width: 64,
            num_species: 119,
            num_radial_basis: 16,
            equivariant: true,
            aggregation: Aggregation::Sum,
            readout_aggregation: ReadoutAggregation::Sum,
            sigma_max: 1.0,
            sigma_min: 0.01,
            num_sampling_steps: 50,
            batch_size: 32,
        }
    }
}
