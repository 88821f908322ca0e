#![allow(dead_code)]

use graphite::core::models::species::Species;
use graphite::core::models::structure::Structure;
use graphite::core::nn::aggregation::Aggregation;
use graphite::engine::config::ModelConfigBuilder;
use graphite::engine::model::Model;
use nalgebra::{Matrix3, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

pub const TOLERANCE: f64 = 1e-8;

pub fn model(equivariant: bool, aggregation: Aggregation) -> Model {
    let config = ModelConfigBuilder::new()
        .cutoff_radius(3.0)
        .num_layers(3)
        .feature_width(8)
        .num_species(20)
        .num_radial_basis(8)
        .equivariant(equivariant)
        .aggregation(aggregation)
        .build()
        .expect("valid model configuration");
    let weights = config.initialize_weights("integration", &mut StdRng::seed_from_u64(1234));
    Model::new(config, Arc::new(weights)).expect("weights match configuration")
}

pub fn random_cluster(seed: u64, n: usize, extent: f64) -> Structure {
    let mut rng = StdRng::seed_from_u64(seed);
    let species = (0..n).map(|_| Species(rng.gen_range(1..=8))).collect();
    let positions = (0..n)
        .map(|_| {
            Point3::new(
                rng.gen_range(0.0..extent),
                rng.gen_range(0.0..extent),
                rng.gen_range(0.0..extent),
            )
        })
        .collect();
    Structure::new(species, positions).expect("finite positions")
}

pub fn random_crystal(seed: u64, n: usize, side: f64) -> Structure {
    let cluster = random_cluster(seed, n, side);
    Structure::periodic(
        cluster.species().to_vec(),
        cluster.positions().to_vec(),
        Matrix3::from_diagonal_element(side),
        [true; 3],
    )
    .expect("valid cubic cell")
}
