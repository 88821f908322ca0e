pub mod config;
pub mod error;
pub mod model;
pub mod progress;
pub mod sampler;
pub mod schedule;
pub mod store;
