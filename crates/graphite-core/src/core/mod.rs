//! # Core Module
//!
//! Stateless building blocks: atomic structures, periodic geometry, neighbor
//! graphs, batching, and the message-passing network itself.
//!
//! ## Architecture
//!
//! - **Data Model** ([`models`]) - Species, structures, graphs and batches
//! - **Geometry** ([`geometry`]) - Lattices, periodic images and rigid motions
//! - **Neighbor Search** ([`neighbors`]) - Radius graphs by brute force or cell lists
//! - **Networks** ([`nn`]) - Encoders, message-passing layers, readout heads and weights
//! - **Analysis** ([`analysis`]) - Classical structural descriptors
//!
//! Nothing in this module holds process-wide state; every function works on the
//! values it is given and returns new values.

pub mod analysis;
pub mod geometry;
pub mod models;
pub mod neighbors;
pub mod nn;
