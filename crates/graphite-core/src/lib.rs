//! # Graphite Core Library
//!
//! Graph neural networks over atomistic structures: periodic neighbor graphs,
//! invariant and rotation-equivariant message passing, batched readout, and a
//! noise-conditioned denoising sampler.
//!
//! ## Layers
//!
//! - **[`core`]: The Foundation.** Structures, lattices and periodic images,
//!   neighbor search, graphs and batches, and the pure numeric building blocks
//!   of the network (layers, radial basis, aggregation, readout).
//!
//! - **[`engine`]: The Logic Core.** Validated configuration, models bound to
//!   shared weights, the denoising sampler, progress reporting and the weight
//!   store.
//!
//! - **[`workflows`]: The Public API.** Batched prediction and end-to-end
//!   denoising with progress phases.

pub mod core;
pub mod engine;
pub mod workflows;
