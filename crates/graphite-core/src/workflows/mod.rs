//! # Workflows Module
//!
//! End-to-end procedures built on the engine: batched prediction over many
//! structures ([`predict`]) and noise-conditioned structure refinement
//! ([`denoise`]). Both report their phases through a
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter).

pub mod denoise;
pub mod predict;
