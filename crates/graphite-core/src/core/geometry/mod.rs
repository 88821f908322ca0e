//! # Geometry Module
//!
//! Pairwise distance and periodic-image computation for atomic structures.
//!
//! - [`lattice`] - Periodic cells, fractional coordinates and inter-planar spacings
//! - [`images`] - The periodic image search used by every neighbor strategy
//! - [`transform`] - Rotations and displacement measures between conformations
//!
//! The image search derives its range of cell replicas from the cutoff and the
//! cell's inter-planar spacings rather than a fixed number of neighbors, so
//! small or strongly skewed cells are searched exhaustively.

pub mod images;
pub mod lattice;
pub mod transform;

pub use images::{image_displacement, periodic_images, within_cutoff};
pub use lattice::{CellError, Lattice, Shift, ZERO_SHIFT};
