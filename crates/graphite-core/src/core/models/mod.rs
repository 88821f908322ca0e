//! # Core Models Module
//!
//! Data model shared by every stage of the pipeline.
//!
//! - [`species`] - Species identifiers and the chemical element table
//! - [`structure`] - Atomic structures with an optional periodic cell
//! - [`graph`] - Directed periodic edges and the graph built over a structure
//! - [`batch`] - Disjoint unions of graphs with prefix-sum offset tables
//!
//! Structures are owned by the caller. Graphs are built from borrowed
//! structures and own copies of the node data, so a graph stays valid after the
//! structure it came from is dropped or moved.

pub mod batch;
pub mod graph;
pub mod species;
pub mod structure;
