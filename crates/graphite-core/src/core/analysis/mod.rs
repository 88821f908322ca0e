//! # Analysis Module
//!
//! Classical structural descriptors computed from neighbor graphs, useful as
//! node attributes or for checking generated structures.
//!
//! - [`order`] - Steinhardt bond-orientational order parameters

pub mod order;
