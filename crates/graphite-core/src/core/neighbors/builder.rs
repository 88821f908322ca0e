use super::cell_list::CellList;
use super::{Candidates, EdgeMode, NeighborError, NeighborStrategy, brute};
use crate::core::geometry::lattice::Shift;
use crate::core::models::graph::{Edge, Graph};
use crate::core::models::structure::Structure;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const DEFAULT_CELL_LIST_THRESHOLD: usize = 64;

/// Builds radius graphs over periodic or non-periodic structures.
///
/// Every ordered atom pair, including an atom with itself, contributes one
/// edge per periodic image within the cutoff (closed interval). Zero-shift
/// self pairs never appear. Edges are sorted by `(source, target, shift)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborGraphBuilder {
    cutoff: f64,
    edge_mode: EdgeMode,
    strategy: NeighborStrategy,
    cell_list_threshold: usize,
}

impl NeighborGraphBuilder {
    pub fn new(cutoff: f64) -> Result<Self, NeighborError> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(NeighborError::InvalidCutoff(cutoff));
        }
        Ok(Self {
            cutoff,
            edge_mode: EdgeMode::default(),
            strategy: NeighborStrategy::default(),
            cell_list_threshold: DEFAULT_CELL_LIST_THRESHOLD,
        })
    }

    pub fn edge_mode(mut self, mode: EdgeMode) -> Self {
        self.edge_mode = mode;
        self
    }

    pub fn strategy(mut self, strategy: NeighborStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn cell_list_threshold(mut self, threshold: usize) -> Self {
        self.cell_list_threshold = threshold;
        self
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// The strategy actually used for a structure with `num_atoms` atoms.
    pub fn resolved_strategy(&self, num_atoms: usize) -> NeighborStrategy {
        match self.strategy {
            NeighborStrategy::Auto if num_atoms > self.cell_list_threshold => {
                NeighborStrategy::CellList
            }
            NeighborStrategy::Auto => NeighborStrategy::BruteForce,
            explicit => explicit,
        }
    }

    #[instrument(
        skip_all,
        name = "neighbor_search",
        fields(atoms = structure.len(), cutoff = self.cutoff)
    )]
    pub fn build(&self, structure: &Structure) -> Graph {
        let strategy = self.resolved_strategy(structure.len());
        let per_source: Vec<Candidates> = match strategy {
            NeighborStrategy::CellList => {
                let cells = CellList::new(structure, self.cutoff);
                debug!(
                    images = cells.num_images(),
                    bins = cells.num_bins(),
                    "Binned periodic images."
                );
                search_sources(structure.len(), |i| cells.neighbors_of(i))
            }
            _ => search_sources(structure.len(), |i| {
                brute::neighbors_of(structure, i, self.cutoff)
            }),
        };

        let mut edges: Vec<Edge> = per_source
            .into_iter()
            .enumerate()
            .flat_map(|(source, found)| {
                found
                    .into_iter()
                    .map(move |(target, shift)| Edge::new(source, target, shift))
            })
            .filter(|edge| self.keeps(edge))
            .collect();
        edges.sort_unstable();

        debug!(
            edges = edges.len(),
            strategy = ?strategy,
            "Neighbor graph built."
        );
        Graph::from_search(structure, edges, self.cutoff)
    }

    fn keeps(&self, edge: &Edge) -> bool {
        match self.edge_mode {
            EdgeMode::Bidirectional => true,
            EdgeMode::DirectedOnly => {
                edge.source < edge.target
                    || (edge.source == edge.target && is_positive(&edge.shift))
            }
        }
    }
}

fn is_positive(shift: &Shift) -> bool {
    *shift > [0, 0, 0]
}

fn search_sources<F>(num_atoms: usize, search: F) -> Vec<Candidates>
where
    F: Fn(usize) -> Candidates + Sync + Send,
{
    #[cfg(not(feature = "parallel"))]
    let iterator = 0..num_atoms;

    #[cfg(feature = "parallel")]
    let iterator = (0..num_atoms).into_par_iter();

    iterator.map(search).collect()
}
