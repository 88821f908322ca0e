use super::species::Species;
use super::structure::Structure;
use crate::core::geometry::images::{image_displacement, within_cutoff};
use crate::core::geometry::lattice::{Shift, ZERO_SHIFT};
use nalgebra::{DMatrix, Point3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("Edge {edge} references node {node}, but the graph has {num_nodes} nodes")]
    EndpointOutOfRange {
        edge: usize,
        node: usize,
        num_nodes: usize,
    },

    #[error("Edge {edge} connects atom {atom} to itself without a periodic shift")]
    ZeroShiftSelfEdge { edge: usize, atom: usize },

    #[error("Edge {edge} has length {length} beyond the cutoff {cutoff}")]
    EdgeBeyondCutoff { edge: usize, length: f64, cutoff: f64 },

    #[error("{context} has {found} rows, expected {expected}")]
    AttributeRows {
        context: &'static str,
        expected: usize,
        found: usize,
    },
}

/// A directed half-edge to a (possibly shifted) periodic image.
///
/// The derived ordering (source, then target, then shift) is the canonical
/// edge order of every [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub shift: Shift,
}

impl Edge {
    pub fn new(source: usize, target: usize, shift: Shift) -> Self {
        Self {
            source,
            target,
            shift,
        }
    }

    pub fn is_self_image(&self) -> bool {
        self.source == self.target
    }

    /// The opposite half-edge (`target -> source` with negated shift).
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target,
            target: self.source,
            shift: [-self.shift[0], -self.shift[1], -self.shift[2]],
        }
    }
}

/// Atoms (nodes) plus directed edges with cached displacement vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    species: Vec<Species>,
    positions: Vec<Point3<f64>>,
    edges: Vec<Edge>,
    edge_vectors: Vec<Vector3<f64>>,
    cutoff: f64,
    node_attrs: Option<DMatrix<f64>>,
    edge_attrs: Option<DMatrix<f64>>,
}

impl Graph {
    /// Graph from edges produced by a trusted neighbor search.
    pub(crate) fn from_search(structure: &Structure, edges: Vec<Edge>, cutoff: f64) -> Self {
        let edge_vectors = edges
            .iter()
            .map(|e| {
                image_displacement(
                    &structure.positions()[e.source],
                    &structure.positions()[e.target],
                    structure.lattice(),
                    &e.shift,
                )
            })
            .collect();
        Self {
            species: structure.species().to_vec(),
            positions: structure.positions().to_vec(),
            edges,
            edge_vectors,
            cutoff,
            node_attrs: None,
            edge_attrs: None,
        }
    }

    /// Graph from an externally supplied edge list.
    ///
    /// Every edge is checked against the graph invariants: endpoints are valid
    /// nodes, self-edges carry a non-zero shift, and the image distance does not
    /// exceed `cutoff`. Edges are stored in canonical order.
    pub fn from_edges(
        structure: &Structure,
        mut edges: Vec<Edge>,
        cutoff: f64,
    ) -> Result<Self, GraphError> {
        let num_nodes = structure.len();
        for (idx, edge) in edges.iter().enumerate() {
            for node in [edge.source, edge.target] {
                if node >= num_nodes {
                    return Err(GraphError::EndpointOutOfRange {
                        edge: idx,
                        node,
                        num_nodes,
                    });
                }
            }
            if edge.is_self_image() && edge.shift == ZERO_SHIFT {
                return Err(GraphError::ZeroShiftSelfEdge {
                    edge: idx,
                    atom: edge.source,
                });
            }
            let displacement = image_displacement(
                &structure.positions()[edge.source],
                &structure.positions()[edge.target],
                structure.lattice(),
                &edge.shift,
            );
            if !within_cutoff(&displacement, cutoff) {
                return Err(GraphError::EdgeBeyondCutoff {
                    edge: idx,
                    length: displacement.norm(),
                    cutoff,
                });
            }
        }
        edges.sort_unstable();
        Ok(Self::from_search(structure, edges, cutoff))
    }

    pub fn with_node_attrs(mut self, attrs: DMatrix<f64>) -> Result<Self, GraphError> {
        if attrs.nrows() != self.num_nodes() {
            return Err(GraphError::AttributeRows {
                context: "node attribute matrix",
                expected: self.num_nodes(),
                found: attrs.nrows(),
            });
        }
        self.node_attrs = Some(attrs);
        Ok(self)
    }

    pub fn with_edge_attrs(mut self, attrs: DMatrix<f64>) -> Result<Self, GraphError> {
        if attrs.nrows() != self.num_edges() {
            return Err(GraphError::AttributeRows {
                context: "edge attribute matrix",
                expected: self.num_edges(),
                found: attrs.nrows(),
            });
        }
        self.edge_attrs = Some(attrs);
        Ok(self)
    }

    pub fn num_nodes(&self) -> usize {
        self.species.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Displacement `target image - source` of every edge, in edge order.
    pub fn edge_vectors(&self) -> &[Vector3<f64>] {
        &self.edge_vectors
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn node_attrs(&self) -> Option<&DMatrix<f64>> {
        self.node_attrs.as_ref()
    }

    pub fn edge_attrs(&self) -> Option<&DMatrix<f64>> {
        self.edge_attrs.as_ref()
    }

    /// Number of incoming edges per node.
    pub fn in_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.num_nodes()];
        for edge in &self.edges {
            degrees[edge.target] += 1;
        }
        degrees
    }

    /// Mean number of incoming edges per node (zero for an empty graph).
    pub fn mean_degree(&self) -> f64 {
        if self.num_nodes() == 0 {
            0.0
        } else {
            self.num_edges() as f64 / self.num_nodes() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dimer() -> Structure {
        Structure::new(
            vec![Species(1), Species(1)],
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
        )
        .unwrap()
    }

    #[test]
    fn edges_sort_by_source_target_then_shift() {
        let mut edges = vec![
            Edge::new(1, 0, [0, 0, 0]),
            Edge::new(0, 1, [1, 0, 0]),
            Edge::new(0, 1, [0, 0, 0]),
            Edge::new(0, 0, [0, 0, 1]),
        ];
        edges.sort();
        assert_eq!(
            edges,
            vec![
                Edge::new(0, 0, [0, 0, 1]),
                Edge::new(0, 1, [0, 0, 0]),
                Edge::new(0, 1, [1, 0, 0]),
                Edge::new(1, 0, [0, 0, 0]),
            ]
        );
    }

    #[test]
    fn reversed_edge_negates_shift() {
        let edge = Edge::new(2, 5, [1, -1, 0]);
        assert_eq!(edge.reversed(), Edge::new(5, 2, [-1, 1, 0]));
    }

    #[test]
    fn from_edges_computes_displacements() {
        let graph = Graph::from_edges(
            &dimer(),
            vec![Edge::new(1, 0, ZERO_SHIFT), Edge::new(0, 1, ZERO_SHIFT)],
            1.5,
        )
        .unwrap();
        assert_eq!(graph.edges()[0], Edge::new(0, 1, ZERO_SHIFT));
        assert_eq!(graph.edge_vectors()[0], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(graph.in_degrees(), vec![1, 1]);
    }

    #[test]
    fn from_edges_rejects_invalid_endpoint() {
        let result = Graph::from_edges(&dimer(), vec![Edge::new(0, 2, ZERO_SHIFT)], 1.5);
        assert_eq!(
            result,
            Err(GraphError::EndpointOutOfRange {
                edge: 0,
                node: 2,
                num_nodes: 2
            })
        );
    }

    #[test]
    fn from_edges_rejects_zero_shift_self_edge() {
        let result = Graph::from_edges(&dimer(), vec![Edge::new(1, 1, ZERO_SHIFT)], 1.5);
        assert!(matches!(
            result,
            Err(GraphError::ZeroShiftSelfEdge { edge: 0, atom: 1 })
        ));
    }

    #[test]
    fn from_edges_rejects_edge_beyond_cutoff() {
        let result = Graph::from_edges(&dimer(), vec![Edge::new(0, 1, ZERO_SHIFT)], 0.9);
        assert!(matches!(result, Err(GraphError::EdgeBeyondCutoff { .. })));
    }

    #[test]
    fn attribute_rows_must_match_counts() {
        let graph = Graph::from_edges(&dimer(), vec![], 1.5).unwrap();
        let result = graph.clone().with_node_attrs(DMatrix::zeros(3, 4));
        assert!(matches!(result, Err(GraphError::AttributeRows { .. })));
        assert!(graph.with_node_attrs(DMatrix::zeros(2, 4)).is_ok());
    }
}
