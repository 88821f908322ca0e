use super::graph::Graph;
use super::species::Species;
use crate::core::geometry::lattice::Shift;
use nalgebra::{DMatrix, Point3, Vector3};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BatchError {
    #[error("Cannot assemble a batch from zero graphs")]
    Empty,

    #[error("Graph {graph}: {context} has width {found}, expected {expected}")]
    ShapeMismatch {
        graph: usize,
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Graph {graph}: {context} is missing while other graphs in the batch carry it")]
    MissingAttributes { graph: usize, context: &'static str },
}

/// Disjoint union of several graphs, processed as one computation.
///
/// Node and edge arrays of the member graphs are concatenated in input order.
/// Edge endpoints are stored as global node indices; `node_offsets` and
/// `edge_offsets` are prefix sums of length `num_graphs + 1`, so graph `g`
/// owns the nodes `node_offsets[g]..node_offsets[g + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    species: Vec<Species>,
    positions: Vec<Point3<f64>>,
    sources: Vec<usize>,
    targets: Vec<usize>,
    shifts: Vec<Shift>,
    edge_vectors: Vec<Vector3<f64>>,
    node_graph: Vec<usize>,
    node_offsets: Vec<usize>,
    edge_offsets: Vec<usize>,
    node_attrs: Option<DMatrix<f64>>,
    edge_attrs: Option<DMatrix<f64>>,
}

impl Batch {
    pub fn assemble(graphs: &[Graph]) -> Result<Self, BatchError> {
        if graphs.is_empty() {
            return Err(BatchError::Empty);
        }

        let total_nodes: usize = graphs.iter().map(Graph::num_nodes).sum();
        let total_edges: usize = graphs.iter().map(Graph::num_edges).sum();

        let mut batch = Self {
            species: Vec::with_capacity(total_nodes),
            positions: Vec::with_capacity(total_nodes),
            sources: Vec::with_capacity(total_edges),
            targets: Vec::with_capacity(total_edges),
            shifts: Vec::with_capacity(total_edges),
            edge_vectors: Vec::with_capacity(total_edges),
            node_graph: Vec::with_capacity(total_nodes),
            node_offsets: Vec::with_capacity(graphs.len() + 1),
            edge_offsets: Vec::with_capacity(graphs.len() + 1),
            node_attrs: None,
            edge_attrs: None,
        };
        batch.node_offsets.push(0);
        batch.edge_offsets.push(0);

        for (g, graph) in graphs.iter().enumerate() {
            let offset = batch.species.len();
            batch.species.extend_from_slice(graph.species());
            batch.positions.extend_from_slice(graph.positions());
            batch
                .node_graph
                .extend(std::iter::repeat_n(g, graph.num_nodes()));
            for edge in graph.edges() {
                batch.sources.push(edge.source + offset);
                batch.targets.push(edge.target + offset);
                batch.shifts.push(edge.shift);
            }
            batch.edge_vectors.extend_from_slice(graph.edge_vectors());
            batch.node_offsets.push(batch.species.len());
            batch.edge_offsets.push(batch.sources.len());
        }

        batch.node_attrs = concat_attributes(
            graphs,
            total_nodes,
            Graph::node_attrs,
            "node attribute matrix",
        )?;
        batch.edge_attrs = concat_attributes(
            graphs,
            total_edges,
            Graph::edge_attrs,
            "edge attribute matrix",
        )?;
        Ok(batch)
    }

    pub fn from_graph(graph: &Graph) -> Self {
        let edges = graph.edges();
        Self {
            species: graph.species().to_vec(),
            positions: graph.positions().to_vec(),
            sources: edges.iter().map(|e| e.source).collect(),
            targets: edges.iter().map(|e| e.target).collect(),
            shifts: edges.iter().map(|e| e.shift).collect(),
            edge_vectors: graph.edge_vectors().to_vec(),
            node_graph: vec![0; graph.num_nodes()],
            node_offsets: vec![0, graph.num_nodes()],
            edge_offsets: vec![0, graph.num_edges()],
            node_attrs: graph.node_attrs().cloned(),
            edge_attrs: graph.edge_attrs().cloned(),
        }
    }

    pub fn num_graphs(&self) -> usize {
        self.node_offsets.len() - 1
    }

    pub fn num_nodes(&self) -> usize {
        self.species.len()
    }

    pub fn num_edges(&self) -> usize {
        self.sources.len()
    }

    #[inline]
    pub fn node_range(&self, graph: usize) -> Range<usize> {
        self.node_offsets[graph]..self.node_offsets[graph + 1]
    }

    #[inline]
    pub fn edge_range(&self, graph: usize) -> Range<usize> {
        self.edge_offsets[graph]..self.edge_offsets[graph + 1]
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    pub fn shifts(&self) -> &[Shift] {
        &self.shifts
    }

    pub fn edge_vectors(&self) -> &[Vector3<f64>] {
        &self.edge_vectors
    }

    pub fn node_graph(&self) -> &[usize] {
        &self.node_graph
    }

    pub fn node_offsets(&self) -> &[usize] {
        &self.node_offsets
    }

    pub fn edge_offsets(&self) -> &[usize] {
        &self.edge_offsets
    }

    pub fn node_attrs(&self) -> Option<&DMatrix<f64>> {
        self.node_attrs.as_ref()
    }

    pub fn edge_attrs(&self) -> Option<&DMatrix<f64>> {
        self.edge_attrs.as_ref()
    }

    /// Splits a per-node sequence back into one vector per graph.
    pub fn split_nodes<T: Clone>(&self, values: &[T]) -> Vec<Vec<T>> {
        (0..self.num_graphs())
            .map(|g| values[self.node_range(g)].to_vec())
            .collect()
    }
}

fn concat_attributes(
    graphs: &[Graph],
    total_rows: usize,
    accessor: fn(&Graph) -> Option<&DMatrix<f64>>,
    context: &'static str,
) -> Result<Option<DMatrix<f64>>, BatchError> {
    let Some(width) = accessor(&graphs[0]).map(|m| m.ncols()) else {
        if graphs.iter().any(|g| accessor(g).is_some()) {
            return Err(BatchError::MissingAttributes { graph: 0, context });
        }
        return Ok(None);
    };

    let mut combined = DMatrix::zeros(total_rows, width);
    let mut row = 0;
    for (g, graph) in graphs.iter().enumerate() {
        let attrs = accessor(graph).ok_or(BatchError::MissingAttributes { graph: g, context })?;
        if attrs.ncols() != width {
            return Err(BatchError::ShapeMismatch {
                graph: g,
                context,
                expected: width,
                found: attrs.ncols(),
            });
        }
        combined.rows_mut(row, attrs.nrows()).copy_from(attrs);
        row += attrs.nrows();
    }
    Ok(Some(combined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::graph::Edge;
    use crate::core::models::structure::Structure;

    fn chain(n: usize) -> Graph {
        let structure = Structure::new(
            vec![Species(6); n],
            (0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect(),
        )
        .unwrap();
        let edges = (0..n.saturating_sub(1))
            .flat_map(|i| [Edge::new(i, i + 1, [0; 3]), Edge::new(i + 1, i, [0; 3])])
            .collect();
        Graph::from_edges(&structure, edges, 1.1).unwrap()
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(Batch::assemble(&[]), Err(BatchError::Empty));
    }

    #[test]
    fn endpoints_are_offset_by_preceding_node_counts() {
        let batch = Batch::assemble(&[chain(3), chain(2)]).unwrap();
        assert_eq!(batch.num_graphs(), 2);
        assert_eq!(batch.num_nodes(), 5);
        assert_eq!(batch.node_offsets(), &[0, 3, 5]);
        assert_eq!(batch.edge_offsets(), &[0, 4, 6]);
        assert_eq!(batch.node_graph(), &[0, 0, 0, 1, 1]);
        for e in batch.edge_range(1) {
            assert!(batch.node_range(1).contains(&batch.sources()[e]));
            assert!(batch.node_range(1).contains(&batch.targets()[e]));
        }
    }

    #[test]
    fn edges_never_cross_graph_boundaries() {
        let batch = Batch::assemble(&[chain(4), chain(1), chain(3)]).unwrap();
        for (s, t) in batch.sources().iter().zip(batch.targets()) {
            assert_eq!(batch.node_graph()[*s], batch.node_graph()[*t]);
        }
        assert!(batch.node_range(1).len() == 1 && batch.edge_range(1).is_empty());
    }

    #[test]
    fn from_graph_matches_single_graph_assembly() {
        let graph = chain(4);
        assert_eq!(Batch::from_graph(&graph), Batch::assemble(&[graph]).unwrap());
    }

    #[test]
    fn attributes_are_concatenated_in_graph_order() {
        let a = chain(2).with_node_attrs(DMatrix::from_element(2, 3, 1.0)).unwrap();
        let b = chain(1).with_node_attrs(DMatrix::from_element(1, 3, 2.0)).unwrap();
        let batch = Batch::assemble(&[a, b]).unwrap();
        let attrs = batch.node_attrs().unwrap();
        assert_eq!(attrs.nrows(), 3);
        assert_eq!(attrs[(2, 0)], 2.0);
    }

    #[test]
    fn mixed_attribute_presence_is_rejected() {
        let a = chain(2);
        let b = chain(1).with_node_attrs(DMatrix::zeros(1, 3)).unwrap();
        assert!(matches!(
            Batch::assemble(&[a.clone(), b.clone()]),
            Err(BatchError::MissingAttributes { graph: 0, .. })
        ));
        assert!(matches!(
            Batch::assemble(&[b, a]),
            Err(BatchError::MissingAttributes { graph: 1, .. })
        ));
    }

    #[test]
    fn mismatched_attribute_width_reports_graph() {
        let a = chain(2).with_node_attrs(DMatrix::zeros(2, 3)).unwrap();
        let b = chain(1).with_node_attrs(DMatrix::zeros(1, 4)).unwrap();
        assert_eq!(
            Batch::assemble(&[a, b]),
            Err(BatchError::ShapeMismatch {
                graph: 1,
                context: "node attribute matrix",
                expected: 3,
                found: 4
            })
        );
    }

    #[test]
    fn split_nodes_returns_per_graph_slices() {
        let batch = Batch::assemble(&[chain(2), chain(3)]).unwrap();
        let parts = batch.split_nodes(&[0, 1, 2, 3, 4]);
        assert_eq!(parts, vec![vec![0, 1], vec![2, 3, 4]]);
    }
}
