use nalgebra::{DMatrix, Vector3};

/// Features flowing between message-passing layers.
///
/// `vectors` holds the equivariant channels as three `N x F` matrices, one per
/// Cartesian component; invariant models leave it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerState {
    pub nodes: DMatrix<f64>,
    pub vectors: Option<[DMatrix<f64>; 3]>,
    pub edges: DMatrix<f64>,
}

impl LayerState {
    pub fn num_nodes(&self) -> usize {
        self.nodes.nrows()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.nrows()
    }

    pub fn width(&self) -> usize {
        self.nodes.ncols()
    }

    /// Vector feature of one node channel.
    pub fn vector(&self, node: usize, channel: usize) -> Option<Vector3<f64>> {
        self.vectors.as_ref().map(|[x, y, z]| {
            Vector3::new(x[(node, channel)], y[(node, channel)], z[(node, channel)])
        })
    }
}
