use crate::core::models::batch::Batch;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Reduction of incoming edge messages at each target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
    Max,
}

impl Aggregation {
    /// Reduces the rows of `messages` into `num_nodes` rows grouped by `index`.
    ///
    /// Nodes without incoming messages receive a zero row. A NaN message makes
    /// every reduction NaN for that node and column.
    pub fn scatter(
        &self,
        messages: &DMatrix<f64>,
        index: &[usize],
        num_nodes: usize,
    ) -> DMatrix<f64> {
        let width = messages.ncols();
        match self {
            Self::Sum | Self::Mean => {
                let mut out = DMatrix::zeros(num_nodes, width);
                let mut counts = vec![0usize; num_nodes];
                for (row, &node) in index.iter().enumerate() {
                    let mut target = out.row_mut(node);
                    target += messages.row(row);
                    counts[node] += 1;
                }
                if *self == Self::Mean {
                    for (node, &count) in counts.iter().enumerate() {
                        if count > 0 {
                            out.row_mut(node).scale_mut(1.0 / count as f64);
                        }
                    }
                }
                out
            }
            Self::Max => {
                let mut out = DMatrix::from_element(num_nodes, width, f64::NEG_INFINITY);
                let mut touched = vec![false; num_nodes];
                for (row, &node) in index.iter().enumerate() {
                    touched[node] = true;
                    for col in 0..width {
                        let (current, message) = (out[(node, col)], messages[(row, col)]);
                        if message.is_nan() || message > current {
                            out[(node, col)] = message;
                        }
                    }
                }
                for (node, _) in touched.iter().enumerate().filter(|(_, t)| !**t) {
                    out.row_mut(node).fill(0.0);
                }
                out
            }
        }
    }

    /// Reduction used for vector channels.
    ///
    /// Component-wise maxima are not rotation-equivariant, so `Max` reduces
    /// vector messages with the mean.
    pub fn vector_reduction(&self) -> Self {
        match self {
            Self::Sum => Self::Sum,
            Self::Mean | Self::Max => Self::Mean,
        }
    }
}

/// Reduction of per-node values into one value per graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadoutAggregation {
    #[default]
    Sum,
    Mean,
}

impl ReadoutAggregation {
    /// Pools node values per graph of the batch. Empty graphs pool to zero.
    pub fn pool(&self, values: &DVector<f64>, batch: &Batch) -> DVector<f64> {
        DVector::from_iterator(
            batch.num_graphs(),
            (0..batch.num_graphs()).map(|g| {
                let range = batch.node_range(g);
                let count = range.len();
                let total: f64 = values.rows(range.start, count).sum();
                match self {
                    Self::Sum => total,
                    Self::Mean if count > 0 => total / count as f64,
                    Self::Mean => 0.0,
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 2, &[1.0, -4.0, 3.0, 2.0, 5.0, 0.5])
    }

    #[test]
    fn sum_adds_messages_per_target() {
        let out = Aggregation::Sum.scatter(&messages(), &[0, 0, 2], 3);
        assert_eq!(out, DMatrix::from_row_slice(3, 2, &[4.0, -2.0, 0.0, 0.0, 5.0, 0.5]));
    }

    #[test]
    fn mean_divides_by_in_degree() {
        let out = Aggregation::Mean.scatter(&messages(), &[0, 0, 2], 3);
        assert_eq!(out, DMatrix::from_row_slice(3, 2, &[2.0, -1.0, 0.0, 0.0, 5.0, 0.5]));
    }

    #[test]
    fn max_takes_componentwise_maximum_and_zero_for_isolated_nodes() {
        let out = Aggregation::Max.scatter(&messages(), &[0, 0, 2], 3);
        assert_eq!(out, DMatrix::from_row_slice(3, 2, &[3.0, 2.0, 0.0, 0.0, 5.0, 0.5]));
    }

    #[test]
    fn aggregation_ignores_message_order() {
        let m = messages();
        let swapped = DMatrix::from_row_slice(3, 2, &[5.0, 0.5, 3.0, 2.0, 1.0, -4.0]);
        for aggregation in [Aggregation::Sum, Aggregation::Mean, Aggregation::Max] {
            assert_eq!(
                aggregation.scatter(&m, &[0, 1, 1], 2),
                aggregation.scatter(&swapped, &[1, 1, 0], 2)
            );
        }
    }

    #[test]
    fn non_finite_messages_reach_the_target_node() {
        let m = DMatrix::from_row_slice(3, 2, &[f64::NAN, 1.0, 2.0, 3.0, 4.0, 5.0]);
        for aggregation in [Aggregation::Sum, Aggregation::Mean, Aggregation::Max] {
            for index in [[0, 0, 1], [0, 1, 0], [1, 0, 0]] {
                let out = aggregation.scatter(&m, &index, 2);
                assert!(out[(index[0], 0)].is_nan(), "{aggregation:?} {index:?}");
                assert!(out[(index[0], 1)].is_finite());
            }
        }
    }

    #[test]
    fn vector_reduction_never_uses_max() {
        assert_eq!(Aggregation::Max.vector_reduction(), Aggregation::Mean);
        assert_eq!(Aggregation::Sum.vector_reduction(), Aggregation::Sum);
    }

    #[test]
    fn aggregation_parses_kebab_case() {
        let parsed: Aggregation = serde_json::from_str("\"max\"").unwrap();
        assert_eq!(parsed, Aggregation::Max);
    }
}
