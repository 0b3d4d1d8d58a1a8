use ndarray::Array2;

use super::{Adjacency, GraphBuilder};
use crate::data::model::SpatioTemporalDataset;
use crate::error::{Error, Result};

/// Edge scores inferred by an auxiliary structure-learning model.
///
/// Scores may be directed; the adjacency uses the mean of both directions.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedGraph {
    pub scores: Array2<f64>,
    pub self_loops: bool,
}

impl LearnedGraph {
    pub fn new(scores: Array2<f64>) -> Self {
        Self {
            scores,
            self_loops: false,
        }
    }

    /// Symmetrize the scores for a graph of `n_nodes` nodes.
    pub fn to_adjacency(&self, n_nodes: usize) -> Result<Adjacency> {
        if self.scores.dim() != (n_nodes, n_nodes) {
            return Err(Error::ShapeMismatch {
                what: "learned scores",
                expected: (n_nodes, n_nodes),
                actual: self.scores.dim(),
            });
        }
        if let Some(s) = self.scores.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(Error::invalid("scores", format!("{s} is not a finite non-negative score")));
        }

        let mut weights = (&self.scores + &self.scores.t()) / 2.0;
        weights.diag_mut().fill(if self.self_loops { 1.0 } else { 0.0 });
        Adjacency::from_weights(weights)
    }
}

impl GraphBuilder for LearnedGraph {
    fn build(&self, dataset: &SpatioTemporalDataset) -> Result<Adjacency> {
        self.to_adjacency(dataset.n_nodes())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn directed_scores_are_averaged() {
        let scores = array![[0.7, 0.2, 0.0], [0.6, 0.1, 0.0], [0.0, 0.0, 0.3]];
        let adj = LearnedGraph::new(scores).to_adjacency(3).unwrap();
        assert!((adj.get(0, 1) - 0.4).abs() < 1e-12);
        assert_eq!(adj.get(0, 2), 0.0);
        assert_eq!(adj.get(0, 0), 0.0);
        assert!(adj.is_symmetric());
    }

    #[test]
    fn wrong_shape_or_negative_scores_fail() {
        let scores = Array2::from_elem((2, 2), 0.5);
        assert!(matches!(
            LearnedGraph::new(scores).to_adjacency(3),
            Err(Error::ShapeMismatch { .. })
        ));

        let scores = array![[0.0, -0.1], [0.2, 0.0]];
        assert!(matches!(
            LearnedGraph::new(scores).to_adjacency(2),
            Err(Error::InvalidParameter { name: "scores", .. })
        ));
    }
}
