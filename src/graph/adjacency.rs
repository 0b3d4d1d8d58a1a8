use std::path::Path;

use ndarray::Array2;

use crate::error::{Error, Result};

/// Dense node × node edge weights.
///
/// Always square, symmetric, finite and non-negative; a missing edge is
/// exactly `0.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjacency {
    weights: Array2<f64>,
}

impl Adjacency {
    /// Wrap a weight matrix after checking the adjacency invariants.
    pub fn from_weights(weights: Array2<f64>) -> Result<Self> {
        let (r, c) = weights.dim();
        if r != c {
            return Err(Error::ShapeMismatch {
                what: "adjacency",
                expected: (r, r),
                actual: (r, c),
            });
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::invalid("weights", format!("{w} is not a finite non-negative weight")));
        }
        let adjacency = Adjacency { weights };
        if !adjacency.is_symmetric() {
            return Err(Error::invalid("weights", "adjacency is not symmetric"));
        }
        Ok(adjacency)
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn n_nodes(&self) -> usize {
        self.weights.nrows()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.weights[[i, j]]
    }

    pub fn is_symmetric(&self) -> bool {
        self.weights == self.weights.t()
    }

    pub fn has_self_loops(&self) -> bool {
        self.weights.diag().iter().any(|&w| w > 0.0)
    }

    /// Undirected edges with positive weight, self-loops excluded.
    pub fn edge_count(&self) -> usize {
        let n = self.n_nodes();
        (0..n)
            .map(|i| (i + 1..n).filter(|&j| self.get(i, j) > 0.0).count())
            .sum()
    }

    /// Fraction of possible undirected edges present.
    pub fn density(&self) -> f64 {
        let n = self.n_nodes();
        if n < 2 {
            return 0.0;
        }
        self.edge_count() as f64 / (n * (n - 1) / 2) as f64
    }

    /// Keep edge `(i, j)` when `j` is one of `i`'s `k` strongest neighbours
    /// or `i` is one of `j`'s. Self-loops are untouched.
    pub fn sparsify_knn(&self, k: usize) -> Result<Adjacency> {
        if k == 0 {
            return Err(Error::invalid("knn", "must keep at least one neighbour"));
        }
        let n = self.n_nodes();
        let mut keep = Array2::from_elem((n, n), false);
        for (i, row) in self.weights.rows().into_iter().enumerate() {
            let mut neighbours: Vec<(usize, f64)> = row
                .iter()
                .copied()
                .enumerate()
                .filter(|&(j, w)| j != i && w > 0.0)
                .collect();
            neighbours.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            for &(j, _) in neighbours.iter().take(k) {
                keep[[i, j]] = true;
            }
        }

        let mut weights = self.weights.clone();
        for ((i, j), w) in weights.indexed_iter_mut() {
            if i != j && !keep[[i, j]] && !keep[[j, i]] {
                *w = 0.0;
            }
        }
        Ok(Adjacency { weights })
    }

    /// Zero every weight strictly below `min_weight`.
    pub fn threshold(&self, min_weight: f64) -> Result<Adjacency> {
        if !min_weight.is_finite() || min_weight < 0.0 {
            return Err(Error::invalid("threshold", format!("{min_weight} must be finite and non-negative")));
        }
        Ok(Adjacency {
            weights: self.weights.mapv(|w| if w < min_weight { 0.0 } else { w }),
        })
    }

    /// Coordinate layout: `([row, col], weight)` for every positive weight, row-major.
    pub fn to_edge_index(&self) -> (Vec<[usize; 2]>, Vec<f64>) {
        self.weights
            .indexed_iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|((i, j), &w)| ([i, j], w))
            .unzip()
    }

    /// Write as CSV with node ids as header and row labels.
    pub fn write_csv(&self, path: &Path, nodes: &[String]) -> Result<()> {
        if nodes.len() != self.n_nodes() {
            return Err(Error::ShapeMismatch {
                what: "node labels",
                expected: (self.n_nodes(), 1),
                actual: (nodes.len(), 1),
            });
        }
        let mut writer = csv::Writer::from_path(path)?;
        let header = std::iter::once("").chain(nodes.iter().map(String::as_str));
        writer.write_record(header)?;
        for (node, weights) in nodes.iter().zip(self.weights.rows()) {
            let row = std::iter::once(node.clone()).chain(weights.iter().map(|w| w.to_string()));
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Optional sparsification applied after a builder runs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PostProcess {
    pub knn: Option<usize>,
    pub threshold: Option<f64>,
}

impl PostProcess {
    pub fn apply(&self, adjacency: Adjacency) -> Result<Adjacency> {
        let mut adjacency = adjacency;
        if let Some(t) = self.threshold {
            adjacency = adjacency.threshold(t)?;
        }
        if let Some(k) = self.knn {
            adjacency = adjacency.sparsify_knn(k)?;
        }
        Ok(adjacency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    use crate::data::model::array_from_rows;

    fn adj(rows: Vec<Vec<f64>>) -> Adjacency {
        Adjacency::from_weights(array_from_rows(rows).unwrap()).unwrap()
    }

    #[test]
    fn rejects_asymmetric_or_negative_weights() {
        let m = array![[0.0, 1.0], [0.5, 0.0]];
        assert!(matches!(Adjacency::from_weights(m), Err(Error::InvalidParameter { .. })));

        let m = array![[0.0, -1.0], [-1.0, 0.0]];
        assert!(Adjacency::from_weights(m).is_err());

        let m = Array2::zeros((2, 3));
        assert!(matches!(Adjacency::from_weights(m), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn knn_keeps_symmetric_union() {
        let a = adj(vec![
            vec![0.0, 0.9, 0.1, 0.2],
            vec![0.9, 0.0, 0.3, 0.0],
            vec![0.1, 0.3, 0.0, 0.8],
            vec![0.2, 0.0, 0.8, 0.0],
        ]);
        let s = a.sparsify_knn(1).unwrap();
        assert!(s.is_symmetric());
        assert_eq!(s.get(0, 1), 0.9);
        assert_eq!(s.get(2, 3), 0.8);
        assert_eq!(s.get(0, 2), 0.0);
        assert_eq!(s.get(1, 2), 0.0);
        assert_eq!(s.edge_count(), 2);
        assert!(a.sparsify_knn(0).is_err());
    }

    #[test]
    fn threshold_and_edge_index() {
        let a = adj(vec![
            vec![0.0, 0.5, 0.05],
            vec![0.5, 0.0, 0.0],
            vec![0.05, 0.0, 0.0],
        ]);
        let t = a.threshold(0.1).unwrap();
        let (index, weights) = t.to_edge_index();
        assert_eq!(index, vec![[0, 1], [1, 0]]);
        assert_eq!(weights, vec![0.5, 0.5]);
        assert!((a.density() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn post_process_applies_threshold_then_knn() {
        let a = adj(vec![
            vec![0.0, 0.5, 0.4],
            vec![0.5, 0.0, 0.3],
            vec![0.4, 0.3, 0.0],
        ]);
        let p = PostProcess {
            knn: Some(1),
            threshold: Some(0.35),
        };
        let out = p.apply(a).unwrap();
        assert_eq!(out.get(0, 1), 0.5);
        assert_eq!(out.get(0, 2), 0.4);
        assert_eq!(out.get(1, 2), 0.0);
    }

    #[test]
    fn writes_labelled_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adj.csv");
        let a = adj(vec![vec![0.0, 0.25], vec![0.25, 0.0]]);
        a.write_csv(&path, &["x".to_string(), "y".to_string()]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, ",x,y\nx,0,0.25\ny,0.25,0\n");
    }

    #[test]
    fn unwritable_csv_target_is_a_csv_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("adj.csv");
        let a = adj(vec![vec![0.0, 0.25], vec![0.25, 0.0]]);
        let err = a.write_csv(&path, &["x".to_string(), "y".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Csv(_)));
    }
}
