use ndarray::{s, Array2, Axis};

use super::{Adjacency, GraphBuilder};
use crate::data::model::SpatioTemporalDataset;
use crate::error::{Error, Result};

/// Similarity of node signals: the mean RBF kernel `exp(-γ‖xᵢ − xⱼ‖²)` over
/// non-overlapping windows of `period` steps.
///
/// A window only contributes to a pair when both nodes are fully observed in
/// it, so imputed values never leak into the graph. Pairs that never share
/// a clean window get weight 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correntropy {
    pub period: usize,
    pub gamma: f64,
    /// Only look at the first `train_len` steps (keeps test data out of the graph).
    pub train_len: Option<usize>,
    pub self_loops: bool,
}

impl Correntropy {
    pub fn new(period: usize, gamma: f64) -> Self {
        Self {
            period,
            gamma,
            train_len: None,
            self_loops: false,
        }
    }

    pub fn with_train_len(mut self, train_len: usize) -> Self {
        self.train_len = Some(train_len);
        self
    }

    /// Compute the similarity from a time × node signal and its mask.
    pub fn compute(&self, values: &Array2<f64>, mask: &Array2<bool>) -> Result<Adjacency> {
        if values.dim() != mask.dim() {
            return Err(Error::ShapeMismatch {
                what: "mask",
                expected: values.dim(),
                actual: mask.dim(),
            });
        }
        if self.period == 0 {
            return Err(Error::invalid("period", "window length must be positive"));
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(Error::invalid("gamma", format!("{} must be finite and positive", self.gamma)));
        }
        if self.train_len == Some(0) {
            return Err(Error::invalid("train_len", "must cover at least one step"));
        }

        let (n_steps, n_nodes) = values.dim();
        let steps = self.train_len.map_or(n_steps, |t| t.min(n_steps));
        let n_windows = steps / self.period;
        if n_windows == 0 {
            return Err(Error::invalid(
                "period",
                format!("window of {} steps does not fit in {steps} steps", self.period),
            ));
        }

        let mut sum = Array2::<f64>::zeros((n_nodes, n_nodes));
        let mut count = Array2::<usize>::zeros((n_nodes, n_nodes));

        for w in 0..n_windows {
            let rows = w * self.period..(w + 1) * self.period;
            let window = values.slice(s![rows.clone(), ..]);
            let observed: Vec<bool> = mask
                .slice(s![rows, ..])
                .axis_iter(Axis(1))
                .map(|node| node.iter().all(|&m| m))
                .collect();

            for i in 0..n_nodes {
                if !observed[i] {
                    continue;
                }
                for j in (i + 1)..n_nodes {
                    if !observed[j] {
                        continue;
                    }
                    let diff = &window.column(i) - &window.column(j);
                    let sq = diff.dot(&diff);
                    sum[[i, j]] += (-self.gamma * sq).exp();
                    count[[i, j]] += 1;
                }
            }
        }

        let mut weights = Array2::<f64>::zeros((n_nodes, n_nodes));
        for ((i, j), &c) in count.indexed_iter() {
            if c > 0 {
                let w = sum[[i, j]] / c as f64;
                weights[[i, j]] = w;
                weights[[j, i]] = w;
            }
        }
        if self.self_loops {
            weights.diag_mut().fill(1.0);
        }

        log::debug!("correntropy over {n_windows} windows of {} steps, gamma = {}", self.period, self.gamma);
        Adjacency::from_weights(weights)
    }
}

impl GraphBuilder for Correntropy {
    fn build(&self, dataset: &SpatioTemporalDataset) -> Result<Adjacency> {
        self.compute(dataset.values(), dataset.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    fn signals() -> (Array2<f64>, Array2<bool>) {
        // node 0 and 1 identical, node 2 offset by 1, node 3 missing in window 0
        let values = array![
            [1.0, 1.0, 2.0, 0.0],
            [2.0, 2.0, 3.0, 5.0],
            [3.0, 3.0, 4.0, 3.0],
            [4.0, 4.0, 5.0, 4.0],
        ];
        let mut mask = Array2::from_elem((4, 4), true);
        mask[[0, 3]] = false;
        (values, mask)
    }

    #[test]
    fn identical_signals_have_unit_similarity() {
        let (values, mask) = signals();
        let adj = Correntropy::new(2, 0.5).compute(&values, &mask).unwrap();
        assert_eq!(adj.get(0, 1), 1.0);
        assert!((adj.get(0, 2) - (-1.0f64).exp()).abs() < 1e-12);
        assert!(adj.is_symmetric());
        assert_eq!(adj.get(2, 2), 0.0);
    }

    #[test]
    fn only_fully_observed_windows_count() {
        let (values, mask) = signals();
        let adj = Correntropy::new(2, 0.5).compute(&values, &mask).unwrap();
        // second window: node 3 = [3, 4] equals node 0
        assert_eq!(adj.get(0, 3), 1.0);

        let first_only = Correntropy::new(2, 0.5).with_train_len(2);
        let adj = first_only.compute(&values, &mask).unwrap();
        assert_eq!(adj.get(0, 3), 0.0);
        assert_eq!(adj.get(0, 1), 1.0);
    }

    #[test]
    fn rejects_bad_parameters() {
        let (values, mask) = signals();
        assert!(Correntropy::new(0, 1.0).compute(&values, &mask).is_err());
        assert!(Correntropy::new(2, 0.0).compute(&values, &mask).is_err());
        assert!(Correntropy::new(5, 1.0).compute(&values, &mask).is_err());

        let short_mask = Array2::from_elem((3, 4), true);
        assert!(matches!(
            Correntropy::new(2, 1.0).compute(&values, &short_mask),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
