use ndarray::Array2;

use super::{Adjacency, GraphBuilder};
use crate::data::model::{DistanceMatrix, SpatioTemporalDataset};
use crate::error::{Error, Result};

/// Gaussian kernel over sensor distances: `w = exp(-d² / (2σ²))`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GaussianKernel {
    /// Bandwidth; the standard deviation of connected distances when `None`.
    pub sigma: Option<f64>,
    /// Put weight 1 on the diagonal instead of 0.
    pub self_loops: bool,
}

impl GaussianKernel {
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma: Some(sigma),
            self_loops: false,
        }
    }

    pub fn with_self_loops(mut self, self_loops: bool) -> Self {
        self.self_loops = self_loops;
        self
    }

    /// Apply the kernel to a distance matrix.
    ///
    /// Disconnected pairs get exactly `0.0`.
    pub fn transform(&self, distances: &DistanceMatrix) -> Result<Adjacency> {
        let n = distances.n_nodes();
        let mut weights = Array2::<f64>::zeros((n, n));

        if self.sigma.is_some() || distances.connected_count() > 0 {
            let sigma = self.bandwidth(distances)?;
            let denom = 2.0 * sigma * sigma;
            for ((i, j), w) in weights.indexed_iter_mut() {
                if let Some(d) = distances.get(i, j) {
                    *w = (-(d * d) / denom).exp();
                }
            }
        } else {
            log::warn!("no connected node pairs, adjacency is empty");
        }

        weights.diag_mut().fill(if self.self_loops { 1.0 } else { 0.0 });
        Adjacency::from_weights(weights)
    }

    /// The configured σ, or the population std of connected distances.
    pub fn bandwidth(&self, distances: &DistanceMatrix) -> Result<f64> {
        match self.sigma {
            Some(sigma) if sigma.is_finite() && sigma > 0.0 => Ok(sigma),
            Some(sigma) => Err(Error::invalid(
                "sigma",
                format!("{sigma} must be a finite positive bandwidth"),
            )),
            None => {
                let sigma = std_dev(&distances.finite_distances());
                if sigma > 0.0 {
                    log::debug!("kernel bandwidth from distance std: sigma = {sigma:.6}");
                    Ok(sigma)
                } else {
                    Err(Error::invalid(
                        "sigma",
                        "connected distances have zero spread, pass sigma explicitly",
                    ))
                }
            }
        }
    }
}

impl GraphBuilder for GaussianKernel {
    fn build(&self, dataset: &SpatioTemporalDataset) -> Result<Adjacency> {
        self.transform(dataset.distances())
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> DistanceMatrix {
        let mut d = DistanceMatrix::disconnected(4);
        d.connect(0, 1, 1.0);
        d.connect(1, 2, 2.0);
        d.connect(2, 3, 0.0);
        d
    }

    #[test]
    fn disconnected_pairs_are_exactly_zero() {
        let adj = GaussianKernel::new(0.5).transform(&chain()).unwrap();
        assert_eq!(adj.get(0, 3), 0.0);
        assert_eq!(adj.get(0, 2), 0.0);
        assert!(adj.get(1, 2) > 0.0);
        assert_eq!(adj.get(2, 3), 1.0);
    }

    #[test]
    fn kernel_values_and_symmetry() {
        let adj = GaussianKernel::new(1.0).transform(&chain()).unwrap();
        assert!((adj.get(0, 1) - (-0.5f64).exp()).abs() < 1e-12);
        assert!((adj.get(1, 2) - (-2.0f64).exp()).abs() < 1e-12);
        assert!(adj.is_symmetric());
        assert_eq!(adj.get(1, 1), 0.0);

        let looped = GaussianKernel::new(1.0).with_self_loops(true).transform(&chain()).unwrap();
        assert_eq!(looped.get(1, 1), 1.0);
        assert!(looped.has_self_loops());
    }

    #[test]
    fn non_positive_sigma_is_invalid() {
        for sigma in [0.0, -1.0, f64::NAN] {
            let err = GaussianKernel::new(sigma).transform(&chain()).unwrap_err();
            assert!(matches!(err, Error::InvalidParameter { name: "sigma", .. }));
        }
    }

    #[test]
    fn auto_sigma_is_population_std_of_connected_distances() {
        // connected cells: 1, 1, 2, 2, 0, 0
        let k = GaussianKernel::default();
        let expected = (2.0f64 / 3.0).sqrt();
        assert!((k.bandwidth(&chain()).unwrap() - expected).abs() < 1e-12);

        let mut flat = DistanceMatrix::disconnected(2);
        flat.connect(0, 1, 1.0);
        assert!(k.transform(&flat).is_err());
    }

    #[test]
    fn empty_graph_needs_no_bandwidth() {
        let adj = GaussianKernel::default()
            .transform(&DistanceMatrix::disconnected(3))
            .unwrap();
        assert_eq!(adj.edge_count(), 0);
    }
}
