use std::fmt;

use chrono::NaiveDateTime;
use ndarray::Array2;

use super::resample::Frequency;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Dense row input
// ---------------------------------------------------------------------------

/// Stack equally long rows into a `rows × cols` array.
pub fn array_from_rows<T: Clone>(rows: Vec<Vec<T>>) -> Result<Array2<T>> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|r| r.len() != n_cols) {
        return Err(Error::ShapeMismatch {
            what: "matrix row",
            expected: (1, n_cols),
            actual: (1, bad.len()),
        });
    }
    let flat: Vec<T> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|_| Error::ShapeMismatch {
        what: "matrix",
        expected: (n_rows, n_cols),
        actual: (n_rows, n_cols),
    })
}

// ---------------------------------------------------------------------------
// DistanceMatrix – pairwise distances with an explicit connectivity mask
// ---------------------------------------------------------------------------

/// Dense node × node distances.
///
/// Disconnected pairs are tracked in `connected` rather than by a numeric
/// sentinel, so a zero-length edge and a missing edge never collide. The
/// distance stored for a disconnected pair is meaningless and never read.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    values: Array2<f64>,
    connected: Array2<bool>,
}

impl DistanceMatrix {
    /// A fully disconnected `n × n` matrix.
    pub fn disconnected(n: usize) -> Self {
        DistanceMatrix {
            values: Array2::zeros((n, n)),
            connected: Array2::from_elem((n, n), false),
        }
    }

    /// Build from an `n × n` table where `None` marks a missing edge.
    pub fn from_options(rows: Vec<Vec<Option<f64>>>) -> Result<Self> {
        let table = array_from_rows(rows)?;
        let (r, c) = table.dim();
        if r != c {
            return Err(Error::ShapeMismatch {
                what: "distance matrix",
                expected: (r, r),
                actual: (r, c),
            });
        }
        let mut out = DistanceMatrix::disconnected(r);
        for ((i, j), cell) in table.indexed_iter() {
            if let Some(d) = *cell {
                out.connect(i, j, d);
            }
        }
        Ok(out)
    }

    /// Record a symmetric edge between `a` and `b`.
    pub fn connect(&mut self, a: usize, b: usize, distance: f64) {
        for (i, j) in [(a, b), (b, a)] {
            self.values[[i, j]] = distance;
            self.connected[[i, j]] = true;
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.values.nrows()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Distance between `i` and `j`, or `None` when no edge is known.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.is_connected(i, j).then(|| self.values[[i, j]])
    }

    pub fn is_connected(&self, i: usize, j: usize) -> bool {
        self.connected[[i, j]]
    }

    pub fn connected(&self) -> &Array2<bool> {
        &self.connected
    }

    /// Distances of all connected cells, row-major.
    pub fn finite_distances(&self) -> Vec<f64> {
        self.values
            .iter()
            .zip(&self.connected)
            .filter(|(_, c)| **c)
            .map(|(d, _)| *d)
            .collect()
    }

    /// Number of connected cells (each undirected edge counts twice off the diagonal).
    pub fn connected_count(&self) -> usize {
        self.connected.iter().filter(|&&c| c).count()
    }

    /// Dense view using `-inf` for disconnected pairs.
    pub fn sentinel_view(&self) -> Array2<f64> {
        let mut out = self.values.clone();
        out.zip_mut_with(&self.connected, |d, &c| {
            if !c {
                *d = f64::NEG_INFINITY;
            }
        });
        out
    }

    /// Min-max scale connected distances into `[0, 1]`.
    ///
    /// Min and max are taken over connected cells only; disconnected cells
    /// are left disconnected. When every connected distance is equal they
    /// all become `0.0`.
    pub fn min_max_normalized(&self) -> DistanceMatrix {
        let finite = self.finite_distances();
        let Some(min) = finite.iter().copied().reduce(f64::min) else {
            return self.clone();
        };
        let max = finite.iter().copied().fold(min, f64::max);
        let span = max - min;

        let mut out = self.clone();
        out.values.zip_mut_with(&self.connected, |d, &c| {
            if c {
                *d = if span > 0.0 { (*d - min) / span } else { 0.0 };
            }
        });
        out
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.n_nodes();
        (0..n).all(|i| (i + 1..n).all(|j| self.get(i, j) == self.get(j, i)))
    }
}

// ---------------------------------------------------------------------------
// SpatioTemporalDataset – the complete loaded dataset
// ---------------------------------------------------------------------------

/// Cleaned readings on a regular time grid, their validity mask and the
/// sensor distance graph.
///
/// Built once by [`crate::data::loader::load_dataset`] (or [`Self::new`]) and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatioTemporalDataset {
    name: String,
    index: Vec<NaiveDateTime>,
    freq: Frequency,
    nodes: Vec<String>,
    values: Array2<f64>,
    mask: Array2<bool>,
    distances: DistanceMatrix,
}

impl SpatioTemporalDataset {
    /// Assemble a dataset, checking that every component shares the same
    /// time grid and node set.
    pub fn new(
        name: impl Into<String>,
        index: Vec<NaiveDateTime>,
        freq: Frequency,
        nodes: Vec<String>,
        values: Array2<f64>,
        mask: Array2<bool>,
        distances: DistanceMatrix,
    ) -> Result<Self> {
        let expected = (index.len(), nodes.len());
        if values.dim() != expected {
            return Err(Error::ShapeMismatch {
                what: "values",
                expected,
                actual: values.dim(),
            });
        }
        if mask.dim() != expected {
            return Err(Error::ShapeMismatch {
                what: "mask",
                expected,
                actual: mask.dim(),
            });
        }
        let n = nodes.len();
        if distances.shape() != (n, n) {
            return Err(Error::ShapeMismatch {
                what: "distances",
                expected: (n, n),
                actual: distances.shape(),
            });
        }
        Ok(SpatioTemporalDataset {
            name: name.into(),
            index,
            freq,
            nodes,
            values,
            mask,
            distances,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Regularized time grid, one entry per row of `values`.
    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn freq(&self) -> Frequency {
        self.freq
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Time × node readings with missing entries imputed.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Time × node mask, `true` where the reading was observed.
    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn distances(&self) -> &DistanceMatrix {
        &self.distances
    }

    pub fn n_steps(&self) -> usize {
        self.index.len()
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Fraction of observed entries.
    pub fn coverage(&self) -> f64 {
        let total = self.mask.len();
        if total == 0 {
            return 0.0;
        }
        self.mask.iter().filter(|&&m| m).count() as f64 / total as f64
    }
}

impl fmt::Display for SpatioTemporalDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} steps x {} nodes @ {}, {:.1}% observed, {} distance entries",
            self.name,
            self.n_steps(),
            self.n_nodes(),
            self.freq,
            self.coverage() * 100.0,
            self.distances.connected_count()
        )
    }
}
