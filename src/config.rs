//! Explicit configuration objects for the loader and the graph builder.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::impute::FillPolicy;
use crate::data::loader::load_score_matrix;
use crate::data::resample::TemporalAggregation;
use crate::error::Result;
use crate::graph::{
    Correntropy, GaussianKernel, LearnedGraph, PostProcess, Similarity, SimilarityMethod,
};

/// Everything needed to build one dataset and its graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub name: String,
    pub readings_path: PathBuf,
    pub distances_path: PathBuf,
    pub loader: LoaderConfig,
    pub similarity: SimilarityConfig,
    /// Where the binary writes the adjacency CSV, if anywhere.
    pub output_path: Option<PathBuf>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: "dataset".to_string(),
            readings_path: PathBuf::from("readings.csv"),
            distances_path: PathBuf::from("distances.csv"),
            loader: LoaderConfig::default(),
            similarity: SimilarityConfig::default(),
            output_path: None,
        }
    }
}

impl DatasetConfig {
    /// Load configuration from a JSON file. Relative data paths are resolved
    /// against the config file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: DatasetConfig = serde_json::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.readings_path);
        resolve(&mut self.distances_path);
        if let Some(p) = self.output_path.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.similarity.learned_path.as_mut() {
            resolve(p);
        }
    }
}

/// How raw files become `(values, mask, distances)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Sampling interval such as `"5T"`; inferred from the data when absent.
    pub freq: Option<String>,
    pub aggregation: TemporalAggregation,
    pub fill: FillPolicy,
    /// Min-max scale connected distances into `[0, 1]`.
    pub normalize_distances: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            freq: None,
            aggregation: TemporalAggregation::Nearest,
            fill: FillPolicy::Zero,
            normalize_distances: true,
        }
    }
}

/// Graph construction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// `distance`, `correntropy` or `learned`.
    pub method: String,
    /// Gaussian kernel bandwidth; std of connected distances when absent.
    pub sigma: Option<f64>,
    pub self_loops: bool,
    /// Correntropy window length in steps.
    pub period: usize,
    /// Correntropy RBF coefficient.
    pub gamma: f64,
    /// Restrict correntropy to the first `train_len` steps.
    pub train_len: Option<usize>,
    /// CSV of edge scores for the `learned` method.
    pub learned_path: Option<PathBuf>,
    /// Keep each node's `knn` strongest edges.
    pub knn: Option<usize>,
    /// Drop edges weaker than this.
    pub threshold: Option<f64>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            method: "distance".to_string(),
            sigma: None,
            self_loops: false,
            period: 288,
            gamma: 0.05,
            train_len: None,
            learned_path: None,
            knn: None,
            threshold: None,
        }
    }
}

impl SimilarityConfig {
    /// Resolve the method name and assemble the matching builder.
    pub fn builder(&self) -> Result<Similarity> {
        let method: SimilarityMethod = self.method.parse()?;
        let similarity = match method {
            SimilarityMethod::Distance => Similarity::Distance(GaussianKernel {
                sigma: self.sigma,
                self_loops: self.self_loops,
            }),
            SimilarityMethod::Correntropy => Similarity::Correntropy(Correntropy {
                period: self.period,
                gamma: self.gamma,
                train_len: self.train_len,
                self_loops: self.self_loops,
            }),
            SimilarityMethod::Learned => {
                let path = self.learned_path.as_deref().ok_or_else(|| {
                    crate::error::Error::invalid("learned_path", "required for the learned method")
                })?;
                Similarity::Learned(LearnedGraph {
                    scores: load_score_matrix(path)?,
                    self_loops: self.self_loops,
                })
            }
        };
        Ok(similarity)
    }

    pub fn post_process(&self) -> PostProcess {
        PostProcess {
            knn: self.knn,
            threshold: self.threshold,
        }
    }
}
