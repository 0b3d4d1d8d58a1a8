//! Graph construction: turn a dataset into a dense adjacency matrix.
//!
//! Each similarity method is its own [`GraphBuilder`]; [`Similarity`] wraps
//! the closed set of them so callers dispatch through one type.

mod adjacency;
mod correntropy;
mod kernel;
mod learned;

pub use adjacency::{Adjacency, PostProcess};
pub use correntropy::Correntropy;
pub use kernel::GaussianKernel;
pub use learned::LearnedGraph;

use std::fmt;
use std::str::FromStr;

use crate::data::model::SpatioTemporalDataset;
use crate::error::{Error, Result};

/// Build an adjacency matrix from a loaded dataset.
pub trait GraphBuilder {
    fn build(&self, dataset: &SpatioTemporalDataset) -> Result<Adjacency>;
}

/// Names of the available similarity methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimilarityMethod {
    /// Gaussian kernel over sensor distances.
    Distance,
    /// Windowed correntropy of the reading signals.
    Correntropy,
    /// Edge scores produced by a structure-inference model.
    Learned,
}

impl FromStr for SimilarityMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "distance" => Ok(SimilarityMethod::Distance),
            "correntropy" => Ok(SimilarityMethod::Correntropy),
            "learned" => Ok(SimilarityMethod::Learned),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimilarityMethod::Distance => "distance",
            SimilarityMethod::Correntropy => "correntropy",
            SimilarityMethod::Learned => "learned",
        };
        f.write_str(name)
    }
}

/// A configured similarity method.
#[derive(Debug, Clone, PartialEq)]
pub enum Similarity {
    Distance(GaussianKernel),
    Correntropy(Correntropy),
    Learned(LearnedGraph),
}

impl Similarity {
    pub fn method(&self) -> SimilarityMethod {
        match self {
            Similarity::Distance(_) => SimilarityMethod::Distance,
            Similarity::Correntropy(_) => SimilarityMethod::Correntropy,
            Similarity::Learned(_) => SimilarityMethod::Learned,
        }
    }
}

impl GraphBuilder for Similarity {
    fn build(&self, dataset: &SpatioTemporalDataset) -> Result<Adjacency> {
        let adjacency = match self {
            Similarity::Distance(b) => b.build(dataset)?,
            Similarity::Correntropy(b) => b.build(dataset)?,
            Similarity::Learned(b) => b.build(dataset)?,
        };
        log::info!(
            "Built {} adjacency for {}: {} edges, density {:.3}",
            self.method(),
            dataset.name(),
            adjacency.edge_count(),
            adjacency.density()
        );
        Ok(adjacency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_parse_case_insensitively() {
        assert_eq!("distance".parse::<SimilarityMethod>().unwrap(), SimilarityMethod::Distance);
        assert_eq!(" Correntropy ".parse::<SimilarityMethod>().unwrap(), SimilarityMethod::Correntropy);
        assert_eq!("LEARNED".parse::<SimilarityMethod>().unwrap(), SimilarityMethod::Learned);
    }

    #[test]
    fn unknown_method_name_fails() {
        let err = "cosine".parse::<SimilarityMethod>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod(ref m) if m == "cosine"));
        assert!(err.to_string().contains("cosine"));
    }
}
