//! Sensor-network dataset ingestion and graph construction for
//! spatiotemporal forecasting.
//!
//! [`data::loader::load_dataset`] turns a readings file and a pairwise
//! distance table into a [`data::model::SpatioTemporalDataset`]; a
//! [`graph::Similarity`] then turns the dataset into an [`graph::Adjacency`].

pub mod config;
pub mod data;
pub mod error;
pub mod graph;

pub use config::{DatasetConfig, LoaderConfig, SimilarityConfig};
pub use data::loader::load_dataset;
pub use data::model::{DistanceMatrix, SpatioTemporalDataset};
pub use error::{Error, Result};
pub use graph::{Adjacency, GraphBuilder, Similarity, SimilarityMethod};
