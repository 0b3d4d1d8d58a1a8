use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while loading a dataset or building its graph.
///
/// Loading is all-or-nothing: any of these aborts the whole step and no
/// partially-built dataset is returned.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unreadable input file.
    #[error("{}: {reason}", location(.path, .row))]
    DataLoad {
        path: PathBuf,
        /// 1-based data row (header excluded), when the problem is row-specific.
        row: Option<usize>,
        reason: String,
    },

    #[error("unsupported similarity method '{0}' (expected distance, correntropy or learned)")]
    UnsupportedMethod(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn location(path: &Path, row: &Option<usize>) -> String {
    match row {
        Some(r) => format!("{} (row {r})", path.display()),
        None => path.display().to_string(),
    }
}

impl Error {
    pub(crate) fn load(path: &Path, reason: impl Into<String>) -> Self {
        Error::DataLoad {
            path: path.to_path_buf(),
            row: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn load_row(path: &Path, row: usize, reason: impl Into<String>) -> Self {
        Error::DataLoad {
            path: path.to_path_buf(),
            row: Some(row),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_load_message_names_file_and_row() {
        let err = Error::load_row(Path::new("data/readings.csv"), 12, "bad timestamp");
        assert_eq!(err.to_string(), "data/readings.csv (row 12): bad timestamp");

        let err = Error::load(Path::new("dist.csv"), "empty file");
        assert_eq!(err.to_string(), "dist.csv: empty file");
    }
}
