use std::path::PathBuf;

use mscluster::error::ClusteringError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Clustering(#[from] ClusteringError),

    #[error("Invalid spectrum #{index} in {path}: {reason}")]
    InvalidSpectrum { path: PathBuf, index: usize, reason: String },

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ToolError>;
