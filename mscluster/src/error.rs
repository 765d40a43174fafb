use thiserror::Error;

/// Errors surfaced by the clustering core.
///
/// Scoring anomalies (NaN scores, undefined rank correlations) are never
/// reported here, they are resolved locally as "no match".
#[derive(Debug, Error)]
pub enum ClusteringError {
    #[error("Invalid spectrum {id}: {reason}")]
    InvalidInput { id: String, reason: String },

    #[error("Input not sorted by precursor m/z: {id} ({mz}) follows precursor m/z {previous_mz}")]
    UnsortedInput {
        /// Id of the offending item.
        id: String,
        /// Its precursor m/z.
        mz: i32,
        /// Precursor m/z of the item before it.
        previous_mz: i32,
    },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Cluster {source_id} shares {count} member(s) with cluster {target_id}")]
    DuplicateMembers {
        source_id: String,
        target_id: String,
        count: usize,
    },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Clustering of bin {bin} failed: {reason}")]
    BinTask { bin: usize, reason: String },

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cluster encoding error: {0}")]
    Codec(String),
}

impl ClusteringError {
    pub fn invalid_input(id: &str, reason: impl Into<String>) -> Self {
        ClusteringError::InvalidInput { id: id.to_string(), reason: reason.into() }
    }

    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        ClusteringError::InvalidParameter { name, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, ClusteringError>;
