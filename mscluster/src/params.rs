use serde::{Deserialize, Serialize};

use crate::algorithm::assessor::DEFAULT_MIN_NUMBER_COMPARISONS;
use crate::algorithm::lsh::{DEFAULT_LSH_KERNELS, DEFAULT_LSH_SEED};
use crate::algorithm::predicate::DEFAULT_SHARED_HIGHEST_PEAKS;
use crate::algorithm::similarity::SimilarityKind;
use crate::data::cluster::DuplicatePolicy;
use crate::data::consensus::{ConsensusSettings, DEFAULT_MAX_CONSENSUS_PEAKS, DEFAULT_NOISE_FILTER_INCREMENT};
use crate::error::{ClusteringError, Result};

pub const DEFAULT_PRECURSOR_TOLERANCE: i32 = 1000;
pub const DEFAULT_MAX_BIN_SIZE: usize = 1000;

/// Settings of one clustering run.
///
/// Thresholds are in the unit of the selected scorer: Jaccard scores lie in
/// `[0, 1]`, the combined Fisher score is unbounded above. The defaults
/// target the Fisher scorer, `5.0` corresponds roughly to two p-values of 0.05.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParameters {
    /// Precursor tolerance in integer m/z space.
    pub precursor_tolerance: i32,
    /// Threshold of the first round.
    pub threshold_start: f64,
    /// Threshold of the last round.
    pub threshold_end: f64,
    pub rounds: usize,
    /// Worker threads, 0 uses rayon's global pool.
    pub n_threads: usize,
    /// Highest peaks checked by the candidate predicate, 0 only requires one shared peak.
    pub shared_highest_peaks: usize,
    pub min_number_comparisons: u64,
    pub noise_filter_increment: usize,
    pub max_consensus_peaks: usize,
    pub ignore_charge: bool,
    /// Target number of items per precursor bin.
    pub max_bin_size: usize,
    pub similarity: SimilarityKind,
    pub lsh_kernels: usize,
    pub lsh_seed: u64,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for ClusteringParameters {
    fn default() -> Self {
        Self {
            precursor_tolerance: DEFAULT_PRECURSOR_TOLERANCE,
            threshold_start: 5.0,
            threshold_end: 8.0,
            rounds: 5,
            n_threads: 0,
            shared_highest_peaks: DEFAULT_SHARED_HIGHEST_PEAKS,
            min_number_comparisons: DEFAULT_MIN_NUMBER_COMPARISONS,
            noise_filter_increment: DEFAULT_NOISE_FILTER_INCREMENT,
            max_consensus_peaks: DEFAULT_MAX_CONSENSUS_PEAKS,
            ignore_charge: false,
            max_bin_size: DEFAULT_MAX_BIN_SIZE,
            similarity: SimilarityKind::default(),
            lsh_kernels: DEFAULT_LSH_KERNELS,
            lsh_seed: DEFAULT_LSH_SEED,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl ClusteringParameters {
    pub fn validate(&self) -> Result<()> {
        if self.precursor_tolerance < 0 {
            return Err(ClusteringError::invalid_parameter(
                "precursor_tolerance",
                format!("must not be negative, got {}", self.precursor_tolerance),
            ));
        }
        if self.rounds == 0 {
            return Err(ClusteringError::invalid_parameter("rounds", "at least one round is required"));
        }
        if self.threshold_start.is_nan() || self.threshold_end.is_nan() {
            return Err(ClusteringError::invalid_parameter("threshold_start", "thresholds must not be NaN"));
        }
        if self.threshold_end < self.threshold_start {
            return Err(ClusteringError::invalid_parameter(
                "threshold_end",
                format!(
                    "thresholds must be ascending, got {} -> {}",
                    self.threshold_start, self.threshold_end
                ),
            ));
        }
        if self.noise_filter_increment == 0 {
            return Err(ClusteringError::invalid_parameter("noise_filter_increment", "must be at least 1"));
        }
        if self.max_bin_size == 0 {
            return Err(ClusteringError::invalid_parameter("max_bin_size", "must be at least 1"));
        }
        if self.similarity == SimilarityKind::JaccardLsh && self.lsh_kernels == 0 {
            return Err(ClusteringError::invalid_parameter("lsh_kernels", "LSH needs at least one kernel"));
        }
        Ok(())
    }

    /// Per-round thresholds, interpolated linearly from start to end.
    pub fn thresholds(&self) -> Vec<f64> {
        if self.rounds <= 1 {
            return vec![self.threshold_start];
        }
        let step = (self.threshold_end - self.threshold_start) / (self.rounds - 1) as f64;
        (0..self.rounds)
            .map(|round| {
                if round == self.rounds - 1 {
                    self.threshold_end
                } else {
                    self.threshold_start + step * round as f64
                }
            })
            .collect()
    }

    pub fn consensus_settings(&self) -> ConsensusSettings {
        ConsensusSettings {
            noise_filter_increment: self.noise_filter_increment,
            max_peaks: self.max_consensus_peaks,
        }
    }

    /// Overlap between neighbouring precursor bins.
    pub fn window_overlap(&self) -> i32 {
        self.precursor_tolerance.saturating_mul(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = ClusteringParameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.window_overlap(), 2000);
        assert_eq!(params.consensus_settings(), ConsensusSettings::default());
    }

    #[test]
    fn test_huge_tolerance_saturates() {
        let params = ClusteringParameters { precursor_tolerance: i32::MAX, ..Default::default() };
        assert!(params.validate().is_ok());
        assert_eq!(params.window_overlap(), i32::MAX);
    }

    #[test]
    fn test_thresholds_interpolate() {
        let params = ClusteringParameters { threshold_start: 0.5, threshold_end: 0.9, rounds: 5, ..Default::default() };
        let thresholds = params.thresholds();
        assert_eq!(thresholds.len(), 5);
        assert_eq!(thresholds[0], 0.5);
        assert_eq!(thresholds[4], 0.9);
        assert!((thresholds[2] - 0.7).abs() < 1e-12);
        assert!(thresholds.windows(2).all(|w| w[0] <= w[1]));

        let single = ClusteringParameters { rounds: 1, ..Default::default() };
        assert_eq!(single.thresholds(), vec![single.threshold_start]);
    }

    #[test]
    fn test_invalid_parameters() {
        let descending = ClusteringParameters { threshold_start: 0.9, threshold_end: 0.5, ..Default::default() };
        assert!(matches!(
            descending.validate(),
            Err(ClusteringError::InvalidParameter { name: "threshold_end", .. })
        ));

        let no_rounds = ClusteringParameters { rounds: 0, ..Default::default() };
        assert!(no_rounds.validate().is_err());

        let negative = ClusteringParameters { precursor_tolerance: -1, ..Default::default() };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let params: ClusteringParameters =
            serde_json::from_str(r#"{"precursor_tolerance": 50, "similarity": "jaccard_lsh"}"#).unwrap();
        assert_eq!(params.precursor_tolerance, 50);
        assert_eq!(params.similarity, SimilarityKind::JaccardLsh);
        assert_eq!(params.rounds, 5);
    }
}
