use crate::data::cluster::Cluster;

pub const DEFAULT_MIN_NUMBER_COMPARISONS: u64 = 10_000;

/// Decides whether a cluster was compared often enough to be skipped once
/// a provisional best match exists.
pub trait ComparisonAssessor: Send + Sync {
    fn has_enough_comparisons(&self, cluster: &Cluster) -> bool;
}

#[derive(Clone, Copy, Debug)]
pub struct MinNumberComparisonsAssessor {
    pub min_comparisons: u64,
}

impl MinNumberComparisonsAssessor {
    pub fn new(min_comparisons: u64) -> Self {
        MinNumberComparisonsAssessor { min_comparisons }
    }
}

impl Default for MinNumberComparisonsAssessor {
    fn default() -> Self {
        MinNumberComparisonsAssessor::new(DEFAULT_MIN_NUMBER_COMPARISONS)
    }
}

impl ComparisonAssessor for MinNumberComparisonsAssessor {
    fn has_enough_comparisons(&self, cluster: &Cluster) -> bool {
        cluster.comparison_count() >= self.min_comparisons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::consensus::ConsensusSettings;

    #[test]
    fn test_threshold_on_comparison_count() {
        let assessor = MinNumberComparisonsAssessor::new(2);
        let mut cluster = Cluster::new("c", ConsensusSettings::default());
        assert!(!assessor.has_enough_comparisons(&cluster));
        cluster.record_comparison("a", 1.0);
        cluster.record_comparison("b", 1.0);
        assert!(assessor.has_enough_comparisons(&cluster));
    }
}
