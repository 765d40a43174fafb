use itertools::{EitherOrBoth, Itertools};

use crate::data::cluster::Cluster;
use crate::data::spectrum::BinarySpectrum;

pub const DEFAULT_SHARED_HIGHEST_PEAKS: usize = 5;

/// Cheap, necessary condition for a cluster and a spectrum to be scored.
///
/// Must never reject a pair the full scorer would accept; accepting too
/// much only costs extra scorer calls.
pub trait ClusterPredicate: Send + Sync {
    fn is_possible_match(&self, cluster: &Cluster, spectrum: &BinarySpectrum) -> bool;
}

fn shared_count(a: &[i32], b: &[i32]) -> usize {
    a.iter()
        .merge_join_by(b.iter(), |x, y| x.cmp(y))
        .filter(|e| matches!(e, EitherOrBoth::Both(_, _)))
        .count()
}

/// The `n_highest` most intense peaks of the consensus and of the spectrum
/// must share at least `min_shared` m/z bins.
#[derive(Clone, Copy, Debug)]
pub struct ShareHighestPeaks {
    pub n_highest: usize,
    pub min_shared: usize,
}

impl ShareHighestPeaks {
    pub fn new(n_highest: usize) -> Self {
        ShareHighestPeaks { n_highest, min_shared: 1 }
    }
}

impl Default for ShareHighestPeaks {
    fn default() -> Self {
        ShareHighestPeaks::new(DEFAULT_SHARED_HIGHEST_PEAKS)
    }
}

impl ClusterPredicate for ShareHighestPeaks {
    fn is_possible_match(&self, cluster: &Cluster, spectrum: &BinarySpectrum) -> bool {
        let consensus = match cluster.consensus_spectrum() {
            Some(c) => c,
            None => return false,
        };
        let top_cluster = consensus.highest_peak_mz(self.n_highest);
        let top_spectrum = spectrum.highest_peak_mz(self.n_highest);
        shared_count(&top_cluster, &top_spectrum) >= self.min_shared.max(1)
    }
}

/// Accepts every pair sharing at least one m/z bin.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyPeakShared;

impl ClusterPredicate for AnyPeakShared {
    fn is_possible_match(&self, cluster: &Cluster, spectrum: &BinarySpectrum) -> bool {
        match cluster.consensus_spectrum() {
            Some(consensus) => shared_count(&consensus.mz_vector(), &spectrum.mz_vector()) > 0,
            None => false,
        }
    }
}

/// Predicate chosen from configuration: `n_highest == 0` disables the top-peak filter.
#[derive(Clone, Copy, Debug)]
pub enum Predicate {
    ShareHighestPeaks(ShareHighestPeaks),
    AnyPeakShared(AnyPeakShared),
}

impl Predicate {
    pub fn from_shared_peaks(n_highest: usize) -> Self {
        if n_highest == 0 {
            Predicate::AnyPeakShared(AnyPeakShared)
        } else {
            Predicate::ShareHighestPeaks(ShareHighestPeaks::new(n_highest))
        }
    }
}

impl ClusterPredicate for Predicate {
    fn is_possible_match(&self, cluster: &Cluster, spectrum: &BinarySpectrum) -> bool {
        match self {
            Predicate::ShareHighestPeaks(p) => p.is_possible_match(cluster, spectrum),
            Predicate::AnyPeakShared(p) => p.is_possible_match(cluster, spectrum),
        }
    }
}
