use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::data::consensus::{ConsensusSettings, ConsensusSpectrumBuilder};
use crate::data::spectrum::BinarySpectrum;
use crate::error::{ClusteringError, Result};

/// Number of best comparison matches a cluster keeps.
pub const SAVED_COMPARISON_MATCHES: usize = 30;

/// Similarity of a cluster against another spectrum or cluster.
///
/// Ordered by similarity, lowest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ComparisonMatch {
    pub spectrum_id: String,
    pub similarity: f32,
}

impl ComparisonMatch {
    pub fn new(spectrum_id: impl Into<String>, similarity: f32) -> Self {
        ComparisonMatch { spectrum_id: spectrum_id.into(), similarity }
    }
}

impl PartialOrd for ComparisonMatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.similarity.total_cmp(&other.similarity))
    }
}

/// Bounded list of the highest scoring comparison matches, sorted ascending.
///
/// The set of known ids is derived lazily and dropped on every mutation.
#[derive(Clone, Debug, Default)]
pub struct BestMatches {
    matches: Vec<ComparisonMatch>,
    lowest_similarity: f32,
    known_ids: OnceLock<HashSet<String>>,
}

impl BestMatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_matches(matches: Vec<ComparisonMatch>) -> Self {
        let mut best = BestMatches::new();
        best.matches = matches;
        best.update();
        best
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn as_slice(&self) -> &[ComparisonMatch] {
        &self.matches
    }

    pub fn lowest_similarity(&self) -> f32 {
        self.lowest_similarity
    }

    /// Stores a match unless the list is full and `similarity` is below the lowest kept one.
    pub fn save(&mut self, id: &str, similarity: f32) {
        if similarity.is_nan() {
            return;
        }
        if self.matches.len() >= SAVED_COMPARISON_MATCHES && similarity < self.lowest_similarity {
            return;
        }
        self.matches.push(ComparisonMatch::new(id, similarity));
        self.update();
    }

    fn extend_excluding(&mut self, matches: &[ComparisonMatch], excluded_id: &str) {
        if matches.is_empty() {
            return;
        }
        self.matches
            .extend(matches.iter().filter(|m| m.spectrum_id != excluded_id).cloned());
        self.update();
    }

    fn remove_id(&mut self, id: &str) {
        let before = self.matches.len();
        self.matches.retain(|m| m.spectrum_id != id);
        if self.matches.len() != before {
            self.update();
        }
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.known_ids
            .get_or_init(|| self.matches.iter().map(|m| m.spectrum_id.clone()).collect())
            .contains(id)
    }

    fn update(&mut self) {
        // stable: among equal scores the earlier inserted entry is evicted first
        self.matches.sort_by(|a, b| a.similarity.total_cmp(&b.similarity));
        if self.matches.len() > SAVED_COMPARISON_MATCHES {
            let excess = self.matches.len() - SAVED_COMPARISON_MATCHES;
            self.matches.drain(..excess);
        }
        self.lowest_similarity = self.matches.first().map(|m| m.similarity).unwrap_or(0.0);
        self.known_ids = OnceLock::new();
    }
}

/// What `merge_cluster` does when both clusters claim the same spectrum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Log a warning and merge anyway.
    #[default]
    Warn,
    /// Refuse the merge with `ClusteringError::DuplicateMembers`.
    Reject,
}

/// A greedy spectral cluster.
///
/// Member spectra are only kept as ids, their peaks live on in the
/// consensus builder.
#[derive(Clone, Debug)]
pub struct Cluster {
    id: String,
    member_ids: BTreeSet<String>,
    consensus: ConsensusSpectrumBuilder,
    best_matches: BestMatches,
    comparison_count: u64,
}

impl Cluster {
    /// Creates an empty cluster. It reports precursor m/z and charge -1 until seeded.
    pub fn new(id: impl Into<String>, settings: ConsensusSettings) -> Self {
        Cluster {
            id: id.into(),
            member_ids: BTreeSet::new(),
            consensus: ConsensusSpectrumBuilder::new(settings),
            best_matches: BestMatches::new(),
            comparison_count: 0,
        }
    }

    /// Creates a singleton cluster that takes over the spectrum's id.
    pub fn from_spectrum(spectrum: &BinarySpectrum, settings: ConsensusSettings) -> Self {
        let mut cluster = Cluster::new(spectrum.id(), settings);
        cluster.add_spectra(&[spectrum]);
        cluster
    }

    pub(crate) fn from_parts(
        id: String,
        member_ids: BTreeSet<String>,
        consensus: ConsensusSpectrumBuilder,
        best_matches: BestMatches,
        comparison_count: u64,
    ) -> Self {
        Cluster { id, member_ids, consensus, best_matches, comparison_count }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn member_ids(&self) -> &BTreeSet<String> {
        &self.member_ids
    }

    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }

    pub fn consensus_builder(&self) -> &ConsensusSpectrumBuilder {
        &self.consensus
    }

    pub fn precursor_mz(&self) -> i32 {
        if self.member_ids.is_empty() {
            return -1;
        }
        self.consensus.precursor_mz()
    }

    pub fn precursor_charge(&self) -> i32 {
        if self.member_ids.is_empty() {
            return -1;
        }
        self.consensus.precursor_charge()
    }

    pub fn consensus_spectrum(&self) -> Option<BinarySpectrum> {
        self.consensus.consensus_spectrum(&self.id)
    }

    pub fn comparison_matches(&self) -> &[ComparisonMatch] {
        self.best_matches.as_slice()
    }

    pub fn comparison_count(&self) -> u64 {
        self.comparison_count
    }

    /// Adds raw spectra. Spectra whose id is already a member are skipped.
    ///
    /// Returns the number of spectra actually added.
    pub fn add_spectra(&mut self, spectra: &[&BinarySpectrum]) -> usize {
        if spectra.is_empty() {
            return 0;
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(spectra.len());
        let mut to_add: Vec<&BinarySpectrum> = Vec::with_capacity(spectra.len());
        for &spectrum in spectra {
            if self.member_ids.contains(spectrum.id()) || !seen.insert(spectrum.id()) {
                log::warn!("Skipping duplicate spectrum {} in cluster {}", spectrum.id(), self.id);
                continue;
            }
            to_add.push(spectrum);
        }

        if to_add.is_empty() {
            return 0;
        }

        self.consensus.add_spectra(&to_add);
        self.member_ids.extend(to_add.iter().map(|s| s.id().to_string()));
        to_add.len()
    }

    /// Absorbs `other`. The id of the cluster with more members survives.
    ///
    /// Consensus state, member ids and comparison counts are combined, best
    /// matches are merged without references to the surviving id.
    ///
    /// # Arguments
    ///
    /// * `other` - The cluster to absorb.
    /// * `policy` - What to do when both clusters share member ids.
    ///
    /// # Errors
    ///
    /// `ClusteringError::DuplicateMembers` under `DuplicatePolicy::Reject` if
    /// the clusters share a member. `self` is left untouched in that case.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mscluster::data::cluster::{Cluster, DuplicatePolicy};
    /// # use mscluster::data::consensus::ConsensusSettings;
    /// # use mscluster::data::spectrum::{BinaryPeak, BinarySpectrum};
    /// let settings = ConsensusSettings::default();
    /// let a = BinarySpectrum::new("a", 5000, 2, vec![BinaryPeak::new(100, 10)]).unwrap();
    /// let b = BinarySpectrum::new("b", 5002, 2, vec![BinaryPeak::new(100, 30)]).unwrap();
    ///
    /// let mut cluster = Cluster::from_spectrum(&a, settings);
    /// cluster.merge_cluster(Cluster::from_spectrum(&b, settings), DuplicatePolicy::Reject).unwrap();
    /// assert_eq!(cluster.member_count(), 2);
    /// assert_eq!(cluster.precursor_mz(), 5001);
    ///
    /// let again = Cluster::from_spectrum(&a, settings);
    /// assert!(cluster.merge_cluster(again, DuplicatePolicy::Reject).is_err());
    /// ```
    pub fn merge_cluster(&mut self, other: Cluster, policy: DuplicatePolicy) -> Result<()> {
        let duplicates = other
            .member_ids
            .iter()
            .filter(|id| self.member_ids.contains(*id))
            .count();

        if duplicates > 0 {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(ClusteringError::DuplicateMembers {
                        source_id: other.id,
                        target_id: self.id.clone(),
                        count: duplicates,
                    });
                }
                DuplicatePolicy::Warn => {
                    log::warn!(
                        "Adding {} duplicate spectra from cluster {} to cluster {}",
                        duplicates,
                        other.id,
                        self.id
                    );
                }
            }
        }

        self.consensus.add_consensus_spectrum(&other.consensus);

        if other.member_ids.len() > self.member_ids.len() {
            self.id = other.id;
        }

        self.member_ids.extend(other.member_ids);
        self.comparison_count += other.comparison_count;

        self.best_matches.remove_id(&self.id);
        self.best_matches.extend_excluding(other.best_matches.as_slice(), &self.id);

        Ok(())
    }

    pub fn save_comparison_result(&mut self, id: &str, similarity: f32) {
        self.best_matches.save(id, similarity);
    }

    /// Counts one scorer invocation against this cluster and keeps the score.
    pub fn record_comparison(&mut self, id: &str, similarity: f64) {
        self.comparison_count += 1;
        if !similarity.is_nan() && id != self.id {
            self.best_matches.save(id, similarity as f32);
        }
    }

    pub fn is_known_comparison_match(&self, id: &str) -> bool {
        self.best_matches.contains_id(id)
    }
}
