use crate::algorithm::assessor::{ComparisonAssessor, MinNumberComparisonsAssessor};
use crate::algorithm::predicate::{ClusterPredicate, Predicate};
use crate::algorithm::similarity::{Similarity, SpectrumSimilarity};
use crate::data::cluster::{Cluster, DuplicatePolicy};
use crate::data::consensus::ConsensusSettings;
use crate::data::spectrum::BinarySpectrum;
use crate::error::{ClusteringError, Result};
use crate::params::ClusteringParameters;

/// Anything the greedy engine can consume: raw spectra in the first round,
/// clusters of the previous round afterwards.
pub trait ClusteringInput: Sized {
    fn id(&self) -> &str;
    fn precursor_mz(&self) -> i32;
    fn precursor_charge(&self) -> i32;
    /// The peak list used for the predicate and the scorer.
    fn comparison_spectrum(&self) -> Option<BinarySpectrum>;
    /// Merges this input into an existing cluster.
    fn absorb_into(self, target: &mut Cluster, policy: DuplicatePolicy) -> Result<()>;
    /// Opens a new cluster seeded from this input.
    fn into_cluster(self, settings: ConsensusSettings) -> Cluster;
}

impl ClusteringInput for BinarySpectrum {
    fn id(&self) -> &str {
        BinarySpectrum::id(self)
    }

    fn precursor_mz(&self) -> i32 {
        BinarySpectrum::precursor_mz(self)
    }

    fn precursor_charge(&self) -> i32 {
        self.charge()
    }

    fn comparison_spectrum(&self) -> Option<BinarySpectrum> {
        Some(self.clone())
    }

    fn absorb_into(self, target: &mut Cluster, _policy: DuplicatePolicy) -> Result<()> {
        target.add_spectra(&[&self]);
        Ok(())
    }

    fn into_cluster(self, settings: ConsensusSettings) -> Cluster {
        Cluster::from_spectrum(&self, settings)
    }
}

impl ClusteringInput for Cluster {
    fn id(&self) -> &str {
        Cluster::id(self)
    }

    fn precursor_mz(&self) -> i32 {
        Cluster::precursor_mz(self)
    }

    fn precursor_charge(&self) -> i32 {
        Cluster::precursor_charge(self)
    }

    fn comparison_spectrum(&self) -> Option<BinarySpectrum> {
        self.consensus_spectrum()
    }

    fn absorb_into(self, target: &mut Cluster, policy: DuplicatePolicy) -> Result<()> {
        target.merge_cluster(self, policy)
    }

    fn into_cluster(self, _settings: ConsensusSettings) -> Cluster {
        self
    }
}

/// Fails if `thresholds` is empty, contains NaN or is not ascending.
pub fn validate_thresholds(thresholds: &[f64]) -> Result<()> {
    if thresholds.is_empty() {
        return Err(ClusteringError::invalid_parameter("thresholds", "at least one round is required"));
    }
    if thresholds.iter().any(|t| t.is_nan()) {
        return Err(ClusteringError::invalid_parameter("thresholds", "NaN threshold"));
    }
    if thresholds.windows(2).any(|w| w[1] < w[0]) {
        return Err(ClusteringError::invalid_parameter(
            "thresholds",
            format!("thresholds must be ascending, got {:?}", thresholds),
        ));
    }
    Ok(())
}

/// Fails with `UnsortedInput` on the first item whose precursor m/z is below its predecessor's.
pub fn check_sorted<I: ClusteringInput>(inputs: &[I]) -> Result<()> {
    for w in inputs.windows(2) {
        if w[1].precursor_mz() < w[0].precursor_mz() {
            return Err(ClusteringError::UnsortedInput {
                id: w[1].id().to_string(),
                mz: w[1].precursor_mz(),
                previous_mz: w[0].precursor_mz(),
            });
        }
    }
    Ok(())
}

/// Greedy, single pass clustering of precursor sorted input.
///
/// Open clusters are kept sorted by their representative precursor m/z; a
/// cluster is closed as soon as no later (larger m/z) input can fall into
/// its tolerance window. Every input joins the best scoring open cluster if
/// that score reaches the round's threshold and opens a new cluster otherwise.
pub struct GreedyClusteringEngine<S, P, A> {
    precursor_tolerance: i32,
    ignore_charge: bool,
    consensus_settings: ConsensusSettings,
    duplicate_policy: DuplicatePolicy,
    similarity: S,
    predicate: P,
    assessor: A,
}

/// The engine as configured from `ClusteringParameters`.
pub type DefaultClusteringEngine = GreedyClusteringEngine<Similarity, Predicate, MinNumberComparisonsAssessor>;

impl DefaultClusteringEngine {
    pub fn from_parameters(params: &ClusteringParameters) -> Result<Self> {
        params.validate()?;
        Ok(GreedyClusteringEngine::new(
            params.precursor_tolerance,
            Similarity::from_kind(params.similarity, params.lsh_kernels, params.lsh_seed),
            Predicate::from_shared_peaks(params.shared_highest_peaks),
            MinNumberComparisonsAssessor::new(params.min_number_comparisons),
        )
        .with_ignore_charge(params.ignore_charge)
        .with_consensus_settings(params.consensus_settings())
        .with_duplicate_policy(params.duplicate_policy))
    }
}

impl<S, P, A> GreedyClusteringEngine<S, P, A>
where
    S: SpectrumSimilarity,
    P: ClusterPredicate,
    A: ComparisonAssessor,
{
    pub fn new(precursor_tolerance: i32, similarity: S, predicate: P, assessor: A) -> Self {
        GreedyClusteringEngine {
            precursor_tolerance,
            ignore_charge: false,
            consensus_settings: ConsensusSettings::default(),
            duplicate_policy: DuplicatePolicy::default(),
            similarity,
            predicate,
            assessor,
        }
    }

    pub fn with_ignore_charge(mut self, ignore_charge: bool) -> Self {
        self.ignore_charge = ignore_charge;
        self
    }

    pub fn with_consensus_settings(mut self, settings: ConsensusSettings) -> Self {
        self.consensus_settings = settings;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn precursor_tolerance(&self) -> i32 {
        self.precursor_tolerance
    }

    pub fn ignore_charge(&self) -> bool {
        self.ignore_charge
    }

    pub fn consensus_settings(&self) -> ConsensusSettings {
        self.consensus_settings
    }

    /// Clusters raw spectra: the first threshold is applied to the spectra,
    /// every following one to the clusters of the round before.
    ///
    /// # Arguments
    ///
    /// * `spectra` - Spectra sorted ascending by precursor m/z.
    /// * `thresholds` - One ascending threshold per round.
    pub fn cluster_spectra(&self, spectra: Vec<BinarySpectrum>, thresholds: &[f64]) -> Result<Vec<Cluster>> {
        validate_thresholds(thresholds)?;
        let mut clusters = self.cluster_round(spectra, thresholds[0])?;
        for &threshold in &thresholds[1..] {
            clusters = self.cluster_round(clusters, threshold)?;
        }
        Ok(clusters)
    }

    /// Runs one round per threshold on already existing clusters.
    pub fn cluster_clusters(&self, clusters: Vec<Cluster>, thresholds: &[f64]) -> Result<Vec<Cluster>> {
        validate_thresholds(thresholds)?;
        let mut clusters = clusters;
        for &threshold in thresholds {
            clusters = self.cluster_round(clusters, threshold)?;
        }
        Ok(clusters)
    }

    /// One greedy pass over precursor sorted input.
    ///
    /// Every input joins the best scoring open cluster within the precursor
    /// tolerance if that score reaches `threshold`, otherwise it opens a new
    /// cluster. The returned clusters are sorted by precursor m/z, then id.
    ///
    /// # Arguments
    ///
    /// * `inputs` - Spectra or clusters sorted ascending by precursor m/z.
    /// * `threshold` - Minimum score needed to join an existing cluster.
    ///
    /// # Errors
    ///
    /// `ClusteringError::UnsortedInput` if `inputs` is not sorted, nothing is
    /// clustered in that case.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mscluster::algorithm::assessor::MinNumberComparisonsAssessor;
    /// # use mscluster::algorithm::engine::GreedyClusteringEngine;
    /// # use mscluster::algorithm::predicate::AnyPeakShared;
    /// # use mscluster::algorithm::similarity::JaccardSimilarity;
    /// # use mscluster::data::spectrum::{BinaryPeak, BinarySpectrum};
    /// let peaks = vec![BinaryPeak::new(100, 10), BinaryPeak::new(200, 20)];
    /// let spectra = vec![
    ///     BinarySpectrum::new("a", 5000, 2, peaks.clone()).unwrap(),
    ///     BinarySpectrum::new("b", 5002, 2, peaks).unwrap(),
    /// ];
    /// let engine = GreedyClusteringEngine::new(
    ///     10,
    ///     JaccardSimilarity::new(),
    ///     AnyPeakShared,
    ///     MinNumberComparisonsAssessor::default(),
    /// );
    /// let clusters = engine.cluster_round(spectra, 0.9).unwrap();
    /// assert_eq!(clusters.len(), 1);
    /// assert_eq!(clusters[0].member_count(), 2);
    /// ```
    pub fn cluster_round<I: ClusteringInput>(&self, inputs: Vec<I>, threshold: f64) -> Result<Vec<Cluster>> {
        check_sorted(&inputs)?;

        let n_inputs = inputs.len();
        let mut open: Vec<Cluster> = Vec::new();
        let mut closed: Vec<Cluster> = Vec::with_capacity(n_inputs);

        for input in inputs {
            let mz = input.precursor_mz();

            // window prune
            let n_closing = open.partition_point(|c| c.precursor_mz().saturating_add(self.precursor_tolerance) < mz);
            closed.extend(open.drain(..n_closing));

            let spectrum = input
                .comparison_spectrum()
                .ok_or_else(|| ClusteringError::invalid_input(input.id(), "input without peaks"))?;

            let candidates = self.candidates(&open, &spectrum);
            let scores = self.score(&open, &candidates, &spectrum);

            let best = scores
                .iter()
                .filter(|(_, score)| !score.is_nan())
                .fold(None, |best: Option<(usize, f64)>, &(idx, score)| match best {
                    Some((_, b)) if b >= score => best,
                    _ => Some((idx, score)),
                });

            let input_id = input.id().to_string();
            let scored: Vec<(usize, String, f64)> = scores
                .iter()
                .map(|&(idx, score)| (idx, open[idx].id().to_string(), score))
                .collect();
            for &(idx, score) in &scores {
                open[idx].record_comparison(&input_id, score);
            }

            let survivor = match best {
                Some((idx, score)) if score >= threshold => {
                    let mut target = open.remove(idx);
                    input.absorb_into(&mut target, self.duplicate_policy)?;
                    for (other_idx, other_id, other_score) in &scored {
                        if *other_idx != idx && !other_score.is_nan() {
                            target.save_comparison_result(other_id, *other_score as f32);
                        }
                    }
                    target
                }
                _ => {
                    let mut cluster = input.into_cluster(self.consensus_settings);
                    for (_, other_id, other_score) in &scored {
                        cluster.record_comparison(other_id, *other_score);
                    }
                    cluster
                }
            };

            let survivor_mz = survivor.precursor_mz();
            let position = open.partition_point(|c| c.precursor_mz() <= survivor_mz);
            open.insert(position, survivor);
        }

        closed.append(&mut open);
        closed.sort_by(|a, b| a.precursor_mz().cmp(&b.precursor_mz()).then_with(|| a.id().cmp(b.id())));

        log::debug!(
            "Greedy round at threshold {}: {} inputs -> {} clusters",
            threshold,
            n_inputs,
            closed.len()
        );

        Ok(closed)
    }

    /// Indices of open clusters within tolerance that pass charge and predicate checks.
    fn candidates(&self, open: &[Cluster], spectrum: &BinarySpectrum) -> Vec<usize> {
        let mz = spectrum.precursor_mz();
        let lower = mz.saturating_sub(self.precursor_tolerance);
        let upper = mz.saturating_add(self.precursor_tolerance);

        open.iter()
            .enumerate()
            .skip_while(|(_, c)| c.precursor_mz() < lower)
            .take_while(|(_, c)| c.precursor_mz() <= upper)
            .filter(|(_, c)| self.ignore_charge || c.precursor_charge() == spectrum.charge())
            .filter(|(_, c)| self.predicate.is_possible_match(c, spectrum))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Scores the candidates; established clusters are skipped once a
    /// provisional match was found.
    fn score(&self, open: &[Cluster], candidates: &[usize], spectrum: &BinarySpectrum) -> Vec<(usize, f64)> {
        let mut scores = Vec::with_capacity(candidates.len());
        let mut have_match = false;

        for &idx in candidates {
            let cluster = &open[idx];
            if have_match && self.assessor.has_enough_comparisons(cluster) {
                continue;
            }
            let consensus = match cluster.consensus_spectrum() {
                Some(c) => c,
                None => continue,
            };
            let score = self.similarity.correlation(spectrum, &consensus);
            if !score.is_nan() {
                have_match = true;
            }
            scores.push((idx, score));
        }

        scores
    }
}
