use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::algorithm::engine::DefaultClusteringEngine;
use crate::binning::binner::{ClusterBinner, PrecursorBin, SimilarSizedClusterBinner};
use crate::data::cluster::Cluster;
use crate::data::properties::ClusterProperties;
use crate::data::spectrum::BinarySpectrum;
use crate::error::{ClusteringError, Result};
use crate::io::storage::ClusterStorage;
use crate::params::ClusteringParameters;

/// Runs the greedy engine on overlapping precursor bins in parallel, round
/// after round, and reconciles the bin results after every round.
pub struct ParallelBinnedClustering<B = SimilarSizedClusterBinner> {
    params: ClusteringParameters,
    binner: B,
}

impl ParallelBinnedClustering<SimilarSizedClusterBinner> {
    /// Bins are split by charge unless charges are ignored.
    pub fn new(params: ClusteringParameters) -> Result<Self> {
        let binner = SimilarSizedClusterBinner::new(params.window_overlap(), params.max_bin_size, !params.ignore_charge);
        Self::with_binner(params, binner)
    }
}

impl<B: ClusterBinner> ParallelBinnedClustering<B> {
    pub fn with_binner(params: ClusteringParameters, binner: B) -> Result<Self> {
        params.validate()?;
        Ok(ParallelBinnedClustering { params, binner })
    }

    pub fn params(&self) -> &ClusteringParameters {
        &self.params
    }

    /// Seeds one singleton cluster per spectrum and clusters them.
    ///
    /// # Arguments
    ///
    /// * `spectra` - Spectra sorted ascending by precursor m/z with unique ids.
    pub fn run_spectra<I>(&self, spectra: I) -> Result<Vec<Cluster>>
    where
        I: IntoIterator<Item = BinarySpectrum>,
    {
        let settings = self.params.consensus_settings();
        let clusters = spectra
            .into_iter()
            .map(|s| Cluster::from_spectrum(&s, settings))
            .collect();
        self.run(clusters)
    }

    /// Clusters `clusters` with one round per configured threshold.
    ///
    /// Every round bins the population, runs the engine on all bins in
    /// parallel and reconciles the bin results. The output is sorted by
    /// precursor m/z, then id.
    ///
    /// # Arguments
    ///
    /// * `clusters` - Clusters sorted ascending by precursor m/z, no spectrum
    ///   may be a member of more than one cluster.
    ///
    /// # Errors
    ///
    /// * `ClusteringError::InvalidInput` for overlapping or empty clusters.
    /// * `ClusteringError::UnsortedInput` if the input is not sorted.
    /// * `ClusteringError::BinTask` if a bin fails, the whole round is dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mscluster::algorithm::similarity::SimilarityKind;
    /// # use mscluster::binning::parallel::ParallelBinnedClustering;
    /// # use mscluster::data::cluster::Cluster;
    /// # use mscluster::data::spectrum::{BinaryPeak, BinarySpectrum};
    /// # use mscluster::params::ClusteringParameters;
    /// let params = ClusteringParameters {
    ///     precursor_tolerance: 10,
    ///     threshold_start: 0.8,
    ///     threshold_end: 0.9,
    ///     rounds: 2,
    ///     similarity: SimilarityKind::Jaccard,
    ///     ..Default::default()
    /// };
    /// let runner = ParallelBinnedClustering::new(params).unwrap();
    /// let settings = runner.params().consensus_settings();
    /// let peaks = vec![BinaryPeak::new(100, 10), BinaryPeak::new(200, 20)];
    /// let clusters: Vec<Cluster> = [("a", 5000), ("b", 5004), ("c", 9000)]
    ///     .iter()
    ///     .map(|&(id, mz)| Cluster::from_spectrum(&BinarySpectrum::new(id, mz, 2, peaks.clone()).unwrap(), settings))
    ///     .collect();
    ///
    /// let result = runner.run(clusters).unwrap();
    /// assert_eq!(result.len(), 2);
    /// ```
    pub fn run(&self, clusters: Vec<Cluster>) -> Result<Vec<Cluster>> {
        check_disjoint(&clusters)?;

        let engine = DefaultClusteringEngine::from_parameters(&self.params)?;
        let pool = self.build_pool()?;
        let thresholds = self.params.thresholds();

        let mut clusters = clusters;
        for (round, &threshold) in thresholds.iter().enumerate() {
            let n_before = clusters.len();
            log::info!(
                "Round {}/{}: clustering {} clusters at threshold {:.3}",
                round + 1,
                thresholds.len(),
                n_before,
                threshold
            );

            clusters = match &pool {
                Some(pool) => pool.install(|| self.cluster_round(&engine, clusters, threshold))?,
                None => self.cluster_round(&engine, clusters, threshold)?,
            };

            log::info!("Round {} finished: {} -> {} clusters", round + 1, n_before, clusters.len());
        }

        Ok(clusters)
    }

    /// Runs the clustering and writes every final cluster to `storage`.
    ///
    /// Returns the properties of the stored clusters in output order
    /// (ascending precursor m/z).
    ///
    /// # Errors
    ///
    /// Everything `run` reports, and `ClusteringError::Storage` for any
    /// failing write.
    pub fn run_and_store<S>(&self, clusters: Vec<Cluster>, storage: &S) -> Result<Vec<ClusterProperties>>
    where
        S: ClusterStorage + ?Sized,
    {
        let clusters = self.run(clusters)?;

        let mut stored = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            storage.put(cluster.id(), cluster).map_err(|e| match e {
                ClusteringError::Storage(_) => e,
                other => ClusteringError::Storage(other.to_string()),
            })?;
            stored.push(ClusterProperties::from(cluster));
        }

        log::info!("Stored {} clusters", stored.len());
        Ok(stored)
    }

    fn build_pool(&self) -> Result<Option<ThreadPool>> {
        if self.params.n_threads == 0 {
            return Ok(None);
        }
        let pool = ThreadPoolBuilder::new().num_threads(self.params.n_threads).build()?;
        Ok(Some(pool))
    }

    fn cluster_round(&self, engine: &DefaultClusteringEngine, items: Vec<Cluster>, threshold: f64) -> Result<Vec<Cluster>> {
        if items.is_empty() {
            return Ok(items);
        }

        let properties: Vec<ClusterProperties> = items.iter().map(ClusterProperties::from).collect();
        let bins = self.binner.bin(&properties)?;

        // a failing bin fails the whole round, sibling results are dropped
        let results: Vec<Vec<Cluster>> = bins
            .par_iter()
            .map(|bin| {
                let input: Vec<Cluster> = bin.members.iter().map(|&i| items[i].clone()).collect();
                engine
                    .cluster_round(input, threshold)
                    .map_err(|e| ClusteringError::BinTask { bin: bin.index, reason: e.to_string() })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut reconciled = reconcile(items, &bins, results)?;
        reconciled.sort_by(|a, b| a.precursor_mz().cmp(&b.precursor_mz()).then_with(|| a.id().cmp(b.id())));
        Ok(reconciled)
    }
}

/// Fails if a spectrum is a member of several input clusters.
fn check_disjoint(clusters: &[Cluster]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for cluster in clusters {
        if cluster.member_count() == 0 {
            return Err(ClusteringError::invalid_input(cluster.id(), "cluster without members"));
        }
        for id in cluster.member_ids() {
            if !seen.insert(id.as_str()) {
                return Err(ClusteringError::invalid_input(
                    id,
                    format!("spectrum is a member of several clusters, last seen in {}", cluster.id()),
                ));
            }
        }
    }
    Ok(())
}

/// Merges the per-bin results of one round into one population.
///
/// Items in the overlap of two bins show up in the results of both. Result
/// clusters are accepted greedily: those combining more input items first,
/// then the one whose precursor lies nearer its bin center, then the lower
/// bin. A result is dropped as soon as one of its items was already taken.
/// Items no accepted result holds are passed on unchanged.
fn reconcile(items: Vec<Cluster>, bins: &[PrecursorBin], results: Vec<Vec<Cluster>>) -> Result<Vec<Cluster>> {
    let mut item_of: HashMap<&str, usize> = HashMap::new();
    for (idx, item) in items.iter().enumerate() {
        for member in item.member_ids() {
            item_of.insert(member.as_str(), idx);
        }
    }

    let mut candidates: Vec<(Reverse<usize>, OrderedFloat<f64>, usize, Cluster, Vec<usize>)> = Vec::new();
    for (pos, clusters) in results.into_iter().enumerate() {
        let center = bins[pos].center();
        for cluster in clusters {
            let mut parts = Vec::with_capacity(cluster.member_count());
            for member in cluster.member_ids() {
                let idx = item_of.get(member.as_str()).copied().ok_or_else(|| {
                    ClusteringError::invalid_input(member, "bin result references an unknown spectrum")
                })?;
                parts.push(idx);
            }
            parts.sort_unstable();
            parts.dedup();

            let distance = (cluster.precursor_mz() as f64 - center).abs();
            candidates.push((Reverse(parts.len()), OrderedFloat(distance), pos, cluster, parts));
        }
    }

    candidates.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
            .then_with(|| a.3.id().cmp(b.3.id()))
    });

    let n_candidates = candidates.len();
    let mut claimed = vec![false; items.len()];
    let mut output = Vec::with_capacity(items.len());
    for (_, _, _, cluster, parts) in candidates {
        if parts.iter().any(|&idx| claimed[idx]) {
            continue;
        }
        for &idx in &parts {
            claimed[idx] = true;
        }
        output.push(cluster);
    }
    let n_accepted = output.len();

    for (idx, item) in items.into_iter().enumerate() {
        if !claimed[idx] {
            output.push(item);
        }
    }

    log::debug!(
        "Reconciled {} bins: {} of {} bin clusters accepted, {} items passed on",
        bins.len(),
        n_accepted,
        n_candidates,
        output.len() - n_accepted
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::similarity::SimilarityKind;
    use crate::data::cluster::DuplicatePolicy;
    use crate::data::spectrum::BinaryPeak;
    use crate::io::storage::InMemoryClusterStorage;

    fn spectrum(id: &str, mz: i32, peaks: &[i32]) -> BinarySpectrum {
        BinarySpectrum::new(id, mz, 2, peaks.iter().map(|&m| BinaryPeak::new(m, 100)).collect()).unwrap()
    }

    fn jaccard_params() -> ClusteringParameters {
        ClusteringParameters {
            precursor_tolerance: 5,
            threshold_start: 0.5,
            threshold_end: 0.8,
            rounds: 3,
            n_threads: 2,
            shared_highest_peaks: 0,
            max_bin_size: 4,
            similarity: SimilarityKind::Jaccard,
            ..Default::default()
        }
    }

    /// Ten groups of three identical spectra, groups 20 m/z units apart.
    fn grouped_spectra() -> Vec<BinarySpectrum> {
        let mut spectra = Vec::new();
        for group in 0..10 {
            for copy in 0..3 {
                let peaks: Vec<i32> = (0..6).map(|p| group * 1000 + p * 10).collect();
                spectra.push(spectrum(&format!("g{}_{}", group, copy), 1000 + group * 20 + copy, &peaks));
            }
        }
        spectra
    }

    fn member_sets(clusters: &[Cluster]) -> Vec<Vec<String>> {
        let mut sets: Vec<Vec<String>> = clusters.iter().map(|c| c.member_ids().iter().cloned().collect()).collect();
        sets.sort();
        sets
    }

    #[test]
    fn test_groups_are_recovered() {
        let params = ClusteringParameters { max_bin_size: 1000, ..jaccard_params() };
        let runner = ParallelBinnedClustering::new(params).unwrap();
        let clusters = runner.run_spectra(grouped_spectra()).unwrap();

        assert_eq!(clusters.len(), 10);
        let total: usize = clusters.iter().map(|c| c.member_count()).sum();
        assert_eq!(total, 30);
        assert!(clusters.windows(2).all(|w| w[0].precursor_mz() <= w[1].precursor_mz()));
    }

    fn singletons(ids: &[(&str, i32)]) -> Vec<Cluster> {
        let settings = jaccard_params().consensus_settings();
        ids.iter()
            .map(|&(id, mz)| Cluster::from_spectrum(&spectrum(id, mz, &[10, 20]), settings))
            .collect()
    }

    fn merged(a: &Cluster, b: &Cluster) -> Cluster {
        let mut cluster = a.clone();
        cluster.merge_cluster(b.clone(), DuplicatePolicy::Reject).unwrap();
        cluster
    }

    fn two_bins() -> Vec<PrecursorBin> {
        vec![
            PrecursorBin { index: 0, lower_mz: 100, upper_mz: 110, charge: None, members: vec![0, 1] },
            PrecursorBin { index: 1, lower_mz: 110, upper_mz: 120, charge: None, members: vec![1, 2] },
        ]
    }

    #[test]
    fn test_boundary_clusters_are_reconciled() {
        let items = singletons(&[("x", 100), ("y", 110), ("z", 120)]);
        let xy = merged(&items[0], &items[1]);
        let yz = merged(&items[1], &items[2]);

        // both merges sit on their bin center, the lower bin wins
        let output = reconcile(items, &two_bins(), vec![vec![xy], vec![yz]]).unwrap();
        assert_eq!(
            member_sets(&output),
            vec![vec!["x".to_string(), "y".to_string()], vec!["z".to_string()]]
        );
    }

    #[test]
    fn test_boundary_singleton_does_not_block_merge() {
        let items = singletons(&[("x", 100), ("y", 110), ("z", 120)]);
        let yz = merged(&items[1], &items[2]);
        let (x, y) = (items[0].clone(), items[1].clone());

        let output = reconcile(items, &two_bins(), vec![vec![x, y], vec![yz]]).unwrap();
        assert_eq!(
            member_sets(&output),
            vec![vec!["x".to_string()], vec!["y".to_string(), "z".to_string()]]
        );
    }

    #[test]
    fn test_small_bins_match_single_bin() {
        // groups of identical spectra 2 units apart, groups 20 units apart
        let mut spectra = Vec::new();
        for group in 0..10 {
            let peaks: Vec<i32> = (0..6).map(|p| group * 1000 + p * 10).collect();
            for copy in 0..3 {
                spectra.push(spectrum(&format!("g{}_{}", group, copy), 1000 + group * 20 + copy * 2, &peaks));
            }
        }

        let single = ParallelBinnedClustering::new(ClusteringParameters { max_bin_size: 1000, ..jaccard_params() })
            .unwrap()
            .run_spectra(spectra.clone())
            .unwrap();
        let binned = ParallelBinnedClustering::new(jaccard_params()).unwrap().run_spectra(spectra).unwrap();

        assert_eq!(single.len(), 10);
        assert!(binned.iter().all(|c| c.member_count() == 3));
        assert_eq!(member_sets(&binned), member_sets(&single));
    }

    #[test]
    fn test_no_spectrum_is_lost_or_duplicated() {
        let mut params = jaccard_params();
        params.max_bin_size = 2;
        params.precursor_tolerance = 30;
        let runner = ParallelBinnedClustering::new(params).unwrap();
        let clusters = runner.run_spectra(grouped_spectra()).unwrap();

        let mut ids: Vec<String> = clusters.iter().flat_map(|c| c.member_ids().iter().cloned()).collect();
        let n = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(n, 30);
        assert_eq!(ids.len(), 30);
        assert!(clusters.len() <= 30);
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let mut single = jaccard_params();
        single.n_threads = 1;
        let mut global = jaccard_params();
        global.n_threads = 0;

        let a = ParallelBinnedClustering::new(single).unwrap().run_spectra(grouped_spectra()).unwrap();
        let b = ParallelBinnedClustering::new(global).unwrap().run_spectra(grouped_spectra()).unwrap();
        assert_eq!(member_sets(&a), member_sets(&b));
    }

    #[test]
    fn test_unsorted_input_fails() {
        let mut spectra = grouped_spectra();
        spectra.reverse();
        let runner = ParallelBinnedClustering::new(jaccard_params()).unwrap();
        assert!(matches!(runner.run_spectra(spectra), Err(ClusteringError::UnsortedInput { .. })));
    }

    #[test]
    fn test_overlapping_clusters_are_rejected() {
        let a = spectrum("a", 1000, &[10, 20]);
        let settings = jaccard_params().consensus_settings();
        let clusters = vec![Cluster::from_spectrum(&a, settings), Cluster::from_spectrum(&a, settings)];
        let runner = ParallelBinnedClustering::new(jaccard_params()).unwrap();
        assert!(matches!(runner.run(clusters), Err(ClusteringError::InvalidInput { .. })));
    }

    #[test]
    fn test_run_and_store() {
        let runner = ParallelBinnedClustering::new(jaccard_params()).unwrap();
        let settings = runner.params().consensus_settings();
        let clusters = grouped_spectra()
            .iter()
            .map(|s| Cluster::from_spectrum(s, settings))
            .collect();

        let storage = InMemoryClusterStorage::new();
        let stored = runner.run_and_store(clusters, &storage).unwrap();
        assert_eq!(stored.len(), 10);
        for props in &stored {
            let cluster = storage.get(&props.id).unwrap().unwrap();
            assert_eq!(cluster.member_count(), props.member_count);
        }
    }

    #[test]
    fn test_storage_failure_aborts() {
        let runner = ParallelBinnedClustering::new(jaccard_params()).unwrap();
        let storage = InMemoryClusterStorage::new();
        storage.close().unwrap();

        let settings = runner.params().consensus_settings();
        let clusters = grouped_spectra()
            .iter()
            .map(|s| Cluster::from_spectrum(s, settings))
            .collect();
        assert!(matches!(runner.run_and_store(clusters, &storage), Err(ClusteringError::Storage(_))));
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let params = ClusteringParameters { rounds: 0, ..jaccard_params() };
        assert!(ParallelBinnedClustering::new(params).is_err());
    }
}
