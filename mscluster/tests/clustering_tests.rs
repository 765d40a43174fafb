#[cfg(test)]
mod test {
    extern crate mscluster;

    use std::collections::{BTreeMap, BTreeSet};

    use mscluster::algorithm::engine::DefaultClusteringEngine;
    use mscluster::algorithm::similarity::SimilarityKind;
    use mscluster::binning::parallel::ParallelBinnedClustering;
    use mscluster::data::cluster::Cluster;
    use mscluster::data::spectrum::{BinaryPeak, BinarySpectrum};
    use mscluster::io::codec::{decode_cluster, encode_cluster};
    use mscluster::io::storage::{ClusterStorage, InMemoryClusterStorage};
    use mscluster::params::ClusteringParameters;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const ANALYTES: usize = 8;
    const REPLICATES: usize = 12;

    /// Replicate spectra of `ANALYTES` distinct analytes, 1000 m/z units apart,
    /// sorted by precursor m/z. Spectrum ids are `"<analyte>:<replicate>"`.
    fn synthetic_run(seed: u64) -> Vec<BinarySpectrum> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut spectra = Vec::new();

        for analyte in 0..ANALYTES {
            let precursor = 400_000 + analyte as i32 * 1000;

            let mut base: BTreeMap<i32, i32> = BTreeMap::new();
            while base.len() < 40 {
                base.insert(rng.gen_range(100..2000), rng.gen_range(10..1000));
            }
            let dominant: Vec<i32> = base.keys().copied().step_by(13).collect();
            for mz in &dominant {
                base.insert(*mz, 20_000);
            }

            for replicate in 0..REPLICATES {
                let peaks: Vec<BinaryPeak> = base
                    .iter()
                    .filter_map(|(&mz, &intensity)| {
                        if !dominant.contains(&mz) && !rng.gen_bool(0.9) {
                            return None;
                        }
                        let jitter: f64 = rng.gen_range(0.8..1.2);
                        Some(BinaryPeak::new(mz, (intensity as f64 * jitter).round() as i32))
                    })
                    .collect();
                let mz = precursor + rng.gen_range(-3..=3);
                spectra.push(BinarySpectrum::new(format!("{}:{}", analyte, replicate), mz, 2, peaks).unwrap());
            }
        }

        spectra.sort_by(|a, b| a.precursor_mz().cmp(&b.precursor_mz()).then_with(|| a.id().cmp(b.id())));
        spectra
    }

    fn params() -> ClusteringParameters {
        ClusteringParameters {
            precursor_tolerance: 10,
            threshold_start: 5.0,
            threshold_end: 8.0,
            rounds: 5,
            n_threads: 2,
            ..Default::default()
        }
    }

    fn analyte_of(id: &str) -> &str {
        id.split(':').next().unwrap()
    }

    fn member_sets(clusters: &[Cluster]) -> BTreeSet<Vec<String>> {
        clusters.iter().map(|c| c.member_ids().iter().cloned().collect()).collect()
    }

    fn assert_pure_and_complete(clusters: &[Cluster]) {
        let mut seen = BTreeSet::new();
        for cluster in clusters {
            let analytes: BTreeSet<&str> = cluster.member_ids().iter().map(|id| analyte_of(id)).collect();
            assert_eq!(analytes.len(), 1, "cluster {} mixes analytes", cluster.id());
            for id in cluster.member_ids() {
                assert!(seen.insert(id.clone()), "{} is in several clusters", id);
            }
        }
        assert_eq!(seen.len(), ANALYTES * REPLICATES);
    }

    #[test]
    fn test_replicates_form_one_cluster_per_analyte() {
        let runner = ParallelBinnedClustering::new(params()).unwrap();
        let clusters = runner.run_spectra(synthetic_run(1)).unwrap();

        assert_eq!(clusters.len(), ANALYTES);
        assert_pure_and_complete(&clusters);
        for cluster in &clusters {
            assert_eq!(cluster.member_count(), REPLICATES);
            assert_eq!(cluster.precursor_charge(), 2);
        }
    }

    #[test]
    fn test_small_bins_give_the_same_clusters() {
        let params = ClusteringParameters { max_bin_size: 5, ..params() };
        let runner = ParallelBinnedClustering::new(params).unwrap();
        let clusters = runner.run_spectra(synthetic_run(2)).unwrap();

        assert_eq!(clusters.len(), ANALYTES);
        assert_pure_and_complete(&clusters);
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let spectra = synthetic_run(3);
        let first = ParallelBinnedClustering::new(params()).unwrap().run_spectra(spectra.clone()).unwrap();

        let mut single_threaded = params();
        single_threaded.n_threads = 1;
        let second = ParallelBinnedClustering::new(single_threaded).unwrap().run_spectra(spectra).unwrap();

        assert_eq!(member_sets(&first), member_sets(&second));
        let ids: Vec<&str> = first.iter().map(|c| c.id()).collect();
        let ids_again: Vec<&str> = second.iter().map(|c| c.id()).collect();
        assert_eq!(ids, ids_again);
    }

    #[test]
    fn test_cluster_count_never_increases_over_rounds() {
        let params = ClusteringParameters { shared_highest_peaks: 0, ..params() };
        let engine = DefaultClusteringEngine::from_parameters(&params).unwrap();

        let spectra = synthetic_run(4);
        let mut count = spectra.len();
        let thresholds = params.thresholds();
        let mut clusters = engine.cluster_round(spectra, thresholds[0]).unwrap();
        assert!(clusters.len() <= count);

        for &threshold in &thresholds[1..] {
            count = clusters.len();
            clusters = engine.cluster_round(clusters, threshold).unwrap();
            assert!(clusters.len() <= count);
        }
        assert_pure_and_complete(&clusters);
    }

    #[test]
    fn test_lsh_jaccard_scorer() {
        let params = ClusteringParameters {
            similarity: SimilarityKind::JaccardLsh,
            threshold_start: 0.3,
            threshold_end: 0.4,
            rounds: 2,
            ..params()
        };
        let runner = ParallelBinnedClustering::new(params).unwrap();
        let clusters = runner.run_spectra(synthetic_run(5)).unwrap();

        assert_eq!(clusters.len(), ANALYTES);
        assert_pure_and_complete(&clusters);
    }

    #[test]
    fn test_stored_clusters_can_be_clustered_again() {
        let runner = ParallelBinnedClustering::new(params()).unwrap();
        let storage = InMemoryClusterStorage::new();
        let settings = runner.params().consensus_settings();

        // cluster the two halves of every analyte separately
        let (even, odd): (Vec<BinarySpectrum>, Vec<BinarySpectrum>) = synthetic_run(6)
            .into_iter()
            .partition(|s| s.id().ends_with(['0', '2', '4', '6', '8']));
        let first = runner
            .run_and_store(even.iter().map(|s| Cluster::from_spectrum(s, settings)).collect(), &storage)
            .unwrap();
        let second = runner.run_spectra(odd).unwrap();
        assert_eq!(first.len(), ANALYTES);

        let mut merged: Vec<Cluster> = storage
            .keys()
            .unwrap()
            .iter()
            .map(|key| storage.get(key).unwrap().unwrap())
            .chain(second.iter().map(|c| decode_cluster(&encode_cluster(c).unwrap()).unwrap()))
            .collect();
        merged.sort_by(|a, b| a.precursor_mz().cmp(&b.precursor_mz()).then_with(|| a.id().cmp(b.id())));

        let clusters = runner.run(merged).unwrap();
        assert_eq!(clusters.len(), ANALYTES);
        assert_pure_and_complete(&clusters);
    }
}
