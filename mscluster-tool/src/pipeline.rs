use std::path::{Path, PathBuf};
use std::time::Instant;

use mscluster::binning::parallel::ParallelBinnedClustering;
use mscluster::data::cluster::Cluster;
use mscluster::io::storage::{ClusterStorage, InMemoryClusterStorage, InMemoryPropertyStorage, PropertyStorage};

use crate::config::ToolConfig;
use crate::error::Result;
use crate::io::json_source::JsonSpectrumSource;
use crate::io::msp_writer::{ClusteringResultWriter, MspWriter};

/// Counts reported after a finished run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub spectra: usize,
    pub clusters: usize,
}

/// Loads the input files, clusters all spectra and writes the MSP result to `output`.
pub fn run_clustering(config: &ToolConfig, inputs: &[PathBuf], output: &Path) -> Result<RunSummary> {
    config.validate()?;

    let source = JsonSpectrumSource::from_paths(inputs)?;
    let properties = InMemoryPropertyStorage::new();
    source.store_properties(&properties)?;
    let spectra = source.binary_spectra(&config.conversion)?;
    let n_spectra = spectra.len();

    let start = Instant::now();
    let runner = ParallelBinnedClustering::new(config.clustering.clone())?;
    let settings = runner.params().consensus_settings();
    let seeds = spectra
        .iter()
        .map(|s| Cluster::from_spectrum(s, settings))
        .collect();

    let clusters = InMemoryClusterStorage::new();
    let stored = runner.run_and_store(seeds, &clusters)?;
    log::info!(
        "Clustered {} spectra into {} clusters in {:.1} s",
        n_spectra,
        stored.len(),
        start.elapsed().as_secs_f64()
    );

    MspWriter::new(config.conversion).write_result(output, &stored, &clusters, &properties)?;

    clusters.close()?;
    properties.close()?;

    Ok(RunSummary { spectra: n_spectra, clusters: stored.len() })
}
