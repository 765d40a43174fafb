use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use mscluster::data::cluster::Cluster;
use mscluster::data::properties::ClusterProperties;
use mscluster::error::ClusteringError;
use mscluster::io::storage::{ClusterStorage, PropertyStorage, StoredProperties};

use crate::config::ConversionSettings;
use crate::error::Result;

/// Writes the final clusters of a run to a result file.
pub trait ClusteringResultWriter {
    /// Writes the clusters listed in `order` (the sequence returned by
    /// `run_and_store`) in that order, loading each from `clusters`.
    ///
    /// Returns the number of clusters written.
    fn write_result(
        &self,
        path: &Path,
        order: &[ClusterProperties],
        clusters: &dyn ClusterStorage,
        properties: &dyn PropertyStorage,
    ) -> Result<usize>;
}

/// Writes every cluster's consensus spectrum as one NIST MSP library entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct MspWriter {
    conversion: ConversionSettings,
}

impl MspWriter {
    pub fn new(conversion: ConversionSettings) -> Self {
        MspWriter { conversion }
    }

    /// The member sequence if all annotated members agree on one.
    fn consensus_sequence(cluster: &Cluster, properties: &dyn PropertyStorage) -> Result<Option<String>> {
        let mut sequences = BTreeSet::new();
        for id in cluster.member_ids() {
            if let Some(sequence) = properties.get(id, StoredProperties::SEQUENCE)? {
                sequences.insert(sequence);
            }
        }
        Ok(if sequences.len() == 1 { sequences.pop_first() } else { None })
    }

    pub fn write_cluster<W: Write>(&self, out: &mut W, cluster: &Cluster, properties: &dyn PropertyStorage) -> Result<()> {
        let charge = cluster.precursor_charge();
        let precursor = cluster.precursor_mz() as f64 / self.conversion.precursor_scale;
        let peaks = cluster.consensus_builder().consensus_peaks();

        match Self::consensus_sequence(cluster, properties)? {
            Some(sequence) => writeln!(out, "Name: {}/{}", sequence, charge)?,
            None => writeln!(out, "Name: {}", cluster.id())?,
        }
        writeln!(out, "MW: {:.4}", precursor * charge.max(1) as f64)?;
        writeln!(
            out,
            "Comment: Spec=Consensus Parent={:.4} Charge={} Nreps={} Cluster={}",
            precursor,
            charge,
            cluster.member_count(),
            cluster.id()
        )?;
        writeln!(out, "Num peaks: {}", peaks.len())?;
        for (bin, intensity) in peaks {
            writeln!(out, "{:.4}\t{:.1}", bin as f64 * self.conversion.fragment_bin_width, intensity)?;
        }
        writeln!(out)?;
        Ok(())
    }
}

impl ClusteringResultWriter for MspWriter {
    fn write_result(
        &self,
        path: &Path,
        order: &[ClusterProperties],
        clusters: &dyn ClusterStorage,
        properties: &dyn PropertyStorage,
    ) -> Result<usize> {
        let mut out = BufWriter::new(File::create(path)?);
        let mut written = 0;

        for entry in order {
            let cluster = clusters
                .get(&entry.id)?
                .ok_or_else(|| ClusteringError::Storage(format!("cluster {} is missing from storage", entry.id)))?;
            self.write_cluster(&mut out, &cluster, properties)?;
            written += 1;
        }
        out.flush()?;

        log::info!("Wrote {} clusters to {}", written, path.display());
        Ok(written)
    }
}
