use bincode::{config, Decode, Encode};

use crate::data::cluster::{BestMatches, Cluster, ComparisonMatch};
use crate::data::consensus::{ConsensusSettings, ConsensusSpectrumBuilder, PeakAccumulator};
use crate::error::{ClusteringError, Result};

pub const CLUSTER_MAGIC: &[u8; 4] = b"MSCL";
pub const CLUSTER_FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 5;

/// Flat, serializable state of a cluster.
///
/// Holds the consensus accumulators rather than the derived peaks, so a
/// decoded cluster keeps growing exactly like the encoded one would have.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct ClusterRecord {
    pub id: String,
    pub member_ids: Vec<String>,
    pub settings: ConsensusSettings,
    pub n_spectra: u64,
    pub precursor_mz_sum: i64,
    pub charge_counts: Vec<(i32, u64)>,
    pub bins: Vec<(i32, PeakAccumulator)>,
    pub best_matches: Vec<ComparisonMatch>,
    pub comparison_count: u64,
}

impl From<&Cluster> for ClusterRecord {
    fn from(cluster: &Cluster) -> Self {
        let consensus = cluster.consensus_builder();
        ClusterRecord {
            id: cluster.id().to_string(),
            member_ids: cluster.member_ids().iter().cloned().collect(),
            settings: consensus.settings(),
            n_spectra: consensus.n_spectra as u64,
            precursor_mz_sum: consensus.precursor_mz_sum,
            charge_counts: consensus
                .charge_counts
                .iter()
                .map(|(&charge, &count)| (charge, count as u64))
                .collect(),
            bins: consensus.bins.iter().map(|(&mz, &acc)| (mz, acc)).collect(),
            best_matches: cluster.comparison_matches().to_vec(),
            comparison_count: cluster.comparison_count(),
        }
    }
}

impl From<ClusterRecord> for Cluster {
    fn from(record: ClusterRecord) -> Self {
        let consensus = ConsensusSpectrumBuilder::from_parts(
            record.settings,
            record.n_spectra as usize,
            record.precursor_mz_sum,
            record
                .charge_counts
                .into_iter()
                .map(|(charge, count)| (charge, count as usize))
                .collect(),
            record.bins.into_iter().collect(),
        );
        Cluster::from_parts(
            record.id,
            record.member_ids.into_iter().collect(),
            consensus,
            BestMatches::from_matches(record.best_matches),
            record.comparison_count,
        )
    }
}

/// Encodes a cluster as `MSCL`, a version byte and the bincode payload.
pub fn encode_cluster(cluster: &Cluster) -> Result<Vec<u8>> {
    let payload = bincode::encode_to_vec(ClusterRecord::from(cluster), config::standard())
        .map_err(|e| ClusteringError::Codec(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(CLUSTER_MAGIC);
    bytes.push(CLUSTER_FORMAT_VERSION);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode_cluster(bytes: &[u8]) -> Result<Cluster> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != CLUSTER_MAGIC {
        return Err(ClusteringError::Codec("missing cluster header".to_string()));
    }
    if bytes[4] != CLUSTER_FORMAT_VERSION {
        return Err(ClusteringError::Codec(format!(
            "unsupported cluster format version {} (expected {})",
            bytes[4], CLUSTER_FORMAT_VERSION
        )));
    }

    let (record, read): (ClusterRecord, usize) = bincode::decode_from_slice(&bytes[HEADER_LEN..], config::standard())
        .map_err(|e| ClusteringError::Codec(e.to_string()))?;
    if HEADER_LEN + read != bytes.len() {
        return Err(ClusteringError::Codec(format!(
            "{} trailing bytes after cluster {}",
            bytes.len() - HEADER_LEN - read,
            record.id
        )));
    }

    Ok(Cluster::from(record))
}
