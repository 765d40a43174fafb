use serde::{Deserialize, Serialize};

use crate::data::cluster::Cluster;

/// Lightweight projection of a cluster used for binning and bookkeeping
/// without touching consensus peak data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterProperties {
    pub id: String,
    pub precursor_mz: i32,
    pub charge: i32,
    pub member_count: usize,
}

impl ClusterProperties {
    pub fn new(id: impl Into<String>, precursor_mz: i32, charge: i32, member_count: usize) -> Self {
        ClusterProperties {
            id: id.into(),
            precursor_mz,
            charge,
            member_count,
        }
    }
}

impl From<&Cluster> for ClusterProperties {
    fn from(c: &Cluster) -> Self {
        ClusterProperties {
            id: c.id().to_string(),
            precursor_mz: c.precursor_mz(),
            charge: c.precursor_charge(),
            member_count: c.member_count(),
        }
    }
}
