use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::data::cluster::Cluster;
use crate::error::{ClusteringError, Result};
use crate::io::codec::{decode_cluster, encode_cluster};

/// Keys of the per-spectrum properties kept next to the clusters.
pub struct StoredProperties;

impl StoredProperties {
    pub const ORG_FILENAME: &'static str = "Filename";
    pub const FILE_INDEX: &'static str = "Index";
    pub const TITLE: &'static str = "spectrum title";
    pub const PRECURSOR_MZ: &'static str = "Prec_mz";
    pub const SEQUENCE: &'static str = "Sequence";
    pub const PTMS: &'static str = "PTMs";
    pub const CHARGE: &'static str = "Charge";
    pub const RETENTION_TIME: &'static str = "retention time";
}

/// Key-value store for clusters.
///
/// Writes to one key must be atomic; callers never write the same key
/// concurrently.
pub trait ClusterStorage: Send + Sync {
    fn put(&self, key: &str, cluster: &Cluster) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Cluster>>;
    fn keys(&self) -> Result<Vec<String>>;
    fn close(&self) -> Result<()>;
}

/// String properties of single spectra, e.g. their title or source file.
pub trait PropertyStorage: Send + Sync {
    fn put(&self, spectrum_id: &str, property: &str, value: &str) -> Result<()>;
    fn get(&self, spectrum_id: &str, property: &str) -> Result<Option<String>>;
    /// All property names stored for any spectrum.
    fn available_properties(&self) -> Result<Vec<String>>;
    fn close(&self) -> Result<()>;
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| ClusteringError::Storage(format!("{} lock poisoned", name)))
}

/// Cluster storage backed by a `HashMap` of encoded clusters.
#[derive(Debug)]
pub struct InMemoryClusterStorage {
    entries: Mutex<Option<HashMap<String, Vec<u8>>>>,
}

impl InMemoryClusterStorage {
    pub fn new() -> Self {
        InMemoryClusterStorage { entries: Mutex::new(Some(HashMap::new())) }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries, "cluster storage")
            .map(|entries| entries.as_ref().map_or(0, |e| e.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryClusterStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterStorage for InMemoryClusterStorage {
    fn put(&self, key: &str, cluster: &Cluster) -> Result<()> {
        let bytes = encode_cluster(cluster)?;
        let mut guard = lock(&self.entries, "cluster storage")?;
        let entries = guard
            .as_mut()
            .ok_or_else(|| ClusteringError::Storage(format!("cannot store {}: storage is closed", key)))?;
        entries.insert(key.to_string(), bytes);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Cluster>> {
        let guard = lock(&self.entries, "cluster storage")?;
        let entries = guard
            .as_ref()
            .ok_or_else(|| ClusteringError::Storage("storage is closed".to_string()))?;
        entries.get(key).map(|bytes| decode_cluster(bytes)).transpose()
    }

    fn keys(&self) -> Result<Vec<String>> {
        let guard = lock(&self.entries, "cluster storage")?;
        let entries = guard
            .as_ref()
            .ok_or_else(|| ClusteringError::Storage("storage is closed".to_string()))?;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn close(&self) -> Result<()> {
        lock(&self.entries, "cluster storage")?.take();
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryPropertyStorage {
    properties: Mutex<Option<HashMap<String, BTreeMap<String, String>>>>,
}

impl InMemoryPropertyStorage {
    pub fn new() -> Self {
        InMemoryPropertyStorage { properties: Mutex::new(Some(HashMap::new())) }
    }
}

impl Default for InMemoryPropertyStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStorage for InMemoryPropertyStorage {
    fn put(&self, spectrum_id: &str, property: &str, value: &str) -> Result<()> {
        let mut guard = lock(&self.properties, "property storage")?;
        let properties = guard
            .as_mut()
            .ok_or_else(|| ClusteringError::Storage("property storage is closed".to_string()))?;
        properties
            .entry(spectrum_id.to_string())
            .or_default()
            .insert(property.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, spectrum_id: &str, property: &str) -> Result<Option<String>> {
        let guard = lock(&self.properties, "property storage")?;
        let properties = guard
            .as_ref()
            .ok_or_else(|| ClusteringError::Storage("property storage is closed".to_string()))?;
        Ok(properties.get(spectrum_id).and_then(|p| p.get(property)).cloned())
    }

    fn available_properties(&self) -> Result<Vec<String>> {
        let guard = lock(&self.properties, "property storage")?;
        let properties = guard
            .as_ref()
            .ok_or_else(|| ClusteringError::Storage("property storage is closed".to_string()))?;
        let mut names: Vec<String> = properties.values().flat_map(|p| p.keys().cloned()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn close(&self) -> Result<()> {
        lock(&self.properties, "property storage")?.take();
        Ok(())
    }
}
