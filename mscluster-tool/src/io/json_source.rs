use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use mscluster::data::spectrum::{BinaryPeak, BinarySpectrum};
use mscluster::io::storage::{PropertyStorage, StoredProperties};
use serde::{Deserialize, Serialize};

use crate::config::ConversionSettings;
use crate::error::{Result, ToolError};

/// One spectrum as stored in the JSON input files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonSpectrum {
    pub id: String,
    /// Precursor m/z in Th.
    pub precursor_mz: f64,
    pub charge: i32,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sequence: Option<String>,
    #[serde(default)]
    pub retention_time: Option<f64>,
}

impl JsonSpectrum {
    /// Maps the spectrum onto integer m/z space. Peaks falling into the same
    /// fragment bin are summed.
    pub fn to_binary(&self, conversion: &ConversionSettings) -> std::result::Result<BinarySpectrum, String> {
        if self.mz.len() != self.intensity.len() {
            return Err(format!(
                "{} m/z values but {} intensities",
                self.mz.len(),
                self.intensity.len()
            ));
        }

        let mut bins: BTreeMap<i32, f64> = BTreeMap::new();
        for (&mz, &intensity) in self.mz.iter().zip(self.intensity.iter()) {
            if !mz.is_finite() || !intensity.is_finite() || mz < 0.0 {
                return Err(format!("invalid peak ({}, {})", mz, intensity));
            }
            if intensity <= 0.0 {
                continue;
            }
            let bin = (mz / conversion.fragment_bin_width).floor() as i32;
            *bins.entry(bin).or_insert(0.0) += intensity;
        }

        let peaks = bins
            .into_iter()
            .map(|(mz, intensity)| BinaryPeak::new(mz, intensity.round().max(1.0) as i32))
            .collect();
        let precursor_mz = (self.precursor_mz * conversion.precursor_scale).round() as i32;

        BinarySpectrum::new(self.id.clone(), precursor_mz, self.charge, peaks).map_err(|e| e.to_string())
    }
}

/// Spectra read from one or more JSON files (each an array of `JsonSpectrum`).
#[derive(Clone, Debug, Default)]
pub struct JsonSpectrumSource {
    entries: Vec<(PathBuf, usize, JsonSpectrum)>,
}

impl JsonSpectrumSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let mut source = JsonSpectrumSource::new();
        for path in paths {
            source.load(path)?;
        }
        Ok(source)
    }

    /// Appends all spectra of `path`.
    pub fn load(&mut self, path: &Path) -> Result<usize> {
        let reader = BufReader::new(File::open(path)?);
        let spectra: Vec<JsonSpectrum> = serde_json::from_reader(reader)?;
        let n = spectra.len();
        self.extend(path, spectra);
        log::info!("Loaded {} spectra from {}", n, path.display());
        Ok(n)
    }

    pub fn extend(&mut self, path: &Path, spectra: Vec<JsonSpectrum>) {
        self.entries
            .extend(spectra.into_iter().enumerate().map(|(idx, s)| (path.to_path_buf(), idx, s)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converted spectra sorted by precursor m/z, then id.
    pub fn binary_spectra(&self, conversion: &ConversionSettings) -> Result<Vec<BinarySpectrum>> {
        let mut spectra = Vec::with_capacity(self.entries.len());
        for (path, index, spectrum) in &self.entries {
            let binary = spectrum.to_binary(conversion).map_err(|reason| ToolError::InvalidSpectrum {
                path: path.clone(),
                index: *index,
                reason,
            })?;
            spectra.push(binary);
        }
        spectra.sort_by(|a, b| a.precursor_mz().cmp(&b.precursor_mz()).then_with(|| a.id().cmp(b.id())));
        Ok(spectra)
    }

    /// Writes the source file, index, title and annotation of every spectrum.
    pub fn store_properties(&self, storage: &dyn PropertyStorage) -> Result<()> {
        for (path, index, spectrum) in &self.entries {
            let id = spectrum.id.as_str();
            storage.put(id, StoredProperties::ORG_FILENAME, &path.display().to_string())?;
            storage.put(id, StoredProperties::FILE_INDEX, &index.to_string())?;
            storage.put(id, StoredProperties::PRECURSOR_MZ, &spectrum.precursor_mz.to_string())?;
            storage.put(id, StoredProperties::CHARGE, &spectrum.charge.to_string())?;
            if let Some(title) = &spectrum.title {
                storage.put(id, StoredProperties::TITLE, title)?;
            }
            if let Some(sequence) = &spectrum.sequence {
                storage.put(id, StoredProperties::SEQUENCE, sequence)?;
            }
            if let Some(rt) = spectrum.retention_time {
                storage.put(id, StoredProperties::RETENTION_TIME, &rt.to_string())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mscluster::io::storage::InMemoryPropertyStorage;

    fn json_spectrum(id: &str, precursor_mz: f64) -> JsonSpectrum {
        JsonSpectrum {
            id: id.to_string(),
            precursor_mz,
            charge: 2,
            mz: vec![100.1, 100.3, 250.0, 99.0],
            intensity: vec![10.0, 5.0, 0.0, 7.6],
            title: Some(format!("title {}", id)),
            sequence: None,
            retention_time: Some(12.5),
        }
    }

    #[test]
    fn test_conversion_bins_and_sums() {
        let binary = json_spectrum("a", 500.2501).to_binary(&ConversionSettings::default()).unwrap();
        assert_eq!(binary.precursor_mz(), 500_250);
        // 100.1 and 100.3 share bin 200, zero intensity peaks are dropped
        assert_eq!(binary.mz_vector(), vec![198, 200]);
        assert_eq!(binary.peaks()[0].intensity, 8);
        assert_eq!(binary.peaks()[1].intensity, 15);
    }

    #[test]
    fn test_mismatched_arrays_fail() {
        let mut spectrum = json_spectrum("a", 500.0);
        spectrum.intensity.pop();
        assert!(spectrum.to_binary(&ConversionSettings::default()).is_err());
    }

    #[test]
    fn test_source_sorts_and_stores_properties() {
        let mut source = JsonSpectrumSource::new();
        source.extend(Path::new("run.json"), vec![json_spectrum("b", 600.0), json_spectrum("a", 500.0)]);

        let spectra = source.binary_spectra(&ConversionSettings::default()).unwrap();
        let ids: Vec<&str> = spectra.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let storage = InMemoryPropertyStorage::new();
        source.store_properties(&storage).unwrap();
        assert_eq!(storage.get("b", StoredProperties::FILE_INDEX).unwrap().as_deref(), Some("0"));
        assert_eq!(storage.get("a", StoredProperties::TITLE).unwrap().as_deref(), Some("title a"));
        assert_eq!(storage.get("a", StoredProperties::ORG_FILENAME).unwrap().as_deref(), Some("run.json"));
    }
}
