use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::algorithm::lsh::MinHashSignature;
use crate::error::{ClusteringError, Result};

/// A single peak quantized into integer m/z and intensity bins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct BinaryPeak {
    pub mz: i32,
    pub intensity: i32,
}

impl BinaryPeak {
    pub fn new(mz: i32, intensity: i32) -> Self {
        BinaryPeak { mz, intensity }
    }
}

/// An immutable, quantized spectrum as it enters the clustering engine.
///
/// Peaks are shared through an `Arc`, so cloning a spectrum is O(1). Clones
/// also share the lazily computed MinHash signature.
/// Identity (equality and hashing) is defined by `id` only.
#[derive(Clone, Debug)]
pub struct BinarySpectrum {
    id: String,
    precursor_mz: i32,
    charge: i32,
    peaks: Arc<Vec<BinaryPeak>>,
    signature: Arc<OnceLock<MinHashSignature>>,
}

impl BinarySpectrum {
    /// Constructs a new `BinarySpectrum`.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique identifier of the spectrum.
    /// * `precursor_mz` - Precursor m/z in integer space, must be positive.
    /// * `charge` - Precursor charge.
    /// * `peaks` - Peak list sorted ascending by m/z without duplicate bins.
    ///
    /// # Errors
    ///
    /// Returns `ClusteringError::InvalidInput` if the peak list is empty, unsorted
    /// or the precursor m/z is not positive.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mscluster::data::spectrum::{BinaryPeak, BinarySpectrum};
    /// let spectrum = BinarySpectrum::new("s1", 5000, 2, vec![BinaryPeak::new(100, 10), BinaryPeak::new(200, 20)]).unwrap();
    /// assert_eq!(spectrum.mz_vector(), vec![100, 200]);
    /// ```
    pub fn new(id: impl Into<String>, precursor_mz: i32, charge: i32, peaks: Vec<BinaryPeak>) -> Result<Self> {
        let id = id.into();

        if peaks.is_empty() {
            return Err(ClusteringError::invalid_input(&id, "empty peak list"));
        }
        if precursor_mz <= 0 {
            return Err(ClusteringError::invalid_input(
                &id,
                format!("non-positive precursor m/z {}", precursor_mz),
            ));
        }
        if peaks.windows(2).any(|w| w[0].mz >= w[1].mz) {
            return Err(ClusteringError::invalid_input(&id, "peaks not strictly ascending by m/z"));
        }

        Ok(BinarySpectrum {
            id,
            precursor_mz,
            charge,
            peaks: Arc::new(peaks),
            signature: Arc::default(),
        })
    }

    /// Wraps an already validated, shared peak list and its signature cell (consensus spectra).
    pub(crate) fn from_shared(
        id: &str,
        precursor_mz: i32,
        charge: i32,
        peaks: Arc<Vec<BinaryPeak>>,
        signature: Arc<OnceLock<MinHashSignature>>,
    ) -> Self {
        BinarySpectrum {
            id: id.to_string(),
            precursor_mz,
            charge,
            peaks,
            signature,
        }
    }

    pub(crate) fn signature_cell(&self) -> &OnceLock<MinHashSignature> {
        &self.signature
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn precursor_mz(&self) -> i32 {
        self.precursor_mz
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn peaks(&self) -> &[BinaryPeak] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// The m/z bins of all peaks, ascending.
    pub fn mz_vector(&self) -> Vec<i32> {
        self.peaks.iter().map(|p| p.mz).collect()
    }

    /// Returns the m/z bins of the `n` most intense peaks, sorted ascending by m/z.
    ///
    /// Equal intensities are resolved in favour of the lower m/z.
    pub fn highest_peak_mz(&self, n: usize) -> Vec<i32> {
        if n >= self.peaks.len() {
            return self.mz_vector();
        }

        let mut by_intensity: Vec<&BinaryPeak> = self.peaks.iter().collect();
        by_intensity.sort_by(|a, b| b.intensity.cmp(&a.intensity).then(a.mz.cmp(&b.mz)));

        let mut mz: Vec<i32> = by_intensity.into_iter().take(n).map(|p| p.mz).collect();
        mz.sort_unstable();
        mz
    }
}

impl PartialEq for BinarySpectrum {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BinarySpectrum {}

impl Hash for BinarySpectrum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for BinarySpectrum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BinarySpectrum(id: {}, precursor_mz: {}, charge: {}, peaks: {})",
            self.id,
            self.precursor_mz,
            self.charge,
            self.peaks.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peaks(values: &[(i32, i32)]) -> Vec<BinaryPeak> {
        values.iter().map(|&(mz, i)| BinaryPeak::new(mz, i)).collect()
    }

    #[test]
    fn test_rejects_invalid_spectra() {
        assert!(BinarySpectrum::new("empty", 100, 2, vec![]).is_err());
        assert!(BinarySpectrum::new("zero", 0, 2, peaks(&[(1, 1)])).is_err());
        assert!(BinarySpectrum::new("unsorted", 100, 2, peaks(&[(5, 1), (3, 1)])).is_err());
        assert!(BinarySpectrum::new("duplicate", 100, 2, peaks(&[(5, 1), (5, 2)])).is_err());
    }

    #[test]
    fn test_identity_by_id() {
        let a = BinarySpectrum::new("a", 100, 2, peaks(&[(1, 1)])).unwrap();
        let b = BinarySpectrum::new("a", 900, 3, peaks(&[(7, 9), (8, 1)])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_highest_peak_mz() {
        let s = BinarySpectrum::new("s", 100, 2, peaks(&[(10, 5), (20, 50), (30, 5), (40, 100)])).unwrap();
        assert_eq!(s.highest_peak_mz(2), vec![20, 40]);
        // tie between 10 and 30 resolved towards the lower m/z
        assert_eq!(s.highest_peak_mz(3), vec![10, 20, 40]);
        assert_eq!(s.highest_peak_mz(10), vec![10, 20, 30, 40]);
    }
}
