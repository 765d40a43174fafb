use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::algorithm::lsh::MinHashSignature;
use crate::data::spectrum::{BinaryPeak, BinarySpectrum};

pub const DEFAULT_NOISE_FILTER_INCREMENT: usize = 5;
pub const DEFAULT_MAX_CONSENSUS_PEAKS: usize = 50;

/// Settings shared by every consensus builder of one clustering run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct ConsensusSettings {
    /// Number of members after which one more observation of an m/z bin is required.
    pub noise_filter_increment: usize,
    /// Upper bound on the number of peaks in the derived consensus spectrum.
    pub max_peaks: usize,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        ConsensusSettings {
            noise_filter_increment: DEFAULT_NOISE_FILTER_INCREMENT,
            max_peaks: DEFAULT_MAX_CONSENSUS_PEAKS,
        }
    }
}

/// Summed intensity and number of members that contributed to one m/z bin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Encode, Decode)]
pub struct PeakAccumulator {
    pub intensity_sum: f64,
    pub observations: u32,
}

/// Incremental consensus spectrum of one cluster.
///
/// Only sums and counts are kept, never the member spectra, which makes
/// folding one builder into another associative and commutative (up to float
/// rounding). Noise filtering and peak capping happen when the consensus is
/// derived, not while accumulating.
#[derive(Clone, Debug)]
pub struct ConsensusSpectrumBuilder {
    pub(crate) settings: ConsensusSettings,
    pub(crate) n_spectra: usize,
    pub(crate) precursor_mz_sum: i64,
    pub(crate) charge_counts: BTreeMap<i32, usize>,
    pub(crate) bins: BTreeMap<i32, PeakAccumulator>,
    cached_peaks: OnceLock<Arc<Vec<BinaryPeak>>>,
    cached_signature: Arc<OnceLock<MinHashSignature>>,
}

impl ConsensusSpectrumBuilder {
    pub fn new(settings: ConsensusSettings) -> Self {
        ConsensusSpectrumBuilder {
            settings,
            n_spectra: 0,
            precursor_mz_sum: 0,
            charge_counts: BTreeMap::new(),
            bins: BTreeMap::new(),
            cached_peaks: OnceLock::new(),
            cached_signature: Arc::default(),
        }
    }

    pub(crate) fn from_parts(
        settings: ConsensusSettings,
        n_spectra: usize,
        precursor_mz_sum: i64,
        charge_counts: BTreeMap<i32, usize>,
        bins: BTreeMap<i32, PeakAccumulator>,
    ) -> Self {
        ConsensusSpectrumBuilder {
            settings,
            n_spectra,
            precursor_mz_sum,
            charge_counts,
            bins,
            cached_peaks: OnceLock::new(),
            cached_signature: Arc::default(),
        }
    }

    pub fn settings(&self) -> ConsensusSettings {
        self.settings
    }

    pub fn spectra_count(&self) -> usize {
        self.n_spectra
    }

    /// Rounded mean precursor m/z of all members, -1 if empty.
    pub fn precursor_mz(&self) -> i32 {
        if self.n_spectra == 0 {
            return -1;
        }
        (self.precursor_mz_sum as f64 / self.n_spectra as f64).round() as i32
    }

    /// Most frequent member charge (lowest on ties), -1 if empty.
    pub fn precursor_charge(&self) -> i32 {
        self.charge_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(charge, _)| *charge)
            .unwrap_or(-1)
    }

    pub fn add_spectra(&mut self, spectra: &[&BinarySpectrum]) {
        if spectra.is_empty() {
            return;
        }

        for spectrum in spectra {
            self.n_spectra += 1;
            self.precursor_mz_sum += spectrum.precursor_mz() as i64;
            *self.charge_counts.entry(spectrum.charge()).or_insert(0) += 1;

            for peak in spectrum.peaks() {
                let acc = self.bins.entry(peak.mz).or_default();
                acc.intensity_sum += peak.intensity as f64;
                acc.observations += 1;
            }
        }
        self.invalidate();
    }

    /// Folds the accumulated state of `other` into this builder.
    pub fn add_consensus_spectrum(&mut self, other: &ConsensusSpectrumBuilder) {
        if other.n_spectra == 0 {
            return;
        }

        self.n_spectra += other.n_spectra;
        self.precursor_mz_sum += other.precursor_mz_sum;
        for (charge, count) in &other.charge_counts {
            *self.charge_counts.entry(*charge).or_insert(0) += count;
        }
        for (mz, peak) in &other.bins {
            let acc = self.bins.entry(*mz).or_default();
            acc.intensity_sum += peak.intensity_sum;
            acc.observations += peak.observations;
        }
        self.invalidate();
    }

    /// Minimum number of members an m/z bin must be observed in to survive
    /// the noise filter. Grows by one every `noise_filter_increment` members.
    pub fn min_observations(&self) -> u32 {
        let increment = self.settings.noise_filter_increment.max(1);
        (1 + self.n_spectra.saturating_sub(1) / increment) as u32
    }

    /// Derives the consensus peaks as `(mz, average intensity)`, sorted by m/z.
    ///
    /// The average is taken over all members, so a bin seen in few members
    /// is down-weighted accordingly.
    pub fn consensus_peaks(&self) -> Vec<(i32, f64)> {
        if self.n_spectra == 0 {
            return Vec::new();
        }

        let mut min_obs = self.min_observations();
        let max_obs = self.bins.values().map(|p| p.observations).max().unwrap_or(0);
        // never filter the consensus down to nothing
        if max_obs < min_obs {
            min_obs = max_obs;
        }

        let n = self.n_spectra as f64;
        let mut peaks: Vec<(i32, f64)> = self
            .bins
            .iter()
            .filter(|(_, p)| p.observations >= min_obs)
            .map(|(mz, p)| (*mz, p.intensity_sum / n))
            .collect();

        if self.settings.max_peaks > 0 && peaks.len() > self.settings.max_peaks {
            peaks.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            peaks.truncate(self.settings.max_peaks);
            peaks.sort_by_key(|p| p.0);
        }

        peaks
    }

    /// The derived consensus spectrum, `None` while no member was added.
    pub fn consensus_spectrum(&self, id: &str) -> Option<BinarySpectrum> {
        if self.n_spectra == 0 {
            return None;
        }

        let peaks = self.cached_peaks.get_or_init(|| {
            Arc::new(
                self.consensus_peaks()
                    .into_iter()
                    .map(|(mz, intensity)| BinaryPeak::new(mz, intensity.round() as i32))
                    .collect(),
            )
        });

        Some(BinarySpectrum::from_shared(
            id,
            self.precursor_mz(),
            self.precursor_charge(),
            Arc::clone(peaks),
            Arc::clone(&self.cached_signature),
        ))
    }

    fn invalidate(&mut self) {
        self.cached_peaks = OnceLock::new();
        // clones taken before the change keep the old cell
        self.cached_signature = Arc::default();
    }
}
