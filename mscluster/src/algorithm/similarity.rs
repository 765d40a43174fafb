use std::sync::Arc;

use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, Continuous, ContinuousCDF, DiscreteCDF, Hypergeometric, Normal};

use crate::algorithm::lsh::LshKernels;
use crate::data::spectrum::BinarySpectrum;

/// Degrees of freedom of Fisher's method for two combined p-values.
const FISHER_DEGREES_OF_FREEDOM: f64 = 4.0;

/// Similarity between two quantized spectra.
///
/// Implementations must be symmetric, must not depend on call order and
/// return higher values for more similar spectra. A NaN result is read as
/// "no correlation" by the clustering engine.
pub trait SpectrumSimilarity: Send + Sync {
    fn correlation(&self, a: &BinarySpectrum, b: &BinarySpectrum) -> f64;
}

/// Available similarity implementations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    Jaccard,
    JaccardLsh,
    #[default]
    CombinedFisher,
}

/// Jaccard index of two ascending, duplicate free m/z vectors.
pub fn jaccard_index(a: &[i32], b: &[i32]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let shared = a
        .iter()
        .merge_join_by(b.iter(), |x, y| x.cmp(y))
        .filter(|e| matches!(e, EitherOrBoth::Both(_, _)))
        .count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Jaccard similarity over the m/z bins of two spectra.
///
/// With kernels injected, the MinHash estimate of the cached signatures is
/// returned instead of the exact index.
#[derive(Clone, Debug, Default)]
pub struct JaccardSimilarity {
    kernels: Option<Arc<LshKernels>>,
}

impl JaccardSimilarity {
    pub fn new() -> Self {
        JaccardSimilarity { kernels: None }
    }

    pub fn with_kernels(kernels: Arc<LshKernels>) -> Self {
        JaccardSimilarity { kernels: Some(kernels) }
    }
}

impl SpectrumSimilarity for JaccardSimilarity {
    fn correlation(&self, a: &BinarySpectrum, b: &BinarySpectrum) -> f64 {
        match &self.kernels {
            None => jaccard_index(&a.mz_vector(), &b.mz_vector()),
            Some(kernels) => LshKernels::estimate_jaccard(&kernels.cached_signature(a), &kernels.cached_signature(b)),
        }
    }
}

/// Kendall's tau-b. NaN if either side is constant or fewer than two pairs exist.
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }

    let mut concordant = 0i64;
    let mut discordant = 0i64;
    let mut tied_x = 0i64;
    let mut tied_y = 0i64;

    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 {
                tied_x += 1;
            }
            if dy == 0.0 {
                tied_y += 1;
            }
            if dx == 0.0 || dy == 0.0 {
                continue;
            }
            if (dx > 0.0) == (dy > 0.0) {
                concordant += 1;
            } else {
                discordant += 1;
            }
        }
    }

    let n_pairs = (n * (n - 1) / 2) as i64;
    let denominator = (((n_pairs - tied_x) * (n_pairs - tied_y)) as f64).sqrt();
    if denominator == 0.0 {
        return f64::NAN;
    }
    (concordant - discordant) as f64 / denominator
}

/// The combined hypergeometric / Kendall intensity test of spectra-cluster.
///
/// Shared-peak evidence and intensity rank agreement are turned into two
/// p-values, combined with Fisher's method and reported as
/// `-ln(chi2_4.pdf(statistic))`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CombinedFisherIntensityTest;

impl CombinedFisherIntensityTest {
    pub fn new() -> Self {
        CombinedFisherIntensityTest
    }

    /// Probability of seeing at least `shared` common bins by chance.
    ///
    /// Parameters outside the distribution's support give 1 ("no evidence").
    pub fn hypergeometric_probability(population: i64, peaks_a: usize, peaks_b: usize, shared: usize) -> f64 {
        if shared == 0 || population <= 0 {
            return 1.0;
        }
        // fixed parameter order keeps the score bit-for-bit symmetric
        let successes = peaks_a.min(peaks_b) as u64;
        let draws = peaks_a.max(peaks_b) as u64;
        match Hypergeometric::new(population as u64, successes, draws) {
            Ok(hgt) => hgt.sf(shared as u64 - 1),
            Err(_) => 1.0,
        }
    }

    /// Maps Kendall's tau of the shared intensities to a one-sided p-value
    /// using Normal(0, 2(2k+5) / (9k(k-1))).
    pub fn kendall_probability(intensities_a: &[f64], intensities_b: &[f64]) -> f64 {
        let k = intensities_a.len() as f64;
        if k <= 1.0 {
            return 1.0;
        }

        let tau = kendall_tau_b(intensities_a, intensities_b);
        if tau.is_nan() {
            return 1.0;
        }

        let sd = ((2.0 * (2.0 * k + 5.0)) / (9.0 * k * (k - 1.0))).sqrt();
        match Normal::new(0.0, sd) {
            Ok(normal) => normal.sf(tau),
            Err(_) => 1.0,
        }
    }

    /// Fisher's method; returns `-ln` of the chi-squared (4 dof) density.
    pub fn combine_probabilities(p1: f64, p2: f64) -> f64 {
        let p1 = if p1 == 0.0 { 1.0 } else { p1 };
        let p2 = if p2 == 0.0 { 1.0 } else { p2 };

        let combined = -2.0 * (p1.ln() + p2.ln());
        if combined == 0.0 {
            return 0.0;
        }

        let density = if combined.is_infinite() {
            0.0
        } else {
            match ChiSquared::new(FISHER_DEGREES_OF_FREEDOM) {
                Ok(chi2) => chi2.pdf(combined),
                Err(_) => return f64::NAN,
            }
        };

        -density.ln()
    }
}

impl SpectrumSimilarity for CombinedFisherIntensityTest {
    fn correlation(&self, a: &BinarySpectrum, b: &BinarySpectrum) -> f64 {
        let peaks_a = a.peaks();
        let peaks_b = b.peaks();
        if peaks_a.is_empty() || peaks_b.is_empty() {
            return 0.0;
        }

        let (shared_a, shared_b): (Vec<f64>, Vec<f64>) = peaks_a
            .iter()
            .merge_join_by(peaks_b.iter(), |pa, pb| pa.mz.cmp(&pb.mz))
            .filter_map(|e| match e {
                EitherOrBoth::Both(pa, pb) => Some((pa.intensity as f64, pb.intensity as f64)),
                _ => None,
            })
            .unzip();

        let min_bin = peaks_a[0].mz.min(peaks_b[0].mz) as i64;
        let max_bin = peaks_a[peaks_a.len() - 1].mz.max(peaks_b[peaks_b.len() - 1].mz) as i64;

        let hgt = Self::hypergeometric_probability(max_bin - min_bin, peaks_a.len(), peaks_b.len(), shared_a.len());
        let kendall = Self::kendall_probability(&shared_a, &shared_b);

        Self::combine_probabilities(hgt, kendall)
    }
}

/// The closed set of scorers, selected once at construction.
#[derive(Clone, Debug)]
pub enum Similarity {
    Jaccard(JaccardSimilarity),
    CombinedFisher(CombinedFisherIntensityTest),
}

impl Similarity {
    pub fn from_kind(kind: SimilarityKind, lsh_kernels: usize, lsh_seed: u64) -> Self {
        match kind {
            SimilarityKind::Jaccard => Similarity::Jaccard(JaccardSimilarity::new()),
            SimilarityKind::JaccardLsh => Similarity::Jaccard(JaccardSimilarity::with_kernels(Arc::new(
                LshKernels::new(lsh_kernels, lsh_seed),
            ))),
            SimilarityKind::CombinedFisher => Similarity::CombinedFisher(CombinedFisherIntensityTest::new()),
        }
    }
}

impl SpectrumSimilarity for Similarity {
    fn correlation(&self, a: &BinarySpectrum, b: &BinarySpectrum) -> f64 {
        match self {
            Similarity::Jaccard(s) => s.correlation(a, b),
            Similarity::CombinedFisher(s) => s.correlation(a, b),
        }
    }
}
