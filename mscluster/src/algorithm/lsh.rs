use std::borrow::Cow;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::spectrum::BinarySpectrum;

/// 2^61 - 1
const MERSENNE_PRIME: u64 = (1 << 61) - 1;

pub const DEFAULT_LSH_KERNELS: usize = 128;
pub const DEFAULT_LSH_SEED: u64 = 42;

/// A spectrum's MinHash signature together with the kernel set it was built with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinHashSignature {
    seed: u64,
    values: Vec<u64>,
}

impl MinHashSignature {
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    fn built_by(&self, kernels: &LshKernels) -> bool {
        self.seed == kernels.seed && self.values.len() == kernels.len()
    }
}

/// MinHash kernels `h(x) = (a * x + b) mod p` used to reduce m/z vectors to
/// fixed-size signatures whose agreement estimates the Jaccard index.
///
/// Kernels are fully determined by `(n_kernels, seed)`.
#[derive(Clone, Debug)]
pub struct LshKernels {
    kernels: Vec<(u64, u64)>,
    seed: u64,
}

impl LshKernels {
    pub fn new(n_kernels: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let kernels = (0..n_kernels.max(1))
            .map(|_| (rng.gen_range(1..MERSENNE_PRIME), rng.gen_range(0..MERSENNE_PRIME)))
            .collect();
        LshKernels { kernels, seed }
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    fn hash(a: u64, b: u64, x: u64) -> u64 {
        ((a as u128 * x as u128 + b as u128) % MERSENNE_PRIME as u128) as u64
    }

    /// Minimum of every kernel over the given m/z bins.
    pub fn signature(&self, mz: &[i32]) -> Vec<u64> {
        self.kernels
            .iter()
            .map(|&(a, b)| {
                mz.iter()
                    .map(|&x| Self::hash(a, b, x as u32 as u64))
                    .min()
                    .unwrap_or(u64::MAX)
            })
            .collect()
    }

    /// The signature of `spectrum`, computed once and shared by all clones of
    /// the spectrum. Signatures cached for a different kernel set are not reused.
    pub fn cached_signature<'a>(&self, spectrum: &'a BinarySpectrum) -> Cow<'a, [u64]> {
        let cached = spectrum.signature_cell().get_or_init(|| MinHashSignature {
            seed: self.seed,
            values: self.signature(&spectrum.mz_vector()),
        });
        if cached.built_by(self) {
            Cow::Borrowed(cached.values())
        } else {
            Cow::Owned(self.signature(&spectrum.mz_vector()))
        }
    }

    /// Fraction of agreeing signature positions, O(k).
    pub fn estimate_jaccard(sig_a: &[u64], sig_b: &[u64]) -> f64 {
        let k = sig_a.len().min(sig_b.len());
        if k == 0 {
            return 0.0;
        }
        let agreeing = sig_a.iter().zip(sig_b.iter()).filter(|(a, b)| a == b).count();
        agreeing as f64 / k as f64
    }
}
