use std::collections::BTreeMap;

use crate::data::properties::ClusterProperties;
use crate::error::{ClusteringError, Result};

/// One precursor m/z window and the indices of the items it holds.
#[derive(Clone, Debug, PartialEq)]
pub struct PrecursorBin {
    pub index: usize,
    pub lower_mz: i32,
    pub upper_mz: i32,
    /// Set when the population was split by charge.
    pub charge: Option<i32>,
    /// Indices into the binned population, ascending by precursor m/z.
    pub members: Vec<usize>,
}

impl PrecursorBin {
    pub fn center(&self) -> f64 {
        (self.lower_mz as f64 + self.upper_mz as f64) / 2.0
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains_mz(&self, mz: i32) -> bool {
        mz >= self.lower_mz && mz <= self.upper_mz
    }
}

/// Partitions a precursor sorted population into (overlapping) windows.
pub trait ClusterBinner: Send + Sync {
    fn bin(&self, properties: &[ClusterProperties]) -> Result<Vec<PrecursorBin>>;
}

/// Creates windows of roughly `max_bin_size` items where neighbouring
/// windows share every item within `window_overlap` of the boundary.
///
/// Any two items whose precursor m/z differ by at most `window_overlap`
/// end up together in at least one window.
#[derive(Clone, Copy, Debug)]
pub struct SimilarSizedClusterBinner {
    window_overlap: i32,
    max_bin_size: usize,
    split_by_charge: bool,
}

impl SimilarSizedClusterBinner {
    pub fn new(window_overlap: i32, max_bin_size: usize, split_by_charge: bool) -> Self {
        SimilarSizedClusterBinner {
            window_overlap: window_overlap.max(0),
            max_bin_size: max_bin_size.max(1),
            split_by_charge,
        }
    }

    pub fn window_overlap(&self) -> i32 {
        self.window_overlap
    }

    pub fn max_bin_size(&self) -> usize {
        self.max_bin_size
    }

    pub fn split_by_charge(&self) -> bool {
        self.split_by_charge
    }

    /// Window boundaries `(start, end)` (inclusive positions) over ascending m/z values.
    fn windows(&self, mz: &[i32]) -> Vec<(usize, usize)> {
        let n = mz.len();
        let mut windows = Vec::new();
        if n == 0 {
            return windows;
        }

        let extend_equal = |mut end: usize| {
            while end + 1 < n && mz[end + 1] == mz[end] {
                end += 1;
            }
            end
        };
        let next_start = |start: usize, end: usize| {
            let limit = mz[end] as i64 - self.window_overlap as i64;
            start + mz[start..=end].partition_point(|&m| (m as i64) < limit)
        };

        let mut start = 0;
        loop {
            let mut end = extend_equal((start + self.max_bin_size).min(n) - 1);
            if end == n - 1 {
                windows.push((start, end));
                break;
            }

            let mut next = next_start(start, end);
            // the whole window is overlap, grow until the next one can move on
            while next <= start && end < n - 1 {
                end = extend_equal(end + 1);
                next = next_start(start, end);
            }

            windows.push((start, end));
            if end == n - 1 {
                break;
            }
            start = next;
        }

        windows
    }
}

impl ClusterBinner for SimilarSizedClusterBinner {
    fn bin(&self, properties: &[ClusterProperties]) -> Result<Vec<PrecursorBin>> {
        for w in properties.windows(2) {
            if w[1].precursor_mz < w[0].precursor_mz {
                return Err(ClusteringError::UnsortedInput {
                    id: w[1].id.clone(),
                    mz: w[1].precursor_mz,
                    previous_mz: w[0].precursor_mz,
                });
            }
        }

        let mut groups: BTreeMap<Option<i32>, Vec<usize>> = BTreeMap::new();
        for (idx, p) in properties.iter().enumerate() {
            let key = if self.split_by_charge { Some(p.charge) } else { None };
            groups.entry(key).or_default().push(idx);
        }

        let mut bins = Vec::new();
        for (charge, indices) in groups {
            let mz: Vec<i32> = indices.iter().map(|&i| properties[i].precursor_mz).collect();
            for (start, end) in self.windows(&mz) {
                bins.push(PrecursorBin {
                    index: bins.len(),
                    lower_mz: mz[start],
                    upper_mz: mz[end],
                    charge,
                    members: indices[start..=end].to_vec(),
                });
            }
        }

        log::debug!(
            "Binned {} items into {} windows (max size {}, overlap {})",
            properties.len(),
            bins.len(),
            self.max_bin_size,
            self.window_overlap
        );

        Ok(bins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn population(mz: &[i32]) -> Vec<ClusterProperties> {
        mz.iter()
            .enumerate()
            .map(|(i, &m)| ClusterProperties::new(format!("c{}", i), m, 2, 1))
            .collect()
    }

    #[test]
    fn test_every_item_is_binned() {
        let props = population(&(0..2500).map(|i| 1000 + i * 3).collect::<Vec<_>>());
        let bins = SimilarSizedClusterBinner::new(20, 1000, true).bin(&props).unwrap();

        assert!(bins.len() >= 3);
        let mut seen = vec![false; props.len()];
        for bin in &bins {
            assert!(bin.len() >= 1);
            for &i in &bin.members {
                seen[i] = true;
                assert!(bin.contains_mz(props[i].precursor_mz));
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_close_pairs_share_a_bin() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut mz: Vec<i32> = (0..3000).map(|_| rng.gen_range(10_000..60_000)).collect();
        mz.sort_unstable();
        let props = population(&mz);
        let overlap = 40;
        let bins = SimilarSizedClusterBinner::new(overlap, 200, false).bin(&props).unwrap();

        let mut bins_of: Vec<Vec<usize>> = vec![Vec::new(); props.len()];
        for bin in &bins {
            for &i in &bin.members {
                bins_of[i].push(bin.index);
            }
        }

        for i in 0..props.len() {
            for j in (i + 1)..props.len() {
                if mz[j] - mz[i] > overlap {
                    break;
                }
                assert!(
                    bins_of[i].iter().any(|b| bins_of[j].contains(b)),
                    "{} and {} share no bin",
                    mz[i],
                    mz[j]
                );
            }
        }
    }

    #[test]
    fn test_dense_population_grows_window() {
        // all items within the overlap: a single window is the only valid layout
        let props = population(&[100, 101, 102, 103, 104, 105]);
        let bins = SimilarSizedClusterBinner::new(50, 2, false).bin(&props).unwrap();
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].members, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_split_by_charge() {
        let props = vec![
            ClusterProperties::new("a", 100, 2, 1),
            ClusterProperties::new("b", 101, 3, 1),
            ClusterProperties::new("c", 102, 2, 1),
        ];
        let bins = SimilarSizedClusterBinner::new(10, 10, true).bin(&props).unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].charge, Some(2));
        assert_eq!(bins[0].members, vec![0, 2]);
        assert_eq!(bins[1].members, vec![1]);

        let merged = SimilarSizedClusterBinner::new(10, 10, false).bin(&props).unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_unsorted_population_fails() {
        let props = population(&[100, 90]);
        assert!(matches!(
            SimilarSizedClusterBinner::new(10, 10, false).bin(&props),
            Err(ClusteringError::UnsortedInput { .. })
        ));
    }

    #[test]
    fn test_empty_population() {
        assert!(SimilarSizedClusterBinner::new(10, 10, false).bin(&[]).unwrap().is_empty());
    }
}
