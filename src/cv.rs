//! Seeded cross-validation splitters.
//!
//! `KFold` drives the inner hyperparameter search, `RepeatedStratifiedKFold`
//! the outer generalization estimate. Both are deterministic given their
//! seed: the same seed and data always reproduce identical fold assignments.

use std::collections::BTreeMap;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::CvConfig;

/// Train/test row positions of one fold.
pub type Split = (Vec<usize>, Vec<usize>);

/// Cross-validation settings shared by the inner and outer splitters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CvSpec {
    pub n_splits: usize,
    pub n_repeats: usize,
    pub random_state: u64,
    pub shuffle: bool,
}

impl Default for CvSpec {
    fn default() -> Self {
        CvSpec {
            n_splits: 5,
            n_repeats: 1,
            random_state: 42,
            shuffle: true,
        }
    }
}

impl From<CvConfig> for CvSpec {
    fn from(cfg: CvConfig) -> Self {
        CvSpec {
            n_splits: cfg.splits,
            n_repeats: cfg.repeats,
            random_state: cfg.seed,
            shuffle: cfg.shuffle,
        }
    }
}

impl CvSpec {
    /// Plain k-fold for the inner grid search.
    pub fn inner(&self) -> KFold {
        KFold::new(self.n_splits, self.shuffle, self.random_state)
    }

    /// Stratified repeated k-fold for the outer loop.
    pub fn outer(&self) -> RepeatedStratifiedKFold {
        RepeatedStratifiedKFold::new(self.n_splits, self.n_repeats, self.random_state)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: u64,
}

impl KFold {
    pub fn new(n_splits: usize, shuffle: bool, random_state: u64) -> Self {
        KFold {
            n_splits,
            shuffle,
            random_state,
        }
    }

    pub fn split(&self, n_samples: usize) -> Vec<Split> {
        let mut order: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.random_state);
            order.shuffle(&mut rng);
        }

        // the first n % k folds receive one extra sample
        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut splits = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for fold in 0..self.n_splits {
            let size = base + usize::from(fold < extra);
            let mut test: Vec<usize> = order[start..start + size].to_vec();
            let mut train: Vec<usize> = order[..start]
                .iter()
                .chain(order[start + size..].iter())
                .copied()
                .collect();
            test.sort_unstable();
            train.sort_unstable();
            splits.push((train, test));
            start += size;
        }
        splits
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RepeatedStratifiedKFold {
    pub n_splits: usize,
    pub n_repeats: usize,
    pub random_state: u64,
}

impl RepeatedStratifiedKFold {
    pub fn new(n_splits: usize, n_repeats: usize, random_state: u64) -> Self {
        RepeatedStratifiedKFold {
            n_splits,
            n_repeats,
            random_state,
        }
    }

    /// Stratify on the bucket value of each row. Every repetition partitions
    /// all rows disjointly across `n_splits` test sets, with each stratum
    /// spread as evenly as the counts allow.
    pub fn split(&self, strata: &Array1<f64>) -> Vec<Split> {
        let n = strata.len();
        let mut splits = Vec::with_capacity(self.n_splits * self.n_repeats);
        for repeat in 0..self.n_repeats {
            let mut rng = StdRng::seed_from_u64(self.random_state.wrapping_add(repeat as u64));

            // group rows by exact bucket value
            let mut groups: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
            for i in 0..n {
                groups.entry(strata[i].to_bits()).or_default().push(i);
            }

            let mut fold_of = vec![0usize; n];
            let mut offset = 0usize;
            for rows in groups.values() {
                let mut rows = rows.clone();
                rows.shuffle(&mut rng);
                for (j, &row) in rows.iter().enumerate() {
                    fold_of[row] = (offset + j) % self.n_splits;
                }
                offset += rows.len();
            }

            for fold in 0..self.n_splits {
                let test: Vec<usize> = (0..n).filter(|&i| fold_of[i] == fold).collect();
                let train: Vec<usize> = (0..n).filter(|&i| fold_of[i] != fold).collect();
                splits.push((train, test));
            }
        }
        splits
    }
}
