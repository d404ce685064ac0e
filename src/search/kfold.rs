use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};

/// One train/validation partition of row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// K-fold splitter. Without shuffling the folds are contiguous blocks and the
/// first `n % k` folds hold one extra row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: u64,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: 0,
        }
    }

    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.random_state = seed;
        self
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>> {
        let k = self.n_splits;
        if k < 2 {
            return Err(TrainerError::InvalidInput(format!(
                "k-fold needs at least 2 splits, got {}",
                k
            )));
        }
        if n_samples < k {
            return Err(TrainerError::InvalidInput(format!(
                "cannot split {} samples into {} folds",
                n_samples, k
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            indices.shuffle(&mut ChaCha8Rng::seed_from_u64(self.random_state));
        }

        let base = n_samples / k;
        let remainder = n_samples % k;
        let mut folds = Vec::with_capacity(k);
        let mut start = 0;
        for fold in 0..k {
            let size = if fold < remainder { base + 1 } else { base };
            let end = start + size;
            folds.push(Fold {
                train: indices[..start].iter().chain(&indices[end..]).copied().collect(),
                test: indices[start..end].to_vec(),
            });
            start = end;
        }
        Ok(folds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_folds_with_remainder() {
        let folds = KFold::new(3).split(8).unwrap();
        assert_eq!(folds[0].test, vec![0, 1, 2]);
        assert_eq!(folds[1].test, vec![3, 4, 5]);
        assert_eq!(folds[2].test, vec![6, 7]);
        assert_eq!(folds[2].train, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_folds_partition_rows() {
        let folds = KFold::new(5).shuffled(42).split(23).unwrap();
        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 23);
            assert!(fold.test.iter().all(|i| !fold.train.contains(i)));
        }
    }

    #[test]
    fn test_invalid_splits() {
        assert!(KFold::new(1).split(10).is_err());
        assert!(KFold::new(5).split(4).is_err());
    }
}
