use std::collections::BTreeMap;

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::estimators::{ParamValue, Params};

/// Candidate values per hyperparameter, ordered by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid {
    values: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V: Into<ParamValue>>(mut self, name: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.values
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Size of the Cartesian product; an empty grid has one (default) candidate.
    pub fn n_candidates(&self) -> usize {
        self.values.values().map(Vec::len).product()
    }

    fn check(&self) -> Result<()> {
        if let Some((name, _)) = self.values.iter().find(|(_, v)| v.is_empty()) {
            return Err(TrainerError::InvalidInput(format!(
                "parameter '{}' has no candidate values",
                name
            )));
        }
        Ok(())
    }

    /// Decode a product index; the last parameter name varies fastest.
    fn candidate_at(&self, mut idx: usize) -> Params {
        let mut params = Params::new();
        for (name, values) in self.values.iter().rev() {
            params.insert(name.clone(), values[idx % values.len()].clone());
            idx /= values.len();
        }
        params
    }

    /// Every combination, in enumeration order.
    pub fn candidates(&self) -> Result<Vec<Params>> {
        self.check()?;
        Ok((0..self.n_candidates()).map(|i| self.candidate_at(i)).collect())
    }

    /// Up to `n_iter` distinct combinations drawn without replacement, kept in
    /// enumeration order.
    pub fn sample(&self, n_iter: usize, seed: u64) -> Result<Vec<Params>> {
        self.check()?;
        let total = self.n_candidates();
        if n_iter >= total {
            return self.candidates();
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut picked = index::sample(&mut rng, total, n_iter).into_vec();
        picked.sort_unstable();
        Ok(picked.into_iter().map(|i| self.candidate_at(i)).collect())
    }
}
