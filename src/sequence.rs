use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::ConfigError;

/// A stimulus label in `1..=combinations`: a grid cell or a letter index.
pub type Stimulus = u32;

/// How non-match positions are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Non-match positions never repeat their n-back predecessor, so the
    /// match count is exact whenever more than one combination exists.
    #[default]
    Strict,
    /// Non-match positions are drawn uniformly and may match by chance.
    Incidental,
}

/// Ordered stimuli for one modality of one session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence(Vec<Stimulus>);

impl Sequence {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Stimulus> {
        self.0.get(index).copied()
    }

    pub fn as_slice(&self) -> &[Stimulus] {
        &self.0
    }

    /// True when `index` repeats the stimulus `n_back` positions earlier.
    pub fn is_match_at(&self, index: usize, n_back: usize) -> bool {
        if n_back == 0 || index < n_back {
            return false;
        }
        match (self.get(index), self.get(index - n_back)) {
            (Some(current), Some(previous)) => current == previous,
            _ => false,
        }
    }

    /// Number of indices that are n-back matches.
    pub fn match_count(&self, n_back: usize) -> usize {
        (0..self.len())
            .filter(|&i| self.is_match_at(i, n_back))
            .count()
    }
}

impl From<Vec<Stimulus>> for Sequence {
    fn from(values: Vec<Stimulus>) -> Self {
        Self(values)
    }
}

/// `round(size * percent / 100)`, rounding halves away from zero.
pub fn target_match_count(size: usize, percent: u32) -> usize {
    (size as f64 * f64::from(percent) / 100.0).round() as usize
}

/// Produces stimulus sequences with a controlled number of n-back matches.
///
/// Every call advances the same RNG stream, so two consecutive calls yield
/// independent sequences while a fixed seed reproduces the whole series.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    rng: StdRng,
    policy: MatchPolicy,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: MatchPolicy) {
        self.policy = policy;
    }

    /// Generate `size` stimuli from `1..=combinations` with about
    /// `round(size * percent_match / 100)` deliberate n-back matches.
    ///
    /// Only indices `>= n_back` can hold a match, so the quota is capped at
    /// `size - n_back` and is zero when `size <= n_back`.
    pub fn generate(
        &mut self,
        size: usize,
        combinations: usize,
        percent_match: u32,
        n_back: usize,
    ) -> Result<Sequence, ConfigError> {
        if combinations < 1 {
            return Err(ConfigError::InvalidCombinations(combinations));
        }
        let upper = Stimulus::try_from(combinations)
            .map_err(|_| ConfigError::TooManyCombinations(combinations))?;
        if n_back < 1 {
            return Err(ConfigError::InvalidNBack(n_back));
        }
        if percent_match > 100 {
            return Err(ConfigError::InvalidMatchPercentage(percent_match));
        }

        let mut candidates: Vec<usize> = (n_back..size).collect();
        let quota = target_match_count(size, percent_match).min(candidates.len());
        candidates.shuffle(&mut self.rng);
        candidates.truncate(quota);
        candidates.sort_unstable();

        let mut values: Vec<Stimulus> = Vec::with_capacity(size);
        for idx in 0..size {
            let value = if idx < n_back {
                self.random_stimulus(upper, None)
            } else if candidates.binary_search(&idx).is_ok() {
                values[idx - n_back]
            } else {
                let avoid = match self.policy {
                    MatchPolicy::Strict => Some(values[idx - n_back]),
                    MatchPolicy::Incidental => None,
                };
                self.random_stimulus(upper, avoid)
            };
            values.push(value);
        }

        tracing::trace!(
            size,
            combinations,
            percent_match,
            n_back,
            quota,
            "generated sequence"
        );
        Ok(Sequence(values))
    }

    fn random_stimulus(&mut self, upper: Stimulus, avoid: Option<Stimulus>) -> Stimulus {
        match avoid {
            // Draw from the remaining `upper - 1` labels and skip over `excluded`.
            Some(excluded) if upper > 1 => {
                let value = self.rng.gen_range(1..upper);
                if value >= excluded {
                    value + 1
                } else {
                    value
                }
            }
            _ => self.rng.gen_range(1..=upper),
        }
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}
