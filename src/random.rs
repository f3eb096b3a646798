//! Configurable random value generation.
//!
//! A [`RandomConfig`] describes one of a small, closed set of distributions and
//! [`Randomizer`] draws scalar samples from it. Every initialization path of the
//! engine (agent states, agent traits, mutation on split) and the stochastic
//! action order of the pseudo-continuous mode go through the same generator, so
//! a single seed reproduces a whole run.

use crate::error::{SimError, SimResult};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Rejection-resampling attempts before giving up on a non-negative draw.
const MAX_REJECTIONS: usize = 10_000;

/// Kind of distribution a [`RandomConfig`] draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RandomKind {
    /// Always 0.
    #[default]
    None,
    /// Always `mean`.
    Constant,
    /// Normal with `mean` and `stddev`.
    Normal,
    /// Uniform in `[low, high)`.
    Uniform,
    /// 0 or 1, with `P(1) = mean`.
    Bernoulli,
    /// Resampled from observed `values`, retargeted to `mean`.
    #[serde(alias = "obsvalues")]
    Empirical,
}

/// Distribution configuration.
///
/// Deserializes from a table such as
/// `{ kind = "normal", mean = 100.0, stddev = 10.0 }` or from a bare number,
/// which stands for a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RandomConfigRepr")]
pub struct RandomConfig {
    pub kind: RandomKind,
    /// Used by constant, normal, bernoulli and empirical.
    pub mean: f64,
    /// Used by normal.
    pub stddev: f64,
    /// Used by uniform.
    pub low: f64,
    /// Used by uniform.
    pub high: f64,
    /// Observed values for empirical resampling.
    pub values: Vec<f64>,
    /// Resample negative draws; only honored by normal and uniform.
    pub non_neg: bool,
    #[serde(skip)]
    pub(crate) scale: f64,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self {
            kind: RandomKind::None,
            mean: 0.0,
            stddev: 0.0,
            low: 0.0,
            high: 0.0,
            values: Vec::new(),
            non_neg: true,
            scale: 1.0,
        }
    }
}

impl RandomConfig {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn constant(mean: f64) -> Self {
        Self {
            kind: RandomKind::Constant,
            mean,
            ..Self::default()
        }
    }

    pub fn normal(mean: f64, stddev: f64) -> Self {
        Self {
            kind: RandomKind::Normal,
            mean,
            stddev,
            ..Self::default()
        }
    }

    pub fn uniform(low: f64, high: f64) -> Self {
        Self {
            kind: RandomKind::Uniform,
            low,
            high,
            ..Self::default()
        }
    }

    pub fn bernoulli(mean: f64) -> Self {
        Self {
            kind: RandomKind::Bernoulli,
            mean,
            ..Self::default()
        }
    }

    /// Empirical resampling of `values`; the list is kept sorted.
    pub fn empirical(mean: f64, values: Vec<f64>) -> Self {
        let mut cfg = Self {
            kind: RandomKind::Empirical,
            mean,
            values,
            ..Self::default()
        };
        cfg.sort_values();
        cfg
    }

    /// Toggle the non-negativity constraint.
    pub fn with_non_neg(mut self, non_neg: bool) -> Self {
        self.non_neg = non_neg;
        self
    }

    /// Post-draw scale factor currently applied.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub(crate) fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub(crate) fn sort_values(&mut self) {
        self.values.sort_by(|a, b| a.total_cmp(b));
    }

    /// Check that the configuration can be sampled sensibly.
    ///
    /// When `expected` is given the kind must match it.
    pub fn validate(&self, expected: Option<RandomKind>) -> SimResult<()> {
        if let Some(expected) = expected {
            if expected != self.kind {
                return Err(SimError::UnexpectedRandomKind {
                    expected,
                    found: self.kind,
                });
            }
        }
        match self.kind {
            RandomKind::Normal if self.non_neg && self.mean + 2.0 * self.stddev < 0.0 => {
                Err(SimError::NormalNonNegLowProb {
                    mean: self.mean,
                    stddev: self.stddev,
                })
            }
            RandomKind::Uniform if self.low > self.high => Err(SimError::UniformLowHighSwap {
                low: self.low,
                high: self.high,
            }),
            RandomKind::Uniform if self.non_neg && uniform_non_neg_mass(self.low, self.high) < 0.05 => {
                Err(SimError::UniformNonNegLowProb {
                    low: self.low,
                    high: self.high,
                })
            }
            RandomKind::Bernoulli if !(0.0..=1.0).contains(&self.mean) => {
                Err(SimError::BernoulliMeanOutOfRange(self.mean))
            }
            _ => Ok(()),
        }
    }
}

/// Probability mass of `[low, high)` lying at or above zero.
fn uniform_non_neg_mass(low: f64, high: f64) -> f64 {
    if low == high {
        return if high < 0.0 { 0.0 } else { 1.0 };
    }
    (high / (high - low)).clamp(0.0, 1.0)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RandomConfigRepr {
    Constant(f64),
    Table(RandomConfigTable),
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RandomConfigTable {
    kind: RandomKind,
    mean: f64,
    stddev: f64,
    low: f64,
    high: f64,
    values: Vec<f64>,
    non_neg: bool,
}

impl Default for RandomConfigTable {
    fn default() -> Self {
        let cfg = RandomConfig::default();
        Self {
            kind: cfg.kind,
            mean: cfg.mean,
            stddev: cfg.stddev,
            low: cfg.low,
            high: cfg.high,
            values: cfg.values,
            non_neg: cfg.non_neg,
        }
    }
}

impl From<RandomConfigRepr> for RandomConfig {
    fn from(repr: RandomConfigRepr) -> Self {
        match repr {
            RandomConfigRepr::Constant(mean) => RandomConfig::constant(mean),
            RandomConfigRepr::Table(t) => {
                let mut cfg = RandomConfig {
                    kind: t.kind,
                    mean: t.mean,
                    stddev: t.stddev,
                    low: t.low,
                    high: t.high,
                    values: t.values,
                    non_neg: t.non_neg,
                    scale: 1.0,
                };
                cfg.sort_values();
                cfg
            }
        }
    }
}

/// Seeded random source shared by the whole engine.
pub struct Randomizer {
    rng: ChaCha12Rng,
}

impl Randomizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha12Rng::seed_from_u64(seed),
        }
    }

    /// Restart the stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha12Rng::seed_from_u64(seed);
    }

    /// Draw one value from `cfg`.
    pub fn generate(&mut self, cfg: &RandomConfig) -> f64 {
        let rejectable = cfg.non_neg && matches!(cfg.kind, RandomKind::Normal | RandomKind::Uniform);
        for _ in 0..MAX_REJECTIONS {
            let value = self.draw(cfg);
            if !(rejectable && value < 0.0) {
                return value;
            }
        }
        log::warn!("no non-negative draw from {cfg:?} after {MAX_REJECTIONS} attempts");
        0.0
    }

    /// Draw a switch value; anything but 0 counts as set.
    pub fn generate_bool(&mut self, cfg: &RandomConfig) -> bool {
        self.generate(cfg) != 0.0
    }

    /// Uniform index in `0..len`; `len` must be positive.
    pub fn pick_index(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }

    fn draw(&mut self, cfg: &RandomConfig) -> f64 {
        match cfg.kind {
            RandomKind::None => 0.0,
            RandomKind::Constant => cfg.mean * cfg.scale,
            RandomKind::Normal => {
                let z: f64 = self.rng.sample(StandardNormal);
                (cfg.mean + cfg.stddev * z) * cfg.scale
            }
            RandomKind::Uniform => {
                let u: f64 = self.rng.random();
                (cfg.low + (cfg.high - cfg.low) * u) * cfg.scale
            }
            RandomKind::Bernoulli => {
                let u: f64 = self.rng.random();
                if u < cfg.mean { 1.0 } else { 0.0 }
            }
            RandomKind::Empirical => self.draw_empirical(cfg) * cfg.scale,
        }
    }

    /// Interpolated resample of the sorted observations, normalized so the
    /// expected value equals `cfg.mean`.
    fn draw_empirical(&mut self, cfg: &RandomConfig) -> f64 {
        let vals = &cfg.values;
        let n = vals.len();
        if n < 2 {
            return cfg.mean;
        }

        let norm = (vals[0] + vals.windows(2).map(|w| (w[0] + w[1]) / 2.0).sum::<f64>()) / n as f64;
        if norm == 0.0 {
            return cfg.mean;
        }

        let u: f64 = self.rng.random();
        let pos = u * n as f64;
        let raw = if pos <= 1.0 {
            vals[0]
        } else {
            let i = (pos.floor() as usize).min(n - 1);
            vals[i - 1] + (vals[i] - vals[i - 1]) * (pos - i as f64)
        };
        raw / norm * cfg.mean
    }
}
