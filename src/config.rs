//! Run configuration
//!
//! [`RseConfig`] bundles every parameter the parties of a linkage have to
//! agree on. It is stored as JSON and can be partially overridden from the
//! command line.

use crate::alphabet::Alphabet;
use crate::encoder::{Measure, Threshold};
use crate::error::{Result, RseError};
use crate::frequency::{FrequencyProfile, TargetDistribution};
use crate::generator::ReferenceSetGenerator;
use crate::processor::{DivergenceMetric, RebalanceOptions, MAX_UNIVERSE};
use crate::qgram::QGramMode;
use crate::rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Kind of target distribution; `Profile` takes its weights from a profile
/// file supplied at run time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    #[default]
    Uniform,
    InverseData,
    Profile,
}

/// Shared parameters of one linkage run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RseConfig {
    /// Symbols reference values are drawn from
    pub alphabet: Alphabet,
    /// Q-gram length
    pub q: usize,
    /// Reference value length
    pub k: usize,
    /// Number of reference values (encoding length); a lower bound when
    /// `coverage` is set
    pub m: usize,
    /// Generate so that every q-gram occurs in at least this many values
    pub coverage: Option<usize>,
    pub seed: Option<u64>,
    /// Secret phrase; takes precedence over `seed`
    pub seed_phrase: Option<String>,
    pub qgram_mode: QGramMode,
    pub measure: Measure,
    pub threshold: Threshold,
    /// Derive the top-n count from the data instead of `threshold`
    pub calibrate_top_n: bool,
    /// Upper bound for a calibrated top-n count
    pub top_n_cap: Option<usize>,
    pub target: TargetKind,
    pub divergence: DivergenceMetric,
    pub max_swaps: usize,
    pub candidates_per_swap: usize,
    pub max_sampling_attempts: usize,
}

impl Default for RseConfig {
    fn default() -> Self {
        RseConfig::names()
    }
}

impl RseConfig {
    /// Personal names: lowercase letters, bigrams, short reference values.
    pub fn names() -> Self {
        let rebalance = RebalanceOptions::default();
        RseConfig {
            alphabet: Alphabet::lowercase(),
            q: 2,
            k: 4,
            m: 200,
            coverage: None,
            seed: None,
            seed_phrase: None,
            qgram_mode: QGramMode::Set,
            measure: Measure::Jaccard,
            threshold: Threshold::default(),
            calibrate_top_n: false,
            top_n_cap: None,
            target: TargetKind::Uniform,
            divergence: DivergenceMetric::TotalVariation,
            max_swaps: rebalance.max_swaps,
            candidates_per_swap: rebalance.candidates_per_swap,
            max_sampling_attempts: rebalance.max_sampling_attempts,
        }
    }

    /// Mixed text such as addresses: letters and digits, longer values and
    /// a wider encoding.
    pub fn alphanumeric() -> Self {
        RseConfig {
            alphabet: Alphabet::from_classes(true, true, false)
                .unwrap_or_else(|_| Alphabet::lowercase()),
            k: 6,
            m: 500,
            ..RseConfig::names()
        }
    }

    /// Check every parameter before any work is done.
    pub fn validate(&self) -> Result<()> {
        self.validate_encoding()?;
        if self.q > self.k {
            return Err(RseError::config(format!(
                "q ({}) must not exceed the reference value length k ({})",
                self.q, self.k
            )));
        }
        let generator = ReferenceSetGenerator::new(self.alphabet.clone(), self.k);
        generator.check_capacity(self.m)?;
        if let Some(coverage) = self.coverage {
            generator.check_covering(self.q, coverage)?;
        }
        match self.alphabet.space_size(self.q) {
            Some(u) if u <= MAX_UNIVERSE as u128 => {}
            _ => {
                return Err(RseError::config(format!(
                    "q-gram universe of {} symbols at q = {} exceeds {MAX_UNIVERSE} entries",
                    self.alphabet.len(),
                    self.q
                )))
            }
        }
        if self.candidates_per_swap == 0 || self.max_sampling_attempts == 0 {
            return Err(RseError::config(
                "candidates_per_swap and max_sampling_attempts must be positive",
            ));
        }
        Ok(())
    }

    /// The subset of [`RseConfig::validate`] that encoding depends on.
    ///
    /// Encoding takes `k`, `m` and the symbols from the reference set it is
    /// given, so the alphabet and capacity are not checked here.
    pub fn validate_encoding(&self) -> Result<()> {
        if self.q == 0 {
            return Err(RseError::config("q must be positive"));
        }
        match self.threshold {
            Threshold::Cutoff(x) if !x.is_finite() => {
                return Err(RseError::config("threshold cutoff must be finite"))
            }
            Threshold::TopN(0) => return Err(RseError::config("top-n threshold must be positive")),
            _ => {}
        }
        if self.top_n_cap == Some(0) {
            return Err(RseError::config("top_n_cap must be positive"));
        }
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: RseConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Rebalancing options; `profile` is required for [`TargetKind::Profile`].
    pub fn rebalance_options(&self, profile: Option<FrequencyProfile>) -> Result<RebalanceOptions> {
        let target = match (self.target, profile) {
            (TargetKind::Uniform, _) => TargetDistribution::Uniform,
            (TargetKind::InverseData, _) => TargetDistribution::InverseData,
            (TargetKind::Profile, Some(p)) => TargetDistribution::Profile(p),
            (TargetKind::Profile, None) => {
                return Err(RseError::config("profile target requires a target profile file"))
            }
        };
        Ok(RebalanceOptions {
            target,
            metric: self.divergence,
            max_swaps: self.max_swaps,
            candidates_per_swap: self.candidates_per_swap,
            max_sampling_attempts: self.max_sampling_attempts,
        })
    }

    /// Random source for this run, from `seed_phrase`, `seed` or entropy.
    pub fn rng(&self) -> StdRng {
        rng::from_option(self.seed, self.seed_phrase.as_deref())
    }

    pub fn is_reproducible(&self) -> bool {
        self.seed.is_some() || self.seed_phrase.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn presets_validate() {
        RseConfig::names().validate().unwrap();
        RseConfig::alphanumeric().validate().unwrap();
        assert_eq!(RseConfig::alphanumeric().alphabet.len(), 36);
    }

    #[test]
    fn impossible_parameters_are_rejected() {
        let mut c = RseConfig::names();
        c.q = 5;
        assert!(c.validate().unwrap_err().is_configuration());

        let mut c = RseConfig::names();
        c.alphabet = Alphabet::new("ab").unwrap();
        c.k = 2;
        c.m = 5;
        assert!(c.validate().is_err());

        let mut c = RseConfig::names();
        c.threshold = Threshold::TopN(0);
        assert!(c.validate().is_err());

        let mut c = RseConfig::names();
        c.q = 4;
        c.k = 6;
        c.alphabet = Alphabet::from_classes(true, true, true).unwrap();
        assert!(c.validate().is_err());
    }

    #[test]
    fn encoding_checks_ignore_the_alphabet() {
        let mut c = RseConfig::names();
        c.k = 2;
        c.m = 1000;
        assert!(c.validate().is_err());
        c.validate_encoding().unwrap();
        c.threshold = Threshold::Cutoff(f64::NAN);
        assert!(c.validate_encoding().is_err());
    }

    #[test]
    fn coverage_is_checked() {
        let mut c = RseConfig::names();
        c.coverage = Some(3);
        c.validate().unwrap();
        c.coverage = Some(0);
        assert!(c.validate().is_err());
        c.coverage = Some(26 * 26 + 1);
        assert!(c.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: RseConfig = serde_json::from_str(r#"{"m": 64, "measure": "dice", "threshold": {"top-n": 5}}"#).unwrap();
        assert_eq!(c.m, 64);
        assert_eq!(c.measure, Measure::Dice);
        assert_eq!(c.threshold, Threshold::TopN(5));
        assert_eq!(c.q, 2);
    }

    #[test]
    fn profile_target_needs_profile() {
        let mut c = RseConfig::names();
        c.target = TargetKind::Profile;
        assert!(c.rebalance_options(None).is_err());
        let opts = c.rebalance_options(Some(FrequencyProfile::new())).unwrap();
        assert!(matches!(opts.target, TargetDistribution::Profile(_)));
    }

    #[test]
    fn seeded_config_is_reproducible() {
        let mut c = RseConfig::names();
        c.seed = Some(11);
        assert!(c.is_reproducible());
        let a: u64 = c.rng().gen();
        let b: u64 = c.rng().gen();
        assert_eq!(a, b);
    }
}
