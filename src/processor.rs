//! Frequency-based reference set rebalancing
//!
//! Skewed plaintext q-gram frequencies leak through encoded bit frequencies
//! when reference values containing common q-grams are over-represented.
//! The processor swaps such values for freshly drawn candidates built from
//! under-represented q-grams, accepting a swap only when it strictly lowers a
//! divergence between the reference set's own q-gram profile and a target
//! distribution.
//!
//! The search is a bounded loop: one swap attempt per iteration, at most
//! `max_swaps` iterations. Within an attempt, candidates are drawn
//! sequentially from the caller's random source and scored in parallel.

use crate::alphabet::Alphabet;
use crate::error::{Result, RseError};
use crate::frequency::{FrequencyProfile, TargetDistribution};
use crate::reference::{ReferenceSet, ReferenceValue};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Largest q-gram universe (|alphabet|^q) the processor will index.
pub const MAX_UNIVERSE: usize = 1 << 20;

/// A candidate must beat the current divergence by more than this.
const IMPROVEMENT_EPSILON: f64 = 1e-12;

/// Total sampling mass spread evenly over the universe so that q-grams with
/// no deficit stay reachable.
const SAMPLING_FLOOR: f64 = 1e-3;

/// Scalar measure of how far the reference set's q-gram profile is from the
/// target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DivergenceMetric {
    /// ½ Σ |P − T|
    #[default]
    TotalVariation,
    /// Σ (P − T)² / T
    ChiSquared,
    /// Spread (max − min) of the per-value mean data weight of q-grams
    WeightSpread,
}

impl DivergenceMetric {
    fn term(self, p: f64, t: f64) -> f64 {
        match self {
            DivergenceMetric::TotalVariation => 0.5 * (p - t).abs(),
            DivergenceMetric::ChiSquared => (p - t) * (p - t) / t,
            DivergenceMetric::WeightSpread => 0.0,
        }
    }
}

/// Parameters of a rebalancing pass.
#[derive(Clone, Debug)]
pub struct RebalanceOptions {
    pub target: TargetDistribution,
    pub metric: DivergenceMetric,
    /// Upper bound on swap attempts
    pub max_swaps: usize,
    /// Candidates drawn and scored per swap attempt
    pub candidates_per_swap: usize,
    /// Redraws allowed when a candidate collides with an existing value
    pub max_sampling_attempts: usize,
}

impl Default for RebalanceOptions {
    fn default() -> Self {
        RebalanceOptions {
            target: TargetDistribution::Uniform,
            metric: DivergenceMetric::TotalVariation,
            max_swaps: 1000,
            candidates_per_swap: 8,
            max_sampling_attempts: 32,
        }
    }
}

/// Why the swap loop ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// No slot held an over-represented q-gram
    #[default]
    Converged,
    /// Every remaining slot failed to find an improving candidate
    Exhausted,
    /// `max_swaps` attempts were made
    SwapLimit,
}

/// Outcome counters of a rebalancing pass.
///
/// A non-zero `degraded_slots` is the degraded-improvement signal: some slots
/// ran out of improving candidates. The returned set is still valid and no
/// worse than the input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceSummary {
    pub attempts: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub degraded_slots: usize,
    pub sampling_failures: usize,
    pub slots_modified: usize,
    pub initial_divergence: f64,
    pub final_divergence: f64,
    /// Divergence after each accepted swap
    pub trajectory: Vec<f64>,
    pub stop_reason: StopReason,
}

impl RebalanceSummary {
    pub fn is_degraded(&self) -> bool {
        self.degraded_slots > 0
    }
}

/// A rebalanced set together with its summary.
#[derive(Clone, Debug)]
pub struct Rebalanced {
    pub reference_set: ReferenceSet,
    pub summary: RebalanceSummary,
}

/// Rebalances reference sets over a fixed alphabet and q-gram length.
#[derive(Clone, Debug)]
pub struct ReferenceSetProcessor {
    alphabet: Alphabet,
    q: usize,
    options: RebalanceOptions,
}

impl ReferenceSetProcessor {
    pub fn new(alphabet: Alphabet, q: usize, options: RebalanceOptions) -> Self {
        Self { alphabet, q, options }
    }

    pub fn options(&self) -> &RebalanceOptions {
        &self.options
    }

    /// Current divergence of `set` under this processor's metric and target.
    pub fn divergence(&self, set: &ReferenceSet, data: &FrequencyProfile) -> Result<f64> {
        Ok(Basis::build(&self.alphabet, self.q, &self.options, set, data)?.divergence())
    }

    /// Run a rebalancing pass.
    ///
    /// # Examples
    ///
    /// ```
    /// use rse::{Alphabet, FrequencyProfile, RebalanceOptions, ReferenceSetGenerator, ReferenceSetProcessor};
    /// use rse::rng::seeded;
    ///
    /// let alphabet = Alphabet::new("abcd").unwrap();
    /// let set = ReferenceSetGenerator::new(alphabet.clone(), 4).generate(20, &mut seeded(1)).unwrap();
    /// let mut data = FrequencyProfile::new();
    /// data.insert("ab", 50.0);
    ///
    /// let processor = ReferenceSetProcessor::new(alphabet, 2, RebalanceOptions::default());
    /// let before = processor.divergence(&set, &data).unwrap();
    /// let out = processor.rebalance(set, &data, &mut seeded(2)).unwrap();
    /// assert_eq!(out.reference_set.len(), 20);
    /// assert!(out.summary.final_divergence <= before);
    /// ```
    pub fn rebalance<R: Rng + ?Sized>(
        &self,
        mut set: ReferenceSet,
        data: &FrequencyProfile,
        rng: &mut R,
    ) -> Result<Rebalanced> {
        let opts = &self.options;
        if opts.candidates_per_swap == 0 || opts.max_sampling_attempts == 0 {
            return Err(RseError::config(
                "candidates_per_swap and max_sampling_attempts must be positive",
            ));
        }
        let mut basis = Basis::build(&self.alphabet, self.q, opts, &set, data)?;
        let mut current = basis.divergence();
        let mut summary = RebalanceSummary {
            initial_divergence: current,
            ..RebalanceSummary::default()
        };
        info!(
            m = set.len(),
            k = set.value_len(),
            q = self.q,
            universe = basis.universe_len(),
            metric = ?opts.metric,
            divergence = current,
            "starting reference set rebalancing"
        );

        let mut sampler = basis.sampler()?;
        let mut present: HashSet<String> = set.iter().map(|v| v.as_str().to_owned()).collect();
        let mut exhausted = vec![false; set.len()];
        let mut degraded = BTreeSet::new();
        let mut modified = BTreeSet::new();

        summary.stop_reason = loop {
            if summary.attempts >= opts.max_swaps {
                break StopReason::SwapLimit;
            }
            let Some(slot) = basis.pick_slot(&exhausted) else {
                break if exhausted.iter().any(|&e| e) {
                    StopReason::Exhausted
                } else {
                    StopReason::Converged
                };
            };
            summary.attempts += 1;

            let mut candidates = Vec::with_capacity(opts.candidates_per_swap);
            for _ in 0..opts.candidates_per_swap {
                match basis.draw_candidate(&sampler, &present, opts.max_sampling_attempts, rng) {
                    Some(c) => candidates.push(c),
                    None => summary.sampling_failures += 1,
                }
            }

            let best = candidates
                .par_iter()
                .enumerate()
                .map(|(i, grams)| (basis.divergence_with(slot, grams, current), i))
                .collect::<Vec<_>>()
                .into_iter()
                .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            match best {
                Some((div, i)) if div < current - IMPROVEMENT_EPSILON => {
                    let grams = candidates.swap_remove(i);
                    let value = ReferenceValue::new(basis.spell(&grams));
                    present.insert(value.as_str().to_owned());
                    let old = set.replace(slot, value);
                    present.remove(old.as_str());
                    basis.apply(slot, grams);
                    sampler = basis.sampler()?;

                    current = basis.divergence();
                    summary.trajectory.push(current);
                    summary.accepted += 1;
                    modified.insert(slot);
                    exhausted.fill(false);
                    debug!(slot, replaced = %old, divergence = current, "accepted swap");
                }
                _ => {
                    summary.rejected += 1;
                    exhausted[slot] = true;
                    degraded.insert(slot);
                    debug!(slot, candidates = candidates.len(), "no improving candidate for slot");
                }
            }
        };

        summary.final_divergence = current;
        summary.degraded_slots = degraded.len();
        summary.slots_modified = modified.len();
        info!(
            attempts = summary.attempts,
            accepted = summary.accepted,
            rejected = summary.rejected,
            initial = summary.initial_divergence,
            final_divergence = summary.final_divergence,
            stop = ?summary.stop_reason,
            "finished reference set rebalancing"
        );
        if summary.is_degraded() {
            warn!(
                degraded_slots = summary.degraded_slots,
                sampling_failures = summary.sampling_failures,
                "rebalancing left slots without an improving candidate"
            );
        }

        Ok(Rebalanced {
            reference_set: set,
            summary,
        })
    }
}

/// Candidate sampling weights, fixed between accepted swaps.
struct Sampler {
    first: WeightedIndex<f64>,
    weights: Vec<f64>,
}

/// Indexed bookkeeping for one pass: q-grams are identified by their rank
/// in the alphabet's lexicographic enumeration.
struct Basis<'a> {
    alphabet: &'a Alphabet,
    q: usize,
    k: usize,
    metric: DivergenceMetric,
    target: Vec<f64>,
    weight: Vec<f64>,
    counts: Vec<f64>,
    windows_total: f64,
    slot_grams: Vec<Vec<usize>>,
    slot_mean: Vec<f64>,
}

impl<'a> Basis<'a> {
    fn build(
        alphabet: &'a Alphabet,
        q: usize,
        opts: &RebalanceOptions,
        set: &ReferenceSet,
        data: &FrequencyProfile,
    ) -> Result<Self> {
        let k = set.value_len();
        if q == 0 || q > k {
            return Err(RseError::config(format!(
                "q-gram length {q} must be between 1 and the reference value length {k}"
            )));
        }
        let universe_len = alphabet
            .space_size(q)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n <= MAX_UNIVERSE)
            .ok_or_else(|| {
                RseError::config(format!(
                    "q-gram universe of {} symbols with q = {q} exceeds {MAX_UNIVERSE} entries",
                    alphabet.len()
                ))
            })?;
        set.check_alphabet(alphabet)?;

        let universe: Vec<String> = (0..universe_len).map(|i| alphabet.string_at(i, q)).collect();
        let target = opts.target.probabilities(&universe, data);
        let weight: Vec<f64> = universe.iter().map(|g| data.weight(g)).collect();

        let mut basis = Basis {
            alphabet,
            q,
            k,
            metric: opts.metric,
            target,
            weight,
            counts: vec![0.0; universe_len],
            windows_total: (set.len() * (k - q + 1)) as f64,
            slot_grams: Vec::with_capacity(set.len()),
            slot_mean: Vec::with_capacity(set.len()),
        };
        for v in set {
            let grams: Vec<usize> = v
                .qgram_windows(q)
                .iter()
                .filter_map(|g| alphabet.rank_of(g))
                .collect();
            for &g in &grams {
                basis.counts[g] += 1.0;
            }
            basis.slot_mean.push(basis.mean_weight(&grams));
            basis.slot_grams.push(grams);
        }
        Ok(basis)
    }

    fn universe_len(&self) -> usize {
        self.target.len()
    }

    fn mean_weight(&self, grams: &[usize]) -> f64 {
        grams.iter().map(|&g| self.weight[g]).sum::<f64>() / grams.len() as f64
    }

    fn spread(means: impl Iterator<Item = f64>) -> f64 {
        let (lo, hi) = means.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
            (lo.min(x), hi.max(x))
        });
        if lo.is_finite() {
            hi - lo
        } else {
            0.0
        }
    }

    fn center(&self) -> f64 {
        let lo = self.slot_mean.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.slot_mean.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lo + hi) / 2.0
    }

    fn divergence(&self) -> f64 {
        match self.metric {
            DivergenceMetric::WeightSpread => Self::spread(self.slot_mean.iter().copied()),
            metric => self
                .counts
                .iter()
                .zip(&self.target)
                .map(|(&c, &t)| metric.term(c / self.windows_total, t))
                .sum(),
        }
    }

    /// Divergence if `slot` held `grams` instead, computed from `current` by
    /// updating only the affected terms.
    fn divergence_with(&self, slot: usize, grams: &[usize], current: f64) -> f64 {
        match self.metric {
            DivergenceMetric::WeightSpread => {
                let replaced = self.mean_weight(grams);
                Self::spread(
                    self.slot_mean
                        .iter()
                        .enumerate()
                        .map(|(i, &m)| if i == slot { replaced } else { m }),
                )
            }
            metric => {
                let mut delta: BTreeMap<usize, f64> = BTreeMap::new();
                for &g in &self.slot_grams[slot] {
                    *delta.entry(g).or_insert(0.0) -= 1.0;
                }
                for &g in grams {
                    *delta.entry(g).or_insert(0.0) += 1.0;
                }
                let n = self.windows_total;
                current
                    + delta
                        .into_iter()
                        .filter(|&(_, d)| d != 0.0)
                        .map(|(g, d)| {
                            let t = self.target[g];
                            metric.term((self.counts[g] + d) / n, t) - metric.term(self.counts[g] / n, t)
                        })
                        .sum::<f64>()
            }
        }
    }

    /// Slot to replace next: the one contributing most to the imbalance,
    /// skipping exhausted slots. `None` when nothing is left to improve.
    fn pick_slot(&self, exhausted: &[bool]) -> Option<usize> {
        let center = self.center();
        let n = self.windows_total;
        let mut best: Option<(usize, f64)> = None;
        for (slot, grams) in self.slot_grams.iter().enumerate() {
            if exhausted[slot] {
                continue;
            }
            let score = match self.metric {
                DivergenceMetric::WeightSpread => (self.slot_mean[slot] - center).abs(),
                _ => grams
                    .iter()
                    .map(|&g| (self.counts[g] / n - self.target[g]).max(0.0) * self.weight[g])
                    .sum(),
            };
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((slot, score));
            }
        }
        best.map(|(slot, _)| slot)
    }

    /// Per-q-gram sampling weights favouring under-represented q-grams.
    fn sampler(&self) -> Result<Sampler> {
        let floor = SAMPLING_FLOOR / self.universe_len() as f64;
        let weights: Vec<f64> = match self.metric {
            DivergenceMetric::WeightSpread => {
                let center = self.center();
                self.weight
                    .iter()
                    .map(|&w| 1.0 / (1.0 + (w - center).abs()) + floor)
                    .collect()
            }
            _ => self
                .counts
                .iter()
                .zip(&self.target)
                .map(|(&c, &t)| (t - c / self.windows_total).max(0.0) + floor)
                .collect(),
        };
        let first = WeightedIndex::<f64>::new(weights.iter().copied())
            .map_err(|e| RseError::config(format!("sampling weights: {e}")))?;
        Ok(Sampler { first, weights })
    }

    /// Draw a candidate's q-gram ranks, redrawing on collision with values
    /// already in the set.
    fn draw_candidate<R: Rng + ?Sized>(
        &self,
        sampler: &Sampler,
        present: &HashSet<String>,
        attempts: usize,
        rng: &mut R,
    ) -> Option<Vec<usize>> {
        (0..attempts).find_map(|_| {
            let grams = self.build_grams(sampler, rng);
            (!present.contains(&self.spell(&grams))).then_some(grams)
        })
    }

    /// First q-gram from the sampler, then one symbol at a time, each
    /// weighted by the sampler weight of the q-gram it completes.
    fn build_grams<R: Rng + ?Sized>(&self, sampler: &Sampler, rng: &mut R) -> Vec<usize> {
        let base = self.alphabet.len();
        let suffix_space = self.universe_len() / base;
        let windows = self.k - self.q + 1;
        let mut grams = Vec::with_capacity(windows);
        let mut last = sampler.first.sample(rng);
        grams.push(last);
        while grams.len() < windows {
            let prefix = last % suffix_space;
            let next = &sampler.weights[prefix * base..(prefix + 1) * base];
            let choice = match WeightedIndex::<f64>::new(next.iter().copied()) {
                Ok(dist) => dist.sample(rng),
                Err(_) => rng.gen_range(0..base),
            };
            last = prefix * base + choice;
            grams.push(last);
        }
        grams
    }

    /// Reassemble the string whose consecutive q-grams are `grams`.
    fn spell(&self, grams: &[usize]) -> String {
        let mut s = self.alphabet.string_at(grams[0], self.q);
        let base = self.alphabet.len();
        for &g in &grams[1..] {
            s.push(self.alphabet.symbol(g % base));
        }
        s
    }

    fn apply(&mut self, slot: usize, grams: Vec<usize>) {
        for &g in &self.slot_grams[slot] {
            self.counts[g] -= 1.0;
        }
        for &g in &grams {
            self.counts[g] += 1.0;
        }
        self.slot_mean[slot] = self.mean_weight(&grams);
        self.slot_grams[slot] = grams;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ReferenceSetGenerator;
    use crate::rng::seeded;

    fn skewed_profile() -> FrequencyProfile {
        let mut p = FrequencyProfile::new();
        p.insert("aa", 400.0);
        p.insert("ab", 200.0);
        p.insert("ba", 10.0);
        p
    }

    fn skewed_set() -> ReferenceSet {
        // heavy on "aa"/"ab"
        ReferenceSet::from_values(
            ["aaab", "aaba", "abaa", "aaaa", "baaa", "cddc", "aabb"]
                .iter()
                .map(|&s| s.into())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn spell_inverts_windows() {
        let alphabet = Alphabet::new("abcd").unwrap();
        let opts = RebalanceOptions::default();
        let set = skewed_set();
        let basis = Basis::build(&alphabet, 2, &opts, &set, &FrequencyProfile::new()).unwrap();
        for (slot, v) in set.iter().enumerate() {
            assert_eq!(basis.spell(&basis.slot_grams[slot]), v.as_str());
        }
    }

    #[test]
    fn incremental_divergence_matches_full_recompute() {
        let alphabet = Alphabet::new("abcd").unwrap();
        for metric in [DivergenceMetric::TotalVariation, DivergenceMetric::ChiSquared] {
            let opts = RebalanceOptions {
                metric,
                ..RebalanceOptions::default()
            };
            let set = skewed_set();
            let data = skewed_profile();
            let mut basis = Basis::build(&alphabet, 2, &opts, &set, &data).unwrap();
            let current = basis.divergence();
            let grams: Vec<usize> = ["cd", "dc", "cc"].iter().map(|g| alphabet.rank_of(g).unwrap()).collect();
            let predicted = basis.divergence_with(0, &grams, current);
            basis.apply(0, grams);
            assert!((basis.divergence() - predicted).abs() < 1e-12);
        }
    }

    #[test]
    fn trajectory_strictly_decreases() {
        let alphabet = Alphabet::new("abcd").unwrap();
        for metric in [
            DivergenceMetric::TotalVariation,
            DivergenceMetric::ChiSquared,
            DivergenceMetric::WeightSpread,
        ] {
            let opts = RebalanceOptions {
                metric,
                max_swaps: 200,
                ..RebalanceOptions::default()
            };
            let processor = ReferenceSetProcessor::new(alphabet.clone(), 2, opts);
            let out = processor
                .rebalance(skewed_set(), &skewed_profile(), &mut seeded(11))
                .unwrap();
            let s = &out.summary;
            let mut prev = s.initial_divergence;
            for &d in &s.trajectory {
                assert!(d < prev, "{metric:?}: {d} !< {prev}");
                prev = d;
            }
            assert!(s.final_divergence <= s.initial_divergence);
            assert_eq!(s.accepted + s.rejected, s.attempts);
            assert!(s.attempts <= 200);
        }
    }

    #[test]
    fn zero_swaps_returns_input() {
        let alphabet = Alphabet::new("abcd").unwrap();
        let opts = RebalanceOptions {
            max_swaps: 0,
            ..RebalanceOptions::default()
        };
        let processor = ReferenceSetProcessor::new(alphabet, 2, opts);
        let out = processor
            .rebalance(skewed_set(), &skewed_profile(), &mut seeded(1))
            .unwrap();
        assert_eq!(out.reference_set, skewed_set());
        assert_eq!(out.summary.stop_reason, StopReason::SwapLimit);
        assert_eq!(out.summary.attempts, 0);
    }

    #[test]
    fn full_space_is_already_balanced() {
        let alphabet = Alphabet::new("ab").unwrap();
        let set = ReferenceSetGenerator::new(alphabet.clone(), 2)
            .generate(4, &mut seeded(4))
            .unwrap();
        let processor = ReferenceSetProcessor::new(alphabet, 1, RebalanceOptions::default());
        let mut data = FrequencyProfile::new();
        data.insert("a", 10.0);
        let out = processor.rebalance(set.clone(), &data, &mut seeded(4)).unwrap();
        // every value of length 2 is already present: uniform profile, nothing to do
        assert_eq!(out.reference_set, set);
        assert_eq!(out.summary.attempts, 0);
        assert_eq!(out.summary.stop_reason, StopReason::Converged);
    }

    #[test]
    fn rejects_bad_shapes() {
        let alphabet = Alphabet::new("abcd").unwrap();
        let p = ReferenceSetProcessor::new(alphabet.clone(), 5, RebalanceOptions::default());
        assert!(p.rebalance(skewed_set(), &FrequencyProfile::new(), &mut seeded(1)).is_err());

        let narrow = ReferenceSetProcessor::new(Alphabet::new("ab").unwrap(), 2, RebalanceOptions::default());
        assert!(narrow
            .rebalance(skewed_set(), &FrequencyProfile::new(), &mut seeded(1))
            .unwrap_err()
            .is_configuration());

        let opts = RebalanceOptions {
            candidates_per_swap: 0,
            ..RebalanceOptions::default()
        };
        let p = ReferenceSetProcessor::new(alphabet, 2, opts);
        assert!(p.rebalance(skewed_set(), &FrequencyProfile::new(), &mut seeded(1)).is_err());
    }

    #[test]
    fn same_seed_same_result() {
        let alphabet = Alphabet::new("abcd").unwrap();
        let processor = ReferenceSetProcessor::new(alphabet, 2, RebalanceOptions::default());
        let a = processor.rebalance(skewed_set(), &skewed_profile(), &mut seeded(8)).unwrap();
        let b = processor.rebalance(skewed_set(), &skewed_profile(), &mut seeded(8)).unwrap();
        assert_eq!(a.reference_set, b.reference_set);
        assert_eq!(a.summary, b.summary);
    }
}
