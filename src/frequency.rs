//! Q-gram frequency profiles and target distributions
//!
//! A [`FrequencyProfile`] records how often each q-gram occurs across the
//! datasets to be encoded (or in a public reference corpus). It is read-only
//! input to rebalancing.

use crate::qgram::QGramSet;
use crate::reference::ReferenceSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weight of a q-gram that never occurs in the profile.
pub const UNSEEN_WEIGHT: f64 = 1.0;

/// Mapping from q-gram to occurrence count.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyProfile {
    counts: BTreeMap<String, f64>,
}

impl FrequencyProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count q-gram occurrences over record q-gram sets, honouring each
    /// set's multiplicities.
    ///
    /// # Examples
    ///
    /// ```
    /// use rse::{FrequencyProfile, QGramMode, QGramSet};
    ///
    /// let records = vec![
    ///     QGramSet::from_token("anna", 2, QGramMode::Set),
    ///     QGramSet::from_token("ann", 2, QGramMode::Set),
    /// ];
    /// let profile = FrequencyProfile::from_qgram_sets(&records);
    /// assert_eq!(profile.count("an"), 2.0);
    /// assert_eq!(profile.count("na"), 1.0);
    /// ```
    pub fn from_qgram_sets<'a, I>(sets: I) -> Self
    where
        I: IntoIterator<Item = &'a QGramSet>,
    {
        let mut profile = Self::new();
        for set in sets {
            for (g, c) in set.counts() {
                profile.add(g, f64::from(c));
            }
        }
        profile
    }

    /// Aggregate profile of the reference values' own q-grams, counting
    /// every window occurrence.
    pub fn from_reference_set(set: &ReferenceSet, q: usize) -> Self {
        let mut profile = Self::new();
        for v in set {
            for g in v.qgram_windows(q) {
                profile.add(&g, 1.0);
            }
        }
        profile
    }

    pub fn add(&mut self, gram: &str, count: f64) {
        *self.counts.entry(gram.to_owned()).or_insert(0.0) += count;
    }

    pub fn insert(&mut self, gram: impl Into<String>, count: f64) {
        self.counts.insert(gram.into(), count);
    }

    /// Merge another profile into this one (datasets of several parties).
    pub fn merge(&mut self, other: &FrequencyProfile) {
        for (g, &c) in &other.counts {
            self.add(g, c);
        }
    }

    /// Raw count, zero when absent.
    pub fn count(&self, gram: &str) -> f64 {
        self.counts.get(gram).copied().unwrap_or(0.0)
    }

    /// Count used for weighting: absent q-grams weigh [`UNSEEN_WEIGHT`].
    pub fn weight(&self, gram: &str) -> f64 {
        match self.counts.get(gram) {
            Some(&c) if c > 0.0 => c,
            _ => UNSEEN_WEIGHT,
        }
    }

    pub fn total(&self) -> f64 {
        self.counts.values().sum()
    }

    /// Relative frequency of `gram`, zero for an empty profile.
    pub fn probability(&self, gram: &str) -> f64 {
        let total = self.total();
        if total > 0.0 {
            self.count(gram) / total
        } else {
            0.0
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.counts.iter().map(|(g, &c)| (g.as_str(), c))
    }

    /// The `n` most frequent q-grams, ties broken lexicographically.
    pub fn top(&self, n: usize) -> Vec<(&str, f64)> {
        let mut all: Vec<_> = self.iter().collect();
        all.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        all.truncate(n);
        all
    }
}

/// Desired q-gram distribution inside the reference set.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TargetDistribution {
    /// Every q-gram of the alphabet equally often
    #[default]
    Uniform,
    /// Proportional to 1 / data weight, so frequent plaintext q-grams are
    /// under-represented among reference values
    InverseData,
    /// Proportional to the weights of an explicit reference profile
    Profile(FrequencyProfile),
}

impl TargetDistribution {
    /// Normalised target probabilities over `universe`, all strictly
    /// positive.
    pub fn probabilities(&self, universe: &[String], data: &FrequencyProfile) -> Vec<f64> {
        let raw: Vec<f64> = match self {
            TargetDistribution::Uniform => vec![1.0; universe.len()],
            TargetDistribution::InverseData => universe.iter().map(|g| 1.0 / data.weight(g)).collect(),
            TargetDistribution::Profile(p) => universe.iter().map(|g| p.weight(g)).collect(),
        };
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|w| w / total).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qgram::QGramMode;

    #[test]
    fn unseen_weight_defaults_to_one() {
        let mut p = FrequencyProfile::new();
        p.insert("ab", 5.0);
        assert_eq!(p.weight("ab"), 5.0);
        assert_eq!(p.weight("zz"), UNSEEN_WEIGHT);
        assert_eq!(p.count("zz"), 0.0);
    }

    #[test]
    fn multiset_counts_accumulate() {
        let bag = QGramSet::from_token("aaaa", 2, QGramMode::Multiset);
        let p = FrequencyProfile::from_qgram_sets([&bag]);
        assert_eq!(p.count("aa"), 3.0);
    }

    #[test]
    fn reference_profile_counts_windows() {
        let set = ReferenceSet::from_values(vec!["aaa".into(), "aab".into()]).unwrap();
        let p = FrequencyProfile::from_reference_set(&set, 2);
        assert_eq!(p.count("aa"), 3.0);
        assert_eq!(p.count("ab"), 1.0);
        assert_eq!(p.total(), 4.0);
    }

    #[test]
    fn top_orders_by_count_then_gram() {
        let mut p = FrequencyProfile::new();
        p.insert("b", 2.0);
        p.insert("a", 2.0);
        p.insert("c", 9.0);
        let top: Vec<_> = p.top(2).into_iter().map(|(g, _)| g).collect();
        assert_eq!(top, vec!["c", "a"]);
    }

    #[test]
    fn targets_are_normalised_and_positive() {
        let universe: Vec<String> = ["aa", "ab", "ba", "bb"].iter().map(|s| s.to_string()).collect();
        let mut data = FrequencyProfile::new();
        data.insert("aa", 3.0);

        for target in [
            TargetDistribution::Uniform,
            TargetDistribution::InverseData,
            TargetDistribution::Profile(data.clone()),
        ] {
            let t = target.probabilities(&universe, &data);
            assert!((t.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            assert!(t.iter().all(|&x| x > 0.0));
        }

        let inv = TargetDistribution::InverseData.probabilities(&universe, &data);
        assert!(inv[0] < inv[1]);
    }
}
