//! Reference values and reference sets
//!
//! A [`ReferenceSet`] is the shared, ordered table every party encodes
//! against. Position `i` in the set is bit `i` of every encoded vector, so
//! the order is part of the set's identity (and of its fingerprint).

use crate::alphabet::Alphabet;
use crate::error::{Result, RseError};
use crate::qgram::{QGramMode, QGramSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// A synthetic comparison anchor of fixed length `k`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceValue(String);

impl ReferenceValue {
    pub fn new(value: impl Into<String>) -> Self {
        ReferenceValue(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in symbols.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value's own q-grams (duplicates collapsed).
    ///
    /// # Examples
    ///
    /// ```
    /// use rse::ReferenceValue;
    ///
    /// let v = ReferenceValue::new("abc");
    /// let grams: Vec<_> = v.qgrams(2).iter().map(str::to_owned).collect();
    /// assert_eq!(grams, vec!["ab", "bc"]);
    /// ```
    pub fn qgrams(&self, q: usize) -> QGramSet {
        QGramSet::from_token(&self.0, q, QGramMode::Set)
    }

    /// The value's q-grams in window order, repeats included.
    pub fn qgram_windows(&self, q: usize) -> Vec<String> {
        crate::qgram::windows(&self.0, q)
    }
}

impl fmt::Display for ReferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReferenceValue {
    fn from(s: &str) -> Self {
        ReferenceValue::new(s)
    }
}

/// Ordered sequence of `m` distinct reference values of equal length `k`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ReferenceValue>", into = "Vec<ReferenceValue>")]
pub struct ReferenceSet {
    values: Vec<ReferenceValue>,
    k: usize,
}

impl ReferenceSet {
    /// Build a set, checking that values are non-empty, distinct and of equal
    /// length.
    ///
    /// # Examples
    ///
    /// ```
    /// use rse::ReferenceSet;
    ///
    /// let set = ReferenceSet::from_values(vec!["abc".into(), "xyz".into()]).unwrap();
    /// assert_eq!(set.len(), 2);
    /// assert_eq!(set.value_len(), 3);
    /// assert!(ReferenceSet::from_values(vec!["abc".into(), "abc".into()]).is_err());
    /// assert!(ReferenceSet::from_values(vec!["abc".into(), "xy".into()]).is_err());
    /// ```
    pub fn from_values(values: Vec<ReferenceValue>) -> Result<Self> {
        let k = values
            .first()
            .map(ReferenceValue::len)
            .ok_or_else(|| RseError::config("reference set must not be empty"))?;
        if k == 0 {
            return Err(RseError::config("reference values must not be empty strings"));
        }
        let mut seen = HashSet::with_capacity(values.len());
        for (i, v) in values.iter().enumerate() {
            if v.len() != k {
                return Err(RseError::config(format!(
                    "reference value {i} ({v}) has length {}, expected {k}",
                    v.len()
                )));
            }
            if !seen.insert(v.as_str()) {
                return Err(RseError::config(format!("reference value {v} appears twice")));
            }
        }
        Ok(ReferenceSet { values, k })
    }

    /// Number of reference values, `m`.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Length of every reference value, `k`.
    pub fn value_len(&self) -> usize {
        self.k
    }

    pub fn get(&self, index: usize) -> Option<&ReferenceValue> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[ReferenceValue] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReferenceValue> {
        self.values.iter()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v.as_str() == value)
    }

    /// Check every value against `alphabet`.
    pub fn check_alphabet(&self, alphabet: &Alphabet) -> Result<()> {
        match self.values.iter().find(|v| !alphabet.covers(v.as_str())) {
            Some(v) => Err(RseError::config(format!(
                "reference value {v} uses symbols outside the alphabet"
            ))),
            None => Ok(()),
        }
    }

    /// Reorder the set: position `i` of the result holds `self[order[i]]`.
    pub fn permuted(&self, order: &[usize]) -> Result<Self> {
        if order.len() != self.len() {
            return Err(RseError::config(format!(
                "permutation has {} entries, reference set has {}",
                order.len(),
                self.len()
            )));
        }
        let mut used = vec![false; self.len()];
        let mut values = Vec::with_capacity(self.len());
        for &i in order {
            if i >= self.len() || std::mem::replace(&mut used[i], true) {
                return Err(RseError::config("permutation must use each index exactly once"));
            }
            values.push(self.values[i].clone());
        }
        Ok(ReferenceSet { values, k: self.k })
    }

    /// Replace the value in `slot`. The replacement must keep the set's
    /// invariants; callers check distinctness beforehand.
    pub(crate) fn replace(&mut self, slot: usize, value: ReferenceValue) -> ReferenceValue {
        debug_assert_eq!(value.len(), self.k);
        debug_assert!(!self.contains(value.as_str()));
        std::mem::replace(&mut self.values[slot], value)
    }

    /// SHA-256 over the ordered values, hex encoded.
    ///
    /// Parties exchanging encodings compare fingerprints to make sure their
    /// bit positions line up.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.k as u64).to_le_bytes());
        for v in &self.values {
            hasher.update((v.as_str().len() as u64).to_le_bytes());
            hasher.update(v.as_str().as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl TryFrom<Vec<ReferenceValue>> for ReferenceSet {
    type Error = RseError;

    fn try_from(values: Vec<ReferenceValue>) -> Result<Self> {
        ReferenceSet::from_values(values)
    }
}

impl From<ReferenceSet> for Vec<ReferenceValue> {
    fn from(set: ReferenceSet) -> Self {
        set.values
    }
}

impl<'a> IntoIterator for &'a ReferenceSet {
    type Item = &'a ReferenceValue;
    type IntoIter = std::slice::Iter<'a, ReferenceValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> ReferenceSet {
        ReferenceSet::from_values(values.iter().map(|&v| v.into()).collect()).unwrap()
    }

    #[test]
    fn empty_set_rejected() {
        assert!(ReferenceSet::from_values(Vec::new()).unwrap_err().is_configuration());
    }

    #[test]
    fn permuted_reorders_and_validates() {
        let s = set(&["aa", "bb", "cc"]);
        let p = s.permuted(&[2, 0, 1]).unwrap();
        assert_eq!(p.get(0).unwrap().as_str(), "cc");
        assert_eq!(p.get(1).unwrap().as_str(), "aa");
        assert!(s.permuted(&[0, 0, 1]).is_err());
        assert!(s.permuted(&[0, 1]).is_err());
    }

    #[test]
    fn fingerprint_depends_on_order() {
        let a = set(&["ab", "cd"]);
        let b = set(&["cd", "ab"]);
        assert_eq!(a.fingerprint(), set(&["ab", "cd"]).fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn replace_swaps_slot() {
        let mut s = set(&["ab", "cd"]);
        let old = s.replace(1, "ef".into());
        assert_eq!(old.as_str(), "cd");
        assert!(s.contains("ef"));
        assert!(!s.contains("cd"));
    }

    #[test]
    fn alphabet_check() {
        let s = set(&["ab", "cz"]);
        let abc = Alphabet::new("abc").unwrap();
        assert!(s.check_alphabet(&abc).is_err());
        assert!(s.check_alphabet(&Alphabet::lowercase()).is_ok());
    }

    #[test]
    fn serde_roundtrip_validates() {
        let s = set(&["ab", "cd"]);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"["ab","cd"]"#);
        let back: ReferenceSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
        assert!(serde_json::from_str::<ReferenceSet>(r#"["ab","ab"]"#).is_err());
    }
}
