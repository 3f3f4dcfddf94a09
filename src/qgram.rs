//! Q-gram extraction
//!
//! A record's sensitive attribute values are normalised (trimmed, lowercased,
//! whitespace removed) and split into overlapping substrings of length `q`.

use crate::error::{Result, RseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether repeated q-grams within one record are kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QGramMode {
    /// Duplicates collapse to one occurrence
    #[default]
    Set,
    /// Occurrence counts are retained
    Multiset,
}

/// The q-grams of one record (or of one reference value).
///
/// Stored as an ordered map from q-gram to multiplicity so that iteration
/// order, and therefore everything computed from it, is deterministic.
/// In [`QGramMode::Set`] every multiplicity is 1.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QGramSet {
    grams: BTreeMap<String, u32>,
}

/// Normalise an attribute value: trim, lowercase, drop all whitespace.
pub fn normalize(value: &str) -> String {
    value
        .trim()
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Sliding window of width `q` over `token`. Tokens shorter than `q` yield
/// nothing.
///
/// # Examples
///
/// ```
/// use rse::qgram::windows;
///
/// assert_eq!(windows("peter", 2), vec!["pe", "et", "te", "er"]);
/// assert!(windows("p", 2).is_empty());
/// ```
pub fn windows(token: &str, q: usize) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    if q == 0 || chars.len() < q {
        return Vec::new();
    }
    chars.windows(q).map(|w| w.iter().collect()).collect()
}

impl QGramSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from already extracted q-grams.
    pub fn from_grams<I, S>(grams: I, mode: QGramMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = QGramSet::new();
        for g in grams {
            set.insert(g.into(), mode);
        }
        set
    }

    /// Q-grams of a single token, taken verbatim (no normalisation).
    pub fn from_token(token: &str, q: usize, mode: QGramMode) -> Self {
        Self::from_grams(windows(token, q), mode)
    }

    /// Union of the q-grams of several attribute values after normalisation.
    ///
    /// Returns `None` when any attribute is blank, mirroring how records with
    /// missing sensitive values are excluded from encoding.
    ///
    /// # Examples
    ///
    /// ```
    /// use rse::{QGramMode, QGramSet};
    ///
    /// let qs = QGramSet::from_attributes(&["Peter ", "Mc Donald"], 2, QGramMode::Set).unwrap();
    /// assert!(qs.contains("pe"));
    /// assert!(qs.contains("cd"));
    /// assert!(QGramSet::from_attributes(&["peter", "  "], 2, QGramMode::Set).is_none());
    /// ```
    pub fn from_attributes<S: AsRef<str>>(values: &[S], q: usize, mode: QGramMode) -> Option<Self> {
        let mut set = QGramSet::new();
        for value in values {
            if value.as_ref().trim().is_empty() {
                return None;
            }
            for g in windows(&normalize(value.as_ref()), q) {
                set.insert(g, mode);
            }
        }
        Some(set)
    }

    fn insert(&mut self, gram: String, mode: QGramMode) {
        let count = self.grams.entry(gram).or_insert(0);
        match mode {
            QGramMode::Set => *count = 1,
            QGramMode::Multiset => *count += 1,
        }
    }

    /// Number of distinct q-grams.
    pub fn len(&self) -> usize {
        self.grams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grams.is_empty()
    }

    /// Sum of multiplicities.
    pub fn total(&self) -> u64 {
        self.grams.values().map(|&c| u64::from(c)).sum()
    }

    pub fn contains(&self, gram: &str) -> bool {
        self.grams.contains_key(gram)
    }

    pub fn multiplicity(&self, gram: &str) -> u32 {
        self.grams.get(gram).copied().unwrap_or(0)
    }

    /// Distinct q-grams in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.grams.keys().map(String::as_str)
    }

    /// `(q-gram, multiplicity)` pairs in lexicographic order.
    pub fn counts(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.grams.iter().map(|(g, &c)| (g.as_str(), c))
    }

    /// Number of distinct q-grams present in both sets.
    pub fn shared(&self, other: &QGramSet) -> usize {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().filter(|g| large.contains(g)).count()
    }

    /// Σ min(multiplicity) over the intersection.
    pub fn min_overlap(&self, other: &QGramSet) -> u64 {
        self.grams
            .iter()
            .map(|(g, &c)| u64::from(c.min(other.multiplicity(g))))
            .sum()
    }

    /// Length shared by every q-gram, or an error if lengths differ.
    pub fn gram_len(&self) -> Result<Option<usize>> {
        let mut len = None;
        for g in self.iter() {
            let n = g.chars().count();
            match len {
                None => len = Some(n),
                Some(l) if l != n => {
                    return Err(RseError::config(format!(
                        "q-gram {g:?} has length {n}, expected {l}"
                    )))
                }
                _ => {}
            }
        }
        Ok(len)
    }
}

impl<'a> FromIterator<&'a str> for QGramSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        QGramSet::from_grams(iter, QGramMode::Set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_case_and_whitespace() {
        assert_eq!(normalize("  Mary Ann\tSmith "), "maryannsmith");
    }

    #[test]
    fn multiset_keeps_counts() {
        let set = QGramSet::from_token("aaaa", 2, QGramMode::Set);
        assert_eq!(set.len(), 1);
        assert_eq!(set.total(), 1);

        let bag = QGramSet::from_token("aaaa", 2, QGramMode::Multiset);
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.multiplicity("aa"), 3);
    }

    #[test]
    fn shared_and_min_overlap() {
        let a = QGramSet::from_token("abcab", 2, QGramMode::Multiset);
        let b = QGramSet::from_token("abab", 2, QGramMode::Multiset);
        // a: ab x2, bc, ca ; b: ab x2, ba
        assert_eq!(a.shared(&b), 1);
        assert_eq!(a.min_overlap(&b), 2);
    }

    #[test]
    fn attributes_union_and_blank_skip() {
        let qs = QGramSet::from_attributes(&["ab", "bc"], 2, QGramMode::Set).unwrap();
        assert_eq!(qs.iter().collect::<Vec<_>>(), vec!["ab", "bc"]);
        assert!(QGramSet::from_attributes(&["", "x"], 2, QGramMode::Set).is_none());
        // short values contribute nothing but do not skip the record
        let short = QGramSet::from_attributes(&["a"], 2, QGramMode::Set).unwrap();
        assert!(short.is_empty());
    }

    #[test]
    fn gram_len_detects_mixed_lengths() {
        let ok: QGramSet = ["ab", "cd"].into_iter().collect();
        assert_eq!(ok.gram_len().unwrap(), Some(2));
        let mixed: QGramSet = ["ab", "cde"].into_iter().collect();
        assert!(mixed.gram_len().is_err());
        assert_eq!(QGramSet::new().gram_len().unwrap(), None);
    }
}
