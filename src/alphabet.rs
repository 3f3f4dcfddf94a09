//! Symbol alphabets for q-grams and reference values

use crate::error::{Result, RseError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// ASCII punctuation in code point order.
pub const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Ordered set of distinct symbols.
///
/// The order matters only for enumeration (q-gram universes, exhaustive
/// generation); membership tests are order independent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Alphabet {
    symbols: Vec<char>,
}

impl Alphabet {
    /// Build an alphabet from an explicit symbol string.
    ///
    /// # Examples
    ///
    /// ```
    /// use rse::Alphabet;
    ///
    /// let abc = Alphabet::new("abc").unwrap();
    /// assert_eq!(abc.len(), 3);
    /// assert!(Alphabet::new("aba").is_err());
    /// assert!(Alphabet::new("").is_err());
    /// ```
    pub fn new(symbols: &str) -> Result<Self> {
        let symbols: Vec<char> = symbols.chars().collect();
        if symbols.is_empty() {
            return Err(RseError::config("alphabet must not be empty"));
        }
        let mut seen = HashSet::with_capacity(symbols.len());
        for &c in &symbols {
            if !seen.insert(c) {
                return Err(RseError::config(format!("alphabet symbol {c:?} appears twice")));
            }
        }
        Ok(Alphabet { symbols })
    }

    /// Build an alphabet from character classes: `a-z`, then `0-9`, then
    /// ASCII punctuation, each included when its flag is set.
    pub fn from_classes(letters: bool, digits: bool, punctuation: bool) -> Result<Self> {
        let mut s = String::new();
        if letters {
            s.extend('a'..='z');
        }
        if digits {
            s.extend('0'..='9');
        }
        if punctuation {
            s.push_str(PUNCTUATION);
        }
        Self::new(&s)
    }

    /// Lowercase ASCII letters.
    pub fn lowercase() -> Self {
        Alphabet {
            symbols: ('a'..='z').collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; construction rejects empty alphabets.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn symbol(&self, index: usize) -> char {
        self.symbols[index]
    }

    pub fn contains(&self, c: char) -> bool {
        self.symbols.contains(&c)
    }

    /// Position of `c` in the alphabet.
    pub fn index_of(&self, c: char) -> Option<usize> {
        self.symbols.iter().position(|&s| s == c)
    }

    /// True when every char of `s` belongs to the alphabet.
    pub fn covers(&self, s: &str) -> bool {
        s.chars().all(|c| self.contains(c))
    }

    /// Number of distinct strings of length `len`, or `None` on overflow.
    ///
    /// # Examples
    ///
    /// ```
    /// use rse::Alphabet;
    ///
    /// let abc = Alphabet::new("abc").unwrap();
    /// assert_eq!(abc.space_size(3), Some(27));
    /// assert_eq!(Alphabet::lowercase().space_size(100), None);
    /// ```
    pub fn space_size(&self, len: usize) -> Option<u128> {
        let exp = u32::try_from(len).ok()?;
        (self.symbols.len() as u128).checked_pow(exp)
    }

    /// Decode a mixed-radix index into the string it denotes.
    ///
    /// Index 0 is the first symbol repeated `len` times; the last position
    /// varies fastest, matching lexicographic order over the alphabet.
    pub fn string_at(&self, mut index: usize, len: usize) -> String {
        let base = self.symbols.len();
        let mut out = vec![self.symbols[0]; len];
        for slot in out.iter_mut().rev() {
            *slot = self.symbols[index % base];
            index /= base;
        }
        out.into_iter().collect()
    }

    /// Inverse of [`Alphabet::string_at`]; `None` if `s` leaves the alphabet.
    pub fn rank_of(&self, s: &str) -> Option<usize> {
        let base = self.symbols.len();
        let mut rank = 0usize;
        for c in s.chars() {
            rank = rank.checked_mul(base)?.checked_add(self.index_of(c)?)?;
        }
        Some(rank)
    }

    /// Every string of length `len`, in lexicographic alphabet order.
    pub fn enumerate(&self, len: usize) -> Result<Vec<String>> {
        let size = self
            .space_size(len)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| RseError::config(format!("cannot enumerate strings of length {len}")))?;
        Ok((0..size).map(|i| self.string_at(i, len)).collect())
    }
}

impl TryFrom<String> for Alphabet {
    type Error = RseError;

    fn try_from(value: String) -> Result<Self> {
        Alphabet::new(&value)
    }
}

impl From<Alphabet> for String {
    fn from(alphabet: Alphabet) -> Self {
        alphabet.symbols.into_iter().collect()
    }
}

impl std::fmt::Display for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in &self.symbols {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
