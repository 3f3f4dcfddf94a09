//! Packed bit vector for encoded records.
//!
//! Representation: 1 bit per reference position, 64 positions per word,
//! position `i` at bit `i % 64` of word `i / 64`. Unused high bits of the
//! last word are always zero.

use crate::error::{Result, RseError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawEncodedVector")]
pub struct EncodedVector {
    len: usize,
    words: Vec<u64>,
}

/// Unchecked wire form; [`EncodedVector`] is only built from it after the
/// word layout matches `len`.
#[derive(Deserialize)]
struct RawEncodedVector {
    len: usize,
    words: Vec<u64>,
}

impl TryFrom<RawEncodedVector> for EncodedVector {
    type Error = RseError;

    fn try_from(raw: RawEncodedVector) -> Result<Self> {
        let expected = Self::word_count_for_len(raw.len);
        if raw.words.len() != expected {
            return Err(RseError::Serialization(format!(
                "{} words cannot hold {} bits, expected {expected}",
                raw.words.len(),
                raw.len
            )));
        }
        let used = raw.len % 64;
        if let (Some(&last), true) = (raw.words.last(), used != 0) {
            if last >> used != 0 {
                return Err(RseError::Serialization(format!(
                    "bits set beyond length {}",
                    raw.len
                )));
            }
        }
        Ok(EncodedVector {
            len: raw.len,
            words: raw.words,
        })
    }
}

impl EncodedVector {
    #[inline]
    fn word_count_for_len(len: usize) -> usize {
        (len + 63) / 64
    }

    pub fn zeros(len: usize) -> Self {
        Self {
            len,
            words: vec![0u64; Self::word_count_for_len(len)],
        }
    }

    /// Build a vector of `len` bits with the given positions set.
    pub fn from_positions(len: usize, positions: impl IntoIterator<Item = usize>) -> Result<Self> {
        let mut v = Self::zeros(len);
        for pos in positions {
            if pos >= len {
                return Err(RseError::config(format!(
                    "bit position {pos} out of range for length {len}"
                )));
            }
            v.set(pos, true);
        }
        Ok(v)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.len, "bit {index} out of range for length {}", self.len);
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    #[inline]
    pub(crate) fn set(&mut self, index: usize, bit: bool) {
        debug_assert!(index < self.len);
        let mask = 1u64 << (index % 64);
        if bit {
            self.words[index / 64] |= mask;
        } else {
            self.words[index / 64] &= !mask;
        }
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set positions in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let tz = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(wi * 64 + tz)
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// `0`/`1` characters, position 0 first.
    ///
    /// # Examples
    ///
    /// ```
    /// use rse::EncodedVector;
    ///
    /// let v = EncodedVector::from_positions(4, [0, 2]).unwrap();
    /// assert_eq!(v.to_bit_string(), "1010");
    /// assert_eq!(EncodedVector::from_bit_string("1010").unwrap(), v);
    /// ```
    pub fn to_bit_string(&self) -> String {
        self.iter().map(|b| if b { '1' } else { '0' }).collect()
    }

    pub fn from_bit_string(s: &str) -> Result<Self> {
        let mut v = Self::zeros(s.len());
        for (i, c) in s.chars().enumerate() {
            match c {
                '0' => {}
                '1' => v.set(i, true),
                other => {
                    return Err(RseError::config(format!(
                        "invalid bit character {other:?} at position {i}"
                    )))
                }
            }
        }
        Ok(v)
    }
}

impl fmt::Display for EncodedVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bit_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_across_word_boundary() {
        let mut v = EncodedVector::zeros(130);
        v.set(0, true);
        v.set(63, true);
        v.set(64, true);
        v.set(129, true);
        assert!(v.get(63) && v.get(64) && v.get(129));
        assert!(!v.get(1));
        assert_eq!(v.count_ones(), 4);
        assert_eq!(v.ones().collect::<Vec<_>>(), vec![0, 63, 64, 129]);
        v.set(63, false);
        assert_eq!(v.count_ones(), 3);
    }

    #[test]
    fn from_positions_rejects_out_of_range() {
        assert!(EncodedVector::from_positions(3, [3]).is_err());
    }

    #[test]
    fn bit_string_rejects_garbage() {
        assert!(EncodedVector::from_bit_string("10x").is_err());
        assert_eq!(EncodedVector::from_bit_string("").unwrap().len(), 0);
    }

    #[test]
    fn deserialization_checks_word_layout() {
        let ok = EncodedVector::from_positions(70, [1, 69]).unwrap();
        let bytes = bincode::serialize(&ok).unwrap();
        assert_eq!(bincode::deserialize::<EncodedVector>(&bytes).unwrap(), ok);

        let short = RawEncodedVector { len: 200, words: vec![] };
        assert!(EncodedVector::try_from(short).is_err());
        let stray = RawEncodedVector { len: 3, words: vec![0b1001] };
        assert!(EncodedVector::try_from(stray).is_err());
        let full = RawEncodedVector { len: 64, words: vec![u64::MAX] };
        assert_eq!(EncodedVector::try_from(full).unwrap().count_ones(), 64);
    }

    #[test]
    #[should_panic]
    fn get_out_of_range_panics() {
        EncodedVector::zeros(2).get(2);
    }
}
