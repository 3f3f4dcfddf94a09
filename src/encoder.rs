//! Reference set encoding
//!
//! Each record's q-gram set is compared with every reference value; bit `i`
//! of the output is set when the comparison with value `i` passes the
//! threshold. Encoding is deterministic and holds no mutable state, so one
//! [`Encoder`] can be shared across threads for a whole dataset.

use crate::error::{Result, RseError};
use crate::qgram::QGramSet;
use crate::reference::{ReferenceSet, ReferenceValue};
use crate::vector::EncodedVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether larger scores mean "closer" or "further".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Similarity,
    Distance,
}

/// Comparison between a record's q-grams and one reference value.
///
/// Implementations must be pure: the same inputs always give the same score.
pub trait QGramMeasure: Sync {
    fn orientation(&self) -> Orientation;

    /// Score `record` against `value`, whose own q-grams are `value_grams`.
    fn score(&self, record: &QGramSet, value: &ReferenceValue, value_grams: &QGramSet) -> f64;
}

/// Built-in measures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Measure {
    /// Number of distinct q-grams shared with the value's decomposition
    SharedQGrams,
    /// Jaccard similarity (generalised Σmin / Σmax for multisets)
    #[default]
    Jaccard,
    /// Dice coefficient 2·|A∩B| / (|A| + |B|)
    Dice,
    /// Smallest edit distance between the value and any record q-gram
    NearestEdit,
}

impl QGramMeasure for Measure {
    fn orientation(&self) -> Orientation {
        match self {
            Measure::NearestEdit => Orientation::Distance,
            _ => Orientation::Similarity,
        }
    }

    fn score(&self, record: &QGramSet, value: &ReferenceValue, value_grams: &QGramSet) -> f64 {
        match self {
            Measure::SharedQGrams => record.shared(value_grams) as f64,
            Measure::Jaccard => {
                let overlap = record.min_overlap(value_grams) as f64;
                let union = (record.total() + value_grams.total()) as f64 - overlap;
                if union > 0.0 {
                    overlap / union
                } else {
                    0.0
                }
            }
            Measure::Dice => {
                let overlap = record.min_overlap(value_grams) as f64;
                let sizes = (record.total() + value_grams.total()) as f64;
                if sizes > 0.0 {
                    2.0 * overlap / sizes
                } else {
                    0.0
                }
            }
            Measure::NearestEdit => record
                .iter()
                .map(|g| levenshtein(value.as_str(), g))
                .min()
                .unwrap_or(value.len()) as f64,
        }
    }
}

/// Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0usize; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let subst = prev[j] + usize::from(ca != cb);
            row[j + 1] = subst.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Bit assignment rule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Threshold {
    /// Set a bit when similarity ≥ cutoff, or distance ≤ cutoff
    Cutoff(f64),
    /// Set bits for the `n` best-scoring qualifying reference values.
    ///
    /// Equal scores are ordered by the reference values themselves, so the
    /// chosen values do not depend on their positions in the set.
    TopN(usize),
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Cutoff(0.25)
    }
}

/// Encoder over a frozen reference set.
///
/// # Examples
///
/// ```
/// use rse::{Encoder, Measure, QGramSet, ReferenceSet, Threshold};
///
/// let set = ReferenceSet::from_values(vec!["abc".into(), "xyz".into()]).unwrap();
/// let encoder = Encoder::new(&set, 2, Measure::SharedQGrams, Threshold::Cutoff(1.0)).unwrap();
/// let record: QGramSet = ["ab", "bc"].into_iter().collect();
/// assert_eq!(encoder.encode(&record).unwrap().to_bit_string(), "10");
/// ```
pub struct Encoder<'r, M: QGramMeasure = Measure> {
    reference_set: &'r ReferenceSet,
    decomposed: Vec<QGramSet>,
    q: usize,
    measure: M,
    threshold: Threshold,
}

impl<'r, M: QGramMeasure> Encoder<'r, M> {
    pub fn new(reference_set: &'r ReferenceSet, q: usize, measure: M, threshold: Threshold) -> Result<Self> {
        if reference_set.is_empty() {
            return Err(RseError::config("cannot encode against an empty reference set"));
        }
        let k = reference_set.value_len();
        if q == 0 || q > k {
            return Err(RseError::config(format!(
                "q-gram length {q} must be between 1 and the reference value length {k}"
            )));
        }
        match threshold {
            Threshold::Cutoff(x) if !x.is_finite() => {
                return Err(RseError::config("threshold cutoff must be finite"))
            }
            Threshold::TopN(0) => return Err(RseError::config("top-n threshold must be positive")),
            _ => {}
        }
        let decomposed = reference_set.iter().map(|v| v.qgrams(q)).collect();
        Ok(Encoder {
            reference_set,
            decomposed,
            q,
            measure,
            threshold,
        })
    }

    pub fn reference_set(&self) -> &ReferenceSet {
        self.reference_set
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    fn check_record(&self, record: &QGramSet) -> Result<()> {
        match record.gram_len()? {
            None => Err(RseError::config("cannot encode an empty q-gram set")),
            Some(len) if len != self.q => Err(RseError::config(format!(
                "record q-grams have length {len}, encoder expects {}",
                self.q
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Raw score against every reference value, in set order.
    pub fn scores(&self, record: &QGramSet) -> Result<Vec<f64>> {
        self.check_record(record)?;
        Ok(self
            .reference_set
            .iter()
            .zip(&self.decomposed)
            .map(|(value, grams)| self.measure.score(record, value, grams))
            .collect())
    }

    fn qualifies(&self, score: f64) -> bool {
        match self.measure.orientation() {
            Orientation::Similarity => score > 0.0,
            Orientation::Distance => score < self.reference_set.value_len() as f64,
        }
    }

    fn passes(&self, score: f64, cutoff: f64) -> bool {
        match self.measure.orientation() {
            Orientation::Similarity => score >= cutoff,
            Orientation::Distance => score <= cutoff,
        }
    }

    /// Encode one record.
    pub fn encode(&self, record: &QGramSet) -> Result<EncodedVector> {
        let scores = self.scores(record)?;
        let mut out = EncodedVector::zeros(scores.len());
        match self.threshold {
            Threshold::Cutoff(cutoff) => {
                for (i, &s) in scores.iter().enumerate() {
                    if self.passes(s, cutoff) {
                        out.set(i, true);
                    }
                }
            }
            Threshold::TopN(n) => {
                let mut ranked: Vec<(usize, f64)> = scores
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|&(_, s)| self.qualifies(s))
                    .collect();
                let orientation = self.measure.orientation();
                let values = self.reference_set.values();
                ranked.sort_by(|a, b| {
                    let by_score = match orientation {
                        Orientation::Similarity => b.1.total_cmp(&a.1),
                        Orientation::Distance => a.1.total_cmp(&b.1),
                    };
                    by_score.then_with(|| values[a.0].cmp(&values[b.0]))
                });
                for &(i, _) in ranked.iter().take(n) {
                    out.set(i, true);
                }
            }
        }
        Ok(out)
    }

    /// Encode many records in parallel; output order follows input order.
    pub fn encode_batch(&self, records: &[QGramSet]) -> Result<Vec<EncodedVector>> {
        let encoded = records
            .par_iter()
            .map(|r| self.encode(r))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            records = records.len(),
            m = self.reference_set.len(),
            "encoded batch"
        );
        Ok(encoded)
    }

    /// Number of reference values the record has any affinity with.
    pub fn qualifying(&self, record: &QGramSet) -> Result<usize> {
        Ok(self.scores(record)?.into_iter().filter(|&s| self.qualifies(s)).count())
    }

    /// Largest `n` for which every record of every dataset has at least `n`
    /// qualifying reference values, optionally capped.
    ///
    /// Parties agree on this value before encoding with [`Threshold::TopN`]
    /// so that every encoding carries the same number of set bits.
    pub fn calibrate_top_n(&self, datasets: &[&[QGramSet]], cap: Option<usize>) -> Result<usize> {
        let n = datasets
            .iter()
            .flat_map(|d| d.iter())
            .collect::<Vec<_>>()
            .par_iter()
            .map(|r| self.qualifying(r))
            .try_reduce(|| usize::MAX, |a, b| Ok(a.min(b)))?;
        if n == usize::MAX {
            return Err(RseError::config("cannot calibrate top-n without records"));
        }
        let n = cap.map_or(n, |c| n.min(c));
        debug!(n, ?cap, "calibrated top-n threshold");
        Ok(n)
    }
}

/// One-shot encoding of a single record.
pub fn encode(
    record: &QGramSet,
    reference_set: &ReferenceSet,
    q: usize,
    measure: Measure,
    threshold: Threshold,
) -> Result<EncodedVector> {
    Encoder::new(reference_set, q, measure, threshold)?.encode(record)
}
