//! Reference set generation
//!
//! Produces `m` distinct synthetic strings of length `k` over an alphabet,
//! independent of any dataset. The only input besides the shape parameters
//! is an explicit random source.
//!
//! [`ReferenceSetGenerator::generate_covering`] additionally guarantees that
//! every q-gram of the alphabet occurs in a minimum number of values, so no
//! record made of alphabet symbols is left without a similar reference value.

use crate::alphabet::Alphabet;
use crate::error::{Result, RseError};
use crate::processor::MAX_UNIVERSE;
use crate::reference::{ReferenceSet, ReferenceValue};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

/// Above this fill ratio (m / |alphabet|^k) rejection sampling wastes most
/// draws on duplicates, so the generator samples indices instead.
const DENSE_FILL_RATIO: f64 = 0.5;

/// Generator for initial reference sets.
///
/// # Examples
///
/// ```
/// use rse::{Alphabet, ReferenceSetGenerator};
/// use rse::rng::seeded;
///
/// let alphabet = Alphabet::new("abc").unwrap();
/// let generator = ReferenceSetGenerator::new(alphabet, 3);
/// let set = generator.generate(4, &mut seeded(42)).unwrap();
/// assert_eq!(set.len(), 4);
/// assert_eq!(set.value_len(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct ReferenceSetGenerator {
    alphabet: Alphabet,
    k: usize,
}

impl ReferenceSetGenerator {
    pub fn new(alphabet: Alphabet, k: usize) -> Self {
        Self { alphabet, k }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn value_len(&self) -> usize {
        self.k
    }

    /// Check that `m` distinct values of length `k` exist, before any
    /// sampling.
    pub fn check_capacity(&self, m: usize) -> Result<()> {
        if self.k == 0 {
            return Err(RseError::config("reference value length k must be positive"));
        }
        if m == 0 {
            return Err(RseError::config("reference set size m must be positive"));
        }
        match self.alphabet.space_size(self.k) {
            Some(space) if space < m as u128 => Err(RseError::config(format!(
                "alphabet of {} symbols admits only {space} distinct values of length {}, {m} requested",
                self.alphabet.len(),
                self.k
            ))),
            _ => Ok(()),
        }
    }

    /// Check that a set covering every q-gram `coverage` times exists.
    ///
    /// A q-gram can lead `|alphabet|^(k - q)` distinct values, which bounds
    /// the coverage any set can reach.
    pub fn check_covering(&self, q: usize, coverage: usize) -> Result<()> {
        if q == 0 || q > self.k {
            return Err(RseError::config(format!(
                "q ({q}) must lie between 1 and the reference value length k ({})",
                self.k
            )));
        }
        if coverage == 0 {
            return Err(RseError::config("coverage must be positive"));
        }
        match self.alphabet.space_size(q) {
            Some(u) if u <= MAX_UNIVERSE as u128 => {}
            _ => {
                return Err(RseError::config(format!(
                    "q-gram universe of {} symbols at q = {q} exceeds {MAX_UNIVERSE} entries",
                    self.alphabet.len()
                )))
            }
        }
        match self.alphabet.space_size(self.k - q) {
            Some(tails) if tails < coverage as u128 => Err(RseError::config(format!(
                "each q-gram fits in at most {tails} distinct values of length {}, coverage {coverage} requested",
                self.k
            ))),
            _ => Ok(()),
        }
    }

    /// Generate `m` distinct values, in draw order.
    pub fn generate<R: Rng + ?Sized>(&self, m: usize, rng: &mut R) -> Result<ReferenceSet> {
        self.check_capacity(m)?;
        let values = match self.dense_space(m) {
            Some(space) => self.sample_dense(space, m, rng),
            None => self.sample_rejecting(m, rng),
        };
        ReferenceSet::from_values(values)
    }

    /// Generate a set in which every q-gram over the alphabet occurs in at
    /// least `coverage` values.
    ///
    /// Each new value starts with a least-covered q-gram and is extended one
    /// symbol at a time, always towards the least-covered next q-gram. The
    /// set grows until the coverage holds; if that takes fewer than `min_m`
    /// values, uniform distinct values fill it up to `min_m`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rse::{Alphabet, ReferenceSetGenerator};
    /// use rse::rng::seeded;
    ///
    /// let generator = ReferenceSetGenerator::new(Alphabet::new("abc").unwrap(), 4);
    /// let set = generator.generate_covering(2, 2, 0, &mut seeded(1)).unwrap();
    /// for gram in ["aa", "ab", "cc"] {
    ///     assert!(set.iter().filter(|v| v.as_str().contains(gram)).count() >= 2);
    /// }
    /// ```
    pub fn generate_covering<R: Rng + ?Sized>(
        &self,
        q: usize,
        coverage: usize,
        min_m: usize,
        rng: &mut R,
    ) -> Result<ReferenceSet> {
        self.check_covering(q, coverage)?;
        if min_m > 0 {
            self.check_capacity(min_m)?;
        }

        let base = self.alphabet.len();
        let universe = base.pow(q as u32);
        let mut ledger = CoverageLedger::new(universe, coverage);
        let mut seen = HashSet::new();
        let mut values = Vec::new();

        while let Some(start) = ledger.least_covered(rng) {
            let symbols = self.extend_from(start, q, &ledger, rng);
            let symbols = if seen.contains(&self.spell(&symbols)) {
                self.fresh_tail(start, q, &seen, rng)
            } else {
                symbols
            };
            let mut grams: Vec<usize> = symbols.windows(q).map(|w| rank(w, base)).collect();
            grams.sort_unstable();
            grams.dedup();
            for g in grams {
                ledger.bump(g);
            }
            let value = self.spell(&symbols);
            seen.insert(value.clone());
            values.push(value);
        }
        let covering = values.len();

        if values.len() < min_m {
            self.fill(&mut values, &mut seen, min_m, rng);
        }
        debug!(q, coverage, covering, m = values.len(), "generated covering reference set");
        ReferenceSet::from_values(values)
    }

    /// Uniform random value of length `k`.
    pub fn sample_value<R: Rng + ?Sized>(&self, rng: &mut R) -> ReferenceValue {
        sample_value(&self.alphabet, self.k, rng)
    }

    /// Size of the whole value space, when `m` fills enough of it that
    /// index sampling beats rejection.
    fn dense_space(&self, m: usize) -> Option<usize> {
        self.alphabet
            .space_size(self.k)
            .and_then(|space| usize::try_from(space).ok())
            .filter(|&space| m as f64 > space as f64 * DENSE_FILL_RATIO)
    }

    fn spell(&self, symbols: &[usize]) -> ReferenceValue {
        ReferenceValue::new(symbols.iter().map(|&i| self.alphabet.symbol(i)).collect::<String>())
    }

    /// Symbols of a value led by q-gram `start`, each further symbol picked
    /// so the q-gram it closes is the least covered one not yet in the value.
    fn extend_from<R: Rng + ?Sized>(
        &self,
        start: usize,
        q: usize,
        ledger: &CoverageLedger,
        rng: &mut R,
    ) -> Vec<usize> {
        let base = self.alphabet.len();
        let radix = base.pow(q as u32 - 1);
        let mut symbols = unrank(start, q, base);
        let mut used = vec![start];
        let mut order: Vec<usize> = (0..base).collect();
        let mut gram = start;
        while symbols.len() < self.k {
            order.shuffle(rng);
            let prefix = gram % radix;
            let next = order
                .iter()
                .copied()
                .min_by_key(|&s| {
                    let g = prefix * base + s;
                    (used.contains(&g), ledger.count(g))
                })
                .unwrap_or(0);
            gram = prefix * base + next;
            used.push(gram);
            symbols.push(next);
        }
        symbols
    }

    /// A value led by q-gram `start` that is not in `seen` yet.
    ///
    /// Fewer than `coverage` collected values contain `start`, and
    /// [`Self::check_covering`] guarantees at least `coverage` tails exist,
    /// so a scan from a random offset finds one.
    fn fresh_tail<R: Rng + ?Sized>(
        &self,
        start: usize,
        q: usize,
        seen: &HashSet<ReferenceValue>,
        rng: &mut R,
    ) -> Vec<usize> {
        let base = self.alphabet.len();
        let head = unrank(start, q, base);
        let tail_len = self.k - q;
        let with_tail = |tail: Vec<usize>| head.iter().copied().chain(tail).collect::<Vec<usize>>();

        match self.alphabet.space_size(tail_len).and_then(|n| usize::try_from(n).ok()) {
            Some(tails) => {
                let offset = rng.gen_range(0..tails);
                (0..tails)
                    .map(|j| with_tail(unrank((offset + j) % tails, tail_len, base)))
                    .find(|symbols| !seen.contains(&self.spell(symbols)))
                    .unwrap_or_else(|| with_tail(vec![0; tail_len]))
            }
            None => loop {
                let symbols = with_tail((0..tail_len).map(|_| rng.gen_range(0..base)).collect());
                if !seen.contains(&self.spell(&symbols)) {
                    break symbols;
                }
            },
        }
    }

    /// Top up `values` with uniform distinct values until there are `m`.
    fn fill<R: Rng + ?Sized>(
        &self,
        values: &mut Vec<ReferenceValue>,
        seen: &mut HashSet<ReferenceValue>,
        m: usize,
        rng: &mut R,
    ) {
        let need = m - values.len();
        match self.dense_space(m) {
            Some(space) => {
                let free: Vec<usize> = (0..space)
                    .filter(|&i| !seen.contains(&ReferenceValue::new(self.alphabet.string_at(i, self.k))))
                    .collect();
                for i in index::sample(rng, free.len(), need) {
                    values.push(ReferenceValue::new(self.alphabet.string_at(free[i], self.k)));
                }
            }
            None => {
                while values.len() < m {
                    let v = self.sample_value(rng);
                    if seen.insert(v.clone()) {
                        values.push(v);
                    }
                }
            }
        }
    }

    fn sample_rejecting<R: Rng + ?Sized>(&self, m: usize, rng: &mut R) -> Vec<ReferenceValue> {
        let mut seen = HashSet::with_capacity(m);
        let mut values = Vec::with_capacity(m);
        let mut duplicates = 0usize;
        while values.len() < m {
            let v = self.sample_value(rng);
            if seen.insert(v.clone()) {
                values.push(v);
            } else {
                duplicates += 1;
            }
        }
        debug!(m, k = self.k, duplicates, "generated reference set by rejection sampling");
        values
    }

    fn sample_dense<R: Rng + ?Sized>(&self, space: usize, m: usize, rng: &mut R) -> Vec<ReferenceValue> {
        debug!(m, k = self.k, space, "generating reference set by index sampling");
        index::sample(rng, space, m)
            .into_iter()
            .map(|i| ReferenceValue::new(self.alphabet.string_at(i, self.k)))
            .collect()
    }
}

/// Uniform random string of length `k` over `alphabet`.
pub fn sample_value<R: Rng + ?Sized>(alphabet: &Alphabet, k: usize, rng: &mut R) -> ReferenceValue {
    let symbols = alphabet.symbols();
    let s: String = (0..k).map(|_| symbols[rng.gen_range(0..symbols.len())]).collect();
    ReferenceValue::new(s)
}

/// Per-q-gram coverage counts, with the q-grams still below the target kept
/// in one bucket per count so the least covered one is found directly.
struct CoverageLedger {
    target: usize,
    counts: Vec<usize>,
    buckets: Vec<Vec<usize>>,
    slot: Vec<usize>,
}

impl CoverageLedger {
    fn new(universe: usize, target: usize) -> Self {
        let mut buckets = vec![Vec::new(); target];
        buckets[0] = (0..universe).collect();
        CoverageLedger {
            target,
            counts: vec![0; universe],
            buckets,
            slot: (0..universe).collect(),
        }
    }

    fn count(&self, gram: usize) -> usize {
        self.counts[gram]
    }

    fn bump(&mut self, gram: usize) {
        let c = self.counts[gram];
        if c < self.target {
            let pos = self.slot[gram];
            let bucket = &mut self.buckets[c];
            bucket.swap_remove(pos);
            if let Some(&moved) = bucket.get(pos) {
                self.slot[moved] = pos;
            }
            if c + 1 < self.target {
                self.slot[gram] = self.buckets[c + 1].len();
                self.buckets[c + 1].push(gram);
            }
        }
        self.counts[gram] = c + 1;
    }

    /// A random q-gram from the lowest non-empty bucket; `None` once every
    /// q-gram reaches the target.
    fn least_covered<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        self.buckets
            .iter()
            .find(|b| !b.is_empty())
            .and_then(|b| b.choose(rng).copied())
    }
}

fn rank(symbols: &[usize], base: usize) -> usize {
    symbols.iter().fold(0, |acc, &s| acc * base + s)
}

fn unrank(mut index: usize, len: usize, base: usize) -> Vec<usize> {
    let mut out = vec![0; len];
    for slot in out.iter_mut().rev() {
        *slot = index % base;
        index /= base;
    }
    out
}

/// Convenience wrapper: `generate(alphabet, k, m, rng)`.
pub fn generate<R: Rng + ?Sized>(alphabet: &Alphabet, k: usize, m: usize, rng: &mut R) -> Result<ReferenceSet> {
    ReferenceSetGenerator::new(alphabet.clone(), k).generate(m, rng)
}
