//! RSE - Reference Set based Encoding
//!
//! Privacy-preserving record linkage by comparison with a shared set of
//! synthetic reference values. Each record's q-grams are compared with every
//! reference value and the comparison outcomes form a bit vector; parties
//! who share the reference set, the measure and the threshold produce
//! comparable encodings without revealing plaintext.
//!
//! The pipeline has three stages:
//! - [`ReferenceSetGenerator`] draws the initial set from a seeded RNG
//! - [`ReferenceSetProcessor`] rebalances it against q-gram frequencies
//! - [`Encoder`] maps q-gram sets to [`EncodedVector`]s
//!
//! ```
//! use rse::rng::seeded;
//! use rse::{Alphabet, Encoder, Measure, QGramMode, QGramSet, ReferenceSetGenerator, Threshold};
//!
//! let set = ReferenceSetGenerator::new(Alphabet::lowercase(), 3)
//!     .generate(64, &mut seeded(7))
//!     .unwrap();
//! let encoder = Encoder::new(&set, 2, Measure::Jaccard, Threshold::Cutoff(0.2)).unwrap();
//! let record = QGramSet::from_attributes(&["Anna", "Smith"], 2, QGramMode::Set).unwrap();
//! assert_eq!(encoder.encode(&record).unwrap().len(), 64);
//! ```

pub mod alphabet;
pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frequency;
pub mod generator;
pub mod processor;
pub mod qgram;
pub mod reference;
pub mod rng;
pub mod storage;
pub mod vector;

// Re-export main types for convenience
pub use alphabet::Alphabet;
pub use config::{RseConfig, TargetKind};
pub use encoder::{encode, Encoder, Measure, Orientation, QGramMeasure, Threshold};
pub use error::{Result, RseError};
pub use frequency::{FrequencyProfile, TargetDistribution};
pub use generator::{generate, ReferenceSetGenerator};
pub use processor::{
    DivergenceMetric, RebalanceOptions, RebalanceSummary, Rebalanced, ReferenceSetProcessor, StopReason,
};
pub use qgram::{QGramMode, QGramSet};
pub use reference::{ReferenceSet, ReferenceValue};
pub use vector::EncodedVector;
