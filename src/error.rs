//! Error types for reference set encoding
//!
//! Configuration problems are reported eagerly, before any sampling or
//! encoding work starts. A rebalancing pass that could not improve every slot
//! is *not* an error; see [`crate::processor::RebalanceSummary`].

use std::fmt;
use std::io;

/// Result type for RSE operations
pub type Result<T> = std::result::Result<T, RseError>;

/// Errors produced by the generator, processor, encoder and storage layers.
#[derive(Debug)]
pub enum RseError {
    /// Invalid or impossible parameter combination
    ///
    /// # Common Causes
    /// - alphabet too small for the requested `k`/`m`
    /// - empty q-gram set or empty reference set passed to the encoder
    /// - `q` larger than `k`
    Configuration { reason: String },

    /// I/O error reading or writing a reference set, profile or encoding file
    Io(io::Error),

    /// Malformed line in an input file
    Parse {
        origin: String,
        line: usize,
        reason: String,
    },

    /// Failure in a serde backend (JSON config, bincode output)
    Serialization(String),
}

impl RseError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        RseError::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(origin: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        RseError::Parse {
            origin: origin.into(),
            line,
            reason: reason.into(),
        }
    }

    /// True for [`RseError::Configuration`].
    pub fn is_configuration(&self) -> bool {
        matches!(self, RseError::Configuration { .. })
    }
}

impl fmt::Display for RseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RseError::Configuration { reason } => write!(f, "configuration error: {reason}"),
            RseError::Io(e) => write!(f, "I/O error: {e}"),
            RseError::Parse {
                origin,
                line,
                reason,
            } => write!(f, "{origin}:{line}: {reason}"),
            RseError::Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for RseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RseError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RseError {
    fn from(e: io::Error) -> Self {
        RseError::Io(e)
    }
}

impl From<serde_json::Error> for RseError {
    fn from(e: serde_json::Error) -> Self {
        RseError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for RseError {
    fn from(e: bincode::Error) -> Self {
        RseError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_for_parse_errors() {
        let e = RseError::parse("profile.csv", 7, "missing count");
        assert_eq!(e.to_string(), "profile.csv:7: missing count");
    }

    #[test]
    fn configuration_predicate() {
        assert!(RseError::config("bad").is_configuration());
        let io_err: RseError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(!io_err.is_configuration());
        assert!(std::error::Error::source(&io_err).is_some());
    }
}
