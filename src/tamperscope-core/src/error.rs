//! Error types for extraction, environment queries and configuration.
//!
//! None of these escape a check run: detectors fold them into their
//! verdicts. They surface directly only from the extraction helpers and
//! from configuration loading.

use thiserror::Error;

/// Errors produced while locating or decoding the embedded identity document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    /// No container at the expected location.
    ///
    /// This is a valid state (unsigned or simulated builds), not tampering.
    #[error("No container present")]
    Absent,

    /// The container exists but could not be read.
    #[error("Container unreadable: {reason}")]
    Unreadable {
        /// Underlying I/O failure.
        reason: String,
    },

    /// Document markers not found, or the payload is not valid text.
    #[error("Container malformed: {reason}")]
    Malformed {
        /// What was missing or undecodable.
        reason: String,
    },

    /// Markers were found but the payload is not a valid document.
    #[error("Document parse failed: {0}")]
    DocumentParseFailed(#[from] DocumentError),
}

impl ContainerError {
    /// True when the container simply is not there.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Errors from the property-list parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The XML itself is not well formed.
    #[error("XML error at byte {position}: {reason}")]
    Xml {
        /// Byte offset reported by the reader.
        position: u64,
        /// Reader error message.
        reason: String,
    },

    /// An element appeared where the property-list grammar does not allow it.
    #[error("Unexpected element <{element}> in {context}")]
    UnexpectedElement {
        /// Element name as found.
        element: String,
        /// Grammar position.
        context: &'static str,
    },

    /// A scalar element held text that does not parse as its type.
    #[error("Invalid <{element}> value: {value:?}")]
    InvalidScalar {
        /// Element name.
        element: &'static str,
        /// Offending text.
        value: String,
    },

    /// Input ended before the document was complete.
    #[error("Unexpected end of document")]
    UnexpectedEof,

    /// Dicts and arrays are nested deeper than the parser allows.
    #[error("Document nesting exceeds {limit} levels")]
    TooDeep {
        /// Maximum accepted depth.
        limit: usize,
    },

    /// The document root is not a dictionary.
    #[error("Document root is {found}, expected dict")]
    RootNotDict {
        /// Kind of value found at the root.
        found: &'static str,
    },
}

/// Typed accessor failure on a [`DocumentValue`](crate::document::DocumentValue).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The value exists but has a different type.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested kind.
        expected: &'static str,
        /// Actual kind.
        found: &'static str,
    },
}

/// Failure of an environment capability query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The capability does not exist on this platform.
    #[error("{capability} is not supported on this platform")]
    Unsupported {
        /// Capability name.
        capability: &'static str,
    },

    /// The capability exists but the query failed.
    #[error("{capability} failed: {reason}")]
    Failed {
        /// Capability name.
        capability: &'static str,
        /// Failure detail.
        reason: String,
    },
}

impl QueryError {
    /// Build a [`QueryError::Failed`] from any displayable cause.
    pub fn failed(capability: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            capability,
            reason: reason.to_string(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read config {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`EngineConfig`](crate::config::EngineConfig).
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field value is out of range or missing.
    #[error("Invalid config field {field}: {reason}")]
    InvalidField {
        /// Field path.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
