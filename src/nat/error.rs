//! Error types.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Error types for technique selection and connection establishment
#[derive(Debug, Error)]
pub enum UceError {
    /// Decision table could not be built
    #[error("Decision table error: {0}")]
    Table(#[from] TableError),

    /// Malformed or unrecognized message
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] io::Error),

    /// Mediator or peer did not answer within the bound
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Mediator answered with an error response
    #[error("Request rejected by mediator: {code} - {reason}")]
    Rejected {
        /// Code from the ERROR-CODE attribute
        code: u16,
        /// Reason from the ERROR-CODE attribute
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl UceError {
    /// Whether repeating the same technique can reasonably succeed.
    ///
    /// Transport failures and timeouts are attempt-scoped; table, protocol and
    /// rejection failures will repeat identically and should be escalated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_))
    }
}

/// Decision table parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// Record line does not hold four fields
    #[error("line {line}: {reason}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// What is wrong with the line
        reason: String,
    },

    /// Field names no NAT feature realization
    #[error("line {line}: unknown NAT feature realization `{name}`")]
    UnknownFeature {
        /// 1-based line number
        line: usize,
        /// Offending field
        name: String,
    },

    /// Section header names no traversal technique
    #[error("line {line}: unknown traversal technique `{name}`")]
    UnknownTechnique {
        /// 1-based line number
        line: usize,
        /// Offending section name
        name: String,
    },

    /// Record appears before any section header
    #[error("line {line}: record outside of a technique section")]
    MissingSection {
        /// 1-based line number
        line: usize,
    },

    /// Structured (JSON) table could not be read
    #[error("invalid JSON table: {0}")]
    Json(String),
}

/// Message framing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Fewer bytes than the frame header or an attribute header needs
    #[error("Truncated message: needed {needed} bytes, got {available}")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes present
        available: usize,
    },

    /// No registered decoder knows the method code
    #[error("Unknown method code: 0x{0:04X}")]
    UnknownMethod(u16),

    /// Semantic level marker out of range
    #[error("Unknown semantic level: 0x{0:02X}")]
    UnknownSemanticLevel(u8),

    /// Attribute declares more payload than the frame carries
    #[error("Attribute 0x{attr_type:04X} declares {declared} bytes, only {available} available")]
    AttributeLength {
        /// Attribute type tag
        attr_type: u16,
        /// Length from the attribute header
        declared: usize,
        /// Bytes left in the frame
        available: usize,
    },

    /// Bytes left over after the declared attributes
    #[error("{0} trailing bytes after last attribute")]
    TrailingBytes(usize),

    /// Attribute payload is structurally invalid
    #[error("Failed to parse attribute 0x{attr_type:04X}: {reason}")]
    InvalidAttribute {
        /// Attribute type tag
        attr_type: u16,
        /// What is wrong with the payload
        reason: String,
    },

    /// Required attribute absent
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),

    /// Response carries a different method than the request
    #[error("Unexpected method {actual}, expected {expected}")]
    UnexpectedMethod {
        /// Method of the request
        expected: &'static str,
        /// Method received
        actual: &'static str,
    },
}

/// Result type for UCE operations
pub type UceResult<T> = Result<T, UceError>;
