//! Error types for hybridpack.
//!
//! Fatal and non-fatal failures share one enum; the pipeline decides which
//! variants abort a run. Manifest decoding errors ([`Error::MalformedManifest`],
//! [`Error::UnexpectedLayout`]) only degrade the result, everything else is
//! propagated to the caller.

use thiserror::Error;

/// Error type for archive, manifest and pipeline operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The input is not a readable ZIP container, or one of its entries
    /// cannot be represented safely on disk.
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    /// A binary read ran past the end of its buffer.
    #[error("Read of {wanted} bytes at offset {offset} exceeds buffer ({available} bytes left)")]
    OutOfBounds {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    /// The compiled manifest chunk stream could not be decoded.
    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    /// The bundle manifest does not have the field layout the scanner expects.
    #[error("Unexpected manifest layout: {0}")]
    UnexpectedLayout(String),

    /// The external transform (or native protector) did not succeed.
    #[error("{tool} failed: {reason}")]
    ExternalTransformFailure { tool: String, reason: String },

    /// The archive being written does not fit the ZIP32 format.
    #[error("Archive too large: {0}")]
    ArchiveTooLarge(String),

    /// Invalid invocation: missing input, unknown package kind, tool not found.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),
}

impl Error {
    /// Whether the pipeline may continue after this error.
    ///
    /// Only manifest decoding failures are recoverable: the run proceeds
    /// without an application identifier.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedManifest(_) | Error::UnexpectedLayout(_) | Error::OutOfBounds { .. }
        )
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
