//! Error types for upload operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while uploading a file or a batch of files.
#[derive(Error, Debug)]
pub enum UploadError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// The local file does not exist. Raised before any remote call.
    #[error("File {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// The local file could not be read while computing its tree hash.
    #[error("Unable to hash file {}: {source}", .path.display())]
    HashFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The vault refused to start a multipart upload or returned no upload id.
    #[error("Unable to initiate upload of {name}: {reason}")]
    InitiateFailed { name: String, reason: String },

    /// A part used up its retry budget.
    #[error("Unable to upload {name} at offset {offset} after {attempts} attempts: {last}")]
    TransferFailed {
        name: String,
        offset: u64,
        attempts: u32,
        #[source]
        last: PartAttemptError,
    },

    /// A part index past the end of the file was requested.
    #[error("Part {index} is out of range for {name} ({parts} parts)")]
    PartOutOfRange { name: String, index: u64, parts: u64 },

    /// The vault refused to assemble the uploaded parts.
    #[error("Failed to complete upload of {name}: {reason}")]
    CommitFailed { name: String, reason: String },

    /// Configuration is missing or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why a single part attempt failed. Every variant is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartAttemptError {
    /// The vault reported a request timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The transport call failed for any other reason.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call succeeded but the response carried no checksum.
    #[error("response carried no checksum: {0}")]
    MissingChecksum(String),

    /// The vault computed a different checksum for the part than we did.
    #[error("hash does not match, expected {expected} got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}
