//! Error types for the pdfdesk library.
//!
//! Two types reflect two different owners of a failure:
//!
//! * [`DeskError`]: everything a request (or a client call) can end with.
//!   Each variant belongs to one [`ErrorKind`] and maps to one HTTP status,
//!   so the server boundary never has to guess.
//!
//! * [`TransformFailure`]: what a conversion engine reports back to the
//!   pipeline. The engine adapter classifies the failure ([`FailureKind`])
//!   where the information actually exists (a lopdf parse error, a process
//!   exit status) instead of the route handler scanning free text.

use crate::config::MIB;
use crate::operation::Operation;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

fn megabytes(bytes: &u64) -> f64 {
    *bytes as f64 / MIB as f64
}

fn whole_megabytes(bytes: &u64) -> u64 {
    bytes / MIB
}

/// Small counts in words, as the upload form phrases them.
fn count_word(n: &usize) -> String {
    const WORDS: [&str; 11] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    ];
    WORDS
        .get(*n)
        .map(|w| w.to_string())
        .unwrap_or_else(|| n.to_string())
}

/// Machine-checkable category of a [`DeskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Caller input violates a precondition. Nothing was staged or run.
    Validation,
    /// The conversion engine failed or timed out.
    Transform,
    /// Scratch storage could not be created, written or removed.
    Resource,
    /// Client-side failure talking to a pdfdesk server.
    Client,
    /// Anything else.
    Unexpected,
}

/// All errors returned by the pdfdesk library.
#[derive(Debug, Error)]
pub enum DeskError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The multipart field the operation reads was absent or empty.
    #[error("No file uploaded.")]
    MissingFile { field: &'static str },

    /// Declared MIME type or extension is not what the operation accepts.
    #[error("Only {accepted} files are supported.")]
    UnsupportedFile { name: String, accepted: &'static str },

    /// Merge received fewer files than it needs.
    #[error("Please upload at least {} PDF files.", count_word(.min))]
    TooFewFiles { got: usize, min: usize },

    /// Merge received more files than allowed.
    #[error("Too many files. Maximum {max} PDFs allowed.")]
    TooManyFiles { got: usize, max: usize },

    /// Sum of the merge members exceeds the aggregate cap.
    #[error(
        "Total file size ({:.2}MB) exceeds limit of {}MB",
        megabytes(.total_bytes),
        whole_megabytes(.limit_bytes)
    )]
    AggregateTooLarge { total_bytes: u64, limit_bytes: u64 },

    /// A single upload exceeds the per-file cap.
    #[error(
        "File '{name}' is too large ({:.2}MB). Maximum size is {}MB.",
        megabytes(.size_bytes),
        whole_megabytes(.limit_bytes)
    )]
    FileTooLarge {
        name: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    /// The request body was larger than the server accepts at all.
    #[error("Request body is too large. Maximum size is {}MB.", whole_megabytes(.limit_bytes))]
    BodyTooLarge { limit_bytes: u64 },

    /// The multipart body could not be parsed.
    #[error("Malformed upload: {detail}")]
    MalformedUpload { detail: String },

    // ── Transform errors ──────────────────────────────────────────────────
    /// The conversion engine reported a failure.
    #[error("{}", describe_failure(.operation, .failure))]
    Transform {
        operation: Operation,
        failure: TransformFailure,
    },

    /// The conversion engine did not finish within the configured timeout.
    #[error("{}: timed out after {secs}s", .operation.action())]
    TransformTimeout { operation: Operation, secs: u64 },

    // ── Resource errors ───────────────────────────────────────────────────
    /// Scratch workspace could not be created, written or removed.
    #[error("Scratch storage failure while {action}: {source}")]
    Scratch {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Client errors ─────────────────────────────────────────────────────
    /// A local input file given to the client does not exist.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The request never produced a response.
    #[error("Request to '{url}' failed: {reason}")]
    RequestFailed { url: String, reason: String },

    /// The server answered with an error status.
    #[error("Server rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The server answered 2xx with a payload of the wrong type.
    #[error("Expected a '{expected}' response, got '{got}'")]
    UnexpectedContentType { expected: &'static str, got: String },

    /// Could not write the downloaded payload.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeskError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeskError::MissingFile { .. }
            | DeskError::UnsupportedFile { .. }
            | DeskError::TooFewFiles { .. }
            | DeskError::TooManyFiles { .. }
            | DeskError::AggregateTooLarge { .. }
            | DeskError::FileTooLarge { .. }
            | DeskError::BodyTooLarge { .. }
            | DeskError::MalformedUpload { .. } => ErrorKind::Validation,
            DeskError::Transform { .. } | DeskError::TransformTimeout { .. } => {
                ErrorKind::Transform
            }
            DeskError::Scratch { .. } => ErrorKind::Resource,
            DeskError::FileNotFound { .. }
            | DeskError::RequestFailed { .. }
            | DeskError::Rejected { .. }
            | DeskError::UnexpectedContentType { .. }
            | DeskError::OutputWriteFailed { .. } => ErrorKind::Client,
            DeskError::InvalidConfig(_) | DeskError::Internal(_) => ErrorKind::Unexpected,
        }
    }

    /// HTTP status the server answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            DeskError::BodyTooLarge { .. } => 413,
            DeskError::Transform { failure, .. } if failure.kind == FailureKind::CorruptInput => {
                400
            }
            DeskError::Rejected { status, .. } => *status,
            _ if self.kind() == ErrorKind::Validation => 400,
            _ => 500,
        }
    }

    /// Message safe to show to the caller.
    ///
    /// Resource and unexpected errors carry paths and OS details that stay
    /// in the logs; the caller gets a generic message.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Resource | ErrorKind::Unexpected => "Internal server error.".to_string(),
            _ => self.to_string(),
        }
    }
}

/// How a conversion engine failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The input could not be parsed: corrupt, truncated or not the format
    /// it claimed to be.
    CorruptInput,
    /// The engine ran out of memory or was killed for it.
    ResourceExhausted,
    /// The engine is not installed or could not be started.
    Unavailable,
    /// Anything the adapter could not classify.
    Unknown,
}

/// A failure reported by a conversion engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl TransformFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::CorruptInput, detail)
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, detail)
    }
}

impl fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

/// Caller-facing message for an engine failure.
fn describe_failure(operation: &Operation, failure: &TransformFailure) -> String {
    match (*operation, failure.kind) {
        (Operation::Merge, FailureKind::CorruptInput) => {
            "One or more PDF files are corrupted or invalid.".to_string()
        }
        (Operation::Merge, FailureKind::ResourceExhausted) => {
            "Not enough memory to merge these files. Try with fewer files.".to_string()
        }
        (_, FailureKind::Unavailable) => format!(
            "{}: conversion engine is not available ({})",
            operation.action(),
            failure.detail
        ),
        _ if failure.detail.trim().is_empty() => format!("{}.", operation.action()),
        _ => format!("{}: {}", operation.action(), failure.detail.trim()),
    }
}
