//! Errors this crate can emit.
use crate::client::{FileId, PartNumber};
use crate::dispatch::{ApiFailure, Endpoint, FailureKind};
use crate::upload::SessionState;

use std::fmt::{self, Display, Formatter};

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = ::std::result::Result<T, E>;

/// The value returned in this crate when an error occurs.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(pub(crate) ErrorRepr);

impl Error {
    /// The category of this error.
    ///
    /// Errors raised with upload session context report the kind of the
    /// underlying cause.
    pub fn kind(&self) -> ErrorKind {
        match &self.0 {
            ErrorRepr::Api(_) => ErrorKind::Api,
            ErrorRepr::Transport { .. } => ErrorKind::Transport,
            ErrorRepr::Decode { .. } => ErrorKind::Decode,
            ErrorRepr::Io(_) => ErrorKind::Io,
            ErrorRepr::Missing(_, _)
            | ErrorRepr::SizeOutOfBounds { .. }
            | ErrorRepr::Invalid(_) => ErrorKind::Validation,
            ErrorRepr::InvalidState { .. } => ErrorKind::State,
            ErrorRepr::Config(_) => ErrorKind::Config,
            ErrorRepr::ChecksumMismatch { .. } => ErrorKind::Integrity,
            ErrorRepr::Start { source, .. }
            | ErrorRepr::UploadPart { source, .. }
            | ErrorRepr::Finish { source, .. }
            | ErrorRepr::Cancel { source, .. } => source.kind(),
        }
    }

    /// The classified API failure behind this error, if the service rejected
    /// a request.
    ///
    /// This carries the original wire code and message, so callers can branch
    /// on codes this crate does not know about.
    pub fn failure(&self) -> Option<&ApiFailure> {
        match &self.0 {
            ErrorRepr::Api(failure) => Some(failure),
            ErrorRepr::Start { source, .. }
            | ErrorRepr::UploadPart { source, .. }
            | ErrorRepr::Finish { source, .. }
            | ErrorRepr::Cancel { source, .. } => source.failure(),
            _ => None,
        }
    }

    /// Shorthand for the [`FailureKind`] of [`failure`](Error::failure).
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure().map(|f| f.kind)
    }

    /// The part that was being uploaded when this error occurred, if any.
    pub fn part_number(&self) -> Option<PartNumber> {
        match &self.0 {
            ErrorRepr::UploadPart { part, .. } => Some(*part),
            _ => None,
        }
    }

    /// Tag a transport error with the endpoint it happened on.
    pub(crate) fn with_endpoint(self, endpoint: Endpoint) -> Self {
        match self.0 {
            ErrorRepr::Transport {
                endpoint: None,
                source,
            } => Self(ErrorRepr::Transport {
                endpoint: Some(endpoint),
                source,
            }),
            repr => Self(repr),
        }
    }

    /// Create a transport error from any other error type, for use by custom
    /// [`Transport`](crate::Transport) implementations.
    pub fn from_dyn<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(ErrorRepr::Transport {
            endpoint: None,
            source: Box::new(e),
        })
    }
}

impl From<ErrorRepr> for Error {
    fn from(value: ErrorRepr) -> Self {
        Self(value)
    }
}

impl From<ApiFailure> for Error {
    fn from(value: ApiFailure) -> Self {
        Self(ErrorRepr::Api(value))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self(ErrorRepr::Io(value))
    }
}

/// The category of the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The service answered with a non-success status.
    Api,
    /// The request could not be sent or the response could not be read.
    Transport,
    /// A response body did not have the expected shape.
    Decode,
    /// Reading the byte source failed.
    Io,
    /// Arguments were rejected before any request was made.
    Validation,
    /// The operation is not allowed in the current upload session state.
    State,
    /// The client could not be configured.
    Config,
    /// Downloaded content did not match its advertised checksum.
    Integrity,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Transport => write!(f, "transport"),
            Self::Decode => write!(f, "decode"),
            Self::Io => write!(f, "io"),
            Self::Validation => write!(f, "validation"),
            Self::State => write!(f, "state"),
            Self::Config => write!(f, "config"),
            Self::Integrity => write!(f, "integrity"),
        }
    }
}

/// Internal error type that we are free to change at will.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ErrorRepr {
    #[error(transparent)]
    Api(ApiFailure),
    #[error("sending {} failed: {source}", .endpoint.map_or("request", Endpoint::name))]
    Transport {
        endpoint: Option<Endpoint>,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error("decoding {} response failed: {source}", .endpoint.name())]
    Decode {
        endpoint: Endpoint,
        source: serde_json::Error,
    },
    #[error("reading source failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} missing required field: {1}")]
    Missing(&'static str, &'static str),
    #[error("{0}")]
    Invalid(String),
    #[error("source of {size} bytes is outside the allowed range {min}..={max}")]
    SizeOutOfBounds { size: u64, min: u64, max: u64 },
    #[error("cannot {op} an upload session in state {state}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("starting large file {file_name} failed: {source}")]
    Start { file_name: String, source: Box<Error> },
    #[error("uploading {part} of upload {file_id} failed: {source}")]
    UploadPart {
        file_id: FileId,
        part: PartNumber,
        source: Box<Error>,
    },
    #[error("finishing upload {file_id} with {parts} parts failed: {source}")]
    Finish {
        file_id: FileId,
        parts: usize,
        source: Box<Error>,
    },
    #[error("canceling upload {file_id} failed: {source}")]
    Cancel { file_id: FileId, source: Box<Error> },
}

impl ErrorRepr {
    pub(crate) fn from_start_err(file_name: &str) -> impl FnOnce(Error) -> Error {
        move |e| {
            Self::Start {
                file_name: file_name.to_string(),
                source: Box::new(e),
            }
            .into()
        }
    }

    pub(crate) fn from_upload_err(
        file_id: &FileId,
        part: PartNumber,
    ) -> impl FnOnce(Error) -> Error {
        move |e| {
            Self::UploadPart {
                file_id: file_id.clone(),
                part,
                source: Box::new(e),
            }
            .into()
        }
    }

    pub(crate) fn from_finish_err(
        file_id: &FileId,
        parts: usize,
    ) -> impl FnOnce(Error) -> Error {
        move |e| {
            Self::Finish {
                file_id: file_id.clone(),
                parts,
                source: Box::new(e),
            }
            .into()
        }
    }

    pub(crate) fn from_cancel_err(file_id: &FileId) -> impl FnOnce(Error) -> Error {
        move |e| {
            Self::Cancel {
                file_id: file_id.clone(),
                source: Box::new(e),
            }
            .into()
        }
    }
}
