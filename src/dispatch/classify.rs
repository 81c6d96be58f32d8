use super::HttpResponse;

use serde::Deserialize;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// The closed set of failures the service reports.
///
/// Each variant corresponds to one wire error code. Codes this crate does not
/// know map to [`FailureKind::Unclassified`]; the raw code stays available on
/// the [`ApiFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FailureKind {
    /// `bad_request`: the request was malformed or had invalid parameters.
    BadRequest,
    /// `bad_bucket_id`: the bucket does not exist or is not the key's.
    BadBucketId,
    /// `duplicate_bucket_name`: the bucket name is taken.
    DuplicateBucketName,
    /// `too_many_buckets`: the account bucket limit was reached.
    TooManyBuckets,
    /// `not_found`: the file or bucket does not exist.
    NotFound,
    /// `file_not_present`: the file version was deleted or never existed.
    FileNotPresent,
    /// `range_not_satisfiable`: the requested byte range is outside the file.
    RangeNotSatisfiable,
    /// `conflict`: the request conflicts with the state of the resource.
    Conflict,
    /// `method_not_allowed`: the HTTP method is not supported.
    MethodNotAllowed,
    /// `request_timeout`: the service timed out reading the request.
    RequestTimeout,
    /// A usage cap of the account was exceeded.
    CapExceeded,
    /// `access_denied`: the key lacks the capability for this call.
    AccessDenied,
    /// `unauthorized`: the credentials were rejected.
    Unauthorized,
    /// `bad_auth_token`: the token is not valid.
    BadAuthToken,
    /// `expired_auth_token`: the token expired and has to be renewed.
    ExpiredAuthToken,
    /// `too_many_requests`: rate limited.
    TooManyRequests,
    /// `service_unavailable`: temporarily unable to serve the request.
    ServiceUnavailable,
    /// `internal_error`: the service failed unexpectedly.
    InternalError,
    /// A code this crate does not recognize, or none at all.
    Unclassified,
}

impl FailureKind {
    /// The broad cause of this failure, which determines how it is handled.
    pub fn category(self) -> FailureCategory {
        match self {
            Self::TooManyRequests | Self::ServiceUnavailable => {
                FailureCategory::TransientInfrastructure
            }
            Self::ExpiredAuthToken => FailureCategory::AuthorizationExpired,
            Self::Unclassified => FailureCategory::Unclassified,
            _ => FailureCategory::ClientValidation,
        }
    }

    /// Whether an upload capability that produced this failure should be
    /// replaced before trying again.
    pub fn invalidates_capability(self) -> bool {
        matches!(
            self,
            Self::BadAuthToken | Self::ExpiredAuthToken | Self::ServiceUnavailable
        )
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadRequest => "bad request",
            Self::BadBucketId => "bad bucket id",
            Self::DuplicateBucketName => "duplicate bucket name",
            Self::TooManyBuckets => "too many buckets",
            Self::NotFound => "not found",
            Self::FileNotPresent => "file not present",
            Self::RangeNotSatisfiable => "range not satisfiable",
            Self::Conflict => "conflict",
            Self::MethodNotAllowed => "method not allowed",
            Self::RequestTimeout => "request timeout",
            Self::CapExceeded => "cap exceeded",
            Self::AccessDenied => "access denied",
            Self::Unauthorized => "unauthorized",
            Self::BadAuthToken => "bad auth token",
            Self::ExpiredAuthToken => "expired auth token",
            Self::TooManyRequests => "too many requests",
            Self::ServiceUnavailable => "service unavailable",
            Self::InternalError => "internal error",
            Self::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}

/// How a failure is handled by the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Rate limiting or temporary unavailability, retried automatically.
    TransientInfrastructure,
    /// The account token expired; refreshed and replayed once.
    AuthorizationExpired,
    /// The request itself was rejected and is never retried.
    ClientValidation,
    /// A code this crate does not recognize.
    Unclassified,
}

/// Map an HTTP status and wire error code to a [`FailureKind`].
///
/// The wire code decides. The status only disambiguates codes the service
/// reuses across statuses, such as `unauthorized`.
pub fn classify(status: u16, code: &str) -> FailureKind {
    match (status, code) {
        (_, "bad_request") => FailureKind::BadRequest,
        (_, "bad_bucket_id" | "invalid_bucket_id") => FailureKind::BadBucketId,
        (_, "duplicate_bucket_name") => FailureKind::DuplicateBucketName,
        (_, "too_many_buckets") => FailureKind::TooManyBuckets,
        (_, "not_found") => FailureKind::NotFound,
        (_, "file_not_present") => FailureKind::FileNotPresent,
        (_, "range_not_satisfiable") => FailureKind::RangeNotSatisfiable,
        (_, "conflict") => FailureKind::Conflict,
        (_, "method_not_allowed") => FailureKind::MethodNotAllowed,
        (_, "request_timeout") => FailureKind::RequestTimeout,
        (_, "cap_exceeded" | "download_cap_exceeded" | "storage_cap_exceeded")
        | (_, "transaction_cap_exceeded") => FailureKind::CapExceeded,
        (_, "access_denied") => FailureKind::AccessDenied,
        (401, "unauthorized") => FailureKind::Unauthorized,
        (403, "unauthorized") => FailureKind::AccessDenied,
        (_, "unauthorized") => FailureKind::Unauthorized,
        (_, "bad_auth_token") => FailureKind::BadAuthToken,
        (_, "expired_auth_token") => FailureKind::ExpiredAuthToken,
        (_, "too_many_requests") => FailureKind::TooManyRequests,
        (_, "service_unavailable") => FailureKind::ServiceUnavailable,
        (_, "internal_error") => FailureKind::InternalError,
        _ => FailureKind::Unclassified,
    }
}

/// A request rejected by the service.
///
/// The original status, wire code and message are always preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    /// Classified failure.
    pub kind: FailureKind,
    /// HTTP status of the response.
    pub status: u16,
    /// Wire error code, empty if the body carried none.
    pub code: String,
    /// Human readable message from the service.
    pub message: String,
    /// Server-supplied delay from the `Retry-After` header.
    pub retry_after: Option<Duration>,
}

impl ApiFailure {
    /// Create a failure from status, code and message.
    pub fn new<C, M>(status: u16, code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        let code = code.into();
        Self {
            kind: classify(status, &code),
            status,
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Set the server-supplied retry delay.
    pub fn with_retry_after(self, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..self
        }
    }

    /// Build the failure carried by a non-success response.
    ///
    /// A body that is not the expected JSON shape still yields a failure with
    /// an empty code and the raw body as the message.
    pub fn from_response(resp: &HttpResponse) -> Self {
        let retry_after = resp
            .header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let failure = match serde_json::from_slice::<ErrorBody>(&resp.body) {
            Ok(body) => Self::new(
                resp.status,
                body.code.unwrap_or_default(),
                body.message.unwrap_or_default(),
            ),
            Err(_) => Self::new(
                resp.status,
                "",
                String::from_utf8_lossy(&resp.body).into_owned(),
            ),
        };
        failure.with_retry_after(retry_after)
    }
}

impl Display for ApiFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}): {}",
            self.kind, self.status, self.code, self.message
        )
    }
}

impl std::error::Error for ApiFailure {}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}
