use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Broad error category used for logging and retry decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input or request rejected as malformed by the homeserver.
    Config,
    /// Authentication/authorization failure.
    Auth,
    /// Transient network or transport failure.
    Network,
    /// Rate-limited by homeserver.
    RateLimited,
    /// Response body did not match the expected shape.
    Serialization,
    /// Anything the other categories do not cover.
    Internal,
}

/// Map HTTP status codes to error categories.
pub fn classify_http_status(status: u16) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::Auth,
        408 | 429 => ErrorCategory::RateLimited,
        400..=499 => ErrorCategory::Config,
        500..=599 => ErrorCategory::Network,
        _ => ErrorCategory::Internal,
    }
}

/// Error object returned by the homeserver in non-2xx response bodies.
///
/// Both fields are empty when the failure did not carry one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatrixError {
    /// Machine-readable code, for example `M_FORBIDDEN`.
    #[serde(default)]
    pub errcode: String,
    /// Human-readable message.
    #[serde(default)]
    pub error: String,
    /// Retry hint sent along with `M_LIMIT_EXCEEDED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl MatrixError {
    pub fn is_empty(&self) -> bool {
        self.errcode.is_empty() && self.error.is_empty()
    }
}

/// Classified failure of a single request.
///
/// The fields are independent; any combination may be populated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestError {
    /// HTTP status, `None` when no response was received.
    pub status: Option<u16>,
    /// Server-reported error object, empty when not applicable.
    pub matrix_error: MatrixError,
    /// Transport failure detail (connection, TLS, timeout, DNS).
    pub transport: Option<String>,
    /// Local decode failure of the response body.
    pub parse_error: Option<String>,
}

/// Outcome of a request that did not produce the expected value.
#[derive(Debug, Clone, Copy)]
pub enum FailedCall<'a> {
    /// No response was received.
    Transport(&'a str),
    /// A non-2xx response was received.
    Status { status: u16, body: &'a [u8] },
    /// A 2xx response was received but its body could not be decoded.
    Decode { status: u16, error: &'a str },
    /// The request body could not be encoded; nothing was sent.
    Encode(&'a str),
}

/// Turn a failed call into a [`RequestError`].
pub fn classify_failure(failure: FailedCall<'_>) -> RequestError {
    match failure {
        FailedCall::Transport(detail) => RequestError {
            transport: Some(detail.to_owned()),
            ..RequestError::default()
        },
        FailedCall::Status { status, body } => {
            match serde_json::from_slice::<MatrixError>(body) {
                Ok(matrix_error) if !matrix_error.is_empty() => RequestError {
                    status: Some(status),
                    matrix_error,
                    ..RequestError::default()
                },
                Ok(_) => RequestError {
                    status: Some(status),
                    parse_error: Some("error body carries neither errcode nor error".to_owned()),
                    ..RequestError::default()
                },
                Err(err) => RequestError {
                    status: Some(status),
                    parse_error: Some(err.to_string()),
                    ..RequestError::default()
                },
            }
        }
        FailedCall::Decode { status, error } => RequestError {
            status: Some(status),
            parse_error: Some(error.to_owned()),
            ..RequestError::default()
        },
        FailedCall::Encode(error) => RequestError {
            parse_error: Some(error.to_owned()),
            ..RequestError::default()
        },
    }
}

impl RequestError {
    pub fn category(&self) -> ErrorCategory {
        match (self.status, &self.transport) {
            (Some(status), _) if !(200..300).contains(&status) => classify_http_status(status),
            (Some(_), _) => ErrorCategory::Serialization,
            (None, Some(_)) => ErrorCategory::Network,
            (None, None) if self.parse_error.is_some() => ErrorCategory::Serialization,
            (None, None) => ErrorCategory::Internal,
        }
    }

    /// Retry hint from an `M_LIMIT_EXCEEDED` body.
    pub fn retry_after(&self) -> Option<Duration> {
        self.matrix_error.retry_after_ms.map(Duration::from_millis)
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(4);
        if let Some(status) = self.status {
            parts.push(format!("status {status}"));
        }
        if !self.matrix_error.is_empty() {
            parts.push(format!(
                "{}: {}",
                self.matrix_error.errcode, self.matrix_error.error
            ));
        }
        if let Some(transport) = &self.transport {
            parts.push(format!("transport: {transport}"));
        }
        if let Some(parse_error) = &self.parse_error {
            parts.push(format!("parse error: {parse_error}"));
        }

        if parts.is_empty() {
            f.write_str("request failed")
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}

impl std::error::Error for RequestError {}
