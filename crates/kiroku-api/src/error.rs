use std::fmt;

use thiserror::Error;

/// Outcome of every network-derived value.
pub type ApiResult<T> = Result<T, ApiError>;

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Unauthorized,
    NotFound,
    ServerError,
    DecodeError,
    Unknown,
}

impl ErrorKind {
    /// Map a non-2xx HTTP status onto the taxonomy.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            404 => Self::NotFound,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Network => "network error",
            Self::Timeout => "timed out",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not found",
            Self::ServerError => "server error",
            Self::DecodeError => "decode error",
            Self::Unknown => "request failed",
        };
        f.write_str(label)
    }
}

/// A classified request failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}: {message}", status_suffix(.status))]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Failure for a non-2xx response.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::from_status(status),
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn decode(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::DecodeError,
            message: message.into(),
            status: Some(status),
        }
    }

    /// The owning application should prompt for re-authentication.
    pub fn is_auth_failure(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Dispatch helpers for [`ApiResult`].
///
/// Lets callers react to either branch while keeping the result intact for
/// further chaining; neither helper can fail or unwrap.
pub trait Outcome<T> {
    fn is_success(&self) -> bool;

    /// Run `f` on the value if this is a success.
    fn on_success<F: FnOnce(&T)>(self, f: F) -> Self;

    /// Run `f` on the error if this is a failure.
    fn on_error<F: FnOnce(&ApiError)>(self, f: F) -> Self;
}

impl<T> Outcome<T> for ApiResult<T> {
    fn is_success(&self) -> bool {
        self.is_ok()
    }

    fn on_success<F: FnOnce(&T)>(self, f: F) -> Self {
        if let Ok(value) = &self {
            f(value);
        }
        self
    }

    fn on_error<F: FnOnce(&ApiError)>(self, f: F) -> Self {
        if let Err(error) = &self {
            f(error);
        }
        self
    }
}
