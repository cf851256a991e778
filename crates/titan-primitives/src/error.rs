//! A closed error-kind taxonomy. Every fallible boundary in
//! Titan — storage, runtime, directory, transactions, streams, the gateway —
//! converges on [`TitanError`] so that callers across process and crate
//! boundaries get a uniform, tagged outcome rather than ad-hoc string errors.
//!
//! Individual crates define their own `thiserror` enums for local detail (as
//! `core/src/error.rs`, `control_db.rs`, and `auth/token_validation.rs`
//! do) and convert into [`TitanError`] at the crate boundary, preserving the
//! kind but keeping the diagnostic message.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of error kinds. Callers branch on `kind()`,
/// never on the message.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    RateLimited,
    Timeout,
    Transient,
    Fatal,
}

impl ErrorKind {
    /// Whether a caller should retry an operation that failed with this
    /// kind. `RateLimited` is retryable only after `retry_after`.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::Timeout | ErrorKind::Transient | ErrorKind::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Transient => "Transient",
            ErrorKind::Fatal => "Fatal",
        };
        f.write_str(s)
    }
}

/// A tagged error that crosses a cell, crate, or process boundary with its
/// kind preserved verbatim. `Serialize`/`Deserialize` let it cross an actual
/// process boundary too, over the internal node-to-node forwarding path.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TitanError {
    pub kind: ErrorKind,
    pub message: String,
    /// Set only for `ErrorKind::RateLimited`.
    pub retry_after: Option<Duration>,
}

impl TitanError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), retry_after: None }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: "rate limit exceeded".into(),
            retry_after: Some(retry_after),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub type TitanResult<T> = Result<T, TitanError>;
