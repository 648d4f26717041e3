//! Error types for the `gateway` crate.
//!
//! Follows the same pattern as the other workspace crates: a root Error struct
//! holding an error kind tree and an optional source.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the gateway crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    Auth(AuthErrorKind),
    Http(HttpErrorKind),
}

/// Errors from the session and its refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthErrorKind {
    /// The backend answered 401 and the request was already replayed once.
    Expired,
    /// The refresh cycle this request waited on did not renew the session.
    RefreshFailed,
    LoginFailed,
    /// The client was torn down; nothing is sent anymore.
    TornDown,
}

/// Errors from HTTP transport operations.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    InvalidUrl,
    /// Connection, timeout or other transient transport failure. Never triggers a refresh.
    Network,
    Encode,
    Decode,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn is_auth(&self, kind: AuthErrorKind) -> bool {
        self.error_kind == ErrorKind::Auth(kind)
    }

    pub fn is_network(&self) -> bool {
        self.error_kind == ErrorKind::Http(HttpErrorKind::Network)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Auth(kind) => write!(f, "Auth error: {:?}", kind)?,
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind)?,
        }
        match &self.source {
            Some(source) => write!(f, " ({source})"),
            None => Ok(()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_decode() {
            ErrorKind::Http(HttpErrorKind::Decode)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Http(HttpErrorKind::Decode),
        }
    }
}

/// Helper function to create auth errors.
pub fn auth_error(kind: AuthErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Auth(kind),
    }
}

/// Helper function to create HTTP errors.
pub fn http_error(kind: HttpErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Http(kind),
    }
}

/// Wraps the error that ended a refresh cycle so waiting callers see `RefreshFailed`
/// with the original cause attached.
pub fn refresh_failed(cause: &Error) -> Error {
    Error {
        source: Some(cause.to_string().into()),
        error_kind: ErrorKind::Auth(AuthErrorKind::RefreshFailed),
    }
}
