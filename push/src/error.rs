//! Error types for the `push` crate.

use std::error::Error as StdError;
use std::fmt;

use tokio_tungstenite::tungstenite;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// The connection could not be opened or broke while open.
    Connect,
    /// An inbound frame was not a valid event. The frame is dropped.
    MalformedEvent,
    /// The channel gave up after the configured number of failed attempts.
    MaxRetriesExceeded,
    /// The channel may not open for the current session (signed out, torn down or public page).
    NotAllowed,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Push channel error: {:?}", self.error_kind)?;
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

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Connect,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::MalformedEvent,
        }
    }
}

pub fn push_error(kind: ErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_frame_maps_to_malformed_event() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), &ErrorKind::MalformedEvent);
    }

    #[test]
    fn test_display_includes_message() {
        let err = push_error(ErrorKind::NotAllowed, "session is signed out");
        assert_eq!(
            err.to_string(),
            "Push channel error: NotAllowed (session is signed out)"
        );
    }
}
