//! Error types for dialog-client.
//!
//! Four families, one per failure domain:
//! construction ([`ConfigurationError`]), login ([`AuthenticationError`]),
//! per-message lookups ([`ResolutionError`]) and subscriber callbacks
//! ([`CallbackError`]).  [`Error`] is the umbrella type handed to
//! `on_error` subscribers and returned from passthrough calls.

use std::any::Any;
use std::fmt;

use thiserror::Error as ThisError;

use crate::message::MessageId;
use crate::update::UpdateKind;

/// Boxed error returned by subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ─── TransportError ──────────────────────────────────────────────────────────

/// An error reported by the transport collaborator.
///
/// The transport identifies failures by a `tag` (e.g. `PHONE_CODE_INVALID`)
/// and a human readable `message`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportError {
    /// Machine readable error tag in SCREAMING_SNAKE_CASE.
    pub tag:     String,
    /// Description supplied by the server.
    pub message: String,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.tag)
        } else {
            write!(f, "{}: {}", self.tag, self.message)
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    pub fn new(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self { tag: tag.into(), message: message.into() }
    }

    /// Match on the tag, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("NOT_FOUND")` — exact match
    /// - `err.is("PHONE_*")` — starts-with match
    /// - `err.is("*_INVALID")` — ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.tag.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.tag.ends_with(suffix)
        } else {
            self.tag == pattern
        }
    }
}

// ─── ConfigurationError ──────────────────────────────────────────────────────

/// Raised synchronously by [`crate::ClientBuilder::start`]; never reaches the transport.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigurationError {
    /// Neither SMS nor password credentials were supplied.
    #[error("auth credentials not defined: set phone + code or username + password")]
    MissingCredentials,
    /// Both SMS and password credentials were supplied.
    #[error("conflicting auth credentials: use either phone + code or username + password, not both")]
    ConflictingCredentials,
    /// One half of a credential pair is missing.
    #[error("incomplete auth credentials: `{0}` is missing")]
    IncompleteCredential(&'static str),
    /// The endpoint list is empty.
    #[error("no endpoints configured")]
    NoEndpoints,
    /// `ClientBuilder::start` was called outside a Tokio runtime.
    #[error("no Tokio runtime available to drive the session")]
    NoRuntime,
}

// ─── AuthenticationError ─────────────────────────────────────────────────────

/// The session could not be established.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthenticationError {
    /// The transport could not connect to any endpoint.
    #[error("connect failed: {0}")]
    Connect(TransportError),
    /// The transport rejected the credentials.
    #[error("{0}")]
    Rejected(TransportError),
    /// The session task went away before finishing authentication.
    #[error("session dropped before authentication completed")]
    Aborted,
}

impl AuthenticationError {
    /// The transport error behind this failure, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Connect(e) | Self::Rejected(e) => Some(e),
            Self::Aborted                        => None,
        }
    }
}

// ─── ResolutionError ─────────────────────────────────────────────────────────

/// Fetching a specific message failed.
///
/// Cloned to every caller that was waiting on the same fetch.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("failed to resolve message {mid}: {source}")]
pub struct ResolutionError {
    pub mid:    MessageId,
    #[source]
    pub source: TransportError,
}

// ─── CallbackError ───────────────────────────────────────────────────────────

/// A subscriber callback failed (returned `Err` or panicked) while handling
/// one update.
#[derive(Debug, ThisError)]
#[error("{kind} handler failed{}: {source}", .mid.as_ref().map(|m| format!(" (mid {m})")).unwrap_or_default())]
pub struct CallbackError {
    /// Which route the failing callback was registered on.
    pub kind:   UpdateKind,
    /// The message the update referred to, if any.
    pub mid:    Option<MessageId>,
    #[source]
    pub source: BoxError,
}

impl CallbackError {
    pub(crate) fn panicked(kind: UpdateKind, mid: Option<MessageId>, payload: &(dyn Any + Send)) -> Self {
        Self { kind, mid, source: format!("handler panicked: {}", panic_text(payload)).into() }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ─── Error ───────────────────────────────────────────────────────────────────

/// Every error the session layer can surface.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Callback(#[from] CallbackError),
    /// A passthrough request (send, edit, lookup) failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// A local image could not be read or thumbnailed.
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Returns `true` if this wraps a transport error whose tag matches
    /// `pattern` (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Transport(e)      => e.is(pattern),
            Self::Resolution(e)     => e.source.is(pattern),
            Self::Authentication(e) => e.transport_error().is_some_and(|t| t.is(pattern)),
            _                       => false,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matching() {
        let e = TransportError::new("PHONE_CODE_INVALID", "The code is invalid");
        assert!(e.is("PHONE_CODE_INVALID"));
        assert!(e.is("PHONE_*"));
        assert!(e.is("*_INVALID"));
        assert!(!e.is("PASSWORD_*"));
    }

    #[test]
    fn rejected_displays_tag_and_message() {
        let e = AuthenticationError::Rejected(TransportError::new("PASSWORD_INVALID", "wrong password"));
        assert_eq!(e.to_string(), "PASSWORD_INVALID: wrong password");
        assert!(Error::from(e).is("PASSWORD_*"));
    }

    #[test]
    fn callback_error_mentions_mid() {
        let e = CallbackError {
            kind:   UpdateKind::Message,
            mid:    Some(MessageId::from("m1")),
            source: "boom".into(),
        };
        assert_eq!(e.to_string(), "UpdateMessage handler failed (mid m1): boom");
    }

    #[test]
    fn panic_payload_is_captured() {
        let e = CallbackError::panicked(UpdateKind::InteractiveMediaEvent, None, &"kaput");
        assert_eq!(e.to_string(), "UpdateInteractiveMediaEvent handler failed: handler panicked: kaput");
    }
}
