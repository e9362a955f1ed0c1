//! Raw updates pushed by the transport.
//!
//! The transport delivers terse notifications that reference messages only
//! by id.  Every notification is classified into one variant of
//! [`RawUpdate`]; kinds the session layer does not route are kept as
//! [`RawUpdate::Other`] so raw subscribers still see them.

use std::fmt;

use tokio::sync::mpsc;

use crate::message::MessageId;
use crate::peer::RawPeer;

// ─── Payloads ────────────────────────────────────────────────────────────────

/// A message appeared in a conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateMessage {
    pub peer:       RawPeer,
    pub mid:        MessageId,
    pub sender_uid: i64,
}

/// A user acted on an interactive widget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateInteractiveMediaEvent {
    pub mid:   MessageId,
    /// Action id.
    pub id:    String,
    pub value: Option<String>,
    pub uid:   i64,
}

// ─── RawUpdate ───────────────────────────────────────────────────────────────

/// An update as emitted by the transport.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawUpdate {
    Message(UpdateMessage),
    InteractiveMediaEvent(UpdateInteractiveMediaEvent),
    /// Any kind not routed by the session layer (typing, presence, …).
    Other { kind: String },
}

impl RawUpdate {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::Message(_)               => UpdateKind::Message,
            Self::InteractiveMediaEvent(_) => UpdateKind::InteractiveMediaEvent,
            Self::Other { .. }             => UpdateKind::Other,
        }
    }

    /// The message this update refers to, if any.
    pub fn mid(&self) -> Option<&MessageId> {
        match self {
            Self::Message(u)               => Some(&u.mid),
            Self::InteractiveMediaEvent(u) => Some(&u.mid),
            Self::Other { .. }             => None,
        }
    }
}

/// Discriminant of [`RawUpdate`], used to label callback failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Message,
    InteractiveMediaEvent,
    Other,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Message               => "UpdateMessage",
            Self::InteractiveMediaEvent => "UpdateInteractiveMediaEvent",
            Self::Other                 => "Update",
        })
    }
}

// ─── UpdateStream ────────────────────────────────────────────────────────────

/// Ordered stream of [`RawUpdate`]s from the transport.
pub struct UpdateStream {
    rx: mpsc::UnboundedReceiver<RawUpdate>,
}

impl UpdateStream {
    pub fn new(rx: mpsc::UnboundedReceiver<RawUpdate>) -> Self {
        Self { rx }
    }

    /// Create a connected sender/stream pair.
    pub fn channel() -> (mpsc::UnboundedSender<RawUpdate>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next update. Returns `None` once the transport has
    /// dropped its sender.
    pub async fn next(&mut self) -> Option<RawUpdate> {
        self.rx.recv().await
    }
}
