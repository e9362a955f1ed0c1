//! Message identifiers, resolved messages and interactive payloads.

use std::fmt;

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::peer::Peer;

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Transport-assigned message id (`mid`), used for resolution lookups.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct MessageId(pub String);

/// Logical message id (`rid`), used when replying to or editing a message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Rid(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self { Self(s.to_string()) }
        }

        impl From<String> for $ty {
            fn from(s: String) -> Self { Self(s) }
        }
    };
}

string_id!(MessageId);
string_id!(Rid);

// ─── Content ─────────────────────────────────────────────────────────────────

/// A file stored by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileReference {
    pub file_id:     i64,
    pub access_hash: i64,
}

/// A downloadable location for a [`FileReference`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileDescription {
    pub file_id: i64,
    pub url:     String,
    /// Seconds until `url` stops working.
    pub timeout: u32,
}

/// Low-quality inline preview sent alongside a photo.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Thumbnail {
    /// `data:image/jpeg;base64,…` URI.
    pub base64: String,
    pub width:  u32,
    pub height: u32,
}

/// Body of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(tag = "type", rename_all = "lowercase"))]
pub enum MessageContent {
    Text     { text: String },
    Document { file: FileReference, name: String, size: u64 },
    /// Join/leave and similar notices generated by the server.
    Service  { text: String },
    Unsupported,
}

impl MessageContent {
    /// The text of a text message.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Reply or forward reference carried by an incoming message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(tag = "type", rename_all = "lowercase"))]
pub enum MessageAttachment {
    Reply   { mids: Vec<MessageId> },
    Forward { mids: Vec<MessageId> },
}

/// Reply or forward reference attached to an outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(tag = "type", rename_all = "lowercase"))]
pub enum OutAttach {
    Reply   { peer: Peer, rids: Vec<Rid> },
    Forward { peer: Peer, rids: Vec<Rid> },
}

impl OutAttach {
    /// Reply to a single message.
    pub fn reply(peer: Peer, rid: Rid) -> Self {
        Self::Reply { peer, rids: vec![rid] }
    }
}

// ─── RawMessage / Message ────────────────────────────────────────────────────

/// A message as returned by [`crate::transport::Transport::fetch_message`].
///
/// The transport does not repeat the `mid` or peer it was asked about; the
/// resolution queue fills those in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMessage {
    pub rid:        Rid,
    pub sender_id:  i64,
    pub content:    MessageContent,
    pub attachment: Option<MessageAttachment>,
    /// Server timestamp in Unix milliseconds.
    pub date_ms:    i64,
}

/// A fully resolved message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Message {
    pub rid:        Rid,
    pub mid:        MessageId,
    pub peer:       Peer,
    pub sender_id:  i64,
    pub content:    MessageContent,
    pub attachment: Option<MessageAttachment>,
    pub timestamp:  DateTime<Utc>,
}

impl Message {
    pub(crate) fn from_raw(peer: Peer, mid: MessageId, raw: RawMessage) -> Self {
        // Out-of-range timestamps fall back to the epoch.
        let timestamp = DateTime::from_timestamp_millis(raw.date_ms).unwrap_or_default();
        Self {
            rid: raw.rid,
            mid,
            peer,
            sender_id: raw.sender_id,
            content: raw.content,
            attachment: raw.attachment,
            timestamp,
        }
    }

    /// The message text, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        self.content.text()
    }

    /// Build the attachment for replying to this message.
    pub fn reply_attach(&self) -> OutAttach {
        OutAttach::reply(self.peer, self.rid.clone())
    }
}

/// Lightweight locator for a message: where and which.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MessageRef {
    pub mid:  MessageId,
    pub rid:  Rid,
    pub peer: Peer,
}

// ─── Interactive media ────────────────────────────────────────────────────────

/// An action a user invoked on an interactive widget.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InteractiveEvent {
    /// The message carrying the widget.
    pub mid:         MessageId,
    /// Action id as declared in [`InteractiveAction::id`].
    pub id:          String,
    /// Value of the widget (selected option, button value), if any.
    pub value:       Option<String>,
    /// The user who acted.
    pub uid:         i64,
    pub message_ref: MessageRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// Widget rendered for an [`InteractiveAction`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(tag = "type", rename_all = "lowercase"))]
pub enum Widget {
    Button { value: String, label: String },
    Select { label: String, options: Vec<SelectOption>, default_value: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InteractiveAction {
    pub id:     String,
    pub widget: Widget,
}

impl InteractiveAction {
    pub fn button(id: impl Into<String>, value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id:     id.into(),
            widget: Widget::Button { value: value.into(), label: label.into() },
        }
    }
}

/// A titled row of interactive actions attached to a message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InteractiveActionGroup {
    pub title:       Option<String>,
    pub description: Option<String>,
    pub actions:     Vec<InteractiveAction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_fills_locator_fields() {
        let raw = RawMessage {
            rid:        Rid::from("r1"),
            sender_id:  99,
            content:    MessageContent::Text { text: "hi".into() },
            attachment: None,
            date_ms:    1_500_000_000_000,
        };
        let msg = Message::from_raw(Peer::user(42), MessageId::from("m1"), raw);
        assert_eq!(msg.mid.as_str(), "m1");
        assert_eq!(msg.peer, Peer::user(42));
        assert_eq!(msg.text(), Some("hi"));
        assert_eq!(msg.timestamp.timestamp(), 1_500_000_000);
        assert_eq!(msg.reply_attach(), OutAttach::Reply { peer: Peer::user(42), rids: vec![Rid::from("r1")] });
    }
}
