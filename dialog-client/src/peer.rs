//! Canonical peers and the normalizer from transport peer shapes.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ─── Peer ─────────────────────────────────────────────────────────────────────

/// What kind of conversation a [`Peer`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum PeerKind {
    User,
    Group,
}

/// A conversation target, independent of how the transport encodes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Peer {
    pub kind: PeerKind,
    pub id:   i64,
}

impl Peer {
    pub fn user(id: i64) -> Self {
        Self { kind: PeerKind::User, id }
    }

    pub fn group(id: i64) -> Self {
        Self { kind: PeerKind::Group, id }
    }

    pub fn is_group(&self) -> bool {
        self.kind == PeerKind::Group
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PeerKind::User  => write!(f, "user:{}", self.id),
            PeerKind::Group => write!(f, "group:{}", self.id),
        }
    }
}

// ─── RawPeer ──────────────────────────────────────────────────────────────────

/// Peer as it appears inside a transport update.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(tag = "type", rename_all = "lowercase"))]
pub enum RawPeer {
    User  { id: i64 },
    Group { id: i64 },
    /// Any other tag the transport may emit (e.g. `private`, `bot`).
    Other { kind: String, id: i64 },
}

/// Map a transport peer onto a canonical [`Peer`].
///
/// Groups stay groups; every other shape addresses a user.
pub fn normalize(raw: &RawPeer) -> Peer {
    match *raw {
        RawPeer::Group { id }    => Peer::group(id),
        RawPeer::User { id }
        | RawPeer::Other { id, .. } => Peer::user(id),
    }
}

impl From<&RawPeer> for Peer {
    fn from(raw: &RawPeer) -> Self { normalize(raw) }
}

impl From<RawPeer> for Peer {
    fn from(raw: RawPeer) -> Self { normalize(&raw) }
}

// ─── Directory entries ────────────────────────────────────────────────────────

/// A user known to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct User {
    pub id:     i64,
    pub name:   String,
    pub nick:   Option<String>,
    pub is_bot: bool,
}

/// A group known to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Group {
    pub id:            i64,
    pub title:         String,
    pub members_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_stays_group() {
        assert_eq!(normalize(&RawPeer::Group { id: 5 }), Peer::group(5));
    }

    #[test]
    fn unknown_shapes_address_users() {
        let raw = RawPeer::Other { kind: "private".into(), id: 42 };
        assert_eq!(Peer::from(raw), Peer::user(42));
        assert_eq!(Peer::from(&RawPeer::User { id: 42 }), Peer::user(42));
    }

    #[test]
    fn equality_is_by_kind_and_id() {
        assert_ne!(Peer::user(1), Peer::group(1));
        assert_eq!(Peer::user(1).to_string(), "user:1");
    }
}
