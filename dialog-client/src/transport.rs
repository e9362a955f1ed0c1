//! The transport collaborator.
//!
//! dialog-client never speaks the wire protocol itself.  A [`Connector`] is
//! injected into [`crate::Client::builder`]; it owns whatever environment the
//! underlying client needs (storage, sockets, file access) and hands back a
//! connected [`Transport`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::message::{
    FileDescription, FileReference, InteractiveActionGroup, MessageId, MessageRef, OutAttach,
    RawMessage, Rid, Thumbnail,
};
use crate::peer::{Group, Peer, User};
use crate::update::UpdateStream;

/// Opens a transport connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect to the first reachable endpoint.
    async fn connect(&self, endpoints: &[String]) -> Result<Arc<dyn Transport>, TransportError>;
}

/// A connected transport.
///
/// Login happens in two steps per method: the first call asks the server to
/// start the flow and resolves once it acknowledges; the second submits the
/// secret.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    // ── Auth ──────────────────────────────────────────────────────────────

    /// Ask the server to send a one-time code to `phone`.
    async fn request_sms(&self, phone: &str) -> Result<(), TransportError>;

    /// Submit the code received by SMS.
    async fn send_code(&self, code: &str) -> Result<(), TransportError>;

    /// Start username-based authentication.
    async fn start_username_auth(&self, username: &str) -> Result<(), TransportError>;

    /// Submit the password for the username given to
    /// [`Transport::start_username_auth`].
    async fn send_password(&self, password: &str) -> Result<(), TransportError>;

    /// Id of the authenticated account. Only meaningful after login.
    fn own_id(&self) -> i64;

    // ── Updates ───────────────────────────────────────────────────────────

    /// Subscribe to pushed updates, in server order.
    fn subscribe_updates(&self) -> UpdateStream;

    /// Fetch the full content of a message.
    async fn fetch_message(&self, mid: &MessageId) -> Result<RawMessage, TransportError>;

    /// Look up where a message lives, without its content.
    async fn fetch_message_ref(&self, mid: &MessageId) -> Result<MessageRef, TransportError>;

    // ── Passthrough ───────────────────────────────────────────────────────

    async fn send_message(
        &self,
        peer:   Peer,
        text:   &str,
        attach: Option<OutAttach>,
    ) -> Result<Rid, TransportError>;

    async fn edit_message(&self, peer: Peer, rid: &Rid, text: &str) -> Result<(), TransportError>;

    async fn send_interactive_message(
        &self,
        peer:    Peer,
        text:    &str,
        actions: Vec<InteractiveActionGroup>,
        attach:  Option<OutAttach>,
    ) -> Result<Rid, TransportError>;

    async fn edit_interactive_message(
        &self,
        peer:    Peer,
        rid:     &Rid,
        text:    &str,
        actions: Vec<InteractiveActionGroup>,
    ) -> Result<(), TransportError>;

    /// Mark every message in the conversation as read.
    async fn read_chat(&self, peer: Peer) -> Result<(), TransportError>;

    async fn get_user(&self, uid: i64) -> Result<Option<User>, TransportError>;

    async fn get_group(&self, gid: i64) -> Result<Option<Group>, TransportError>;

    /// Upload the file at `path` and send it as a document.
    async fn send_file(
        &self,
        peer:   Peer,
        path:   &Path,
        attach: Option<OutAttach>,
    ) -> Result<Rid, TransportError>;

    /// Upload the image at `path` and send it as a photo of
    /// `width` × `height` pixels with an inline `thumb` preview.
    async fn send_photo_with_preview(
        &self,
        peer:   Peer,
        path:   &Path,
        width:  u32,
        height: u32,
        thumb:  Thumbnail,
        attach: Option<OutAttach>,
    ) -> Result<Rid, TransportError>;

    async fn load_file_urls(&self, files: Vec<FileReference>) -> Result<Vec<FileDescription>, TransportError>;
}
