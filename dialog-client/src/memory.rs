//! In-process transport.
//!
//! [`MemoryTransport`] keeps messages, references and directory entries in
//! memory and lets the caller script logins, push updates and inject
//! failures or latency.  Useful for testing and for running bots offline.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::errors::TransportError;
use crate::message::{
    FileDescription, FileReference, InteractiveActionGroup, MessageContent, MessageId, MessageRef,
    OutAttach, RawMessage, Rid, Thumbnail,
};
use crate::peer::{Group, Peer, User};
use crate::transport::{Connector, Transport};
use crate::update::{RawUpdate, UpdateStream};

// ─── Records ─────────────────────────────────────────────────────────────────

/// An outbound request captured by [`MemoryTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Message     { peer: Peer, rid: Rid, text: String, attach: Option<OutAttach> },
    Edit        { peer: Peer, rid: Rid, text: String },
    Interactive { peer: Peer, rid: Rid, text: String, actions: Vec<InteractiveActionGroup>, attach: Option<OutAttach> },
    InteractiveEdit { peer: Peer, rid: Rid, text: String, actions: Vec<InteractiveActionGroup> },
    File        { peer: Peer, rid: Rid, name: String, attach: Option<OutAttach> },
    Photo       { peer: Peer, rid: Rid, name: String, width: u32, height: u32, thumb: Thumbnail, attach: Option<OutAttach> },
    ReadChat    { peer: Peer },
}

#[derive(Default)]
struct State {
    sms:          Option<(String, String)>,
    password:     Option<(String, String)>,
    pending_auth: Option<String>,
    messages:     HashMap<MessageId, RawMessage>,
    refs:         HashMap<MessageId, MessageRef>,
    users:        HashMap<i64, User>,
    groups:       HashMap<i64, Group>,
    files:        HashMap<i64, String>,
    fetches:      HashMap<MessageId, usize>,
    failures:     HashMap<MessageId, usize>,
    delays:       HashMap<MessageId, Duration>,
    subscribers:  Vec<mpsc::UnboundedSender<RawUpdate>>,
    sent:         Vec<Sent>,
    next_rid:     u64,
}

// ─── MemoryTransport ─────────────────────────────────────────────────────────

pub struct MemoryTransport {
    own_id: i64,
    state:  Mutex<State>,
    /// `true` while fetches may proceed.
    gate:   watch::Sender<bool>,
}

impl MemoryTransport {
    /// A transport for the account `own_id`, with no accepted credentials.
    pub fn new(own_id: i64) -> Self {
        let (gate, _) = watch::channel(true);
        Self { own_id, state: Mutex::new(State::default()), gate }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scripting ─────────────────────────────────────────────────────────

    /// Accept SMS login for `phone` with `code`.
    pub fn accept_sms(self, phone: impl Into<String>, code: impl Into<String>) -> Self {
        self.lock().sms = Some((phone.into(), code.into()));
        self
    }

    /// Accept password login for `username` with `password`.
    pub fn accept_password(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.lock().password = Some((username.into(), password.into()));
        self
    }

    /// Store a message and its reference.
    pub fn insert_message(&self, peer: Peer, mid: impl Into<MessageId>, raw: RawMessage) {
        let mid = mid.into();
        let mut st = self.lock();
        st.refs.insert(mid.clone(), MessageRef { mid: mid.clone(), rid: raw.rid.clone(), peer });
        st.messages.insert(mid, raw);
    }

    /// Store a plain text message from `sender_id`.
    pub fn insert_text(&self, peer: Peer, mid: impl Into<MessageId>, sender_id: i64, text: impl Into<String>) {
        let mid = mid.into();
        let raw = RawMessage {
            rid:        Rid(format!("rid-{mid}")),
            sender_id,
            content:    MessageContent::Text { text: text.into() },
            attachment: None,
            date_ms:    chrono::Utc::now().timestamp_millis(),
        };
        self.insert_message(peer, mid, raw);
    }

    pub fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id, user);
    }

    pub fn insert_group(&self, group: Group) {
        self.lock().groups.insert(group.id, group);
    }

    /// Make the next `times` fetches of `mid` fail.
    pub fn fail_fetches(&self, mid: impl Into<MessageId>, times: usize) {
        self.lock().failures.insert(mid.into(), times);
    }

    /// Delay every fetch of `mid` by `delay`.
    pub fn delay_fetches(&self, mid: impl Into<MessageId>, delay: Duration) {
        self.lock().delays.insert(mid.into(), delay);
    }

    /// Hold every fetch until [`MemoryTransport::release_fetches`].
    pub fn pause_fetches(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_fetches(&self) {
        self.gate.send_replace(true);
    }

    /// Deliver `update` to every current subscriber.
    ///
    /// Updates pushed before anyone subscribed are dropped.
    pub fn push_update(&self, update: RawUpdate) {
        self.lock().subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    }

    /// Close every update stream.
    pub fn close_updates(&self) {
        self.lock().subscribers.clear();
    }

    // ── Inspection ────────────────────────────────────────────────────────

    /// How many times `mid` was fetched (including failed attempts).
    pub fn fetch_count(&self, mid: &MessageId) -> usize {
        self.lock().fetches.get(mid).copied().unwrap_or(0)
    }

    /// Outbound requests, in the order they were made.
    pub fn sent(&self) -> Vec<Sent> {
        self.lock().sent.clone()
    }

    /// Register an uploaded file; returns its name.
    fn store_file(&self, path: &Path) -> Result<String, TransportError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| invalid("FILE_NAME_INVALID", "Path has no file name"))?
            .to_string();
        let mut st = self.lock();
        let file_id = st.files.len() as i64 + 1;
        st.files.insert(file_id, name.clone());
        Ok(name)
    }

    fn record(&self, make: impl FnOnce(Rid) -> Sent) -> Rid {
        let mut st = self.lock();
        st.next_rid += 1;
        let rid = Rid(format!("out-{}", st.next_rid));
        st.sent.push(make(rid.clone()));
        rid
    }
}

fn invalid(tag: &str, message: &str) -> TransportError {
    TransportError::new(tag, message)
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn request_sms(&self, phone: &str) -> Result<(), TransportError> {
        let mut st = self.lock();
        match &st.sms {
            Some((p, _)) if p == phone => {
                st.pending_auth = Some(phone.to_string());
                Ok(())
            }
            _ => Err(invalid("PHONE_NUMBER_INVALID", "Phone number is not registered")),
        }
    }

    async fn send_code(&self, code: &str) -> Result<(), TransportError> {
        let st = self.lock();
        match (&st.sms, &st.pending_auth) {
            (Some((p, c)), Some(pending)) if p == pending && c == code => Ok(()),
            (_, None) => Err(invalid("PHONE_CODE_EXPIRED", "No code was requested")),
            _ => Err(invalid("PHONE_CODE_INVALID", "Invalid activation code")),
        }
    }

    async fn start_username_auth(&self, username: &str) -> Result<(), TransportError> {
        let mut st = self.lock();
        match &st.password {
            Some((u, _)) if u == username => {
                st.pending_auth = Some(username.to_string());
                Ok(())
            }
            _ => Err(invalid("USERNAME_INVALID", "Unknown username")),
        }
    }

    async fn send_password(&self, password: &str) -> Result<(), TransportError> {
        let st = self.lock();
        match (&st.password, &st.pending_auth) {
            (Some((u, p)), Some(pending)) if u == pending && p == password => Ok(()),
            _ => Err(invalid("PASSWORD_INVALID", "Invalid password")),
        }
    }

    fn own_id(&self) -> i64 {
        self.own_id
    }

    fn subscribe_updates(&self) -> UpdateStream {
        let (tx, stream) = UpdateStream::channel();
        self.lock().subscribers.push(tx);
        stream
    }

    async fn fetch_message(&self, mid: &MessageId) -> Result<RawMessage, TransportError> {
        let delay = {
            let mut st = self.lock();
            *st.fetches.entry(mid.clone()).or_default() += 1;
            st.delays.get(mid).copied()
        };

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let mut st = self.lock();
        if let Some(left) = st.failures.get_mut(mid).filter(|n| **n > 0) {
            *left -= 1;
            return Err(invalid("INTERNAL_SERVER_ERROR", "Injected failure"));
        }
        st.messages
            .get(mid)
            .cloned()
            .ok_or_else(|| invalid("MESSAGE_NOT_FOUND", "Message not found"))
    }

    async fn fetch_message_ref(&self, mid: &MessageId) -> Result<MessageRef, TransportError> {
        self.lock()
            .refs
            .get(mid)
            .cloned()
            .ok_or_else(|| invalid("MESSAGE_NOT_FOUND", "Message not found"))
    }

    async fn send_message(&self, peer: Peer, text: &str, attach: Option<OutAttach>) -> Result<Rid, TransportError> {
        Ok(self.record(|rid| Sent::Message { peer, rid, text: text.to_string(), attach }))
    }

    async fn edit_message(&self, peer: Peer, rid: &Rid, text: &str) -> Result<(), TransportError> {
        self.record(|_| Sent::Edit { peer, rid: rid.clone(), text: text.to_string() });
        Ok(())
    }

    async fn send_interactive_message(
        &self,
        peer:    Peer,
        text:    &str,
        actions: Vec<InteractiveActionGroup>,
        attach:  Option<OutAttach>,
    ) -> Result<Rid, TransportError> {
        Ok(self.record(|rid| Sent::Interactive { peer, rid, text: text.to_string(), actions, attach }))
    }

    async fn edit_interactive_message(
        &self,
        peer:    Peer,
        rid:     &Rid,
        text:    &str,
        actions: Vec<InteractiveActionGroup>,
    ) -> Result<(), TransportError> {
        self.record(|_| Sent::InteractiveEdit { peer, rid: rid.clone(), text: text.to_string(), actions });
        Ok(())
    }

    async fn read_chat(&self, peer: Peer) -> Result<(), TransportError> {
        self.lock().sent.push(Sent::ReadChat { peer });
        Ok(())
    }

    async fn get_user(&self, uid: i64) -> Result<Option<User>, TransportError> {
        Ok(self.lock().users.get(&uid).cloned())
    }

    async fn get_group(&self, gid: i64) -> Result<Option<Group>, TransportError> {
        Ok(self.lock().groups.get(&gid).cloned())
    }

    async fn send_file(&self, peer: Peer, path: &Path, attach: Option<OutAttach>) -> Result<Rid, TransportError> {
        let name = self.store_file(path)?;
        Ok(self.record(|rid| Sent::File { peer, rid, name, attach }))
    }

    async fn send_photo_with_preview(
        &self,
        peer:   Peer,
        path:   &Path,
        width:  u32,
        height: u32,
        thumb:  Thumbnail,
        attach: Option<OutAttach>,
    ) -> Result<Rid, TransportError> {
        let name = self.store_file(path)?;
        Ok(self.record(|rid| Sent::Photo { peer, rid, name, width, height, thumb, attach }))
    }

    async fn load_file_urls(&self, files: Vec<FileReference>) -> Result<Vec<FileDescription>, TransportError> {
        let st = self.lock();
        Ok(files
            .into_iter()
            .filter_map(|f| {
                st.files.get(&f.file_id).map(|name| FileDescription {
                    file_id: f.file_id,
                    url:     format!("memory://files/{}/{name}", f.file_id),
                    timeout: 3600,
                })
            })
            .collect())
    }
}

// ─── MemoryConnector ─────────────────────────────────────────────────────────

/// Connects to a shared [`MemoryTransport`].
pub struct MemoryConnector {
    transport: Arc<MemoryTransport>,
    connects:  Arc<AtomicUsize>,
    refuse:    Option<TransportError>,
}

impl MemoryConnector {
    pub fn new(transport: Arc<MemoryTransport>) -> Self {
        Self { transport, connects: Arc::new(AtomicUsize::new(0)), refuse: None }
    }

    /// Make every connection attempt fail with `error`.
    pub fn refusing(mut self, error: TransportError) -> Self {
        self.refuse = Some(error);
        self
    }

    /// Shared counter of connection attempts.
    pub fn connect_counter(&self) -> Arc<AtomicUsize> {
        self.connects.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoints: &[String]) -> Result<Arc<dyn Transport>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.refuse {
            return Err(e.clone());
        }
        tracing::debug!("[dialog] memory transport connected ({} endpoint(s))", endpoints.len());
        Ok(self.transport.clone())
    }
}
