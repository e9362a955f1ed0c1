//! # dialog-client
//!
//! Async bot session layer for dialog-style messengers.
//!
//! The transport underneath pushes terse notifications ("message `m1` arrived
//! in user 42") and may deliver the same id more than once.  This crate turns
//! that stream into fully resolved, ordered callbacks:
//!
//! - Login by SMS code or by username + password, exactly once per session
//! - One shared readiness future for every caller ([`Client::ready`])
//! - Self-echo suppression: the bot never sees its own messages
//! - Coalesced message resolution: one fetch per `mid`, cached afterwards
//! - Strictly ordered dispatch: a callback finishes before the next update
//! - One error channel for login failures and failing callbacks
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dialog_client::{Client, Config, memory::{MemoryConnector, MemoryTransport}};
//!
//! # async fn run() -> Result<(), dialog_client::Error> {
//! let transport = Arc::new(MemoryTransport::new(7).accept_password("bot", "secret"));
//! let config = Config {
//!     endpoints: vec!["wss://ws1.example.com".into()],
//!     username:  Some("bot".into()),
//!     password:  Some("secret".into()),
//!     ..Default::default()
//! };
//! let client = Client::builder(config, MemoryConnector::new(transport))
//!     .on_error(|e| eprintln!("{e}"))
//!     .start()?;
//!
//! let replier = client.clone();
//! client.on_message(move |peer, message| {
//!     let client = replier.clone();
//!     async move {
//!         if let Some(text) = message.text() {
//!             client.send_text_message(peer, text, Some(message.reply_attach())).await?;
//!         }
//!         Ok::<_, dialog_client::BoxError>(())
//!     }
//! });
//! client.ready().await?;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

mod bridge;
mod config;
mod error_channel;
mod errors;
mod resolve;
mod session;
mod thumbnail;
pub mod memory;
pub mod message;
pub mod peer;
pub mod transport;
pub mod update;

pub use bridge::HandlerResult;
pub use config::{Config, Credential};
pub use error_channel::UnhandledErrorPolicy;
pub use errors::{
    AuthenticationError, BoxError, CallbackError, ConfigurationError, Error, ResolutionError,
    TransportError,
};
pub use message::{
    FileDescription, FileReference, InteractiveAction, InteractiveActionGroup, InteractiveEvent,
    Message, MessageAttachment, MessageContent, MessageId, MessageRef, OutAttach, Rid, Thumbnail,
    Widget,
};
pub use peer::{Group, Peer, PeerKind, User};
pub use resolve::ResolveQueue;
pub use session::SessionState;
pub use transport::{Connector, Transport};
pub use update::{RawUpdate, UpdateStream};

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use bridge::EventBridge;
use error_channel::ErrorChannel;
use session::{Live, Phase, Setup};

// ─── ClientBuilder ───────────────────────────────────────────────────────────

/// Collects subscribers before the session starts.
///
/// Anything registered here is in place before the first connection
/// attempt, so a failing login always reaches these `on_error` handlers.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use dialog_client::{Client, Config, memory::{MemoryConnector, MemoryTransport}};
/// # fn run(config: Config, transport: Arc<MemoryTransport>) -> Result<(), dialog_client::Error> {
/// let client = Client::builder(config, MemoryConnector::new(transport))
///     .on_error(|e| eprintln!("{e}"))
///     .on_interactive_event(|event| async move {
///         println!("{} pressed {}", event.uid, event.id);
///         Ok::<_, dialog_client::BoxError>(())
///     })
///     .start()?;
/// # Ok(()) }
/// ```
pub struct ClientBuilder {
    config:    Config,
    connector: Arc<dyn Connector>,
    bridge:    Arc<EventBridge>,
    errors:    Arc<ErrorChannel>,
}

impl ClientBuilder {
    /// Subscribe to incoming messages from other users.
    pub fn on_message<F, Fut>(self, callback: F) -> Self
    where
        F:   Fn(Peer, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bridge.add_message_handler(callback);
        self
    }

    /// Subscribe to actions on interactive widgets.
    pub fn on_interactive_event<F, Fut>(self, callback: F) -> Self
    where
        F:   Fn(InteractiveEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bridge.add_interactive_handler(callback);
        self
    }

    /// Subscribe to every raw update.
    pub fn on_update<F, Fut>(self, callback: F) -> Self
    where
        F:   Fn(RawUpdate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bridge.add_update_handler(callback);
        self
    }

    /// Subscribe to session errors, including a failed login.
    pub fn on_error<F>(self, callback: F) -> Self
    where
        F: Fn(Arc<Error>) + Send + Sync + 'static,
    {
        self.errors.subscribe(Arc::new(callback));
        self
    }

    /// Validate the configuration and start connecting in the background.
    ///
    /// Fails synchronously, before anything reaches the connector, if the
    /// credentials are missing or ambiguous, no endpoint is configured, or
    /// there is no Tokio runtime to drive the session.
    pub fn start(self) -> Result<Client, ConfigurationError> {
        let Self { config, connector, bridge, errors } = self;
        let credential = config.credential()?;
        if config.endpoints.is_empty() {
            return Err(ConfigurationError::NoEndpoints);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigurationError::NoRuntime)?;

        let (phase_tx, phase_rx) = watch::channel(Phase::Uninitialized);
        let setup = Setup {
            connector,
            endpoints:  config.endpoints,
            credential,
            capacity:   config.resolve_cache_capacity,
            quiet:      config.quiet,
            phase:      phase_tx,
            bridge:     bridge.clone(),
            errors:     errors.clone(),
        };
        runtime.spawn(setup.run());

        Ok(Client { inner: Arc::new(ClientInner { phase: phase_rx, bridge, errors }) })
    }
}

// ─── ClientInner ─────────────────────────────────────────────────────────────

struct ClientInner {
    phase:  watch::Receiver<Phase>,
    bridge: Arc<EventBridge>,
    errors: Arc<ErrorChannel>,
}

/// A bot session. Cheap to clone — internally Arc-wrapped.
///
/// Created through [`Client::builder`]. More handlers may be added on the
/// running client; updates are only observed once the session is ready.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    // ── Construction ───────────────────────────────────────────────────────

    /// Prepare a session for `config`, connecting through `connector` once
    /// [`ClientBuilder::start`] is called.
    pub fn builder(config: Config, connector: impl Connector) -> ClientBuilder {
        let errors = Arc::new(ErrorChannel::new(config.unhandled_error));
        let bridge = Arc::new(EventBridge::new(errors.clone()));
        ClientBuilder { config, connector: Arc::new(connector), bridge, errors }
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Wait until the session is authenticated.
    ///
    /// Every caller observes the same outcome; a failed session stays failed.
    pub async fn ready(&self) -> Result<(), AuthenticationError> {
        self.live().await.map(|_| ())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.phase.borrow().state()
    }

    async fn live(&self) -> Result<Arc<Live>, AuthenticationError> {
        session::wait_ready(self.inner.phase.clone()).await
    }

    /// Id of the logged-in account.
    pub async fn own_id(&self) -> Result<i64, AuthenticationError> {
        Ok(self.live().await?.own_id)
    }

    // ── Subscriptions ──────────────────────────────────────────────────────

    /// Subscribe to incoming messages from other users.
    pub fn on_message<F, Fut>(&self, callback: F)
    where
        F:   Fn(Peer, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.bridge.add_message_handler(callback);
    }

    /// Subscribe to actions on interactive widgets.
    pub fn on_interactive_event<F, Fut>(&self, callback: F)
    where
        F:   Fn(InteractiveEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.bridge.add_interactive_handler(callback);
    }

    /// Subscribe to every raw update, including kinds without a typed route.
    pub fn on_update<F, Fut>(&self, callback: F)
    where
        F:   Fn(RawUpdate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.inner.bridge.add_update_handler(callback);
    }

    /// Subscribe to session errors.
    ///
    /// Without any error subscriber, errors follow
    /// [`Config::unhandled_error`] — by default the process exits.  The
    /// session is already running here; subscribe with
    /// [`ClientBuilder::on_error`] to also see a failed login.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(Arc<Error>) + Send + Sync + 'static,
    {
        self.inner.errors.subscribe(Arc::new(callback));
    }

    // ── Resolution ─────────────────────────────────────────────────────────

    /// Resolve a message through the session's coalescing cache.
    pub async fn resolve_message(&self, peer: Peer, mid: MessageId) -> Result<Message, Error> {
        let live = self.live().await?;
        Ok(live.queue.resolve(peer, mid).await?)
    }

    // ── Directory ──────────────────────────────────────────────────────────

    pub async fn get_user(&self, uid: i64) -> Result<Option<User>, Error> {
        let live = self.live().await?;
        Ok(live.transport.get_user(uid).await?)
    }

    pub async fn get_group(&self, gid: i64) -> Result<Option<Group>, Error> {
        let live = self.live().await?;
        Ok(live.transport.get_group(gid).await?)
    }

    // ── Messaging ──────────────────────────────────────────────────────────

    /// Send a text message. Returns the new message's rid.
    pub async fn send_text_message(
        &self,
        peer:   Peer,
        text:   &str,
        attach: Option<OutAttach>,
    ) -> Result<Rid, Error> {
        let live = self.live().await?;
        Ok(live.transport.send_message(peer, text, attach).await?)
    }

    pub async fn edit_text_message(&self, peer: Peer, rid: &Rid, text: &str) -> Result<(), Error> {
        let live = self.live().await?;
        Ok(live.transport.edit_message(peer, rid, text).await?)
    }

    /// Send a message with interactive widgets. Returns the new message's rid.
    pub async fn send_interactive_message(
        &self,
        peer:    Peer,
        text:    &str,
        actions: Vec<InteractiveActionGroup>,
        attach:  Option<OutAttach>,
    ) -> Result<Rid, Error> {
        let live = self.live().await?;
        Ok(live.transport.send_interactive_message(peer, text, actions, attach).await?)
    }

    pub async fn edit_interactive_message(
        &self,
        peer:    Peer,
        rid:     &Rid,
        text:    &str,
        actions: Vec<InteractiveActionGroup>,
    ) -> Result<(), Error> {
        let live = self.live().await?;
        Ok(live.transport.edit_interactive_message(peer, rid, text, actions).await?)
    }

    /// Mark every message in the conversation as read.
    pub async fn read_chat(&self, peer: Peer) -> Result<(), Error> {
        let live = self.live().await?;
        Ok(live.transport.read_chat(peer).await?)
    }

    // ── Files ──────────────────────────────────────────────────────────────

    /// Upload a file from disk and send it. Returns the new message's rid.
    pub async fn send_file_message(
        &self,
        peer:   Peer,
        path:   impl AsRef<Path>,
        attach: Option<OutAttach>,
    ) -> Result<Rid, Error> {
        let live = self.live().await?;
        Ok(live.transport.send_file(peer, path.as_ref(), attach).await?)
    }

    /// Send a local image as a photo with a low-quality inline preview.
    /// Returns the new message's rid.
    pub async fn send_image_message(
        &self,
        peer:   Peer,
        path:   impl AsRef<Path>,
        attach: Option<OutAttach>,
    ) -> Result<Rid, Error> {
        let live = self.live().await?;
        let path = path.as_ref().to_path_buf();
        let preview = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || thumbnail::build(&path))
                .await
                .map_err(|e| image::ImageError::IoError(std::io::Error::other(e)))??
        };
        Ok(live
            .transport
            .send_photo_with_preview(peer, &path, preview.width, preview.height, preview.thumb, attach)
            .await?)
    }

    pub async fn load_file_urls(&self, files: Vec<FileReference>) -> Result<Vec<FileDescription>, Error> {
        let live = self.live().await?;
        Ok(live.transport.load_file_urls(files).await?)
    }

    /// Download URL for a single file, if the transport knows it.
    pub async fn load_file_url(&self, file: FileReference) -> Result<Option<String>, Error> {
        let urls = self.load_file_urls(vec![file]).await?;
        Ok(urls.into_iter().next().map(|d| d.url))
    }
}
