//! Typed routing of transport updates to subscriber callbacks.
//!
//! [`EventBridge::dispatch`] is awaited once per update, in stream order, so
//! a callback for one update always finishes before the next update is
//! looked at.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error_channel::ErrorChannel;
use crate::errors::{BoxError, CallbackError, Error};
use crate::message::{InteractiveEvent, Message, MessageId};
use crate::peer::{Peer, normalize};
use crate::session::Live;
use crate::update::{RawUpdate, UpdateInteractiveMediaEvent, UpdateKind, UpdateMessage};

/// Result type returned by subscriber callbacks.
pub type HandlerResult = Result<(), BoxError>;

type MessageHandler     = Arc<dyn Fn(Peer, Message) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type InteractiveHandler = Arc<dyn Fn(InteractiveEvent) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type UpdateHandler      = Arc<dyn Fn(RawUpdate) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

pub(crate) struct EventBridge {
    on_message:     RwLock<Vec<MessageHandler>>,
    on_interactive: RwLock<Vec<InteractiveHandler>>,
    on_update:      RwLock<Vec<UpdateHandler>>,
    errors:         Arc<ErrorChannel>,
}

fn snapshot<T: Clone>(list: &RwLock<Vec<T>>) -> Vec<T> {
    list.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn push<T>(list: &RwLock<Vec<T>>, item: T) {
    list.write().unwrap_or_else(PoisonError::into_inner).push(item);
}

impl EventBridge {
    pub(crate) fn new(errors: Arc<ErrorChannel>) -> Self {
        Self {
            on_message:     RwLock::new(Vec::new()),
            on_interactive: RwLock::new(Vec::new()),
            on_update:      RwLock::new(Vec::new()),
            errors,
        }
    }

    // ── Registration ──────────────────────────────────────────────────────

    pub(crate) fn add_message_handler<F, Fut>(&self, f: F)
    where
        F:   Fn(Peer, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        push(&self.on_message, Arc::new(move |p, m| f(p, m).boxed()));
    }

    pub(crate) fn add_interactive_handler<F, Fut>(&self, f: F)
    where
        F:   Fn(InteractiveEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        push(&self.on_interactive, Arc::new(move |e| f(e).boxed()));
    }

    pub(crate) fn add_update_handler<F, Fut>(&self, f: F)
    where
        F:   Fn(RawUpdate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        push(&self.on_update, Arc::new(move |u| f(u).boxed()));
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    /// Route one update. Never fails: every problem is reported to the
    /// error channel.
    pub(crate) async fn dispatch(&self, live: &Live, update: RawUpdate) {
        let kind = update.kind();
        let mid  = update.mid().cloned();
        for handler in snapshot(&self.on_update) {
            self.invoke(kind, mid.clone(), || handler(update.clone())).await;
        }

        match update {
            RawUpdate::Message(u)               => self.route_message(live, u).await,
            RawUpdate::InteractiveMediaEvent(u) => self.route_interactive(live, u).await,
            RawUpdate::Other { kind }           => {
                tracing::trace!("[dialog] no route for {kind}");
            }
        }
    }

    async fn route_message(&self, live: &Live, u: UpdateMessage) {
        if u.sender_uid == live.own_id {
            tracing::trace!("[dialog] dropping self-echo {}", u.mid);
            return;
        }
        let handlers = snapshot(&self.on_message);
        if handlers.is_empty() {
            return;
        }

        let peer = normalize(&u.peer);
        let message = match live.queue.resolve(peer, u.mid).await {
            Ok(m) => m,
            Err(e) => {
                self.errors.report(Error::Resolution(e));
                return;
            }
        };

        for handler in handlers {
            let call = || handler(peer, message.clone());
            self.invoke(UpdateKind::Message, Some(message.mid.clone()), call).await;
        }
    }

    async fn route_interactive(&self, live: &Live, u: UpdateInteractiveMediaEvent) {
        let handlers = snapshot(&self.on_interactive);
        if handlers.is_empty() {
            return;
        }

        let message_ref = match live.transport.fetch_message_ref(&u.mid).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("[dialog] reference lookup for {} failed: {e}", u.mid);
                self.errors.report(Error::Transport(e));
                return;
            }
        };
        let event = InteractiveEvent { mid: u.mid, id: u.id, value: u.value, uid: u.uid, message_ref };

        for handler in handlers {
            let call = || handler(event.clone());
            self.invoke(UpdateKind::InteractiveMediaEvent, Some(event.mid.clone()), call).await;
        }
    }

    /// Await one callback, turning `Err` and panics into reported
    /// [`CallbackError`]s.
    async fn invoke<F>(&self, kind: UpdateKind, mid: Option<MessageId>, call: F)
    where
        F: FnOnce() -> BoxFuture<'static, HandlerResult>,
    {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(fut)      => AssertUnwindSafe(fut).catch_unwind().await,
            Err(payload) => Err(payload),
        };
        let error = match outcome {
            Ok(Ok(()))   => return,
            Ok(Err(e))   => CallbackError { kind, mid, source: e },
            Err(payload) => CallbackError::panicked(kind, mid, payload.as_ref()),
        };
        tracing::debug!("[dialog] {error}");
        self.errors.report(Error::Callback(error));
    }
}
