//! Session lifecycle: connect, authenticate once, then pump updates.
//!
//! Readiness is a single-assignment value published through a
//! [`tokio::sync::watch`] channel. Any number of callers can wait on it;
//! the first terminal state (`Ready` or `Failed`) is final.

use std::sync::Arc;

use tokio::sync::watch;

use crate::bridge::EventBridge;
use crate::config::Credential;
use crate::errors::{AuthenticationError, Error};
use crate::error_channel::ErrorChannel;
use crate::resolve::ResolveQueue;
use crate::transport::{Connector, Transport};
use crate::update::UpdateStream;

// ─── SessionState ─────────────────────────────────────────────────────────────

/// Where a session is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Authenticating,
    Ready,
    Failed(AuthenticationError),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }
}

/// Everything a ready session needs to process updates.
pub(crate) struct Live {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) queue:     ResolveQueue,
    pub(crate) own_id:    i64,
}

/// Internal phase; carries the live session once ready.
#[derive(Clone)]
pub(crate) enum Phase {
    Uninitialized,
    Authenticating,
    Ready(Arc<Live>),
    Failed(AuthenticationError),
}

impl Phase {
    pub(crate) fn state(&self) -> SessionState {
        match self {
            Self::Uninitialized  => SessionState::Uninitialized,
            Self::Authenticating => SessionState::Authenticating,
            Self::Ready(_)       => SessionState::Ready,
            Self::Failed(e)      => SessionState::Failed(e.clone()),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready(_) | Self::Failed(_))
    }
}

/// Wait until `rx` reaches a terminal phase.
pub(crate) async fn wait_ready(mut rx: watch::Receiver<Phase>) -> Result<Arc<Live>, AuthenticationError> {
    let phase = rx
        .wait_for(Phase::is_terminal)
        .await
        .map_err(|_| AuthenticationError::Aborted)?;
    match &*phase {
        Phase::Ready(live) => Ok(live.clone()),
        Phase::Failed(e)   => Err(e.clone()),
        _                  => Err(AuthenticationError::Aborted),
    }
}

// ─── Setup ────────────────────────────────────────────────────────────────────

pub(crate) struct Setup {
    pub(crate) connector:  Arc<dyn Connector>,
    pub(crate) endpoints:  Vec<String>,
    pub(crate) credential: Credential,
    pub(crate) capacity:   Option<usize>,
    pub(crate) quiet:      bool,
    pub(crate) phase:      watch::Sender<Phase>,
    pub(crate) bridge:     Arc<EventBridge>,
    pub(crate) errors:     Arc<ErrorChannel>,
}

impl Setup {
    /// Drive the session to a terminal state, then pump updates until the
    /// transport closes its stream.
    pub(crate) async fn run(self) {
        self.phase.send_replace(Phase::Authenticating);

        let (live, updates) = match self.establish().await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("[dialog] Authentication failed: {e}");
                self.phase.send_replace(Phase::Failed(e.clone()));
                self.errors.report(Error::Authentication(e));
                return;
            }
        };

        if !self.quiet {
            tracing::info!("[dialog] Session ready ✓  (uid={})", live.own_id);
        }
        self.phase.send_replace(Phase::Ready(live.clone()));

        pump(live, updates, self.bridge).await;
        if !self.quiet {
            tracing::info!("[dialog] Update stream closed");
        }
    }

    async fn establish(&self) -> Result<(Arc<Live>, UpdateStream), AuthenticationError> {
        if !self.quiet {
            tracing::info!("[dialog] Connecting to {} endpoint(s) …", self.endpoints.len());
        }
        let transport = self
            .connector
            .connect(&self.endpoints)
            .await
            .map_err(AuthenticationError::Connect)?;

        match &self.credential {
            Credential::Sms { phone, code } => {
                if !self.quiet {
                    tracing::info!("[dialog] Requesting SMS code for {phone} …");
                }
                transport.request_sms(phone).await.map_err(AuthenticationError::Rejected)?;
                transport.send_code(code).await.map_err(AuthenticationError::Rejected)?;
            }
            Credential::Password { username, password } => {
                if !self.quiet {
                    tracing::info!("[dialog] Starting password auth for {username} …");
                }
                transport.start_username_auth(username).await.map_err(AuthenticationError::Rejected)?;
                transport.send_password(password).await.map_err(AuthenticationError::Rejected)?;
            }
        }

        // Subscribe before publishing Ready so nothing pushed right after
        // login is missed.
        let updates = transport.subscribe_updates();
        let live = Arc::new(Live {
            own_id:    transport.own_id(),
            queue:     ResolveQueue::with_capacity(transport.clone(), self.capacity),
            transport,
        });
        Ok((live, updates))
    }
}

/// Feed updates to the bridge strictly one at a time.
async fn pump(live: Arc<Live>, mut updates: UpdateStream, bridge: Arc<EventBridge>) {
    while let Some(update) = updates.next().await {
        bridge.dispatch(&live, update).await;
    }
}
