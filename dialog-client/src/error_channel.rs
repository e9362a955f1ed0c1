//! A single sink for asynchronous failures.
//!
//! Authentication failures and everything that goes wrong while handling an
//! update end up here and are broadcast to every `on_error` subscriber.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::errors::{Error, panic_text};

pub(crate) type ErrorHandler = Arc<dyn Fn(Arc<Error>) + Send + Sync>;

/// What happens to an error reported while no `on_error` handler is
/// registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnhandledErrorPolicy {
    /// Log the error and terminate the process with exit status 1.
    #[default]
    Exit,
    /// Log the error and keep going.
    Log,
}

pub(crate) struct ErrorChannel {
    handlers: RwLock<Vec<ErrorHandler>>,
    policy:   UnhandledErrorPolicy,
}

impl ErrorChannel {
    pub(crate) fn new(policy: UnhandledErrorPolicy) -> Self {
        Self { handlers: RwLock::new(Vec::new()), policy }
    }

    pub(crate) fn subscribe(&self, handler: ErrorHandler) {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner).push(handler);
    }

    /// Deliver `error` to every subscriber, or apply the unhandled policy.
    ///
    /// A panicking subscriber is logged and skipped; the remaining
    /// subscribers still run and the caller never unwinds.
    pub(crate) fn report(&self, error: Error) {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner).clone();
        if handlers.is_empty() {
            match self.policy {
                UnhandledErrorPolicy::Exit => {
                    tracing::error!("[dialog] unhandled error, exiting: {error}");
                    std::process::exit(1);
                }
                UnhandledErrorPolicy::Log => {
                    tracing::error!("[dialog] unhandled error: {error}");
                }
            }
            return;
        }

        let error = Arc::new(error);
        for handler in handlers {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(error.clone()))) {
                tracing::error!(
                    "[dialog] on_error handler panicked: {} (while handling: {error})",
                    panic_text(payload.as_ref())
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use std::sync::Mutex;

    #[test]
    fn every_subscriber_sees_the_same_error() {
        let channel = ErrorChannel::new(UnhandledErrorPolicy::Exit);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let seen = seen.clone();
            channel.subscribe(Arc::new(move |e: Arc<Error>| seen.lock().unwrap().push(e)));
        }

        channel.report(Error::Transport(TransportError::new("NOT_FOUND", "")));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(Arc::ptr_eq(&seen[0], &seen[1]));
        assert!(seen[0].is("NOT_FOUND"));
    }

    #[test]
    fn panicking_subscriber_does_not_stop_the_others() {
        let channel = ErrorChannel::new(UnhandledErrorPolicy::Exit);
        let seen = Arc::new(Mutex::new(0));
        channel.subscribe(Arc::new(|_: Arc<Error>| panic!("subscriber exploded")));
        {
            let seen = seen.clone();
            channel.subscribe(Arc::new(move |_: Arc<Error>| *seen.lock().unwrap() += 1));
        }

        channel.report(Error::Transport(TransportError::new("NOT_FOUND", "")));
        channel.report(Error::Transport(TransportError::new("NOT_FOUND", "")));

        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn log_policy_swallows_without_subscribers() {
        let channel = ErrorChannel::new(UnhandledErrorPolicy::Log);
        channel.report(Error::Transport(TransportError::new("NOT_FOUND", "")));
    }
}
