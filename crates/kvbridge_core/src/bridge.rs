//! Callback-to-await bridge.
//!
//! A [`PendingOperation`] hands out [`Signal`] handles that host callbacks
//! fire, and resolves once the first terminal signal arrives. Later signals
//! are ignored and logged. If every signal handle is dropped without firing,
//! the operation resolves with [`EngineError::Abandoned`] instead of hanging.

use kvbridge_engine::{Callbacks, EngineError, EngineResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::warn;

struct SignalState<T> {
    label: &'static str,
    sender: Mutex<Option<oneshot::Sender<EngineResult<T>>>>,
    complete: AtomicBool,
}

/// A completion handle for a [`PendingOperation`].
///
/// Cloning is cheap; all clones share one terminal slot.
pub struct Signal<T> {
    state: Arc<SignalState<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("label", &self.state.label)
            .field("complete", &self.state.complete.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T> Signal<T> {
    /// Signals success. Returns `false` if the operation already completed.
    pub fn succeed(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Signals failure. Returns `false` if the operation already completed.
    pub fn fail(&self, error: EngineError) -> bool {
        self.complete(Err(error))
    }

    /// Signals `outcome`. Returns `false` if the operation already completed.
    pub fn complete(&self, outcome: EngineResult<T>) -> bool {
        let Some(sender) = self.state.sender.lock().take() else {
            warn!(
                operation = self.state.label,
                failed = outcome.is_err(),
                "duplicate completion signal ignored"
            );
            return false;
        };
        self.state.complete.store(true, Ordering::SeqCst);
        // The waiter may have been dropped; the outcome is then discarded.
        let _ = sender.send(outcome);
        true
    }

    /// Whether a terminal signal has fired.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.complete.load(Ordering::SeqCst)
    }
}

impl<T: Send + 'static> Signal<T> {
    /// Wraps this handle in a host callback pair.
    #[must_use]
    pub fn callbacks(&self) -> Callbacks<T> {
        let on_success = self.clone();
        let on_error = self.clone();
        Callbacks::new(
            move |value| {
                on_success.succeed(value);
            },
            move |error| {
                on_error.fail(error);
            },
        )
    }
}

/// An operation whose outcome arrives through host callbacks.
pub struct PendingOperation<T> {
    signal: Signal<T>,
    receiver: oneshot::Receiver<EngineResult<T>>,
}

impl<T> fmt::Debug for PendingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}

impl<T> PendingOperation<T> {
    /// Creates a pending operation. `label` names it in log output.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            signal: Signal {
                state: Arc::new(SignalState {
                    label,
                    sender: Mutex::new(Some(sender)),
                    complete: AtomicBool::new(false),
                }),
            },
            receiver,
        }
    }

    /// Returns a new completion handle.
    #[must_use]
    pub fn signal(&self) -> Signal<T> {
        self.signal.clone()
    }

    /// Whether a terminal signal has fired.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.signal.is_complete()
    }

    /// Waits for the first terminal signal.
    ///
    /// # Errors
    ///
    /// Returns the signalled error, or [`EngineError::Abandoned`] if every
    /// handle was dropped without signalling.
    pub async fn wait(self) -> EngineResult<T> {
        let Self { signal, receiver } = self;
        drop(signal);
        receiver.await.unwrap_or(Err(EngineError::Abandoned))
    }
}

impl<T: Send + 'static> PendingOperation<T> {
    /// Returns a host callback pair bound to this operation.
    #[must_use]
    pub fn callbacks(&self) -> Callbacks<T> {
        self.signal.callbacks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[tokio::test]
    async fn first_signal_wins() {
        let op = PendingOperation::<u32>::new("test");
        let signal = op.signal();
        assert!(!op.is_complete());
        assert!(signal.succeed(1));
        assert!(!signal.succeed(2));
        assert!(!signal.fail(EngineError::Closed));
        assert!(op.is_complete());
        assert_eq!(op.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn failure_resolves_with_error() {
        let op = PendingOperation::<()>::new("test");
        op.callbacks().fail(EngineError::QuotaExceeded);
        assert_eq!(op.wait().await, Err(EngineError::QuotaExceeded));
    }

    #[tokio::test]
    async fn dropped_signals_resolve_abandoned() {
        let op = PendingOperation::<()>::new("test");
        let signal = op.signal();
        drop(signal);
        assert_eq!(op.wait().await, Err(EngineError::Abandoned));
    }

    #[tokio::test]
    async fn signal_from_another_thread() {
        let op = PendingOperation::<&'static str>::new("test");
        let callbacks = op.callbacks();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            callbacks.succeed("done");
        });
        assert_eq!(op.wait().await, Ok("done"));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn signal_after_waiter_dropped_is_accepted() {
        let op = PendingOperation::<u8>::new("test");
        let signal = op.signal();
        drop(op);
        assert!(signal.succeed(7));
        assert!(signal.is_complete());
    }
}
