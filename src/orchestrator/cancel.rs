//! Cooperative cancellation for polling loops.

use std::future::pending;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;

/// Receiving side of a cancellation request.
///
/// Loops check it between attempts only; a backend call already in flight is
/// always allowed to finish.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

/// Sending side returned by [`CancelSignal::channel`].
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self { receiver: None }
    }

    /// Creates a connected handle and signal.
    #[must_use]
    pub fn channel() -> (CancelHandle, Self) {
        let (sender, receiver) = watch::channel(false);
        (
            CancelHandle { sender },
            Self {
                receiver: Some(receiver),
            },
        )
    }

    /// Reports whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    /// Resolves once cancellation is requested. Never resolves when the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(mut receiver) = self.receiver.clone() else {
            return pending().await;
        };
        let closed = receiver.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            pending::<()>().await;
        }
    }

    /// Sleeps for `duration` and returns `true` if cancellation arrived
    /// first.
    pub async fn sleep_or_cancelled(&self, duration: Duration) -> bool {
        tokio::select! {
            () = sleep(duration) => false,
            () = self.cancelled() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_signal_lets_sleep_finish() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        assert!(!signal.sleep_or_cancelled(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn cancel_interrupts_sleep() {
        let (handle, signal) = CancelSignal::channel();
        handle.cancel();

        assert!(signal.is_cancelled());
        assert!(signal.sleep_or_cancelled(Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (handle, signal) = CancelSignal::channel();
        drop(handle);

        assert!(!signal.is_cancelled());
        assert!(!signal.sleep_or_cancelled(Duration::from_millis(1)).await);
    }
}
