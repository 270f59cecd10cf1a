//! Per-call execution context.
//!
//! A [`Context`] is threaded through every destination operation. It carries the cancellation
//! sources and deadline that bound waits inside the call, plus request-scoped values attached by
//! middlewares. Contexts are immutable: deriving a child returns a new value and leaves the parent
//! untouched, so concurrent calls never share mutable state through them.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

use crate::concurrency::signal::{SignalRx, SignalTx, create_signal, wait_for_any};
use crate::error::{ErrorKind, SdkError};
use crate::sdk_error;

/// Handle cancelling every context derived from the [`Context::with_cancel`] call that created it.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<SignalTx>);

impl CancelHandle {
    /// Cancels the associated contexts. Cancelling more than once has no further effect.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    /// Returns `true` if [`CancelHandle::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    signals: Vec<SignalRx>,
    deadline: Option<Instant>,
    batch_enabled: Option<bool>,
}

impl Context {
    /// Returns an empty context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a child context that is cancelled when the returned handle is, or when this
    /// context is.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let (tx, rx) = create_signal();
        let mut child = self.clone();
        child.signals.push(rx);

        (child, CancelHandle(Arc::new(tx)))
    }

    /// Derives a child context expiring at `deadline`, or at this context's deadline if earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let mut child = self.clone();
        child.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });

        child
    }

    /// Derives a child context expiring `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the instant at which this context expires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why this context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<SdkError> {
        if self.signals.iter().any(|rx| *rx.borrow()) {
            return Some(canceled_error());
        }

        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(deadline_exceeded_error()),
            _ => None,
        }
    }

    /// Returns `true` once this context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Waits until this context is cancelled or its deadline passes and returns the matching
    /// error. A background context never completes.
    pub async fn done(&self) -> SdkError {
        if let Some(err) = self.err() {
            return err;
        }

        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = wait_for_any(self.signals.clone()) => canceled_error(),
            _ = expired => deadline_exceeded_error(),
        }
    }

    /// Derives a child context carrying whether writes are batched.
    pub fn with_batch_enabled(&self, enabled: bool) -> Context {
        let mut child = self.clone();
        child.batch_enabled = Some(enabled);

        child
    }

    /// Returns whether writes are batched, `false` if no batch middleware set the flag.
    pub fn batch_enabled(&self) -> bool {
        self.batch_enabled.unwrap_or(false)
    }
}

fn canceled_error() -> SdkError {
    sdk_error!(ErrorKind::Canceled, "Context canceled")
}

fn deadline_exceeded_error() -> SdkError {
    sdk_error!(ErrorKind::DeadlineExceeded, "Context deadline exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_never_done() {
        let ctx = Context::background();

        assert!(!ctx.is_done());
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
        assert!(!ctx.batch_enabled());
    }

    #[test]
    fn batch_flag_lives_in_child_contexts() {
        let parent = Context::background();
        let enabled = parent.with_batch_enabled(true);
        let disabled = enabled.with_batch_enabled(false);

        assert!(!parent.batch_enabled());
        assert!(enabled.batch_enabled());
        assert!(!disabled.batch_enabled());
    }

    #[tokio::test]
    async fn cancel_propagates_to_children() {
        let (parent, handle) = Context::background().with_cancel();
        let (child, _child_handle) = parent.with_cancel();
        let flagged = child.with_batch_enabled(true);

        assert!(!flagged.is_done());
        handle.cancel();

        assert!(handle.is_cancelled());
        assert_eq!(parent.err().unwrap().kind(), ErrorKind::Canceled);
        assert_eq!(child.err().unwrap().kind(), ErrorKind::Canceled);
        assert_eq!(flagged.done().await.kind(), ErrorKind::Canceled);
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_running() {
        let (parent, _handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();

        child_handle.cancel();

        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test]
    async fn done_wakes_up_on_cancel() {
        let (ctx, handle) = Context::background().with_cancel();

        let waiter = tokio::spawn(async move { ctx.done().await });
        tokio::task::yield_now().await;
        handle.cancel();

        assert_eq!(waiter.await.unwrap().kind(), ErrorKind::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_done());

        let start = Instant::now();
        let err = ctx.done().await;

        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert!(err.is_cancellation());
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn child_keeps_earliest_deadline() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(10));

        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.with_timeout(Duration::from_millis(10));
        assert!(tighter.deadline() < parent.deadline());
    }
}
