use core::pin::Pin;
use core::task::{Context as TaskContext, Poll};
use futures::{Future, Stream, ready};
use pin_project_lite::pin_project;
use tracing::info;

use crate::context::Context;
use crate::error::SdkError;
use crate::middleware::BatchSettings;

/// Result of polling a [`BatchStream`].
#[derive(Debug)]
pub enum BatchOutcome<T> {
    /// A complete batch, ready to be written.
    Batch(Vec<T>),
    /// The context was cancelled; `pending` holds the items collected for the unfinished batch.
    Canceled { pending: Vec<T>, error: SdkError },
}

type Cancellation = Pin<Box<dyn Future<Output = SdkError> + Send>>;

/// Maximum number of items taken from the inner stream before yielding back to the runtime.
const YIELD_BUDGET: usize = 32;

// Implementation adapted from:
//  https://github.com/tokio-rs/tokio/blob/master/tokio-stream/src/stream_ext/chunks_timeout.rs.
pin_project! {
    /// A stream adapter grouping items into batches according to [`BatchSettings`].
    ///
    /// A batch is emitted when it reaches the configured size, when the configured delay has
    /// elapsed since its first item arrived, or when the underlying stream ends. With batching
    /// disabled every item is emitted as a batch of its own.
    #[must_use = "streams do nothing unless polled"]
    pub struct BatchStream<S: Stream> {
        #[pin]
        stream: S,
        #[pin]
        deadline: Option<tokio::time::Sleep>,
        cancellation: Cancellation,
        items: Vec<S::Item>,
        settings: BatchSettings,
        polled_items: usize,
        inner_stream_ended: bool,
        stream_stopped: bool,
    }
}

impl<S: Stream> BatchStream<S> {
    /// Creates a new [`BatchStream`] stopping when `ctx` is cancelled or expires.
    pub fn wrap(stream: S, settings: BatchSettings, ctx: Context) -> Self {
        BatchStream {
            stream,
            deadline: None,
            cancellation: Box::pin(async move { ctx.done().await }),
            items: Vec::with_capacity(settings.size),
            settings,
            polled_items: 0,
            inner_stream_ended: false,
            stream_stopped: false,
        }
    }
}

impl<S: Stream> Stream for BatchStream<S> {
    type Item = BatchOutcome<S::Item>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.as_mut().project();

        if *this.inner_stream_ended || *this.stream_stopped {
            return Poll::Ready(None);
        }

        // Cancellation takes priority so that no further batch is handed out once the context
        // is done.
        if let Poll::Ready(error) = this.cancellation.as_mut().poll(cx) {
            info!(pending = this.items.len(), "the record stream has been cancelled");
            *this.stream_stopped = true;

            return Poll::Ready(Some(BatchOutcome::Canceled {
                pending: std::mem::take(this.items),
                error,
            }));
        }

        // A source that never returns pending still has its batches flushed on time.
        if !this.items.is_empty()
            && let Some(deadline) = this.deadline.as_mut().as_pin_mut()
            && deadline.poll(cx).is_ready()
        {
            this.deadline.set(None);

            return Poll::Ready(Some(BatchOutcome::Batch(std::mem::take(this.items))));
        }

        loop {
            if *this.polled_items >= YIELD_BUDGET {
                // Yield so that timers and the cancellation signal make progress.
                *this.polled_items = 0;
                cx.waker().wake_by_ref();

                return Poll::Pending;
            }

            match this.stream.as_mut().poll_next(cx) {
                Poll::Pending => break,
                Poll::Ready(Some(item)) => {
                    *this.polled_items += 1;

                    if !this.settings.enabled() {
                        return Poll::Ready(Some(BatchOutcome::Batch(vec![item])));
                    }

                    // The delay of a batch runs from its first item.
                    if this.items.is_empty() && !this.settings.delay.is_zero() {
                        this.deadline
                            .set(Some(tokio::time::sleep(this.settings.delay)));
                    }
                    this.items.push(item);

                    if this.settings.size > 0 && this.items.len() >= this.settings.size {
                        this.deadline.set(None);
                        return Poll::Ready(Some(BatchOutcome::Batch(std::mem::take(this.items))));
                    }
                }
                Poll::Ready(None) => {
                    *this.inner_stream_ended = true;
                    this.deadline.set(None);

                    let last = if this.items.is_empty() {
                        None
                    } else {
                        Some(BatchOutcome::Batch(std::mem::take(this.items)))
                    };

                    return Poll::Ready(last);
                }
            }
        }
        *this.polled_items = 0;

        if !this.items.is_empty()
            && let Some(deadline) = this.deadline.as_mut().as_pin_mut()
        {
            ready!(deadline.poll(cx));
            this.deadline.set(None);

            return Poll::Ready(Some(BatchOutcome::Batch(std::mem::take(this.items))));
        }

        Poll::Pending
    }
}
