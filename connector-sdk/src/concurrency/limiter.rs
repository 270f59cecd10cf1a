use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::trace;

use crate::bail;
use crate::context::Context;
use crate::error::{ErrorKind, SdkResult};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter shared by concurrent writers.
///
/// The bucket holds up to `burst` tokens and refills at `limit` tokens per second. It starts full,
/// so the first `burst` acquisitions succeed immediately. Waiting callers reserve their token
/// up-front, which keeps the admission order fair under contention.
#[derive(Debug)]
pub struct Limiter {
    limit: f64,
    burst: usize,
    bucket: Mutex<Bucket>,
}

impl Limiter {
    /// Creates a limiter admitting `limit` operations per second with bursts of up to `burst`.
    ///
    /// `limit` must be a positive, finite number.
    pub fn new(limit: f64, burst: usize) -> Self {
        debug_assert!(limit > 0.0 && limit.is_finite(), "invalid limit {limit}");

        Self {
            limit,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Returns the number of tokens added per second.
    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// Returns the maximum number of tokens the bucket holds.
    pub fn burst(&self) -> usize {
        self.burst
    }

    /// Returns the number of tokens currently available, negative while callers are waiting.
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());

        bucket.tokens
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Takes a token, waiting until one is available.
    ///
    /// The wait is aborted with the context's error as soon as `ctx` is cancelled or reaches its
    /// deadline. If the wait is known to outlast the deadline, the call fails immediately with
    /// [`ErrorKind::DeadlineExceeded`] instead of sleeping. An aborted wait gives its token back.
    pub async fn acquire(&self, ctx: &Context) -> SdkResult<()> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        if self.burst == 0 {
            bail!(
                ErrorKind::InvalidState,
                "Rate limiter does not admit any token",
                "the burst of the limiter is zero"
            );
        }

        let now = Instant::now();
        let wait = {
            let mut bucket = self.bucket.lock();
            self.refill(&mut bucket, now);
            bucket.tokens -= 1.0;

            if bucket.tokens >= 0.0 {
                Duration::ZERO
            } else {
                // Tiny limits produce waits no `Duration` can hold.
                Duration::try_from_secs_f64(-bucket.tokens / self.limit).unwrap_or(Duration::MAX)
            }
        };

        if wait.is_zero() {
            return Ok(());
        }

        if let Some(deadline) = ctx.deadline()
            && now.checked_add(wait).is_none_or(|ready_at| ready_at > deadline)
        {
            self.give_back();
            bail!(
                ErrorKind::DeadlineExceeded,
                "Rate limiter wait would exceed context deadline",
                format!("a token is available in {wait:?}")
            );
        }

        trace!(wait = ?wait, "waiting for a rate limiter token");

        tokio::select! {
            _ = sleep(wait) => Ok(()),
            err = ctx.done() => {
                self.give_back();
                Err(err)
            }
        }
    }

    fn give_back(&self) {
        let mut bucket = self.bucket.lock();
        bucket.tokens = (bucket.tokens + 1.0).min(self.burst as f64);
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        if now <= bucket.last_refill {
            return;
        }

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.limit).min(self.burst as f64);
        bucket.last_refill = now;
    }
}
