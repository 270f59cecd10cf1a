//! Middlewares adding opt-in behaviour to a [`Destination`].
//!
//! A middleware wraps a destination into a new value that is itself a [`Destination`]. The
//! wrapper intercepts [`Destination::parameters`] to declare its own configuration keys and
//! [`Destination::configure`] to resolve them, then delegates to the wrapped destination. Any
//! number of middlewares can be stacked; the stacking order is the order of the
//! [`DestinationExt::with`] calls, the last one being the outermost.

mod batch;
mod rate_limit;

pub use batch::{
    BATCH_DELAY_KEY, BATCH_SIZE_KEY, BatchSettings, BatchedDestination, DestinationWithBatch,
};
pub use rate_limit::{
    DestinationWithRateLimit, RATE_BURST_KEY, RATE_PER_SECOND_KEY, RateLimitedDestination,
};

use crate::destination::Destination;

/// A decorator turning a [`Destination`] into another [`Destination`].
pub trait DestinationMiddleware {
    type Wrapped<D: Destination>: Destination;

    /// Wraps `destination`, taking exclusive ownership of it.
    fn wrap<D: Destination>(self, destination: D) -> Self::Wrapped<D>;
}

/// Extension methods available on every [`Destination`].
pub trait DestinationExt: Destination + Sized {
    /// Wraps `self` with `middleware`.
    fn with<M: DestinationMiddleware>(self, middleware: M) -> M::Wrapped<Self> {
        middleware.wrap(self)
    }
}

impl<D: Destination> DestinationExt for D {}

/// A destination wrapped with the default middlewares.
pub type DefaultMiddleware<D> = BatchedDestination<RateLimitedDestination<D>>;

/// Wraps `destination` with the rate limit middleware and then the batch middleware, both with
/// their default settings.
///
/// Batching is the outermost layer, so a batch counts as a single write against the rate limit.
pub fn with_default_middleware<D: Destination>(destination: D) -> DefaultMiddleware<D> {
    destination
        .with(DestinationWithRateLimit::default())
        .with(DestinationWithBatch::default())
}
