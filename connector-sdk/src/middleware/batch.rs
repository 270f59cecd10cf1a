use futures::{Stream, StreamExt};
use std::pin::pin;
use std::time::Duration;
use tracing::{debug, info};

use crate::concurrency::stream::{BatchOutcome, BatchStream};
use crate::config::{
    ConfigMap, ConfigSchema, FieldSet, contains_key, format_duration, parse_config,
};
use crate::context::Context;
use crate::destination::{Destination, Record};
use crate::error::SdkResult;
use crate::middleware::DestinationMiddleware;
use crate::parameter::{Parameter, ParameterType, Parameters, merge_parameters};

/// Maximum number of records in a batch, `0` for no size limit.
pub const BATCH_SIZE_KEY: &str = "sdk.batch.size";
/// Maximum time a batch is held before being written, `0s` for no time limit.
pub const BATCH_DELAY_KEY: &str = "sdk.batch.delay";

/// Resolved batching configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSettings {
    pub size: usize,
    pub delay: Duration,
}

impl BatchSettings {
    pub fn new(size: usize, delay: Duration) -> Self {
        Self { size, delay }
    }

    /// Returns `true` when either limit is set.
    pub fn enabled(&self) -> bool {
        self.size > 0 || !self.delay.is_zero()
    }
}

impl ConfigSchema for BatchSettings {
    fn register<'a>(&'a mut self, fields: &mut FieldSet<'a>) {
        fields
            .field(BATCH_SIZE_KEY, &mut self.size)
            .field(BATCH_DELAY_KEY, &mut self.delay);
    }
}

/// Middleware adding write batching to a destination.
///
/// The defaults apply when the configuration does not set [`BATCH_SIZE_KEY`] or
/// [`BATCH_DELAY_KEY`]; zero defaults leave batching disabled unless the configuration enables
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DestinationWithBatch {
    pub default_batch_size: usize,
    pub default_batch_delay: Duration,
}

impl DestinationWithBatch {
    pub fn new(default_batch_size: usize, default_batch_delay: Duration) -> Self {
        Self {
            default_batch_size,
            default_batch_delay,
        }
    }

    fn parameters(&self) -> Parameters {
        Parameters::from([
            (
                BATCH_SIZE_KEY.to_string(),
                Parameter::new(
                    ParameterType::Int,
                    "Maximum size of batch before it gets written to the destination.",
                )
                .with_default(self.default_batch_size.to_string()),
            ),
            (
                BATCH_DELAY_KEY.to_string(),
                Parameter::new(
                    ParameterType::Duration,
                    "Maximum delay before an incomplete batch is written to the destination.",
                )
                .with_default(format_duration(self.default_batch_delay)),
            ),
        ])
    }

    /// Sets the keys absent from `config` to their default values.
    fn fill_defaults(&self, config: &mut ConfigMap) {
        let defaults = [
            (BATCH_SIZE_KEY, self.default_batch_size.to_string()),
            (BATCH_DELAY_KEY, format_duration(self.default_batch_delay)),
        ];

        for (key, default) in defaults {
            if !contains_key(config, key) {
                config.insert(key.to_string(), default);
            }
        }
    }
}

impl DestinationMiddleware for DestinationWithBatch {
    type Wrapped<D: Destination> = BatchedDestination<D>;

    fn wrap<D: Destination>(self, destination: D) -> BatchedDestination<D> {
        BatchedDestination {
            inner: destination,
            middleware: self,
            settings: BatchSettings::default(),
        }
    }
}

/// A destination wrapped by [`DestinationWithBatch`].
///
/// Every call reaching the wrapped destination after [`Destination::configure`] carries a
/// context telling whether batching is enabled, see [`Context::batch_enabled`].
#[derive(Debug)]
pub struct BatchedDestination<D> {
    inner: D,
    middleware: DestinationWithBatch,
    settings: BatchSettings,
}

impl<D> BatchedDestination<D> {
    /// Returns the batching configuration resolved by [`Destination::configure`].
    pub fn settings(&self) -> BatchSettings {
        self.settings
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn write_context(&self, ctx: &Context) -> Context {
        ctx.with_batch_enabled(self.settings.enabled())
    }
}

impl<D: Destination> BatchedDestination<D> {
    /// Groups `records` into batches and writes each of them to the wrapped destination.
    ///
    /// Batches are cut when they reach the configured size, when the configured delay has passed
    /// since their first record, or when `records` ends. Returns the number of records written.
    ///
    /// When `ctx` is cancelled or reaches its deadline the records of the unfinished batch are
    /// dropped and the context's error is returned. A failed write stops the stream and its
    /// error is returned unchanged.
    pub async fn write_stream<S>(&self, ctx: &Context, records: S) -> SdkResult<usize>
    where
        S: Stream<Item = Record>,
    {
        let ctx = self.write_context(ctx);
        let mut batches = pin!(BatchStream::wrap(records, self.settings, ctx.clone()));

        let mut written = 0;
        while let Some(outcome) = batches.next().await {
            match outcome {
                BatchOutcome::Batch(batch) => {
                    debug!(records = batch.len(), "writing batch");
                    written += self.inner.write(&ctx, batch).await?;
                }
                BatchOutcome::Canceled { pending, error } => {
                    info!(
                        written,
                        dropped = pending.len(),
                        "stopped writing records: {error}"
                    );

                    return Err(error);
                }
            }
        }

        Ok(written)
    }
}

impl<D: Destination> Destination for BatchedDestination<D> {
    fn parameters(&self) -> Parameters {
        merge_parameters(self.inner.parameters(), self.middleware.parameters())
    }

    async fn configure(&mut self, ctx: &Context, config: &mut ConfigMap) -> SdkResult<()> {
        self.middleware.fill_defaults(config);

        let settings: BatchSettings = parse_config(config)?;
        debug!(
            size = settings.size,
            delay = %format_duration(settings.delay),
            enabled = settings.enabled(),
            "resolved batch configuration"
        );
        self.settings = settings;

        let ctx = ctx.with_batch_enabled(settings.enabled());
        self.inner.configure(&ctx, config).await
    }

    async fn open(&mut self, ctx: &Context) -> SdkResult<()> {
        let ctx = self.write_context(ctx);
        self.inner.open(&ctx).await
    }

    async fn write(&self, ctx: &Context, records: Vec<Record>) -> SdkResult<usize> {
        let ctx = self.write_context(ctx);
        self.inner.write(&ctx, records).await
    }

    async fn teardown(&mut self, ctx: &Context) -> SdkResult<()> {
        self.inner.teardown(ctx).await
    }
}
