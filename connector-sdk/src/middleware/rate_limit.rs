use tracing::{debug, trace};

use crate::bail;
use crate::concurrency::limiter::Limiter;
use crate::config::{ConfigMap, ConfigSchema, FieldSet, contains_key, parse_config};
use crate::context::Context;
use crate::destination::{Destination, Record};
use crate::error::{ErrorKind, SdkResult};
use crate::middleware::DestinationMiddleware;
use crate::parameter::{Parameter, ParameterType, Parameters, merge_parameters};

/// Maximum number of writes per second, `0` to disable rate limiting.
pub const RATE_PER_SECOND_KEY: &str = "sdk.rate.perSecond";
/// Number of writes allowed to go through at once, at least 1.
pub const RATE_BURST_KEY: &str = "sdk.rate.burst";

#[derive(Debug, Default)]
struct RateLimitConfig {
    rate_per_second: f64,
    burst: i64,
}

impl ConfigSchema for RateLimitConfig {
    fn register<'a>(&'a mut self, fields: &mut FieldSet<'a>) {
        fields
            .field(RATE_PER_SECOND_KEY, &mut self.rate_per_second)
            .field(RATE_BURST_KEY, &mut self.burst);
    }
}

/// Middleware throttling the writes of a destination with a token bucket.
///
/// A rate of `0` leaves the destination unlimited. A burst below 1 is raised to 1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DestinationWithRateLimit {
    pub default_rate_per_second: f64,
    pub default_burst: i64,
}

impl DestinationWithRateLimit {
    pub fn new(default_rate_per_second: f64, default_burst: i64) -> Self {
        Self {
            default_rate_per_second,
            default_burst,
        }
    }

    fn parameters(&self) -> Parameters {
        Parameters::from([
            (
                RATE_PER_SECOND_KEY.to_string(),
                Parameter::new(
                    ParameterType::Float,
                    "Maximum times the Write function can be called per second (0 means no rate limit).",
                )
                .with_default(self.default_rate_per_second.to_string()),
            ),
            (
                RATE_BURST_KEY.to_string(),
                Parameter::new(
                    ParameterType::Int,
                    "Allow bursts of at most X writes (1 or less means that bursts are not allowed). Only takes effect if a rate limit per second is set.",
                )
                .with_default(self.default_burst.to_string()),
            ),
        ])
    }

    /// Sets the keys absent from `config` to their default values.
    fn fill_defaults(&self, config: &mut ConfigMap) {
        let defaults = [
            (RATE_PER_SECOND_KEY, self.default_rate_per_second.to_string()),
            (RATE_BURST_KEY, self.default_burst.to_string()),
        ];

        for (key, default) in defaults {
            if !contains_key(config, key) {
                config.insert(key.to_string(), default);
            }
        }
    }
}

impl DestinationMiddleware for DestinationWithRateLimit {
    type Wrapped<D: Destination> = RateLimitedDestination<D>;

    fn wrap<D: Destination>(self, destination: D) -> RateLimitedDestination<D> {
        RateLimitedDestination {
            inner: destination,
            middleware: self,
            limiter: None,
        }
    }
}

/// A destination wrapped by [`DestinationWithRateLimit`].
#[derive(Debug)]
pub struct RateLimitedDestination<D> {
    inner: D,
    middleware: DestinationWithRateLimit,
    limiter: Option<Limiter>,
}

impl<D> RateLimitedDestination<D> {
    /// Returns the limiter created by [`Destination::configure`], `None` when writes are not
    /// limited.
    pub fn limiter(&self) -> Option<&Limiter> {
        self.limiter.as_ref()
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Destination> Destination for RateLimitedDestination<D> {
    fn parameters(&self) -> Parameters {
        merge_parameters(self.inner.parameters(), self.middleware.parameters())
    }

    async fn configure(&mut self, ctx: &Context, config: &mut ConfigMap) -> SdkResult<()> {
        self.middleware.fill_defaults(config);

        let resolved: RateLimitConfig = parse_config(config)?;
        let rate = resolved.rate_per_second;
        if !rate.is_finite() || rate < 0.0 {
            bail!(
                ErrorKind::ConfigDecodeFailed,
                "Rate limit must be a non-negative finite number",
                format!("{RATE_PER_SECOND_KEY}: {rate} is not a valid rate")
            );
        }

        let burst = usize::try_from(resolved.burst.max(1)).unwrap_or(usize::MAX);
        self.limiter = if rate > 0.0 {
            debug!(rate, burst, "rate limiting writes");
            Some(Limiter::new(rate, burst))
        } else {
            debug!("rate limiting disabled");
            None
        };

        self.inner.configure(ctx, config).await
    }

    async fn open(&mut self, ctx: &Context) -> SdkResult<()> {
        self.inner.open(ctx).await
    }

    async fn write(&self, ctx: &Context, records: Vec<Record>) -> SdkResult<usize> {
        if let Some(limiter) = &self.limiter {
            trace!(records = records.len(), "acquiring write token");
            limiter.acquire(ctx).await?;
        }

        self.inner.write(ctx, records).await
    }

    async fn teardown(&mut self, ctx: &Context) -> SdkResult<()> {
        self.inner.teardown(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::time::Instant;

    use super::*;
    use crate::error::SdkError;
    use crate::middleware::DestinationExt;
    use crate::test_utils::test_destination::TestDestination;

    fn config(pairs: &[(&str, &str)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parameters_are_merged() {
        let inner = TestDestination::new().with_parameters(Parameters::from([(
            "foo".to_string(),
            Parameter::new(ParameterType::String, "baz")
                .with_default("bar")
                .required(),
        )]));
        let expected = inner.parameters();

        let destination = inner.with(DestinationWithRateLimit::new(1.5, 3));
        let parameters = destination.parameters();

        assert_eq!(parameters.len(), 3);
        assert_eq!(parameters["foo"], expected["foo"]);
        assert_eq!(parameters[RATE_PER_SECOND_KEY].default, "1.5");
        assert_eq!(parameters[RATE_PER_SECOND_KEY].kind, ParameterType::Float);
        assert_eq!(parameters[RATE_BURST_KEY].default, "3");
        assert_eq!(parameters[RATE_BURST_KEY].kind, ParameterType::Int);
    }

    #[tokio::test]
    async fn configure_builds_the_limiter() {
        let cases = [
            ("empty config", DestinationWithRateLimit::default(), config(&[]), None),
            (
                "empty config, custom defaults",
                DestinationWithRateLimit::new(1.23, 4),
                config(&[]),
                Some((1.23, 4)),
            ),
            (
                "negative burst default",
                DestinationWithRateLimit::new(1.23, -2),
                config(&[]),
                Some((1.23, 1)),
            ),
            (
                "config with values",
                DestinationWithRateLimit::new(1.23, 4),
                config(&[(RATE_PER_SECOND_KEY, "12.34"), (RATE_BURST_KEY, "5")]),
                Some((12.34, 5)),
            ),
            (
                "config with zero burst",
                DestinationWithRateLimit::new(1.23, 4),
                config(&[(RATE_BURST_KEY, "0")]),
                Some((1.23, 1)),
            ),
            (
                "keys spelled in another case",
                DestinationWithRateLimit::new(1.23, 4),
                config(&[("SDK.RATE.PERSECOND", "3")]),
                Some((3.0, 4)),
            ),
            (
                "rate disabled by config",
                DestinationWithRateLimit::new(1.23, 4),
                config(&[(RATE_PER_SECOND_KEY, "0")]),
                None,
            ),
        ];

        for (name, middleware, mut have, want) in cases {
            let inner = TestDestination::new();
            let mut destination = inner.clone().with(middleware);

            destination
                .configure(&Context::background(), &mut have)
                .await
                .unwrap();

            let limiter = destination
                .limiter()
                .map(|limiter| (limiter.limit(), limiter.burst()));
            assert_eq!(limiter, want, "{name}");
            assert_eq!(inner.configure_calls().len(), 1, "{name}");
            assert!(contains_key(&have, RATE_PER_SECOND_KEY), "{name}");
            assert!(contains_key(&have, RATE_BURST_KEY), "{name}");
            assert_eq!(have.len(), 2, "{name}");
        }
    }

    #[tokio::test]
    async fn invalid_rates_are_rejected() {
        for rate in ["-1", "NaN", "inf", "fast"] {
            let inner = TestDestination::new();
            let mut destination = inner.clone().with(DestinationWithRateLimit::default());

            let err = destination
                .configure(
                    &Context::background(),
                    &mut config(&[(RATE_PER_SECOND_KEY, rate)]),
                )
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::ConfigDecodeFailed, "{rate}");
            assert!(inner.configure_calls().is_empty(), "{rate}");
            if rate != "fast" {
                assert!(err.to_string().contains("non-negative finite"), "{rate}");
            }
        }
    }

    #[tokio::test]
    async fn inner_errors_propagate_unchanged() {
        let failure = SdkError::from((ErrorKind::ConfigError, "Inner configuration rejected"));
        let mut destination = TestDestination::new()
            .failing_configure(failure.clone())
            .with(DestinationWithRateLimit::new(1.0, 1));

        let err = destination
            .configure(&Context::background(), &mut ConfigMap::new())
            .await
            .unwrap_err();

        assert_eq!(err, failure);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_are_throttled() {
        let inner = TestDestination::new();
        let mut destination = inner.clone().with(DestinationWithRateLimit::new(2.0, 1));
        let ctx = Context::background();
        destination
            .configure(&ctx, &mut ConfigMap::new())
            .await
            .unwrap();

        let start = Instant::now();
        for _ in 0..3 {
            destination
                .write(&ctx, vec![Record::new("payload")])
                .await
                .unwrap();
        }

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(inner.write_calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_writes_do_not_wait() {
        let inner = TestDestination::new();
        let mut destination = inner.clone().with(DestinationWithRateLimit::default());
        let ctx = Context::background();
        destination
            .configure(&ctx, &mut ConfigMap::new())
            .await
            .unwrap();

        let start = Instant::now();
        for _ in 0..100 {
            destination
                .write(&ctx, vec![Record::new("payload")])
                .await
                .unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_write_is_not_delegated() {
        let inner = TestDestination::new();
        let mut destination = inner.clone().with(DestinationWithRateLimit::new(0.1, 1));
        let (ctx, handle) = Context::background().with_cancel();
        destination
            .configure(&ctx, &mut ConfigMap::new())
            .await
            .unwrap();

        destination
            .write(&ctx, vec![Record::new("first")])
            .await
            .unwrap();

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        };
        let (result, _) = tokio::join!(
            destination.write(&ctx, vec![Record::new("second")]),
            canceller
        );

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
        assert!(err.is_cancellation());
        assert_eq!(inner.write_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tiny_rate_write_fails_fast_past_deadline() {
        let inner = TestDestination::new();
        let mut destination = inner.clone().with(DestinationWithRateLimit::default());
        let ctx = Context::background();
        destination
            .configure(&ctx, &mut config(&[(RATE_PER_SECOND_KEY, "1e-300")]))
            .await
            .unwrap();
        destination
            .write(&ctx, vec![Record::new("first")])
            .await
            .unwrap();

        let ctx = ctx.with_timeout(Duration::from_secs(1));
        let err = destination
            .write(&ctx, vec![Record::new("second")])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert_eq!(inner.write_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn write_past_deadline_fails_fast() {
        let inner = TestDestination::new();
        let mut destination = inner.clone().with(DestinationWithRateLimit::new(1.0, 1));
        let ctx = Context::background();
        destination
            .configure(&ctx, &mut ConfigMap::new())
            .await
            .unwrap();
        destination
            .write(&ctx, vec![Record::new("first")])
            .await
            .unwrap();

        let ctx = ctx.with_timeout(Duration::from_millis(10));
        let err = destination
            .write(&ctx, vec![Record::new("second")])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert_eq!(inner.write_calls().len(), 1);
    }
}
