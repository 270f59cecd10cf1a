use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bail;
use crate::config::{ConfigMap, ConfigSchema, FieldSet, parse_config};
use crate::context::Context;
use crate::destination::base::{Destination, Record};
use crate::error::{ErrorKind, SdkResult};
use crate::parameter::{Parameter, ParameterType, Parameters, Validation, validate_config};

/// Maximum number of records kept by a [`MemoryDestination`], `0` for no limit.
pub const CAPACITY_KEY: &str = "memory.capacity";
/// Name the destination reports in its logs.
pub const NAME_KEY: &str = "memory.name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    pub capacity: usize,
    pub name: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            name: "memory".to_string(),
        }
    }
}

impl ConfigSchema for MemoryConfig {
    fn register<'a>(&'a mut self, fields: &mut FieldSet<'a>) {
        fields
            .field(CAPACITY_KEY, &mut self.capacity)
            .field(NAME_KEY, &mut self.name);
    }
}

#[derive(Debug, Default)]
struct Inner {
    raw_config: ConfigMap,
    config: MemoryConfig,
    records: Vec<Record>,
    batches: Vec<usize>,
    batch_flags: Vec<bool>,
    open: bool,
}

/// A destination keeping every written record in memory.
///
/// Clones share the same storage, which lets a caller keep a handle on the records after the
/// destination has been moved into a middleware.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Returns the configuration map received by [`Destination::configure`].
    pub async fn raw_config(&self) -> ConfigMap {
        self.inner.lock().await.raw_config.clone()
    }

    pub async fn config(&self) -> MemoryConfig {
        self.inner.lock().await.config.clone()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.inner.lock().await.records.clone()
    }

    /// Returns the size of every batch written so far, in order.
    pub async fn batches(&self) -> Vec<usize> {
        self.inner.lock().await.batches.clone()
    }

    /// Returns, for every batch written so far, whether its context had batching enabled.
    pub async fn batch_flags(&self) -> Vec<bool> {
        self.inner.lock().await.batch_flags.clone()
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.open
    }
}

impl Default for MemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl Destination for MemoryDestination {
    fn parameters(&self) -> Parameters {
        let defaults = MemoryConfig::default();

        Parameters::from([
            (
                CAPACITY_KEY.to_string(),
                Parameter::new(
                    ParameterType::Int,
                    "Maximum number of records kept in memory, 0 for no limit.",
                )
                .with_default(defaults.capacity.to_string())
                .with_validation(Validation::GreaterThan(-1.0)),
            ),
            (
                NAME_KEY.to_string(),
                Parameter::new(ParameterType::String, "Name used in the destination logs.")
                    .with_default(defaults.name),
            ),
        ])
    }

    async fn configure(&mut self, _ctx: &Context, config: &mut ConfigMap) -> SdkResult<()> {
        validate_config(&self.parameters(), config)?;
        let parsed: MemoryConfig = parse_config(config)?;

        let mut inner = self.inner.lock().await;
        info!(name = %parsed.name, capacity = parsed.capacity, "configured memory destination");
        inner.raw_config = config.clone();
        inner.config = parsed;

        Ok(())
    }

    async fn open(&mut self, _ctx: &Context) -> SdkResult<()> {
        let mut inner = self.inner.lock().await;
        info!(name = %inner.config.name, "opening memory destination");
        inner.open = true;

        Ok(())
    }

    async fn write(&self, ctx: &Context, records: Vec<Record>) -> SdkResult<usize> {
        let mut inner = self.inner.lock().await;
        if !inner.open {
            bail!(
                ErrorKind::InvalidState,
                "Destination is not open",
                format!("{} received a write before open", inner.config.name)
            );
        }

        let capacity = inner.config.capacity;
        if capacity > 0 && inner.records.len() + records.len() > capacity {
            bail!(
                ErrorKind::DestinationError,
                "Memory destination is full",
                format!(
                    "{} holds {} of {capacity} records, cannot add {}",
                    inner.config.name,
                    inner.records.len(),
                    records.len()
                )
            );
        }

        let written = records.len();
        info!(
            name = %inner.config.name,
            records = written,
            batch_enabled = ctx.batch_enabled(),
            "writing a batch of records"
        );
        for record in &records {
            debug!("  {:?}", record);
        }

        inner.records.extend(records);
        inner.batches.push(written);
        inner.batch_flags.push(ctx.batch_enabled());

        Ok(written)
    }

    async fn teardown(&mut self, _ctx: &Context) -> SdkResult<()> {
        let mut inner = self.inner.lock().await;
        info!(
            name = %inner.config.name,
            records = inner.records.len(),
            "tearing down memory destination"
        );
        inner.open = false;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn stores_records_after_open() {
        let mut destination = MemoryDestination::new();
        let ctx = Context::background();

        destination
            .configure(&ctx, &mut config(&[(NAME_KEY, "sink")]))
            .await
            .unwrap();
        let err = destination
            .write(&ctx, vec![Record::new("a")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        destination.open(&ctx).await.unwrap();
        let written = destination
            .write(&ctx, vec![Record::new("a"), Record::with_key("k", "b")])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(destination.config().await.name, "sink");
        assert_eq!(
            destination.records().await,
            vec![Record::new("a"), Record::with_key("k", "b")]
        );
        assert_eq!(destination.batches().await, vec![2]);
        assert_eq!(destination.batch_flags().await, vec![false]);

        destination.teardown(&ctx).await.unwrap();
        assert!(!destination.is_open().await);
    }

    #[tokio::test]
    async fn rejects_writes_over_capacity() {
        let mut destination = MemoryDestination::new();
        let ctx = Context::background();

        destination
            .configure(&ctx, &mut config(&[(CAPACITY_KEY, "2")]))
            .await
            .unwrap();
        destination.open(&ctx).await.unwrap();

        destination
            .write(&ctx, vec![Record::new("a")])
            .await
            .unwrap();
        let err = destination
            .write(&ctx, vec![Record::new("b"), Record::new("c")])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationError);
        assert_eq!(destination.records().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_configuration_is_rejected() {
        let mut destination = MemoryDestination::new();
        let ctx = Context::background();

        let err = destination
            .configure(&ctx, &mut config(&[(CAPACITY_KEY, "-3")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let err = destination
            .configure(&ctx, &mut config(&[(CAPACITY_KEY, "lots")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }
}
