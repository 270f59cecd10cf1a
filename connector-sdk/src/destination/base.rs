use bytes::Bytes;
use std::future::Future;

use crate::config::ConfigMap;
use crate::context::Context;
use crate::error::SdkResult;
use crate::parameter::Parameters;

/// A record handed to a [`Destination`].
///
/// The payload is opaque to the SDK, its encoding is owned by the connector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub key: Option<Bytes>,
    pub payload: Bytes,
}

impl Record {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            key: None,
            payload: payload.into(),
        }
    }

    pub fn with_key(key: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            key: Some(key.into()),
            payload: payload.into(),
        }
    }
}

/// Capability contract of a data-sink connector.
///
/// Middlewares wrap a [`Destination`] and implement this trait themselves, so any number of them
/// can be stacked and driven as if they were the wrapped destination.
///
/// `configure` is called once, before `open`, and never concurrently with another call. `write`
/// may be called concurrently from several tasks.
pub trait Destination: Send + Sync {
    /// Returns the configuration parameters understood by this destination.
    fn parameters(&self) -> Parameters;

    /// Applies the raw configuration.
    ///
    /// The map is mutable so that wrapping layers can fill in their defaults and have the wrapped
    /// destination observe the resolved values.
    fn configure(
        &mut self,
        ctx: &Context,
        config: &mut ConfigMap,
    ) -> impl Future<Output = SdkResult<()>> + Send;

    fn open(&mut self, ctx: &Context) -> impl Future<Output = SdkResult<()>> + Send;

    /// Writes `records`, returning how many were written.
    fn write(
        &self,
        ctx: &Context,
        records: Vec<Record>,
    ) -> impl Future<Output = SdkResult<usize>> + Send;

    fn teardown(&mut self, ctx: &Context) -> impl Future<Output = SdkResult<()>> + Send;
}
