use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::ConfigMap;
use crate::context::Context;
use crate::destination::{Destination, Record};
use crate::error::{SdkError, SdkResult};
use crate::parameter::Parameters;

/// A call to [`Destination::configure`] observed by a [`TestDestination`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigureCall {
    pub config: ConfigMap,
    pub batch_enabled: bool,
}

/// A call to [`Destination::write`] observed by a [`TestDestination`].
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCall {
    pub records: Vec<Record>,
    pub batch_enabled: bool,
}

#[derive(Debug, Default)]
struct Calls {
    configure: Vec<ConfigureCall>,
    open: usize,
    write: Vec<WriteCall>,
    teardown: usize,
}

/// A destination recording every call it receives, for testing middlewares.
///
/// Clones share the recorded calls, so a test can keep a clone while the original is moved into
/// a middleware.
#[derive(Debug, Clone, Default)]
pub struct TestDestination {
    parameters: Parameters,
    configure_error: Option<SdkError>,
    write_error: Option<SdkError>,
    calls: Arc<Mutex<Calls>>,
}

impl TestDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the parameters returned by [`Destination::parameters`].
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Makes [`Destination::configure`] fail with `error`.
    pub fn failing_configure(mut self, error: SdkError) -> Self {
        self.configure_error = Some(error);
        self
    }

    /// Makes [`Destination::write`] fail with `error`.
    pub fn failing_write(mut self, error: SdkError) -> Self {
        self.write_error = Some(error);
        self
    }

    pub fn configure_calls(&self) -> Vec<ConfigureCall> {
        self.calls.lock().configure.clone()
    }

    pub fn write_calls(&self) -> Vec<WriteCall> {
        self.calls.lock().write.clone()
    }

    pub fn open_calls(&self) -> usize {
        self.calls.lock().open
    }

    pub fn teardown_calls(&self) -> usize {
        self.calls.lock().teardown
    }
}

impl Destination for TestDestination {
    fn parameters(&self) -> Parameters {
        self.parameters.clone()
    }

    async fn configure(&mut self, ctx: &Context, config: &mut ConfigMap) -> SdkResult<()> {
        if let Some(err) = &self.configure_error {
            return Err(err.clone());
        }

        self.calls.lock().configure.push(ConfigureCall {
            config: config.clone(),
            batch_enabled: ctx.batch_enabled(),
        });

        Ok(())
    }

    async fn open(&mut self, _ctx: &Context) -> SdkResult<()> {
        self.calls.lock().open += 1;

        Ok(())
    }

    async fn write(&self, ctx: &Context, records: Vec<Record>) -> SdkResult<usize> {
        let written = records.len();
        self.calls.lock().write.push(WriteCall {
            records,
            batch_enabled: ctx.batch_enabled(),
        });

        match &self.write_error {
            Some(err) => Err(err.clone()),
            None => Ok(written),
        }
    }

    async fn teardown(&mut self, _ctx: &Context) -> SdkResult<()> {
        self.calls.lock().teardown += 1;

        Ok(())
    }
}
