//! Logging setup shared by connectors, their examples and their tests.

pub mod tracing;

pub use crate::tracing::{
    LogFlusher, TracingError, TracingOptions, init_test_tracing, init_tracing,
    init_tracing_with_options,
};
