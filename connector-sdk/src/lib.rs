pub mod concurrency;
pub mod config;
pub mod context;
pub mod destination;
pub mod error;
mod macros;
pub mod middleware;
pub mod parameter;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
