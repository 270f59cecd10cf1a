//! Helpers for testing destinations and middlewares.
//!
//! Available in unit tests and, through the `test-utils` feature, to downstream crates.
pub mod test_destination;
