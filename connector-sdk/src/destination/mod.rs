//! Data destination abstractions and implementations.
//!
//! Provides the [`Destination`] trait that connectors implement and that middlewares wrap, the
//! [`Record`] type flowing through it, and an in-memory destination.

mod base;
pub mod memory;

pub use base::{Destination, Record};
