//! Configuration loading for connectors.
//!
//! Provides environment detection and the hierarchical loading of a connector's raw settings from
//! YAML files and environment variables.

mod environment;
mod load;

pub use environment::*;
pub use load::*;
