//! Decoding of raw connector configuration.
//!
//! Connectors receive their configuration as a flat map of string keys to string values. This
//! module turns such a map into typed configuration structs through explicitly registered
//! [`ConfigSchema`] fields, and provides the duration syntax shared by all parameters.

use std::collections::HashMap;

mod coerce;
mod decode;
mod duration;

pub use coerce::{Coerce, LIST_SEPARATOR};
pub use decode::{
    ConfigSchema, FieldSet, NESTED_KEY_SEPARATOR, contains_key, decode_config, parse_config,
};
pub use duration::{format_duration, parse_duration};

pub(crate) use decode::lookup;

/// Raw configuration of a connector: every key and value crosses the connector boundary as a
/// string.
pub type ConfigMap = HashMap<String, String>;
