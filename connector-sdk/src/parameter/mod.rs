//! Parameter declarations of connectors and middlewares.
//!
//! A [`Parameter`] documents one configuration key. Destinations declare their parameters, and
//! every middleware wrapping a destination merges its own into the declaration with
//! [`merge_parameters`].

mod base;
mod merge;
mod validate;

pub use base::{Parameter, ParameterType, Parameters, Validation};
pub use merge::merge_parameters;
pub use validate::validate_config;
