use std::time::Duration;

use crate::config::{Coerce, ConfigMap, lookup};
use crate::error::{ErrorKind, SdkError, SdkResult};
use crate::parameter::{Parameter, ParameterType, Parameters, Validation};
use crate::{bail, sdk_error};

impl Parameter {
    /// Checks `value` against the declared type and validations of this parameter.
    ///
    /// Empty values are only checked against [`Parameter::required`] and
    /// [`Validation::Required`]; optional parameters may always be left empty.
    pub fn validate(&self, name: &str, value: &str) -> SdkResult<()> {
        if value.is_empty() {
            if self.required || self.validations.contains(&Validation::Required) {
                bail!(
                    ErrorKind::ValidationError,
                    "Required parameter is missing",
                    format!("{name}: a value is required")
                );
            }

            return Ok(());
        }

        self.validate_type(name, value)?;

        for validation in &self.validations {
            validation.check(name, value)?;
        }

        Ok(())
    }

    fn validate_type(&self, name: &str, value: &str) -> SdkResult<()> {
        let result = match self.kind {
            ParameterType::String | ParameterType::File => Ok(()),
            ParameterType::Int => i64::coerce(value).map(drop),
            ParameterType::Float => f64::coerce(value).map(drop),
            ParameterType::Bool => bool::coerce(value).map(drop),
            ParameterType::Duration => Duration::coerce(value).map(drop),
        };

        result.map_err(|err| {
            sdk_error!(
                ErrorKind::ValidationError,
                "Parameter value has the wrong type",
                format!("{name}: expected {}, {err}", self.kind)
            )
        })
    }
}

impl Validation {
    fn check(&self, name: &str, value: &str) -> SdkResult<()> {
        let satisfied = match self {
            Validation::Required => !value.is_empty(),
            Validation::GreaterThan(bound) => parse_number(name, value)? > *bound,
            Validation::LessThan(bound) => parse_number(name, value)? < *bound,
            Validation::Inclusion(options) => options.iter().any(|option| option == value),
            Validation::Exclusion(options) => options.iter().all(|option| option != value),
            Validation::Regex(regex) => regex.is_match(value),
        };

        if !satisfied {
            bail!(
                ErrorKind::ValidationError,
                "Parameter value failed validation",
                format!("{name}: {value:?} is not {self}")
            );
        }

        Ok(())
    }
}

fn parse_number(name: &str, value: &str) -> SdkResult<f64> {
    value.parse::<f64>().map_err(|err| {
        sdk_error!(
            ErrorKind::ValidationError,
            "Parameter value is not a number",
            format!("{name}: {err} (received: {value:?})")
        )
    })
}

/// Validates a raw configuration against declared parameters.
///
/// Keys are matched the way the decoder matches them: exactly first, then ignoring ASCII case.
/// Absent keys are checked with their default value. Keys that are not declared are not checked,
/// as they may be consumed by another layer. Every failure is reported, aggregated into one error.
pub fn validate_config(parameters: &Parameters, config: &ConfigMap) -> SdkResult<()> {
    let mut names: Vec<&String> = parameters.keys().collect();
    names.sort();

    let mut errors = Vec::new();
    for name in names {
        let parameter = &parameters[name];
        let value = lookup(config, name)
            .map(|(_, value)| value)
            .unwrap_or(parameter.default.as_str());

        if let Err(err) = parameter.validate(name, value) {
            errors.push(err);
        }
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(SdkError::many(errors)),
    }
}
