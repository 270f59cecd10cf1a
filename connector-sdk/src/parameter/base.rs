use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Declared parameters of a connector, keyed by configuration key.
pub type Parameters = HashMap<String, Parameter>;

/// The type of value a [`Parameter`] accepts.
///
/// The type is metadata: values always travel as strings, the type documents how they are
/// interpreted and drives validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterType {
    #[default]
    String,
    Int,
    Float,
    Bool,
    File,
    Duration,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterType::String => "string",
            ParameterType::Int => "int",
            ParameterType::Float => "float",
            ParameterType::Bool => "bool",
            ParameterType::File => "file",
            ParameterType::Duration => "duration",
        };

        f.write_str(name)
    }
}

/// A rule a configuration value must satisfy.
#[derive(Debug, Clone)]
pub enum Validation {
    /// The value must not be empty.
    Required,
    /// The value, read as a number, must be strictly greater than the bound.
    GreaterThan(f64),
    /// The value, read as a number, must be strictly less than the bound.
    LessThan(f64),
    /// The value must be one of the listed options.
    Inclusion(Vec<String>),
    /// The value must not be any of the listed options.
    Exclusion(Vec<String>),
    /// The value must match the pattern.
    Regex(Regex),
}

impl PartialEq for Validation {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Validation::Required, Validation::Required) => true,
            (Validation::GreaterThan(a), Validation::GreaterThan(b))
            | (Validation::LessThan(a), Validation::LessThan(b)) => a == b,
            (Validation::Inclusion(a), Validation::Inclusion(b))
            | (Validation::Exclusion(a), Validation::Exclusion(b)) => a == b,
            (Validation::Regex(a), Validation::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Required => f.write_str("required"),
            Validation::GreaterThan(bound) => write!(f, "greater than {bound}"),
            Validation::LessThan(bound) => write!(f, "less than {bound}"),
            Validation::Inclusion(options) => write!(f, "one of [{}]", options.join(", ")),
            Validation::Exclusion(options) => write!(f, "none of [{}]", options.join(", ")),
            Validation::Regex(regex) => write!(f, "matching {:?}", regex.as_str()),
        }
    }
}

/// Describes one configuration key of a connector or middleware.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    /// Value used when the key is absent from the configuration.
    pub default: String,
    /// Human readable explanation of the parameter.
    pub description: String,
    /// How the value is interpreted.
    pub kind: ParameterType,
    /// Whether the key must be supplied.
    pub required: bool,
    /// Rules checked, in order, against the value.
    pub validations: Vec<Validation>,
}

impl Parameter {
    /// Creates a parameter of the given type with a description and no default.
    pub fn new(kind: ParameterType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            ..Default::default()
        }
    }

    /// Sets the default value.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = default.into();
        self
    }

    /// Marks the parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Appends a validation rule.
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }
}
