use std::fmt;

use tracing::trace;

use crate::config::ConfigMap;
use crate::config::coerce::Coerce;
use crate::error::{ErrorKind, SdkError, SdkResult};
use crate::sdk_error;

/// Separator placed between the name of a nested group and the names of its fields.
pub const NESTED_KEY_SEPARATOR: char = '.';

type Assign<'a> = Box<dyn FnMut(&str) -> SdkResult<()> + Send + 'a>;

/// A configuration struct that can be decoded from a flat [`ConfigMap`].
///
/// Implementations bind each field to the key it is read from. Groups of fields shared between
/// several configurations are composed with [`FieldSet::flatten`] (fields keep their own names)
/// or [`FieldSet::nested`] (fields are prefixed with the group name).
///
/// ```
/// use connector_sdk::config::{ConfigSchema, FieldSet};
///
/// #[derive(Default)]
/// struct GlobalConfig {
///     name: String,
/// }
///
/// impl ConfigSchema for GlobalConfig {
///     fn register<'a>(&'a mut self, fields: &mut FieldSet<'a>) {
///         fields.field("name", &mut self.name);
///     }
/// }
///
/// #[derive(Default)]
/// struct DestinationConfig {
///     global: GlobalConfig,
///     enabled: bool,
/// }
///
/// impl ConfigSchema for DestinationConfig {
///     fn register<'a>(&'a mut self, fields: &mut FieldSet<'a>) {
///         fields
///             .flatten(&mut self.global)
///             .field("enabled", &mut self.enabled);
///     }
/// }
/// ```
pub trait ConfigSchema {
    /// Registers every field of `self` into `fields`.
    fn register<'a>(&'a mut self, fields: &mut FieldSet<'a>);
}

struct Field<'a> {
    key: String,
    type_name: &'static str,
    assign: Assign<'a>,
}

/// The flattened set of fields of a [`ConfigSchema`], each bound to a coercion rule.
///
/// Field keys are unique across the whole set, including fields contributed by flattened and
/// nested groups. Registering a key twice is a programming error and panics.
pub struct FieldSet<'a> {
    prefix: String,
    fields: Vec<Field<'a>>,
}

impl<'a> FieldSet<'a> {
    /// Creates an empty set of fields without key prefix.
    pub fn new() -> Self {
        Self::with_prefix(String::new())
    }

    fn with_prefix(prefix: String) -> Self {
        Self {
            prefix,
            fields: Vec::new(),
        }
    }

    /// Binds `slot` to the key `name`, coercing raw values with the rule of `T`.
    pub fn field<T>(&mut self, name: &str, slot: &'a mut T) -> &mut Self
    where
        T: Coerce + Send,
    {
        let key = format!("{}{name}", self.prefix);
        self.push(Field {
            key,
            type_name: T::TYPE_NAME,
            assign: Box::new(move |value| {
                *slot = T::coerce(value)?;
                Ok(())
            }),
        });

        self
    }

    /// Registers the fields of `schema` at the current level, as if they were declared directly in
    /// the enclosing configuration.
    pub fn flatten<S>(&mut self, schema: &'a mut S) -> &mut Self
    where
        S: ConfigSchema + ?Sized,
    {
        schema.register(self);

        self
    }

    /// Registers the fields of `schema` under `name`, so that its field `x` is read from the key
    /// `name.x`.
    pub fn nested<S>(&mut self, name: &str, schema: &'a mut S) -> &mut Self
    where
        S: ConfigSchema + ?Sized,
    {
        let prefix = format!("{}{name}{NESTED_KEY_SEPARATOR}", self.prefix);
        let mut nested = FieldSet::with_prefix(prefix);
        schema.register(&mut nested);

        for field in nested.fields {
            self.push(field);
        }

        self
    }

    /// Returns the keys of all registered fields in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.key.as_str())
    }

    /// Returns the number of registered fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is registered.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn push(&mut self, field: Field<'a>) {
        if self.fields.iter().any(|f| f.key == field.key) {
            panic!("configuration field {:?} declared twice", field.key);
        }

        self.fields.push(field);
    }
}

impl Default for FieldSet<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FieldSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|field| (&field.key, field.type_name)))
            .finish()
    }
}

/// Looks up the raw value for `key`, preferring an exact match over a case-insensitive one.
pub(crate) fn lookup<'r>(raw: &'r ConfigMap, key: &str) -> Option<(&'r str, &'r str)> {
    if let Some((k, v)) = raw.get_key_value(key) {
        return Some((k.as_str(), v.as_str()));
    }

    let mut candidates: Vec<_> = raw
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(key))
        .collect();
    // Several spellings of the same key are resolved deterministically.
    candidates.sort_by(|a, b| a.0.cmp(b.0));

    candidates
        .first()
        .map(|(k, v)| (k.as_str(), v.as_str()))
}

/// Returns `true` if `raw` holds a value for `key`, with the same key matching rules as
/// [`decode_config`].
pub fn contains_key(raw: &ConfigMap, key: &str) -> bool {
    lookup(raw, key).is_some()
}

/// Decodes `raw` into `target`.
///
/// Each field registered by `target` takes the value of its key in `raw`, converted with the
/// coercion rule of the field type. Decoding is an overlay: fields whose key is absent keep their
/// current value, and keys without a matching field are ignored since they may belong to another
/// middleware or to the wrapped destination.
///
/// All conversion failures are collected and returned together as
/// [`ErrorKind::ConfigDecodeFailed`] errors naming the offending key.
pub fn decode_config<S>(raw: &ConfigMap, target: &mut S) -> SdkResult<()>
where
    S: ConfigSchema + ?Sized,
{
    let mut fields = FieldSet::new();
    target.register(&mut fields);

    let mut errors = Vec::new();
    for field in fields.fields.iter_mut() {
        let Some((key, value)) = lookup(raw, &field.key) else {
            continue;
        };

        if let Err(err) = (field.assign)(value) {
            errors.push(sdk_error!(
                ErrorKind::ConfigDecodeFailed,
                "Configuration value could not be decoded",
                format!("{key} ({}): {err}", field.type_name)
            ));
        }
    }

    for key in raw.keys() {
        if !fields
            .fields
            .iter()
            .any(|field| field.key.eq_ignore_ascii_case(key))
        {
            trace!(key = %key, "ignoring configuration key without a matching field");
        }
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(SdkError::many(errors)),
    }
}

/// Decodes `raw` into a fresh default value of `S`.
pub fn parse_config<S>(raw: &ConfigMap) -> SdkResult<S>
where
    S: ConfigSchema + Default,
{
    let mut config = S::default();
    decode_config(raw, &mut config)?;

    Ok(config)
}
