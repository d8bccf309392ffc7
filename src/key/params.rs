//! Canonical Parameter Objects
//!
//! Query parameters become part of a cache key, so two logically equal
//! parameter objects must produce the same key no matter how they were
//! built: field order is irrelevant and `null` fields count as absent.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::{CacheError, Result};

// == Params ==
/// Normalized parameter object used as a key segment.
///
/// Equality, ordering and hashing all go through the canonical JSON text,
/// which has sorted object keys and no `null` object fields at any depth.
#[derive(Clone)]
pub struct Params {
    fields: Map<String, Value>,
    canonical: String,
}

impl Params {
    /// Creates an empty parameter object.
    pub fn new() -> Self {
        Self::from_map(Map::new())
    }

    /// Builds params from a JSON value.
    ///
    /// `null` is accepted as "no parameters". Anything other than an object
    /// or `null` is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(CacheError::InvalidKey(format!(
                "params must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Builds params from any serializable filter struct.
    ///
    /// `Option::None` fields serialize to `null` and are dropped, so a
    /// filter with an unset field keys the same as one without the field.
    pub fn from_serialize<T: Serialize>(params: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(params)?)
    }

    fn from_map(map: Map<String, Value>) -> Self {
        let fields = match canonicalize(Value::Object(map)) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        // Serializing a map of JSON values cannot fail.
        let canonical = serde_json::to_string(&fields).unwrap_or_default();
        Self { fields, canonical }
    }

    /// Returns a copy with one field set. A `null` value removes the field.
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = self.fields;
        map.insert(name.into(), value.into());
        Self::from_map(map)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Canonical JSON text of the parameters.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

// == Canonicalization ==
/// Sorts object keys, drops `null` object fields and writes integral
/// floats as integers, recursively.
///
/// Array elements are kept (including `null`), since their position
/// carries meaning.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Number(number) => Value::Number(normalize_number(number)),
        other => other,
    }
}

/// `1.0` and `1` are the same JSON number.
fn normalize_number(number: Number) -> Number {
    let integral = number
        .as_f64()
        .filter(|float| number.is_f64() && float.fract() == 0.0)
        .filter(|float| (i64::MIN as f64..i64::MAX as f64).contains(float));
    match integral {
        Some(float) => Number::from(float as i64),
        None => number,
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Params {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Params {}

impl Hash for Params {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for Params {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Params {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Params({})", self.canonical)
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Params::from_value(value).map_err(serde::de::Error::custom)
    }
}
