//! Canonical key tuples.
//!
//! Tuples feed multisets (uniqueness checks) and sets (reference
//! membership), so values are converted into a canonical form with full
//! structural equality: mappings compare by sorted key, and a JSON `1`
//! equals a JSON `1.0`.

use serde_json::Value;

/// A finite, non-integral JSON number.
///
/// Integral floats are normalized to [`CanonicalValue::Int`] before this
/// type is used, so bit-level equality is exact here (JSON has no NaN).
#[derive(Debug, Clone, Copy)]
pub struct CanonicalFloat(f64);

impl PartialEq for CanonicalFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for CanonicalFloat {}

impl core::hash::Hash for CanonicalFloat {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for CanonicalFloat {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalFloat {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A JSON value in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    /// Any number with an exact integer value, however it was spelled.
    Int(i128),
    Float(CanonicalFloat),
    String(String),
    Array(Vec<CanonicalValue>),
    /// Entries sorted by key.
    Map(Vec<(String, CanonicalValue)>),
}

impl From<&Value> for CanonicalValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => canonical_number(n),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from).collect()),
            Value::Object(map) => {
                let mut entries: Vec<(String, CanonicalValue)> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect();
                entries.sort_by(|(a, _), (b, _)| a.cmp(b));
                Self::Map(entries)
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn canonical_number(n: &serde_json::Number) -> CanonicalValue {
    if let Some(i) = n.as_i64() {
        return CanonicalValue::Int(i128::from(i));
    }
    if let Some(u) = n.as_u64() {
        return CanonicalValue::Int(i128::from(u));
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9e18 => CanonicalValue::Int(f as i128),
        Some(f) => CanonicalValue::Float(CanonicalFloat(f)),
        None => CanonicalValue::Null,
    }
}

impl CanonicalValue {
    /// Convert back to a plain JSON value for reports.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => {
                if let Ok(v) = i64::try_from(*i) {
                    Value::from(v)
                } else if let Ok(v) = u64::try_from(*i) {
                    Value::from(v)
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    Value::from(*i as f64)
                }
            }
            Self::Float(f) => Value::from(f.0),
            Self::String(s) => Value::from(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

/// An ordered sequence of canonical values: the unit of uniqueness and
/// reference membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyTuple(Vec<CanonicalValue>);

impl KeyTuple {
    pub fn new(values: Vec<CanonicalValue>) -> Self {
        Self(values)
    }

    /// A 1-tuple holding the whole value.
    pub fn single(value: &Value) -> Self {
        Self(vec![CanonicalValue::from(value)])
    }

    /// Build a tuple from an inline-provider or cache row: an array maps
    /// element-wise, any other value becomes a 1-tuple.
    pub fn from_row(row: &Value) -> Self {
        match row {
            Value::Array(items) => Self(items.iter().map(CanonicalValue::from).collect()),
            other => Self::single(other),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The tuple as plain JSON values, for reports and cache rows.
    pub fn to_values(&self) -> Vec<Value> {
        self.0.iter().map(CanonicalValue::to_value).collect()
    }
}

impl core::fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&value.to_value().to_string())?;
        }
        f.write_str(")")
    }
}
