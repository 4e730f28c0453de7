//! Typed field values for the issue schema.
//!
//! Every issue field has a [`FieldKind`] describing how its value is parsed
//! from user input and validated when it arrives as JSON. The canonical
//! serialized form of any field is a `serde_json::Value`:
//!
//! - `Str`    -> string
//! - `Int`    -> integer
//! - `Number` -> string carrying the exact decimal literal
//! - `Time`   -> RFC3339 string with the original UTC offset preserved
//! - `StrSet` -> sorted array of unique strings

use crate::error::{JiloError, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Type tag for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free-form string. Empty strings normalize to "unset".
    Str,
    /// Signed integer (the server-assigned numeric record id).
    Int,
    /// Decimal number kept as an exact literal (story points).
    Number,
    /// Timezone-aware timestamp, RFC3339.
    Time,
    /// Unordered set of strings (labels, components, fix versions).
    StrSet,
}

impl FieldKind {
    /// Validate and canonicalize a JSON value for this kind.
    ///
    /// Accepts the representations the remote API and the cache produce:
    /// numbers may arrive as JSON numbers or strings, sets as arrays.
    ///
    /// # Errors
    ///
    /// Returns [`JiloError::Deserialize`] when the value does not fit.
    pub fn parse_json(self, field: &str, value: &Value) -> Result<Value> {
        match self {
            Self::Str => match value {
                Value::String(s) => Ok(Value::String(s.clone())),
                other => Err(JiloError::deserialize(
                    field,
                    format!("expected string, got {other}"),
                )),
            },
            Self::Int => match value {
                Value::Number(n) if n.is_i64() => Ok(value.clone()),
                Value::String(s) => {
                    let n: i64 = s
                        .parse()
                        .map_err(|_| JiloError::deserialize(field, format!("bad integer '{s}'")))?;
                    Ok(Value::from(n))
                }
                other => Err(JiloError::deserialize(
                    field,
                    format!("expected integer, got {other}"),
                )),
            },
            Self::Number => {
                let literal = match value {
                    Value::Number(n) => n.to_string(),
                    Value::String(s) => s.clone(),
                    other => {
                        return Err(JiloError::deserialize(
                            field,
                            format!("expected number, got {other}"),
                        ));
                    }
                };
                let num = Numeric::from_str(&literal)
                    .map_err(|_| JiloError::deserialize(field, format!("bad number '{literal}'")))?;
                Ok(Value::String(num.to_string()))
            }
            Self::Time => match value {
                Value::String(s) => {
                    let ts = parse_timestamp(field, s)?;
                    Ok(Value::String(ts.to_rfc3339()))
                }
                other => Err(JiloError::deserialize(
                    field,
                    format!("expected timestamp, got {other}"),
                )),
            },
            Self::StrSet => match value {
                Value::Array(items) => {
                    let mut set = BTreeSet::new();
                    for item in items {
                        match item {
                            Value::String(s) if !s.is_empty() => {
                                set.insert(s.clone());
                            }
                            Value::String(_) => {}
                            other => {
                                return Err(JiloError::deserialize(
                                    field,
                                    format!("expected string in set, got {other}"),
                                ));
                            }
                        }
                    }
                    Ok(set_to_value(&set))
                }
                Value::String(s) => Ok(set_to_value(&split_set_literal(s))),
                other => Err(JiloError::deserialize(
                    field,
                    format!("expected array, got {other}"),
                )),
            },
        }
    }

    /// Parse a raw string (CLI flag or editor line) into the canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`JiloError::Deserialize`] when the text does not parse.
    pub fn parse_str(self, field: &str, raw: &str) -> Result<Value> {
        match self {
            Self::StrSet => Ok(set_to_value(&split_set_literal(raw))),
            _ => self.parse_json(field, &Value::String(raw.trim().to_string())),
        }
    }
}

/// Parse an RFC3339 timestamp, preserving its UTC offset.
///
/// # Errors
///
/// Returns [`JiloError::Deserialize`] when the string is not RFC3339.
pub fn parse_timestamp(field: &str, s: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| JiloError::deserialize(field, format!("bad timestamp '{s}': {e}")))
}

/// Split a comma-separated set literal into a set, dropping empties.
#[must_use]
pub fn split_set_literal(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Canonical JSON form of a string set: a sorted array.
#[must_use]
pub fn set_to_value(set: &BTreeSet<String>) -> Value {
    Value::Array(set.iter().cloned().map(Value::String).collect())
}

/// Read a canonical JSON set value back into a `BTreeSet`.
#[must_use]
pub fn value_to_set(value: &Value) -> BTreeSet<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Value::String(s) => split_set_literal(s),
        _ => BTreeSet::new(),
    }
}

/// An exact decimal literal.
///
/// Story points must round-trip without floating point drift, and no two
/// sides of a merge may disagree just because `1.50` was re-rendered as
/// `1.5`. The literal is validated on construction and normalized only by
/// trimming whitespace and a leading `+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Numeric(String);

impl Numeric {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Numeric {
    type Err = JiloError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().strip_prefix('+').unwrap_or_else(|| s.trim());
        let digits = s.strip_prefix('-').unwrap_or(s);

        let mut seen_dot = false;
        let mut seen_digit = false;
        for c in digits.chars() {
            match c {
                '0'..='9' => seen_digit = true,
                '.' if !seen_dot && seen_digit => seen_dot = true,
                _ => {
                    return Err(JiloError::deserialize(
                        "number",
                        format!("bad numeric literal '{s}'"),
                    ));
                }
            }
        }
        if !seen_digit || digits.ends_with('.') {
            return Err(JiloError::deserialize(
                "number",
                format!("bad numeric literal '{s}'"),
            ));
        }
        Ok(Self(s.to_string()))
    }
}
