//! Polymorphic field model used while decoding source documents.
//!
//! Source formats routinely accept several shapes for one field: a CircleCI
//! `run` step may be a bare command string or a map, `restore_cache` takes a
//! `key` string or a `keys` list, matrix options may be numbers or strings.
//! [`FlexibleValue`] commits to exactly one shape at decode time so that
//! converters branch on an enum instead of probing raw maps.

use crate::core::convert::expression::ExpressionSyntax;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::fmt;
use thiserror::Error;

/// Scalar payload committed by a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    /// Text form used when a scalar is spliced into a string field.
    pub fn render(&self) -> String {
        match self {
            Scalar::String(text) => text.clone(),
            Scalar::Int(value) => value.to_string(),
            Scalar::UInt(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
            Scalar::Bool(value) => value.to_string(),
        }
    }

    fn encode(&self) -> Value {
        match self {
            Scalar::String(text) => Value::String(text.clone()),
            Scalar::Int(value) => Value::Number(Number::from(*value)),
            Scalar::UInt(value) => Value::Number(Number::from(*value)),
            Scalar::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Bool(value) => Value::Bool(*value),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Expected shape passed by the caller.
///
/// `String` forces every scalar to commit as a string literal, so a bare
/// `42` in a field that the target schema types as text stays `"42"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeHint {
    #[default]
    Any,
    String,
}

/// Raised when a raw value matches none of the attempted shapes.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unsupported shape: found {found}{}", .detail.as_ref().map(|d| format!(" ({})", d)).unwrap_or_default())]
pub struct UnsupportedShape {
    pub found: &'static str,
    pub detail: Option<String>,
}

impl UnsupportedShape {
    fn new(found: &'static str) -> Self {
        Self {
            found,
            detail: None,
        }
    }

    fn with_detail(found: &'static str, detail: impl Into<String>) -> Self {
        Self {
            found,
            detail: Some(detail.into()),
        }
    }
}

/// A decoded field whose shape was not known until decode time.
///
/// `T` is the structured form accepted for map-shaped values and must
/// serialize back to a map for [`FlexibleValue::encode`] to be the inverse
/// of [`FlexibleValue::decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum FlexibleValue<T> {
    Literal(Scalar),
    Sequence(Vec<FlexibleValue<T>>),
    Structured(T),
}

impl<T: DeserializeOwned> FlexibleValue<T> {
    /// Decode a raw value, trying string, int, float, bool and then the
    /// structured form, in that order.
    pub fn decode(raw: &Value, hint: ShapeHint) -> Result<Self, UnsupportedShape> {
        match raw {
            Value::String(text) => Ok(FlexibleValue::Literal(Scalar::String(text.clone()))),
            Value::Number(number) if hint == ShapeHint::String => {
                Ok(FlexibleValue::Literal(Scalar::String(number.to_string())))
            }
            Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Ok(FlexibleValue::Literal(Scalar::Int(value)))
                } else if let Some(value) = number.as_u64() {
                    Ok(FlexibleValue::Literal(Scalar::UInt(value)))
                } else if let Some(value) = number.as_f64() {
                    Ok(FlexibleValue::Literal(Scalar::Float(value)))
                } else {
                    Err(UnsupportedShape::with_detail("number", number.to_string()))
                }
            }
            Value::Bool(flag) if hint == ShapeHint::String => {
                Ok(FlexibleValue::Literal(Scalar::String(flag.to_string())))
            }
            Value::Bool(flag) => Ok(FlexibleValue::Literal(Scalar::Bool(*flag))),
            Value::Array(items) => items
                .iter()
                .map(|item| FlexibleValue::decode(item, hint))
                .collect::<Result<Vec<_>, _>>()
                .map(FlexibleValue::Sequence),
            Value::Object(_) => serde_json::from_value::<T>(raw.clone())
                .map(FlexibleValue::Structured)
                .map_err(|err| UnsupportedShape::with_detail("object", err.to_string())),
            Value::Null => Err(UnsupportedShape::new("null")),
        }
    }
}

impl<T: Serialize> FlexibleValue<T> {
    /// Inverse of [`FlexibleValue::decode`] for values it produced.
    pub fn encode(&self) -> Value {
        match self {
            FlexibleValue::Literal(scalar) => scalar.encode(),
            FlexibleValue::Sequence(items) => {
                Value::Array(items.iter().map(FlexibleValue::encode).collect())
            }
            FlexibleValue::Structured(inner) => {
                serde_json::to_value(inner).unwrap_or(Value::Null)
            }
        }
    }
}

impl<T> FlexibleValue<T> {
    pub fn as_struct(&self) -> Option<&T> {
        match self {
            FlexibleValue::Structured(inner) => Some(inner),
            _ => None,
        }
    }

    /// Borrow the committed string literal, without coercing other scalars.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlexibleValue::Literal(Scalar::String(text)) => Some(text),
            _ => None,
        }
    }

    /// Render any scalar literal as text.
    pub fn as_string(&self) -> Option<String> {
        match self {
            FlexibleValue::Literal(scalar) => Some(scalar.render()),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[FlexibleValue<T>]> {
        match self {
            FlexibleValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlexibleValue::Literal(Scalar::Bool(flag)) => Some(*flag),
            FlexibleValue::Literal(Scalar::String(text)) => match text.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FlexibleValue::Literal(Scalar::Int(value)) => Some(*value),
            FlexibleValue::Literal(Scalar::String(text)) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Collapse "one string or a list of strings" fields into a list.
    pub fn string_list(&self) -> Option<Vec<String>> {
        match self {
            FlexibleValue::Literal(scalar) => Some(vec![scalar.render()]),
            FlexibleValue::Sequence(items) => items.iter().map(FlexibleValue::as_string).collect(),
            FlexibleValue::Structured(_) => None,
        }
    }

    /// True when the committed string literal embeds at least one template
    /// token in the given syntax. Non-string variants are never expressions.
    pub fn is_expression(&self, syntax: &ExpressionSyntax) -> bool {
        match self {
            FlexibleValue::Literal(Scalar::String(text)) => syntax.contains_token(text),
            _ => false,
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for FlexibleValue<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        FlexibleValue::decode(&raw, ShapeHint::Any).map_err(serde::de::Error::custom)
    }
}

impl<T: Serialize> Serialize for FlexibleValue<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.encode().serialize(serializer)
    }
}

/// Render a raw scalar as text; maps, lists and null have no text form.
pub fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Schema-free `with` / `settings` payload carried through conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(IndexMap<String, Value>);

impl Settings {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Build from a raw object; any other shape yields an empty map.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
            _ => Self::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Scalar at `key` rendered as text.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(render_scalar)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Decode the value at `key`. Absent keys and explicit nulls are `Ok(None)`.
    pub fn get_flexible<T: DeserializeOwned>(
        &self,
        key: &str,
        hint: ShapeHint,
    ) -> Result<Option<FlexibleValue<T>>, UnsupportedShape> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => FlexibleValue::decode(raw, hint).map(Some),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.0.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Settings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
