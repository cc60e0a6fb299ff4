//! Core domain types for call-flow tracing.
//!
//! These types describe *what* was called and *how it ended*, never the
//! payload values themselves: a `Shape` records field names and type names
//! only.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Session ───────────────────────────────────────────────────────

/// One traced request or execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ── Branch ────────────────────────────────────────────────────────

/// Outcome classification of a call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Success,
    Error,
    Partial,
}

impl Branch {
    pub const ALL: [Branch; 3] = [Branch::Success, Branch::Error, Branch::Partial];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Shape ─────────────────────────────────────────────────────────

/// Field names of a function's input or output mapped to their type names.
///
/// Ordered, so two shapes with the same fields always render the same
/// signature regardless of insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Shape(pub BTreeMap<String, String>);

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a shape from `(field, type)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Derive a shape from a JSON value, keeping only type names.
    ///
    /// Objects yield one field per key. Any other value is recorded under
    /// the single field `"$"`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self(
                map.iter()
                    .map(|(k, v)| (k.clone(), json_type_name(v).to_string()))
                    .collect(),
            ),
            other => Self::from_pairs([("$", json_type_name(other))]),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.0.insert(name.into(), type_name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Names are written as JSON strings, so separators inside a name cannot
/// make two different shapes render alike.
impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, (field, ty)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(
                f,
                "{}:{}",
                serde_json::Value::from(field.as_str()),
                serde_json::Value::from(ty.as_str())
            )?;
        }
        f.write_str(")")
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(n) if n.is_f64() => "float",
        serde_json::Value::Number(_) => "int",
        serde_json::Value::String(_) => "str",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}

/// Canonical text form of a function's input and output shapes,
/// e.g. `("a":"int","b":"str")->("ok":"bool")`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ShapeSignature(pub String);

impl ShapeSignature {
    pub fn of(input: &Shape, output: &Shape) -> Self {
        Self(format!("{input}->{output}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShapeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
