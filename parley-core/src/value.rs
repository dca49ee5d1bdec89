//! # Protocol Value Model
//!
//! The dynamic value surface exchanged with an XML-RPC endpoint. The wire
//! grammar itself (how these values are spelled as XML) is owned by the
//! [`crate::serializer::Serializer`] collaborator; this module only defines
//! the values a caller can pass as arguments and receive as results, plus the
//! [`ValueKind`] tags used for overload resolution.
//!
//! The protocol's value model has no null primitive. [`Value::Nil`] exists so
//! that optional data can be represented in memory, but the resolver rejects
//! it as a call argument before any work is done.

use std::collections::BTreeMap;

/// A dynamically typed XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A 32-bit signed integer (`<i4>`/`<int>`).
    Int(i32),
    /// A boolean (`<boolean>`).
    Bool(bool),
    /// A string (`<string>` or untagged).
    String(String),
    /// A double-precision float (`<double>`).
    Double(f64),
    /// A date/time rendered in ISO 8601 (`<dateTime.iso8601>`).
    DateTime(String),
    /// Binary data (`<base64>`).
    Base64(Vec<u8>),
    /// A named-member structure (`<struct>`).
    Struct(BTreeMap<String, Value>),
    /// An ordered sequence of values (`<array>`).
    Array(Vec<Value>),
    /// The absent value. Not a legal call argument.
    Nil,
}

impl Value {
    /// Returns the kind tag of this value, used for overload matching.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Bool(_) => ValueKind::Bool,
            Value::String(_) => ValueKind::String,
            Value::Double(_) => ValueKind::Double,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Base64(_) => ValueKind::Base64,
            Value::Struct(_) => ValueKind::Struct,
            Value::Array(_) => ValueKind::Array,
            Value::Nil => ValueKind::Nil,
        }
    }

    /// Returns the inner string if this value is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the inner slice if this value is an `Array`.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

/// The kind tag of a [`Value`], without its payload.
///
/// Method descriptors record parameter and return kinds so that calls can be
/// matched against overloads by the runtime kinds of the supplied arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Bool,
    String,
    Double,
    DateTime,
    Base64,
    Struct,
    Array,
    Nil,
}

/// An application-level error carried inside an otherwise well-formed
/// response.
///
/// Distinct from a transport status error: the exchange itself succeeded and
/// the server answered with a structured fault instead of a return value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("server returned fault {code}: '{message}'")]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Value::Int(7).kind(), ValueKind::Int);
        assert_eq!(Value::from("hi").kind(), ValueKind::String);
        assert_eq!(Value::Array(vec![]).kind(), ValueKind::Array);
        assert_eq!(Value::Nil.kind(), ValueKind::Nil);
    }

    #[test]
    fn fault_renders_code_and_message() {
        let fault = Fault {
            code: 4,
            message: "Too many parameters.".to_string(),
        };
        assert_eq!(
            fault.to_string(),
            "server returned fault 4: 'Too many parameters.'"
        );
    }
}
