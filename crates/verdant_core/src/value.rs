use sea_orm::sea_query::Value as SeaValue;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{VerdantError, VerdantResult};

/// A scalar bound into a SQL statement. Filter arguments, option values and
/// descriptor defaults all normalize to this before they reach the query
/// builder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn from_json(value: &JsonValue) -> VerdantResult<Self> {
        match value {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Real(f))
                } else {
                    Err(VerdantError::invalid(format!("unrepresentable number: {n}")))
                }
            }
            JsonValue::String(s) => Ok(Value::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => {
                Err(VerdantError::invalid("expected a scalar value"))
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Real(f) => JsonValue::from(*f),
            Value::Text(s) => JsonValue::String(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<Value> for SeaValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SeaValue::String(None),
            Value::Bool(b) => SeaValue::Bool(Some(b)),
            Value::Int(i) => SeaValue::BigInt(Some(i)),
            Value::Real(f) => SeaValue::Double(Some(f)),
            Value::Text(s) => SeaValue::String(Some(Box::new(s))),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
