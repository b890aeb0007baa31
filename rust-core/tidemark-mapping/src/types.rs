// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Field types, dynamic modes and runtime value kinds.
//
// A field type is a closed set of variants, each with its own value
// compatibility check, so resolution never inspects values ad hoc.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::date::parse_date;
use crate::error::MappingError;

/// Width and representation of a numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Integer,
    Long,
    Float,
    Double,
}

/// The declared or deduced type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    /// Analyzed full text.
    Text,
    /// Exact-match string.
    Keyword,
    Numeric(NumericKind),
    Boolean,
    Date,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Numeric(NumericKind::Integer) => "integer",
            FieldType::Numeric(NumericKind::Long) => "long",
            FieldType::Numeric(NumericKind::Float) => "float",
            FieldType::Numeric(NumericKind::Double) => "double",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        }
    }

    /// Check that `value` can be stored in a field of this type.
    ///
    /// Scalars only; callers flatten objects and arrays first. `format` is
    /// the chrono layout of a `date` field. Returns the rejection reason.
    pub fn check(&self, value: &Value, format: Option<&str>) -> Result<(), String> {
        let ok = match self {
            FieldType::Text | FieldType::Keyword => {
                matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
            }
            FieldType::Numeric(kind) => check_numeric(*kind, value),
            FieldType::Boolean => match value {
                Value::Bool(_) => true,
                Value::String(s) => s == "true" || s == "false",
                _ => false,
            },
            FieldType::Date => parse_date(value, format).is_some(),
        };

        if ok {
            Ok(())
        } else {
            Err(format!("expected {}, got {}", self, describe(value)))
        }
    }
}

fn check_numeric(kind: NumericKind, value: &Value) -> bool {
    let integral = |value: &Value| match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    let float = |value: &Value| match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match kind {
        NumericKind::Integer => integral(value).is_some_and(|v| i32::try_from(v).is_ok()),
        NumericKind::Long => integral(value).is_some(),
        NumericKind::Float => {
            float(value).is_some_and(|v| v.is_finite() && v.abs() <= f64::from(f32::MAX))
        }
        NumericKind::Double => float(value).is_some_and(f64::is_finite),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => FieldType::Text,
            "keyword" => FieldType::Keyword,
            "integer" => FieldType::Numeric(NumericKind::Integer),
            "long" => FieldType::Numeric(NumericKind::Long),
            "float" => FieldType::Numeric(NumericKind::Float),
            "double" | "numeric" => FieldType::Numeric(NumericKind::Double),
            "bool" | "boolean" => FieldType::Boolean,
            "date" | "time" => FieldType::Date,
            other => return Err(MappingError::Unsupported(format!("field type '{other}'"))),
        })
    }
}

impl TryFrom<String> for FieldType {
    type Error = MappingError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// DynamicMode
// ---------------------------------------------------------------------------

/// How fields without an explicit type are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "DynamicValue", into = "String")]
pub enum DynamicMode {
    /// Deduce a type and promote the field into the mappings.
    #[default]
    Dynamic,
    /// Keep the value in `_source` without typing it.
    Ignore,
    /// Reject the document.
    Strict,
}

impl DynamicMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DynamicMode::Dynamic => "true",
            DynamicMode::Ignore => "false",
            DynamicMode::Strict => "strict",
        }
    }
}

impl FromStr for DynamicMode {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "true" | "dynamic" => Ok(DynamicMode::Dynamic),
            "false" | "ignore" => Ok(DynamicMode::Ignore),
            "strict" => Ok(DynamicMode::Strict),
            other => Err(MappingError::Unsupported(format!("dynamic mode '{other}'"))),
        }
    }
}

/// `dynamic` is written either as a JSON boolean or as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum DynamicValue {
    Flag(bool),
    Name(String),
}

impl TryFrom<DynamicValue> for DynamicMode {
    type Error = MappingError;

    fn try_from(v: DynamicValue) -> Result<Self, Self::Error> {
        match v {
            DynamicValue::Flag(true) => Ok(DynamicMode::Dynamic),
            DynamicValue::Flag(false) => Ok(DynamicMode::Ignore),
            DynamicValue::Name(s) => s.parse(),
        }
    }
}

impl From<DynamicMode> for String {
    fn from(m: DynamicMode) -> Self {
        m.as_str().to_string()
    }
}

impl fmt::Display for DynamicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ValueKind
// ---------------------------------------------------------------------------

/// Runtime kind of a scalar JSON value, as seen by dynamic templates and
/// type deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    /// A string that parses as a date with the default layouts.
    Date,
    Long,
    Double,
    Boolean,
}

impl ValueKind {
    /// Kind of a scalar value; `None` for null, arrays and objects.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if crate::date::parse_date_str(s, None).is_some() => {
                Some(ValueKind::Date)
            }
            Value::String(_) => Some(ValueKind::String),
            Value::Bool(_) => Some(ValueKind::Boolean),
            Value::Number(n) if n.is_i64() => Some(ValueKind::Long),
            Value::Number(_) => Some(ValueKind::Double),
            _ => None,
        }
    }

    /// Type given to a new field of this kind when no template applies.
    pub fn deduced_type(&self) -> FieldType {
        match self {
            ValueKind::String => FieldType::Text,
            ValueKind::Date => FieldType::Date,
            ValueKind::Long => FieldType::Numeric(NumericKind::Long),
            ValueKind::Double => FieldType::Numeric(NumericKind::Double),
            ValueKind::Boolean => FieldType::Boolean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_names_and_aliases() {
        assert_eq!("numeric".parse::<FieldType>().unwrap(), FieldType::Numeric(NumericKind::Double));
        assert_eq!("bool".parse::<FieldType>().unwrap(), FieldType::Boolean);
        assert_eq!("time".parse::<FieldType>().unwrap(), FieldType::Date);
        assert!(matches!(
            "geo_point".parse::<FieldType>(),
            Err(MappingError::Unsupported(_))
        ));
    }

    #[test]
    fn test_serde_uses_type_names() {
        let t: FieldType = serde_json::from_value(json!("integer")).unwrap();
        assert_eq!(t, FieldType::Numeric(NumericKind::Integer));
        assert_eq!(serde_json::to_value(t).unwrap(), json!("integer"));
        assert!(serde_json::from_value::<FieldType>(json!("blob")).is_err());
    }

    #[test]
    fn test_dynamic_mode_spellings() {
        for (raw, mode) in [
            (json!(true), DynamicMode::Dynamic),
            (json!("dynamic"), DynamicMode::Dynamic),
            (json!(""), DynamicMode::Dynamic),
            (json!(false), DynamicMode::Ignore),
            (json!("ignore"), DynamicMode::Ignore),
            (json!("strict"), DynamicMode::Strict),
        ] {
            assert_eq!(serde_json::from_value::<DynamicMode>(raw).unwrap(), mode);
        }
        assert!(matches!(
            "runtime".parse::<DynamicMode>(),
            Err(MappingError::Unsupported(_))
        ));
        assert_eq!(serde_json::to_value(DynamicMode::Dynamic).unwrap(), json!("true"));
    }

    #[test]
    fn test_numeric_validation() {
        let integer = FieldType::Numeric(NumericKind::Integer);
        assert!(integer.check(&json!(42), None).is_ok());
        assert!(integer.check(&json!("42"), None).is_ok());
        assert!(integer.check(&json!(3_000_000_000i64), None).is_err());
        assert!(integer.check(&json!(1.5), None).is_err());

        let err = integer.check(&json!("not a number"), None).unwrap_err();
        assert_eq!(err, "expected integer, got string \"not a number\"");

        let double = FieldType::Numeric(NumericKind::Double);
        assert!(double.check(&json!(3.14), None).is_ok());
        assert!(double.check(&json!(7), None).is_ok());
        assert!(double.check(&json!(true), None).is_err());
    }

    #[test]
    fn test_scalar_validation() {
        assert!(FieldType::Keyword.check(&json!(200), None).is_ok());
        assert!(FieldType::Text.check(&json!({"a": 1}), None).is_err());
        assert!(FieldType::Boolean.check(&json!("false"), None).is_ok());
        assert!(FieldType::Boolean.check(&json!("yes"), None).is_err());
        assert!(FieldType::Date.check(&json!("2024-01-02"), None).is_ok());
        assert!(FieldType::Date.check(&json!(1_700_000_000_000i64), None).is_ok());
        assert!(FieldType::Date.check(&json!("02/01/2024"), Some("%d/%m/%Y")).is_ok());
        assert!(FieldType::Date.check(&json!("yesterday"), None).is_err());
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(ValueKind::of(&json!("OK")), Some(ValueKind::String));
        assert_eq!(ValueKind::of(&json!("2024-05-01T00:00:00Z")), Some(ValueKind::Date));
        assert_eq!(ValueKind::of(&json!(3)), Some(ValueKind::Long));
        assert_eq!(ValueKind::of(&json!(3.14)), Some(ValueKind::Double));
        assert_eq!(ValueKind::of(&json!(u64::MAX)), Some(ValueKind::Double));
        assert_eq!(ValueKind::of(&json!(false)), Some(ValueKind::Boolean));
        assert_eq!(ValueKind::of(&json!(null)), None);
        assert_eq!(ValueKind::Double.deduced_type(), FieldType::Numeric(NumericKind::Double));
    }
}
