//! Stock value coercers for property definitions.
//!
//! Devices report the same logical value in several shapes depending on protocol and
//! firmware (`"on"`, `1`, `true`). A coercer maps every accepted shape onto one canonical
//! JSON representation so change detection compares like with like.

use relaynet_types::Value;
use serde_json::Number;

use crate::ValidationError;

/// Signature shared by all coercers
pub type Coercer = fn(Value) -> Result<Value, ValidationError>;

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `"on"`/`"open"` are true, `"off"`/`"close"` are false, anything else by truthiness
pub fn boolean(value: Value) -> Result<Value, ValidationError> {
    let b = match value.as_str() {
        Some("on") | Some("open") => true,
        Some("off") | Some("close") => false,
        _ => truthy(&value),
    };
    Ok(Value::Bool(b))
}

fn float(f: f64, original: &Value) -> Result<Value, ValidationError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ValidationError::new(original.clone(), "number"))
}

/// Numbers are normalised to floating point. Numeric strings are parsed, booleans become
/// 0 or 1 and null is kept as an absent reading.
pub fn number(value: Value) -> Result<Value, ValidationError> {
    match &value {
        Value::Null => Ok(Value::Null),
        Value::Number(n) => match n.as_f64() {
            Some(f) => float(f, &value),
            None => Err(ValidationError::new(value.clone(), "number")),
        },
        Value::Bool(b) => float(if *b { 1.0 } else { 0.0 }, &value),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return float(0.0, &value);
            }
            match trimmed.parse::<f64>() {
                Ok(f) => float(f, &value),
                Err(_) => Err(ValidationError::new(value.clone(), "number")),
            }
        }
        Value::Array(_) | Value::Object(_) => Err(ValidationError::new(value, "number")),
    }
}

/// Everything is accepted, non strings are rendered as text
pub fn string(value: Value) -> Result<Value, ValidationError> {
    Ok(match value {
        Value::String(s) => Value::String(s),
        Value::Null => Value::String("null".into()),
        other => Value::String(other.to_string()),
    })
}

/// Any value is stored as received
pub fn identity(value: Value) -> Result<Value, ValidationError> {
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn booleans() {
        assert_eq!(boolean(json!("on")), Ok(json!(true)));
        assert_eq!(boolean(json!("open")), Ok(json!(true)));
        assert_eq!(boolean(json!("off")), Ok(json!(false)));
        assert_eq!(boolean(json!("close")), Ok(json!(false)));
        assert_eq!(boolean(json!(1)), Ok(json!(true)));
        assert_eq!(boolean(json!(0)), Ok(json!(false)));
        assert_eq!(boolean(json!("")), Ok(json!(false)));
        assert_eq!(boolean(Value::Null), Ok(json!(false)));
        assert_eq!(boolean(json!({})), Ok(json!(true)));
    }

    #[test]
    fn numbers() {
        assert_eq!(number(json!(1)), Ok(json!(1.0)));
        assert_eq!(number(json!("12.3")), Ok(json!(12.3)));
        assert_eq!(number(json!(" 4 ")), Ok(json!(4.0)));
        assert_eq!(number(json!(true)), Ok(json!(1.0)));
        assert_eq!(number(json!("")), Ok(json!(0.0)));
        assert_eq!(number(Value::Null), Ok(Value::Null));
        assert!(number(json!("abc")).is_err());
        assert!(number(json!([1])).is_err());
    }

    #[test]
    fn number_normalisation_makes_integers_and_floats_equal() {
        assert_eq!(number(json!(5)), number(json!(5.0)));
    }

    #[test]
    fn identity_keeps_structure() {
        let settings = json!({"mode": "roller", "rollers": [{"swap": true}]});
        assert_eq!(identity(settings.clone()), Ok(settings));
        assert_eq!(identity(Value::Null), Ok(Value::Null));
    }

    #[test]
    fn strings() {
        assert_eq!(string(json!("relay")), Ok(json!("relay")));
        assert_eq!(string(json!(12.5)), Ok(json!("12.5")));
        assert_eq!(string(json!(false)), Ok(json!("false")));
    }
}
