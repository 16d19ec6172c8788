// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed accessors for JSON property values.

use super::HandlerError;
use serde_json::Value;

fn invalid(property: &str, expected: &'static str, value: &Value) -> HandlerError {
    HandlerError::InvalidValue {
        property: property.to_string(),
        expected,
        found: value.to_string(),
    }
}

pub fn expect_bool(property: &str, value: &Value) -> Result<bool, HandlerError> {
    value.as_bool().ok_or_else(|| invalid(property, "boolean", value))
}

pub fn expect_i64(property: &str, value: &Value) -> Result<i64, HandlerError> {
    value.as_i64().ok_or_else(|| invalid(property, "integer", value))
}

pub fn expect_str<'a>(property: &str, value: &'a Value) -> Result<&'a str, HandlerError> {
    value.as_str().ok_or_else(|| invalid(property, "string", value))
}

/// String or `null`.
pub fn optional_str<'a>(property: &str, value: &'a Value) -> Result<Option<&'a str>, HandlerError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(invalid(property, "string or null", other)),
    }
}

/// Fixed-length integer array, e.g. `bounds` as `[x, y, width, height]`.
pub fn expect_i64_array<const N: usize>(property: &str, value: &Value) -> Result<[i64; N], HandlerError> {
    let items = value
        .as_array()
        .filter(|items| items.len() == N)
        .ok_or_else(|| invalid(property, "integer array", value))?;
    let mut out = [0i64; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .as_i64()
            .ok_or_else(|| invalid(property, "integer array", value))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_accessors() {
        assert!(expect_bool("visible", &json!(true)).unwrap());
        assert_eq!(expect_i64("selection", &json!(42)).unwrap(), 42);
        assert_eq!(expect_str("text", &json!("hi")).unwrap(), "hi");
        assert!(matches!(
            expect_i64("selection", &json!("42")),
            Err(HandlerError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_optional_str() {
        assert_eq!(optional_str("toolTip", &json!(null)).unwrap(), None);
        assert_eq!(optional_str("toolTip", &json!("tip")).unwrap(), Some("tip"));
        assert!(optional_str("toolTip", &json!(3)).is_err());
    }

    #[test]
    fn test_integer_array() {
        assert_eq!(
            expect_i64_array::<4>("bounds", &json!([1, 2, 30, 40])).unwrap(),
            [1, 2, 30, 40]
        );
        assert!(expect_i64_array::<4>("bounds", &json!([1, 2, 3])).is_err());
        assert!(expect_i64_array::<4>("bounds", &json!([1, 2, "3", 4])).is_err());
    }
}
