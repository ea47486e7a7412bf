// Field mappers between vendor JSON and the canonical model
// Mappers are total: a missing or ill-typed field becomes None or a default,
// never an error.

pub mod billy;
pub mod dinero;
pub mod economic;
pub mod visma;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Follows a `/`-free key path through nested objects.
pub(crate) fn field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Non-empty string at `path`. Numbers are rendered as strings.
pub(crate) fn str_field(value: &Value, path: &[&str]) -> Option<String> {
    match field(value, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Vendor ids arrive as strings or as integers.
pub(crate) fn id_field(value: &Value, path: &[&str]) -> Option<String> {
    str_field(value, path)
}

pub(crate) fn decimal_field(value: &Value, path: &[&str]) -> Option<Decimal> {
    match field(value, path)? {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub(crate) fn bool_field(value: &Value, path: &[&str]) -> Option<bool> {
    match field(value, path)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD`, full timestamps, and Visma's `{ "value": ... }` wrapper.
pub(crate) fn date_field(value: &Value, path: &[&str]) -> Option<NaiveDate> {
    let raw = match field(value, path)? {
        Value::Object(map) => map.get("value")?.as_str()?,
        Value::String(s) => s.as_str(),
        _ => return None,
    };
    let date_part = raw.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub(crate) fn decimal_to_json(amount: Decimal) -> Value {
    amount
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

pub(crate) fn date_to_json(date: Option<NaiveDate>) -> Value {
    date.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(Value::Null)
}

pub(crate) fn opt_str_to_json(value: Option<&str>) -> Value {
    value
        .map(|s| Value::String(s.to_string()))
        .unwrap_or(Value::Null)
}

/// Array at `path`, or an empty slice.
pub(crate) fn array_field<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    field(value, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Drops `null` members so optional fields are omitted from vendor payloads.
pub(crate) fn without_nulls(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.retain(|_, v| !v.is_null());
    }
    value
}
