//! Typed extraction from flat JSON records.
//!
//! Producers deliver every value as a string, but numbers and nulls are
//! tolerated and read as their textual form.

use crate::RecordError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Date format used by the point-of-sale feed.
pub const SALE_DATE_FORMAT: &str = "%m/%d/%Y";

/// A decoded message value: field name to raw value.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    values: Map<String, Value>,
}

impl Fields {
    /// Decode a message payload into a field map.
    pub fn from_payload(payload: Option<&[u8]>) -> Result<Self, RecordError> {
        let payload = payload.ok_or(RecordError::EmptyPayload)?;
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| RecordError::NotAnObject(e.to_string()))?;

        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(RecordError::NotAnObject(format!(
                "expected object, found {}",
                type_name(&other)
            ))),
        }
    }

    /// Raw text of a field, empty when absent.
    pub fn text(&self, field: &str) -> String {
        match self.values.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// Non-empty text of a field.
    pub fn required_text(&self, field: &'static str) -> Result<String, RecordError> {
        let value = self.text(field);
        if value.trim().is_empty() {
            return Err(RecordError::Missing { field });
        }
        Ok(value)
    }

    /// Field parsed as an integer.
    pub fn integer(&self, field: &'static str) -> Result<i64, RecordError> {
        let value = self.required_text(field)?;
        parse_integer(&value).ok_or(RecordError::InvalidInteger { field, value })
    }

    /// Field parsed as a number and truncated toward zero (`"260.0"` is 260).
    pub fn truncated_integer(&self, field: &'static str) -> Result<i64, RecordError> {
        let value = self.required_text(field)?;
        parse_truncated_integer(&value).ok_or(RecordError::InvalidInteger { field, value })
    }

    /// Integer identifier that must be non-zero.
    pub fn identifier(&self, field: &'static str) -> Result<i64, RecordError> {
        non_zero(field, self.integer(field)?)
    }

    /// Truncated integer identifier that must be non-zero.
    pub fn truncated_identifier(&self, field: &'static str) -> Result<i64, RecordError> {
        non_zero(field, self.truncated_integer(field)?)
    }

    /// Field parsed as a plain decimal.
    pub fn decimal(&self, field: &'static str) -> Result<Decimal, RecordError> {
        let value = self.required_text(field)?;
        parse_decimal(&value).ok_or(RecordError::InvalidDecimal { field, value })
    }

    /// Field parsed as a currency amount, with or without a leading `$`.
    pub fn currency(&self, field: &'static str) -> Result<Decimal, RecordError> {
        let value = self.required_text(field)?;
        parse_currency(&value).ok_or(RecordError::InvalidDecimal { field, value })
    }

    /// Field parsed as a `MM/DD/YYYY` date.
    pub fn date(&self, field: &'static str) -> Result<NaiveDate, RecordError> {
        let value = self.required_text(field)?;
        parse_sale_date(&value).ok_or(RecordError::InvalidDate { field, value })
    }
}

fn non_zero(field: &'static str, value: i64) -> Result<i64, RecordError> {
    if value == 0 {
        return Err(RecordError::ZeroIdentifier { field });
    }
    Ok(value)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a base-10 integer, ignoring surrounding whitespace.
pub fn parse_integer(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// Parse an integer or a finite float, truncating toward zero.
pub fn parse_truncated_integer(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    let f: f64 = value.parse().ok()?;
    if !f.is_finite() || f.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(f.trunc() as i64)
}

/// Parse a decimal amount.
pub fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value.trim()).ok()
}

/// Parse a currency amount, stripping one leading `$`.
pub fn parse_currency(value: &str) -> Option<Decimal> {
    parse_decimal(strip_currency(value))
}

/// Remove a leading `$` (and surrounding whitespace) from an amount.
pub fn strip_currency(value: &str) -> &str {
    let value = value.trim();
    value.strip_prefix('$').unwrap_or(value).trim()
}

/// Parse a `MM/DD/YYYY` sale date.
pub fn parse_sale_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), SALE_DATE_FORMAT).ok()
}
