//! Value transforms applied between an extracted value and its module field.

use serde_json::{json, Value};
use thiserror::Error;

use super::normalize::patterns::{number_value, parse_currency, parse_date, parse_number};
use crate::registry::TransformKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("cannot read {value} as a date")]
    InvalidDate { value: String },

    #[error("cannot read {value} as a currency amount")]
    InvalidCurrency { value: String },

    #[error("cannot read {value} as a percentage")]
    InvalidPercentage { value: String },

    #[error("percentage {value} outside [0, 100]")]
    PercentageOutOfRange { value: f64 },

    #[error("cannot read {value} as a boolean")]
    InvalidBoolean { value: String },

    #[error("cannot read {value} as an address")]
    InvalidAddress { value: String },
}

pub fn apply(kind: TransformKind, value: &Value) -> Result<Value, TransformError> {
    match kind {
        TransformKind::Date => to_date(value),
        TransformKind::Currency => to_currency(value),
        TransformKind::Percentage => to_percentage(value),
        TransformKind::Boolean => to_boolean(value),
        TransformKind::Address => to_address(value),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_date(value: &Value) -> Result<Value, TransformError> {
    value
        .as_str()
        .and_then(parse_date)
        .map(Value::String)
        .ok_or_else(|| TransformError::InvalidDate { value: display(value) })
}

fn to_currency(value: &Value) -> Result<Value, TransformError> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_currency(s),
        _ => None,
    };
    amount
        .map(number_value)
        .ok_or_else(|| TransformError::InvalidCurrency { value: display(value) })
}

/// Decimal fraction in [0, 1]. Raw values above 1 are read as whole percents.
fn to_percentage(value: &Value) -> Result<Value, TransformError> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s.trim().trim_end_matches('%')),
        _ => None,
    }
    .ok_or_else(|| TransformError::InvalidPercentage { value: display(value) })?;

    let fraction = if raw > 1.0 { raw / 100.0 } else { raw };
    if !(0.0..=1.0).contains(&fraction) {
        return Err(TransformError::PercentageOutOfRange { value: raw });
    }
    Ok(number_value(fraction))
}

const TRUE_TOKENS: &[&str] = &["true", "yes", "y", "1", "x", "checked", "on"];
const FALSE_TOKENS: &[&str] = &["false", "no", "n", "0", "unchecked", "off", ""];

fn to_boolean(value: &Value) -> Result<Value, TransformError> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) if n.as_f64() == Some(1.0) => Ok(Value::Bool(true)),
        Value::Number(n) if n.as_f64() == Some(0.0) => Ok(Value::Bool(false)),
        Value::String(s) => {
            let token = s.trim().to_lowercase();
            if TRUE_TOKENS.contains(&token.as_str()) {
                Ok(Value::Bool(true))
            } else if FALSE_TOKENS.contains(&token.as_str()) {
                Ok(Value::Bool(false))
            } else {
                Err(TransformError::InvalidBoolean { value: s.clone() })
            }
        }
        other => Err(TransformError::InvalidBoolean { value: display(other) }),
    }
}

/// `"12 Field Rd, Ames, IA 50010"` → `{street, city, state, zip}`.
/// Objects pass through with only the four keys kept.
fn to_address(value: &Value) -> Result<Value, TransformError> {
    match value {
        Value::Object(map) => {
            let pick = |k: &str| map.get(k).cloned().unwrap_or(Value::Null);
            Ok(json!({
                "street": pick("street"),
                "city": pick("city"),
                "state": pick("state"),
                "zip": pick("zip"),
            }))
        }
        Value::String(s) => {
            let parts: Vec<&str> = s.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
            if parts.len() < 2 {
                return Err(TransformError::InvalidAddress { value: s.clone() });
            }
            let street = parts[0];
            let city = parts[1];
            let (state, zip) = match parts.get(2) {
                Some(tail) => split_state_zip(tail),
                None => (None, None),
            };
            Ok(json!({
                "street": street,
                "city": city,
                "state": state,
                "zip": zip,
            }))
        }
        other => Err(TransformError::InvalidAddress { value: display(other) }),
    }
}

fn split_state_zip(tail: &str) -> (Option<String>, Option<String>) {
    let mut state = None;
    let mut zip = None;
    for token in tail.split_whitespace() {
        if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            zip = Some(token.to_string());
        } else {
            state = Some(match state {
                Some(s) => format!("{s} {token}"),
                None => token.to_string(),
            });
        }
    }
    (state, zip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_to_iso() {
        assert_eq!(apply(TransformKind::Date, &json!("03/15/1980")).unwrap(), json!("1980-03-15"));
        assert!(matches!(
            apply(TransformKind::Date, &json!("someday")),
            Err(TransformError::InvalidDate { .. })
        ));
    }

    #[test]
    fn currency_to_number() {
        assert_eq!(apply(TransformKind::Currency, &json!("$48,000")).unwrap(), json!(48000));
        assert_eq!(apply(TransformKind::Currency, &json!(125000)).unwrap(), json!(125000));
        assert!(apply(TransformKind::Currency, &json!(true)).is_err());
    }

    #[test]
    fn percentage_scaled_when_above_one() {
        assert_eq!(apply(TransformKind::Percentage, &json!(75)).unwrap(), json!(0.75));
        assert_eq!(apply(TransformKind::Percentage, &json!("85%")).unwrap(), json!(0.85));
        assert_eq!(apply(TransformKind::Percentage, &json!(0.7)).unwrap(), json!(0.7));
        assert!(matches!(
            apply(TransformKind::Percentage, &json!(250)),
            Err(TransformError::PercentageOutOfRange { .. })
        ));
    }

    #[test]
    fn boolean_token_table() {
        assert_eq!(apply(TransformKind::Boolean, &json!("Yes")).unwrap(), json!(true));
        assert_eq!(apply(TransformKind::Boolean, &json!("N")).unwrap(), json!(false));
        assert_eq!(apply(TransformKind::Boolean, &json!(1)).unwrap(), json!(true));
        assert!(apply(TransformKind::Boolean, &json!("maybe")).is_err());
    }

    #[test]
    fn address_split_on_commas() {
        let out = apply(TransformKind::Address, &json!("12 Field Rd, Ames, IA 50010")).unwrap();
        assert_eq!(out, json!({"street": "12 Field Rd", "city": "Ames", "state": "IA", "zip": "50010"}));

        let partial = apply(TransformKind::Address, &json!("12 Field Rd, Ames")).unwrap();
        assert_eq!(partial["state"], Value::Null);
        assert!(apply(TransformKind::Address, &json!("nowhere")).is_err());
    }
}
