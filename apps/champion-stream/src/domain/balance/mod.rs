//! Balance Updates
//!
//! Normalizes balance payloads into a single record shape. The server has
//! used two wire shapes over time:
//!
//! ```json
//! {"data": {"balance": "5.00", "change": "0.10", "currency": "USD"}}
//! {"balance": "5.00", "change": "0.10", "currency": "USD"}
//! ```
//!
//! Both shapes carry the same fields and differ only in which object holds
//! them. Shape detection is a pure function returning a tagged variant that
//! borrows that object, and a single normalizer reads it. Optional fields
//! follow the legacy truthiness rules: a missing, null, empty-string, or zero
//! field is absent and takes the default.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default `change` when the payload has none.
pub const DEFAULT_CHANGE: &str = "0.00";

/// Default currency when the payload has none.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Normalized balance record delivered to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    /// Account balance.
    pub balance: String,
    /// Change since the previous update.
    pub change: String,
    /// Contract that caused the change, if any.
    pub contract_id: String,
    /// Currency code.
    pub currency: String,
    /// ISO-8601 timestamp of the update.
    pub timestamp: String,
}

/// Recognized balance wire shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BalanceShape<'a> {
    /// Balance fields nested under `data`.
    Nested(&'a Map<String, Value>),
    /// Balance fields at the top level.
    Flat(&'a Map<String, Value>),
    /// No reachable `balance` field.
    Unrecognized,
}

impl<'a> BalanceShape<'a> {
    /// Detect the wire shape of a raw payload.
    ///
    /// The nested shape is tried first.
    #[must_use]
    pub fn detect(value: &'a Value) -> Self {
        if let Some(inner) = value.get("data").and_then(Value::as_object)
            && has_balance(inner)
        {
            return Self::Nested(inner);
        }

        if let Some(fields) = value.as_object()
            && has_balance(fields)
        {
            return Self::Flat(fields);
        }

        Self::Unrecognized
    }

    /// Object holding the balance fields, if any.
    #[must_use]
    pub const fn fields(self) -> Option<&'a Map<String, Value>> {
        match self {
            Self::Nested(fields) | Self::Flat(fields) => Some(fields),
            Self::Unrecognized => None,
        }
    }

    /// Normalize the detected shape into a `BalanceUpdate`.
    ///
    /// Returns `None` for `Unrecognized`.
    #[must_use]
    pub fn normalize(self) -> Option<BalanceUpdate> {
        self.fields().map(fill_defaults)
    }

    /// Shape name for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nested(_) => "nested",
            Self::Flat(_) => "flat",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// Detect and normalize a raw payload in one step.
#[must_use]
pub fn normalize_balance(value: &Value) -> Option<BalanceUpdate> {
    BalanceShape::detect(value).normalize()
}

fn fill_defaults(fields: &Map<String, Value>) -> BalanceUpdate {
    BalanceUpdate {
        balance: truthy_text(fields.get("balance")).unwrap_or_default(),
        change: truthy_text(fields.get("change")).unwrap_or_else(|| DEFAULT_CHANGE.to_string()),
        contract_id: truthy_text(fields.get("contract_id")).unwrap_or_default(),
        currency: truthy_text(fields.get("currency"))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        timestamp: truthy_text(fields.get("timestamp")).unwrap_or_else(now_iso8601),
    }
}

fn has_balance(fields: &Map<String, Value>) -> bool {
    truthy_text(fields.get("balance")).is_some()
}

/// Text form of a field that counts as present.
fn truthy_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        Value::Array(_) | Value::Object(_) => value.map(Value::to_string),
        _ => None,
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_shape_fills_defaults() {
        let value = json!({"data": {"balance": "5.00"}});
        let update = normalize_balance(&value).unwrap();
        assert_eq!(update.balance, "5.00");
        assert_eq!(update.change, "0.00");
        assert_eq!(update.contract_id, "");
        assert_eq!(update.currency, "USD");
        assert!(!update.timestamp.is_empty());
        assert!(chrono::DateTime::parse_from_rfc3339(&update.timestamp).is_ok());
    }

    #[test]
    fn flat_shape_keeps_supplied_fields() {
        let value = json!({
            "balance": "120.50",
            "change": "-4.50",
            "contract_id": "C-991",
            "currency": "EUR",
            "timestamp": "2024-05-01T10:00:00Z"
        });
        let update = normalize_balance(&value).unwrap();
        assert_eq!(
            update,
            BalanceUpdate {
                balance: "120.50".to_string(),
                change: "-4.50".to_string(),
                contract_id: "C-991".to_string(),
                currency: "EUR".to_string(),
                timestamp: "2024-05-01T10:00:00Z".to_string(),
            }
        );
    }

    #[test]
    fn nested_shape_wins_over_flat() {
        let value = json!({"balance": "1.00", "data": {"balance": "2.00"}});
        assert!(matches!(BalanceShape::detect(&value), BalanceShape::Nested(_)));
        assert_eq!(normalize_balance(&value).unwrap().balance, "2.00");
    }

    #[test]
    fn nested_without_balance_falls_back_to_flat() {
        let value = json!({"balance": "3.00", "data": {"currency": "GBP"}});
        assert!(matches!(BalanceShape::detect(&value), BalanceShape::Flat(_)));
        assert_eq!(normalize_balance(&value).unwrap().currency, "USD");
    }

    #[test]
    fn shapes_differ_only_in_field_location() {
        let fields = json!({
            "balance": "7.25",
            "change": "0.25",
            "contract_id": "C-1",
            "currency": "BTC",
            "timestamp": "2024-05-01T10:00:00Z"
        });
        let nested = json!({"data": fields.clone()});

        assert_eq!(
            BalanceShape::detect(&nested).fields(),
            fields.as_object()
        );
        assert_eq!(normalize_balance(&nested), normalize_balance(&fields));
        assert_eq!(BalanceShape::Unrecognized.fields(), None);
    }

    #[test]
    fn numeric_balance_is_rendered_as_text() {
        let value = json!({"balance": 42.5});
        assert_eq!(normalize_balance(&value).unwrap().balance, "42.5");
    }

    #[test]
    fn falsy_fields_take_defaults() {
        let value = json!({"balance": "9.00", "change": "", "currency": null, "contract_id": 0});
        let update = normalize_balance(&value).unwrap();
        assert_eq!(update.change, "0.00");
        assert_eq!(update.currency, "USD");
        assert_eq!(update.contract_id, "");
    }

    #[test]
    fn unrecognized_shapes() {
        for value in [
            json!({"type": "heartbeat"}),
            json!({"data": {"change": "1.00"}}),
            json!({"balance": ""}),
            json!({"balance": 0}),
            json!([1, 2, 3]),
            json!("5.00"),
        ] {
            assert_eq!(BalanceShape::detect(&value), BalanceShape::Unrecognized);
            assert!(normalize_balance(&value).is_none());
        }
    }
}
