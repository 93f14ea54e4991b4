//! Aggregator - derived numeric summaries
//!
//! Coercion is policy, not failure: anything that is not a usable number
//! counts as zero.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::config::SessionConfig;
use crate::records::Record;

/// Invoice tax rate (11% VAT).
pub const TAX_RATE: f64 = 0.11;

/// Purchase orders with any unit price above this need approval.
pub const APPROVAL_LIMIT: f64 = 10_000.0;

pub const QUANTITY_FIELD: &str = "quantity";
pub const UNIT_PRICE_FIELD: &str = "unitPrice";

/// Largest magnitude below which every whole f64 is an exact integer.
pub(crate) const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Numeric view of a field value. Absent, null, false, non-numeric and
/// non-finite values are 0; numeric strings are parsed.
pub fn numeric(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    if n.is_finite() { n } else { 0.0 }
}

pub fn field(record: &Record, name: &str) -> f64 {
    numeric(record.get(name))
}

pub fn row_count(records: &[Record]) -> usize {
    records.len()
}

pub fn sum_field(records: &[Record], name: &str) -> f64 {
    records.iter().map(|r| field(r, name)).sum()
}

/// True iff any value is strictly above `limit`.
pub fn exceeds_limit(values: impl IntoIterator<Item = f64>, limit: f64) -> bool {
    values.into_iter().any(|v| v > limit)
}

pub fn any_exceeds(records: &[Record], name: &str, limit: f64) -> bool {
    exceeds_limit(records.iter().map(|r| field(r, name)), limit)
}

/// Round half away from zero to two decimals.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Write whole amounts as integers (`30000`, not `30000.0`).
pub fn serialize_amount<S: Serializer>(amount: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if amount.fract() == 0.0 && amount.abs() < MAX_EXACT_INTEGER {
        serializer.serialize_i64(*amount as i64)
    } else {
        serializer.serialize_f64(*amount)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    #[serde(serialize_with = "serialize_amount")]
    pub subtotal: f64,
    #[serde(serialize_with = "serialize_amount")]
    pub tax: f64,
    #[serde(serialize_with = "serialize_amount")]
    pub total: f64,
}

impl InvoiceTotals {
    pub fn from_line_totals(lines: impl IntoIterator<Item = f64>) -> Self {
        let subtotal = round_currency(lines.into_iter().sum());
        let tax = round_currency(subtotal * TAX_RATE);
        Self {
            subtotal,
            tax,
            total: round_currency(subtotal + tax),
        }
    }
}

/// Everything the session derives from the current record set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub row_count: usize,
    #[serde(serialize_with = "serialize_amount")]
    pub total_amount: f64,
    #[serde(serialize_with = "serialize_amount")]
    pub subtotal: f64,
    #[serde(serialize_with = "serialize_amount")]
    pub tax: f64,
    #[serde(serialize_with = "serialize_amount")]
    pub total: f64,
    pub approval_required: bool,
}

impl Summary {
    pub fn compute(records: &[Record], config: &SessionConfig) -> Self {
        let totals = InvoiceTotals::from_line_totals(
            records
                .iter()
                .map(|r| field(r, QUANTITY_FIELD) * field(r, UNIT_PRICE_FIELD)),
        );
        Self {
            row_count: row_count(records),
            total_amount: sum_field(records, &config.amount_field),
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            approval_required: any_exceeds(records, UNIT_PRICE_FIELD, APPROVAL_LIMIT),
        }
    }
}
