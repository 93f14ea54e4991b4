//! Document-Number Generator
//!
//! Two independent identifier formats. Both draw from a caller-supplied
//! random source and date. Uniqueness is not guaranteed: there is no
//! registry of issued numbers and collisions are accepted.

use chrono::{Datelike, NaiveDate};
use rand::Rng;

use crate::records::Record;

pub const DEFAULT_APP_PREFIX: &str = "J";

/// `DDMMYY` + `R` + six zero-padded digits in `1..=999999`.
pub fn sender_doc_no<R: Rng + ?Sized>(date: NaiveDate, rng: &mut R) -> String {
    let serial: u32 = rng.gen_range(1..=999_999);
    format!("{}R{:06}", date.format("%d%m%y"), serial)
}

/// Two-digit year + prefix + twelve zero-padded digits, drawn from `100000..=999999`.
pub fn app_doc_no<R: Rng + ?Sized>(date: NaiveDate, prefix: &str, rng: &mut R) -> String {
    let serial: u64 = rng.gen_range(100_000..=999_999);
    format!("{:02}{}{:012}", date.year().rem_euclid(100), prefix, serial)
}

/// The first non-empty `field` value carried by any record, else `fallback`.
pub fn resolve_doc_no_app(records: &[Record], field: &str, fallback: &str) -> String {
    records
        .iter()
        .filter_map(|r| r.get(field))
        .find_map(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| fallback.to_string())
}
