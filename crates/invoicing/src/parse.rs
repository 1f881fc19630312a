//! Defensive scalar coercion from heterogeneous wire formats.
//!
//! Nothing in here fails: bad input degrades to a fallback and, where the
//! caller passes a [`Warnings`] sink, leaves a note naming the field.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use tradedesk_core::Money;

/// A non-fatal problem found while normalizing one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWarning {
    pub field: String,
    pub message: String,
}

/// Accumulates warnings for one normalization call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings(Vec<FieldWarning>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldWarning {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldWarning> {
        self.0.iter()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|w| w.field.as_str()).collect()
    }

    /// Emit a single log line for everything collected (nothing when empty).
    pub fn log(&self, source: &str, entity: &str) {
        if self.0.is_empty() {
            return;
        }
        let details: Vec<String> = self
            .0
            .iter()
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();
        tracing::warn!(
            source,
            entity,
            count = self.0.len(),
            warnings = ?details,
            "normalization completed with warnings"
        );
    }
}

/// `toISOString()`-compatible rendering (`2023-11-14T22:13:20.000Z`).
pub fn to_iso_string(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Coerce a wire date. Missing or unparsable values fall back to `now`.
///
/// Accepted shapes: RFC 3339 strings, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`,
/// `{ "seconds": n, "nanos": n }` timestamp objects and epoch milliseconds.
pub fn parse_date(
    value: Option<&Value>,
    field: &str,
    now: DateTime<Utc>,
    warnings: &mut Warnings,
) -> DateTime<Utc> {
    match value {
        None | Some(Value::Null) => {
            warnings.push(field, "missing date, using current time");
            now
        }
        Some(v) => match coerce_date(v) {
            Some(at) => at,
            None => {
                warnings.push(field, format!("unparseable date {v}, using current time"));
                now
            }
        },
    }
}

/// Like [`parse_date`], but null/absent/blank values mean "not set".
pub fn parse_optional_date(
    value: Option<&Value>,
    field: &str,
    warnings: &mut Warnings,
) -> Option<DateTime<Utc>> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => {
            let parsed = coerce_date(v);
            if parsed.is_none() {
                warnings.push(field, format!("unparseable date {v}, treating as unset"));
            }
            parsed
        }
    }
}

fn coerce_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => {
            let seconds = map.get("seconds")?;
            let seconds = parse_number_opt(Some(seconds))?;
            let nanos = parse_number(map.get("nanos"), 0.0);
            let millis = (seconds * 1000.0 + nanos / 1_000_000.0).trunc();
            if !millis.is_finite() {
                return None;
            }
            DateTime::from_timestamp_millis(millis as i64)
        }
        _ => None,
    }
}

fn parse_date_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Coerce a wire number. Null, absent or non-numeric input yields `fallback`.
///
/// Never returns NaN or infinity (a non-finite fallback becomes `0.0`).
pub fn parse_number(value: Option<&Value>, fallback: f64) -> f64 {
    let fallback = if fallback.is_finite() { fallback } else { 0.0 };
    parse_number_opt(value).unwrap_or(fallback)
}

fn parse_number_opt(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => strip_grouping(s).parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Coerce a wire amount exactly (no float round-trip for textual amounts).
pub fn parse_money(value: Option<&Value>, fallback: Money) -> Money {
    parse_money_opt(value).unwrap_or(fallback)
}

/// [`parse_money`] that records a warning when a value was present but unusable.
pub fn parse_money_checked(
    value: Option<&Value>,
    fallback: Money,
    field: &str,
    warnings: &mut Warnings,
) -> Money {
    match value {
        None | Some(Value::Null) => fallback,
        Some(v) => parse_money_opt(Some(v)).unwrap_or_else(|| {
            warnings.push(field, format!("unparseable amount {v}, using {fallback}"));
            fallback
        }),
    }
}

fn parse_money_opt(value: Option<&Value>) -> Option<Money> {
    match value? {
        Value::Number(n) => Money::parse(&n.to_string()),
        Value::String(s) => Money::parse(&strip_grouping(s)),
        _ => None,
    }
}

fn strip_grouping(s: &str) -> String {
    s.trim().replace(',', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn epoch_seconds_object_converts_to_millis() {
        let mut w = Warnings::new();
        let at = parse_date(Some(&json!({"seconds": 1_700_000_000})), "issuedAt", fixed_now(), &mut w);
        assert_eq!(at.timestamp_millis(), 1_700_000_000 * 1000);
        assert_eq!(to_iso_string(at), "2023-11-14T22:13:20.000Z");
        assert!(w.is_empty());
    }

    #[test]
    fn seconds_object_honours_nanos() {
        let mut w = Warnings::new();
        let at = parse_date(
            Some(&json!({"seconds": "1700000000", "nanos": 250_000_000})),
            "createdAt",
            fixed_now(),
            &mut w,
        );
        assert_eq!(to_iso_string(at), "2023-11-14T22:13:20.250Z");
    }

    #[test]
    fn missing_date_falls_back_to_now_with_warning() {
        let mut w = Warnings::new();
        let at = parse_date(None, "invoiceDate", fixed_now(), &mut w);
        assert_eq!(at, fixed_now());
        assert_eq!(w.fields(), vec!["invoiceDate"]);
    }

    #[test]
    fn garbage_date_records_field_name() {
        let mut w = Warnings::new();
        let at = parse_date(Some(&json!("not a date")), "dueDate", fixed_now(), &mut w);
        assert_eq!(at, fixed_now());
        assert_eq!(w.len(), 1);
        assert_eq!(w.iter().next().unwrap().field, "dueDate");
    }

    #[test]
    fn accepts_common_string_shapes() {
        let mut w = Warnings::new();
        let day = parse_date(Some(&json!("2025-01-31")), "dueDate", fixed_now(), &mut w);
        assert_eq!(to_iso_string(day), "2025-01-31T00:00:00.000Z");
        let local = parse_date(Some(&json!("2025-01-31 10:15:00")), "d", fixed_now(), &mut w);
        assert_eq!(to_iso_string(local), "2025-01-31T10:15:00.000Z");
        let zoned = parse_date(Some(&json!("2025-01-31T10:15:00+04:00")), "d", fixed_now(), &mut w);
        assert_eq!(to_iso_string(zoned), "2025-01-31T06:15:00.000Z");
        assert!(w.is_empty());
    }

    #[test]
    fn optional_dates_treat_blank_as_unset() {
        let mut w = Warnings::new();
        assert_eq!(parse_optional_date(Some(&json!(null)), "deletedAt", &mut w), None);
        assert_eq!(parse_optional_date(Some(&json!("  ")), "deletedAt", &mut w), None);
        assert!(w.is_empty());
        assert_eq!(parse_optional_date(Some(&json!("bogus")), "deletedAt", &mut w), None);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn parse_number_never_returns_nan() {
        assert_eq!(parse_number(None, 5.0), 5.0);
        assert_eq!(parse_number(Some(&json!(null)), 5.0), 5.0);
        assert_eq!(parse_number(Some(&json!("abc")), 1.5), 1.5);
        assert_eq!(parse_number(Some(&json!("50.50")), 0.0), 50.5);
        assert_eq!(parse_number(Some(&json!(" 1,250 ")), 0.0), 1250.0);
        assert_eq!(parse_number(Some(&json!(true)), 2.0), 2.0);
        assert_eq!(parse_number(Some(&json!("NaN")), f64::NAN), 0.0);
    }

    #[test]
    fn parse_money_is_exact_for_strings_and_numbers() {
        assert_eq!(parse_money(Some(&json!("5000.00")), Money::ZERO), Money::from_minor(500_000));
        assert_eq!(parse_money(Some(&json!(50.25)), Money::ZERO), Money::from_minor(5025));
        assert_eq!(parse_money(Some(&json!("oops")), Money::from_minor(1)), Money::from_minor(1));
    }

    #[test]
    fn checked_money_warns_only_for_present_garbage() {
        let mut w = Warnings::new();
        parse_money_checked(None, Money::ZERO, "total", &mut w);
        parse_money_checked(Some(&json!(null)), Money::ZERO, "total", &mut w);
        assert!(w.is_empty());
        parse_money_checked(Some(&json!({"x": 1})), Money::ZERO, "total", &mut w);
        assert_eq!(w.fields(), vec!["total"]);
    }
}
