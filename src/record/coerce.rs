//! Best-effort token coercion.
//!
//! Converts a raw string token into the most specific primitive that parses,
//! trying integer, float, then a slash-delimited date, and falling back to
//! the original string. The ordering matters: numeric-looking tokens must
//! never be left as strings, and date-like tokens contain slashes that never
//! parse as numbers, so the date attempt can safely come last before the
//! string fallback.

use chrono::NaiveDate;
use serde_json::{Number, Value};

/// Coerce a raw token into a typed value.
///
/// Dates matching `month/day/year` are normalized to a sortable `YYYY-MM-DD`
/// string; two-digit years are interpreted as 20xx.
pub fn coerce(token: &str) -> Value {
    if let Ok(int) = token.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = token.parse::<f64>() {
        if let Some(number) = Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    if token.contains('/') {
        if let Some(date) = parse_slash_date(token) {
            return Value::String(date);
        }
    }
    Value::String(token.to_string())
}

/// Parse `m/d/y` into ISO `YYYY-MM-DD`, validating the calendar date.
fn parse_slash_date(token: &str) -> Option<String> {
    let mut parts = token.splitn(3, '/');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;

    // Years are carried as their last two digits and pinned to this century,
    // so both 8/15/22 and 8/15/2022 normalize to 2022-08-15.
    let year = 2000 + year.rem_euclid(100);
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_wins_over_float() {
        assert_eq!(coerce("42"), json!(42));
        assert_eq!(coerce("-7"), json!(-7));
    }

    #[test]
    fn test_float() {
        assert_eq!(coerce("3.14"), json!(3.14));
        assert_eq!(coerce("-0.5"), json!(-0.5));
    }

    #[test]
    fn test_slash_date_normalized() {
        assert_eq!(coerce("08/15/2022"), json!("2022-08-15"));
        assert_eq!(coerce("8/15/22"), json!("2022-08-15"));
        assert_eq!(coerce("1/2/23"), json!("2023-01-02"));
    }

    #[test]
    fn test_invalid_date_stays_string() {
        assert_eq!(coerce("13/45/22"), json!("13/45/22"));
        assert_eq!(coerce("a/b/c"), json!("a/b/c"));
    }

    #[test]
    fn test_string_fallback() {
        assert_eq!(coerce("abc"), json!("abc"));
        assert_eq!(coerce(""), json!(""));
    }

    #[test]
    fn test_same_token_same_value() {
        assert_eq!(coerce("08/15/2022"), coerce("08/15/2022"));
        assert_eq!(coerce("3.14"), coerce("3.14"));
    }
}
