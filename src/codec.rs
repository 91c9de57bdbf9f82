//! Encoding and decoding of scalar element content.
//!
//! Every leaf-text element carries exactly one [`LeafValue`]. Decimals are
//! always written with a fixed number of fractional digits so that a value
//! read back from a file and saved again produces the same text.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{GpxError, Result};

/// Fractional digits used for coordinates and decimal leaves.
pub const DEFAULT_DECIMAL_PRECISION: usize = 10;

/// The scalar type a leaf-text element holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafKind {
    String,
    Integer,
    Decimal,
    /// ISO-8601 date and time.
    Date,
    /// `xsd:gYear`, e.g. the `<year>` of a copyright.
    Year,
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Year => "year",
        };
        f.write_str(name)
    }
}

/// A decoded scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    String(String),
    Integer(i64),
    Decimal(f64),
    Date(DateTime<Utc>),
    Year(i32),
}

impl LeafValue {
    pub fn kind(&self) -> LeafKind {
        match self {
            Self::String(_) => LeafKind::String,
            Self::Integer(_) => LeafKind::Integer,
            Self::Decimal(_) => LeafKind::Decimal,
            Self::Date(_) => LeafKind::Date,
            Self::Year(_) => LeafKind::Year,
        }
    }

    /// Render the value as element text. `precision` only affects decimals.
    pub fn encode(&self, precision: usize) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Decimal(d) => encode_decimal(*d, precision),
            Self::Date(date) => date.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::Year(y) if *y < 0 => format!("-{:04}", y.unsigned_abs()),
            Self::Year(y) => format!("{y:04}"),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Year projection, available on both dates and years.
    pub fn year(&self) -> Option<i32> {
        use chrono::Datelike;
        match self {
            Self::Date(d) => Some(d.year()),
            Self::Year(y) => Some(*y),
            _ => None,
        }
    }
}

/// Fixed-precision decimal text, shared by decimal leaves and coordinate attributes.
pub fn encode_decimal(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

/// Decode element text as the given kind.
///
/// Strings are taken verbatim; every other kind ignores surrounding whitespace.
pub fn decode(kind: LeafKind, text: &str) -> Result<LeafValue> {
    let invalid = || GpxError::InvalidLeaf {
        kind,
        text: text.to_string(),
    };
    let trimmed = text.trim();

    match kind {
        LeafKind::String => Ok(LeafValue::String(text.to_string())),
        LeafKind::Integer => trimmed
            .parse::<i64>()
            .map(LeafValue::Integer)
            .map_err(|_| invalid()),
        LeafKind::Decimal => decode_decimal(trimmed)
            .map(LeafValue::Decimal)
            .ok_or_else(invalid),
        LeafKind::Date => decode_date(trimmed)
            .map(LeafValue::Date)
            .ok_or_else(invalid),
        LeafKind::Year => decode_year(trimmed)
            .map(LeafValue::Year)
            .ok_or_else(invalid),
    }
}

/// Parse a finite decimal, as used by coordinate attributes.
pub fn decode_decimal(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|d| d.is_finite())
}

/// Decimal text re-encoded at `precision`, `None` when it is not a number.
pub fn normalize_decimal(text: &str, precision: usize) -> Option<String> {
    decode_decimal(text).map(|d| encode_decimal(d, precision))
}

fn decode_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    // Some loggers omit the zone designator; those timestamps are UTC.
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn decode_year(text: &str) -> Option<i32> {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, zone) = rest.split_at(end);
    if digits.len() < 4 || !is_zone(zone) {
        return None;
    }
    digits.parse::<i32>().ok().map(|y| sign * y)
}

fn is_zone(zone: &str) -> bool {
    let bytes = zone.as_bytes();
    match bytes {
        [] | [b'Z'] => true,
        [b'+' | b'-', h1, h2, b':', m1, m2] => {
            [h1, h2, m1, m2].iter().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_decimal_fixed_precision() {
        let v = LeafValue::Decimal(35.12345678912345);
        assert_eq!(v.encode(DEFAULT_DECIMAL_PRECISION), "35.1234567891");
        assert_eq!(
            LeafValue::Decimal(1.23456789016).encode(DEFAULT_DECIMAL_PRECISION),
            "1.2345678902"
        );
        assert_eq!(LeafValue::Decimal(12.5).encode(2), "12.50");
    }

    #[test]
    fn test_decimal_repeated_saves_do_not_drift() {
        let mut text = LeafValue::Decimal(-122.08395287867832).encode(10);
        for _ in 0..5 {
            let decoded = decode(LeafKind::Decimal, &text).unwrap();
            let again = decoded.encode(10);
            assert_eq!(again, text);
            text = again;
        }
        assert_eq!(text, "-122.0839528787");
    }

    #[test]
    fn test_decimal_rejects_garbage() {
        assert!(decode(LeafKind::Decimal, "abc").is_err());
        assert!(decode(LeafKind::Decimal, "").is_err());
        assert!(decode(LeafKind::Decimal, "NaN").is_err());
        assert_eq!(
            decode(LeafKind::Decimal, "  40.5\n").unwrap(),
            LeafValue::Decimal(40.5)
        );
    }

    #[test]
    fn test_normalize_decimal() {
        assert_eq!(normalize_decimal("1.5", 10).as_deref(), Some("1.5000000000"));
        assert_eq!(
            normalize_decimal("35.123456789123456", 10).as_deref(),
            Some("35.1234567891")
        );
        assert_eq!(normalize_decimal("north", 10), None);
    }

    #[test]
    fn test_integer() {
        assert_eq!(
            decode(LeafKind::Integer, " 7 ").unwrap(),
            LeafValue::Integer(7)
        );
        assert!(decode(LeafKind::Integer, "7.5").is_err());
        assert_eq!(LeafValue::Integer(-3).encode(10), "-3");
    }

    #[test]
    fn test_string_is_verbatim() {
        let v = decode(LeafKind::String, "  Morning Run ").unwrap();
        assert_eq!(v.as_str(), Some("  Morning Run "));
        assert_eq!(v.encode(10), "  Morning Run ");
    }

    #[test]
    fn test_date_formats() {
        let v = decode(LeafKind::Date, "2025-01-01T06:04:00Z").unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 1, 1, 6, 4, 0).unwrap();
        assert_eq!(v, LeafValue::Date(expected));
        assert_eq!(v.encode(10), "2025-01-01T06:04:00Z");

        let offset = decode(LeafKind::Date, "2025-01-01T08:04:00+02:00").unwrap();
        assert_eq!(offset, LeafValue::Date(expected));

        let zoneless = decode(LeafKind::Date, "2025-01-01T06:04:00").unwrap();
        assert_eq!(zoneless, LeafValue::Date(expected));

        let fractional = decode(LeafKind::Date, "2025-01-01T06:04:00.250Z").unwrap();
        assert_eq!(fractional.encode(10), "2025-01-01T06:04:00.250Z");

        assert!(decode(LeafKind::Date, "yesterday").is_err());
    }

    #[test]
    fn test_year() {
        assert_eq!(decode(LeafKind::Year, "2009").unwrap(), LeafValue::Year(2009));
        assert_eq!(decode(LeafKind::Year, "2009Z").unwrap(), LeafValue::Year(2009));
        assert_eq!(
            decode(LeafKind::Year, "2009+01:00").unwrap(),
            LeafValue::Year(2009)
        );
        assert!(decode(LeafKind::Year, "09").is_err());
        assert!(decode(LeafKind::Year, "2009-07").is_err());
        assert_eq!(LeafValue::Year(812).encode(10), "0812");
    }

    #[test]
    fn test_year_projection_from_date() {
        let date = LeafValue::Date(Utc.with_ymd_and_hms(2009, 7, 29, 0, 0, 0).unwrap());
        assert_eq!(date.year(), Some(2009));
        assert_eq!(LeafValue::Integer(2009).year(), None);
    }

    proptest! {
        #[test]
        fn prop_coordinate_text_is_stable(value in -180.0f64..180.0) {
            let first = LeafValue::Decimal(value).encode(DEFAULT_DECIMAL_PRECISION);
            let decoded = decode(LeafKind::Decimal, &first).unwrap();
            prop_assert_eq!(decoded.encode(DEFAULT_DECIMAL_PRECISION), first);
        }

        #[test]
        fn prop_integer_round_trip(value in any::<i64>()) {
            let v = LeafValue::Integer(value);
            prop_assert_eq!(decode(LeafKind::Integer, &v.encode(10)).unwrap(), v);
        }

        #[test]
        fn prop_date_round_trip(secs in 0i64..4_102_444_800) {
            let date = Utc.timestamp_opt(secs, 0).unwrap();
            let v = LeafValue::Date(date);
            prop_assert_eq!(decode(LeafKind::Date, &v.encode(10)).unwrap(), v);
        }
    }
}
