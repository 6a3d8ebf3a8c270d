// Typed coercion of raw CSV cells

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

use backfill_core::{ColumnType, Value};

/// Output format for timestamps, local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Coerce one raw cell to its declared type. A missing cell is null.
pub fn coerce(raw: Option<&str>, ty: ColumnType) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };

    match ty {
        ColumnType::Integer => match parse_leading_int(raw) {
            Some(n) => Value::Integer(n),
            None => Value::Text(raw.to_string()),
        },
        ColumnType::Varchar | ColumnType::String => Value::Text(raw.to_string()),
        ColumnType::Boolean => Value::Boolean(raw == "true"),
        ColumnType::Timestamp => match parse_timestamp(raw) {
            Some(ts) => Value::Timestamp(ts),
            None => {
                log::warn!("unparseable timestamp '{raw}', storing null");
                Value::Null
            }
        },
        ColumnType::Inet => Value::Inet(raw.to_string()),
    }
}

/// Parse the leading signed digit run, ignoring anything after it.
/// `"12abc"` is 12; `"NULL"` and `""` are `None`.
pub fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    s[..end].parse().ok()
}

/// Normalize a timestamp to `YYYY-MM-DD HH:MM:SS` in local time.
///
/// Values carrying an offset are converted to the local zone; naive values
/// are taken as local wall time already.
pub fn parse_timestamp(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let with_offset = DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"));
    if let Ok(dt) = with_offset {
        return Some(dt.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string());
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.format(TIMESTAMP_FORMAT).to_string());
        }
    }

    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string());
        }
    }

    None
}
