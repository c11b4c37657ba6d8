// allotment-core/src/application/store.rs

// Temporal values cross the store boundary as text and are cast in SQL
// (`CAST(? AS TIMESTAMP)`), keeping the connector port free of date types.

use chrono::{NaiveDate, NaiveDateTime, Utc};

use crate::ports::connector::SqlValue;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Wall clock in UTC, microsecond precision.
pub fn now() -> NaiveDateTime {
    let ts = Utc::now().naive_utc();
    parse_ts(&ts.format(TS_FORMAT).to_string()).unwrap_or(ts)
}

pub fn ts_param(ts: NaiveDateTime) -> SqlValue {
    SqlValue::Text(ts.format(TS_FORMAT).to_string())
}

pub fn opt_ts_param(ts: Option<NaiveDateTime>) -> SqlValue {
    ts.map(ts_param).unwrap_or(SqlValue::Null)
}

pub fn date_param(date: Option<NaiveDate>) -> SqlValue {
    date.map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(SqlValue::Null)
}

pub fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

pub fn u64_of(value: Option<i64>) -> u64 {
    value.and_then(|v| u64::try_from(v).ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_text_roundtrip() {
        let ts = now();
        let SqlValue::Text(text) = ts_param(ts) else {
            panic!("timestamp must bind as text");
        };
        assert_eq!(parse_ts(&text), Some(ts));
        assert!(parse_ts("2024-01-02 03:04:05").is_some());
        assert_eq!(u64_of(Some(-3)), 0);
    }
}
