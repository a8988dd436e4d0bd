use serde_json::Value;

use crate::domain::Record;

const SECONDS_DIGITS: usize = 10;
const MICROS_DIGITS: usize = 6;

/// Canonicalizes a message timestamp into `seconds.micros`.
///
/// Already-separated tokens and anything that is not exactly sixteen ASCII
/// digits pass through unchanged; the remote is left to reject bad input.
pub fn normalize_timestamp(token: &str) -> String {
    if token.contains('.') {
        return token.to_string();
    }
    if token.len() == SECONDS_DIGITS + MICROS_DIGITS && token.bytes().all(|b| b.is_ascii_digit())
    {
        let (seconds, micros) = token.split_at(SECONDS_DIGITS);
        return format!("{seconds}.{micros}");
    }
    token.to_string()
}

pub fn record_ts(record: &Record) -> &str {
    record.get("ts").and_then(Value::as_str).unwrap_or("")
}

/// Orders records oldest first by their `ts` token. Tokens are fixed-width so
/// plain string comparison is chronological; the sort is stable so equal
/// tokens keep the order the remote returned them in.
pub fn sort_chronologically(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by(|a, b| record_ts(a).cmp(record_ts(b)));
    records
}
