//! Line-delimited JSON record codec.
//!
//! One record per line. Lines are trimmed and blank lines are skipped on the
//! way in; on the way out every record is followed by exactly one `\n`.

use clipforged_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse every non-blank line of `text` as one record, preserving order.
///
/// # Errors
///
/// Returns [`Error::MalformedRecord`] naming the one-based line number of the
/// first line that fails to parse.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| Error::MalformedRecord {
            line: idx + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Serialize records as one compact JSON line each.
pub fn encode<T: Serialize>(records: &[T]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| Error::Internal(format!("failed to serialize record: {e}")))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn decode_skips_blank_lines_and_trims() {
        let text = "{\"a\":1}\n\n   \n  {\"a\":2}  \r\n";
        let records: Vec<Value> = decode(text).unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn decode_empty() {
        let records: Vec<Value> = decode("").unwrap();
        assert!(records.is_empty());
        let records: Vec<Value> = decode("\n\n").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn decode_names_offending_line() {
        let text = "{\"a\":1}\n\n{not json}\n";
        let err = decode::<Value>(text).unwrap_err();
        match err {
            Error::MalformedRecord { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn encode_one_line_per_record() {
        let text = encode(&[json!({"a": 1}), json!({"b": "x"})]).unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"b\":\"x\"}\n");
        assert_eq!(encode::<Value>(&[]).unwrap(), "");
    }

    #[test]
    fn round_trip_preserves_order() {
        let records = vec![json!({"z": 1}), json!([1, 2]), json!("s"), json!(null)];
        let back: Vec<Value> = decode(&encode(&records).unwrap()).unwrap();
        assert_eq!(back, records);

        let empty: Vec<Value> = Vec::new();
        let back: Vec<Value> = decode(&encode(&empty).unwrap()).unwrap();
        assert_eq!(back, empty);
    }
}
