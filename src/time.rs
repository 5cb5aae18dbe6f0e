use std::str::FromStr;

use hifitime::Epoch;
use serde_json::Value;

use crate::maven_errors::MavenError;

/// Format an epoch as an ISO 8601 UTC string with millisecond precision,
/// the form expected by LaTiS time filters (e.g. `2015-03-01T00:00:00.000Z`).
///
/// Argument
/// --------
/// * `epoch`: the epoch to format
///
/// Return
/// ------
/// * the formatted UTC string
pub fn epoch_to_iso(epoch: &Epoch) -> String {
    let (y, m, d, h, min, s, ns) = epoch.to_gregorian_utc();
    format!(
        "{y:04}-{m:02}-{d:02}T{h:02}:{min:02}:{s:02}.{:03}Z",
        ns / 1_000_000
    )
}

/// Parse an ISO 8601 UTC date string (`YYYY-MM-DDTHH:MM:SS[.fff][Z]`) into an epoch.
///
/// Argument
/// --------
/// * `date`: the date string, optionally terminated by `Z`
///
/// Return
/// ------
/// * the epoch, or [`MavenError::InvalidTimestamp`]
pub fn parse_iso_utc(date: &str) -> Result<Epoch, MavenError> {
    let trimmed = date.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    Epoch::from_str(&format!("{trimmed} UTC"))
        .map_err(|e| MavenError::InvalidTimestamp(format!("{date}: {e}")))
}

/// Read a timestamp cell of a LaTiS table.
///
/// Numeric cells are milliseconds since the Unix epoch (the `jsond` convention),
/// text cells are ISO 8601 UTC dates (the `csv`/`txt` convention).
pub fn epoch_from_cell(cell: &Value) -> Result<Epoch, MavenError> {
    match cell {
        Value::Number(n) => n
            .as_f64()
            .map(Epoch::from_unix_milliseconds)
            .ok_or_else(|| MavenError::InvalidTimestamp(n.to_string())),
        Value::String(s) => parse_iso_utc(s),
        other => Err(MavenError::InvalidTimestamp(other.to_string())),
    }
}

/// Epoch in the middle of `start` and `end`
pub fn mean_epoch(start: &Epoch, end: &Epoch) -> Epoch {
    *start + (*end - *start) * 0.5
}

#[cfg(test)]
mod time_test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_epoch_to_iso() {
        let epoch = Epoch::from_gregorian_utc(2015, 3, 1, 12, 30, 5, 250_000_000);
        assert_eq!(epoch_to_iso(&epoch), "2015-03-01T12:30:05.250Z");
    }

    #[test]
    fn test_parse_iso_utc() {
        let epoch = parse_iso_utc("2015-03-01T12:30:05Z").unwrap();
        assert_eq!(epoch, Epoch::from_gregorian_utc_hms(2015, 3, 1, 12, 30, 5));
        assert!(parse_iso_utc("yesterday").is_err());
    }

    #[test]
    fn test_epoch_from_cell() {
        let epoch = epoch_from_cell(&json!(1_425_168_000_000.0_f64)).unwrap();
        assert_eq!(epoch_to_iso(&epoch), "2015-03-01T00:00:00.000Z");

        let epoch = epoch_from_cell(&json!("2015-03-01T00:00:00.000Z")).unwrap();
        assert_eq!(epoch_to_iso(&epoch), "2015-03-01T00:00:00.000Z");

        assert!(epoch_from_cell(&json!(null)).is_err());
    }

    #[test]
    fn test_mean_epoch() {
        let start = Epoch::from_gregorian_utc_at_midnight(2015, 3, 1);
        let end = Epoch::from_gregorian_utc_at_midnight(2015, 3, 3);
        assert_eq!(
            mean_epoch(&start, &end),
            Epoch::from_gregorian_utc_at_midnight(2015, 3, 2)
        );
    }
}
