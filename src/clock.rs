//! Wall-clock formatting shared by published results and persisted logs.

use chrono::{DateTime, Local, Utc};

/// ISO-8601, millisecond precision, explicit UTC offset: `2024-05-01T12:00:00.123+00:00`.
pub fn format_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3f+00:00").to_string()
}

pub fn now_iso() -> String {
    format_iso(Utc::now())
}

/// Suffix for log file names.
pub fn file_stamp() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn millisecond_precision_with_offset() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(format_iso(ts), "2024-05-01T12:30:05.123+00:00");
    }

    #[test]
    fn parses_back_as_rfc3339() {
        let text = now_iso();
        assert!(DateTime::parse_from_rfc3339(&text).is_ok());
    }
}
