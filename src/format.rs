//! Display formatting shared by the chart, progress and page renderers.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::fmt::Display;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %I:%M %p";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Formats a count with grouped thousands, e.g. `1234567` -> `1,234,567`.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Formats a percentage with one fractional digit.
pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

/// Formats a timestamp in the local timezone as `YYYY-MM-DD HH:MM AM/PM`.
pub fn format_timestamp(value: Option<&str>) -> String {
    format_timestamp_in(value, &Local)
}

/// Same as [`format_timestamp`] with an explicit target timezone.
///
/// Absent or blank values render as `Never`; values that do not parse are
/// returned unchanged. Timestamps without an offset are taken as wall time.
pub fn format_timestamp_in<Tz>(value: Option<&str>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let raw = match value.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return "Never".to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string();
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return naive.format(TIMESTAMP_FORMAT).to_string();
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| raw.to_string());
    }

    raw.to_string()
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn counts_use_grouped_thousands() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn percent_keeps_one_digit() {
        assert_eq!(format_percent(12.345), "12.3%");
        assert_eq!(format_percent(100.0), "100.0%");
    }

    #[test]
    fn timestamp_converts_offsets_into_target_zone() {
        let pacific = FixedOffset::west_opt(8 * 3600).unwrap();
        assert_eq!(
            format_timestamp_in(Some("2024-03-01T20:30:00+00:00"), &pacific),
            "2024-03-01 12:30 PM"
        );
        assert_eq!(
            format_timestamp_in(Some("2024-03-01T05:07:00Z"), &Utc),
            "2024-03-01 05:07 AM"
        );
    }

    #[test]
    fn timestamp_without_offset_is_wall_time() {
        assert_eq!(
            format_timestamp_in(Some("2024-03-01T23:15:42.123456"), &Utc),
            "2024-03-01 11:15 PM"
        );
    }

    #[test]
    fn timestamp_fallbacks() {
        assert_eq!(format_timestamp_in(None, &Utc), "Never");
        assert_eq!(format_timestamp_in(Some("  "), &Utc), "Never");
        assert_eq!(format_timestamp_in(Some("last tuesday"), &Utc), "last tuesday");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<b>\"Tom & Jerry\"</b>"), "&lt;b&gt;&quot;Tom &amp; Jerry&quot;&lt;/b&gt;");
    }
}
