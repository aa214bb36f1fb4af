//! Publication date normalization to RSS `pubDate` strings.
//!
//! Dates read from the page are rendered at midnight UTC. Anything that cannot be parsed,
//! and any record whose date was not on the page, gets the current time instead.

use crate::model::{ChapterRecord, DateSource};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

const MIDNIGHT_FORMAT: &str = "%a, %d %b %Y 00:00:00 +0000";
const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S +0000";

fn cjk_date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d{4})年(\d{2})月(\d{2})日").ok())
        .as_ref()
}

/// Parse `2026年01月30日` (anywhere in the string) or a bare `2026-01-30`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Some(caps) = cjk_date_pattern().and_then(|re| re.captures(raw)) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// RFC 822 timestamp for a raw date string, falling back to `now` when it does not parse.
pub fn format_pub_date_at(raw: &str, now: DateTime<Utc>) -> String {
    match parse_date(raw) {
        Some(date) => date.format(MIDNIGHT_FORMAT).to_string(),
        None => format_timestamp(now),
    }
}

/// `pubDate` for a record. Records without a page date take the current-time path.
pub fn record_pub_date(record: &ChapterRecord, now: DateTime<Utc>) -> String {
    match record.date_source {
        DateSource::Page => format_pub_date_at(&record.pub_date, now),
        DateSource::Fallback => format_timestamp(now),
    }
}

/// Full RFC 822 timestamp at second resolution.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 8, 15, 42)
            .single()
            .expect("valid fixed time")
    }

    #[test]
    fn cjk_date_renders_midnight() {
        assert_eq!(
            format_pub_date_at("2026年01月30日", fixed_now()),
            "Fri, 30 Jan 2026 00:00:00 +0000"
        );
    }

    #[test]
    fn cjk_date_inside_longer_text() {
        assert_eq!(
            format_pub_date_at("(2025年12月05日 更新)", fixed_now()),
            "Fri, 05 Dec 2025 00:00:00 +0000"
        );
    }

    #[test]
    fn iso_date_renders_midnight() {
        assert_eq!(
            format_pub_date_at("2026-02-01", fixed_now()),
            "Sun, 01 Feb 2026 00:00:00 +0000"
        );
    }

    #[test]
    fn impossible_calendar_date_falls_back_to_now() {
        assert_eq!(
            format_pub_date_at("2026年02月30日", fixed_now()),
            "Sat, 17 Oct 2026 08:15:42 +0000"
        );
    }

    #[test]
    fn garbage_falls_back_to_now() {
        for raw in ["", "昨天", "30/01/2026", "2026-1-3x", "年月日", "2026年13月01日"] {
            assert_eq!(
                format_pub_date_at(raw, fixed_now()),
                "Sat, 17 Oct 2026 08:15:42 +0000",
                "input {:?}",
                raw
            );
        }
    }

    #[test]
    fn single_digit_month_or_day_falls_back_to_now() {
        for raw in ["2026年1月5日", "2026年01月5日", "2026年1月05日"] {
            assert_eq!(parse_date(raw), None, "input {:?}", raw);
            assert_eq!(
                format_pub_date_at(raw, fixed_now()),
                "Sat, 17 Oct 2026 08:15:42 +0000"
            );
        }
    }

    #[test]
    fn parsed_date_components_match() {
        for (y, m, d) in [(2024, 2, 29), (1999, 12, 31), (2026, 1, 1)] {
            let raw = format!("{:04}年{:02}月{:02}日", y, m, d);
            let parsed = parse_date(&raw);
            assert_eq!(parsed, NaiveDate::from_ymd_opt(y, m, d));
            assert!(format_pub_date_at(&raw, Utc::now()).ends_with(" 00:00:00 +0000"));
        }
    }

    #[test]
    fn fallback_record_uses_current_time_even_with_iso_date() {
        let record = ChapterRecord {
            title: "第1话".to_string(),
            link: "https://www.baozimh.com/c/1.html".to_string(),
            pub_date: "2026-10-17".to_string(),
            date_source: DateSource::Fallback,
        };
        assert_eq!(
            record_pub_date(&record, fixed_now()),
            "Sat, 17 Oct 2026 08:15:42 +0000"
        );
        let page = ChapterRecord {
            date_source: DateSource::Page,
            ..record
        };
        assert_eq!(
            record_pub_date(&page, fixed_now()),
            "Sat, 17 Oct 2026 00:00:00 +0000"
        );
    }

    proptest! {
        #[test]
        fn any_input_yields_a_pub_date(raw in ".*") {
            let out = format_pub_date_at(&raw, fixed_now());
            prop_assert!(
                out.ends_with(" 00:00:00 +0000") || out == "Sat, 17 Oct 2026 08:15:42 +0000",
                "{}",
                out
            );
        }

        #[test]
        fn cjk_dates_render_at_midnight(
            date in (1900i32..2100, 1u32..=12, 1u32..=31)
                .prop_filter_map("valid calendar date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            prefix in "[^0-9]{0,4}",
        ) {
            let raw = format!("{}{}", prefix, date.format("%Y年%m月%d日"));
            let out = format_pub_date_at(&raw, fixed_now());
            prop_assert_eq!(&out, &date.format("%a, %d %b %Y 00:00:00 +0000").to_string());
            let parsed = DateTime::parse_from_rfc2822(&out).unwrap();
            prop_assert_eq!(parsed.date_naive(), date);
        }
    }
}
