//! Date parsing to ISO 8601 `YYYY-MM-DDTHH:MM:SS`.
//!
//! Unrecognized input yields `None`. Ambiguous input is never guessed:
//! slash dates are always read month-first.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

static TRAILING_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[T\s,]+([0-9]{1,2}:[0-9]{2}(?::[0-9]{2})?(?:\.[0-9]+)?(?:\s*[ap]\.?m\.?)?)$")
        .expect("valid regex")
});

static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,2}/[0-9]{1,2}/([0-9]{2}|[0-9]{4})$").expect("valid regex"));

/// Parse a printed date (optionally with a time) to `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_date(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_local().format(ISO_FORMAT).to_string());
    }

    let (date_part, time) = match TRAILING_TIME.captures(trimmed) {
        Some(caps) => {
            let whole = caps.get(0)?;
            let time = parse_time(caps.get(1)?.as_str())?;
            (&trimmed[..whole.start()], time)
        }
        None => (trimmed, NaiveTime::MIN),
    };

    let date = parse_date_only(date_part.trim())?;
    Some(NaiveDateTime::new(date, time).format(ISO_FORMAT).to_string())
}

fn parse_date_only(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = SLASH_DATE.captures(text) {
        let format = if caps.get(1)?.as_str().len() == 2 {
            "%m/%d/%y"
        } else {
            "%m/%d/%Y"
        };
        return NaiveDate::parse_from_str(text, format).ok();
    }

    // "Mar. 5, 2024" → "Mar 5, 2024"
    let cleaned = text.replace('.', "");
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let upper = text.to_uppercase().replace('.', "");
    // Fractional seconds survive the dot removal as digits; drop them.
    let upper = match upper.split_once(':') {
        Some((hours, rest)) if !rest.contains(['A', 'P']) => match rest.get(..5) {
            Some(clock) if rest.len() > 5 => format!("{hours}:{clock}"),
            _ => upper.clone(),
        },
        _ => upper,
    };
    let spaced = match upper.strip_suffix("AM").or_else(|| upper.strip_suffix("PM")) {
        Some(clock) => format!("{} {}", clock.trim_end(), &upper[upper.len() - 2..]),
        None => upper.clone(),
    };
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&spaced, format).ok())
}
