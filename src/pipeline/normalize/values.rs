//! Sentinel tokens and numeric cell parsing.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;
use crate::models::{AnalyteValue, Limit};

/// Sentinel spellings with internal whitespace removed, uppercased.
const SENTINELS: &[(&str, AnalyteValue)] = &[
    ("ND", AnalyteValue::BelowLimit(Limit::Detection)),
    ("<LOD", AnalyteValue::BelowLimit(Limit::Detection)),
    ("<MDL", AnalyteValue::BelowLimit(Limit::Detection)),
    ("<LOQ", AnalyteValue::BelowLimit(Limit::Quantitation)),
    ("<LLOQ", AnalyteValue::BelowLimit(Limit::Quantitation)),
    ("BLQ", AnalyteValue::BelowLimit(Limit::Quantitation)),
    ("NR", AnalyteValue::NotReported),
    ("NT", AnalyteValue::NotReported),
    ("NOTTESTED", AnalyteValue::NotReported),
    ("--", AnalyteValue::NotReported),
    ("-", AnalyteValue::NotReported),
    ("N/A", AnalyteValue::NotApplicable),
    ("NA", AnalyteValue::NotApplicable),
];

static THOUSANDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("valid regex"));

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid regex")
});

/// The fixed convention for a sentinel token, if `token` is one.
pub fn parse_sentinel(token: &str) -> Option<AnalyteValue> {
    let compact: String = token
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    SENTINELS
        .iter()
        .find(|(spelling, _)| *spelling == compact)
        .map(|(_, value)| *value)
}

/// Parse a printed number: thousands separators and a trailing `%` allowed.
pub fn parse_number(token: &str) -> Result<f64, ParseError> {
    let trimmed = token.trim();
    let body = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    let body = if THOUSANDS.is_match(body) {
        body.replace(',', "")
    } else {
        body.to_string()
    };

    if !NUMBER.is_match(&body) {
        return Err(ParseError::ParseMismatch(format!(
            "'{token}' is not a number"
        )));
    }
    body.parse::<f64>()
        .map_err(|e| ParseError::ParseMismatch(format!("'{token}': {e}")))
}

/// A value cell: sentinel first, then number.
pub fn parse_value(token: &str) -> Result<AnalyteValue, ParseError> {
    if let Some(value) = parse_sentinel(token) {
        return Ok(value);
    }
    parse_number(token).map(AnalyteValue::Measured)
}

/// A limit cell (LOD/LOQ). Sentinels and blanks carry no number.
pub fn parse_limit(token: &str) -> Option<f64> {
    if token.trim().is_empty() || parse_sentinel(token).is_some() {
        return None;
    }
    parse_number(token).ok()
}

/// True when a token can stand in a value column.
pub fn is_value_like(token: &str) -> bool {
    parse_value(token).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_map_to_fixed_convention() {
        let below_lod = AnalyteValue::BelowLimit(Limit::Detection);
        let below_loq = AnalyteValue::BelowLimit(Limit::Quantitation);
        assert_eq!(parse_value("ND").unwrap(), below_lod);
        assert_eq!(parse_value("nd").unwrap(), below_lod);
        assert_eq!(parse_value("< LOD").unwrap(), below_lod);
        assert_eq!(parse_value("<MDL").unwrap(), below_lod);
        assert_eq!(parse_value("<LOQ").unwrap(), below_loq);
        assert_eq!(parse_value(" < LOQ ").unwrap(), below_loq);
        assert_eq!(parse_value("BLQ").unwrap(), below_loq);
        assert_eq!(parse_value("Not Tested").unwrap(), AnalyteValue::NotReported);
        assert_eq!(parse_value("--").unwrap(), AnalyteValue::NotReported);
        assert_eq!(parse_value("N/A").unwrap(), AnalyteValue::NotApplicable);
    }

    #[test]
    fn numbers_accept_percent_separators_and_exponents() {
        assert_eq!(parse_number("21.3").unwrap(), 21.3);
        assert_eq!(parse_number("21.3%").unwrap(), 21.3);
        assert_eq!(parse_number("1,250.5").unwrap(), 1250.5);
        assert_eq!(parse_number("1.2E-3").unwrap(), 0.0012);
        assert_eq!(parse_number(".5").unwrap(), 0.5);
        assert_eq!(parse_number("0").unwrap(), 0.0);
    }

    #[test]
    fn malformed_cells_are_mismatch() {
        for bad in ["abc", "1,2", "1,2-Dichloroethane", "12.3.4", "", "%"] {
            let err = parse_number(bad).unwrap_err();
            assert_eq!(err.kind(), "parse_mismatch", "{bad}");
        }
    }

    #[test]
    fn limits_ignore_sentinels_and_blanks() {
        assert_eq!(parse_limit("0.05"), Some(0.05));
        assert_eq!(parse_limit("N/A"), None);
        assert_eq!(parse_limit(""), None);
        assert_eq!(parse_limit("junk"), None);
    }

    #[test]
    fn value_like_tokens() {
        assert!(is_value_like("0.35"));
        assert!(is_value_like("<LOQ"));
        assert!(!is_value_like("THCa"));
        assert!(!is_value_like("Delta-9"));
    }
}
