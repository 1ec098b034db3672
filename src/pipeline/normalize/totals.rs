//! Category totals and overall status.

use std::collections::BTreeMap;

use crate::models::AnalyteResult;

/// Activated total = neutral form + weight × acidic precursor.
struct DecarbTotal {
    key: &'static str,
    neutral: &'static str,
    acid: &'static str,
}

const DECARB_TOTALS: &[DecarbTotal] = &[
    DecarbTotal {
        key: "total_thc",
        neutral: "delta_9_thc",
        acid: "thca",
    },
    DecarbTotal {
        key: "total_cbd",
        neutral: "cbd",
        acid: "cbda",
    },
];

/// Sum of member contributions; `None` when no member contributes.
fn sum_contributions<'a>(members: impl Iterator<Item = (&'a AnalyteResult, f64)>) -> Option<f64> {
    members
        .filter_map(|(result, weight)| result.value.aggregate_contribution().map(|v| v * weight))
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Compute totals from results. `acid_weight` is the decarboxylation
/// factor, or `None` for a plain sum. Printed totals override computed ones.
pub fn compute_totals(
    results: &[AnalyteResult],
    printed: &BTreeMap<String, f64>,
    acid_weight: Option<f64>,
) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    let weight = acid_weight.unwrap_or(1.0);

    for spec in DECARB_TOTALS {
        let members = results.iter().filter_map(|r| {
            if r.analysis != "cannabinoids" {
                None
            } else if r.key == spec.neutral {
                Some((r, 1.0))
            } else if r.key == spec.acid {
                Some((r, weight))
            } else {
                None
            }
        });
        if let Some(total) = sum_contributions(members) {
            totals.insert(spec.key.to_string(), round(total));
        }
    }

    let mut categories: Vec<&str> = Vec::new();
    for result in results {
        if !categories.contains(&result.analysis.as_str()) {
            categories.push(&result.analysis);
        }
    }
    for category in categories {
        let members = results
            .iter()
            .filter(|r| r.analysis == category)
            .map(|r| (r, 1.0));
        if let Some(total) = sum_contributions(members) {
            totals.insert(format!("total_{category}"), round(total));
        }
    }

    for (key, value) in printed {
        if let Some(computed) = totals.get(key) {
            if (computed - value).abs() > 0.01 {
                tracing::debug!(
                    total = %key,
                    computed,
                    printed = value,
                    "Printed total differs from computed"
                );
            }
        }
        totals.insert(key.clone(), *value);
    }

    totals
}

/// Round away float noise from weighted sums.
fn round(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// `fail` if any result failed, else `pass` if any passed, else the lab's
/// printed status, else nothing.
pub fn overall_status(results: &[AnalyteResult], printed: Option<&str>) -> Option<String> {
    let statuses: Vec<String> = results
        .iter()
        .filter_map(|r| r.status.as_deref())
        .map(|s| s.trim().to_lowercase())
        .collect();

    if statuses.iter().any(|s| s == "fail" || s == "failed") {
        return Some("fail".into());
    }
    if statuses.iter().any(|s| s == "pass" || s == "passed") {
        return Some("pass".into());
    }
    printed
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalyteValue, Limit};

    fn result(analysis: &str, key: &str, value: AnalyteValue, status: Option<&str>) -> AnalyteResult {
        AnalyteResult {
            analysis: analysis.into(),
            key: key.into(),
            name: key.into(),
            value,
            units: None,
            lod: None,
            loq: None,
            status: status.map(String::from),
        }
    }

    fn measured(key: &str, v: f64) -> AnalyteResult {
        result("cannabinoids", key, AnalyteValue::Measured(v), None)
    }

    #[test]
    fn total_thc_weights_acid() {
        let results = vec![measured("thca", 20.0), measured("delta_9_thc", 0.5)];
        let totals = compute_totals(&results, &BTreeMap::new(), Some(0.877));
        assert!((totals["total_thc"] - 18.04).abs() < 1e-9);
        assert!((totals["total_cannabinoids"] - 20.5).abs() < 1e-9);
        assert!(!totals.contains_key("total_cbd"));
    }

    #[test]
    fn unweighted_when_disabled() {
        let results = vec![measured("cbda", 10.0), measured("cbd", 1.0)];
        let totals = compute_totals(&results, &BTreeMap::new(), None);
        assert_eq!(totals["total_cbd"], 11.0);
    }

    #[test]
    fn below_limit_counts_zero_unreported_excluded() {
        let results = vec![
            result("cannabinoids", "cbd", AnalyteValue::BelowLimit(Limit::Quantitation), None),
            result("cannabinoids", "cbda", AnalyteValue::NotReported, None),
            result("pesticides", "bifenazate", AnalyteValue::NotReported, None),
        ];
        let totals = compute_totals(&results, &BTreeMap::new(), Some(0.877));
        assert_eq!(totals["total_cbd"], 0.0);
        assert!(!totals.contains_key("total_pesticides"));
    }

    #[test]
    fn printed_totals_win() {
        let results = vec![measured("thca", 20.0)];
        let printed = BTreeMap::from([("total_thc".to_string(), 17.9)]);
        let totals = compute_totals(&results, &printed, Some(0.877));
        assert_eq!(totals["total_thc"], 17.9);
    }

    #[test]
    fn status_precedence() {
        let pass = result("pesticides", "a", AnalyteValue::Measured(0.0), Some("Pass"));
        let fail = result("pesticides", "b", AnalyteValue::Measured(9.0), Some("FAIL"));
        assert_eq!(overall_status(&[pass.clone(), fail], Some("Pass")).as_deref(), Some("fail"));
        assert_eq!(overall_status(&[pass], None).as_deref(), Some("pass"));
        assert_eq!(overall_status(&[], Some(" Complete ")).as_deref(), Some("complete"));
        assert_eq!(overall_status(&[], Some("  ")), None);
    }
}
