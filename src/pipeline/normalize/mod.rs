//! Raw extraction → canonical record.
//!
//! Field names go through the synonym tables, dates to ISO 8601, sentinel
//! cells to the tri-state value, and totals are filled in when the lab did
//! not print them. Row-level problems are recorded as warnings and the row
//! is skipped; they never abort the document.

pub mod dates;
pub mod synonyms;
pub mod totals;
pub mod values;

pub use dates::parse_date;
pub use synonyms::{snake_case_key, SynonymTables};
pub use values::{is_value_like, parse_limit, parse_number, parse_sentinel, parse_value};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::config::ParserConfig;
use crate::models::{AnalyteResult, AnalyteValue, CanonicalRecord, LabIdentity, Provenance};
use crate::pipeline::strategies::RawExtraction;
use synonyms::fields;

/// Well-known single-value fields, in the order they are filled.
const WELL_KNOWN: &[&str] = &[
    fields::PRODUCER,
    fields::PRODUCT_NAME,
    fields::PRODUCT_TYPE,
    fields::BATCH_NUMBER,
    fields::SAMPLE_ID,
    fields::LAB_RESULTS_URL,
    fields::DATE_COLLECTED,
    fields::DATE_RECEIVED,
    fields::DATE_TESTED,
    fields::STATUS,
];

const DATE_FIELDS: &[&str] = &[
    fields::DATE_COLLECTED,
    fields::DATE_RECEIVED,
    fields::DATE_TESTED,
];

pub struct Normalizer {
    tables: Arc<SynonymTables>,
    acid_weight: Option<f64>,
}

impl Normalizer {
    pub fn new(tables: Arc<SynonymTables>, config: &ParserConfig) -> Self {
        Self {
            tables,
            acid_weight: config.decarb_weighting.then_some(config.decarb_factor),
        }
    }

    pub fn tables(&self) -> &SynonymTables {
        &self.tables
    }

    /// Build the record body. Hash fields are left empty for the hasher.
    pub fn normalize(
        &self,
        raw: RawExtraction,
        lab: &LabIdentity,
        mut provenance: Provenance,
    ) -> CanonicalRecord {
        let mut warnings = raw.warnings;
        let mut known: BTreeMap<&'static str, String> = BTreeMap::new();
        let mut printed_totals: BTreeMap<String, f64> = BTreeMap::new();
        let mut extra: BTreeMap<String, String> = BTreeMap::new();

        for (label, value) in &raw.fields {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match self.tables.canonical_field(label) {
                Some(canonical) if canonical.starts_with("total_") => {
                    match parse_number(value) {
                        Ok(total) => {
                            printed_totals.entry(canonical.to_string()).or_insert(total);
                        }
                        Err(e) => warn(&mut warnings, format!("field '{label}': {e}")),
                    }
                }
                Some(canonical) => match WELL_KNOWN.iter().find(|k| **k == canonical) {
                    Some(key) => {
                        known.entry(*key).or_insert_with(|| value.to_string());
                    }
                    None => {
                        extra
                            .entry(canonical.to_string())
                            .or_insert_with(|| value.to_string());
                    }
                },
                // Unmapped labels pass through unchanged.
                None => {
                    extra
                        .entry(label.clone())
                        .or_insert_with(|| value.to_string());
                }
            }
        }

        for field in DATE_FIELDS {
            if let Some(printed) = known.remove(field) {
                match parse_date(&printed) {
                    Some(iso) => {
                        known.insert(*field, iso);
                    }
                    None => warn(
                        &mut warnings,
                        format!("{field}: unrecognized date '{printed}'"),
                    ),
                }
            }
        }

        let mut results: Vec<AnalyteResult> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for row in &raw.rows {
            let analysis = self.tables.category_key(&row.category);
            let key = self.tables.analyte_key(&row.name);
            if key.is_empty() || analysis.is_empty() {
                warn(&mut warnings, format!("row '{}': no usable name", row.name));
                continue;
            }

            let cell = |i: usize| row.cells.get(i).map(|c| c.trim()).unwrap_or("");
            let value = match parse_value(cell(0)) {
                Ok(value) => value,
                Err(e) => {
                    warn(&mut warnings, format!("row '{}': {e}", row.name));
                    continue;
                }
            };

            if key.starts_with("total_") {
                if let AnalyteValue::Measured(total) = value {
                    printed_totals.entry(key).or_insert(total);
                }
                continue;
            }

            if !seen.insert((analysis.clone(), key.clone())) {
                warn(
                    &mut warnings,
                    format!("duplicate {analysis} analyte '{key}' dropped"),
                );
                continue;
            }

            let units = row
                .units
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .or_else(|| self.tables.default_unit(&analysis).map(String::from));
            let status = Some(cell(3)).filter(|s| !s.is_empty()).map(String::from);

            results.push(AnalyteResult {
                analysis,
                key,
                name: row.name.trim().to_string(),
                value,
                units,
                lod: parse_limit(cell(1)),
                loq: parse_limit(cell(2)),
                status,
            });
        }

        let mut analyses: Vec<String> = Vec::new();
        for result in &results {
            if !analyses.contains(&result.analysis) {
                analyses.push(result.analysis.clone());
            }
        }

        let totals = totals::compute_totals(&results, &printed_totals, self.acid_weight);
        let status = totals::overall_status(&results, known.get(fields::STATUS).map(String::as_str));

        let mut take = |key: &str| known.remove(key);
        let lab_results_url = take(fields::LAB_RESULTS_URL).or_else(|| raw.source_url.clone());

        if provenance.source_url.is_none() {
            provenance.source_url = raw.source_url.clone();
        }
        provenance.warnings.extend(warnings);

        CanonicalRecord {
            sample_hash: String::new(),
            content_hash: String::new(),
            results_hash: String::new(),
            lab: lab.label.clone(),
            lab_key: lab.key.clone(),
            producer: take(fields::PRODUCER),
            product_name: take(fields::PRODUCT_NAME),
            product_type: take(fields::PRODUCT_TYPE),
            batch_number: take(fields::BATCH_NUMBER),
            sample_id: take(fields::SAMPLE_ID),
            lab_results_url,
            date_collected: take(fields::DATE_COLLECTED),
            date_received: take(fields::DATE_RECEIVED),
            date_tested: take(fields::DATE_TESTED),
            status,
            analyses,
            results,
            totals,
            extra,
            provenance,
        }
    }
}

fn warn(warnings: &mut Vec<String>, message: String) {
    tracing::warn!(warning = %message, "Recovered from malformed input");
    warnings.push(message);
}
