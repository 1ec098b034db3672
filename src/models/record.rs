use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::enums::{Limit, Stage};

/// Lab-specific field name → extracted text. Scoped to one parse call.
pub type RawFieldMap = BTreeMap<String, String>;

/// One analyte row as a strategy found it, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResultRow {
    /// Raw analysis category label ("Cannabinoids", "Pesticides", ...).
    pub category: String,
    pub name: String,
    /// Value-side cells in canonical order `[value, lod, loq, status]`.
    /// Absent slots are empty; trailing empties are dropped.
    pub cells: Vec<String>,
    pub units: Option<String>,
}

/// Tri-state measured value. Zero and "not measured" are never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum AnalyteValue {
    Measured(f64),
    BelowLimit(Limit),
    NotReported,
    NotApplicable,
}

impl AnalyteValue {
    /// The numeric value, only when actually measured.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Measured(v) => Some(*v),
            _ => None,
        }
    }

    /// Contribution to an aggregate total: below-limit counts as zero,
    /// unreported members are excluded.
    pub fn aggregate_contribution(&self) -> Option<f64> {
        match self {
            Self::Measured(v) => Some(*v),
            Self::BelowLimit(_) => Some(0.0),
            Self::NotReported | Self::NotApplicable => None,
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Measured(_) => "measured",
            Self::BelowLimit(Limit::Detection) => "below_lod",
            Self::BelowLimit(Limit::Quantitation) => "below_loq",
            Self::NotReported => "not_reported",
            Self::NotApplicable => "not_applicable",
        }
    }
}

/// One measured analyte in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyteResult {
    /// Canonical analysis category ("cannabinoids", "pesticides", ...).
    pub analysis: String,
    /// Canonical analyte key, unique within `analysis`.
    pub key: String,
    /// Display name as printed by the lab.
    pub name: String,
    pub value: AnalyteValue,
    pub units: Option<String>,
    pub lod: Option<f64>,
    pub loq: Option<f64>,
    pub status: Option<String>,
}

impl AnalyteResult {
    fn to_flat(&self) -> Value {
        json!({
            "analysis": self.analysis,
            "key": self.key,
            "name": self.name,
            "value": self.value.as_number(),
            "value_status": self.value.status_label(),
            "units": self.units,
            "lod": self.lod,
            "loq": self.loq,
            "status": self.status,
        })
    }
}

/// Where a record came from and how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub source_url: Option<String>,
    pub parser_version: String,
    /// Dispatch key of the strategy that produced the raw data.
    pub strategy: String,
    /// Fallback stages visited, in order.
    pub stages: Vec<Stage>,
    pub parsed_at: DateTime<Utc>,
    /// Row/field problems recovered locally during parsing.
    pub warnings: Vec<String>,
}

/// Normalized output handed to the caller. The core never persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub sample_hash: String,
    pub content_hash: String,
    pub results_hash: String,
    pub lab: String,
    pub lab_key: String,
    pub producer: Option<String>,
    pub product_name: Option<String>,
    pub product_type: Option<String>,
    pub batch_number: Option<String>,
    pub sample_id: Option<String>,
    pub lab_results_url: Option<String>,
    /// ISO 8601 `YYYY-MM-DDTHH:MM:SS`.
    pub date_collected: Option<String>,
    pub date_received: Option<String>,
    pub date_tested: Option<String>,
    pub status: Option<String>,
    /// Analysis categories present, in first-seen order.
    pub analyses: Vec<String>,
    pub results: Vec<AnalyteResult>,
    pub totals: BTreeMap<String, f64>,
    /// Source fields with no canonical mapping, preserved verbatim.
    pub extra: BTreeMap<String, String>,
    pub provenance: Provenance,
}

impl CanonicalRecord {
    /// Flat key/value form with a nested `results` list.
    ///
    /// Extra fields never overwrite canonical keys.
    pub fn to_flat(&self) -> Map<String, Value> {
        let mut flat = Map::new();
        flat.insert("sample_hash".into(), json!(self.sample_hash));
        flat.insert("content_hash".into(), json!(self.content_hash));
        flat.insert("results_hash".into(), json!(self.results_hash));
        flat.insert("lab".into(), json!(self.lab));
        flat.insert("lab_key".into(), json!(self.lab_key));
        flat.insert("producer".into(), json!(self.producer));
        flat.insert("product_name".into(), json!(self.product_name));
        flat.insert("product_type".into(), json!(self.product_type));
        flat.insert("batch_number".into(), json!(self.batch_number));
        flat.insert("sample_id".into(), json!(self.sample_id));
        flat.insert("lab_results_url".into(), json!(self.lab_results_url));
        flat.insert("date_collected".into(), json!(self.date_collected));
        flat.insert("date_received".into(), json!(self.date_received));
        flat.insert("date_tested".into(), json!(self.date_tested));
        flat.insert("status".into(), json!(self.status));
        flat.insert("analyses".into(), json!(self.analyses));
        for (key, total) in &self.totals {
            flat.insert(key.clone(), json!(total));
        }
        flat.insert("source".into(), json!(self.provenance.source));
        flat.insert("source_url".into(), json!(self.provenance.source_url));
        flat.insert("parser_version".into(), json!(self.provenance.parser_version));
        flat.insert("strategy".into(), json!(self.provenance.strategy));
        flat.insert(
            "parsed_at".into(),
            json!(self.provenance.parsed_at.format("%Y-%m-%dT%H:%M:%S").to_string()),
        );
        for (key, value) in &self.extra {
            flat.entry(key.clone()).or_insert_with(|| json!(value));
        }
        flat.insert(
            "results".into(),
            Value::Array(self.results.iter().map(AnalyteResult::to_flat).collect()),
        );
        flat
    }
}
