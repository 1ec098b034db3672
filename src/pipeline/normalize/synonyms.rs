//! Shared lookup tables: field, analyte, category and unit synonyms.
//!
//! Built once per parser and shared read-only. Keys are stored in
//! `snake_case_key` form so lookups tolerate punctuation and case.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical keys of the well-known record fields.
pub mod fields {
    pub const PRODUCER: &str = "producer";
    pub const PRODUCT_NAME: &str = "product_name";
    pub const PRODUCT_TYPE: &str = "product_type";
    pub const BATCH_NUMBER: &str = "batch_number";
    pub const SAMPLE_ID: &str = "sample_id";
    pub const LAB_RESULTS_URL: &str = "lab_results_url";
    pub const DATE_COLLECTED: &str = "date_collected";
    pub const DATE_RECEIVED: &str = "date_received";
    pub const DATE_TESTED: &str = "date_tested";
    pub const STATUS: &str = "status";
}

/// Lowercase `snake_case` form of a printed name.
///
/// `Δ9-THC` and `Delta-9 THC` both become `delta_9_thc`.
pub fn snake_case_key(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let expanded = lowered.replace('δ', "delta_").replace('Δ', "delta_");
    let expanded = match expanded.strip_prefix("delta-") {
        Some(rest) => format!("delta_{rest}"),
        None => expanded,
    };

    let mut key = String::with_capacity(expanded.len());
    let mut pending_separator = false;
    for c in expanded.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !key.is_empty() {
                key.push('_');
            }
            pending_separator = false;
            key.push(c);
        } else {
            pending_separator = true;
        }
    }
    key
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynonymTables {
    /// Printed field label → canonical field key.
    pub fields: HashMap<String, String>,
    /// Printed analyte name → canonical analyte key.
    pub analytes: HashMap<String, String>,
    /// Printed section heading → canonical analysis category.
    pub categories: HashMap<String, String>,
    /// Canonical category → default unit.
    pub units: HashMap<String, String>,
}

impl SynonymTables {
    pub fn with_field(mut self, printed: &str, canonical: &str) -> Self {
        self.fields
            .insert(snake_case_key(printed), canonical.to_string());
        self
    }

    pub fn with_analyte(mut self, printed: &str, canonical: &str) -> Self {
        self.analytes
            .insert(snake_case_key(printed), canonical.to_string());
        self
    }

    pub fn with_category(mut self, printed: &str, canonical: &str) -> Self {
        self.categories
            .insert(snake_case_key(printed), canonical.to_string());
        self
    }

    pub fn with_unit(mut self, category: &str, unit: &str) -> Self {
        self.units.insert(category.to_string(), unit.to_string());
        self
    }

    /// Canonical field key, if the label is known.
    pub fn canonical_field(&self, label: &str) -> Option<&str> {
        self.fields.get(&snake_case_key(label)).map(String::as_str)
    }

    /// Canonical analyte key; unknown names fall back to their snake_case form.
    pub fn analyte_key(&self, name: &str) -> String {
        let key = snake_case_key(name);
        self.analytes.get(&key).cloned().unwrap_or(key)
    }

    /// Canonical category for a printed heading, if known.
    pub fn canonical_category(&self, heading: &str) -> Option<&str> {
        self.categories
            .get(&snake_case_key(heading))
            .map(String::as_str)
    }

    /// Canonical category; unknown headings fall back to their snake_case form.
    pub fn category_key(&self, heading: &str) -> String {
        self.canonical_category(heading)
            .map(String::from)
            .unwrap_or_else(|| snake_case_key(heading))
    }

    pub fn default_unit(&self, category: &str) -> Option<&str> {
        self.units.get(category).map(String::as_str)
    }

    /// Tables covering the labels most COAs print.
    pub fn builtin() -> Self {
        let mut tables = Self::default();

        for (canonical, printed) in [
            (
                fields::PRODUCER,
                &["producer", "client", "cultivator", "licensee", "distributor", "grower", "manufacturer"][..],
            ),
            (
                fields::PRODUCT_NAME,
                &["product_name", "product", "sample_name", "sample", "strain", "item"][..],
            ),
            (
                fields::PRODUCT_TYPE,
                &["product_type", "matrix", "sample_type", "category", "type"][..],
            ),
            (
                fields::BATCH_NUMBER,
                &["batch_number", "batch", "batch_id", "lot", "lot_number", "lot_id"][..],
            ),
            (
                fields::SAMPLE_ID,
                &["sample_id", "lab_id", "lab_sample_id", "sample_number", "order_number"][..],
            ),
            (
                fields::LAB_RESULTS_URL,
                &["lab_results_url", "results_url", "coa_url", "verify_at"][..],
            ),
            (
                fields::DATE_COLLECTED,
                &["date_collected", "collected", "date_sampled", "sampled", "sampling_date"][..],
            ),
            (
                fields::DATE_RECEIVED,
                &["date_received", "received", "receipt_date"][..],
            ),
            (
                fields::DATE_TESTED,
                &[
                    "date_tested", "tested", "test_date", "date_completed", "completed",
                    "date_reported", "reported", "report_date",
                ][..],
            ),
            (
                fields::STATUS,
                &["status", "overall_result", "overall_status", "final_result"][..],
            ),
            ("total_thc", &["total_thc", "total_thc_content", "max_thc"][..]),
            ("total_cbd", &["total_cbd", "total_cbd_content", "max_cbd"][..]),
            ("total_cannabinoids", &["total_cannabinoids"][..]),
            ("total_terpenes", &["total_terpenes"][..]),
            ("moisture", &["moisture", "moisture_content"][..]),
            ("water_activity", &["water_activity"][..]),
        ] {
            for label in printed {
                tables = tables.with_field(label, canonical);
            }
        }

        for (canonical, printed) in [
            ("delta_9_thc", &["delta_9_thc", "d9_thc", "thc", "delta9_thc", "d9"][..]),
            ("thca", &["thca", "thc_a", "delta_9_thca", "thca_a", "tetrahydrocannabinolic_acid"][..]),
            ("delta_8_thc", &["delta_8_thc", "d8_thc", "delta8_thc"][..]),
            ("cbd", &["cbd", "cannabidiol"][..]),
            ("cbda", &["cbda", "cbd_a", "cannabidiolic_acid"][..]),
            ("cbg", &["cbg", "cannabigerol"][..]),
            ("cbga", &["cbga", "cbg_a", "cannabigerolic_acid"][..]),
            ("cbn", &["cbn", "cannabinol"][..]),
            ("cbc", &["cbc", "cannabichromene"][..]),
            ("thcv", &["thcv", "tetrahydrocannabivarin"][..]),
            ("cbdv", &["cbdv", "cannabidivarin"][..]),
            ("beta_myrcene", &["beta_myrcene", "b_myrcene", "myrcene"][..]),
            ("beta_caryophyllene", &["beta_caryophyllene", "b_caryophyllene", "caryophyllene"][..]),
            ("d_limonene", &["d_limonene", "limonene"][..]),
            ("alpha_pinene", &["alpha_pinene", "a_pinene"][..]),
            ("linalool", &["linalool"][..]),
        ] {
            for name in printed {
                tables = tables.with_analyte(name, canonical);
            }
        }

        for (canonical, printed) in [
            ("cannabinoids", &["cannabinoids", "potency", "cannabinoid_profile", "cannabinoid_analysis"][..]),
            ("terpenes", &["terpenes", "terpene_profile", "terpene_analysis"][..]),
            ("pesticides", &["pesticides", "residual_pesticides", "pesticide_analysis"][..]),
            ("residual_solvents", &["residual_solvents", "solvents"][..]),
            ("heavy_metals", &["heavy_metals", "metals"][..]),
            ("microbials", &["microbials", "microbiology", "microbiological_contaminants"][..]),
            ("mycotoxins", &["mycotoxins"][..]),
        ] {
            for heading in printed {
                tables = tables.with_category(heading, canonical);
            }
        }

        tables
            .with_unit("cannabinoids", "percent")
            .with_unit("terpenes", "percent")
            .with_unit("pesticides", "ug/g")
            .with_unit("residual_solvents", "ug/g")
            .with_unit("heavy_metals", "ug/g")
            .with_unit("microbials", "cfu/g")
            .with_unit("mycotoxins", "ug/kg")
    }
}
