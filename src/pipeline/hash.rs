//! Sample identity and change-detection hashes.
//!
//! The sample hash depends only on (producer, product, test date), so the
//! same physical sample hashes the same whether it was read from a PDF or a
//! hosted page. Content and results hashes cover the normalized data, never
//! provenance, so re-parsing identical input later gives identical hashes.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ParseError;
use crate::models::CanonicalRecord;

type HmacSha256 = Hmac<Sha256>;

/// Record keys left out of the content hash.
const EXCLUDED_KEYS: &[&str] = &["sample_hash", "content_hash", "results_hash", "provenance"];

/// Lowercase, whitespace runs collapsed to one space, trimmed.
pub fn normalize_component(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Provenance warning for a record whose identity has nothing to key on.
pub const ANONYMOUS_IDENTITY_WARNING: &str =
    "no producer, product name or test date: sample_hash is shared by every such record";

/// `YYYY-MM-DD` part of a date, trimmed.
fn date_salt(date_tested: Option<&str>) -> &str {
    date_tested
        .map(str::trim)
        .map(|d| d.get(..10).unwrap_or(d))
        .unwrap_or_default()
}

/// Keyed sample identity: HMAC-SHA256 of `product|YYYY-MM-DD` under the
/// producer name. Missing parts hash as empty strings.
pub fn sample_hash(
    producer: Option<&str>,
    product: Option<&str>,
    date_tested: Option<&str>,
) -> Result<String, ParseError> {
    let key = normalize_component(producer.unwrap_or_default());
    let message = format!(
        "{}|{}",
        normalize_component(product.unwrap_or_default()),
        date_salt(date_tested)
    );

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| ParseError::Hash(format!("HMAC key rejected: {e}")))?;
    mac.update(message.as_bytes());
    Ok(format!("{:x}", mac.finalize().into_bytes()))
}

/// True when producer, product and test date are all blank.
fn is_anonymous(record: &CanonicalRecord) -> bool {
    let blank = |part: Option<&str>| normalize_component(part.unwrap_or_default()).is_empty();
    blank(record.producer.as_deref())
        && blank(record.product_name.as_deref())
        && date_salt(record.date_tested.as_deref()).is_empty()
}

/// Sorted-key JSON with no insignificant whitespace.
fn write_canonical(value: &Value, out: &mut String) -> Result<(), ParseError> {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[*key], out)?;
            }
            out.push('}');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, ParseError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out.into_bytes())
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 over the record's canonical JSON, hashes and provenance excluded.
pub fn content_hash(record: &CanonicalRecord) -> Result<String, ParseError> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        for key in EXCLUDED_KEYS {
            map.remove(*key);
        }
    }
    Ok(sha256_hex(&canonical_bytes(&value)?))
}

/// SHA-256 over the canonical JSON of the results list alone.
pub fn results_hash(record: &CanonicalRecord) -> Result<String, ParseError> {
    let value = serde_json::to_value(&record.results)?;
    Ok(sha256_hex(&canonical_bytes(&value)?))
}

/// Fill in all three hashes. A record with no identity parts gets a
/// provenance warning so storage can decline to upsert on its sample hash.
pub fn seal(record: &mut CanonicalRecord) -> Result<(), ParseError> {
    record.sample_hash = sample_hash(
        record.producer.as_deref(),
        record.product_name.as_deref(),
        record.date_tested.as_deref(),
    )?;
    if is_anonymous(record) {
        tracing::warn!(source = %record.provenance.source, "Record has no identity parts");
        let warnings = &mut record.provenance.warnings;
        if !warnings.iter().any(|w| w == ANONYMOUS_IDENTITY_WARNING) {
            warnings.push(ANONYMOUS_IDENTITY_WARNING.to_string());
        }
    }
    record.results_hash = results_hash(record)?;
    record.content_hash = content_hash(record)?;
    tracing::debug!(
        sample_hash = %record.sample_hash,
        results = record.results.len(),
        "Sealed record"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalyteResult, AnalyteValue, Provenance, Stage};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn record() -> CanonicalRecord {
        CanonicalRecord {
            sample_hash: String::new(),
            content_hash: String::new(),
            results_hash: String::new(),
            lab: "SC Labs".into(),
            lab_key: "sclabs".into(),
            producer: Some("Grower Co".into()),
            product_name: Some("Blue Dream".into()),
            product_type: None,
            batch_number: Some("BD-0301".into()),
            sample_id: None,
            lab_results_url: None,
            date_collected: None,
            date_received: None,
            date_tested: Some("2024-03-01T00:00:00".into()),
            status: None,
            analyses: vec!["cannabinoids".into()],
            results: vec![AnalyteResult {
                analysis: "cannabinoids".into(),
                key: "thca".into(),
                name: "THCa".into(),
                value: AnalyteValue::Measured(21.3),
                units: Some("percent".into()),
                lod: None,
                loq: Some(0.05),
                status: None,
            }],
            totals: BTreeMap::from([("total_thc".to_string(), 18.6801)]),
            extra: BTreeMap::new(),
            provenance: Provenance {
                source: "coa.pdf".into(),
                source_url: None,
                parser_version: "0.1.0".into(),
                strategy: "sclabs".into(),
                stages: vec![Stage::LayoutPdf],
                parsed_at: Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap(),
                warnings: vec![],
            },
        }
    }

    #[test]
    fn sample_hash_ignores_case_spacing_and_time() {
        let a = sample_hash(Some("Grower Co"), Some("Blue Dream"), Some("2024-03-01T00:00:00")).unwrap();
        let b = sample_hash(Some("  grower   CO "), Some("BLUE dream"), Some("2024-03-01T14:30:00")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn sample_hash_is_keyed_by_producer() {
        let a = sample_hash(Some("Grower Co"), Some("Blue Dream"), Some("2024-03-01")).unwrap();
        let b = sample_hash(Some("Other Farm"), Some("Blue Dream"), Some("2024-03-01")).unwrap();
        let c = sample_hash(Some("Grower Co"), Some("Blue Dream"), Some("2024-03-02")).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let value = serde_json::json!({"b": 1, "a": {"d": [true, null], "c": "x"}});
        let bytes = canonical_bytes(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"c":"x","d":[true,null]},"b":1}"#
        );
    }

    #[test]
    fn content_hash_ignores_provenance() {
        let mut first = record();
        let mut second = record();
        second.provenance.parsed_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        second.provenance.stages.push(Stage::HostedPage);
        seal(&mut first).unwrap();
        seal(&mut second).unwrap();
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.results_hash, second.results_hash);

        // Sealing twice is stable: hash fields are excluded from the input.
        let before = first.content_hash.clone();
        seal(&mut first).unwrap();
        assert_eq!(first.content_hash, before);
    }

    #[test]
    fn field_change_moves_content_hash_only() {
        let mut first = record();
        let mut second = record();
        second.batch_number = Some("BD-0302".into());
        seal(&mut first).unwrap();
        seal(&mut second).unwrap();
        assert_ne!(first.content_hash, second.content_hash);
        assert_eq!(first.results_hash, second.results_hash);
        assert_eq!(first.sample_hash, second.sample_hash);
    }

    #[test]
    fn empty_identity_is_flagged_once() {
        let mut anonymous = record();
        anonymous.producer = None;
        anonymous.product_name = Some("   ".into());
        anonymous.date_tested = None;
        seal(&mut anonymous).unwrap();
        seal(&mut anonymous).unwrap();
        assert_eq!(anonymous.sample_hash.len(), 64);
        assert_eq!(
            anonymous.provenance.warnings,
            vec![ANONYMOUS_IDENTITY_WARNING.to_string()]
        );

        let mut named = record();
        named.producer = None;
        named.date_tested = None;
        seal(&mut named).unwrap();
        assert!(named.provenance.warnings.is_empty());
    }

    #[test]
    fn result_change_moves_results_hash() {
        let mut first = record();
        let mut second = record();
        second.results[0].value = AnalyteValue::Measured(21.4);
        seal(&mut first).unwrap();
        seal(&mut second).unwrap();
        assert_ne!(first.results_hash, second.results_hash);
    }
}
