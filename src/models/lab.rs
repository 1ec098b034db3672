use serde::{Deserialize, Serialize};

/// One way of recognizing a lab's documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Signature {
    /// Case-insensitive substring of the document or result-page URL.
    UrlSubstring(String),
    /// Literal text printed on the document (lab name, LIMS footer).
    TextKey(String),
}

/// A lab or LIMS the parser knows how to recognize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabIdentity {
    /// Display label, e.g. "SC Labs".
    pub label: String,
    /// Key into the strategy registry.
    pub key: String,
    pub signatures: Vec<Signature>,
}

impl LabIdentity {
    pub fn new(label: &str, key: &str) -> Self {
        Self {
            label: label.to_string(),
            key: key.to_string(),
            signatures: Vec::new(),
        }
    }

    pub fn with_url(mut self, fragment: &str) -> Self {
        self.signatures
            .push(Signature::UrlSubstring(fragment.to_string()));
        self
    }

    pub fn with_text(mut self, key: &str) -> Self {
        self.signatures.push(Signature::TextKey(key.to_string()));
        self
    }

    pub fn matches_url(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.signatures.iter().any(|s| match s {
            Signature::UrlSubstring(fragment) => {
                !fragment.is_empty() && lower.contains(&fragment.to_lowercase())
            }
            Signature::TextKey(_) => false,
        })
    }

    pub fn matches_text(&self, text: &str) -> bool {
        self.signatures.iter().any(|s| match s {
            Signature::TextKey(key) => !key.is_empty() && text.contains(key.as_str()),
            // Printed result links count as text evidence too.
            Signature::UrlSubstring(fragment) => {
                !fragment.is_empty() && text.to_lowercase().contains(&fragment.to_lowercase())
            }
        })
    }
}
