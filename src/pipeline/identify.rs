//! Format identification: which lab or LIMS produced this document.
//!
//! First match in declaration order wins. Never fails: an unmatched document
//! is `Identification::Unknown` and the caller decides what to do with it.

use crate::models::{Document, LabIdentity};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Identification<'a> {
    Known(&'a LabIdentity),
    Unknown,
}

impl<'a> Identification<'a> {
    pub fn lab(&self) -> Option<&'a LabIdentity> {
        match self {
            Self::Known(lab) => Some(lab),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    fn or_else(self, next: impl FnOnce() -> Identification<'a>) -> Identification<'a> {
        match self {
            Self::Known(_) => self,
            Self::Unknown => next(),
        }
    }
}

pub fn identify_url<'a>(url: &str, labs: &'a [LabIdentity]) -> Identification<'a> {
    labs.iter()
        .find(|lab| lab.matches_url(url))
        .map_or(Identification::Unknown, Identification::Known)
}

pub fn identify_text<'a>(text: &str, labs: &'a [LabIdentity]) -> Identification<'a> {
    labs.iter()
        .find(|lab| lab.matches_text(text))
        .map_or(Identification::Unknown, Identification::Known)
}

/// Identify a loaded document: its URL first, then its full text.
pub fn identify_document<'a>(document: &Document, labs: &'a [LabIdentity]) -> Identification<'a> {
    let by_url = document
        .source_url()
        .map_or(Identification::Unknown, |url| identify_url(url, labs));

    let identification = by_url.or_else(|| identify_text(&document.full_text(), labs));

    match identification.lab() {
        Some(lab) => tracing::info!(
            source = %document.locator.describe(),
            lab = %lab.label,
            key = %lab.key,
            "Identified document"
        ),
        None => tracing::info!(
            source = %document.locator.describe(),
            "No lab signature matched"
        ),
    }
    identification
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Page;

    fn labs() -> Vec<LabIdentity> {
        vec![
            LabIdentity::new("Confident Cannabis", "confident_cannabis")
                .with_url("orders.confidentcannabis.com"),
            LabIdentity::new("TagLeaf LIMS", "tagleaf").with_url("lims.tagleaf.com"),
            LabIdentity::new("SC Labs", "sclabs")
                .with_url("client.sclabs.com")
                .with_text("SC Labs"),
            // Same text key as SC Labs but declared later
            LabIdentity::new("SC Labs (legacy)", "sclabs_legacy").with_text("SC Labs"),
        ]
    }

    #[test]
    fn url_substring_resolves() {
        let labs = labs();
        let id = identify_url("https://lims.tagleaf.com/coas/AB12", &labs);
        assert_eq!(id.lab().unwrap().key, "tagleaf");
    }

    #[test]
    fn first_declared_match_wins() {
        let labs = labs();
        let id = identify_text("Tested by SC Labs, Inc.", &labs);
        assert_eq!(id.lab().unwrap().key, "sclabs");
    }

    #[test]
    fn unknown_is_not_an_error() {
        let labs = labs();
        assert_eq!(
            identify_url("https://example.org/coa.pdf", &labs),
            Identification::Unknown
        );
        assert!(!identify_text("", &labs).is_known());
        assert!(!identify_text("anything", &[]).is_known());
    }

    #[test]
    fn document_url_checked_before_text() {
        let labs = labs();
        let mut doc = Document::remote("https://orders.confidentcannabis.com/report/public/1");
        doc.pages.push(Page::from_text(0, "SC Labs"));
        let id = identify_document(&doc, &labs);
        assert_eq!(id.lab().unwrap().key, "confident_cannabis");
    }

    #[test]
    fn document_text_used_when_url_unknown() {
        let labs = labs();
        let mut doc = Document::remote("https://cdn.example.com/files/9");
        doc.pages.push(Page::from_text(0, "Certificate\nSC Labs\nSanta Cruz"));
        let id = identify_document(&doc, &labs);
        assert_eq!(id.lab().unwrap().key, "sclabs");
    }
}
