//! Extraction strategies: one lab-specific way of turning a document or a
//! hosted result page into raw fields and rows.

pub mod builtin;
pub mod hosted;
pub mod layout;
pub mod rows;

pub use hosted::{HostedPageStrategy, HostedSpec, HostedTableSpec};
pub use layout::{LayoutPdfStrategy, LayoutSpec, RegionSpec, TableSpec};
pub use rows::Column;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::models::{Document, LabIdentity, RawFieldMap, RawResultRow, StrategyFamily};
use crate::pipeline::decode::ReferenceDecoder;
use crate::pipeline::dispatch::DispatchOptions;
use crate::pipeline::normalize::SynonymTables;
use crate::pipeline::session::SessionSlot;

/// What one strategy pulled out of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    pub fields: RawFieldMap,
    pub rows: Vec<RawResultRow>,
    /// Page the data was read from, when it came over the network.
    pub source_url: Option<String>,
    /// Row-level problems recovered during extraction.
    pub warnings: Vec<String>,
}

impl RawExtraction {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.rows.is_empty()
    }
}

/// A loaded document or a bare result-page URL.
#[derive(Debug, Clone, Copy)]
pub enum StrategyInput<'a> {
    Document(&'a Document),
    Url(&'a str),
}

impl<'a> StrategyInput<'a> {
    pub fn document(&self) -> Option<&'a Document> {
        match self {
            Self::Document(document) => Some(document),
            Self::Url(_) => None,
        }
    }

    pub fn url(&self) -> Option<&'a str> {
        match self {
            Self::Document(document) => document.source_url(),
            Self::Url(url) => Some(url),
        }
    }
}

/// Shared, read-only collaborators plus the caller's session.
pub struct StrategyContext<'a> {
    pub session: &'a mut SessionSlot,
    pub options: &'a DispatchOptions,
    pub tables: &'a SynonymTables,
    pub labs: &'a [LabIdentity],
    /// Present when PDF rendering is available.
    pub decoder: Option<&'a ReferenceDecoder<'a>>,
}

/// Single-operation extraction interface.
///
/// Implementations must not mutate the shared tables; everything they
/// learn goes into the returned `RawExtraction`.
pub trait ExtractionStrategy: Send + Sync {
    fn family(&self) -> StrategyFamily;

    fn extract(
        &self,
        input: &StrategyInput<'_>,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<RawExtraction, ParseError>;
}
