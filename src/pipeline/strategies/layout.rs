//! Layout PDF strategy: crop pages into named regions and read each one.

use serde::{Deserialize, Serialize};

use super::rows::{parse_fields, parse_rows, Column};
use super::{ExtractionStrategy, RawExtraction, StrategyContext, StrategyInput};
use crate::error::ParseError;
use crate::models::{FractionalRect, StrategyFamily};

/// A named rectangle on one page, in page fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub name: String,
    #[serde(default)]
    pub page: usize,
    pub rect: FractionalRect,
}

impl RegionSpec {
    pub fn new(name: &str, page: usize, rect: FractionalRect) -> Self {
        Self {
            name: name.to_string(),
            page,
            rect,
        }
    }
}

/// A results table: where it is, which category it starts in, and how its
/// value-side columns are laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub category: String,
    pub region: RegionSpec,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSpec {
    /// Regions read as `Label: value` lines.
    pub field_regions: Vec<RegionSpec>,
    pub tables: Vec<TableSpec>,
}

pub struct LayoutPdfStrategy {
    spec: LayoutSpec,
}

impl LayoutPdfStrategy {
    pub fn new(spec: LayoutSpec) -> Self {
        Self { spec }
    }
}

impl ExtractionStrategy for LayoutPdfStrategy {
    fn family(&self) -> StrategyFamily {
        StrategyFamily::LayoutPdf
    }

    fn extract(
        &self,
        input: &StrategyInput<'_>,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<RawExtraction, ParseError> {
        let document = input.document().ok_or_else(|| {
            ParseError::ParseMismatch("layout extraction needs a loaded document".into())
        })?;
        if document.pages.is_empty() {
            return Err(ParseError::ParseMismatch("document has no pages".into()));
        }

        let mut extraction = RawExtraction {
            source_url: document.source_url().map(String::from),
            ..RawExtraction::default()
        };

        for region in &self.spec.field_regions {
            let Some(page) = document.page(region.page) else {
                tracing::debug!(region = %region.name, page = region.page, "Region page missing");
                continue;
            };
            let lines = page.text_in(&region.rect.to_rect(page.width, page.height));
            tracing::debug!(region = %region.name, lines = lines.len(), "Read field region");
            parse_fields(&lines, &mut extraction.fields);
        }

        for table in &self.spec.tables {
            let Some(page) = document.page(table.region.page) else {
                tracing::debug!(
                    region = %table.region.name,
                    page = table.region.page,
                    "Region page missing"
                );
                continue;
            };
            let lines = page.text_in(&table.region.rect.to_rect(page.width, page.height));
            let rows = parse_rows(
                &table.category,
                &lines,
                &table.columns,
                ctx.tables,
                &mut extraction.warnings,
            );
            tracing::debug!(region = %table.region.name, rows = rows.len(), "Read table region");
            extraction.rows.extend(rows);
        }

        if extraction.is_empty() {
            return Err(ParseError::ParseMismatch(
                "no fields or result rows in the layout regions".into(),
            ));
        }
        Ok(extraction)
    }
}
