//! Hosted-page strategy: fetch a lab's result page and read its DOM.
//!
//! Regions are located by CSS selector instead of coordinates. Given a PDF,
//! the embedded result-page reference is resolved first.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::rows::{assemble_row, split_field, Column};
use super::{ExtractionStrategy, RawExtraction, StrategyContext, StrategyInput};
use crate::error::ParseError;
use crate::models::{DocumentKind, StrategyFamily};

/// One results table on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedTableSpec {
    pub category: String,
    /// Selects each result row; the first `td` is the analyte name.
    pub row_selector: String,
    /// Layout of the cells after the name.
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedSpec {
    /// Selects each field container.
    pub field_selector: String,
    /// Label and value inside a container. Containers without them are
    /// read as `Label: value` text.
    pub label_selector: String,
    pub value_selector: String,
    pub tables: Vec<HostedTableSpec>,
}

struct CompiledTable {
    category: String,
    rows: Selector,
    columns: Vec<Column>,
}

pub struct HostedPageStrategy {
    fields: Selector,
    label: Selector,
    value: Selector,
    cell: Selector,
    tables: Vec<CompiledTable>,
}

fn compile(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector)
        .map_err(|e| ParseError::ParseMismatch(format!("invalid selector '{selector}': {e:?}")))
}

/// Element text with whitespace runs collapsed.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

impl HostedPageStrategy {
    /// Compile the spec's selectors. Invalid selectors are rejected here,
    /// not at extraction time.
    pub fn new(spec: &HostedSpec) -> Result<Self, ParseError> {
        let tables = spec
            .tables
            .iter()
            .map(|table| {
                Ok(CompiledTable {
                    category: table.category.clone(),
                    rows: compile(&table.row_selector)?,
                    columns: table.columns.clone(),
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(Self {
            fields: compile(&spec.field_selector)?,
            label: compile(&spec.label_selector)?,
            value: compile(&spec.value_selector)?,
            cell: compile("td")?,
            tables,
        })
    }

    /// Markup and its URL for the input, fetching when needed.
    fn resolve(
        &self,
        input: &StrategyInput<'_>,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<(String, Option<String>), ParseError> {
        let url = match input {
            StrategyInput::Document(document) => {
                if let Some(html) = &document.html {
                    return Ok((html.clone(), document.source_url().map(String::from)));
                }
                if document.kind == DocumentKind::Pdf {
                    let decoder = ctx.decoder.ok_or_else(|| {
                        ParseError::NotFound("no renderer to read the embedded reference".into())
                    })?;
                    decoder.find_reference_url(document, ctx.labs)?
                } else {
                    document
                        .source_url()
                        .map(String::from)
                        .ok_or_else(|| ParseError::NotFound("document has no result URL".into()))?
                }
            }
            StrategyInput::Url(url) => url.to_string(),
        };

        let body = ctx
            .session
            .session()?
            .fetch(&url, &ctx.options.headers, ctx.options.timeout)?;
        Ok((String::from_utf8_lossy(&body).into_owned(), Some(url)))
    }
}

impl ExtractionStrategy for HostedPageStrategy {
    fn family(&self) -> StrategyFamily {
        StrategyFamily::HostedPage
    }

    fn extract(
        &self,
        input: &StrategyInput<'_>,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<RawExtraction, ParseError> {
        let (html, source_url) = self.resolve(input, ctx)?;
        let page = Html::parse_document(&html);
        let mut extraction = RawExtraction {
            source_url,
            ..RawExtraction::default()
        };

        for container in page.select(&self.fields) {
            let label = container.select(&self.label).next().map(element_text);
            let value = container.select(&self.value).next().map(element_text);
            let pair = match (label, value) {
                (Some(label), Some(value)) if !label.is_empty() && !value.is_empty() => {
                    Some((label.trim_end_matches(':').trim().to_string(), value))
                }
                _ => split_field(&element_text(container)),
            };
            if let Some((label, value)) = pair {
                extraction.fields.entry(label).or_insert(value);
            }
        }

        for table in &self.tables {
            let mut count = 0;
            for row in page.select(&table.rows) {
                let cells: Vec<String> = row.select(&self.cell).map(element_text).collect();
                let Some((name, values)) = cells.split_first() else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }
                match assemble_row(&table.category, name, values, &table.columns) {
                    Ok(raw) => {
                        extraction.rows.push(raw);
                        count += 1;
                    }
                    Err(e) => {
                        tracing::warn!(category = %table.category, error = %e, "Skipped hosted row");
                        extraction.warnings.push(format!("row skipped: {e}"));
                    }
                }
            }
            tracing::debug!(category = %table.category, rows = count, "Read hosted table");
        }

        if extraction.is_empty() {
            return Err(ParseError::ParseMismatch(
                "hosted page has no recognizable fields or result rows".into(),
            ));
        }
        Ok(extraction)
    }
}
