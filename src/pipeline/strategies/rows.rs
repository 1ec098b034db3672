//! Line-level parsing shared by the strategies: `label: value` fields and
//! analyte rows split at a value-like token.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::models::{RawFieldMap, RawResultRow};
use crate::pipeline::normalize::{is_value_like, SynonymTables};

/// Longest plausible field label, in characters.
const MAX_LABEL_CHARS: usize = 40;

/// Unit tokens recognized in printed rows.
const UNIT_TOKENS: &[&str] = &[
    "%", "mg/g", "mg/kg", "ug/g", "µg/g", "μg/g", "ug/kg", "µg/kg", "μg/kg", "ppm", "ppb",
    "cfu/g", "mg/ml", "mg/unit", "mg/serving", "mg/pkg", "aw",
];

/// What a printed column holds, in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Value,
    Lod,
    Loq,
    /// Action limit or other number the record does not keep.
    Limit,
    Units,
    Status,
}

impl Column {
    fn is_numeric(self) -> bool {
        matches!(self, Self::Value | Self::Lod | Self::Loq | Self::Limit)
    }

    /// Position in `RawResultRow::cells`.
    fn slot(self) -> Option<usize> {
        match self {
            Self::Value => Some(0),
            Self::Lod => Some(1),
            Self::Loq => Some(2),
            Self::Status => Some(3),
            Self::Limit | Self::Units => None,
        }
    }
}

/// Split `Label: value`. Clock times (`10:30`) are not labels.
pub fn split_field(line: &str) -> Option<(String, String)> {
    let (label, value) = line.split_once(':')?;
    let label = label.trim();
    let value = value.trim();
    if label.is_empty()
        || value.is_empty()
        || label.chars().count() > MAX_LABEL_CHARS
        || !label.chars().any(char::is_alphabetic)
    {
        return None;
    }
    Some((label.to_string(), value.to_string()))
}

/// Fields from `Label: value` lines. The first occurrence of a label wins.
pub fn parse_fields<S: AsRef<str>>(lines: &[S], fields: &mut RawFieldMap) {
    for line in lines {
        if let Some((label, value)) = split_field(line.as_ref()) {
            fields.entry(label).or_insert(value);
        }
    }
}

pub fn is_unit_token(token: &str) -> bool {
    UNIT_TOKENS.iter().any(|u| u.eq_ignore_ascii_case(token))
}

/// Join split sentinel spellings (`< LOQ`, `Not Tested`) into single tokens.
fn merge_sentinel_tokens(line: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut words = line.split_whitespace().peekable();
    while let Some(word) = words.next() {
        let merged = match (word, words.peek()) {
            ("<", Some(next)) => Some(format!("<{next}")),
            (w, Some(next)) if w.eq_ignore_ascii_case("not") && next.eq_ignore_ascii_case("tested") => {
                Some(format!("{w} {next}"))
            }
            _ => None,
        };
        match merged {
            Some(token) => {
                words.next();
                tokens.push(token);
            }
            None => tokens.push(word.to_string()),
        }
    }
    tokens
}

/// Build a raw row from its name and value-side cells laid out as `columns`.
///
/// Fails when there are fewer numeric cells than the layout expects or a
/// numeric column holds a non-value token.
pub fn assemble_row(
    category: &str,
    name: &str,
    cells: &[String],
    columns: &[Column],
) -> Result<RawResultRow, ParseError> {
    let mut slots: [String; 4] = Default::default();
    let mut units: Option<String> = None;
    let mut remaining = cells.iter().map(|c| c.trim());
    let mut numeric_seen = 0;

    for column in columns {
        let Some(cell) = remaining.next() else {
            if column.is_numeric() {
                return Err(ParseError::ParseMismatch(format!(
                    "'{name}' has {numeric_seen} numeric cells, layout expects more"
                )));
            }
            break;
        };
        if column.is_numeric() {
            if !is_value_like(cell) {
                return Err(ParseError::ParseMismatch(format!(
                    "'{name}': '{cell}' in a numeric column"
                )));
            }
            numeric_seen += 1;
        }
        if *column == Column::Units && !cell.is_empty() {
            units = Some(cell.to_string());
        }
        if let Some(slot) = column.slot() {
            slots[slot] = cell.to_string();
        }
    }

    if units.is_none() && slots[0].ends_with('%') {
        units = Some("%".into());
    }

    let mut cells: Vec<String> = slots.into_iter().collect();
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }

    Ok(RawResultRow {
        category: category.to_string(),
        name: name.trim().to_string(),
        cells,
        units,
    })
}

/// Cells a text row can fill once unit tokens are pulled out.
fn text_capacity(columns: &[Column]) -> usize {
    columns.iter().filter(|c| **c != Column::Units).count()
}

/// Name and value cells when the line is split before `tokens[split]`.
fn split_at(tokens: &[String], split: usize) -> (String, Vec<String>, Option<String>) {
    let mut units = None;
    let cells = tokens[split..]
        .iter()
        .filter(|t| {
            if is_unit_token(t) {
                units.get_or_insert_with(|| t.to_string());
                false
            } else {
                true
            }
        })
        .cloned()
        .collect();
    (tokens[..split].join(" "), cells, units)
}

/// Parse table lines into rows.
///
/// The analyte name runs up to the first value-like token whose remaining
/// cells fit the layout, so a number inside a name (`Delta 9 THC`) stays in
/// the name. A heading that names a known category switches the current
/// category. A line with no value token after a parsed row is a wrapped name
/// carried into the next row; before any row it is a header and skipped.
/// Rows that fit no split are skipped with a warning, never zero-filled.
pub fn parse_rows<S: AsRef<str>>(
    category: &str,
    lines: &[S],
    columns: &[Column],
    tables: &SynonymTables,
    warnings: &mut Vec<String>,
) -> Vec<RawResultRow> {
    let mut rows = Vec::new();
    let mut current = category.to_string();
    let mut wrapped: Option<String> = None;
    let capacity = text_capacity(columns);

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        if let Some(heading) = tables.canonical_category(line) {
            current = heading.to_string();
            wrapped = None;
            continue;
        }

        let tokens = merge_sentinel_tokens(line);
        let splits: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| is_value_like(t))
            .map(|(i, _)| i)
            .collect();
        let Some(&first) = splits.first() else {
            if !rows.is_empty() {
                wrapped = Some(match wrapped.take() {
                    Some(prefix) => format!("{prefix} {line}"),
                    None => line.to_string(),
                });
            }
            continue;
        };
        if first == 0 {
            warn(warnings, format!("row without analyte name skipped: '{line}'"));
            continue;
        }

        let prefix = wrapped.take();
        let mut last_err = None;
        let mut parsed = None;
        for &split in &splits {
            let (name, cells, units) = split_at(&tokens, split);
            if cells.len() > capacity {
                last_err = Some(ParseError::ParseMismatch(format!(
                    "'{line}' has {} cells, layout holds {capacity}",
                    cells.len()
                )));
                continue;
            }
            let name = match &prefix {
                Some(prefix) => format!("{prefix} {name}"),
                None => name,
            };
            match assemble_row(&current, &name, &cells, columns) {
                Ok(mut row) => {
                    if units.is_some() {
                        row.units = units;
                    }
                    parsed = Some(row);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }

        match (parsed, last_err) {
            (Some(row), _) => rows.push(row),
            (None, Some(e)) => warn(warnings, format!("row skipped: {e}")),
            (None, None) => {}
        }
    }

    if let Some(orphan) = wrapped {
        warn(warnings, format!("trailing text after last row ignored: '{orphan}'"));
    }
    rows
}

fn warn(warnings: &mut Vec<String>, message: String) {
    tracing::warn!(warning = %message, "Recovered from malformed row");
    warnings.push(message);
}
