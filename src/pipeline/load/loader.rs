use std::path::Path;
use std::sync::Arc;

use scraper::{Html, Node};

use super::format::{check_size, detect_kind};
use super::PdfBackend;
use crate::error::ParseError;
use crate::models::{Document, DocumentKind, Page, SourceLocator};

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Load a document from a filesystem path.
pub fn load_path(path: &Path, backend: &dyn PdfBackend) -> Result<Document, ParseError> {
    let metadata = std::fs::metadata(path)?;
    check_size(metadata.len())?;
    let bytes: Arc<[u8]> = std::fs::read(path)?.into();
    build_document(SourceLocator::Path(path.to_path_buf()), None, bytes, backend)
}

/// Load a document held in memory.
pub fn load_bytes(bytes: Arc<[u8]>, backend: &dyn PdfBackend) -> Result<Document, ParseError> {
    check_size(bytes.len() as u64)?;
    build_document(SourceLocator::Bytes(bytes.clone()), None, bytes, backend)
}

/// Load a document fetched from `url`.
pub fn load_fetched(
    url: &str,
    bytes: Vec<u8>,
    backend: &dyn PdfBackend,
) -> Result<Document, ParseError> {
    check_size(bytes.len() as u64)?;
    build_document(
        SourceLocator::Url(url.to_string()),
        Some(url.to_string()),
        bytes.into(),
        backend,
    )
}

fn build_document(
    locator: SourceLocator,
    url: Option<String>,
    bytes: Arc<[u8]>,
    backend: &dyn PdfBackend,
) -> Result<Document, ParseError> {
    match detect_kind(&bytes) {
        Some(DocumentKind::Pdf) => {
            let pages = backend.load_pages(&bytes)?;
            tracing::debug!(
                source = %locator.describe(),
                pages = pages.len(),
                "Loaded PDF document"
            );
            let mut document = Document::pdf(locator, bytes, pages);
            if document.url.is_none() {
                document.url = url;
            }
            Ok(document)
        }
        Some(DocumentKind::Html) => {
            let html = String::from_utf8_lossy(&bytes).into_owned();
            Ok(html_document(locator, url, html))
        }
        None => Err(ParseError::ParseMismatch(format!(
            "{} is neither a PDF nor an HTML document",
            locator.describe()
        ))),
    }
}

/// Wrap fetched markup as a one-page document of its visible text.
pub fn html_document(locator: SourceLocator, url: Option<String>, html: String) -> Document {
    let page = Page::from_text(0, &visible_text(&html));
    Document::html(locator, url, html, vec![page])
}

/// Visible text of an HTML document, one text node per line.
pub fn visible_text(html: &str) -> String {
    let parsed = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in parsed.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    lines.join("\n")
}
