use crate::config::MAX_DOCUMENT_BYTES;
use crate::error::ParseError;
use crate::models::DocumentKind;

/// Bytes inspected when sniffing for markup.
const SNIFF_WINDOW: usize = 1024;

/// Detect document kind from magic bytes (NOT file extensions or URLs).
/// Magic bytes win over the file extension.
pub fn detect_kind(bytes: &[u8]) -> Option<DocumentKind> {
    let body = strip_bom(bytes);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let body = &body[start..];

    match body {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(DocumentKind::Pdf),
        [b'<', ..] if is_likely_html(body) => Some(DocumentKind::Html),
        _ => None,
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

/// Markup heuristic on the first kilobyte: an html/doctype/body/table tag.
fn is_likely_html(head: &[u8]) -> bool {
    let window = &head[..head.len().min(SNIFF_WINDOW)];
    let text = String::from_utf8_lossy(window).to_lowercase();
    ["<!doctype html", "<html", "<body", "<table", "<div", "<head"]
        .iter()
        .any(|tag| text.contains(tag))
}

/// Reject documents over the size limit before reading them fully.
pub fn check_size(len: u64) -> Result<(), ParseError> {
    if len > MAX_DOCUMENT_BYTES {
        return Err(ParseError::ParseMismatch(format!(
            "document is {len} bytes, limit is {MAX_DOCUMENT_BYTES}"
        )));
    }
    Ok(())
}

/// True when a URL's path names a PDF file.
pub fn is_pdf_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".pdf")
}

/// Printable text recovered from raw bytes when the PDF cannot be opened.
///
/// Uncompressed text operators and document metadata often survive, which is
/// enough to match a lab's text signature.
pub fn raw_text_hint(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .collect()
}
