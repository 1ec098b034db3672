use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::enums::DocumentKind;

/// Nominal page width used when a page only has text and no geometry.
const TEXT_PAGE_WIDTH: f32 = 612.0;

/// Nominal line height used when a page only has text and no geometry.
const TEXT_LINE_HEIGHT: f32 = 14.0;

/// Where a document comes from.
#[derive(Clone, PartialEq)]
pub enum SourceLocator {
    Path(PathBuf),
    Url(String),
    Bytes(Arc<[u8]>),
}

impl SourceLocator {
    /// Classify a caller-supplied string as URL or filesystem path.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            _ => None,
        }
    }

    /// Human-readable description recorded in provenance.
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
            Self::Bytes(bytes) => format!("<memory:{} bytes>", bytes.len()),
        }
    }
}

impl fmt::Debug for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

impl From<Vec<u8>> for SourceLocator {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

/// Axis-aligned rectangle in PDF points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    pub fn scale(&self, factor: f32) -> Rect {
        Rect {
            left: self.left * factor,
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
        }
    }
}

/// Region expressed as fractions (0.0-1.0) of the page size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionalRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl FractionalRect {
    pub const FULL: FractionalRect = FractionalRect {
        left: 0.0,
        top: 0.0,
        right: 1.0,
        bottom: 1.0,
    };

    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn to_rect(&self, page_width: f32, page_height: f32) -> Rect {
        Rect::new(
            self.left.clamp(0.0, 1.0) * page_width,
            self.top.clamp(0.0, 1.0) * page_height,
            self.right.clamp(0.0, 1.0) * page_width,
            self.bottom.clamp(0.0, 1.0) * page_height,
        )
    }
}

/// A positioned run of text on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub text: String,
    pub rect: Rect,
}

/// Bounding box of an image object drawn on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedImage {
    pub index: usize,
    pub rect: Rect,
}

/// One logical page or screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 0-based position in the document.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    /// Reading-order lines reconstructed from `boxes`.
    pub lines: Vec<String>,
    pub boxes: Vec<TextBox>,
    pub images: Vec<EmbeddedImage>,
}

impl Page {
    pub fn from_boxes(
        index: usize,
        width: f32,
        height: f32,
        boxes: Vec<TextBox>,
        images: Vec<EmbeddedImage>,
    ) -> Self {
        let lines = group_lines(boxes.iter());
        Self {
            index,
            width,
            height,
            lines,
            boxes,
            images,
        }
    }

    /// Build a page from plain text (HTML body, OCR without geometry).
    ///
    /// Each line gets a synthetic full-width box stacked top to bottom so
    /// fractional region cropping still selects roughly the right lines.
    pub fn from_text(index: usize, text: &str) -> Self {
        let boxes: Vec<TextBox> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .enumerate()
            .map(|(i, line)| TextBox {
                text: line.to_string(),
                rect: Rect::new(
                    0.0,
                    i as f32 * TEXT_LINE_HEIGHT,
                    TEXT_PAGE_WIDTH,
                    (i + 1) as f32 * TEXT_LINE_HEIGHT,
                ),
            })
            .collect();
        let height = (boxes.len().max(1)) as f32 * TEXT_LINE_HEIGHT;
        Self::from_boxes(index, TEXT_PAGE_WIDTH, height, boxes, Vec::new())
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Lines made of the boxes whose center falls inside `rect`.
    pub fn text_in(&self, rect: &Rect) -> Vec<String> {
        group_lines(self.boxes.iter().filter(|b| {
            let (x, y) = b.rect.center();
            rect.contains_point(x, y)
        }))
    }

    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }
}

/// Group boxes into lines by vertical proximity, then order each line left to right.
fn group_lines<'a>(boxes: impl Iterator<Item = &'a TextBox>) -> Vec<String> {
    let mut sorted: Vec<&TextBox> = boxes.filter(|b| !b.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| {
        let (ax, ay) = a.rect.center();
        let (bx, by) = b.rect.center();
        ay.partial_cmp(&by)
            .unwrap_or(Ordering::Equal)
            .then(ax.partial_cmp(&bx).unwrap_or(Ordering::Equal))
    });

    let mut grouped: Vec<(f32, f32, Vec<&TextBox>)> = Vec::new();
    for text_box in sorted {
        let (_, cy) = text_box.rect.center();
        match grouped.last_mut() {
            Some((line_cy, tolerance, members)) if (cy - *line_cy).abs() <= *tolerance => {
                members.push(text_box);
            }
            _ => {
                let tolerance = (text_box.rect.height() * 0.5).max(1.0);
                grouped.push((cy, tolerance, vec![text_box]));
            }
        }
    }

    grouped
        .into_iter()
        .map(|(_, _, mut members)| {
            members.sort_by(|a, b| {
                a.rect
                    .left
                    .partial_cmp(&b.rect.left)
                    .unwrap_or(Ordering::Equal)
            });
            members
                .iter()
                .map(|b| b.text.trim())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// A loaded document. Transient: created at parse start, dropped after.
#[derive(Debug, Clone)]
pub struct Document {
    pub locator: SourceLocator,
    pub kind: DocumentKind,
    /// URL the content was fetched from, if any.
    pub url: Option<String>,
    pub pdf_bytes: Option<Arc<[u8]>>,
    pub html: Option<String>,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn pdf(locator: SourceLocator, bytes: Arc<[u8]>, pages: Vec<Page>) -> Self {
        let url = locator.url().map(String::from);
        Self {
            locator,
            kind: DocumentKind::Pdf,
            url,
            pdf_bytes: Some(bytes),
            html: None,
            pages,
        }
    }

    pub fn html(locator: SourceLocator, url: Option<String>, html: String, pages: Vec<Page>) -> Self {
        Self {
            locator,
            kind: DocumentKind::Html,
            url,
            pdf_bytes: None,
            html: Some(html),
            pages,
        }
    }

    /// A hosted page that has not been fetched yet.
    pub fn remote(url: &str) -> Self {
        Self {
            locator: SourceLocator::Url(url.to_string()),
            kind: DocumentKind::Html,
            url: Some(url.to_string()),
            pdf_bytes: None,
            html: None,
            pages: Vec::new(),
        }
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(Page::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn source_url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_box(text: &str, left: f32, top: f32) -> TextBox {
        TextBox {
            text: text.into(),
            rect: Rect::new(left, top, left + 40.0, top + 10.0),
        }
    }

    #[test]
    fn locator_parse_classifies_urls() {
        assert!(matches!(
            SourceLocator::parse("https://lims.example.com/coa/123"),
            SourceLocator::Url(_)
        ));
        assert!(matches!(
            SourceLocator::parse("HTTP://lab.example.com"),
            SourceLocator::Url(_)
        ));
        assert!(matches!(
            SourceLocator::parse("/tmp/coa.pdf"),
            SourceLocator::Path(_)
        ));
    }

    #[test]
    fn bytes_locator_debug_elides_content() {
        let locator = SourceLocator::from(vec![0u8; 2048]);
        assert_eq!(format!("{locator:?}"), "Bytes(2048 bytes)");
        assert_eq!(locator.describe(), "<memory:2048 bytes>");
    }

    #[test]
    fn rect_new_normalizes_corners() {
        let rect = Rect::new(100.0, 50.0, 10.0, 5.0);
        assert_eq!(rect.left, 10.0);
        assert_eq!(rect.top, 5.0);
        assert_eq!(rect.width(), 90.0);
        assert_eq!(rect.height(), 45.0);
    }

    #[test]
    fn fractional_rect_scales_and_clamps() {
        let frac = FractionalRect::new(0.5, -0.2, 1.4, 0.5);
        let rect = frac.to_rect(600.0, 800.0);
        assert_eq!(rect, Rect::new(300.0, 0.0, 600.0, 400.0));
    }

    #[test]
    fn boxes_group_into_reading_order_lines() {
        let boxes = vec![
            text_box("Value", 200.0, 100.5),
            text_box("Analyte", 20.0, 100.0),
            text_box("THCA", 20.0, 120.0),
            text_box("21.3", 200.0, 119.0),
        ];
        let page = Page::from_boxes(0, 612.0, 792.0, boxes, vec![]);
        assert_eq!(page.lines, vec!["Analyte Value", "THCA 21.3"]);
    }

    #[test]
    fn text_in_selects_by_box_center() {
        let boxes = vec![
            text_box("Header", 20.0, 10.0),
            text_box("Body", 20.0, 400.0),
        ];
        let page = Page::from_boxes(0, 612.0, 792.0, boxes, vec![]);
        let top_half = FractionalRect::new(0.0, 0.0, 1.0, 0.5).to_rect(page.width, page.height);
        assert_eq!(page.text_in(&top_half), vec!["Header"]);
    }

    #[test]
    fn text_page_synthesizes_stacked_boxes() {
        let page = Page::from_text(0, "Line one\n\n  Line two  \nLine three");
        assert_eq!(page.lines, vec!["Line one", "Line two", "Line three"]);
        assert_eq!(page.boxes.len(), 3);
        let bottom = FractionalRect::new(0.0, 0.6, 1.0, 1.0).to_rect(page.width, page.height);
        assert_eq!(page.text_in(&bottom), vec!["Line three"]);
    }

    #[test]
    fn blank_page_detected() {
        let page = Page::from_boxes(0, 612.0, 792.0, vec![], vec![]);
        assert!(page.is_blank());
        assert!(!Page::from_text(0, "x").is_blank());
    }

    #[test]
    fn document_full_text_joins_pages() {
        let doc = Document::pdf(
            SourceLocator::from(b"%PDF-1.4".to_vec()),
            Arc::from(&b"%PDF-1.4"[..]),
            vec![Page::from_text(0, "first"), Page::from_text(1, "second")],
        );
        assert_eq!(doc.full_text(), "first\nsecond");
        assert_eq!(doc.kind, DocumentKind::Pdf);
        assert!(doc.source_url().is_none());
    }

    #[test]
    fn remote_document_carries_url() {
        let doc = Document::remote("https://portal.example.com/r/1");
        assert_eq!(doc.source_url(), Some("https://portal.example.com/r/1"));
        assert!(doc.html.is_none());
        assert!(doc.pages.is_empty());
    }
}
