//! PDF page access via Google PDFium.
//!
//! Provides positioned text segments, image object bounds and page rasters.
//! `PdfiumBackend` is stateless (`Send + Sync`). Each operation creates
//! a fresh `Pdfium` instance because the upstream type is `!Send`.
//! The OS caches `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

use std::io::Cursor;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::PdfBackend;
use crate::error::ParseError;
use crate::models::{EmbeddedImage, Page, Rect, TextBox};

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large pages or absurd DPI settings.
const MAX_DIMENSION_PX: u32 = 6000;

/// PDF points per inch (standard PDF unit).
pub const POINTS_PER_INCH: f32 = 72.0;

/// PDF access backed by PDFium.
pub struct PdfiumBackend;

impl PdfiumBackend {
    /// Create a new backend, verifying the PDFium library is loadable.
    pub fn new() -> Result<Self, ParseError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path)
/// 2. Alongside the running executable
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ParseError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ParseError::DecodeFailure(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Loaded PDFium alongside executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ParseError::DecodeFailure(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors. Encrypted and corrupt files both mean the layout
/// cannot be read, which the fallback chain treats as a decode failure.
fn map_load_error(e: PdfiumError) -> ParseError {
    let msg = e.to_string();
    if msg.to_lowercase().contains("password") {
        ParseError::DecodeFailure(format!("PDF is encrypted: {msg}"))
    } else {
        ParseError::DecodeFailure(format!("Failed to load PDF: {msg}"))
    }
}

/// Convert a PDFium rectangle (bottom-left origin) to top-left origin.
fn to_top_left(left: f32, bottom: f32, right: f32, top: f32, page_height: f32) -> Rect {
    Rect::new(left, page_height - top, right, page_height - bottom)
}

/// Compute pixel dimensions for rendering, applying the dimension guard.
///
/// Returns (width_px, height_px), both clamped to [1, MAX_DIMENSION_PX].
/// Preserves aspect ratio when capping.
pub fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PdfBackend for PdfiumBackend {
    fn load_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<Page>, ParseError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let mut pages = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let width = page.width().value;
            let height = page.height().value;

            let mut boxes = Vec::new();
            match page.text() {
                Ok(text) => {
                    for segment in text.segments().iter() {
                        let bounds = segment.bounds();
                        boxes.push(TextBox {
                            text: segment.text(),
                            rect: to_top_left(
                                bounds.left().value,
                                bounds.bottom().value,
                                bounds.right().value,
                                bounds.top().value,
                                height,
                            ),
                        });
                    }
                }
                Err(e) => warn!(page = index, error = %e, "Page has no readable text layer"),
            }

            let mut images = Vec::new();
            for object in page.objects().iter() {
                if object.object_type() != PdfPageObjectType::Image {
                    continue;
                }
                let Ok(bounds) = object.bounds() else {
                    continue;
                };
                let rect = bounds.to_rect();
                images.push(EmbeddedImage {
                    index: images.len(),
                    rect: to_top_left(
                        rect.left().value,
                        rect.bottom().value,
                        rect.right().value,
                        rect.top().value,
                        height,
                    ),
                });
            }

            debug!(
                page = index,
                segments = boxes.len(),
                images = images.len(),
                "Loaded PDF page layout"
            );
            pages.push(Page::from_boxes(index, width, height, boxes, images));
        }

        Ok(pages)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ParseError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let pages = document.pages();
        let index = u16::try_from(page_index).map_err(|_| {
            ParseError::NotFound(format!("Page index {page_index} exceeds u16 maximum"))
        })?;
        let page = pages.get(index).map_err(|_| {
            ParseError::NotFound(format!(
                "Page {page_index} out of range (document has {} pages)",
                pages.len()
            ))
        })?;

        let (target_w, target_h) =
            compute_render_dimensions(page.width().value, page.height().value, dpi);

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ParseError::DecodeFailure(format!("Rendering failed: {e}")))?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| ParseError::DecodeFailure(format!("PNG encoding failed: {e}")))?;

        let png_bytes = cursor.into_inner();
        debug!(
            page = page_index,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "Rendered PDF page to PNG"
        );
        Ok(png_bytes)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Mock backend returning fixed pages and per-page rasters.
///
/// Used by loader, decoder and fallback tests that need a `PdfBackend`
/// without requiring the actual PDFium binary.
pub struct MockPdfBackend {
    pages: Vec<Page>,
    rasters: Vec<Option<Vec<u8>>>,
}

impl MockPdfBackend {
    pub fn new(pages: Vec<Page>) -> Self {
        let rasters = vec![None; pages.len()];
        Self { pages, rasters }
    }

    /// A backend whose PDFs cannot be opened.
    pub fn broken() -> Self {
        Self {
            pages: Vec::new(),
            rasters: Vec::new(),
        }
    }

    /// Use `png` as the rendered raster of page `index`.
    pub fn with_raster(mut self, index: usize, png: Vec<u8>) -> Self {
        if index < self.rasters.len() {
            self.rasters[index] = Some(png);
        }
        self
    }
}

impl PdfBackend for MockPdfBackend {
    fn load_pages(&self, _pdf_bytes: &[u8]) -> Result<Vec<Page>, ParseError> {
        if self.pages.is_empty() {
            return Err(ParseError::DecodeFailure("mock PDF cannot be opened".into()));
        }
        Ok(self.pages.clone())
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_index: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ParseError> {
        match self.rasters.get(page_index) {
            Some(Some(png)) => Ok(png.clone()),
            Some(None) => Ok(blank_png()),
            None => Err(ParseError::NotFound(format!(
                "Page {page_index} out of range (mock has {} pages)",
                self.pages.len()
            ))),
        }
    }
}

/// 64x64 white PNG.
pub fn blank_png() -> Vec<u8> {
    let img = image::GrayImage::from_pixel(64, 64, image::Luma([255u8]));
    let mut cursor = Cursor::new(Vec::new());
    // Encoding an in-memory buffer to PNG cannot fail for a valid image.
    let _ = image::DynamicImage::ImageLuma8(img).write_to(&mut cursor, ImageOutputFormat::Png);
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_at_300dpi() {
        let (w, h) = compute_render_dimensions(612.0, 792.0, 300);
        assert!((2549..=2550).contains(&w), "Letter width at 300dpi: got {w}");
        assert!((3299..=3300).contains(&h), "Letter height at 300dpi: got {h}");
    }

    #[test]
    fn dimension_guard_caps_oversized() {
        let (w, h) = compute_render_dimensions(5000.0, 7000.0, 300);
        assert!(w <= MAX_DIMENSION_PX);
        assert!(h <= MAX_DIMENSION_PX);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn zero_points_clamped_to_1() {
        let (w, h) = compute_render_dimensions(0.0, 0.0, 300);
        assert!(w >= 1);
        assert!(h >= 1);
    }

    #[test]
    fn pdfium_rect_flipped_to_top_left() {
        // A box 10pt tall sitting 100pt from the top of a 792pt page.
        let rect = to_top_left(50.0, 682.0, 150.0, 692.0, 792.0);
        assert_eq!(rect, Rect::new(50.0, 100.0, 150.0, 110.0));
    }

    #[test]
    fn mock_returns_pages_and_blank_raster() {
        let backend = MockPdfBackend::new(vec![Page::from_text(0, "hello")]);
        assert_eq!(backend.load_pages(b"%PDF").unwrap().len(), 1);
        let png = backend.render_page(b"%PDF", 0, 300).unwrap();
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn mock_errors_for_out_of_range() {
        let backend = MockPdfBackend::new(vec![Page::from_text(0, "hello")]);
        let err = backend.render_page(b"%PDF", 3, 300).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn broken_mock_cannot_open() {
        let err = MockPdfBackend::broken().load_pages(b"%PDF").unwrap_err();
        assert_eq!(err.kind(), "decode_failure");
    }
}
