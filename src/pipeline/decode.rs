//! Embedded-reference decoding.
//!
//! Many labs print only a QR code linking to the authoritative result page.
//! Each embedded image's bounding box is cropped out of a page raster
//! rendered at a fixed resolution and handed to a `CodeReader`.

use std::sync::LazyLock;

use image::{imageops, GrayImage};
use regex::Regex;

use crate::error::ParseError;
use crate::models::{Document, LabIdentity, Rect};
use crate::pipeline::load::PdfBackend;

/// Extra margin around an image's bounds, as a fraction of its size.
/// Codes are often drawn flush to the image edge with no quiet zone.
const CROP_PADDING: f32 = 0.08;

/// Optical code reader abstraction (allows mocking for tests)
pub trait CodeReader: Send + Sync {
    /// Decode the first readable code in a greyscale raster.
    fn read(&self, image: &GrayImage) -> Result<String, ParseError>;
}

/// QR code reader backed by `rqrr`.
pub struct QrCodeReader;

impl CodeReader for QrCodeReader {
    fn read(&self, image: &GrayImage) -> Result<String, ParseError> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            image.width() as usize,
            image.height() as usize,
            |x, y| image.get_pixel(x as u32, y as u32)[0],
        );

        let grids = prepared.detect_grids();
        if grids.is_empty() {
            return Err(ParseError::NotFound("no QR code in image".into()));
        }

        let mut last_error = String::new();
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => return Ok(content),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(ParseError::DecodeFailure(format!(
            "QR code found but unreadable: {last_error}"
        )))
    }
}

/// Locates and decodes the embedded result-page reference of a PDF.
pub struct ReferenceDecoder<'a> {
    backend: &'a dyn PdfBackend,
    reader: &'a dyn CodeReader,
    dpi: u32,
}

impl<'a> ReferenceDecoder<'a> {
    pub fn new(backend: &'a dyn PdfBackend, reader: &'a dyn CodeReader, dpi: u32) -> Self {
        Self {
            backend,
            reader,
            dpi,
        }
    }

    /// Decode the reference URL on `page_index` (default: first page).
    ///
    /// With `image_index` only that image is tried (no search). Without it,
    /// every embedded image is tried in order and the first URL wins; a page
    /// with no image objects is decoded whole.
    pub fn decode(
        &self,
        document: &Document,
        page_index: Option<usize>,
        image_index: Option<usize>,
    ) -> Result<String, ParseError> {
        let pdf_bytes = document.pdf_bytes.as_ref().ok_or_else(|| {
            ParseError::NotFound("document has no PDF pages to render".into())
        })?;
        let page_index = page_index.unwrap_or(0);
        let page = document
            .page(page_index)
            .ok_or_else(|| ParseError::NotFound(format!("page {page_index} does not exist")))?;

        let candidates: Vec<Option<Rect>> = match image_index {
            Some(wanted) => {
                let image = page
                    .images
                    .iter()
                    .find(|img| img.index == wanted)
                    .ok_or_else(|| {
                        ParseError::NotFound(format!(
                            "image {wanted} not found on page {page_index}"
                        ))
                    })?;
                vec![Some(image.rect)]
            }
            None if page.images.is_empty() => vec![None],
            None => page.images.iter().map(|img| Some(img.rect)).collect(),
        };

        let png = self.backend.render_page(pdf_bytes, page.index, self.dpi)?;
        let raster = image::load_from_memory(&png)
            .map_err(|e| ParseError::DecodeFailure(format!("unreadable page raster: {e}")))?
            .to_luma8();

        let scale_x = raster.width() as f32 / page.width.max(1.0);
        let scale_y = raster.height() as f32 / page.height.max(1.0);

        let mut saw_payload = None;
        for (attempt, rect) in candidates.iter().enumerate() {
            let crop = match rect {
                Some(rect) => crop_region(&raster, rect, scale_x, scale_y),
                None => raster.clone(),
            };
            match self.reader.read(&crop) {
                Ok(payload) if is_http_url(&payload) => {
                    tracing::info!(
                        page = page_index,
                        attempt,
                        url = %payload,
                        "Decoded embedded reference"
                    );
                    return Ok(payload.trim().to_string());
                }
                Ok(payload) => {
                    tracing::debug!(page = page_index, attempt, "Optical code is not a URL");
                    saw_payload = Some(payload);
                }
                Err(e) => {
                    tracing::debug!(page = page_index, attempt, error = %e, "No code in image");
                }
            }
        }

        match saw_payload {
            Some(payload) => Err(ParseError::DecodeFailure(format!(
                "optical code on page {page_index} is not a URL: {payload}"
            ))),
            None => Err(ParseError::NotFound(format!(
                "no embedded optical code decoded on page {page_index}"
            ))),
        }
    }

    /// Find the document's result-page URL: optical codes page by page,
    /// then printed links matching a registered lab.
    ///
    /// The first page's decode error is returned when nothing is found.
    pub fn find_reference_url(
        &self,
        document: &Document,
        labs: &[LabIdentity],
    ) -> Result<String, ParseError> {
        let mut first_error = None;
        for page in &document.pages {
            match self.decode(document, Some(page.index), None) {
                Ok(url) => return Ok(url),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(url) = document
            .pages
            .iter()
            .find_map(|page| find_printed_reference(&page.text(), labs))
        {
            tracing::info!(url = %url, "Using printed result link");
            return Ok(url);
        }

        Err(first_error.unwrap_or_else(|| {
            ParseError::NotFound("document has no pages to search for a reference".into())
        }))
    }
}

/// Crop `rect` (PDF points) out of the raster, padded and clamped.
fn crop_region(raster: &GrayImage, rect: &Rect, scale_x: f32, scale_y: f32) -> GrayImage {
    let pad_x = rect.width() * CROP_PADDING;
    let pad_y = rect.height() * CROP_PADDING;

    let left = ((rect.left - pad_x) * scale_x).max(0.0) as u32;
    let top = ((rect.top - pad_y) * scale_y).max(0.0) as u32;
    let right = (((rect.right + pad_x) * scale_x) as u32).min(raster.width());
    let bottom = (((rect.bottom + pad_y) * scale_y) as u32).min(raster.height());

    let left = left.min(raster.width().saturating_sub(1));
    let top = top.min(raster.height().saturating_sub(1));
    let width = right.saturating_sub(left).max(1);
    let height = bottom.saturating_sub(top).max(1);

    imageops::crop_imm(raster, left, top, width, height).to_image()
}

fn is_http_url(payload: &str) -> bool {
    let lower = payload.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

static PRINTED_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhttps?://[^\s"'<>()]+"#).expect("valid regex"));

/// Find a printed result link matching one of the registered labs' URL
/// signatures. Some labs print the link as text next to the code.
pub fn find_printed_reference(text: &str, labs: &[LabIdentity]) -> Option<String> {
    PRINTED_URL
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
        .find(|url| labs.iter().any(|lab| lab.matches_url(url)))
}
