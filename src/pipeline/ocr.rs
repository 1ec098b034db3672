//! OCR seam for the re-render fallback.
//!
//! Rendered page rasters go in, positioned words come out. Word boxes are
//! mapped back to PDF points so the layout strategies can crop OCR output
//! exactly like a native text layer.

use crate::error::ParseError;
use crate::models::{Page, Rect, TextBox};
use crate::pipeline::load::pdfium::POINTS_PER_INCH;

/// Pixel bounding box reported by the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Option<PixelBox>,
}

/// Raw OCR result for one raster.
#[derive(Debug, Clone)]
pub struct OcrPageResult {
    pub text: String,
    pub confidence: f32,
    pub words: Vec<OcrWord>,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine: Send + Sync {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ParseError>;
}

/// Turn an OCR result for page `index` rendered at `dpi` into a layout page.
///
/// Words without boxes degrade to a text-only page.
pub fn ocr_result_to_page(
    result: &OcrPageResult,
    index: usize,
    dpi: u32,
    width_points: f32,
    height_points: f32,
) -> Page {
    let positioned: Vec<TextBox> = result
        .words
        .iter()
        .filter_map(|word| {
            let bbox = word.bounding_box?;
            let rect = Rect::new(
                bbox.x as f32,
                bbox.y as f32,
                (bbox.x + bbox.width) as f32,
                (bbox.y + bbox.height) as f32,
            );
            Some(TextBox {
                text: word.text.clone(),
                rect: rect.scale(POINTS_PER_INCH / dpi.max(1) as f32),
            })
        })
        .collect();

    if positioned.is_empty() {
        return Page::from_text(index, &result.text);
    }
    Page::from_boxes(index, width_points, height_points, positioned, Vec::new())
}

/// Bundled Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct TesseractEngine {
    tessdata_dir: Option<std::path::PathBuf>,
    lang: String,
}

#[cfg(feature = "ocr")]
impl TesseractEngine {
    /// `tessdata_dir` of `None` uses Tesseract's compiled-in search path.
    pub fn new(tessdata_dir: Option<&std::path::Path>) -> Result<Self, ParseError> {
        if let Some(dir) = tessdata_dir {
            if !dir.join("eng.traineddata").exists() {
                return Err(ParseError::DecodeFailure(format!(
                    "Tessdata not found at: {}",
                    dir.display()
                )));
            }
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.map(|d| d.to_path_buf()),
            lang: "eng".to_string(),
        })
    }

    /// Set language(s) for OCR (e.g., "eng", "eng+spa")
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.lang = langs.to_string();
        self
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ParseError> {
        let datapath = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| ParseError::DecodeFailure("Invalid tessdata path".into()))?
                    .to_string(),
            ),
            None => None,
        };

        let tess = tesseract::Tesseract::new(datapath.as_deref(), Some(&self.lang))
            .map_err(|e| ParseError::DecodeFailure(format!("Tesseract init failed: {e:?}")))?;
        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ParseError::DecodeFailure(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ParseError::DecodeFailure(format!("{e:?}")))?;
        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        let words = match tess.get_tsv_text(0) {
            Ok(tsv) => parse_tsv_words(&tsv),
            Err(_) => text
                .split_whitespace()
                .map(|w| OcrWord {
                    text: w.to_string(),
                    confidence,
                    bounding_box: None,
                })
                .collect(),
        };

        Ok(OcrPageResult {
            text,
            confidence,
            words,
        })
    }
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ParseError> {
        if self.text.trim().is_empty() {
            return Err(ParseError::DecodeFailure("mock OCR found no text".into()));
        }
        let words = self
            .text
            .split_whitespace()
            .map(|w| OcrWord {
                text: w.to_string(),
                confidence: self.confidence,
                bounding_box: None,
            })
            .collect();

        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
            words,
        })
    }
}

/// Parse Tesseract TSV output into positioned words.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
/// Level 5 = individual word entries. Confidence is 0-100, scaled to 0.0-1.0.
pub fn parse_tsv_words(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        if fields[0].parse::<i32>().ok() != Some(5) {
            continue;
        }
        let Ok(conf) = fields[10].trim().parse::<f32>() else {
            continue;
        };
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        // Tesseract returns -1 for words it can't assign confidence to
        let confidence = if conf < 0.0 { 0.0 } else { conf / 100.0 };

        words.push(OcrWord {
            text: text.to_string(),
            confidence,
            bounding_box: parse_pixel_box(fields[6], fields[7], fields[8], fields[9]),
        });
    }

    words
}

/// Returns None if any field fails to parse.
fn parse_pixel_box(left: &str, top: &str, width: &str, height: &str) -> Option<PixelBox> {
    Some(PixelBox {
        x: left.parse().ok()?,
        y: top.parse().ok()?,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
    })
}
