pub mod format;
pub mod loader;
pub mod pdfium;

pub use format::*;
pub use loader::*;
pub use pdfium::{MockPdfBackend, PdfiumBackend};

use crate::error::ParseError;
use crate::models::Page;

/// PDF access abstraction (allows mocking for tests)
pub trait PdfBackend: Send + Sync {
    /// Text boxes, image bounds and size of every page.
    fn load_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<Page>, ParseError>;

    /// Render one page (0-based) to PNG bytes at `dpi`.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ParseError>;
}
