//! Cross-format fallback.
//!
//! Layout extraction first; on failure, decode the embedded result-page
//! reference and read the hosted page; on failure, OCR the rendered pages
//! once and retry the layout. Markup documents and bare URLs start at the
//! hosted page. Every visited stage is recorded.

use thiserror::Error;

use crate::config::ParserConfig;
use crate::error::ParseError;
use crate::models::{Document, LabIdentity, Page, Stage, StrategyFamily};
use crate::pipeline::decode::{CodeReader, ReferenceDecoder};
use crate::pipeline::dispatch::{dispatch, DispatchOptions, Dispatched, StrategyRegistry};
use crate::pipeline::identify::{identify_document, identify_url, Identification};
use crate::pipeline::load::PdfBackend;
use crate::pipeline::normalize::synonyms::fields;
use crate::pipeline::normalize::SynonymTables;
use crate::pipeline::ocr::{ocr_result_to_page, OcrEngine};
use crate::pipeline::session::SessionSlot;
use crate::pipeline::strategies::{RawExtraction, StrategyContext, StrategyInput};

fn ocr_suffix(post_ocr: &bool) -> &'static str {
    if *post_ocr {
        " after OCR re-render"
    } else {
        ""
    }
}

/// A parse that exhausted its stages, or hit a terminal error.
#[derive(Error, Debug)]
#[error("{stage} failed{}: {source}", ocr_suffix(.post_ocr))]
pub struct ParseFailure {
    /// Last stage attempted.
    pub stage: Stage,
    /// The failure came from the layout retry on OCR text, not from OCR.
    pub post_ocr: bool,
    /// Every stage visited, in order.
    pub stages: Vec<Stage>,
    #[source]
    pub source: ParseError,
}

impl ParseFailure {
    pub fn new(stage: Stage, post_ocr: bool, stages: Vec<Stage>, source: ParseError) -> Self {
        Self {
            stage,
            post_ocr,
            stages,
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

/// Raw data plus how it was obtained.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub lab: LabIdentity,
    pub strategy: String,
    pub extraction: RawExtraction,
    pub stages: Vec<Stage>,
}

fn is_terminal(error: &ParseError) -> bool {
    matches!(error, ParseError::Unsupported(_))
}

pub struct FallbackController<'a> {
    registry: &'a StrategyRegistry,
    labs: &'a [LabIdentity],
    tables: &'a SynonymTables,
    backend: &'a dyn PdfBackend,
    reader: &'a dyn CodeReader,
    ocr: Option<&'a dyn OcrEngine>,
    render_dpi: u32,
    ocr_rerender: bool,
}

impl<'a> FallbackController<'a> {
    pub fn new(
        registry: &'a StrategyRegistry,
        labs: &'a [LabIdentity],
        tables: &'a SynonymTables,
        backend: &'a dyn PdfBackend,
        reader: &'a dyn CodeReader,
        config: &ParserConfig,
    ) -> Self {
        Self {
            registry,
            labs,
            tables,
            backend,
            reader,
            ocr: None,
            render_dpi: config.render_dpi,
            ocr_rerender: config.ocr_rerender,
        }
    }

    pub fn with_ocr(mut self, engine: &'a dyn OcrEngine) -> Self {
        self.ocr = Some(engine);
        self
    }

    /// Run the chain on `document`. `lab_override` bypasses identification.
    pub fn run(
        &self,
        mut document: Document,
        lab_override: Option<&LabIdentity>,
        session: &mut SessionSlot,
        options: &DispatchOptions,
    ) -> Result<FallbackOutcome, ParseFailure> {
        let decoder = ReferenceDecoder::new(self.backend, self.reader, self.render_dpi);
        let mut stages = Vec::new();

        if document.pdf_bytes.is_none() {
            enter(&mut stages, Stage::HostedPage);
            let identification = self.identify(&document, lab_override);
            return self
                .run_strategy(identification, &StrategyInput::Document(&document), session, options, &decoder)
                .map(|dispatched| finish(identification, dispatched, stages.clone()))
                .map_err(|e| ParseFailure::new(Stage::HostedPage, false, stages.clone(), e));
        }

        let mut last: Option<(Stage, ParseError)> = None;
        let mut layout_skipped = false;

        match self.layout_stage(&document, lab_override, session, options, &decoder) {
            Ok(Some((identification, dispatched))) => {
                enter(&mut stages, Stage::LayoutPdf);
                return Ok(finish(identification, dispatched, stages));
            }
            Ok(None) => {
                tracing::debug!("Lab publishes hosted pages only, skipping layout");
                layout_skipped = true;
            }
            Err(e) => {
                enter(&mut stages, Stage::LayoutPdf);
                if is_terminal(&e) {
                    return Err(ParseFailure::new(Stage::LayoutPdf, false, stages, e));
                }
                tracing::warn!(stage = %Stage::LayoutPdf, error = %e, "Stage failed");
                last = Some((Stage::LayoutPdf, e));
            }
        }

        enter(&mut stages, Stage::EmbeddedReference);
        match decoder.find_reference_url(&document, self.labs) {
            Ok(url) => {
                tracing::info!(url = %url, "Decoded result-page reference");
                enter(&mut stages, Stage::HostedPage);
                let identification = lab_override.map_or_else(
                    || match identify_url(&url, self.labs) {
                        Identification::Unknown => self.identify(&document, None),
                        known => known,
                    },
                    Identification::Known,
                );
                match self.run_strategy(identification, &StrategyInput::Url(&url), session, options, &decoder) {
                    Ok(dispatched) => return Ok(finish(identification, dispatched, stages)),
                    Err(e) if is_terminal(&e) => {
                        return Err(ParseFailure::new(Stage::HostedPage, false, stages, e));
                    }
                    Err(e) => {
                        tracing::warn!(stage = %Stage::HostedPage, error = %e, "Stage failed");
                        last = Some((Stage::HostedPage, e));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(stage = %Stage::EmbeddedReference, error = %e, "Stage failed");
                last = Some((Stage::EmbeddedReference, e));
            }
        }

        if layout_skipped {
            // Nothing to retry on OCR text.
            let (stage, error) = last.unwrap_or_else(|| {
                (
                    Stage::EmbeddedReference,
                    ParseError::NotFound("no result-page reference".into()),
                )
            });
            return Err(ParseFailure::new(stage, false, stages, error));
        }

        enter(&mut stages, Stage::OcrRerender);
        if let Err(e) = self.ocr_stage(&mut document) {
            return Err(ParseFailure::new(Stage::OcrRerender, false, stages, e));
        }

        enter(&mut stages, Stage::LayoutPdf);
        match self.layout_stage(&document, lab_override, session, options, &decoder) {
            Ok(Some((identification, dispatched))) => Ok(finish(identification, dispatched, stages)),
            Ok(None) => Err(ParseFailure::new(
                Stage::LayoutPdf,
                true,
                stages,
                ParseError::ParseMismatch("identified lab has no layout strategy".into()),
            )),
            Err(e) => Err(ParseFailure::new(Stage::LayoutPdf, true, stages, e)),
        }
    }

    fn identify<'s>(
        &'s self,
        document: &Document,
        lab_override: Option<&'s LabIdentity>,
    ) -> Identification<'s> {
        match lab_override {
            Some(lab) => Identification::Known(lab),
            None => identify_document(document, self.labs),
        }
    }

    fn run_strategy(
        &self,
        identification: Identification<'_>,
        input: &StrategyInput<'_>,
        session: &mut SessionSlot,
        options: &DispatchOptions,
        decoder: &ReferenceDecoder<'_>,
    ) -> Result<Dispatched, ParseError> {
        let mut ctx = StrategyContext {
            session,
            options,
            tables: self.tables,
            labs: self.labs,
            decoder: Some(decoder),
        };
        dispatch(self.registry, identification, input, &mut ctx)
    }

    /// One layout attempt. `Ok(None)` when the lab's strategy is not a
    /// layout strategy.
    fn layout_stage<'s>(
        &'s self,
        document: &Document,
        lab_override: Option<&'s LabIdentity>,
        session: &mut SessionSlot,
        options: &DispatchOptions,
        decoder: &ReferenceDecoder<'_>,
    ) -> Result<Option<(Identification<'s>, Dispatched)>, ParseError> {
        let identification = self.identify(document, lab_override);
        if !identification.is_known() {
            return Err(ParseError::NotFound(
                "no lab signature matched, no layout to apply".into(),
            ));
        }
        let (_, strategy) = self.registry.resolve(identification)?;
        if strategy.family() != StrategyFamily::LayoutPdf {
            return Ok(None);
        }

        let dispatched = self.run_strategy(
            identification,
            &StrategyInput::Document(document),
            session,
            options,
            decoder,
        )?;
        if !self.layout_succeeded(&dispatched.extraction) {
            return Err(ParseError::ParseMismatch(
                "layout yielded no result rows and no product name".into(),
            ));
        }
        Ok(Some((identification, dispatched)))
    }

    fn layout_succeeded(&self, extraction: &RawExtraction) -> bool {
        !extraction.rows.is_empty()
            || extraction
                .fields
                .keys()
                .any(|label| self.tables.canonical_field(label) == Some(fields::PRODUCT_NAME))
    }

    /// Replace the document's pages with OCR output.
    fn ocr_stage(&self, document: &mut Document) -> Result<(), ParseError> {
        if !self.ocr_rerender {
            return Err(ParseError::DecodeFailure("OCR re-render is disabled".into()));
        }
        let engine = self
            .ocr
            .ok_or_else(|| ParseError::DecodeFailure("no OCR engine configured".into()))?;
        let bytes = document
            .pdf_bytes
            .clone()
            .ok_or_else(|| ParseError::DecodeFailure("nothing to render".into()))?;
        if document.pages.is_empty() {
            return Err(ParseError::DecodeFailure("document has no pages to render".into()));
        }

        let mut pages = Vec::with_capacity(document.pages.len());
        for page in &document.pages {
            let png = self.backend.render_page(&bytes, page.index, self.render_dpi)?;
            let result = engine.ocr_image(&png)?;
            tracing::debug!(
                page = page.index,
                words = result.words.len(),
                confidence = result.confidence,
                "OCR page"
            );
            pages.push(ocr_result_to_page(
                &result,
                page.index,
                self.render_dpi,
                page.width,
                page.height,
            ));
        }
        if pages.iter().all(Page::is_blank) {
            return Err(ParseError::DecodeFailure("OCR found no text".into()));
        }
        document.pages = pages;
        Ok(())
    }
}

fn enter(stages: &mut Vec<Stage>, stage: Stage) {
    tracing::info!(stage = %stage, "Fallback stage");
    stages.push(stage);
}

fn finish(identification: Identification<'_>, dispatched: Dispatched, stages: Vec<Stage>) -> FallbackOutcome {
    let lab = identification
        .lab()
        .cloned()
        .unwrap_or_else(|| LabIdentity::new(&dispatched.strategy, &dispatched.strategy));
    FallbackOutcome {
        lab,
        strategy: dispatched.strategy,
        extraction: dispatched.extraction,
        stages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmbeddedImage, SourceLocator};
    use crate::pipeline::decode::QrCodeReader;
    use crate::pipeline::load::{html_document, MockPdfBackend};
    use crate::pipeline::ocr::MockOcrEngine;
    use crate::pipeline::session::StaticFetcher;
    use crate::pipeline::strategies::builtin;
    use crate::pipeline::test_support::{
        hosted_coa_html, layout_coa_document, layout_coa_page, qr_page_png, HOSTED_URL,
    };
    use std::sync::Arc;

    struct Fixture {
        registry: StrategyRegistry,
        labs: Vec<LabIdentity>,
        tables: SynonymTables,
        backend: MockPdfBackend,
        reader: QrCodeReader,
        config: ParserConfig,
    }

    impl Fixture {
        fn new(backend: MockPdfBackend) -> Self {
            Self {
                registry: builtin::builtin_registry().unwrap(),
                labs: builtin::default_labs(),
                tables: SynonymTables::builtin(),
                backend,
                reader: QrCodeReader,
                config: ParserConfig::default(),
            }
        }

        fn controller(&self) -> FallbackController<'_> {
            FallbackController::new(
                &self.registry,
                &self.labs,
                &self.tables,
                &self.backend,
                &self.reader,
                &self.config,
            )
        }
    }

    fn pdf(page: Page) -> Document {
        Document::pdf(
            SourceLocator::from(b"%PDF-1.4".to_vec()),
            Arc::from(&b"%PDF-1.4"[..]),
            vec![page],
        )
    }

    /// A page with `text` and a QR code pointing at the hosted page.
    fn qr_fixture(text: &str) -> (Page, MockPdfBackend) {
        let (png, rect) = qr_page_png(HOSTED_URL);
        let mut page = Page::from_text(0, text);
        page.width = 612.0;
        page.height = 792.0;
        page.images = vec![EmbeddedImage { index: 0, rect }];
        let backend = MockPdfBackend::new(vec![page.clone()]).with_raster(0, png);
        (page, backend)
    }

    fn scanned_page() -> Page {
        Page::from_boxes(0, 612.0, 792.0, Vec::new(), Vec::new())
    }

    #[test]
    fn layout_success_stops_the_chain() {
        let fixture = Fixture::new(MockPdfBackend::new(vec![layout_coa_page()]));
        let fetcher = StaticFetcher::new();
        let outcome = fixture
            .controller()
            .run(layout_coa_document(), None, &mut fetcher.slot(), &DispatchOptions::default())
            .unwrap();
        assert_eq!(outcome.stages, vec![Stage::LayoutPdf]);
        assert_eq!(outcome.strategy, builtin::SC_LABS);
        assert_eq!(outcome.lab.label, "SC Labs");
        assert_eq!(fetcher.connects(), 0);
    }

    #[test]
    fn unknown_layout_falls_through_to_hosted_page() {
        let (page, backend) = qr_fixture("Certificate of Analysis\nAcme Testing");
        let fixture = Fixture::new(backend);
        let fetcher = StaticFetcher::new().with_page(HOSTED_URL, hosted_coa_html());
        let mut slot = fetcher.slot();

        let outcome = fixture
            .controller()
            .run(pdf(page), None, &mut slot, &DispatchOptions::default())
            .unwrap();
        assert_eq!(
            outcome.stages,
            vec![Stage::LayoutPdf, Stage::EmbeddedReference, Stage::HostedPage]
        );
        assert_eq!(outcome.strategy, builtin::CONFIDENT_CANNABIS);
        assert_eq!(outcome.extraction.source_url.as_deref(), Some(HOSTED_URL));
        assert_eq!(fetcher.requests(), 1);
        assert!(slot.is_released());
    }

    #[test]
    fn hosted_only_lab_skips_layout() {
        let (page, backend) = qr_fixture("Confident Cannabis\nCertificate");
        let fixture = Fixture::new(backend);
        let fetcher = StaticFetcher::new().with_page(HOSTED_URL, hosted_coa_html());
        let outcome = fixture
            .controller()
            .run(pdf(page), None, &mut fetcher.slot(), &DispatchOptions::default())
            .unwrap();
        assert_eq!(outcome.stages, vec![Stage::EmbeddedReference, Stage::HostedPage]);
    }

    #[test]
    fn unregistered_lab_is_terminal_without_network() {
        let page = Page::from_text(0, "Steep Hill Labs\nSample Name: Blue Dream");
        let fixture = Fixture::new(MockPdfBackend::new(vec![page.clone()]));
        let fetcher = StaticFetcher::new();
        let ocr = MockOcrEngine::new("SC Labs", 0.9);
        let failure = fixture
            .controller()
            .with_ocr(&ocr)
            .run(pdf(page), None, &mut fetcher.slot(), &DispatchOptions::default())
            .unwrap_err();
        assert_eq!(failure.kind(), "unsupported");
        assert_eq!(failure.stage, Stage::LayoutPdf);
        assert_eq!(failure.stages, vec![Stage::LayoutPdf]);
        assert_eq!(fetcher.connects(), 0);
    }

    #[test]
    fn exhausted_chain_without_ocr_engine_names_ocr_stage() {
        let page = scanned_page();
        let fixture = Fixture::new(MockPdfBackend::new(vec![page.clone()]));
        let failure = fixture
            .controller()
            .run(pdf(page), None, &mut StaticFetcher::new().slot(), &DispatchOptions::default())
            .unwrap_err();
        assert_eq!(failure.stage, Stage::OcrRerender);
        assert!(!failure.post_ocr);
        assert_eq!(failure.kind(), "decode_failure");
        assert_eq!(
            failure.stages,
            vec![Stage::LayoutPdf, Stage::EmbeddedReference, Stage::OcrRerender]
        );
    }

    #[test]
    fn ocr_rerender_feeds_layout_retry() {
        let page = scanned_page();
        let fixture = Fixture::new(MockPdfBackend::new(vec![page.clone()]));
        let ocr = MockOcrEngine::new(
            "SC Labs\nSample Name: Blue Dream\nClient: Grower Co\nDate Tested: 03/01/2024\n\
             Cannabinoids\nTHCa 21.3 %\nΔ9-THC 0.42 %\nCBD 0.5 %\nCBG 0.1 %\nCBN 0.05 %",
            0.91,
        );
        let outcome = fixture
            .controller()
            .with_ocr(&ocr)
            .run(pdf(page), None, &mut StaticFetcher::new().slot(), &DispatchOptions::default())
            .unwrap();
        assert_eq!(
            outcome.stages,
            vec![
                Stage::LayoutPdf,
                Stage::EmbeddedReference,
                Stage::OcrRerender,
                Stage::LayoutPdf
            ]
        );
        assert_eq!(outcome.strategy, builtin::SC_LABS);
        assert_eq!(outcome.extraction.fields["Sample Name"], "Blue Dream");
        assert!(outcome.extraction.rows.iter().any(|r| r.name == "THCa"));
    }

    #[test]
    fn failed_retry_is_flagged_post_ocr() {
        let page = scanned_page();
        let fixture = Fixture::new(MockPdfBackend::new(vec![page.clone()]));
        let ocr = MockOcrEngine::new("Acme Testing\nnothing useful here", 0.4);
        let failure = fixture
            .controller()
            .with_ocr(&ocr)
            .run(pdf(page), None, &mut StaticFetcher::new().slot(), &DispatchOptions::default())
            .unwrap_err();
        assert_eq!(failure.stage, Stage::LayoutPdf);
        assert!(failure.post_ocr);
        assert!(failure.to_string().contains("after OCR re-render"));
    }

    #[test]
    fn markup_enters_at_hosted_page() {
        let fixture = Fixture::new(MockPdfBackend::broken());
        let fetcher = StaticFetcher::new();
        let document = html_document(
            SourceLocator::Url(HOSTED_URL.into()),
            Some(HOSTED_URL.into()),
            hosted_coa_html(),
        );
        let outcome = fixture
            .controller()
            .run(document, None, &mut fetcher.slot(), &DispatchOptions::default())
            .unwrap();
        assert_eq!(outcome.stages, vec![Stage::HostedPage]);
        assert_eq!(fetcher.connects(), 0);
    }

    #[test]
    fn override_bypasses_identification() {
        let fixture = Fixture::new(MockPdfBackend::new(vec![layout_coa_page()]));
        let sc_labs = fixture.labs[2].clone();
        let mut document = layout_coa_document();
        // Strip the lab name so identification alone would fail.
        document.pages[0].boxes.retain(|b| b.text != "SC Labs");
        document.pages[0].lines.retain(|l| l != "SC Labs");

        let outcome = fixture
            .controller()
            .run(document, Some(&sc_labs), &mut StaticFetcher::new().slot(), &DispatchOptions::default())
            .unwrap();
        assert_eq!(outcome.stages, vec![Stage::LayoutPdf]);
        assert_eq!(outcome.lab.key, builtin::SC_LABS);
    }
}
