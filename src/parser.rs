//! Public entry point.
//!
//! `CoaParser` owns the read-only collaborators (identity table, strategy
//! registry, synonym tables, PDF backend) and is shared freely. The network
//! session is not: it lives in a `SessionSlot` the caller passes by `&mut`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::{ParserConfig, PARSER_VERSION};
use crate::error::ParseError;
use crate::models::{CanonicalRecord, Document, LabIdentity, Provenance, SourceLocator, Stage};
use crate::pipeline::decode::{CodeReader, QrCodeReader};
use crate::pipeline::dispatch::{DispatchOptions, StrategyRegistry};
use crate::pipeline::fallback::{FallbackController, ParseFailure};
use crate::pipeline::hash;
use crate::pipeline::identify::identify_text;
use crate::pipeline::load::{
    is_pdf_url, load_bytes, load_fetched, load_path, raw_text_hint, PdfBackend, PdfiumBackend,
};
use crate::pipeline::normalize::{Normalizer, SynonymTables};
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::session::{Connector, Headers, HttpConnector, SessionSlot};
use crate::pipeline::strategies::{builtin, ExtractionStrategy};

/// One document to parse.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub source: SourceLocator,
    pub headers: Headers,
    /// Skip identification and use this lab.
    pub lab_override: Option<LabIdentity>,
    /// Keep the network session open after this call.
    pub persist_session: bool,
}

impl ParseRequest {
    pub fn new(source: SourceLocator) -> Self {
        Self {
            source,
            headers: Headers::new(),
            lab_override: None,
            persist_session: false,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_lab(mut self, lab: LabIdentity) -> Self {
        self.lab_override = Some(lab);
        self
    }

    pub fn persist_session(mut self, persist: bool) -> Self {
        self.persist_session = persist;
        self
    }
}

impl From<&str> for ParseRequest {
    fn from(input: &str) -> Self {
        Self::new(SourceLocator::parse(input))
    }
}

/// Per-document result of a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub source: String,
    pub result: Result<CanonicalRecord, ParseFailure>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A loaded document plus an identity guessed from raw bytes when the PDF
/// could not be opened.
struct Loaded {
    document: Document,
    hint: Option<LabIdentity>,
}

impl From<Document> for Loaded {
    fn from(document: Document) -> Self {
        Self { document, hint: None }
    }
}

pub struct CoaParser {
    config: ParserConfig,
    labs: Arc<Vec<LabIdentity>>,
    registry: Arc<StrategyRegistry>,
    tables: Arc<SynonymTables>,
    normalizer: Normalizer,
    backend: Arc<dyn PdfBackend>,
    reader: Arc<dyn CodeReader>,
    ocr: Option<Arc<dyn OcrEngine>>,
    connector: Arc<dyn Connector>,
}

impl CoaParser {
    /// Parser with the built-in identities, strategies and synonym tables.
    pub fn new(config: ParserConfig, backend: Arc<dyn PdfBackend>) -> Result<Self, ParseError> {
        let tables = Arc::new(SynonymTables::builtin());
        let connector: Arc<dyn Connector> = Arc::new(HttpConnector::new(&config.user_agent()));
        Ok(Self {
            normalizer: Normalizer::new(tables.clone(), &config),
            labs: Arc::new(builtin::default_labs()),
            registry: Arc::new(builtin::builtin_registry()?),
            tables,
            backend,
            reader: Arc::new(QrCodeReader),
            ocr: None,
            connector,
            config,
        })
    }

    /// Parser backed by the system PDFium library.
    pub fn with_pdfium(config: ParserConfig) -> Result<Self, ParseError> {
        Self::new(config, Arc::new(PdfiumBackend::new()?))
    }

    /// Replace the identity table. Order is match priority.
    pub fn with_labs(mut self, labs: Vec<LabIdentity>) -> Self {
        self.labs = Arc::new(labs);
        self
    }

    pub fn with_strategy(mut self, key: &str, strategy: Arc<dyn ExtractionStrategy>) -> Self {
        Arc::make_mut(&mut self.registry).register(key, strategy);
        self
    }

    pub fn with_tables(mut self, tables: SynonymTables) -> Self {
        self.tables = Arc::new(tables);
        self.normalizer = Normalizer::new(self.tables.clone(), &self.config);
        self
    }

    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn with_code_reader(mut self, reader: Arc<dyn CodeReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn labs(&self) -> &[LabIdentity] {
        &self.labs
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// A fresh slot using this parser's connector.
    pub fn session_slot(&self) -> SessionSlot {
        SessionSlot::new(self.connector.clone())
    }

    /// Parse one document.
    ///
    /// The slot is reopened if a previous call released it. Unless the
    /// request persists the session, it is released before returning.
    pub fn parse(
        &self,
        request: &ParseRequest,
        slot: &mut SessionSlot,
    ) -> Result<CanonicalRecord, ParseFailure> {
        self.parse_scoped(request, slot, request.persist_session)
    }

    /// Parse many documents over one shared session, released at the end.
    /// A failed document is reported and the batch continues.
    pub fn parse_batch(&self, requests: &[ParseRequest]) -> Vec<BatchOutcome> {
        let mut slot = self.session_slot();
        let mut outcomes = Vec::with_capacity(requests.len());

        for request in requests {
            let source = request.source.describe();
            let result = self.parse_scoped(request, &mut slot, true);
            if let Err(failure) = &result {
                tracing::warn!(
                    source = %source,
                    stage = %failure.stage,
                    kind = failure.kind(),
                    error = %failure,
                    "Document failed, continuing batch"
                );
            }
            outcomes.push(BatchOutcome { source, result });
        }

        slot.release();
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        tracing::info!(
            documents = outcomes.len(),
            failed,
            sessions = slot.sessions_opened(),
            "Batch finished"
        );
        outcomes
    }

    fn parse_scoped(
        &self,
        request: &ParseRequest,
        slot: &mut SessionSlot,
        persist: bool,
    ) -> Result<CanonicalRecord, ParseFailure> {
        slot.reopen();
        let options = DispatchOptions {
            headers: request.headers.clone(),
            timeout: Duration::from_secs(self.config.timeout_secs),
            persist_session: persist,
        };
        let result = self.parse_inner(request, slot, &options);
        if !persist && slot.is_open() {
            slot.release();
        }
        result
    }

    fn parse_inner(
        &self,
        request: &ParseRequest,
        slot: &mut SessionSlot,
        options: &DispatchOptions,
    ) -> Result<CanonicalRecord, ParseFailure> {
        let source = request.source.describe();
        tracing::info!(source = %source, "Parsing document");

        let loaded = self
            .load(&request.source, slot, options)
            .map_err(|e| ParseFailure::new(entry_stage(&request.source), false, Vec::new(), e))?;
        let lab_override = request.lab_override.as_ref().or(loaded.hint.as_ref());

        let mut controller = FallbackController::new(
            &self.registry,
            &self.labs,
            &self.tables,
            self.backend.as_ref(),
            self.reader.as_ref(),
            &self.config,
        );
        if let Some(engine) = &self.ocr {
            controller = controller.with_ocr(engine.as_ref());
        }
        let outcome = controller.run(loaded.document, lab_override, slot, options)?;

        let last_stage = outcome.stages.last().copied().unwrap_or(Stage::LayoutPdf);
        let provenance = Provenance {
            source: source.clone(),
            source_url: outcome.extraction.source_url.clone(),
            parser_version: PARSER_VERSION.to_string(),
            strategy: outcome.strategy.clone(),
            stages: outcome.stages.clone(),
            parsed_at: Utc::now(),
            warnings: Vec::new(),
        };
        let mut record = self
            .normalizer
            .normalize(outcome.extraction, &outcome.lab, provenance);
        hash::seal(&mut record)
            .map_err(|e| ParseFailure::new(last_stage, false, outcome.stages, e))?;

        tracing::info!(
            source = %source,
            lab = %record.lab_key,
            results = record.results.len(),
            warnings = record.provenance.warnings.len(),
            sample_hash = %record.sample_hash,
            "Parsed document"
        );
        Ok(record)
    }

    fn load(
        &self,
        source: &SourceLocator,
        slot: &mut SessionSlot,
        options: &DispatchOptions,
    ) -> Result<Loaded, ParseError> {
        let backend = self.backend.as_ref();
        match source {
            SourceLocator::Path(path) => match load_path(path, backend) {
                Err(ParseError::DecodeFailure(reason)) => {
                    let bytes = std::fs::read(path)?;
                    Ok(self.unopened(source.clone(), None, bytes.into(), &reason))
                }
                other => other.map(Loaded::from),
            },
            SourceLocator::Bytes(bytes) => match load_bytes(bytes.clone(), backend) {
                Err(ParseError::DecodeFailure(reason)) => {
                    Ok(self.unopened(source.clone(), None, bytes.clone(), &reason))
                }
                other => other.map(Loaded::from),
            },
            SourceLocator::Url(url) if is_pdf_url(url) => {
                let body = slot
                    .session()?
                    .fetch(url, &options.headers, options.timeout)?;
                let bytes: Arc<[u8]> = body.into();
                match load_fetched(url, bytes.to_vec(), backend) {
                    Err(ParseError::DecodeFailure(reason)) => {
                        Ok(self.unopened(source.clone(), Some(url.clone()), bytes, &reason))
                    }
                    other => other.map(Loaded::from),
                }
            }
            SourceLocator::Url(url) => Ok(Document::remote(url).into()),
        }
    }

    /// A PDF the backend could not open: no pages, identity from raw bytes.
    fn unopened(
        &self,
        locator: SourceLocator,
        url: Option<String>,
        bytes: Arc<[u8]>,
        reason: &str,
    ) -> Loaded {
        tracing::warn!(source = %locator.describe(), reason = %reason, "PDF could not be opened");
        let hint = identify_text(&raw_text_hint(&bytes), &self.labs)
            .lab()
            .cloned();
        let mut document = Document::pdf(locator, bytes, Vec::new());
        if document.url.is_none() {
            document.url = url;
        }
        Loaded { document, hint }
    }
}

fn entry_stage(source: &SourceLocator) -> Stage {
    match source {
        SourceLocator::Url(url) if !is_pdf_url(url) => Stage::HostedPage,
        _ => Stage::LayoutPdf,
    }
}
