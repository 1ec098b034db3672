//! Network session used by hosted-page strategies.
//!
//! The session is an explicit resource owned by the caller through a
//! `SessionSlot`. It is created lazily on first use and released by the
//! dispatcher unless persistence was requested. A released slot refuses
//! further use until it is reopened.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config;
use crate::error::ParseError;
use crate::pipeline::load::check_size;

/// Caller-supplied request headers.
pub type Headers = BTreeMap<String, String>;

/// Blocking page fetcher (allows mocking for tests)
pub trait PageFetcher: Send {
    fn fetch(&self, url: &str, headers: &Headers, timeout: Duration)
        -> Result<Vec<u8>, ParseError>;
}

/// Opens fetchers on demand.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn PageFetcher>, ParseError>;
}

/// HTTP session over a shared `reqwest` blocking client.
pub struct HttpSession {
    client: reqwest::blocking::Client,
}

impl HttpSession {
    pub fn new(user_agent: &str) -> Result<Self, ParseError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ParseError::NetworkFailure(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpSession {
    fn fetch(
        &self,
        url: &str,
        headers: &Headers,
        timeout: Duration,
    ) -> Result<Vec<u8>, ParseError> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                ParseError::NetworkFailure(format!(
                    "GET {url} timed out after {}s",
                    timeout.as_secs()
                ))
            } else if e.is_connect() {
                ParseError::NetworkFailure(format!("cannot connect to {url}: {e}"))
            } else {
                ParseError::NetworkFailure(format!("GET {url} failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParseError::NetworkFailure(format!(
                "GET {url} returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .map_err(|e| ParseError::NetworkFailure(format!("reading {url} failed: {e}")))?;
        check_size(body.len() as u64)?;

        tracing::debug!(url = %url, bytes = body.len(), "Fetched hosted page");
        Ok(body.to_vec())
    }
}

/// Builds `HttpSession`s with a fixed user agent.
pub struct HttpConnector {
    user_agent: String,
}

impl HttpConnector {
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
        }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(&config::user_agent())
    }
}

impl Connector for HttpConnector {
    fn connect(&self) -> Result<Box<dyn PageFetcher>, ParseError> {
        Ok(Box::new(HttpSession::new(&self.user_agent)?))
    }
}

enum SlotState {
    Idle,
    Open(Box<dyn PageFetcher>),
    Released,
}

/// Holder for at most one live session.
///
/// Passed by `&mut`, so one slot can never serve two parses at once.
pub struct SessionSlot {
    connector: Arc<dyn Connector>,
    state: SlotState,
    opened: usize,
}

impl SessionSlot {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: SlotState::Idle,
            opened: 0,
        }
    }

    /// Slot backed by real HTTP with the configured user agent.
    pub fn http() -> Self {
        Self::new(Arc::new(HttpConnector::default()))
    }

    /// The live session, connecting on first use.
    pub fn session(&mut self) -> Result<&dyn PageFetcher, ParseError> {
        if matches!(self.state, SlotState::Released) {
            return Err(ParseError::NetworkFailure(
                "session was released and must be reopened before use".into(),
            ));
        }
        if matches!(self.state, SlotState::Idle) {
            let fetcher = self.connector.connect()?;
            self.opened += 1;
            tracing::debug!(sessions_opened = self.opened, "Opened network session");
            self.state = SlotState::Open(fetcher);
        }
        match &self.state {
            SlotState::Open(fetcher) => Ok(fetcher.as_ref()),
            _ => Err(ParseError::NetworkFailure("session unavailable".into())),
        }
    }

    /// Drop the live session. Later use fails until `reopen`.
    pub fn release(&mut self) {
        if matches!(self.state, SlotState::Open(_)) {
            tracing::debug!("Released network session");
        }
        self.state = SlotState::Released;
    }

    /// Allow a released slot to connect again.
    pub fn reopen(&mut self) {
        if matches!(self.state, SlotState::Released) {
            self.state = SlotState::Idle;
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SlotState::Open(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self.state, SlotState::Released)
    }

    /// Number of sessions this slot has created.
    pub fn sessions_opened(&self) -> usize {
        self.opened
    }
}

// ── Mock for testing ──────────────────────────────────────

/// In-memory fetcher serving fixed bodies by exact URL.
///
/// Clones share their counters, so a test can keep one handle while the
/// slot owns another.
#[derive(Clone, Default)]
pub struct StaticFetcher {
    pages: Arc<HashMap<String, Vec<u8>>>,
    connects: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.to_string(), body.into());
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// A slot whose sessions are clones of this fetcher.
    pub fn slot(&self) -> SessionSlot {
        SessionSlot::new(Arc::new(self.clone()))
    }
}

impl PageFetcher for StaticFetcher {
    fn fetch(
        &self,
        url: &str,
        _headers: &Headers,
        _timeout: Duration,
    ) -> Result<Vec<u8>, ParseError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ParseError::NetworkFailure(format!("GET {url} returned HTTP 404")))
    }
}

impl Connector for StaticFetcher {
    fn connect(&self) -> Result<Box<dyn PageFetcher>, ParseError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}
