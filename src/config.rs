use serde::{Deserialize, Serialize};

/// Crate-level constants
pub const APP_NAME: &str = "coa_parser";
pub const PARSER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed rendering resolution for optical-code crops and OCR re-render.
pub const RENDER_DPI: u32 = 300;

/// Default time budget for a hosted-page fetch.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Mass ratio of the neutral cannabinoid to its acidic precursor (THC/THCA, CBD/CBDA).
pub const DECARB_FACTOR: f64 = 0.877;

/// Documents above this size are rejected before parsing.
pub const MAX_DOCUMENT_BYTES: u64 = 100 * 1024 * 1024; // 100MB

/// Environment variable overriding the HTTP user agent.
pub const USER_AGENT_ENV: &str = "COA_PARSER_USER_AGENT";

/// Default `RUST_LOG`-style filter used by [`crate::init_tracing`].
pub fn default_log_filter() -> &'static str {
    "coa_parser=info,warn"
}

/// User agent sent with hosted-page requests.
pub fn user_agent() -> String {
    std::env::var(USER_AGENT_ENV)
        .ok()
        .filter(|ua| !ua.trim().is_empty())
        .unwrap_or_else(|| format!("{APP_NAME}/{PARSER_VERSION}"))
}

/// Tunables for one parser instance.
///
/// Loaded by the caller however it likes (`serde_json`, env, defaults);
/// every field has a default so partial documents deserialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParserConfig {
    pub render_dpi: u32,
    pub timeout_secs: u64,
    pub decarb_factor: f64,
    /// Apply the decarboxylation factor when computing activated totals.
    pub decarb_weighting: bool,
    /// Allow the single OCR re-render attempt in the fallback chain.
    pub ocr_rerender: bool,
    pub user_agent: Option<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            render_dpi: RENDER_DPI,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            decarb_factor: DECARB_FACTOR,
            decarb_weighting: true,
            ocr_rerender: true,
            user_agent: None,
        }
    }
}

impl ParserConfig {
    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(user_agent)
    }
}
