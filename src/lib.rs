pub mod config;
pub mod error;
pub mod models;
pub mod parser;
pub mod pipeline;

pub use config::ParserConfig;
pub use error::ParseError;
pub use models::{AnalyteResult, AnalyteValue, CanonicalRecord, LabIdentity, SourceLocator};
pub use parser::{BatchOutcome, CoaParser, ParseRequest};
pub use pipeline::fallback::ParseFailure;
pub use pipeline::session::SessionSlot;

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// [`config::default_log_filter`]. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::debug!(version = config::PARSER_VERSION, "Tracing initialized");
    }
}
