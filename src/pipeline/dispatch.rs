//! Extraction dispatcher: identity → registered strategy → raw extraction.
//!
//! Lookup happens before the session is touched, so an unsupported lab never
//! causes a network call. After the strategy returns, success or failure, a
//! session the strategy opened is released unless the caller asked to keep
//! it. A session that was already live belongs to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config;
use crate::error::ParseError;
use crate::models::{LabIdentity, StrategyFamily};
use crate::pipeline::identify::Identification;
use crate::pipeline::session::Headers;
use crate::pipeline::strategies::{ExtractionStrategy, RawExtraction, StrategyContext, StrategyInput};

/// Uniform arguments passed to every strategy.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub headers: Headers,
    pub timeout: Duration,
    /// Keep the session open after the strategy returns.
    pub persist_session: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            headers: Headers::new(),
            timeout: Duration::from_secs(config::DEFAULT_TIMEOUT_SECS),
            persist_session: false,
        }
    }
}

/// Open string key → strategy.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn ExtractionStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` under `key`, replacing any previous one.
    pub fn register(&mut self, key: &str, strategy: Arc<dyn ExtractionStrategy>) {
        if self.strategies.insert(key.to_string(), strategy).is_some() {
            tracing::debug!(key = %key, "Replaced registered strategy");
        }
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn ExtractionStrategy>> {
        self.strategies.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.strategies.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    /// The lab and its strategy, or Unsupported.
    pub fn resolve<'a>(
        &'a self,
        identification: Identification<'a>,
    ) -> Result<(&'a LabIdentity, &'a Arc<dyn ExtractionStrategy>), ParseError> {
        let lab = identification.lab().ok_or_else(|| {
            ParseError::Unsupported("unidentified document (no lab signature matched)".into())
        })?;
        let strategy = self
            .get(&lab.key)
            .ok_or_else(|| ParseError::Unsupported(lab.key.clone()))?;
        Ok((lab, strategy))
    }
}

/// Output of one dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// Dispatch key of the strategy that ran.
    pub strategy: String,
    pub family: StrategyFamily,
    pub extraction: RawExtraction,
}

/// Run the strategy registered for `identification` on `input`.
pub fn dispatch(
    registry: &StrategyRegistry,
    identification: Identification<'_>,
    input: &StrategyInput<'_>,
    ctx: &mut StrategyContext<'_>,
) -> Result<Dispatched, ParseError> {
    let (lab, strategy) = registry.resolve(identification)?;
    let family = strategy.family();
    tracing::info!(lab = %lab.label, key = %lab.key, family = %family, "Dispatching");

    let opened_here = !ctx.session.is_open();
    let result = strategy.extract(input, ctx);

    if !ctx.options.persist_session && opened_here && ctx.session.is_open() {
        ctx.session.release();
    }

    match result {
        Ok(extraction) => {
            tracing::debug!(
                key = %lab.key,
                fields = extraction.fields.len(),
                rows = extraction.rows.len(),
                "Strategy finished"
            );
            Ok(Dispatched {
                strategy: lab.key.clone(),
                family,
                extraction,
            })
        }
        Err(e) => {
            tracing::warn!(key = %lab.key, error = %e, "Strategy failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawFieldMap;
    use crate::pipeline::normalize::SynonymTables;
    use crate::pipeline::session::{SessionSlot, StaticFetcher};

    const URL: &str = "https://lims.example.com/coa/7";

    /// Fetches the input URL and stores the body as a field.
    struct FetchingStrategy;

    impl ExtractionStrategy for FetchingStrategy {
        fn family(&self) -> StrategyFamily {
            StrategyFamily::HostedPage
        }

        fn extract(
            &self,
            input: &StrategyInput<'_>,
            ctx: &mut StrategyContext<'_>,
        ) -> Result<RawExtraction, ParseError> {
            let url = input
                .url()
                .ok_or_else(|| ParseError::NotFound("no url".into()))?;
            let body = ctx
                .session
                .session()?
                .fetch(url, &ctx.options.headers, ctx.options.timeout)?;
            let mut fields = RawFieldMap::new();
            fields.insert("Body".into(), String::from_utf8_lossy(&body).into_owned());
            Ok(RawExtraction {
                fields,
                ..RawExtraction::default()
            })
        }
    }

    fn lab(key: &str) -> LabIdentity {
        LabIdentity::new("Example LIMS", key).with_url("lims.example.com")
    }

    fn registry() -> StrategyRegistry {
        let mut registry = StrategyRegistry::new();
        registry.register("example", Arc::new(FetchingStrategy));
        registry
    }

    fn run(
        registry: &StrategyRegistry,
        lab: Option<&LabIdentity>,
        slot: &mut SessionSlot,
        options: &DispatchOptions,
    ) -> Result<Dispatched, ParseError> {
        let tables = SynonymTables::default();
        let mut ctx = StrategyContext {
            session: slot,
            options,
            tables: &tables,
            labs: &[],
            decoder: None,
        };
        let identification = lab.map_or(Identification::Unknown, Identification::Known);
        dispatch(registry, identification, &StrategyInput::Url(URL), &mut ctx)
    }

    #[test]
    fn unknown_and_unregistered_are_unsupported_without_network() {
        let fetcher = StaticFetcher::new().with_page(URL, "ok");
        let mut slot = fetcher.slot();
        let options = DispatchOptions::default();

        let err = run(&registry(), None, &mut slot, &options).unwrap_err();
        assert_eq!(err.kind(), "unsupported");

        let steep_hill = lab("steep_hill");
        let err = run(&registry(), Some(&steep_hill), &mut slot, &options).unwrap_err();
        assert_eq!(err.kind(), "unsupported");
        assert!(err.to_string().contains("steep_hill"));
        assert_eq!(fetcher.connects(), 0);
        assert_eq!(fetcher.requests(), 0);
    }

    #[test]
    fn session_released_after_success() {
        let fetcher = StaticFetcher::new().with_page(URL, "ok");
        let mut slot = fetcher.slot();
        let example = lab("example");
        let dispatched = run(&registry(), Some(&example), &mut slot, &DispatchOptions::default())
            .unwrap();
        assert_eq!(dispatched.strategy, "example");
        assert_eq!(dispatched.family, StrategyFamily::HostedPage);
        assert_eq!(dispatched.extraction.fields["Body"], "ok");
        assert!(slot.is_released());
    }

    #[test]
    fn session_released_after_failure() {
        let fetcher = StaticFetcher::new();
        let mut slot = fetcher.slot();
        let example = lab("example");
        let err = run(&registry(), Some(&example), &mut slot, &DispatchOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "network_failure");
        assert!(slot.is_released());
    }

    #[test]
    fn persisted_session_is_reused() {
        let fetcher = StaticFetcher::new().with_page(URL, "ok");
        let mut slot = fetcher.slot();
        let options = DispatchOptions {
            persist_session: true,
            ..DispatchOptions::default()
        };
        let example = lab("example");
        for _ in 0..3 {
            run(&registry(), Some(&example), &mut slot, &options).unwrap();
        }
        assert!(slot.is_open());
        assert_eq!(fetcher.connects(), 1);
        assert_eq!(fetcher.requests(), 3);
    }

    #[test]
    fn caller_owned_session_is_left_open() {
        let fetcher = StaticFetcher::new().with_page(URL, "ok");
        let mut slot = fetcher.slot();
        slot.session().unwrap();
        let example = lab("example");
        run(&registry(), Some(&example), &mut slot, &DispatchOptions::default()).unwrap();
        assert!(slot.is_open());
        assert_eq!(fetcher.connects(), 1);
    }

    #[test]
    fn registration_replaces_by_key() {
        let mut registry = registry();
        registry.register("example", Arc::new(FetchingStrategy));
        assert_eq!(registry.keys().count(), 1);
        assert!(registry.contains("example"));
        assert!(!registry.contains("sclabs"));
    }
}
