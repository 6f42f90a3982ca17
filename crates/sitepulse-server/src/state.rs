use std::sync::Arc;

use sitepulse_core::{
    analytics::AggregationService, clock::SystemClock, config::Config,
    consent::ConsentEnforcedUpstream, recorder::EventRecorder, store::SiteStore,
};
use sitepulse_duckdb::DuckDbStore;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    pub store: Arc<dyn SiteStore>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// Browsers run their own consent check before posting, so ingestion is
    /// gated with [`ConsentEnforcedUpstream`].
    pub recorder: EventRecorder,

    pub aggregation: AggregationService,
}

impl AppState {
    pub fn new(db: DuckDbStore, config: Config) -> Self {
        Self::with_store(Arc::new(db), config)
    }

    /// State over any [`SiteStore`], e.g. the in-memory one in tests.
    pub fn with_store(store: Arc<dyn SiteStore>, config: Config) -> Self {
        let recorder = EventRecorder::new(
            Arc::clone(&store),
            Arc::new(ConsentEnforcedUpstream),
            Arc::new(SystemClock),
        );
        let aggregation = AggregationService::new(Arc::clone(&store));
        Self {
            store,
            config: Arc::new(config),
            recorder,
            aggregation,
        }
    }
}
