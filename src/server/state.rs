use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::ledger::{create_ledger_backend, LedgerBackend};
use crate::notification::NotificationDispatcher;
use crate::postgres::PostgresPool;
use crate::redis::RedisHealth;
use crate::template::{create_template_backend, TemplateStore};
use crate::transport::{create_transports, TransportRegistry};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub template_store: TemplateStore,
    pub ledger: Arc<dyn LedgerBackend>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub redis_health: Arc<RedisHealth>,
    pub postgres_pool: Option<Arc<PostgresPool>>,
    pub start_time: Instant,
}

impl AppState {
    /// Build the state with backends and transports chosen from configuration
    pub fn new(settings: Settings, postgres_pool: Option<Arc<PostgresPool>>) -> Self {
        let template_backend = create_template_backend(&settings.storage, postgres_pool.clone());
        let ledger = create_ledger_backend(&settings.storage, postgres_pool.clone());
        let transports = create_transports(&settings);

        Self::with_components(
            settings,
            TemplateStore::new(template_backend),
            ledger,
            transports,
            postgres_pool,
        )
    }

    /// Build the state from explicit components
    pub fn with_components(
        settings: Settings,
        template_store: TemplateStore,
        ledger: Arc<dyn LedgerBackend>,
        transports: TransportRegistry,
        postgres_pool: Option<Arc<PostgresPool>>,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            template_store.clone(),
            ledger.clone(),
            transports,
            Duration::from_secs(settings.transport.timeout_seconds),
        ));

        Self {
            settings: Arc::new(settings),
            template_store,
            ledger,
            dispatcher,
            redis_health: Arc::new(RedisHealth::new()),
            postgres_pool,
            start_time: Instant::now(),
        }
    }
}
