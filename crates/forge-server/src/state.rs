use forge_core::admin::{AdminDataSource, StaticAdminData};
use forge_core::backend::{InMemoryBackend, InMemoryUsage};
use forge_core::config::Config;
use forge_core::manager::EntitlementsManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub backend: Arc<InMemoryBackend>,
    pub manager: Arc<EntitlementsManager>,
    pub admin: Arc<dyn AdminDataSource>,
}

impl AppState {
    /// Load config, the org seed and admin data from `root`.
    pub fn load(root: PathBuf) -> forge_core::Result<Self> {
        let config = Config::load(&root)?;
        let backend = Arc::new(InMemoryBackend::load(&root)?);
        let admin = Arc::new(StaticAdminData::load(&root)?);
        Ok(Self::new(root, config, backend, admin))
    }

    pub fn new(
        root: PathBuf,
        config: Config,
        backend: Arc<InMemoryBackend>,
        admin: Arc<StaticAdminData>,
    ) -> Self {
        let manager = Arc::new(EntitlementsManager::with_cache_ttl(
            backend.clone(),
            Arc::new(InMemoryUsage::new()),
            config.cache_ttl(),
        ));

        // Guard: only spawn if inside a Tokio runtime (skipped in sync unit tests).
        if tokio::runtime::Handle::try_current().is_ok() {
            spawn_refreshers(&config, admin.clone());
        }

        Self {
            root,
            config: Arc::new(config),
            backend,
            manager,
            admin,
        }
    }
}

/// Tick the demo admin data on the configured intervals until the runtime
/// shuts down.
fn spawn_refreshers(config: &Config, admin: Arc<StaticAdminData>) {
    let usage_every = Duration::from_secs(config.refresh.api_usage_seconds.max(1));
    let health_every = Duration::from_secs(config.refresh.health_seconds.max(1));

    let usage_admin = admin.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(usage_every);
        interval.tick().await;
        let mut tick = 0u64;
        loop {
            interval.tick().await;
            tick += 1;
            if let Err(e) = usage_admin.tick_api_usage(tick, chrono::Utc::now()) {
                tracing::warn!(error = %e, "api usage refresh failed");
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(health_every);
        interval.tick().await;
        let mut tick = 0u64;
        loop {
            interval.tick().await;
            tick += 1;
            if let Err(e) = admin.tick_health(tick, chrono::Utc::now()) {
                tracing::warn!(error = %e, "health refresh failed");
            }
        }
    });
}
