pub mod check_config;
pub mod config;
pub mod entitlements;
pub mod gate;
pub mod paywall;
pub mod plans;
pub mod serve;
pub mod smoke;

use anyhow::Context;
use forge_core::backend::{EntitlementBackend, HttpEntitlementBackend, InMemoryBackend, InMemoryUsage};
use forge_core::config::Config;
use forge_core::manager::EntitlementsManager;
use std::path::Path;
use std::sync::Arc;

/// Manager over the deployed API when `api_base_url` is configured,
/// otherwise over the local org seed.
pub(crate) fn build_manager(root: &Path, config: &Config) -> anyhow::Result<EntitlementsManager> {
    let backend: Arc<dyn EntitlementBackend> = match &config.api_base_url {
        Some(url) => {
            let token = std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());
            Arc::new(HttpEntitlementBackend::new(url.as_str(), token, config.request_timeout())?)
        }
        None => Arc::new(InMemoryBackend::load(root).context("failed to load org seed")?),
    };
    Ok(EntitlementsManager::with_cache_ttl(
        backend,
        Arc::new(InMemoryUsage::new()),
        config.cache_ttl(),
    ))
}
