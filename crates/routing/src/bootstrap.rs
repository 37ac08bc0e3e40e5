//! Process-start wiring
//!
//! Every client handle (directory, DNS, cache backend) is constructed
//! once here and injected explicitly, so tests can substitute fakes
//! and shutdown is deterministic. No first-use globals.

use std::sync::Arc;

use quillhost_cache::{BackendError, CacheStore, RedisBackend, RefreshPool};

use crate::config::Config;
use crate::directory::{DirectoryClient, DirectoryError};
use crate::locale::{LocalePolicy, LocaleRouter};
use crate::orchestrator::{LocaleDetector, RoutingOrchestrator};
use crate::resolver::TenantResolver;
use crate::verify::{DnsRecordLookup, DomainVerifier};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("cache backend unavailable: {0}")]
    Cache(#[from] BackendError),

    #[error("directory client: {0}")]
    Directory(#[from] DirectoryError),
}

/// Build the full routing stack from configuration. Fails only on
/// startup-fatal problems; per-request degradation is handled inside
/// the components.
pub async fn build_orchestrator(
    config: &Config,
    detector: Option<LocaleDetector>,
) -> Result<RoutingOrchestrator, BootstrapError> {
    let backend = Arc::new(RedisBackend::connect(&config.redis_url).await?);
    let refresh = RefreshPool::new(config.refresh_queue_depth, config.refresh_concurrency);
    let cache = Arc::new(CacheStore::new(backend, refresh, config.max_refresh_jitter));

    let directory = Arc::new(DirectoryClient::new(
        config.directory_url.clone(),
        config.directory_timeout,
        config.hostname_retry_count,
    )?);
    let lookup = Arc::new(DnsRecordLookup::new(config.directory_timeout));
    let verifier = Arc::new(DomainVerifier::new(directory.clone(), lookup));

    let resolver = TenantResolver::new(
        directory,
        verifier,
        cache,
        config.base_domain.clone(),
        config.cache_ttl,
        config.verify_ttl,
    );

    let locales = LocaleRouter::new(LocalePolicy::new(
        config.default_locale.clone(),
        config.supported_locales.clone(),
        config.prefix_default_locale,
    ));

    Ok(RoutingOrchestrator::new(
        resolver,
        locales,
        config.locale_cookie.clone(),
        detector,
    ))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_build_orchestrator() {
        let config = Config::from_env().unwrap();
        let orchestrator = build_orchestrator(&config, None).await.unwrap();

        let outcome = orchestrator
            .handle(&crate::orchestrator::RoutingRequest {
                host: config.base_domain.clone(),
                path: "/".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(
            outcome.decision,
            crate::orchestrator::RouteDecision::Rewrite { .. }
        ));
    }
}
