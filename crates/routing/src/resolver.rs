//! Host-to-tenant resolution
//!
//! Resolves incoming Host headers to tenants. Supports:
//! - Platform subdomains: alice.quillhost.com -> serve handle "alice"
//! - Canonical custom domains: alice.quillhost.com -> redirect to
//!   alice.blog when the tenant declared (and still owns) it
//! - Custom domains: alice.blog -> serve handle "alice" directly
//!
//! Resolution is cheap on the hot path: everything past the base-domain
//! check is wrapped through the cache with the stale-empty policy, so a
//! cold host costs one deliberate "not a tenant" answer instead of a
//! request storm against the directory.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use quillhost_cache::{CacheOptions, CacheStore};

use crate::directory::{Directory, TenantIdentity};
use crate::verify::DomainVerifier;

/// Subdomains that can never belong to a tenant
pub const RESERVED_SUBDOMAINS: &[&str] = &[
    "api", "www", "admin", "mail", "app", "dashboard", "docs", "help", "support", "status",
    "cdn", "static", "assets", "staging", "dev",
];

/// Outcome of resolving one Host value. Exactly one shape holds:
/// both fields absent (not a tenant), `subdomain` alone (serve the
/// tenant under the current host), or `redirect_to` alone (bounce to
/// the canonical host).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantResolution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<Url>,
}

impl TenantResolution {
    pub fn not_a_tenant() -> Self {
        Self {
            subdomain: None,
            redirect_to: None,
        }
    }

    pub fn subdomain(handle: impl Into<String>) -> Self {
        Self {
            subdomain: Some(handle.into()),
            redirect_to: None,
        }
    }

    pub fn redirect(url: Url) -> Self {
        Self {
            subdomain: None,
            redirect_to: Some(url),
        }
    }

    pub fn is_tenant(&self) -> bool {
        self.subdomain.is_some() || self.redirect_to.is_some()
    }
}

/// Host resolver with cache-aside lookups
#[derive(Clone)]
pub struct TenantResolver {
    directory: Arc<dyn Directory>,
    verifier: Arc<DomainVerifier>,
    cache: Arc<CacheStore>,
    base_domain: String,
    cache_ttl: Duration,
    verify_ttl: Duration,
}

impl TenantResolver {
    pub fn new(
        directory: Arc<dyn Directory>,
        verifier: Arc<DomainVerifier>,
        cache: Arc<CacheStore>,
        base_domain: impl Into<String>,
        cache_ttl: Duration,
        verify_ttl: Duration,
    ) -> Self {
        Self {
            directory,
            verifier,
            cache,
            base_domain: base_domain.into().to_lowercase(),
            cache_ttl,
            verify_ttl,
        }
    }

    /// Resolve a Host header to a tenant. Total: malformed hosts and
    /// collaborator failures all land on "not a tenant", never an
    /// error.
    pub async fn resolve(&self, host_header: &str) -> TenantResolution {
        let host = normalize_host(host_header);

        if !is_well_formed(&host) {
            return TenantResolution::not_a_tenant();
        }
        if host == self.base_domain {
            return TenantResolution::not_a_tenant();
        }

        // Stale-empty wrap: the first request for an unseen host gets
        // "not a tenant" while the real answer is computed in the
        // background. Accepted cold-start trade-off, protects the
        // directory from request storms.
        let resolver = self.clone();
        let host_key = host.clone();
        let opts = CacheOptions {
            allow_stale_empty: true,
            ttl: self.cache_ttl,
            ..Default::default()
        };
        let resolved = self
            .cache
            .get(&["tenant".into(), host.into()], opts, move || async move {
                Ok(resolver.resolve_uncached(&host_key).await)
            })
            .await;

        match resolved {
            Ok(Some(resolution)) => resolution,
            Ok(None) => TenantResolution::not_a_tenant(),
            // Unreachable on the stale-empty path, but resolution must
            // stay total regardless
            Err(e) => {
                tracing::warn!(error = %e, "tenant resolution compute failed");
                TenantResolution::not_a_tenant()
            }
        }
    }

    /// The actual decision tree, run on cache miss. `None` means "not
    /// a tenant" and is deliberately not cached.
    async fn resolve_uncached(&self, host: &str) -> Option<TenantResolution> {
        let base_suffix = format!(".{}", self.base_domain);

        if let Some(candidate) = host.strip_suffix(&base_suffix) {
            // Only single-label subdomains map to tenants
            if candidate.is_empty() || candidate.contains('.') {
                return None;
            }
            if RESERVED_SUBDOMAINS.contains(&candidate) {
                return None;
            }

            // A verified custom domain is the canonical host; bounce
            // the subdomain there.
            if let Some(declared) = self.lookup_identity(candidate).await.and_then(|identity| {
                let TenantIdentity { custom_domain, .. } = identity;
                custom_domain
            }) {
                if self.check_verified(&declared, candidate).await {
                    match Url::parse(&format!("https://{}", declared)) {
                        Ok(url) => return Some(TenantResolution::redirect(url)),
                        Err(e) => {
                            tracing::warn!(domain = %declared, error = %e, "declared custom domain is not a valid host");
                        }
                    }
                }
            }

            return Some(TenantResolution::subdomain(candidate));
        }

        // Arbitrary hostname: ask the directory who claims it. Custom
        // domains that resolve are served directly, not redirected
        // again.
        match self.directory.resolve_hostname(host).await {
            Ok(Some(handle)) => Some(TenantResolution::subdomain(handle)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "hostname resolution failed, treating as not found");
                None
            }
        }
    }

    /// Identity lookup, cache-wrapped with the standard TTL. Errors
    /// degrade to "unknown handle".
    async fn lookup_identity(&self, handle: &str) -> Option<TenantIdentity> {
        let directory = Arc::clone(&self.directory);
        let owned = handle.to_string();
        let opts = CacheOptions {
            ttl: self.cache_ttl,
            ..Default::default()
        };
        let result = self
            .cache
            .get(&["identity".into(), handle.into()], opts, move || async move {
                directory
                    .resolve_handle(&owned)
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await;

        match result {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(handle = %handle, error = %e, "identity lookup failed");
                None
            }
        }
    }

    /// Verification, cache-wrapped with a bounded TTL so a detached
    /// domain stops forwarding within that window. Both outcomes are
    /// cached.
    async fn check_verified(&self, domain: &str, handle: &str) -> bool {
        let verifier = Arc::clone(&self.verifier);
        let (owned_domain, owned_handle) = (domain.to_string(), handle.to_string());
        let opts = CacheOptions {
            ttl: self.verify_ttl,
            ..Default::default()
        };
        let result = self
            .cache
            .get(
                &["verify".into(), domain.into(), handle.into()],
                opts,
                move || async move { Ok(Some(verifier.verify(&owned_domain, &owned_handle).await)) },
            )
            .await;

        match result {
            Ok(Some(verified)) => verified,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "verification check failed");
                false
            }
        }
    }

    /// Drop the cached resolution for a host (e.g. after a tenant
    /// attaches or detaches a domain)
    pub async fn invalidate_host(&self, host: &str) {
        let host = normalize_host(host);
        self.cache.invalidate(&["tenant".into(), host.into()]).await;
    }
}

/// Normalize a host header value: strip port, trailing dot, lowercase
fn normalize_host(host: &str) -> String {
    let host = host.split(':').next().unwrap_or(host);
    host.trim().trim_end_matches('.').to_lowercase()
}

/// Cheap sanity check; anything unparsable terminates in "not a tenant"
fn is_well_formed(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}
