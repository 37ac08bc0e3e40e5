//! Per-request routing orchestration
//!
//! Sequences tenant resolution and locale routing into one decision:
//! pass, rewrite, or redirect, plus any headers and cookies the host
//! HTTP layer should attach. The orchestrator is total: every request
//! gets a decision, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use crate::locale::{LocaleAction, LocaleRouter};
use crate::resolver::TenantResolver;

/// Paths that must never be tenant-routed
pub const BYPASS_PREFIXES: &[&str] = &[
    "/api/",
    "/assets/",
    "/_internal/",
    "/healthz",
    "/.well-known/",
];

/// Internal marker header carrying the resolved tenant handle, so
/// downstream content serving does not re-resolve the host
pub const TENANT_HEADER: &str = "x-quillhost-tenant";

/// Status for bouncing a subdomain to its canonical custom domain.
/// Temporary on purpose: domain ownership is revocable.
const CUSTOM_DOMAIN_REDIRECT_STATUS: u16 = 302;

/// Locale cookie lifetime (one year)
const LOCALE_COOKIE_MAX_AGE_SECS: u64 = 365 * 24 * 60 * 60;

/// Inbound request surface the orchestrator consumes
#[derive(Debug, Clone, Default)]
pub struct RoutingRequest {
    /// Host header (or forwarded-host equivalent)
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    pub cookies: HashMap<String, String>,
    pub accept_language: Option<String>,
}

/// Abstracts Accept-Language parsing; supplied by the host environment
pub type LocaleDetector = Arc<dyn Fn(&RoutingRequest) -> Option<String> + Send + Sync>;

/// The routing decision handed back to the host HTTP layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Serve as-is
    Pass,
    /// Serve a different internal path, same visible URL
    Rewrite { path: String },
    /// Visible 30x to the client
    Redirect { location: String, status: u16 },
}

/// Set-Cookie instruction for the host layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub max_age_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingOutcome {
    pub decision: RouteDecision,
    pub headers: Vec<(String, String)>,
    pub set_cookies: Vec<SetCookie>,
}

impl RoutingOutcome {
    fn pass() -> Self {
        Self {
            decision: RouteDecision::Pass,
            headers: Vec::new(),
            set_cookies: Vec::new(),
        }
    }
}

/// Entry point invoked once per inbound request
pub struct RoutingOrchestrator {
    resolver: TenantResolver,
    locales: LocaleRouter,
    locale_cookie: String,
    detector: Option<LocaleDetector>,
}

impl RoutingOrchestrator {
    pub fn new(
        resolver: TenantResolver,
        locales: LocaleRouter,
        locale_cookie: impl Into<String>,
        detector: Option<LocaleDetector>,
    ) -> Self {
        Self {
            resolver,
            locales,
            locale_cookie: locale_cookie.into(),
            detector,
        }
    }

    pub async fn handle(&self, request: &RoutingRequest) -> RoutingOutcome {
        if BYPASS_PREFIXES
            .iter()
            .any(|prefix| request.path.starts_with(prefix))
        {
            return RoutingOutcome::pass();
        }

        let resolution = self.resolver.resolve(&request.host).await;

        // Custom-domain bounce short-circuits locale routing; the
        // canonical host re-enters the router on the next request.
        if let Some(target) = resolution.redirect_to {
            let mut url = target;
            url.set_path(&request.path);
            url.set_query(request.query.as_deref());
            return RoutingOutcome {
                decision: RouteDecision::Redirect {
                    location: url.to_string(),
                    status: CUSTOM_DOMAIN_REDIRECT_STATUS,
                },
                headers: Vec::new(),
                set_cookies: Vec::new(),
            };
        }

        let cookie = request.cookies.get(&self.locale_cookie).map(String::as_str);
        let detected = self
            .detector
            .as_ref()
            .and_then(|detect| detect(request));

        let route = self
            .locales
            .route(&request.path, request.query.as_deref(), cookie, detected.as_deref());

        let decision = match route.action {
            LocaleAction::Rewrite { path } => RouteDecision::Rewrite { path },
            LocaleAction::Redirect { path, status } => RouteDecision::Redirect {
                location: path,
                status,
            },
        };

        let mut headers = Vec::new();
        if let Some(handle) = &resolution.subdomain {
            headers.push((TENANT_HEADER.to_string(), handle.clone()));
        }

        // Persist the locale once it diverges from the stored cookie.
        // A missing cookie with the default locale stays unset to keep
        // first-visit responses cookie-free.
        let mut set_cookies = Vec::new();
        let locale_changed = match cookie {
            Some(current) => current != route.locale,
            None => route.locale != self.locales.policy_default(),
        };
        if locale_changed {
            set_cookies.push(SetCookie {
                name: self.locale_cookie.clone(),
                value: route.locale,
                path: "/".to_string(),
                max_age_secs: LOCALE_COOKIE_MAX_AGE_SECS,
            });
        }

        RoutingOutcome {
            decision,
            headers,
            set_cookies,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::directory::{Directory, DirectoryError, TenantIdentity};
    use crate::locale::LocalePolicy;
    use crate::verify::{DomainVerifier, LookupError, RecordLookup};
    use async_trait::async_trait;
    use quillhost_cache::{CacheStore, MemoryBackend, RefreshPool};
    use std::time::Duration;

    struct FakeDirectory {
        identity: Option<TenantIdentity>,
        hostname_handle: Option<String>,
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn resolve_handle(
            &self,
            _handle: &str,
        ) -> Result<Option<TenantIdentity>, DirectoryError> {
            Ok(self.identity.clone())
        }

        async fn resolve_hostname(
            &self,
            _hostname: &str,
        ) -> Result<Option<String>, DirectoryError> {
            Ok(self.hostname_handle.clone())
        }
    }

    struct NoRecords;

    #[async_trait]
    impl RecordLookup for NoRecords {
        async fn txt(&self, _name: &str) -> Result<Vec<String>, LookupError> {
            Err(LookupError::Resolve("NXDOMAIN".to_string()))
        }
    }

    fn orchestrator_with(
        identity: Option<TenantIdentity>,
        detector: Option<LocaleDetector>,
    ) -> RoutingOrchestrator {
        let directory: Arc<dyn Directory> = Arc::new(FakeDirectory {
            identity,
            hostname_handle: None,
        });
        let verifier = Arc::new(DomainVerifier::new(
            Arc::clone(&directory),
            Arc::new(NoRecords),
        ));
        let cache = Arc::new(CacheStore::new(
            Arc::new(MemoryBackend::new()),
            RefreshPool::new(64, 8),
            Duration::ZERO,
        ));
        let resolver = TenantResolver::new(
            directory,
            verifier,
            cache,
            "quillhost.com",
            Duration::from_secs(300),
            Duration::from_secs(600),
        );
        let locales = LocaleRouter::new(LocalePolicy::new(
            "en",
            vec!["en".into(), "zh".into()],
            false,
        ));
        RoutingOrchestrator::new(resolver, locales, "preferred_locale", detector)
    }

    fn request(host: &str, path: &str) -> RoutingRequest {
        RoutingRequest {
            host: host.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    async fn handle_settled(
        orchestrator: &RoutingOrchestrator,
        request: &RoutingRequest,
    ) -> RoutingOutcome {
        let _ = orchestrator.handle(request).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        orchestrator.handle(request).await
    }

    #[tokio::test]
    async fn test_bypass_prefixes_pass_untouched() {
        let orchestrator = orchestrator_with(None, None);

        for path in ["/api/feed", "/healthz", "/.well-known/acme", "/assets/app.js"] {
            let outcome = orchestrator
                .handle(&request("alice.quillhost.com", path))
                .await;
            assert_eq!(outcome, RoutingOutcome::pass(), "path {}", path);
        }
    }

    #[tokio::test]
    async fn test_tenant_header_on_subdomain_serve() {
        let orchestrator = orchestrator_with(
            Some(TenantIdentity {
                handle: "alice".to_string(),
                custom_domain: None,
            }),
            None,
        );

        let outcome = handle_settled(&orchestrator, &request("alice.quillhost.com", "/posts")).await;
        assert!(matches!(outcome.decision, RouteDecision::Rewrite { .. }));
        assert!(outcome
            .headers
            .contains(&(TENANT_HEADER.to_string(), "alice".to_string())));
    }

    #[tokio::test]
    async fn test_custom_domain_redirect_short_circuits_locales() {
        let orchestrator = orchestrator_with(
            Some(TenantIdentity {
                handle: "alice".to_string(),
                custom_domain: Some("alice.blog".to_string()),
            }),
            None,
        );

        let mut req = request("alice.quillhost.com", "/en/posts");
        req.query = Some("page=2".to_string());

        let outcome = handle_settled(&orchestrator, &req).await;
        assert_eq!(
            outcome.decision,
            RouteDecision::Redirect {
                location: "https://alice.blog/en/posts?page=2".to_string(),
                status: 302
            }
        );
        // No locale processing, no tenant header on a bounce
        assert!(outcome.headers.is_empty());
        assert!(outcome.set_cookies.is_empty());
    }

    #[tokio::test]
    async fn test_locale_redirect_sets_cookie() {
        let detector: LocaleDetector = Arc::new(|_req: &RoutingRequest| Some("zh".to_string()));
        let orchestrator = orchestrator_with(None, Some(detector));

        let outcome = orchestrator.handle(&request("quillhost.com", "/posts")).await;
        assert_eq!(
            outcome.decision,
            RouteDecision::Redirect {
                location: "/zh/posts".to_string(),
                status: 307
            }
        );
        assert_eq!(
            outcome.set_cookies,
            vec![SetCookie {
                name: "preferred_locale".to_string(),
                value: "zh".to_string(),
                path: "/".to_string(),
                max_age_secs: 365 * 24 * 60 * 60,
            }]
        );
    }

    #[tokio::test]
    async fn test_default_locale_without_cookie_stays_cookie_free() {
        let orchestrator = orchestrator_with(None, None);

        let outcome = orchestrator.handle(&request("quillhost.com", "/posts")).await;
        assert_eq!(
            outcome.decision,
            RouteDecision::Rewrite {
                path: "/posts".to_string()
            }
        );
        assert!(outcome.set_cookies.is_empty());
    }

    #[tokio::test]
    async fn test_matching_cookie_is_not_rewritten() {
        let orchestrator = orchestrator_with(None, None);

        let mut req = request("quillhost.com", "/zh/posts");
        req.cookies
            .insert("preferred_locale".to_string(), "zh".to_string());

        let outcome = orchestrator.handle(&req).await;
        assert_eq!(
            outcome.decision,
            RouteDecision::Rewrite {
                path: "/posts".to_string()
            }
        );
        assert!(outcome.set_cookies.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_locale_prefix_updates_cookie() {
        let orchestrator = orchestrator_with(None, None);

        let mut req = request("quillhost.com", "/zh/posts");
        req.cookies
            .insert("preferred_locale".to_string(), "en".to_string());

        let outcome = orchestrator.handle(&req).await;
        assert_eq!(outcome.set_cookies.len(), 1);
        assert_eq!(outcome.set_cookies[0].value, "zh");
    }

    #[tokio::test]
    async fn test_unknown_host_still_gets_a_decision() {
        let orchestrator = orchestrator_with(None, None);

        let outcome = handle_settled(&orchestrator, &request("nobody.example", "/")).await;
        assert!(matches!(outcome.decision, RouteDecision::Rewrite { .. }));
        assert!(outcome.headers.is_empty());
    }
}
