//! Quillhost tenant routing
//!
//! Classifies every inbound request to a tenant before content is
//! served. A tenant is reachable through a subdomain of the platform's
//! base domain or through a verified custom domain; the resolver
//! decides between pass-through, internal rewrite, and redirect to the
//! canonical host, and the locale router canonicalizes locale prefixes
//! on top of that. All slow lookups go through the cache-aside layer
//! in `quillhost-cache`.
//!
//! The host HTTP layer is an external collaborator: it feeds
//! `RoutingRequest`s in and executes the returned `RouteDecision`.

pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod locale;
pub mod orchestrator;
pub mod resolver;
pub mod verify;

pub use bootstrap::{build_orchestrator, BootstrapError};
pub use config::{Config, ConfigError};
pub use directory::{Directory, DirectoryClient, DirectoryError, TenantIdentity};
pub use locale::{LocaleAction, LocalePolicy, LocaleRoute, LocaleRouter};
pub use orchestrator::{
    LocaleDetector, RouteDecision, RoutingOrchestrator, RoutingOutcome, RoutingRequest, SetCookie,
    BYPASS_PREFIXES, TENANT_HEADER,
};
pub use resolver::{TenantResolution, TenantResolver, RESERVED_SUBDOMAINS};
pub use verify::{DnsRecordLookup, DomainVerifier, LookupError, RecordLookup};
