//! Custom domain verification
//!
//! A custom domain is owned by whoever proves it, not whoever claims it
//! first. A claim is honored when the directory itself lists the domain
//! on the handle's identity (first-party dashboard flow), or when a
//! well-known TXT challenge record under the domain names the handle.
//! Both checks are advisory reads: a failed verification never mutates
//! anything, it only makes this resolution fall back to the platform
//! subdomain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::proto::rr::RecordType;
use trust_dns_resolver::TokioAsyncResolver;

use crate::directory::Directory;

/// Well-known challenge record prefix, queried as
/// `_quillhost-challenge.{domain}`
pub const CHALLENGE_RECORD_PREFIX: &str = "_quillhost-challenge";

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("dns lookup failed: {0}")]
    Resolve(String),
}

/// TXT record lookups, substitutable in tests
#[async_trait]
pub trait RecordLookup: Send + Sync {
    async fn txt(&self, name: &str) -> Result<Vec<String>, LookupError>;
}

/// DNS-backed lookup with a bounded timeout
pub struct DnsRecordLookup {
    resolver: TokioAsyncResolver,
}

impl DnsRecordLookup {
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), opts),
        }
    }
}

#[async_trait]
impl RecordLookup for DnsRecordLookup {
    async fn txt(&self, name: &str) -> Result<Vec<String>, LookupError> {
        let response = self
            .resolver
            .lookup(name, RecordType::TXT)
            .await
            .map_err(|e| LookupError::Resolve(e.to_string()))?;

        Ok(response
            .iter()
            .filter_map(|record| record.as_txt())
            .flat_map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|data| String::from_utf8_lossy(data).into_owned())
                    .collect::<Vec<_>>()
            })
            .collect())
    }
}

/// Confirms that a claimed domain is authorized for a handle
pub struct DomainVerifier {
    directory: Arc<dyn Directory>,
    lookup: Arc<dyn RecordLookup>,
}

impl DomainVerifier {
    pub fn new(directory: Arc<dyn Directory>, lookup: Arc<dyn RecordLookup>) -> Self {
        Self { directory, lookup }
    }

    /// `true` when `claimed` is authorized for `handle`. Lookup errors
    /// and timeouts read as unverified.
    pub async fn verify(&self, claimed: &str, handle: &str) -> bool {
        let claimed = claimed.trim_end_matches('.').to_lowercase();
        if claimed.is_empty() || handle.is_empty() {
            return false;
        }

        // Directory-declared attribute is sufficient on its own; it is
        // the cheaper check, so it goes first.
        match self.directory.resolve_handle(handle).await {
            Ok(Some(identity)) => {
                if identity
                    .custom_domain
                    .as_deref()
                    .is_some_and(|declared| declared.trim_end_matches('.').eq_ignore_ascii_case(&claimed))
                {
                    return true;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(handle = %handle, error = %e, "directory cross-check unavailable");
            }
        }

        // Fall back to the TXT challenge for domains attached out-of-band
        let record_name = format!("{}.{}", CHALLENGE_RECORD_PREFIX, claimed);
        match self.lookup.txt(&record_name).await {
            Ok(values) => values.iter().any(|value| value.trim() == handle),
            Err(e) => {
                tracing::debug!(domain = %claimed, error = %e, "challenge record lookup failed");
                false
            }
        }
    }
}
