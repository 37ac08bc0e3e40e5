//! Locale routing
//!
//! Locales live in a fixed, statically-known set with one default.
//! Non-default locales are visible as a path prefix (`/zh/archives`);
//! the default is canonical without a prefix unless policy says
//! otherwise, so every content item has exactly one canonical URL.

/// Status for canonicalization redirects (default-locale prefix
/// stripped from the visible URL)
pub const CANONICAL_REDIRECT_STATUS: u16 = 308;

/// Status for preference-driven redirects (cookie or detected locale)
pub const PREFERENCE_REDIRECT_STATUS: u16 = 307;

/// Locale policy, derived from configuration
#[derive(Debug, Clone)]
pub struct LocalePolicy {
    pub default_locale: String,
    pub supported: Vec<String>,
    /// Whether the default locale must appear as a path prefix
    pub prefix_default: bool,
}

impl LocalePolicy {
    pub fn new(default_locale: impl Into<String>, supported: Vec<String>, prefix_default: bool) -> Self {
        Self {
            default_locale: default_locale.into(),
            supported,
            prefix_default,
        }
    }

    fn is_supported(&self, locale: &str) -> bool {
        self.supported.iter().any(|l| l == locale)
    }

    /// Validate a locale token from a cookie or detector. Unknown
    /// tokens are rejected with a warning and never propagated.
    fn validate(&self, locale: &str) -> Option<String> {
        let locale = locale.trim().to_lowercase();
        if self.is_supported(&locale) {
            Some(locale)
        } else {
            tracing::warn!(locale = %locale, "unsupported locale token, falling back to default");
            None
        }
    }
}

/// What to do with the request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleAction {
    /// Serve a different internal path, same visible URL
    Rewrite { path: String },
    /// Visible redirect
    Redirect { path: String, status: u16 },
}

/// A locale decision: the action plus the locale now in effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleRoute {
    pub action: LocaleAction,
    pub locale: String,
}

/// Decides between redirect (canonicalize), rewrite (route internally)
/// and pass-through for one request path
#[derive(Debug, Clone)]
pub struct LocaleRouter {
    policy: LocalePolicy,
}

impl LocaleRouter {
    pub fn new(policy: LocalePolicy) -> Self {
        Self { policy }
    }

    pub(crate) fn policy_default(&self) -> &str {
        &self.policy.default_locale
    }

    /// `cookie` is the raw locale-preference cookie value, `detected`
    /// comes from the injected detection callback. Query string is
    /// preserved on every rewrite and redirect.
    pub fn route(
        &self,
        path: &str,
        query: Option<&str>,
        cookie: Option<&str>,
        detected: Option<&str>,
    ) -> LocaleRoute {
        let policy = &self.policy;

        if let Some((segment, rest)) = split_first_segment(path) {
            if policy.is_supported(segment) {
                let stripped = if rest.is_empty() { "/" } else { rest };

                if segment != policy.default_locale {
                    // Explicit non-default prefix: route internally to
                    // the locale-less path
                    return LocaleRoute {
                        action: LocaleAction::Rewrite {
                            path: with_query(stripped, query),
                        },
                        locale: segment.to_string(),
                    };
                }

                if !policy.prefix_default {
                    // Explicit default prefix is non-canonical
                    return LocaleRoute {
                        action: LocaleAction::Redirect {
                            path: with_query(stripped, query),
                            status: CANONICAL_REDIRECT_STATUS,
                        },
                        locale: policy.default_locale.clone(),
                    };
                }

                // Policy keeps the default prefixed; route internally
                return LocaleRoute {
                    action: LocaleAction::Rewrite {
                        path: with_query(stripped, query),
                    },
                    locale: policy.default_locale.clone(),
                };
            }
        }

        // No locale in the path: cookie, then detector, then default
        let effective = cookie
            .and_then(|c| policy.validate(c))
            .or_else(|| detected.and_then(|d| policy.validate(d)))
            .unwrap_or_else(|| policy.default_locale.clone());

        let needs_prefix = effective != policy.default_locale || policy.prefix_default;
        if needs_prefix {
            return LocaleRoute {
                action: LocaleAction::Redirect {
                    path: with_query(&prefixed(&effective, path), query),
                    status: PREFERENCE_REDIRECT_STATUS,
                },
                locale: effective,
            };
        }

        // Default locale, no prefix required: tag internally, no
        // visible redirect
        LocaleRoute {
            action: LocaleAction::Rewrite {
                path: with_query(path, query),
            },
            locale: effective,
        }
    }
}

/// Split "/zh/archives" into ("zh", "/archives"); `None` for "/"
fn split_first_segment(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.strip_prefix('/')?;
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.find('/') {
        Some(idx) => Some((&trimmed[..idx], &trimmed[idx..])),
        None => Some((trimmed, "")),
    }
}

fn prefixed(locale: &str, path: &str) -> String {
    if path == "/" {
        format!("/{}", locale)
    } else {
        format!("/{}{}", locale, path)
    }
}

fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    }
}
