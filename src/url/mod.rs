//! URL handling for Kumo-Loom
//!
//! Normalization and host-scope matching used by the crawl frontier. All
//! membership checks (visited/pending) operate on normalized URL strings so
//! that `http://WWW.Example.com/a/` and `https://example.com/a` count as one
//! page.

mod normalize;

pub use normalize::normalize_url;

use url::Url;

/// Extracts the lowercase host from a URL
///
/// Returns `None` for URLs without a host, which should not occur for valid
/// HTTP(S) URLs.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use kumo_loom::url::extract_host;
///
/// let url = Url::parse("https://Example.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks whether a URL belongs to the given crawl scope
///
/// Scope is host equality on normalized hosts; a leading `www.` on either
/// side is ignored so a site serving both forms stays one scope.
///
/// # Arguments
///
/// * `url` - The candidate URL (already normalized or not)
/// * `scope_host` - The lowercase host that bounds the crawl
pub fn same_scope(url: &Url, scope_host: &str) -> bool {
    match extract_host(url) {
        Some(host) => strip_www(&host) == strip_www(&scope_host.to_lowercase()),
        None => false,
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
