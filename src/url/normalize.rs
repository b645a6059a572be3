use crate::UrlError;
use url::Url;

/// Query parameters stripped during normalization; they never change the
/// page that gets served.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
];

/// Normalizes a URL for frontier membership checks
///
/// # Normalization Steps
///
/// 1. Parse; reject anything that is not HTTP or HTTPS
/// 2. Lowercase the host and strip a leading `www.`
/// 3. Collapse the path (drop `.`/`..` segments, duplicate and trailing
///    slashes; an empty path becomes `/`)
/// 4. Drop the fragment
/// 5. Drop tracking query parameters, sort the survivors, drop an empty
///    query entirely
///
/// Both HTTP and HTTPS are accepted unchanged; mock servers in tests only
/// speak plain HTTP.
///
/// # Examples
///
/// ```
/// use kumo_loom::url::normalize_url;
///
/// let url = normalize_url("https://WWW.EXAMPLE.COM/a/b/../c/").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/a/c");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) => {
            let mut normalized = host.to_lowercase();
            if let Some(stripped) = normalized.strip_prefix("www.") {
                normalized = stripped.to_string();
            }
            url.set_host(Some(&normalized))
                .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
        }
        None => return Err(UrlError::MissingHost),
    }

    let collapsed = collapse_path(url.path());
    url.set_path(&collapsed);

    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));

        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

/// Collapses dot segments and redundant slashes; trailing slash is kept only
/// on the root path.
fn collapse_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_host() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_strip_www() {
        let result = normalize_url("https://www.example.com/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_http_kept() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_trailing_slash_removed() {
        let result = normalize_url("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_root_slash_kept() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_dot_segments_collapsed() {
        let result = normalize_url("https://example.com/a/b/../c/./d").unwrap();
        assert_eq!(result.as_str(), "https://example.com/a/c/d");
    }

    #[test]
    fn test_fragment_removed() {
        let result = normalize_url("https://example.com/page#section-2").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_tracking_params_removed() {
        let result =
            normalize_url("https://example.com/page?utm_source=x&utm_medium=y&fbclid=abc")
                .unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_remaining_params_sorted() {
        let result = normalize_url("https://example.com/search?q=rust&page=2").unwrap();
        assert_eq!(result.as_str(), "https://example.com/search?page=2&q=rust");
    }

    #[test]
    fn test_mixed_params() {
        let result = normalize_url("https://example.com/p?b=2&utm_campaign=spring&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/p?a=1&b=2");
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let result = normalize_url("ftp://example.com/file");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_port_preserved() {
        let result = normalize_url("http://127.0.0.1:4321/page").unwrap();
        assert_eq!(result.as_str(), "http://127.0.0.1:4321/page");
    }

    #[test]
    fn test_equivalent_forms_collapse() {
        let a = normalize_url("https://www.example.com/a/?utm_source=t").unwrap();
        let b = normalize_url("https://example.com/a").unwrap();
        assert_eq!(a, b);
    }
}
