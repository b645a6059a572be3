//! Plain-HTTP reference implementation of the page-fetch seam
//!
//! Fetches a page with reqwest and extracts the fields the orchestrator
//! cares about: title, meta description, and outgoing hrefs. It does not
//! render JavaScript; `js_rendering` in the settings is accepted and
//! ignored. Production deployments point the service at a browser-backed
//! engine instead.

use crate::config::ScrapeSettings;
use crate::fetch::{FetchError, PageFetcher, PageSnapshot};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use url::Url;

/// Reference fetch engine over plain HTTP
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds the engine with its HTTP client
    ///
    /// The per-request timeout comes from the job settings at fetch time;
    /// the client only fixes the connect timeout and user agent.
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        settings: &ScrapeSettings,
    ) -> Result<PageSnapshot, FetchError> {
        let started = Instant::now();

        let response = self
            .client
            .get(url.clone())
            .timeout(Duration::from_millis(settings.page_timeout_ms))
            .send()
            .await
            .map_err(|e| classify_request_error(url, &e))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::page(
                url.as_str(),
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::page(url.as_str(), format!("body read failed: {}", e)))?;

        let extracted = extract_fields(&body);

        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            links = extracted.links.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched page"
        );

        Ok(PageSnapshot {
            url: url.to_string(),
            final_url,
            status_code: status.as_u16(),
            extracted: serde_json::json!({
                "title": extracted.title,
                "meta_description": extracted.description,
                "link_count": extracted.links.len(),
            }),
            title: extracted.title,
            description: extracted.description,
            links: extracted.links,
            html_bytes: body.len(),
            fetched_in: started.elapsed(),
        })
    }
}

/// Timeouts and connection failures are page-scoped; a malformed client or
/// TLS setup problem would surface at build time, not here.
fn classify_request_error(url: &Url, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::page(url.as_str(), "request timed out")
    } else if error.is_connect() {
        FetchError::page(url.as_str(), format!("connection failed: {}", error))
    } else if error.is_builder() {
        FetchError::Engine(format!("client misconfigured: {}", error))
    } else {
        FetchError::page(url.as_str(), error.to_string())
    }
}

struct ExtractedFields {
    title: Option<String>,
    description: Option<String>,
    links: Vec<String>,
}

/// Pulls the orchestrator-relevant fields out of an HTML body
fn extract_fields(body: &str) -> ExtractedFields {
    let document = Html::parse_document(body);

    // These selector literals always parse.
    let title_sel = Selector::parse("title").unwrap();
    let meta_sel = Selector::parse("meta[name='description']").unwrap();
    let link_sel = Selector::parse("a[href]").unwrap();

    let title = document
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let description = document
        .select(&meta_sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let links = document
        .select(&link_sel)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .map(|href| href.to_string())
        .collect();

    ExtractedFields {
        title,
        description,
        links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title_and_description() {
        let html = r#"<html><head>
            <title> Example Page </title>
            <meta name="description" content="A page about things.">
            </head><body></body></html>"#;

        let fields = extract_fields(html);
        assert_eq!(fields.title.as_deref(), Some("Example Page"));
        assert_eq!(fields.description.as_deref(), Some("A page about things."));
    }

    #[test]
    fn test_extract_links_skips_anchors() {
        let html = r##"<html><body>
            <a href="/one">One</a>
            <a href="https://example.com/two">Two</a>
            <a href="#section">Anchor</a>
            <a href="">Empty</a>
            </body></html>"##;

        let fields = extract_fields(html);
        assert_eq!(fields.links, vec!["/one", "https://example.com/two"]);
    }

    #[test]
    fn test_extract_empty_document() {
        let fields = extract_fields("");
        assert!(fields.title.is_none());
        assert!(fields.description.is_none());
        assert!(fields.links.is_empty());
    }

    #[test]
    fn test_extract_whitespace_title_dropped() {
        let fields = extract_fields("<html><head><title>   </title></head></html>");
        assert!(fields.title.is_none());
    }
}
