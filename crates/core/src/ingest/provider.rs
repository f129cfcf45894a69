use crate::config::Settings;
use crate::ingest::types::FeedPage;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/list";
/// Response bytes carried into error messages.
const BODY_EXCERPT_CHARS: usize = 200;

/// Paginated source of analyst-action records.
#[async_trait::async_trait]
pub trait FeedClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Fetches the page at `cursor` (`None` for the first page).
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage>;
}

#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    path: String,
}

impl HttpFeedClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.feed_base_url().to_string();
        let api_token = settings.require_feed_api_token()?.to_string();

        let timeout_secs = std::env::var("FEED_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let path = std::env::var("FEED_LIST_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build feed http client")?;

        Ok(Self {
            http,
            base_url,
            api_token,
            path,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_token))
                .context("feed api token is not a valid header value")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl FeedClient for HttpFeedClient {
    fn provider_name(&self) -> &'static str {
        "http_json_feed"
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage> {
        let mut req = self.http.get(self.url()).headers(self.headers()?);
        if let Some(cursor) = cursor {
            req = req.query(&[("next_page", cursor)]);
        }

        let res = req.send().await.context("feed request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read feed response")?;
        if !status.is_success() {
            anyhow::bail!("feed HTTP {status}: {}", body_excerpt(&text));
        }

        parse_page(&text)
    }
}

/// Decodes the page envelope. Items are validated one by one during ingestion.
pub fn parse_page(text: &str) -> Result<FeedPage> {
    serde_json::from_str::<FeedPage>(text)
        .with_context(|| format!("feed response is not a valid page: {}", body_excerpt(text)))
}

fn body_excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(BODY_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}... ({} bytes)", text.len())
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::FeedRecord;
    use serde_json::json;

    fn client(base_url: &str, path: &str) -> HttpFeedClient {
        HttpFeedClient {
            http: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_token: "token".to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn joins_base_url_and_path() {
        assert_eq!(
            client("https://feed.example/api/", "list").url(),
            "https://feed.example/api/list"
        );
        assert_eq!(
            client("https://feed.example/api", "/list").url(),
            "https://feed.example/api/list"
        );
    }

    #[test]
    fn sends_bearer_token() {
        let headers = client("https://feed.example", "/list").headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer token");
    }

    #[test]
    fn parses_page_with_cursor() {
        let body = json!({
            "items": [
                {
                    "ticker": "BSBR",
                    "target_from": "$4.20",
                    "target_to": "$4.70",
                    "company": "Banco Santander (Brasil)",
                    "action": "upgraded by",
                    "brokerage": "The Goldman Sachs Group",
                    "rating_from": "Sell",
                    "rating_to": "Neutral",
                    "time": "2025-01-13T00:30:05.813548892Z"
                }
            ],
            "next_page": "BSBR"
        })
        .to_string();

        let page = parse_page(&body).unwrap();
        assert_eq!(page.items.len(), 1);
        let record = FeedRecord::from_item(&page.items[0]).unwrap();
        assert_eq!(record.ticker, "BSBR");
        assert_eq!(record.rating_to, "Neutral");
        assert_eq!(page.next_cursor(), Some("BSBR"));
    }

    #[test]
    fn empty_cursor_means_exhausted() {
        let page = parse_page(r#"{"items": [], "next_page": ""}"#).unwrap();
        assert_eq!(page.next_cursor(), None);

        let page = parse_page(r#"{"items": []}"#).unwrap();
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn bad_item_does_not_reject_its_page() {
        let body = json!({
            "items": [
                {"ticker": "AAPL", "rating_from": "Hold", "time": "2025-01-13T00:30:05Z"},
                {"ticker": "MSFT", "rating_from": null, "time": "2025-01-13T00:30:05Z"},
                {"ticker": "X"}
            ],
            "next_page": "X"
        })
        .to_string();

        let page = parse_page(&body).unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(FeedRecord::from_item(&page.items[1]).is_ok());
        assert!(FeedRecord::from_item(&page.items[2]).is_err());
    }

    #[test]
    fn rejects_broken_page_structure() {
        assert!(parse_page("<html>bad gateway</html>").is_err());
        assert!(parse_page(r#"{"items": {"ticker": "X"}}"#).is_err());
        assert!(parse_page(r#"[{"ticker": "X"}]"#).is_err());
    }

    #[test]
    fn error_messages_carry_a_short_body_excerpt() {
        let body = format!("<html>{}</html>", "x".repeat(10_000));
        let err = format!("{:#}", parse_page(&body).unwrap_err());
        assert!(err.len() < 1_000, "{}", err.len());
        assert!(err.contains("(10013 bytes)"));

        assert_eq!(body_excerpt("short"), "short");
    }
}
