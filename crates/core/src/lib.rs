pub mod domain;
pub mod ingest;
pub mod query;
pub mod scoring;
pub mod storage;
pub mod sync;
pub mod taxonomy;

pub mod config {
    use anyhow::Context;

    pub const DEFAULT_FEED_BASE_URL: &str = "https://api.karenai.click/swechallenge";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub feed_base_url: Option<String>,
        pub feed_api_token: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                feed_base_url: std::env::var("FEED_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                feed_api_token: std::env::var("FEED_API_TOKEN").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_feed_api_token(&self) -> anyhow::Result<&str> {
            self.feed_api_token
                .as_deref()
                .context("FEED_API_TOKEN is required")
        }

        pub fn feed_base_url(&self) -> &str {
            self.feed_base_url
                .as_deref()
                .unwrap_or(DEFAULT_FEED_BASE_URL)
        }
    }
}
