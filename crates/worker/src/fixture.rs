use anyhow::Context;
use stockrec_core::ingest::provider::{parse_page, FeedClient};
use stockrec_core::ingest::types::FeedPage;

/// Feed replayed from a JSON file: either one page object or an array of pages chained by
/// their `next_page` cursors.
#[derive(Debug, Clone)]
pub struct FileFeed {
    pages: Vec<FeedPage>,
}

impl FileFeed {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read feed file failed (path={})", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid feed file (path={})", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let pages = match serde_json::from_str::<Vec<FeedPage>>(text) {
            Ok(pages) => pages,
            Err(_) => vec![parse_page(text)?],
        };
        anyhow::ensure!(!pages.is_empty(), "feed file contains no pages");
        Ok(Self { pages })
    }
}

#[async_trait::async_trait]
impl FeedClient for FileFeed {
    fn provider_name(&self) -> &'static str {
        "file"
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> anyhow::Result<FeedPage> {
        let index = match cursor {
            None => 0,
            Some(cursor) => {
                self.pages
                    .iter()
                    .position(|p| p.next_cursor() == Some(cursor))
                    .with_context(|| format!("unknown feed cursor {cursor:?}"))?
                    + 1
            }
        };

        self.pages
            .get(index)
            .cloned()
            .with_context(|| format!("feed file has no page after cursor {cursor:?}"))
    }
}
