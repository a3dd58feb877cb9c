
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::http::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, error_status, new_agent, request_with_retry,
};
use crate::sources::{ChangeStatus, ContentItem, ItemMetadata, SourceConnector, SourceKind};
use crate::tenants::Tenant;

const NOTION_VERSION: &str = "2022-06-28";
const QUERY_PAGE_SIZE: usize = 100;

/// Source connector over the pages of a tenant's Notion database.
#[derive(Debug, Clone)]
pub struct NotionConnector {
    api_base: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<Page>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page {
    id: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    in_trash: bool,
    #[serde(default)]
    last_edited_time: Option<DateTime<Utc>>,
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BlockChildrenResponse {
    results: Vec<Block>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Block {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    payload: serde_json::Map<String, serde_json::Value>,
}

impl NotionConnector {
    #[inline]
    pub fn new(config: &SyncConfig) -> Result<Self> {
        Self::with_api_base(&config.notion_api_base)
    }

    /// Build a connector against a non-default API base, used by tests.
    #[inline]
    pub fn with_api_base(api_base: &str) -> Result<Self> {
        let api_base = Url::parse(api_base).context("Failed to parse Notion API base URL")?;

        Ok(Self {
            api_base,
            agent: new_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn credentials<'a>(&self, tenant: &'a Tenant) -> Result<(&'a str, &'a str)> {
        match (
            tenant.notion_api_key.as_deref(),
            tenant.notion_database_id.as_deref(),
        ) {
            (Some(key), Some(database)) => Ok((key, database)),
            _ => Err(anyhow!(
                "Tenant {} has no Notion credentials configured",
                tenant.id
            )),
        }
    }

    fn post_json(&self, api_key: &str, path: &str, body: &serde_json::Value) -> Result<String> {
        let url = self
            .api_base
            .join(path)
            .with_context(|| format!("Failed to build Notion URL for {}", path))?;

        let request_json =
            serde_json::to_string(body).context("Failed to serialize Notion request body")?;

        request_with_retry("notion query", self.retry_attempts, || {
            self.agent
                .post(url.as_str())
                .header("Authorization", &format!("Bearer {}", api_key))
                .header("Notion-Version", NOTION_VERSION)
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn get(&self, api_key: &str, path_and_query: &str) -> Result<String> {
        let url = self
            .api_base
            .join(path_and_query)
            .with_context(|| format!("Failed to build Notion URL for {}", path_and_query))?;

        request_with_retry("notion request", self.retry_attempts, || {
            self.agent
                .get(url.as_str())
                .header("Authorization", &format!("Bearer {}", api_key))
                .header("Notion-Version", NOTION_VERSION)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    /// Query the database, following `next_cursor` until `has_more` is false
    /// so pages beyond the first response are never silently dropped.
    fn query_pages(
        &self,
        api_key: &str,
        database_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": QUERY_PAGE_SIZE });
            if let Some(since) = since {
                body["filter"] = json!({
                    "timestamp": "last_edited_time",
                    "last_edited_time": { "on_or_after": since.to_rfc3339() }
                });
            }
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }

            let response = self
                .post_json(api_key, &format!("/v1/databases/{}/query", database_id), &body)
                .context("Failed to query Notion database")?;

            let response: QueryResponse = serde_json::from_str(&response)
                .context("Failed to parse Notion database query response")?;

            pages.extend(response.results);

            if !response.has_more {
                break;
            }
            match response.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!("Notion database {}: {} pages", database_id, pages.len());
        Ok(pages)
    }

    /// Plain text of a page: the text of its supported top-level blocks
    /// joined with newlines, following block pagination.
    fn page_text(&self, api_key: &str, page_id: &str) -> Result<String> {
        let mut lines = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let path = match &cursor {
                Some(cursor) => format!(
                    "/v1/blocks/{}/children?page_size={}&start_cursor={}",
                    page_id, QUERY_PAGE_SIZE, cursor
                ),
                None => format!("/v1/blocks/{}/children?page_size={}", page_id, QUERY_PAGE_SIZE),
            };

            let body = self
                .get(api_key, &path)
                .context("Failed to fetch Notion page blocks")?;

            let response: BlockChildrenResponse = serde_json::from_str(&body)
                .context("Failed to parse Notion block children response")?;

            for block in &response.results {
                if let Some(text) = block_text(block) {
                    if !text.is_empty() {
                        lines.push(text);
                    }
                }
            }

            if !response.has_more {
                break;
            }
            match response.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(lines.join("\n"))
    }

    fn item_for_page(&self, page: &Page) -> ContentItem {
        let status = if page.archived || page.in_trash {
            ChangeStatus::Removed
        } else {
            ChangeStatus::Modified
        };

        ContentItem {
            source: SourceKind::Notion,
            source_key: page.id.clone(),
            status,
            metadata: ItemMetadata {
                repository: None,
                title: page_title(page),
                language: None,
                updated_at: page.last_edited_time,
                additions: None,
                deletions: None,
                changes: None,
            },
        }
    }
}

/// The page title, found in whichever property has type `"title"`.
fn page_title(page: &Page) -> Option<String> {
    for value in page.properties.values() {
        if value.get("type").and_then(|t| t.as_str()) != Some("title") {
            continue;
        }

        let parts = value.get("title")?.as_array()?;
        let title: String = parts
            .iter()
            .filter_map(|part| part.get("plain_text").and_then(|t| t.as_str()))
            .collect();

        if !title.is_empty() {
            return Some(title);
        }
    }
    None
}

/// Extract the plain text of one block, for the block types we index.
fn block_text(block: &Block) -> Option<String> {
    let supported = matches!(
        block.kind.as_str(),
        "paragraph"
            | "heading_1"
            | "heading_2"
            | "heading_3"
            | "bulleted_list_item"
            | "numbered_list_item"
    );
    if !supported {
        return None;
    }

    let rich_text = block.payload.get(&block.kind)?.get("rich_text")?.as_array()?;
    let text: String = rich_text
        .iter()
        .filter_map(|part| part.get("plain_text").and_then(|t| t.as_str()))
        .collect();

    Some(text)
}

#[async_trait]
impl SourceConnector for NotionConnector {
    #[inline]
    fn kind(&self) -> SourceKind {
        SourceKind::Notion
    }

    #[inline]
    async fn list_all(&self, tenant: &Tenant) -> Result<Vec<ContentItem>> {
        let (api_key, database_id) = self.credentials(tenant)?;
        let pages = self.query_pages(api_key, database_id, None)?;

        Ok(pages.iter().map(|p| self.item_for_page(p)).collect())
    }

    #[inline]
    async fn list_changed(
        &self,
        tenant: &Tenant,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>> {
        let (api_key, database_id) = self.credentials(tenant)?;
        let pages = self.query_pages(api_key, database_id, Some(since))?;

        Ok(pages.iter().map(|p| self.item_for_page(p)).collect())
    }

    #[inline]
    async fn fetch_content(&self, tenant: &Tenant, item: &ContentItem) -> Result<Option<String>> {
        let (api_key, _) = self.credentials(tenant)?;

        let text = match self.page_text(api_key, &item.source_key) {
            Ok(text) => text,
            Err(e) if error_status(&e) == Some(404) => {
                debug!("Page gone upstream: {}", item.source_key);
                return Ok(None);
            }
            Err(e) => {
                warn!("Failed to read page {}: {}", item.source_key, e);
                return Err(e);
            }
        };

        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(text))
    }
}
