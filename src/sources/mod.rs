pub mod github;
pub mod notion;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::tenants::Tenant;

pub use github::GithubConnector;
pub use notion::NotionConnector;

/// The kind of external content origin an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Github,
    Notion,
}

impl SourceKind {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Notion => "notion",
        }
    }
}

impl std::fmt::Display for SourceKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change status of a content item relative to the prior indexing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
    Unchanged,
}

impl ChangeStatus {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Source-specific descriptive fields carried alongside an item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemMetadata {
    pub repository: Option<String>,
    pub title: Option<String>,
    pub language: Option<String>,
    /// Last-update time reported by the source.
    pub updated_at: Option<DateTime<Utc>>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub changes: Option<u64>,
}

/// One indexable unit from a source, created transiently per run.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub source: SourceKind,
    /// Stable key uniquely identifying the item within its source,
    /// e.g. `"{repo}:{path}"` or a page id.
    pub source_key: String,
    pub status: ChangeStatus,
    pub metadata: ItemMetadata,
}

/// Enumerates full or changed content items for a tenant and fetches bodies.
///
/// Implemented once per source kind, consumed uniformly by the sync engine.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Full enumeration, used for initialization.
    async fn list_all(&self, tenant: &Tenant) -> Result<Vec<ContentItem>>;

    /// Incremental enumeration bounded by a lookback window, deduplicated by
    /// source key so an item touched several times appears once with its
    /// latest status.
    async fn list_changed(&self, tenant: &Tenant, since: DateTime<Utc>)
    -> Result<Vec<ContentItem>>;

    /// Retrieve the current body; `None` if the item has been deleted
    /// upstream or cannot be decoded as text.
    async fn fetch_content(&self, tenant: &Tenant, item: &ContentItem) -> Result<Option<String>>;

    /// Whether this connector indexes the item at all. Defaults to supported.
    #[inline]
    fn is_supported(&self, _item: &ContentItem) -> bool {
        true
    }
}
