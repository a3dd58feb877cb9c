pub mod pinecone;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use pinecone::PineconeClient;

/// One embedded chunk as stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Deterministic id: `"{parent_key}:{chunk_index}"`.
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Metadata persisted alongside each embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Source kind, e.g. `"github"` or `"notion"`.
    pub source: String,
    /// Stable key of the content item this chunk belongs to.
    pub parent_key: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Content-change status observed when the chunk was written.
    pub status: String,
    /// The chunk text itself, kept for retrieval-time display.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additions: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<u64>,
    /// Last-update time reported by the source, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Time this chunk was indexed, RFC 3339.
    pub indexed_at: String,
}

/// Build the deterministic vector id for a chunk of an item.
#[inline]
pub fn chunk_id(parent_key: &str, index: usize) -> String {
    format!("{}:{}", parent_key, index)
}

/// Prefix under which all of an item's chunk ids live.
#[inline]
pub fn key_prefix(parent_key: &str) -> String {
    format!("{}:", parent_key)
}

/// Namespace-scoped operations against a remote vector index.
///
/// Every call is bound to a namespace; there is deliberately no way to touch
/// the index without naming one.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()>;

    async fn delete_many(&self, namespace: &str, ids: &[String]) -> Result<()>;

    /// List every id under `prefix`, following pagination until exhausted.
    /// A partial page must never be mistaken for the full set.
    async fn list_by_prefix(&self, namespace: &str, prefix: &str) -> Result<Vec<String>>;
}
