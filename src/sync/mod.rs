
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::chunking::{ChunkingConfig, split_text};
use crate::embeddings::Embedder;
use crate::sources::{ChangeStatus, ContentItem, SourceConnector};
use crate::tenants::Tenant;
use crate::vector_store::{VectorIndex, VectorMetadata, VectorRecord, chunk_id, key_prefix};
use crate::{Result, SyncError};

/// How the run enumerates content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Index everything the source currently has.
    Full,
    /// Index only items changed since the given instant.
    Incremental { since: DateTime<Utc> },
}

/// Cooperative cancellation flag checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What happened to one content item during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Chunked, embedded and written to the index.
    Indexed { chunks: usize },
    /// Deleted from the index because the source reports it gone.
    Removed { deleted: usize },
    /// Filtered out before any store access.
    SkippedUnsupported,
    /// The source returned no usable text.
    SkippedEmpty,
    /// Processing failed; the run continued with the next item.
    Failed,
}

/// Aggregated counters for one tenant and source run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tenant: String,
    pub source: String,
    pub items_indexed: usize,
    pub items_removed: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    pub chunks_written: usize,
    pub chunks_deleted: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn new(tenant: &str, source: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            source: source.to_string(),
            items_indexed: 0,
            items_removed: 0,
            items_skipped: 0,
            items_failed: 0,
            chunks_written: 0,
            chunks_deleted: 0,
            cancelled: false,
        }
    }

    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Indexed { chunks } => {
                self.items_indexed += 1;
                self.chunks_written += chunks;
            }
            ItemOutcome::Removed { deleted } => {
                self.items_removed += 1;
                self.chunks_deleted += deleted;
            }
            ItemOutcome::SkippedUnsupported | ItemOutcome::SkippedEmpty => {
                self.items_skipped += 1;
            }
            ItemOutcome::Failed => self.items_failed += 1,
        }
    }
}

impl std::fmt::Display for RunSummary {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}: {} indexed ({} chunks), {} removed ({} chunks), {} skipped, {} failed{}",
            self.tenant,
            self.source,
            self.items_indexed,
            self.chunks_written,
            self.items_removed,
            self.chunks_deleted,
            self.items_skipped,
            self.items_failed,
            if self.cancelled { ", cancelled" } else { "" }
        )
    }
}

/// Orchestrates one source's content through chunking, embedding and the
/// vector index, one tenant at a time.
///
/// All collaborators are injected, so tests drive the engine with in-memory
/// fakes and no network.
pub struct SyncEngine {
    connector: Arc<dyn SourceConnector>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
    active_runs: Mutex<HashSet<(String, String)>>,
}

/// Releases the per-(tenant, source) slot when the run ends, panics included.
struct RunSlot<'a> {
    engine: &'a SyncEngine,
    key: (String, String),
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        let mut active = self
            .engine
            .active_runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.key);
    }
}

impl SyncEngine {
    #[inline]
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            connector,
            embedder,
            index,
            chunking,
            active_runs: Mutex::new(HashSet::new()),
        }
    }

    /// The source kind this engine syncs.
    #[inline]
    pub fn kind(&self) -> crate::sources::SourceKind {
        self.connector.kind()
    }

    /// Run a sync for one tenant. At most one run per (tenant, source) may be
    /// in flight; a second concurrent attempt fails fast instead of queueing.
    ///
    /// Item failures are counted and logged, never propagated; only a failure
    /// to enumerate the source at all aborts the run.
    #[inline]
    pub async fn run(
        &self,
        tenant: &Tenant,
        mode: SyncMode,
        cancel: &CancelToken,
    ) -> Result<RunSummary> {
        let source = self.connector.kind().as_str();
        let _slot = self.acquire_slot(tenant, source)?;

        info!("Starting {:?} sync for tenant {} ({})", mode, tenant.id, source);

        let items = match mode {
            SyncMode::Full => self.connector.list_all(tenant).await,
            SyncMode::Incremental { since } => self.connector.list_changed(tenant, since).await,
        }
        .map_err(|e| SyncError::Source(format!("{}: {:#}", source, e)))?;

        debug!("{} items to consider for tenant {}", items.len(), tenant.id);

        let namespace = tenant.namespace();
        let mut summary = RunSummary::new(&tenant.id, source);

        for item in &items {
            if cancel.is_cancelled() {
                warn!("Sync cancelled for tenant {} ({})", tenant.id, source);
                summary.cancelled = true;
                break;
            }

            let outcome = match self.process_item(tenant, namespace, item).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Failed to process {}: {:#}", item.source_key, e);
                    ItemOutcome::Failed
                }
            };
            summary.record(&outcome);
        }

        info!("{}", summary);
        Ok(summary)
    }

    fn acquire_slot(&self, tenant: &Tenant, source: &str) -> Result<RunSlot<'_>> {
        let key = (tenant.id.clone(), source.to_string());
        let mut active = self
            .active_runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !active.insert(key.clone()) {
            return Err(SyncError::RunInProgress {
                tenant: tenant.id.clone(),
                kind: source.to_string(),
            });
        }

        Ok(RunSlot { engine: self, key })
    }

    async fn process_item(
        &self,
        tenant: &Tenant,
        namespace: &str,
        item: &ContentItem,
    ) -> Result<ItemOutcome> {
        // Unsupported items make no store calls at all, removed or not.
        if !self.connector.is_supported(item) {
            debug!("Skipping unsupported item {}", item.source_key);
            return Ok(ItemOutcome::SkippedUnsupported);
        }

        if item.status == ChangeStatus::Removed {
            let deleted = self.delete_existing(namespace, &item.source_key).await?;
            debug!("Removed {} ({} chunks)", item.source_key, deleted);
            return Ok(ItemOutcome::Removed { deleted });
        }

        let Some(content) = self.connector.fetch_content(tenant, item).await? else {
            debug!("No content for {}", item.source_key);
            return Ok(ItemOutcome::SkippedEmpty);
        };
        if content.trim().is_empty() {
            return Ok(ItemOutcome::SkippedEmpty);
        }

        // Stale chunks from a previous, possibly longer version must go
        // before the new set is written.
        let deleted = self.delete_existing(namespace, &item.source_key).await?;
        if deleted > 0 {
            debug!("Cleared {} stale chunks of {}", deleted, item.source_key);
        }

        let chunks = split_text(&content, &self.chunking);
        let total_chunks = chunks.len();
        let indexed_at = Utc::now().to_rfc3339();
        let mut records = Vec::with_capacity(total_chunks);

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let values = self
                .embedder
                .embed(&chunk)
                .await
                .map_err(|e| SyncError::Embedding(format!("{}: {:#}", item.source_key, e)))?;

            // The provider signals unembeddable input with an empty vector.
            if values.is_empty() {
                warn!(
                    "Empty embedding for chunk {} of {}, skipping",
                    chunk_index, item.source_key
                );
                continue;
            }

            records.push(VectorRecord {
                id: chunk_id(&item.source_key, chunk_index),
                values,
                metadata: VectorMetadata {
                    source: item.source.as_str().to_string(),
                    parent_key: item.source_key.clone(),
                    chunk_index,
                    total_chunks,
                    status: item.status.as_str().to_string(),
                    text: chunk,
                    repository: item.metadata.repository.clone(),
                    title: item.metadata.title.clone(),
                    language: item.metadata.language.clone(),
                    additions: item.metadata.additions,
                    deletions: item.metadata.deletions,
                    changes: item.metadata.changes,
                    updated_at: item.metadata.updated_at.map(|t| t.to_rfc3339()),
                    indexed_at: indexed_at.clone(),
                },
            });
        }

        let written = records.len();
        self.index
            .upsert(namespace, &records)
            .await
            .map_err(|e| SyncError::VectorStore(format!("{}: {:#}", item.source_key, e)))?;

        debug!("Indexed {} as {} chunks", item.source_key, written);
        Ok(ItemOutcome::Indexed { chunks: written })
    }

    /// Delete every chunk currently stored for an item, returning the count.
    async fn delete_existing(&self, namespace: &str, parent_key: &str) -> Result<usize> {
        let prefix = key_prefix(parent_key);
        let ids = self
            .index
            .list_by_prefix(namespace, &prefix)
            .await
            .map_err(|e| SyncError::VectorStore(format!("{}: {:#}", parent_key, e)))?;

        if ids.is_empty() {
            return Ok(0);
        }

        self.index
            .delete_many(namespace, &ids)
            .await
            .map_err(|e| SyncError::VectorStore(format!("{}: {:#}", parent_key, e)))?;

        Ok(ids.len())
    }
}
