use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::auth;
use crate::chunking::ChunkingConfig;
use crate::config::Config;
use crate::embeddings::{Embedder, GeminiClient};
use crate::sources::{GithubConnector, NotionConnector, SourceKind};
use crate::sync::{CancelToken, RunSummary, SyncEngine, SyncMode};
use crate::tenants::{Tenant, TenantDirectory, TomlTenantDirectory};
use crate::vector_store::PineconeClient;
use crate::{Result, SyncError};

/// Which sources a command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    All,
    Github,
    Notion,
}

impl SourceFilter {
    fn includes(self, kind: SourceKind) -> bool {
        match self {
            Self::All => true,
            Self::Github => kind == SourceKind::Github,
            Self::Notion => kind == SourceKind::Notion,
        }
    }
}

/// Initialize a single tenant: authorize the caller, then fully index every
/// selected source the tenant has credentials for.
#[inline]
pub async fn init(
    config: &Config,
    tenant_id: &str,
    filter: SourceFilter,
    api_key: &str,
) -> Result<()> {
    auth::verify_api_key(&config.auth, api_key)?;

    let directory = TomlTenantDirectory::new(config.tenants_file_path());
    let tenant = directory
        .find(tenant_id)?
        .ok_or_else(|| SyncError::Tenant(format!("Unknown tenant: {}", tenant_id)))?;

    let engines = build_engines(config, filter)?;
    let cancel = CancelToken::new();
    let mut summaries = Vec::new();

    for engine in &engines {
        if !tenant_has_source(&tenant, engine.kind()) {
            info!(
                "Tenant {} has no {} credentials, skipping",
                tenant.id,
                engine.kind()
            );
            continue;
        }

        summaries.push(engine.run(&tenant, SyncMode::Full, &cancel).await?);
    }

    print_report("Initialization complete", &summaries, &[]);
    Ok(())
}

/// Scheduled incremental update across all tenants. Tenants run with bounded
/// concurrency; one aggregate report is printed after every tenant finished.
#[inline]
pub async fn update(config: &Config, filter: SourceFilter, cron_auth: &str) -> Result<()> {
    auth::verify_cron_secret(&config.auth, cron_auth)?;

    let directory = TomlTenantDirectory::new(config.tenants_file_path());
    let tenants = directory.load_all()?;
    info!("Updating {} tenants", tenants.len());

    let engines = build_engines(config, filter)?;
    let semaphore = Arc::new(Semaphore::new(config.sync.max_concurrent_tenants));
    let cancel = CancelToken::new();
    let code_lookback = config.sync.code_lookback_hours;
    let docs_lookback = config.sync.docs_lookback_hours;

    let mut join_set: JoinSet<(Vec<RunSummary>, Vec<String>)> = JoinSet::new();

    for tenant in tenants {
        let engines = engines.clone();
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();

        join_set.spawn(async move {
            // The semaphore lives for the whole update, so acquisition only
            // fails if it was closed; never run unthrottled in that case.
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        Vec::new(),
                        vec![format!("{}: concurrency limiter closed", tenant.id)],
                    );
                }
            };

            let mut summaries = Vec::new();
            let mut failures = Vec::new();

            for engine in &engines {
                if !tenant_has_source(&tenant, engine.kind()) {
                    continue;
                }

                let lookback_hours = match engine.kind() {
                    SourceKind::Github => code_lookback,
                    SourceKind::Notion => docs_lookback,
                };
                let lookback = i64::try_from(lookback_hours).unwrap_or(i64::MAX);
                let since = Utc::now() - ChronoDuration::hours(lookback);

                // One tenant failing a source must not take the others down.
                match engine
                    .run(&tenant, SyncMode::Incremental { since }, &cancel)
                    .await
                {
                    Ok(summary) => summaries.push(summary),
                    Err(e) => {
                        warn!("Update failed for {}/{}: {}", tenant.id, engine.kind(), e);
                        failures.push(format!("{}/{}: {}", tenant.id, engine.kind(), e));
                    }
                }
            }

            (summaries, failures)
        });
    }

    let mut summaries = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((tenant_summaries, tenant_failures)) => {
                summaries.extend(tenant_summaries);
                failures.extend(tenant_failures);
            }
            Err(e) => failures.push(format!("tenant task panicked: {}", e)),
        }
    }

    print_report("Update complete", &summaries, &failures);
    Ok(())
}

/// Print the effective configuration with secrets masked.
#[inline]
pub fn show_config(config: &Config) {
    println!("Configuration ({}):", config.base_dir.display());
    println!("  embedding.base_url: {}", config.embedding.base_url);
    println!("  embedding.model: {}", config.embedding.model);
    println!("  embedding.dimension: {}", config.embedding.dimension);
    println!("  embedding.api_key: {}", mask(&config.embedding.api_key));
    println!("  pinecone.api_key: {}", mask(&config.pinecone.api_key));
    println!(
        "  pinecone.code_index_host: {}",
        config.pinecone.code_index_host
    );
    println!(
        "  pinecone.docs_index_host: {}",
        config.pinecone.docs_index_host
    );
    println!("  sync.chunk_size: {}", config.sync.chunk_size);
    println!("  sync.chunk_overlap: {}", config.sync.chunk_overlap);
    println!(
        "  sync.code_lookback_hours: {}",
        config.sync.code_lookback_hours
    );
    println!(
        "  sync.docs_lookback_hours: {}",
        config.sync.docs_lookback_hours
    );
    println!(
        "  sync.max_concurrent_tenants: {}",
        config.sync.max_concurrent_tenants
    );
    println!("  sync.github_api_base: {}", config.sync.github_api_base);
    println!("  sync.notion_api_base: {}", config.sync.notion_api_base);
    println!("  sync.tenants_path: {}", config.tenants_file_path().display());
    println!("  dedup.ttl_seconds: {}", config.dedup.ttl_seconds);
    println!("  auth.api_key: {}", mask(&config.auth.api_key));
    println!("  auth.cron_secret: {}", mask(&config.auth.cron_secret));
}

/// Render the aggregate outcome of a command, one line per run plus totals.
fn print_report(heading: &str, summaries: &[RunSummary], failures: &[String]) {
    println!("{}", heading);

    for summary in summaries {
        println!("  {}", summary);
    }
    for failure in failures {
        println!("  failed: {}", failure);
    }

    let chunks_written: usize = summaries.iter().map(|s| s.chunks_written).sum();
    let chunks_deleted: usize = summaries.iter().map(|s| s.chunks_deleted).sum();
    let items_failed: usize = summaries.iter().map(|s| s.items_failed).sum();
    println!(
        "  total: {} runs, {} chunks written, {} chunks deleted, {} item failures, {} run failures",
        summaries.len(),
        chunks_written,
        chunks_deleted,
        items_failed,
        failures.len()
    );
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "(unset)" } else { "***" }
}

fn tenant_has_source(tenant: &Tenant, kind: SourceKind) -> bool {
    match kind {
        SourceKind::Github => tenant.has_github(),
        SourceKind::Notion => tenant.has_notion(),
    }
}

/// Wire one engine per selected source from the configuration. Each source
/// writes to its own index host; both share the embedding provider.
fn build_engines(config: &Config, filter: SourceFilter) -> Result<Vec<Arc<SyncEngine>>> {
    let embedder: Arc<dyn Embedder> = Arc::new(GeminiClient::new(&config.embedding)?);
    let chunking = ChunkingConfig {
        chunk_size: config.sync.chunk_size,
        chunk_overlap: config.sync.chunk_overlap,
    };

    let mut engines = Vec::new();

    if filter.includes(SourceKind::Github) {
        if config.pinecone.code_index_host.is_empty() {
            return Err(SyncError::Config(
                "pinecone.code_index_host is not configured".to_string(),
            ));
        }
        let index = Arc::new(PineconeClient::new(
            &config.pinecone.code_index_host,
            &config.pinecone.api_key,
        )?);
        let connector = Arc::new(GithubConnector::new(&config.sync)?);
        engines.push(Arc::new(SyncEngine::new(
            connector,
            Arc::clone(&embedder),
            index,
            chunking.clone(),
        )));
    }

    if filter.includes(SourceKind::Notion) {
        if config.pinecone.docs_index_host.is_empty() {
            return Err(SyncError::Config(
                "pinecone.docs_index_host is not configured".to_string(),
            ));
        }
        let index = Arc::new(PineconeClient::new(
            &config.pinecone.docs_index_host,
            &config.pinecone.api_key,
        )?);
        let connector = Arc::new(NotionConnector::new(&config.sync)?);
        engines.push(Arc::new(SyncEngine::new(
            connector,
            embedder,
            index,
            chunking,
        )));
    }

    if engines.is_empty() {
        return Err(SyncError::Config("No sources selected".to_string()));
    }

    Ok(engines)
}
