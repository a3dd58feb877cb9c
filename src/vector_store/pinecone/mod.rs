
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::http::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, new_agent, request_with_retry};
use crate::vector_store::{VectorIndex, VectorRecord};

const UPSERT_BATCH_SIZE: usize = 100;
const DELETE_BATCH_SIZE: usize = 1000;
const LIST_PAGE_LIMIT: u32 = 100;

/// Client for one Pinecone index over its data-plane REST API.
#[derive(Debug, Clone)]
pub struct PineconeClient {
    index_host: Url,
    api_key: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedVector>,
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedVector {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<String>,
}

impl PineconeClient {
    #[inline]
    pub fn new(index_host: &str, api_key: &str) -> Result<Self> {
        let index_host = Url::parse(index_host).context("Failed to parse Pinecone index host")?;

        Ok(Self {
            index_host,
            api_key: api_key.to_string(),
            agent: new_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.index_host
            .join(path)
            .with_context(|| format!("Failed to build Pinecone URL for {}", path))
    }

    fn post_json(&self, url: &Url, body: &str) -> Result<String> {
        request_with_retry("pinecone request", self.retry_attempts, || {
            self.agent
                .post(url.as_str())
                .header("Api-Key", &self.api_key)
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn list_page(
        &self,
        namespace: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListResponse> {
        let mut url = self.endpoint("/vectors/list")?;
        url.query_pairs_mut()
            .append_pair("namespace", namespace)
            .append_pair("prefix", prefix)
            .append_pair("limit", &LIST_PAGE_LIMIT.to_string());
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("paginationToken", token);
        }

        let response_text = request_with_retry("pinecone list", self.retry_attempts, || {
            self.agent
                .get(url.as_str())
                .header("Api-Key", &self.api_key)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        serde_json::from_str(&response_text).context("Failed to parse Pinecone list response")
    }
}

#[async_trait]
impl VectorIndex for PineconeClient {
    #[inline]
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let url = self.endpoint("/vectors/upsert")?;

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let request = UpsertRequest {
                vectors: batch,
                namespace,
            };
            let body = serde_json::to_string(&request)
                .context("Failed to serialize Pinecone upsert request")?;

            self.post_json(&url, &body)
                .context("Failed to upsert vectors")?;

            debug!(
                "Upserted {} vectors into namespace {}",
                batch.len(),
                namespace
            );
        }

        Ok(())
    }

    #[inline]
    async fn delete_many(&self, namespace: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let url = self.endpoint("/vectors/delete")?;

        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let request = DeleteRequest {
                ids: batch,
                namespace,
            };
            let body = serde_json::to_string(&request)
                .context("Failed to serialize Pinecone delete request")?;

            self.post_json(&url, &body)
                .context("Failed to delete vectors")?;

            debug!(
                "Deleted {} vectors from namespace {}",
                batch.len(),
                namespace
            );
        }

        Ok(())
    }

    #[inline]
    async fn list_by_prefix(&self, namespace: &str, prefix: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .list_page(namespace, prefix, token.as_deref())
                .context("Failed to list vectors")?;

            ids.extend(page.vectors.into_iter().map(|v| v.id));

            match page.pagination.and_then(|p| p.next) {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!(
            "Listed {} vectors under prefix {} in namespace {}",
            ids.len(),
            prefix,
            namespace
        );

        Ok(ids)
    }
}
