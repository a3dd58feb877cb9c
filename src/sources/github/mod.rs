#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::http::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, error_status, request_with_retry,
};
use crate::sources::{ChangeStatus, ContentItem, ItemMetadata, SourceConnector, SourceKind};
use crate::tenants::Tenant;

const REPOS_PER_PAGE: usize = 30;
const COMMITS_PER_PAGE: usize = 100;
const USER_AGENT: &str = "ragsync/0.1.0 (Content Indexer)";

/// Source connector enumerating files across all repositories accessible to a
/// tenant's GitHub App installation.
#[derive(Debug, Clone)]
pub struct GithubConnector {
    api_base: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
    excluded_dirs: HashSet<String>,
    supported_extensions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InstallationReposResponse {
    repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Deserialize)]
struct Repository {
    full_name: String,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct CommitSummary {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    files: Vec<CommitFile>,
}

#[derive(Debug, Deserialize)]
struct CommitFile {
    filename: String,
    status: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changes: u64,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

impl GithubConnector {
    #[inline]
    pub fn new(config: &SyncConfig) -> Result<Self> {
        Self::with_api_base(config, &config.github_api_base)
    }

    /// Build a connector against a non-default API base, used by tests.
    #[inline]
    pub fn with_api_base(config: &SyncConfig, api_base: &str) -> Result<Self> {
        let api_base = Url::parse(api_base).context("Failed to parse GitHub API base URL")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .user_agent(USER_AGENT)
            .build()
            .into();

        Ok(Self {
            api_base,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            excluded_dirs: config.excluded_dirs.iter().cloned().collect(),
            supported_extensions: config.supported_extensions.clone(),
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn token<'a>(&self, tenant: &'a Tenant) -> Result<&'a str> {
        tenant
            .github_token
            .as_deref()
            .ok_or_else(|| anyhow!("Tenant {} has no GitHub token", tenant.id))
    }

    fn get(&self, token: &str, path_and_query: &str) -> Result<String> {
        let url = self
            .api_base
            .join(path_and_query)
            .with_context(|| format!("Failed to build GitHub URL for {}", path_and_query))?;

        request_with_retry("github request", self.retry_attempts, || {
            self.agent
                .get(url.as_str())
                .header("Authorization", &format!("Bearer {}", token))
                .header("Accept", "application/vnd.github+json")
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    /// Page through the installation's repositories until a short page
    /// signals the end.
    fn list_repositories(&self, token: &str) -> Result<Vec<Repository>> {
        let mut repositories = Vec::new();
        let mut page = 1;

        loop {
            let body = self
                .get(
                    token,
                    &format!(
                        "/installation/repositories?per_page={}&page={}",
                        REPOS_PER_PAGE, page
                    ),
                )
                .context("Failed to list installation repositories")?;

            let response: InstallationReposResponse = serde_json::from_str(&body)
                .context("Failed to parse installation repositories response")?;

            let count = response.repositories.len();
            repositories.extend(response.repositories);

            if count < REPOS_PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!("Found {} installation repositories", repositories.len());
        Ok(repositories)
    }

    /// Recursively walk a repository's contents, skipping excluded
    /// directories and yielding only files. Per-directory failures are logged
    /// and skipped.
    fn walk_repository(&self, token: &str, repo: &Repository) -> Vec<ContentItem> {
        let mut items = Vec::new();
        let mut pending_dirs = vec![String::new()];

        while let Some(dir) = pending_dirs.pop() {
            let entries = match self.list_directory(token, &repo.full_name, &dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Failed to read directory {}/{}: {}", repo.full_name, dir, e);
                    continue;
                }
            };

            for entry in entries {
                if entry.kind == "file" {
                    items.push(self.item_for_file(repo, &entry.path, ChangeStatus::Added, None));
                } else if entry.kind == "dir" && !self.excluded_dirs.contains(&entry.name) {
                    pending_dirs.push(entry.path);
                }
            }
        }

        items
    }

    fn list_directory(&self, token: &str, repo: &str, path: &str) -> Result<Vec<TreeEntry>> {
        let body = self.get(token, &format!("/repos/{}/contents/{}", repo, path))?;

        serde_json::from_str(&body).context("Failed to parse repository contents response")
    }

    /// Changed files across the lookback window, deduplicated by filename.
    /// Commits arrive newest first, so the first occurrence carries the
    /// latest status.
    fn changed_files(
        &self,
        token: &str,
        repo: &Repository,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>> {
        let mut shas = Vec::new();
        let mut page = 1;

        loop {
            let body = self
                .get(
                    token,
                    // The Z-suffixed form keeps the timestamp free of `+`,
                    // which would decode as a space in the query string.
                    &format!(
                        "/repos/{}/commits?since={}&per_page={}&page={}",
                        repo.full_name,
                        since.to_rfc3339_opts(SecondsFormat::Secs, true),
                        COMMITS_PER_PAGE,
                        page
                    ),
                )
                .with_context(|| format!("Failed to list commits for {}", repo.full_name))?;

            let commits: Vec<CommitSummary> =
                serde_json::from_str(&body).context("Failed to parse commits response")?;

            let count = commits.len();
            shas.extend(commits.into_iter().map(|c| c.sha));

            if count < COMMITS_PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!("{}: {} recent commits", repo.full_name, shas.len());

        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for sha in shas {
            let detail = match self.commit_detail(token, &repo.full_name, &sha) {
                Ok(detail) => detail,
                Err(e) => {
                    warn!("Failed to fetch commit {} of {}: {}", sha, repo.full_name, e);
                    continue;
                }
            };

            for file in detail.files {
                if !seen.insert(file.filename.clone()) {
                    continue;
                }

                let status = match file.status.as_str() {
                    "added" => ChangeStatus::Added,
                    "removed" => ChangeStatus::Removed,
                    _ => ChangeStatus::Modified,
                };

                items.push(self.item_for_file(repo, &file.filename, status, Some(&file)));
            }
        }

        debug!("{}: {} changed files", repo.full_name, items.len());
        Ok(items)
    }

    fn commit_detail(&self, token: &str, repo: &str, sha: &str) -> Result<CommitDetail> {
        let body = self.get(token, &format!("/repos/{}/commits/{}", repo, sha))?;

        serde_json::from_str(&body).context("Failed to parse commit detail response")
    }

    fn item_for_file(
        &self,
        repo: &Repository,
        path: &str,
        status: ChangeStatus,
        change: Option<&CommitFile>,
    ) -> ContentItem {
        ContentItem {
            source: SourceKind::Github,
            source_key: format!("{}:{}", repo.full_name, path),
            status,
            metadata: ItemMetadata {
                repository: Some(repo.full_name.clone()),
                title: None,
                language: repo.language.clone(),
                updated_at: None,
                additions: change.map(|c| c.additions),
                deletions: change.map(|c| c.deletions),
                changes: change.map(|c| c.changes),
            },
        }
    }
}

#[async_trait]
impl SourceConnector for GithubConnector {
    #[inline]
    fn kind(&self) -> SourceKind {
        SourceKind::Github
    }

    #[inline]
    async fn list_all(&self, tenant: &Tenant) -> Result<Vec<ContentItem>> {
        let token = self.token(tenant)?;
        let repositories = self.list_repositories(token)?;

        let mut items = Vec::new();
        for repo in &repositories {
            debug!("Walking repository {}", repo.full_name);
            items.extend(self.walk_repository(token, repo));
        }

        Ok(items)
    }

    #[inline]
    async fn list_changed(
        &self,
        tenant: &Tenant,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>> {
        let token = self.token(tenant)?;
        let repositories = self.list_repositories(token)?;

        let mut items = Vec::new();
        for repo in &repositories {
            // One repository failing must not abort the others.
            match self.changed_files(token, repo, since) {
                Ok(changed) => items.extend(changed),
                Err(e) => warn!("Failed to enumerate changes in {}: {}", repo.full_name, e),
            }
        }

        Ok(items)
    }

    #[inline]
    async fn fetch_content(&self, tenant: &Tenant, item: &ContentItem) -> Result<Option<String>> {
        let token = self.token(tenant)?;

        let (repo, path) = item
            .source_key
            .split_once(':')
            .ok_or_else(|| anyhow!("Malformed source key: {}", item.source_key))?;

        let body = match self.get(token, &format!("/repos/{}/contents/{}", repo, path)) {
            Ok(body) => body,
            Err(e) if error_status(&e) == Some(404) => {
                debug!("Content gone upstream: {}", item.source_key);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let file: FileContent =
            serde_json::from_str(&body).context("Failed to parse file content response")?;

        if file.encoding != "base64" {
            debug!(
                "Unrecognized encoding {:?} for {}",
                file.encoding, item.source_key
            );
            return Ok(None);
        }

        let raw: String = file.content.split_whitespace().collect();
        let bytes = match BASE64.decode(raw.as_bytes()) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };

        // Binary files do not decode as UTF-8 and are treated as absent.
        Ok(String::from_utf8(bytes).ok())
    }

    #[inline]
    fn is_supported(&self, item: &ContentItem) -> bool {
        let path = item
            .source_key
            .split_once(':')
            .map_or(item.source_key.as_str(), |(_, path)| path);

        match path.rsplit_once('.') {
            Some((_, ext)) => {
                let dotted = format!(".{}", ext);
                self.supported_extensions.iter().any(|s| *s == dotted)
            }
            None => false,
        }
    }
}
