#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// One isolated customer account. The tenant id doubles as the vector-store
/// namespace, strictly partitioning every read and write.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub notion_api_key: Option<String>,
    #[serde(default)]
    pub notion_database_id: Option<String>,
}

impl Tenant {
    /// The vector-store namespace owned by this tenant.
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn has_github(&self) -> bool {
        self.github_token.is_some()
    }

    #[inline]
    pub fn has_notion(&self) -> bool {
        self.notion_api_key.is_some() && self.notion_database_id.is_some()
    }
}

/// Read-only access to tenant records. Tenant lifecycle is owned by an
/// external system; the sync core never writes them.
pub trait TenantDirectory: Send + Sync {
    fn load_all(&self) -> Result<Vec<Tenant>>;

    fn find(&self, tenant_id: &str) -> Result<Option<Tenant>>;
}

#[derive(Debug, Deserialize)]
struct TenantsFile {
    #[serde(default)]
    tenants: Vec<Tenant>,
}

/// Tenant directory backed by a TOML file with a `[[tenants]]` table array.
#[derive(Debug, Clone)]
pub struct TomlTenantDirectory {
    path: PathBuf,
}

impl TomlTenantDirectory {
    #[inline]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl TenantDirectory for TomlTenantDirectory {
    #[inline]
    fn load_all(&self) -> Result<Vec<Tenant>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read tenants file: {}", self.path.display()))?;

        let file: TenantsFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse tenants file: {}", self.path.display()))?;

        Ok(file.tenants)
    }

    #[inline]
    fn find(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        Ok(self.load_all()?.into_iter().find(|t| t.id == tenant_id))
    }
}
