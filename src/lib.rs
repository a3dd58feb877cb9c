use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Tenant error: {0}")]
    Tenant(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("A sync run is already in progress for tenant {tenant} ({kind})")]
    RunInProgress { tenant: String, kind: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod auth;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod dedup;
pub mod embeddings;
pub mod http;
pub mod sources;
pub mod sync;
pub mod tenants;
pub mod vector_store;
