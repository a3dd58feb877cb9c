pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;

pub use gemini::GeminiClient;

/// Maps a chunk of text to a fixed-dimension vector via an external model.
///
/// Implementations must return an empty vector when the provider responds
/// without one, so callers can decide whether to skip the chunk; a sustained
/// provider outage must surface as an error instead.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimensionality of every vector returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
