//! VectorStore trait — abstract interface for page-vector storage.
//!
//! The shipped implementation is `MemoryVectorStore`; the trait exists so
//! retrieval can be exercised against substitute stores in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::document::DocumentPage;

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPage {
    pub page: DocumentPage,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// Abstract interface over a per-session vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert pages with their embedding vectors.
    async fn insert_batch(&self, items: Vec<(DocumentPage, Vec<f32>)>) -> Result<(), ApiError>;

    /// Return up to `limit` pages most similar to the query embedding,
    /// highest similarity first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPage>, ApiError>;

    /// Number of stored pages.
    async fn count(&self) -> Result<usize, ApiError>;
}
