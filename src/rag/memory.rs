//! In-memory vector store.
//!
//! Brute-force cosine similarity over the embedded pages of one session.
//! Nothing is persisted; the index lives and dies with the session.

use std::sync::Mutex;

use async_trait::async_trait;

use super::store::{ScoredPage, VectorStore};
use crate::core::errors::ApiError;
use crate::document::DocumentPage;

#[derive(Default)]
pub struct MemoryVectorStore {
    entries: Mutex<Vec<(DocumentPage, Vec<f32>)>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert_batch(&self, items: Vec<(DocumentPage, Vec<f32>)>) -> Result<(), ApiError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ApiError::internal("vector store lock poisoned"))?;
        entries.extend(items);
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPage>, ApiError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ApiError::internal("vector store lock poisoned"))?;

        let mut scored: Vec<ScoredPage> = entries
            .iter()
            .map(|(page, embedding)| ScoredPage {
                page: page.clone(),
                score: Self::cosine_similarity(query_embedding, embedding),
            })
            .collect();

        // Stable sort: ties keep insertion order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ApiError::internal("vector store lock poisoned"))?;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, text: &str) -> DocumentPage {
        DocumentPage {
            source: "paper.pdf".to_string(),
            page_number: n,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn search_ranks_by_descending_similarity() {
        let store = MemoryVectorStore::new();
        store
            .insert_batch(vec![
                (page(1, "mostly orthogonal"), vec![0.1, 0.9]),
                (page(2, "close match"), vec![0.9, 0.1]),
                (page(3, "exact match"), vec![1.0, 0.0]),
            ])
            .await
            .expect("insert");

        let results = store.search(&[1.0, 0.0], 3).await.expect("search");

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].page.page_number, 3);
        assert_eq!(results[1].page.page_number, 2);
        assert_eq!(results[2].page.page_number, 1);
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let store = MemoryVectorStore::new();
        store
            .insert_batch(vec![
                (page(1, "a"), vec![1.0, 0.0]),
                (page(2, "b"), vec![0.9, 0.1]),
                (page(3, "c"), vec![0.8, 0.2]),
            ])
            .await
            .expect("insert");

        let results = store.search(&[1.0, 0.0], 2).await.expect("search");
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn mismatched_dimensions_score_zero() {
        let store = MemoryVectorStore::new();
        store
            .insert_batch(vec![(page(1, "a"), vec![1.0, 0.0, 0.0])])
            .await
            .expect("insert");

        let results = store.search(&[1.0, 0.0], 1).await.expect("search");
        assert_eq!(results[0].score, 0.0);
    }
}
