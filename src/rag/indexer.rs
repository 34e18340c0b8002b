//! Indexing pipeline: uploaded PDF bytes to a queryable session index.
//!
//! One embedding pass per unique (session, filename) pair. The payload is
//! staged in a scoped temp directory that is removed when indexing completes
//! or fails.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::core::errors::ApiError;
use crate::document::loader::{self, DocumentPage};
use crate::llm::LlmProvider;
use crate::rag::{MemoryVectorStore, VectorStore};
use crate::session::{BeginIndex, SessionStore};

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub file: String,
    pub pages_indexed: usize,
    pub already_indexed: bool,
}

impl IndexReport {
    fn already(filename: &str) -> Self {
        Self {
            file: filename.to_string(),
            pages_indexed: 0,
            already_indexed: true,
        }
    }
}

pub struct IndexingPipeline {
    provider: Arc<dyn LlmProvider>,
    embed_model: String,
}

impl IndexingPipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, embed_model: String) -> Self {
        Self {
            provider,
            embed_model,
        }
    }

    /// Index an uploaded PDF into the session's vector store.
    ///
    /// Rejects non-PDF payloads before the loader runs, and short-circuits
    /// before any file or network work when the file key is already indexed.
    /// Any failure clears the cache entry so the upload can be retried; no
    /// partial index is ever attached to the session.
    pub async fn index_bytes(
        &self,
        sessions: &SessionStore,
        session_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IndexReport, ApiError> {
        if !loader::is_pdf_filename(filename) {
            return Err(ApiError::BadRequest(format!(
                "only PDF uploads are accepted, got '{}'",
                filename
            )));
        }
        if !loader::has_pdf_magic(bytes) {
            return Err(ApiError::BadRequest(format!(
                "'{}' does not look like a PDF",
                filename
            )));
        }

        if sessions.begin_indexing(session_id, filename)? == BeginIndex::AlreadyIndexed {
            tracing::info!("'{}' already indexed for session {}", filename, session_id);
            return Ok(IndexReport::already(filename));
        }

        let pages = match stage_and_load(filename, bytes).await {
            Ok(pages) => pages,
            Err(err) => {
                sessions.mark_index_failed(session_id, filename, &err.to_string())?;
                return Err(err);
            }
        };
        tracing::debug!(
            "loaded {} pages from '{}' for session {}",
            pages.len(),
            filename,
            session_id
        );

        self.embed_and_attach(sessions, session_id, filename, pages)
            .await
    }

    /// Index pre-split pages under a file key, with the same once-per-key
    /// contract as `index_bytes`.
    pub async fn index_document(
        &self,
        sessions: &SessionStore,
        session_id: &str,
        filename: &str,
        pages: Vec<DocumentPage>,
    ) -> Result<IndexReport, ApiError> {
        if sessions.begin_indexing(session_id, filename)? == BeginIndex::AlreadyIndexed {
            return Ok(IndexReport::already(filename));
        }

        self.embed_and_attach(sessions, session_id, filename, pages)
            .await
    }

    async fn embed_and_attach(
        &self,
        sessions: &SessionStore,
        session_id: &str,
        filename: &str,
        pages: Vec<DocumentPage>,
    ) -> Result<IndexReport, ApiError> {
        match self.index_pages(pages).await {
            Ok(index) => {
                let pages_indexed = index.count().await?;
                sessions.attach_index(session_id, filename, index)?;
                tracing::info!(
                    "indexed '{}' for session {}: {} pages",
                    filename,
                    session_id,
                    pages_indexed
                );
                Ok(IndexReport {
                    file: filename.to_string(),
                    pages_indexed,
                    already_indexed: false,
                })
            }
            Err(err) => {
                sessions.mark_index_failed(session_id, filename, &err.to_string())?;
                Err(err)
            }
        }
    }

    /// Embed pages and build the in-memory index.
    async fn index_pages(&self, pages: Vec<DocumentPage>) -> Result<Arc<dyn VectorStore>, ApiError> {
        let texts: Vec<String> = pages.iter().map(|page| page.text.clone()).collect();

        let embeddings = self
            .provider
            .embed(&texts, &self.embed_model)
            .await
            .map_err(|err| match err {
                ApiError::Upstream(msg) => ApiError::Index(msg),
                other => other,
            })?;

        if embeddings.len() != pages.len() {
            return Err(ApiError::Index(format!(
                "embedding count mismatch: {} pages, {} vectors",
                pages.len(),
                embeddings.len()
            )));
        }

        let store = MemoryVectorStore::new();
        store
            .insert_batch(pages.into_iter().zip(embeddings).collect())
            .await?;

        Ok(Arc::new(store))
    }
}

/// Write the payload into a scoped temp directory and run the loader there.
/// The directory is removed on drop, on success and failure alike.
async fn stage_and_load(filename: &str, bytes: &[u8]) -> Result<Vec<DocumentPage>, ApiError> {
    let temp_dir = tempfile::tempdir()
        .map_err(|err| ApiError::internal(format!("cannot create temp dir: {}", err)))?;

    // Stage under a fixed name; the client-supplied filename never touches
    // the filesystem.
    let staged: PathBuf = temp_dir.path().join("upload.pdf");
    std::fs::write(&staged, bytes)
        .map_err(|err| ApiError::internal(format!("cannot stage upload: {}", err)))?;

    let source = filename.to_string();
    let pages = tokio::task::spawn_blocking(move || loader::load_pdf_pages(&staged, &source))
        .await
        .map_err(ApiError::internal)??;

    drop(temp_dir);
    Ok(pages)
}
