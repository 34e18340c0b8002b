//! In-memory session state.
//!
//! One `Session` per client: message history, uploaded-file cache, and the
//! optional vector index. Everything lives for the process lifetime only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::rag::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

/// Per-file indexing state within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    Indexing,
    Ready,
    Failed(String),
}

impl IndexStatus {
    fn label(&self) -> String {
        match self {
            IndexStatus::Indexing => "indexing".to_string(),
            IndexStatus::Ready => "ready".to_string(),
            IndexStatus::Failed(reason) => format!("failed: {}", reason),
        }
    }
}

/// Outcome of claiming a file key for indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginIndex {
    /// The key was free (or previously failed); indexing may proceed.
    Started,
    /// The key is already indexed; skip the embedding pass entirely.
    AlreadyIndexed,
}

struct Session {
    created_at: String,
    messages: Vec<ChatTurn>,
    file_cache: HashMap<String, IndexStatus>,
    index: Option<Arc<dyn VectorStore>>,
}

impl Session {
    fn new() -> Self {
        Self {
            created_at: chrono::Utc::now().to_rfc3339(),
            messages: Vec::new(),
            file_cache: HashMap::new(),
            index: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionFile {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: String,
    pub message_count: usize,
    pub files: Vec<SessionFile>,
    pub ready: bool,
}

pub struct SessionStore {
    history_cap: usize,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(history_cap: usize) -> Self {
        Self {
            history_cap,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Session>>, ApiError> {
        self.sessions
            .lock()
            .map_err(|_| ApiError::internal("session store lock poisoned"))
    }

    pub fn create_session(&self) -> Result<String, ApiError> {
        let id = Uuid::new_v4().to_string();
        self.lock()?.insert(id.clone(), Session::new());
        Ok(id)
    }

    /// Create the session if the id is unknown. First WebSocket use of a
    /// fresh id lands here.
    pub fn ensure_session(&self, id: &str) -> Result<(), ApiError> {
        self.lock()?
            .entry(id.to_string())
            .or_insert_with(Session::new);
        Ok(())
    }

    pub fn session_info(&self, id: &str) -> Result<SessionInfo, ApiError> {
        let sessions = self.lock()?;
        let session = sessions
            .get(id)
            .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))?;

        let mut files: Vec<SessionFile> = session
            .file_cache
            .iter()
            .map(|(name, status)| SessionFile {
                name: name.clone(),
                status: status.label(),
            })
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(SessionInfo {
            id: id.to_string(),
            created_at: session.created_at.clone(),
            message_count: session.messages.len(),
            files,
            ready: session.index.is_some(),
        })
    }

    pub fn messages(&self, id: &str) -> Result<Vec<ChatTurn>, ApiError> {
        let sessions = self.lock()?;
        let session = sessions
            .get(id)
            .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))?;
        Ok(session.messages.clone())
    }

    /// Append a user turn, applying the history cap first: once the history
    /// holds `history_cap` or more entries, the two oldest are removed,
    /// whatever their roles. Returns the history as it stood before the new
    /// turn, for prompt construction.
    pub fn append_user_turn(&self, id: &str, content: &str) -> Result<Vec<ChatTurn>, ApiError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))?;

        if session.messages.len() >= self.history_cap {
            session.messages.drain(..2);
        }

        let prior = session.messages.clone();
        session.messages.push(ChatTurn {
            role: Role::User,
            content: content.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        Ok(prior)
    }

    pub fn append_assistant_turn(&self, id: &str, content: &str) -> Result<(), ApiError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))?;

        session.messages.push(ChatTurn {
            role: Role::Assistant,
            content: content.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        Ok(())
    }

    /// Clear history, file cache and index; the session id stays valid.
    pub fn reset(&self, id: &str) -> Result<(), ApiError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))?;

        session.messages.clear();
        session.file_cache.clear();
        session.index = None;
        Ok(())
    }

    /// Claim a file key for indexing. A `Ready` key short-circuits; a
    /// previously failed key may be retried.
    pub fn begin_indexing(&self, id: &str, file_key: &str) -> Result<BeginIndex, ApiError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))?;

        match session.file_cache.get(file_key) {
            Some(IndexStatus::Ready) => Ok(BeginIndex::AlreadyIndexed),
            Some(IndexStatus::Indexing) => Err(ApiError::BadRequest(format!(
                "'{}' is already being indexed",
                file_key
            ))),
            _ => {
                session
                    .file_cache
                    .insert(file_key.to_string(), IndexStatus::Indexing);
                Ok(BeginIndex::Started)
            }
        }
    }

    pub fn attach_index(
        &self,
        id: &str,
        file_key: &str,
        index: Arc<dyn VectorStore>,
    ) -> Result<(), ApiError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))?;

        session
            .file_cache
            .insert(file_key.to_string(), IndexStatus::Ready);
        session.index = Some(index);
        Ok(())
    }

    pub fn mark_index_failed(&self, id: &str, file_key: &str, reason: &str) -> Result<(), ApiError> {
        let mut sessions = self.lock()?;
        if let Some(session) = sessions.get_mut(id) {
            session
                .file_cache
                .insert(file_key.to_string(), IndexStatus::Failed(reason.to_string()));
        }
        Ok(())
    }

    /// The session's vector index, if a document has been indexed.
    pub fn index(&self, id: &str) -> Result<Option<Arc<dyn VectorStore>>, ApiError> {
        let sessions = self.lock()?;
        let session = sessions
            .get(id)
            .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))?;
        Ok(session.index.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(8)
    }

    fn run_turn(store: &SessionStore, id: &str, n: usize) {
        store
            .append_user_turn(id, &format!("question {}", n))
            .expect("user turn");
        store
            .append_assistant_turn(id, &format!("answer {}", n))
            .expect("assistant turn");
    }

    #[test]
    fn history_grows_in_pairs_below_the_cap() {
        let store = store();
        let id = store.create_session().expect("create");

        for n in 1..=4 {
            run_turn(&store, &id, n);
            assert_eq!(store.messages(&id).expect("messages").len(), n * 2);
        }
    }

    #[test]
    fn fifth_turn_trims_the_oldest_pair() {
        let store = store();
        let id = store.create_session().expect("create");

        for n in 1..=5 {
            run_turn(&store, &id, n);
        }

        let messages = store.messages(&id).expect("messages");
        assert_eq!(messages.len(), 8);
        // Turn 1 was dropped by the pre-append check on turn 5.
        assert_eq!(messages[0].content, "question 2");
        assert_eq!(messages[7].content, "answer 5");
    }

    #[test]
    fn history_is_below_cap_after_every_deletion_check() {
        let store = store();
        let id = store.create_session().expect("create");

        for n in 1..=20 {
            let prior = store
                .append_user_turn(&id, &format!("question {}", n))
                .expect("user turn");
            assert!(prior.len() < 8);
            store
                .append_assistant_turn(&id, &format!("answer {}", n))
                .expect("assistant turn");
        }
    }

    #[test]
    fn trim_is_count_based_even_with_an_orphaned_turn() {
        let store = store();
        let id = store.create_session().expect("create");

        // A failed turn leaves an orphan user entry.
        store.append_user_turn(&id, "orphan").expect("user turn");
        for n in 1..=4 {
            run_turn(&store, &id, n);
        }

        // Pre-check length is 9: the trim removes exactly two entries
        // (the orphan and "question 1") without pairing validation.
        let prior = store.append_user_turn(&id, "question 5").expect("user turn");
        assert_eq!(prior.len(), 7);
        assert_eq!(prior[0].content, "answer 1");
    }

    #[test]
    fn begin_indexing_short_circuits_when_ready() {
        let store = store();
        let id = store.create_session().expect("create");

        assert_eq!(
            store.begin_indexing(&id, "paper.pdf").expect("begin"),
            BeginIndex::Started
        );
        store
            .attach_index(&id, "paper.pdf", Arc::new(crate::rag::MemoryVectorStore::new()))
            .expect("attach");
        assert_eq!(
            store.begin_indexing(&id, "paper.pdf").expect("begin"),
            BeginIndex::AlreadyIndexed
        );
    }

    #[test]
    fn failed_indexing_can_be_retried() {
        let store = store();
        let id = store.create_session().expect("create");

        store.begin_indexing(&id, "paper.pdf").expect("begin");
        store
            .mark_index_failed(&id, "paper.pdf", "boom")
            .expect("mark failed");
        assert_eq!(
            store.begin_indexing(&id, "paper.pdf").expect("begin"),
            BeginIndex::Started
        );
    }

    #[test]
    fn reset_clears_history_cache_and_index() {
        let store = store();
        let id = store.create_session().expect("create");

        run_turn(&store, &id, 1);
        store.begin_indexing(&id, "paper.pdf").expect("begin");
        store
            .attach_index(&id, "paper.pdf", Arc::new(crate::rag::MemoryVectorStore::new()))
            .expect("attach");

        store.reset(&id).expect("reset");

        assert!(store.messages(&id).expect("messages").is_empty());
        assert!(store.index(&id).expect("index").is_none());
        let info = store.session_info(&id).expect("info");
        assert!(info.files.is_empty());
        assert!(!info.ready);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let store = store();
        assert!(matches!(
            store.messages("nope"),
            Err(ApiError::NotFound(_))
        ));
    }
}
