use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::rag::{IndexingPipeline, RagChain};
use crate::session::SessionStore;

/// Global application state shared across all routes.
///
/// Everything here is either immutable configuration or the in-memory
/// session store; nothing survives a restart.
pub struct AppState {
    pub config: AppConfig,
    pub sessions: SessionStore,
    pub indexer: IndexingPipeline,
    pub chain: RagChain,
}

impl AppState {
    /// Builds the application state from the environment. Fails fast when
    /// the provider API key is missing.
    pub fn initialize() -> Result<Arc<Self>, ApiError> {
        let config = AppConfig::from_env()?;

        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(
            config.base_url.clone(),
            config.api_key.clone(),
        ));

        let sessions = SessionStore::new(config.history_cap);
        let indexer = IndexingPipeline::new(provider.clone(), config.embed_model.clone());
        let chain = RagChain::new(
            provider,
            config.chat_model.clone(),
            config.embed_model.clone(),
            config.top_k,
        );

        Ok(Arc::new(AppState {
            config,
            sessions,
            indexer,
            chain,
        }))
    }
}
