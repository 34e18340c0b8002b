//! The per-turn retrieval chain: history-aware reformulation, top-k page
//! retrieval, and context-grounded answer composition.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::store::{ScoredPage, VectorStore};
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

const REFORMULATE_SYSTEM_PROMPT: &str = "Given the chat history and the latest user question, \
which might reference context in the chat history, rewrite the question as a standalone \
question that can be understood without the chat history. Do not answer the question; \
reformulate it if it depends on earlier turns and otherwise return it unchanged.";

const ANSWER_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. Use the \
retrieved context below to answer the question. If the context does not contain the answer, \
say that you don't know. Use three sentences maximum and keep the answer concise.\n\n{context}";

pub struct RagChain {
    provider: Arc<dyn LlmProvider>,
    chat_model: String,
    embed_model: String,
    top_k: usize,
}

impl RagChain {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        chat_model: String,
        embed_model: String,
        top_k: usize,
    ) -> Self {
        Self {
            provider,
            chat_model,
            embed_model,
            top_k,
        }
    }

    /// Rewrite a follow-up question into a standalone one using the chat
    /// history. With no history there is nothing to resolve, so the question
    /// passes through without a provider call. A provider failure falls back
    /// to the raw question.
    pub async fn reformulate(&self, history: &[ChatMessage], question: &str) -> String {
        if history.is_empty() {
            return question.to_string();
        }

        let mut messages = vec![ChatMessage::system(REFORMULATE_SYSTEM_PROMPT)];
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(question));

        match self
            .provider
            .chat(ChatRequest::new(messages), &self.chat_model)
            .await
        {
            Ok(standalone) if !standalone.trim().is_empty() => standalone.trim().to_string(),
            Ok(_) => question.to_string(),
            Err(err) => {
                tracing::warn!("reformulation failed, using the raw question: {}", err);
                question.to_string()
            }
        }
    }

    /// Embed the standalone question and fetch the top-k most similar pages.
    pub async fn retrieve(
        &self,
        index: &dyn VectorStore,
        standalone_question: &str,
    ) -> Result<Vec<ScoredPage>, ApiError> {
        let embeddings = self
            .provider
            .embed(&[standalone_question.to_string()], &self.embed_model)
            .await?;

        let query_embedding = embeddings
            .first()
            .ok_or_else(|| ApiError::Upstream("no embedding returned for query".to_string()))?;

        index.search(query_embedding, self.top_k).await
    }

    /// Stream the answer for a question given the retrieved context and the
    /// running history. The question goes in verbatim; retrieval already used
    /// the standalone rewrite.
    pub async fn stream_answer(
        &self,
        history: &[ChatMessage],
        question: &str,
        context: &[ScoredPage],
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let request = self.answer_request(history, question, context);
        self.provider.stream_chat(request, &self.chat_model).await
    }

    pub(crate) fn answer_request(
        &self,
        history: &[ChatMessage],
        question: &str,
        context: &[ScoredPage],
    ) -> ChatRequest {
        let system = ANSWER_SYSTEM_PROMPT.replace("{context}", &format_context(context));

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(question));

        ChatRequest::new(messages)
    }
}

/// Concatenate retrieved pages into the prompt context block, with source
/// citations.
pub fn format_context(pages: &[ScoredPage]) -> String {
    let mut context = String::new();
    for (i, scored) in pages.iter().enumerate() {
        context.push_str(&format!(
            "[{}] ({}, page {})\n{}\n\n",
            i + 1,
            scored.page.source,
            scored.page.page_number,
            scored.page.text
        ));
    }
    context.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentPage;

    fn scored(source: &str, page_number: usize, text: &str) -> ScoredPage {
        ScoredPage {
            page: DocumentPage {
                source: source.to_string(),
                page_number,
                text: text.to_string(),
            },
            score: 0.9,
        }
    }

    #[test]
    fn context_block_cites_source_and_page() {
        let pages = vec![
            scored("paper.pdf", 3, "Attention weighs token relevance."),
            scored("paper.pdf", 7, "Complexity is quadratic in sequence length."),
        ];

        let context = format_context(&pages);

        assert!(context.starts_with("[1] (paper.pdf, page 3)"));
        assert!(context.contains("[2] (paper.pdf, page 7)"));
        assert!(context.contains("quadratic in sequence length"));
    }

    #[test]
    fn empty_context_is_empty() {
        assert_eq!(format_context(&[]), "");
    }
}
