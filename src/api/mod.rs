// API module
// One explicitly constructed entry point over the retrieval pipeline

pub mod chat;


use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::config::Config;
use crate::database::SearchResult;
use crate::query::{IndexStats, QueryEngine};

pub use chat::{ChatModel, DEFAULT_CHAT_MODEL, OpenAiChat};

/// Search, context and answers over one indexed repository
pub struct RagApi {
    config: Config,
    engine: QueryEngine,
    chat: Option<Arc<dyn ChatModel>>,
}

impl std::fmt::Debug for RagApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagApi")
            .field("engine", &self.engine)
            .field("chat", &self.chat.is_some())
            .finish_non_exhaustive()
    }
}

impl RagApi {
    /// Open the index described by `config`
    #[inline]
    pub async fn open(config: Config) -> Result<Self> {
        let engine = QueryEngine::new(&config).await?;
        Ok(Self::with_engine(config, engine))
    }

    #[inline]
    pub fn with_engine(config: Config, engine: QueryEngine) -> Self {
        Self {
            config,
            engine,
            chat: None,
        }
    }

    /// Answer through `chat` instead of OpenAI
    #[inline]
    #[must_use]
    pub fn with_chat_model(mut self, chat: Arc<dyn ChatModel>) -> Self {
        self.chat = Some(chat);
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
        file_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        self.engine.query(query, top_k, threshold, file_filter).await
    }

    #[inline]
    pub async fn get_context(
        &self,
        query: &str,
        max_tokens: Option<usize>,
        top_k: Option<usize>,
    ) -> Result<String> {
        self.engine.context_for_llm(query, max_tokens, top_k).await
    }

    /// Retrieve context for `question` and ask a chat model to answer from it.
    ///
    /// Without an injected model this needs `OPENAI_API_KEY`.
    #[inline]
    pub async fn answer_with_context(&self, question: &str, model: Option<&str>) -> Result<String> {
        let context = self.get_context(question, None, None).await?;
        let prompt = build_answer_prompt(&context, question);
        let model = model.unwrap_or(DEFAULT_CHAT_MODEL);

        let chat: Arc<dyn ChatModel> = match &self.chat {
            Some(chat) => Arc::clone(chat),
            None => Arc::new(OpenAiChat::new(&self.config.embedding)?),
        };

        info!("Answering with {} ({} context chars)", model, context.len());
        chat.complete(&prompt, model).await
    }

    #[inline]
    pub async fn get_stats(&self) -> Result<IndexStats> {
        self.engine.stats().await
    }
}

#[inline]
pub fn build_answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant with access to a code repository. \n\
         Answer the following question based on the provided repository context.\n\n\
         {context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}
