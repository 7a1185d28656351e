//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）以及嵌入提供方

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, ResponseSchema, TokenStream};

/// 根据配置与环境变量选择 LLM 后端：有 API Key 用 OpenAI 兼容端点，否则用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let key = cfg
        .llm
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.is_empty());
    match key {
        Some(key) => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
            ))
        }
        None => {
            tracing::warn!("No API key set, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}
