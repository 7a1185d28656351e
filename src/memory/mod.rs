//! 记忆层：对话日志、用户画像、对话摘要向量检索、画像抽取与 SQLite 持久化

pub mod conversation;
pub mod extraction;
pub mod persistence;
pub mod profile;
pub mod summary;
pub mod vector;

pub use conversation::{Conversation, ConversationStore, InMemoryConversationStore, Message, Role};
pub use extraction::{
    extract_quick_facts, parse_job_query, should_run_full_extraction, ProfileExtractor,
    FULL_EXTRACTION_INTERVAL,
};
pub use persistence::SqliteStore;
pub use profile::{
    deep_merge, InMemoryProfileRepository, Profile, ProfileRepository, ProfileStore,
    EMPTY_PROFILE_CONTEXT, MAX_MEMORIES,
};
pub use summary::{
    create_conversation_summary, filter_by_distance, MemoryConfig, MemoryService, SUMMARY_WINDOW,
};
pub use vector::{cosine_similarity, InMemoryVectorStore, MemorySummary, VectorStore};
