//! # Clinic Assistant
//!
//! 出院小结生成与知识问答的检索增强管线：
//! - 模板文档切分
//! - 词法检索与重排
//! - 外部大模型生成

pub mod chunker;
pub mod model;
pub mod pipeline;
pub mod retrieval;

pub use chunker::{chunk_text, Chunk};
pub use model::{ChatCompletionsClient, ChatModel, CompletionRequest};
pub use pipeline::{AssistantPipeline, NO_TEMPLATES_MESSAGE};
pub use retrieval::{rerank, ChunkIndex};
