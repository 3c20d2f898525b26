//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Ollama / Mock）与按偏好选模型

pub mod mock;
pub mod openai;
pub mod router;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, DEEPSEEK_CHAT};
pub use router::ModelRouter;
pub use traits::{LlmClient, LlmError, Message, Role};
