//! 会话层：上下文、轮次记录、实体引用与存储

pub mod context;
pub mod reference;
pub mod store;

pub use context::{ContextSnapshot, ConversationContext, ConversationTurn, EntityKind, Language};
pub use store::{MemorySessionStore, SessionStore};
