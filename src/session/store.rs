//! 会话存储抽象层
//!
//! 上下文按 session 存一份最新值；轮次记录单独追加、从不修改。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::context::{ConversationContext, ConversationTurn};

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取会话上下文；不存在时返回新上下文（不落盘）
    async fn load_context(&self, session_id: &str, user_id: &str) -> ConversationContext;

    /// 提交本轮结束后的上下文
    async fn save_context(&self, context: ConversationContext);

    /// 追加一轮记录
    async fn append_turn(&self, turn: ConversationTurn);

    /// 本会话内按 conversation_id 取最早的那一轮（原始轮次）
    async fn original_turn(&self, session_id: &str, conversation_id: &str) -> Option<ConversationTurn>;

    /// 会话历史（最近 limit 轮，按时间顺序）
    async fn history(&self, session_id: &str, limit: Option<usize>) -> Vec<ConversationTurn>;

    /// 清理过期会话，返回清理数
    async fn cleanup_expired(&self) -> usize;
}

struct Entry {
    context: ConversationContext,
    touched: Instant,
}

/// 内存会话存储
pub struct MemorySessionStore {
    contexts: RwLock<HashMap<String, Entry>>,
    turns: RwLock<Vec<ConversationTurn>>,
    timeout: Duration,
}

impl MemorySessionStore {
    pub fn new(session_timeout_secs: u64) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            turns: RwLock::new(Vec::new()),
            timeout: Duration::from_secs(session_timeout_secs),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(3600)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_context(&self, session_id: &str, user_id: &str) -> ConversationContext {
        self.contexts
            .read()
            .await
            .get(session_id)
            .map(|e| e.context.clone())
            .unwrap_or_else(|| ConversationContext::new(session_id, user_id))
    }

    async fn save_context(&self, context: ConversationContext) {
        self.contexts.write().await.insert(
            context.session_id.clone(),
            Entry {
                context,
                touched: Instant::now(),
            },
        );
    }

    async fn append_turn(&self, turn: ConversationTurn) {
        self.turns.write().await.push(turn);
    }

    async fn original_turn(&self, session_id: &str, conversation_id: &str) -> Option<ConversationTurn> {
        self.turns
            .read()
            .await
            .iter()
            .find(|t| t.session_id == session_id && t.conversation_id == conversation_id)
            .cloned()
    }

    async fn history(&self, session_id: &str, limit: Option<usize>) -> Vec<ConversationTurn> {
        let turns = self.turns.read().await;
        let all: Vec<_> = turns.iter().filter(|t| t.session_id == session_id).collect();
        let skip = limit.map(|l| all.len().saturating_sub(l)).unwrap_or(0);
        all.into_iter().skip(skip).cloned().collect()
    }

    async fn cleanup_expired(&self) -> usize {
        let mut contexts = self.contexts.write().await;
        let before = contexts.len();
        let timeout = self.timeout;
        contexts.retain(|_, e| e.touched.elapsed() < timeout);
        before - contexts.len()
    }
}
