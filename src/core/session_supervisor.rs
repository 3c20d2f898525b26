//! 会话监管：同一会话的轮次串行化与分类阶段的取消
//!
//! 每个 session 一把 tokio Mutex，持锁的是被 spawn 出去的轮次任务本身，
//! 调用方中途放弃等待也不会把一轮切成两半。每轮一个子 CancellationToken，
//! `cancel(session_id)` 只影响正在分类的轮次；工具调用开始后不再响应取消。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct SessionSlot {
    lock: Arc<Mutex<()>>,
    current: Option<CancellationToken>,
}

/// 会话级生命周期管理：串行锁与取消令牌
pub struct SessionSupervisor {
    /// 引擎关闭时触发
    cancel_token: CancellationToken,
    sessions: StdMutex<HashMap<String, SessionSlot>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            sessions: StdMutex::new(HashMap::new()),
        }
    }

    /// 获取会话锁；返回的 guard 在轮次结束前一直持有
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions
                .entry(session_id.to_string())
                .or_default()
                .lock
                .clone()
        };
        lock.lock_owned().await
    }

    /// 为新一轮创建子 token（须在持有会话锁后调用）
    pub fn begin_turn(&self, session_id: &str) -> CancellationToken {
        let token = self.cancel_token.child_token();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.entry(session_id.to_string()).or_default().current = Some(token.clone());
        token
    }

    /// 本轮结束，清掉 token
    pub fn end_turn(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = sessions.get_mut(session_id) {
            slot.current = None;
        }
    }

    /// 取消该会话正在进行的轮次；没有进行中的轮次时返回 false
    pub fn cancel(&self, session_id: &str) -> bool {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get(session_id).and_then(|s| s.current.as_ref()) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消所有会话（关闭引擎）
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// 引擎关闭时触发的子 token，供后台任务退出用
    pub fn stop_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// 丢掉空闲会话的槽位：没有进行中的轮次，锁也没人持有或等待
    pub fn prune_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, slot| slot.current.is_some() || Arc::strong_count(&slot.lock) > 1);
        before - sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
