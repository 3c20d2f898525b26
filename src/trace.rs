//! 轮次追踪与评价
//!
//! 每轮结束写一条 TraceRecord（路由路径、叶子状态序列、是否出错）；
//! evaluate 只在这里记票，不碰会话与轮次记录。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::agents::LeafTrace;
use crate::routing::RoutingDecision;

/// 用户评价
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Good,
    Bad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub session_id: String,
    pub conversation_id: String,
    pub user_message: String,
    /// 自顶向下每层一条
    pub route_path: Vec<RoutingDecision>,
    pub handled_by: Option<String>,
    pub leaf: Option<LeafTrace>,
    pub had_errors: bool,
    /// 基础设施故障时的错误描述（分类超时等）
    pub failure: Option<String>,
    pub vote: Option<Vote>,
    pub voted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 追踪记录接口（外部边界）
#[async_trait]
pub trait TraceRecorder: Send + Sync {
    async fn record(&self, record: TraceRecord);

    /// 给某轮投票；trace 不存在时返回 false
    async fn evaluate(&self, trace_id: &str, vote: Vote, user_id: &str) -> bool;

    async fn get(&self, trace_id: &str) -> Option<TraceRecord>;
}

/// 内存实现
#[derive(Default)]
pub struct InMemoryTraceRecorder {
    records: RwLock<HashMap<String, TraceRecord>>,
}

impl InMemoryTraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl TraceRecorder for InMemoryTraceRecorder {
    async fn record(&self, record: TraceRecord) {
        self.records
            .write()
            .await
            .insert(record.trace_id.clone(), record);
    }

    async fn evaluate(&self, trace_id: &str, vote: Vote, user_id: &str) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(trace_id) {
            Some(r) => {
                r.vote = Some(vote);
                r.voted_by = Some(user_id.to_string());
                tracing::info!(trace_id, vote = ?vote, "turn evaluated");
                true
            }
            None => {
                tracing::warn!(trace_id, "evaluate on unknown trace");
                false
            }
        }
    }

    async fn get(&self, trace_id: &str) -> Option<TraceRecord> {
        self.records.read().await.get(trace_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> TraceRecord {
        TraceRecord {
            trace_id: id.into(),
            session_id: "s".into(),
            conversation_id: "c".into(),
            user_message: "上架商品A".into(),
            route_path: Vec::new(),
            handled_by: Some("product_publish".into()),
            leaf: None,
            had_errors: true,
            failure: None,
            vote: None,
            voted_by: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_evaluate_sets_vote() {
        let rec = InMemoryTraceRecorder::new();
        rec.record(record("t1")).await;
        assert!(rec.evaluate("t1", Vote::Bad, "u1").await);
        let r = rec.get("t1").await.unwrap();
        assert_eq!(r.vote, Some(Vote::Bad));
        assert_eq!(r.voted_by.as_deref(), Some("u1"));
        assert!(!rec.evaluate("missing", Vote::Good, "u1").await);
    }

    #[test]
    fn test_vote_wire_format() {
        assert_eq!(serde_json::to_string(&Vote::Good).unwrap(), "\"good\"");
        let v: Vote = serde_json::from_str("\"bad\"").unwrap();
        assert_eq!(v, Vote::Bad);
    }
}
