//! 分类器接口：给定指令、候选子节点与上下文，选出一个目标
//!
//! 置信度只在同一个分类器内部可比；阈值判断在路由层（`decide`）统一做。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agents::capability::AgentCapability;
use crate::core::AgentError;
use crate::session::ConversationContext;

/// 一个可被选中的子节点
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub node_id: String,
    /// 已合并后代关键词与示例
    pub capability: AgentCapability,
    /// 自身及全部后代 id，用于判断上一轮目标落在哪个分支
    pub subtree: Vec<String>,
}

impl Candidate {
    pub fn contains(&self, node_id: &str) -> bool {
        self.subtree.iter().any(|id| id == node_id)
    }
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// None 表示不需要任何业务动作（寒暄、问能做什么）
    pub target_node_id: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub rationale: String,
}

impl Classification {
    pub fn new(target: Option<String>, confidence: f32, rationale: impl Into<String>) -> Self {
        Self {
            target_node_id: target,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
        }
    }

    /// 没有任何线索
    pub fn unknown(rationale: impl Into<String>) -> Self {
        Self::new(None, 0.0, rationale)
    }
}

/// 分类器
#[async_trait]
pub trait ClassifierProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(
        &self,
        text: &str,
        candidates: &[Candidate],
        context: &ConversationContext,
    ) -> Result<Classification, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        let c = Classification::new(Some("x".into()), 1.7, "");
        assert_eq!(c.confidence, 1.0);
        assert_eq!(Classification::unknown("none").confidence, 0.0);
    }
}
