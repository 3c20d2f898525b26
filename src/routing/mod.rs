//! 路由：分类器实现与「分类结果 → 路由决策」的统一规则
//!
//! 总指挥与业务中心共用同一套规则：
//! - 有目标且置信度达到阈值 → 转交目标
//! - 其余一律 `is_fallback = true`，由当前节点自己回答（澄清或能力总览）

pub mod chain;
pub mod classifier;
pub mod keyword;
pub mod llm;
pub mod tokenizer;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use chain::ChainClassifier;
pub use classifier::{Candidate, Classification, ClassifierProvider};
pub use keyword::KeywordClassifier;
pub use llm::LlmClassifier;

use crate::config::RoutingSection;
use crate::core::AgentError;
use crate::session::ConversationContext;

/// 某一层的一次路由决策；只用于诊断，不持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub level: u8,
    pub target_node_id: Option<String>,
    pub confidence: f32,
    pub rationale: String,
    pub is_fallback: bool,
}

impl RoutingDecision {
    /// 按阈值把分类结果变成决策
    pub fn decide(level: u8, classification: Classification, threshold: f32) -> Self {
        let is_fallback =
            classification.target_node_id.is_none() || classification.confidence < threshold;
        Self {
            level,
            target_node_id: classification.target_node_id,
            confidence: classification.confidence,
            rationale: classification.rationale,
            is_fallback,
        }
    }

    /// 需要转交的目标；回退时为 None
    pub fn delegate_to(&self) -> Option<&str> {
        if self.is_fallback {
            None
        } else {
            self.target_node_id.as_deref()
        }
    }
}

/// 路由参数
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingPolicy {
    pub confidence_threshold: f32,
    pub classifier_timeout: Duration,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            classifier_timeout: Duration::from_secs(30),
        }
    }
}

impl RoutingPolicy {
    pub fn from_config(cfg: &RoutingSection) -> Self {
        Self {
            confidence_threshold: cfg.confidence_threshold,
            classifier_timeout: Duration::from_secs(cfg.classifier_timeout_secs),
        }
    }

    /// 在超时与取消约束下调用分类器
    pub async fn classify(
        &self,
        classifier: &dyn ClassifierProvider,
        text: &str,
        candidates: &[Candidate],
        context: &ConversationContext,
        cancel: &CancellationToken,
    ) -> Result<Classification, AgentError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            res = tokio::time::timeout(
                self.classifier_timeout,
                classifier.classify(text, candidates, context),
            ) => match res {
                Ok(inner) => inner,
                Err(_) => {
                    tracing::warn!(
                        classifier = classifier.name(),
                        timeout_secs = self.classifier_timeout.as_secs(),
                        "classifier timed out"
                    );
                    Err(AgentError::ClassifierTimeout(self.classifier_timeout.as_secs()))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Sleepy;

    #[async_trait]
    impl ClassifierProvider for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }
        async fn classify(
            &self,
            _text: &str,
            _candidates: &[Candidate],
            _context: &ConversationContext,
        ) -> Result<Classification, AgentError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Classification::unknown("late"))
        }
    }

    #[test]
    fn test_decide_threshold() {
        let c = Classification::new(Some("order_center".into()), 0.59, "");
        let d = RoutingDecision::decide(0, c, 0.6);
        assert!(d.is_fallback);
        assert!(d.delegate_to().is_none());

        let c = Classification::new(Some("order_center".into()), 0.6, "");
        let d = RoutingDecision::decide(0, c, 0.6);
        assert_eq!(d.delegate_to(), Some("order_center"));

        let d = RoutingDecision::decide(1, Classification::new(None, 0.95, "greeting"), 0.6);
        assert!(d.is_fallback);
    }

    #[tokio::test]
    async fn test_classifier_timeout() {
        let policy = RoutingPolicy {
            confidence_threshold: 0.6,
            classifier_timeout: Duration::from_millis(50),
        };
        let ctx = ConversationContext::new("s", "u");
        let err = policy
            .classify(&Sleepy, "你好", &[], &ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ClassifierTimeout(_)));
    }

    #[tokio::test]
    async fn test_classifier_cancelled() {
        let policy = RoutingPolicy::default();
        let ctx = ConversationContext::new("s", "u");
        let token = CancellationToken::new();
        token.cancel();
        let err = policy
            .classify(&Sleepy, "你好", &[], &ctx, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
