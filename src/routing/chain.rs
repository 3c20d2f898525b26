//! 组合分类器：先走关键词，置信度不够再问 LLM
//!
//! LLM 失败或超出自己的时限时退回关键词结果（低置信度会在路由层变成澄清），不把故障抛给用户。
//! LLM 的时限要短于路由层的整体分类超时，否则退回永远来不及发生。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::classifier::{Candidate, Classification, ClassifierProvider};
use super::keyword::KeywordClassifier;
use crate::core::AgentError;
use crate::session::ConversationContext;

pub struct ChainClassifier {
    fast: KeywordClassifier,
    slow: Arc<dyn ClassifierProvider>,
    threshold: f32,
    llm_budget: Duration,
}

impl ChainClassifier {
    pub fn new(slow: Arc<dyn ClassifierProvider>, threshold: f32) -> Self {
        Self {
            fast: KeywordClassifier::new(),
            slow,
            threshold,
            llm_budget: Duration::from_secs(20),
        }
    }

    /// LLM 阶段的时限
    pub fn with_llm_budget(mut self, budget: Duration) -> Self {
        self.llm_budget = budget;
        self
    }
}

#[async_trait]
impl ClassifierProvider for ChainClassifier {
    fn name(&self) -> &str {
        "chain"
    }

    async fn classify(
        &self,
        text: &str,
        candidates: &[Candidate],
        context: &ConversationContext,
    ) -> Result<Classification, AgentError> {
        let fast = self.fast.classify(text, candidates, context).await?;
        if fast.confidence >= self.threshold {
            return Ok(fast);
        }
        let slow = self.slow.classify(text, candidates, context);
        match tokio::time::timeout(self.llm_budget, slow).await {
            Ok(Ok(slow)) => Ok(slow),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, classifier = self.slow.name(), "slow classifier failed, keeping keyword result");
                Ok(fast)
            }
            Err(_) => {
                tracing::warn!(
                    classifier = self.slow.name(),
                    budget_ms = self.llm_budget.as_millis() as u64,
                    "slow classifier over budget, keeping keyword result"
                );
                Ok(fast)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::AgentRegistry;
    use crate::llm::{LlmError, MockLlmClient, ModelRouter};
    use crate::routing::LlmClassifier;

    fn chain(mock: Arc<MockLlmClient>) -> ChainClassifier {
        let mut router = ModelRouter::new("mock");
        router.add_model("mock", mock);
        ChainClassifier::new(Arc::new(LlmClassifier::new(Arc::new(router))), 0.6)
    }

    #[tokio::test]
    async fn test_confident_keyword_skips_llm() {
        let mock = Arc::new(MockLlmClient::new());
        let reg = AgentRegistry::builtin().unwrap();
        let c = chain(mock.clone())
            .classify("上架商品A", &reg.candidates("director"), &ConversationContext::new("s", "u"))
            .await
            .unwrap();
        assert_eq!(c.target_node_id.as_deref(), Some("product_center"));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_low_confidence_asks_llm() {
        let mock = Arc::new(MockLlmClient::with_replies([
            r#"{"target": "order_center", "confidence": 0.8, "rationale": "退货属于订单"}"#,
        ]));
        let reg = AgentRegistry::builtin().unwrap();
        let c = chain(mock.clone())
            .classify("客人想退货", &reg.candidates("director"), &ConversationContext::new("s", "u"))
            .await
            .unwrap();
        assert_eq!(c.target_node_id.as_deref(), Some("order_center"));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_keyword_result() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::Request("connection refused".into()));
        let reg = AgentRegistry::builtin().unwrap();
        let c = chain(mock)
            .classify("客人想退货", &reg.candidates("director"), &ConversationContext::new("s", "u"))
            .await
            .unwrap();
        assert!(c.confidence < 0.6);
    }

    struct Stalled;

    #[async_trait]
    impl ClassifierProvider for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }
        async fn classify(
            &self,
            _text: &str,
            _candidates: &[Candidate],
            _context: &ConversationContext,
        ) -> Result<Classification, AgentError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_llm_falls_back_within_budget() {
        let reg = AgentRegistry::builtin().unwrap();
        let chain = ChainClassifier::new(Arc::new(Stalled), 0.6)
            .with_llm_budget(Duration::from_millis(50));
        let c = tokio::time::timeout(
            Duration::from_secs(1),
            chain.classify("客人想退货", &reg.candidates("director"), &ConversationContext::new("s", "u")),
        )
        .await
        .expect("keyword fallback should arrive before the outer timeout")
        .unwrap();
        assert!(c.confidence < 0.6);
    }
}
