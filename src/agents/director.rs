//! 总指挥（第 0 层）：把一条指令分派给业务中心，或直接挂在根下的叶子
//!
//! - 达到阈值：原样转交，子节点的 `AgentResult` 不做改写
//! - 分类器认为无需业务操作（无目标）：回复能力总览
//! - 有目标但置信度不足：回复澄清，列出各业务中心

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{AgentResult, AgentTool, CenterManager, LeafAgent, Routed, TaskRouter, TurnInput};
use crate::core::AgentError;
use crate::hierarchy::{AgentRegistry, HierarchyError, Level};
use crate::routing::{Candidate, ClassifierProvider, RoutingDecision, RoutingPolicy};
use crate::session::{ConversationContext, Language};

/// 总指挥的直接子节点
#[derive(Clone)]
pub enum Child {
    Manager(Arc<CenterManager>),
    /// 直接挂在根下的叶子（退化情形）
    Leaf(Arc<dyn LeafAgent>),
}

pub struct Director {
    id: String,
    registry: Arc<AgentRegistry>,
    candidates: Vec<Candidate>,
    children: HashMap<String, Child>,
    classifier: Arc<dyn ClassifierProvider>,
    policy: RoutingPolicy,
}

impl Director {
    /// 根的每个子节点都必须有对应的实现
    pub fn new(
        registry: Arc<AgentRegistry>,
        children: HashMap<String, Child>,
        classifier: Arc<dyn ClassifierProvider>,
        policy: RoutingPolicy,
    ) -> Result<Self, HierarchyError> {
        let id = registry.root().id.clone();
        for node in registry.children(&id) {
            let ok = match (node.level, children.get(&node.id)) {
                (Level::Manager, Some(Child::Manager(_))) => true,
                (Level::Leaf, Some(Child::Leaf(_))) => true,
                _ => false,
            };
            if !ok {
                return Err(HierarchyError::UnknownLeaf(node.id.clone()));
            }
        }
        Ok(Self {
            candidates: registry.candidates(&id),
            id,
            registry,
            children,
            classifier,
            policy,
        })
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    fn overview(&self, input: &TurnInput, language: Language) -> AgentResult {
        let mut text = String::from(match language {
            Language::Zh => "您好，我可以帮您处理以下后台业务：",
            Language::Ja => "こんにちは。次のバックオフィス業務をお手伝いできます：",
            Language::En => "Hello, I can help with these back-office tasks:",
        });
        for c in &self.candidates {
            text.push('\n');
            text.push_str(&c.capability.render(&c.node_id));
        }
        AgentResult::reply(&input.trace_id, &self.id, text)
    }

    fn clarification(
        &self,
        input: &TurnInput,
        decision: &RoutingDecision,
        language: Language,
    ) -> AgentResult {
        let guess = decision
            .target_node_id
            .as_deref()
            .and_then(|id| self.registry.get(id))
            .map(|n| {
                let name = &n.capability.agent_type;
                match language {
                    Language::Zh => format!("（可能与{name}有关）"),
                    Language::Ja => format!("（{name}に関係がありそうです）"),
                    Language::En => format!(" (possibly {name})"),
                }
            })
            .unwrap_or_default();
        let mut text = match language {
            Language::Zh => format!("抱歉，我没能确定您要处理哪类业务{guess}。请说明是："),
            Language::Ja => format!("どの業務のご依頼か判断できませんでした{guess}。次のどれかを指定してください："),
            Language::En => format!("Sorry, I couldn't tell which area this is about{guess}. Please choose one of:"),
        };
        for c in &self.candidates {
            text.push_str(&format!("\n- {}", c.capability.brief()));
        }
        AgentResult::reply(&input.trace_id, &self.id, text)
    }
}

#[async_trait]
impl TaskRouter for Director {
    async fn route(
        &self,
        input: &TurnInput,
        context: &ConversationContext,
    ) -> Result<Routed, AgentError> {
        let classification = self
            .policy
            .classify(
                self.classifier.as_ref(),
                &input.message,
                &self.candidates,
                context,
                &input.cancel,
            )
            .await?;
        tracing::debug!(rationale = %classification.rationale, "director classified");
        let decision = RoutingDecision::decide(
            Level::Director.as_u8(),
            classification,
            self.policy.confidence_threshold,
        );
        tracing::info!(
            trace_id = %input.trace_id,
            target = ?decision.target_node_id,
            confidence = decision.confidence,
            fallback = decision.is_fallback,
            "routing decision"
        );

        let Some(target) = decision.delegate_to().map(str::to_string) else {
            let result = if decision.target_node_id.is_none() {
                self.overview(input, context.language)
            } else {
                tracing::warn!(trace_id = %input.trace_id, "low confidence, asking for clarification");
                self.clarification(input, &decision, context.language)
            };
            return Ok(Routed::answered(decision, result, context));
        };

        match self.children.get(&target) {
            Some(Child::Manager(manager)) => Ok(manager
                .delegate(input, context)
                .await?
                .prepend(decision)),
            Some(Child::Leaf(leaf)) => {
                let outcome = leaf.execute(input, context).await?;
                Ok(Routed::from_leaf(decision, outcome))
            }
            None => Err(AgentError::Hierarchy(HierarchyError::UnknownLeaf(target))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::build_leaf;
    use crate::agents::capability::{
        ORDER_CANCELLATION, ORDER_CENTER, PRODUCT_CENTER, PRODUCT_DETAIL, PRODUCT_PUBLISH,
    };
    use crate::agents::leaf::test_support::Recording;
    use crate::hierarchy::{HierarchySpec, NodeSpec};
    use crate::routing::KeywordClassifier;
    use crate::tools::ToolInvoker;

    fn director(registry: AgentRegistry, tools: Arc<Recording>) -> Director {
        let registry = Arc::new(registry);
        let invoker: Arc<dyn ToolInvoker> = tools;
        let classifier: Arc<dyn ClassifierProvider> = Arc::new(KeywordClassifier::new());
        let root = registry.root().id.clone();
        let mut children = HashMap::new();
        for node in registry.children(&root) {
            let child = if node.level == Level::Leaf {
                Child::Leaf(build_leaf(&node.id, invoker.clone()).unwrap())
            } else {
                let leaves = registry
                    .children(&node.id)
                    .iter()
                    .filter_map(|l| build_leaf(&l.id, invoker.clone()))
                    .collect();
                Child::Manager(Arc::new(
                    CenterManager::new(
                        &node.id,
                        &registry,
                        leaves,
                        classifier.clone(),
                        RoutingPolicy::default(),
                    )
                    .unwrap(),
                ))
            };
            children.insert(node.id.clone(), child);
        }
        Director::new(registry, children, classifier, RoutingPolicy::default()).unwrap()
    }

    fn ctx() -> ConversationContext {
        ConversationContext::new("s", "u")
    }

    #[tokio::test]
    async fn test_routes_through_manager() {
        let tools = Recording::seeded();
        let d = director(AgentRegistry::builtin().unwrap(), tools.clone());
        let routed = d
            .route(&TurnInput::new("为商品A设置分类为'母婴'", "t1"), &ctx())
            .await
            .unwrap();
        let path: Vec<Option<&str>> = routed
            .decisions
            .iter()
            .map(|d| d.target_node_id.as_deref())
            .collect();
        assert_eq!(path, vec![Some(PRODUCT_CENTER), Some(PRODUCT_DETAIL)]);
        assert!(routed.result.errors.is_empty());
        assert_eq!(routed.context.last_target.as_deref(), Some(PRODUCT_DETAIL));
    }

    #[tokio::test]
    async fn test_greeting_gets_overview() {
        let tools = Recording::seeded();
        let d = director(AgentRegistry::builtin().unwrap(), tools.clone());
        let routed = d.route(&TurnInput::new("你好", "t1"), &ctx()).await.unwrap();
        assert_eq!(routed.decisions.len(), 1);
        assert!(routed.decisions[0].is_fallback);
        assert!(routed.decisions[0].target_node_id.is_none());
        assert!(routed.result.reply_text.contains("商品中心"));
        assert!(routed.result.reply_text.contains("订单中心"));
        assert!(routed.result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_overview_follows_language() {
        let tools = Recording::seeded();
        let d = director(AgentRegistry::builtin().unwrap(), tools);
        let mut en = ctx();
        en.language = Language::En;
        let routed = d.route(&TurnInput::new("hello", "t1"), &en).await.unwrap();
        assert!(routed.decisions[0].target_node_id.is_none());
        assert!(routed.result.reply_text.starts_with("Hello, I can help"));
        assert!(!routed.result.reply_text.contains("您好"));

        let mut ja = ctx();
        ja.language = Language::Ja;
        let routed = d.route(&TurnInput::new("help", "t2"), &ja).await.unwrap();
        assert!(routed.result.reply_text.starts_with("こんにちは。"));
    }

    #[tokio::test]
    async fn test_cancel_it_without_selection_clarifies() {
        let tools = Recording::seeded();
        let d = director(AgentRegistry::builtin().unwrap(), tools.clone());
        let routed = d.route(&TurnInput::new("把它取消", "t1"), &ctx()).await.unwrap();
        assert_eq!(routed.decisions[0].target_node_id.as_deref(), Some(ORDER_CENTER));
        assert_eq!(routed.result.handled_by.as_deref(), Some(ORDER_CANCELLATION));
        assert!(routed.result.reply_text.contains("取消哪个订单"));
        let trace = routed.leaf_trace.unwrap();
        assert!(trace.tool_call.is_none());
        assert!(tools.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_leaf_directly_under_root() {
        let spec = HierarchySpec {
            root: NodeSpec::new("director", Level::Director).with_children(vec![
                NodeSpec::new(PRODUCT_PUBLISH, Level::Leaf),
                NodeSpec::new(ORDER_CENTER, Level::Manager)
                    .with_children(vec![NodeSpec::new(ORDER_CANCELLATION, Level::Leaf)]),
            ]),
        };
        let tools = Recording::seeded();
        let d = director(AgentRegistry::from_spec(&spec).unwrap(), tools.clone());
        let routed = d
            .route(&TurnInput::new("下架商品B", "t1"), &ctx())
            .await
            .unwrap();
        assert_eq!(routed.decisions.len(), 1);
        assert_eq!(routed.result.handled_by.as_deref(), Some(PRODUCT_PUBLISH));
        assert_eq!(tools.mutating_calls().len(), 1);
    }
}
