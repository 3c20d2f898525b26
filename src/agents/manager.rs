//! 业务中心（第 1 层）：在自己的叶子之间分类并转交
//!
//! 分类规则与总指挥相同，只是候选限于本中心的叶子；
//! 拿不准时给出只涉及本中心业务的澄清，不会提到其他中心。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{AgentResult, AgentTool, LeafAgent, Routed, TurnInput};
use crate::agents::capability::AgentCapability;
use crate::core::AgentError;
use crate::hierarchy::{AgentRegistry, HierarchyError, Level};
use crate::routing::{Candidate, ClassifierProvider, RoutingDecision, RoutingPolicy};
use crate::session::{ConversationContext, Language};

pub struct CenterManager {
    id: String,
    capability: AgentCapability,
    candidates: Vec<Candidate>,
    leaves: HashMap<String, Arc<dyn LeafAgent>>,
    classifier: Arc<dyn ClassifierProvider>,
    policy: RoutingPolicy,
}

impl CenterManager {
    /// 从注册表取本中心的子节点；每个子节点都必须有对应的叶子实现
    pub fn new(
        id: &str,
        registry: &AgentRegistry,
        leaves: Vec<Arc<dyn LeafAgent>>,
        classifier: Arc<dyn ClassifierProvider>,
        policy: RoutingPolicy,
    ) -> Result<Self, HierarchyError> {
        let node = registry
            .get(id)
            .ok_or_else(|| HierarchyError::Dangling(id.to_string()))?;
        let leaves: HashMap<String, Arc<dyn LeafAgent>> = leaves
            .into_iter()
            .map(|l| (l.id().to_string(), l))
            .collect();
        for child in registry.children(id) {
            if child.level != Level::Leaf || !leaves.contains_key(&child.id) {
                return Err(HierarchyError::UnknownLeaf(child.id.clone()));
            }
        }
        Ok(Self {
            id: id.to_string(),
            capability: node.capability.clone(),
            candidates: registry.candidates(id),
            leaves,
            classifier,
            policy,
        })
    }

    pub fn capability(&self) -> &AgentCapability {
        &self.capability
    }

    fn clarification(&self, input: &TurnInput, language: Language) -> AgentResult {
        let name = &self.capability.agent_type;
        let (head, tail) = match language {
            Language::Zh => (
                format!("我是{name}，没能确定您要做哪项操作。我可以帮您："),
                "请换个说法或补充要处理的对象。",
            ),
            Language::Ja => (
                format!("{name}です。どの操作か判断できませんでした。次のことができます："),
                "言い方を変えるか、対象を補足してください。",
            ),
            Language::En => (
                format!("This is {name}. I couldn't tell which operation you want. I can help with:"),
                "Please rephrase or name the record to work on.",
            ),
        };
        let mut text = head;
        for c in &self.candidates {
            text.push_str(&format!("\n- {}", c.capability.brief()));
        }
        text.push('\n');
        text.push_str(tail);
        AgentResult::reply(&input.trace_id, &self.id, text)
    }
}

#[async_trait]
impl AgentTool for CenterManager {
    fn id(&self) -> &str {
        &self.id
    }

    async fn route(
        &self,
        input: &TurnInput,
        context: &ConversationContext,
    ) -> Result<RoutingDecision, AgentError> {
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
        tracing::debug!(manager = %self.id, rationale = %classification.rationale, "classified");
        Ok(RoutingDecision::decide(
            Level::Manager.as_u8(),
            classification,
            self.policy.confidence_threshold,
        ))
    }

    async fn delegate(
        &self,
        input: &TurnInput,
        context: &ConversationContext,
    ) -> Result<Routed, AgentError> {
        let decision = self.route(input, context).await?;
        let target = decision
            .delegate_to()
            .and_then(|id| self.leaves.get(id))
            .cloned();
        match target {
            Some(leaf) => {
                tracing::info!(
                    manager = %self.id,
                    target = leaf.id(),
                    confidence = decision.confidence,
                    "delegating to leaf"
                );
                let outcome = leaf.execute(input, context).await?;
                Ok(Routed::from_leaf(decision, outcome))
            }
            None => {
                tracing::warn!(
                    manager = %self.id,
                    confidence = decision.confidence,
                    "ambiguous within center, asking for clarification"
                );
                Ok(Routed::answered(decision, self.clarification(input, context.language), context))
            }
        }
    }
}
