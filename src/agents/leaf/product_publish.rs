//! 商品上架 / 下架（多个商品一次批量调用）

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{contains_any, fetch_product, resolve_targets, LeafPlan};
use crate::agents::capability::PRODUCT_PUBLISH;
use crate::core::AgentError;
use crate::domain::{missing_product, publish_issues, unpublish_issues, ValidationError};
use crate::session::reference::product_ids;
use crate::session::{ConversationContext, EntityKind};
use crate::tools::{ToolCall, ToolInvoker};

const UNPUBLISH_WORDS: &[&str] = &["下架", "下线", "取消上架", "unpublish", "非公開"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishIntent {
    pub jancodes: Vec<String>,
    pub publish: bool,
}

impl PublishIntent {
    fn verb(&self) -> &'static str {
        if self.publish {
            "上架"
        } else {
            "下架"
        }
    }
}

pub struct ProductPublishPlan;

#[async_trait]
impl LeafPlan for ProductPublishPlan {
    type Intent = PublishIntent;

    fn id(&self) -> &'static str {
        PRODUCT_PUBLISH
    }

    fn parse(&self, message: &str, context: &ConversationContext) -> Result<PublishIntent, String> {
        let publish = !contains_any(message, UNPUBLISH_WORDS);
        let jancodes = resolve_targets(product_ids(message), context, EntityKind::Product);
        if jancodes.is_empty() {
            let verb = if publish { "上架" } else { "下架" };
            return Err(format!(
                "请告诉我要{verb}哪些商品，例如：{verb}商品A；也可以先说：显示所有未上架商品"
            ));
        }
        Ok(PublishIntent { jancodes, publish })
    }

    async fn check(
        &self,
        intent: &PublishIntent,
        tools: &dyn ToolInvoker,
    ) -> Result<Vec<ValidationError>, AgentError> {
        let mut issues = Vec::new();
        for id in &intent.jancodes {
            match fetch_product(tools, id).await? {
                None => issues.push(missing_product(id)),
                Some(p) if intent.publish => issues.extend(publish_issues(&p)),
                Some(p) => issues.extend(unpublish_issues(&p)),
            }
        }
        Ok(issues)
    }

    fn tool_call(&self, intent: &PublishIntent) -> ToolCall {
        let tool = if intent.publish {
            "publish_products"
        } else {
            "unpublish_products"
        };
        ToolCall::new(tool, json!({ "jancodes": intent.jancodes }))
    }

    fn on_success(
        &self,
        intent: &PublishIntent,
        data: &Value,
        context: &mut ConversationContext,
    ) -> (String, Option<Value>) {
        context.select(EntityKind::Product, intent.jancodes.clone());
        (
            format!("已{}商品：{}。", intent.verb(), intent.jancodes.join("、")),
            Some(data.clone()),
        )
    }

    fn blocked_reply(&self, intent: &PublishIntent) -> String {
        format!(
            "商品{}暂时无法{}。",
            intent.jancodes.join("、"),
            intent.verb()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Recording;
    use super::super::{build_leaf, LeafState};
    use super::*;
    use crate::agents::TurnInput;
    use crate::domain::ProductStatus;

    fn ctx() -> ConversationContext {
        ConversationContext::new("s", "u")
    }

    #[test]
    fn test_parse_direction() {
        let plan = ProductPublishPlan;
        assert!(plan.parse("上架商品A", &ctx()).unwrap().publish);
        assert!(!plan.parse("下架商品B", &ctx()).unwrap().publish);
        assert!(!plan.parse("取消上架商品B", &ctx()).unwrap().publish);
        assert!(!plan.parse("unpublish product B", &ctx()).unwrap().publish);
        assert!(plan.parse("上架它们", &ctx()).is_err());
    }

    #[tokio::test]
    async fn test_publish_blocked_by_missing_category_and_stock() {
        let tools = Recording::seeded();
        let leaf = build_leaf(PRODUCT_PUBLISH, tools.clone()).unwrap();
        let out = leaf
            .execute(&TurnInput::new("上架商品A", "t1"), &ctx())
            .await
            .unwrap();
        let fields: Vec<&str> = out.result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["category", "stock"]);
        assert!(out.trace.tool_call.is_none());
        assert!(!out.trace.states.contains(&LeafState::ToolInvoked));
        assert!(tools.mutating_calls().is_empty());
        assert_eq!(
            tools.backoffice.product("A").await.unwrap().status,
            ProductStatus::Unpublished
        );
    }

    #[tokio::test]
    async fn test_publish_selection_in_one_call() {
        let tools = Recording::seeded();
        let leaf = build_leaf(PRODUCT_PUBLISH, tools.clone()).unwrap();
        let mut context = ctx();
        context.select(EntityKind::Product, vec!["4901234567890".into()]);
        let out = leaf
            .execute(&TurnInput::new("把它们都上架", "t1"), &context)
            .await
            .unwrap();
        assert!(out.result.errors.is_empty());
        assert_eq!(tools.mutating_calls().len(), 1);
        assert_eq!(
            tools.backoffice.product("4901234567890").await.unwrap().status,
            ProductStatus::Published
        );
    }

    #[tokio::test]
    async fn test_unpublish_already_unpublished() {
        let tools = Recording::seeded();
        let leaf = build_leaf(PRODUCT_PUBLISH, tools.clone()).unwrap();
        let out = leaf
            .execute(&TurnInput::new("下架商品A", "t1"), &ctx())
            .await
            .unwrap();
        assert_eq!(out.result.errors[0].field, "status");
        assert!(tools.mutating_calls().is_empty());
    }
}
