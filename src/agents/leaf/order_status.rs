//! 订单状态：订单 / 支付 / 配送三类状态的修改

use async_trait::async_trait;
use serde_json::{json, Value};

use super::order_item::single_order;
use super::{fetch_order, LeafPlan};
use crate::agents::capability::ORDER_STATUS_CHANGE;
use crate::core::AgentError;
use crate::domain::{missing_order, status_change_issues, StatusKind, ValidationError};
use crate::session::reference::value_of;
use crate::session::{ConversationContext, EntityKind};
use crate::tools::backoffice::UpdateStatusTool;
use crate::tools::{ToolCall, ToolInvoker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIntent {
    pub order_id: String,
    pub kind: StatusKind,
    /// 识别出的状态值；不认识的原样保留，交给前置检查报错
    pub value: String,
}

pub struct OrderStatusPlan;

#[async_trait]
impl LeafPlan for OrderStatusPlan {
    type Intent = StatusIntent;

    fn id(&self) -> &'static str {
        ORDER_STATUS_CHANGE
    }

    fn parse(&self, message: &str, context: &ConversationContext) -> Result<StatusIntent, String> {
        let order_id = single_order(message, context, "把订单ORD-1001的支付状态改为已付款")?;
        let kind = StatusKind::detect(message);
        let value = kind
            .find_in(message)
            .map(str::to_string)
            .or_else(|| value_of(message));
        let Some(value) = value else {
            return Err(format!(
                "请告诉我要把订单{order_id}的{}改成什么，可选：{}",
                kind.label(),
                kind.valid_values().join(", ")
            ));
        };
        Ok(StatusIntent {
            order_id,
            kind,
            value,
        })
    }

    async fn check(
        &self,
        intent: &StatusIntent,
        tools: &dyn ToolInvoker,
    ) -> Result<Vec<ValidationError>, AgentError> {
        match fetch_order(tools, &intent.order_id).await? {
            None => Ok(vec![missing_order(&intent.order_id)]),
            Some(order) => Ok(status_change_issues(&order, intent.kind, &intent.value)),
        }
    }

    fn tool_call(&self, intent: &StatusIntent) -> ToolCall {
        let value = intent
            .kind
            .normalize(&intent.value)
            .unwrap_or(intent.value.as_str());
        ToolCall::new(
            UpdateStatusTool::tool_name(intent.kind),
            json!({ "order_id": intent.order_id, "value": value }),
        )
    }

    fn on_success(
        &self,
        intent: &StatusIntent,
        data: &Value,
        context: &mut ConversationContext,
    ) -> (String, Option<Value>) {
        context.select(EntityKind::Order, vec![intent.order_id.clone()]);
        let label = intent.kind.label_of(&intent.value).unwrap_or(&intent.value);
        (
            format!(
                "已将订单{}的{}改为「{}」。",
                intent.order_id,
                intent.kind.label(),
                label
            ),
            Some(data.clone()),
        )
    }

    fn blocked_reply(&self, intent: &StatusIntent) -> String {
        format!("订单{}的{}没有修改。", intent.order_id, intent.kind.label())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Recording;
    use super::super::build_leaf;
    use super::*;
    use crate::agents::TurnInput;
    use crate::domain::{OrderStatus, PaymentStatus, ShippingStatus};

    fn ctx() -> ConversationContext {
        ConversationContext::new("s", "u")
    }

    #[test]
    fn test_parse_kinds() {
        let plan = OrderStatusPlan;
        let p = plan
            .parse("把订单ORD-1001的支付状态改为已付款", &ctx())
            .unwrap();
        assert_eq!((p.kind, p.value.as_str()), (StatusKind::Payment, "paid"));

        let o = plan.parse("订单ORD-1003已发货", &ctx()).unwrap();
        assert_eq!((o.kind, o.value.as_str()), (StatusKind::Order, "shipped"));

        let s = plan
            .parse("把订单ORD-1002的配送状态改为运输中", &ctx())
            .unwrap();
        assert_eq!((s.kind, s.value.as_str()), (StatusKind::Shipping, "in_transit"));

        assert!(plan.parse("修改订单ORD-1001的状态", &ctx()).is_err());
    }

    #[tokio::test]
    async fn test_ship_order_cascades() {
        let tools = Recording::seeded();
        let leaf = build_leaf(ORDER_STATUS_CHANGE, tools.clone()).unwrap();
        let out = leaf
            .execute(&TurnInput::new("订单ORD-1003已发货", "t1"), &ctx())
            .await
            .unwrap();
        assert!(out.result.errors.is_empty(), "{:?}", out.result.errors);
        assert!(out.result.reply_text.contains("已发货"));
        let order = tools.backoffice.order("ORD-1003").await.unwrap();
        assert_eq!(order.order_status, OrderStatus::Shipped);
        assert_eq!(order.shipping_status, ShippingStatus::Shipped);
    }

    #[tokio::test]
    async fn test_invalid_value_lists_choices() {
        let tools = Recording::seeded();
        let leaf = build_leaf(ORDER_STATUS_CHANGE, tools.clone()).unwrap();
        let out = leaf
            .execute(
                &TurnInput::new("把订单ORD-1001的支付状态改为'赊账'", "t1"),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(out.result.errors[0].field, "payment_status");
        assert!(out.result.errors[0].repair_hint.contains("paid"));
        assert!(tools.mutating_calls().is_empty());
        assert_eq!(
            tools.backoffice.order("ORD-1001").await.unwrap().payment_status,
            PaymentStatus::Unpaid
        );
    }
}
