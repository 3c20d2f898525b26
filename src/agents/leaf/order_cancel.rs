//! 订单取消

use async_trait::async_trait;
use serde_json::{json, Value};

use super::order_item::single_order;
use super::{fetch_order, records_one, LeafPlan};
use crate::agents::capability::ORDER_CANCELLATION;
use crate::core::AgentError;
use crate::domain::{cancel_issues, missing_order, Order, PaymentStatus, ValidationError};
use crate::session::{ConversationContext, EntityKind};
use crate::tools::{ToolCall, ToolInvoker};

pub struct OrderCancelPlan;

#[async_trait]
impl LeafPlan for OrderCancelPlan {
    type Intent = String;

    fn id(&self) -> &'static str {
        ORDER_CANCELLATION
    }

    fn parse(&self, message: &str, context: &ConversationContext) -> Result<String, String> {
        single_order(message, context, "取消订单ORD-1001").map_err(|question| {
            if context.selected(EntityKind::Order).is_empty() && !question.contains('、') {
                "请告诉我要取消哪个订单，例如：取消订单ORD-1001".to_string()
            } else {
                question
            }
        })
    }

    async fn check(
        &self,
        order_id: &String,
        tools: &dyn ToolInvoker,
    ) -> Result<Vec<ValidationError>, AgentError> {
        match fetch_order(tools, order_id).await? {
            None => Ok(vec![missing_order(order_id)]),
            Some(order) => Ok(cancel_issues(&order)),
        }
    }

    fn tool_call(&self, order_id: &String) -> ToolCall {
        ToolCall::new("cancel_order", json!({ "order_id": order_id }))
    }

    fn on_success(
        &self,
        order_id: &String,
        data: &Value,
        context: &mut ConversationContext,
    ) -> (String, Option<Value>) {
        context.select(EntityKind::Order, vec![order_id.clone()]);
        let mut text = format!("已取消订单{order_id}。");
        if let Some(order) = records_one::<Order>(data) {
            if order.payment_status == PaymentStatus::Refunded {
                text.push_str(&format!("已付款金额 {} 将原路退款。", order.total_amount));
            }
        }
        (text, Some(data.clone()))
    }

    fn blocked_reply(&self, order_id: &String) -> String {
        format!("订单{order_id}没有取消。")
    }
}
