//! 订单详情：查看订单、按状态或客户搜索订单

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{contains_any, fetch_order, records, resolve_targets, LeafPlan};
use crate::agents::capability::ORDER_DETAIL;
use crate::core::AgentError;
use crate::domain::{missing_order, Order, OrderStatus, PaymentStatus, ShippingStatus, ValidationError};
use crate::session::reference::{mentions_all, order_ids};
use crate::session::{ConversationContext, EntityKind};
use crate::tools::{ToolCall, ToolInvoker};

const SEARCH_WORDS: &[&str] = &["搜索", "查找", "列出", "search", "list", "検索", "一覧"];

#[derive(Debug, Clone, PartialEq)]
pub enum OrderQuery {
    Show {
        order_ids: Vec<String>,
    },
    Search {
        order_status: Option<OrderStatus>,
        payment_status: Option<PaymentStatus>,
        shipping_status: Option<ShippingStatus>,
    },
}

/// 一行订单摘要
pub(crate) fn describe(o: &Order) -> String {
    let items: Vec<String> = o
        .items
        .iter()
        .map(|i| format!("{}×{}", i.name, i.quantity))
        .collect();
    format!(
        "订单{}（{}）：{} / {} / {}，商品 {}，合计 {}",
        o.order_id,
        o.customer_name,
        o.order_status.label(),
        o.payment_status.label(),
        o.shipping_status.label(),
        if items.is_empty() {
            "无".to_string()
        } else {
            items.join("、")
        },
        o.total_amount
    )
}

pub struct OrderDetailPlan;

#[async_trait]
impl LeafPlan for OrderDetailPlan {
    type Intent = OrderQuery;

    fn id(&self) -> &'static str {
        ORDER_DETAIL
    }

    fn parse(&self, message: &str, context: &ConversationContext) -> Result<OrderQuery, String> {
        let explicit = order_ids(message);
        if explicit.is_empty() {
            // 配送 / 支付状态的中文名与订单状态有重叠（已发货），按字样区分
            let shipping = if contains_any(message, &["配送", "物流", "shipping"]) {
                ShippingStatus::find_in(message)
            } else {
                None
            };
            let payment = PaymentStatus::find_in(message);
            let order = if shipping.is_none() {
                OrderStatus::find_in(message)
            } else {
                None
            };
            let filtered = shipping.is_some() || payment.is_some() || order.is_some();
            if filtered || mentions_all(message) || contains_any(message, SEARCH_WORDS) {
                return Ok(OrderQuery::Search {
                    order_status: order,
                    payment_status: payment,
                    shipping_status: shipping,
                });
            }
        }
        let order_ids = resolve_targets(explicit, context, EntityKind::Order);
        if order_ids.is_empty() {
            return Err("请告诉我要查看哪个订单，例如：查看订单ORD-1001，或者：显示所有订单".to_string());
        }
        Ok(OrderQuery::Show { order_ids })
    }

    async fn check(
        &self,
        intent: &OrderQuery,
        tools: &dyn ToolInvoker,
    ) -> Result<Vec<ValidationError>, AgentError> {
        let mut issues = Vec::new();
        if let OrderQuery::Show { order_ids } = intent {
            for id in order_ids {
                if fetch_order(tools, id).await?.is_none() {
                    issues.push(missing_order(id));
                }
            }
        }
        Ok(issues)
    }

    fn tool_call(&self, intent: &OrderQuery) -> ToolCall {
        match intent {
            OrderQuery::Show { order_ids } => {
                ToolCall::new("search_orders", json!({ "order_ids": order_ids }))
            }
            OrderQuery::Search {
                order_status,
                payment_status,
                shipping_status,
            } => ToolCall::new(
                "search_orders",
                json!({
                    "order_status": order_status,
                    "payment_status": payment_status,
                    "shipping_status": shipping_status,
                }),
            ),
        }
    }

    fn on_success(
        &self,
        intent: &OrderQuery,
        data: &Value,
        context: &mut ConversationContext,
    ) -> (String, Option<Value>) {
        let orders: Vec<Order> = records(data, "orders");
        if orders.is_empty() {
            context.clear_selection();
            return ("没有找到符合条件的订单。".to_string(), Some(data.clone()));
        }
        context.select(
            EntityKind::Order,
            orders.iter().map(|o| o.order_id.clone()).collect(),
        );
        let lines: Vec<String> = orders.iter().map(|o| format!("- {}", describe(o))).collect();
        let head = match intent {
            OrderQuery::Search { .. } => format!("找到 {} 个订单：", orders.len()),
            OrderQuery::Show { .. } => "订单信息：".to_string(),
        };
        (format!("{head}\n{}", lines.join("\n")), Some(data.clone()))
    }

    fn blocked_reply(&self, _intent: &OrderQuery) -> String {
        "没有找到要查看的订单。".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Recording;
    use super::super::build_leaf;
    use super::*;
    use crate::agents::TurnInput;

    fn ctx() -> ConversationContext {
        ConversationContext::new("s", "u")
    }

    #[test]
    fn test_parse() {
        let plan = OrderDetailPlan;
        assert_eq!(
            plan.parse("查看订单ORD-1001", &ctx()).unwrap(),
            OrderQuery::Show {
                order_ids: vec!["ORD-1001".into()]
            }
        );
        assert_eq!(
            plan.parse("显示所有待处理订单", &ctx()).unwrap(),
            OrderQuery::Search {
                order_status: Some(OrderStatus::Pending),
                payment_status: None,
                shipping_status: None,
            }
        );
        assert!(plan.parse("查看详情", &ctx()).is_err());
    }

    #[tokio::test]
    async fn test_show_selects_order() {
        let tools = Recording::seeded();
        let leaf = build_leaf(ORDER_DETAIL, tools).unwrap();
        let out = leaf
            .execute(&TurnInput::new("查看订单ORD-1001", "t1"), &ctx())
            .await
            .unwrap();
        assert!(out.result.reply_text.contains("张三"));
        assert_eq!(out.context.selected(EntityKind::Order), ["ORD-1001".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_order_reported() {
        let tools = Recording::seeded();
        let leaf = build_leaf(ORDER_DETAIL, tools).unwrap();
        let out = leaf
            .execute(&TurnInput::new("查看订单ORD-9999", "t1"), &ctx())
            .await
            .unwrap();
        assert_eq!(out.result.errors[0].field, "order_id");
        assert!(out.trace.tool_call.is_none());
    }
}
