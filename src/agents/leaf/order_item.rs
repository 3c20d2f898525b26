//! 订单商品修改：添加、删除、改数量

use async_trait::async_trait;
use serde_json::{json, Value};

use super::order_detail::describe;
use super::{contains_any, fetch_order, fetch_product, records_one, resolve_targets, LeafPlan};
use crate::agents::capability::ORDER_ITEM_MODIFICATION;
use crate::core::AgentError;
use crate::domain::{item_issues, missing_order, ItemOp, Order, ValidationError};
use crate::session::reference::{order_ids, product_ids, quantity};
use crate::session::{ConversationContext, EntityKind};
use crate::tools::{ToolCall, ToolInvoker};

const REMOVE_WORDS: &[&str] = &["删除", "移除", "去掉", "remove", "削除"];
const ADD_WORDS: &[&str] = &["添加", "加入", "增加", "add", "追加"];
const QUANTITY_WORDS: &[&str] = &["数量", "quantity", "数量を"];

#[derive(Debug, Clone, PartialEq)]
pub struct ItemIntent {
    pub order_id: String,
    pub op: ItemOp,
}

/// 订单操作只认一个订单：显式编号或唯一的选中订单
pub(crate) fn single_order(
    message: &str,
    context: &ConversationContext,
    example: &str,
) -> Result<String, String> {
    let ids = resolve_targets(order_ids(message), context, EntityKind::Order);
    match ids.as_slice() {
        [one] => Ok(one.clone()),
        [] => Err(format!("请告诉我是哪个订单，例如：{example}")),
        many => Err(format!(
            "一次只能处理一个订单，请指定订单号：{}",
            many.join("、")
        )),
    }
}

pub struct OrderItemPlan;

#[async_trait]
impl LeafPlan for OrderItemPlan {
    type Intent = ItemIntent;

    fn id(&self) -> &'static str {
        ORDER_ITEM_MODIFICATION
    }

    fn parse(&self, message: &str, context: &ConversationContext) -> Result<ItemIntent, String> {
        let order_id = single_order(message, context, "给订单ORD-1001添加商品4901234567890 2个")?;
        let Some(jancode) = product_ids(message).into_iter().next() else {
            return Err(format!(
                "请告诉我订单{order_id}中要修改的商品，例如：给订单{order_id}添加商品4901234567890 2个"
            ));
        };

        let op = if contains_any(message, REMOVE_WORDS) {
            ItemOp::Remove { jancode }
        } else if contains_any(message, QUANTITY_WORDS) {
            let Some(quantity) = quantity(message) else {
                return Err(format!("请告诉我商品{jancode}的新数量，例如：数量改为3"));
            };
            ItemOp::SetQuantity { jancode, quantity }
        } else if contains_any(message, ADD_WORDS) {
            ItemOp::Add {
                jancode,
                quantity: quantity(message).unwrap_or(1),
            }
        } else {
            return Err(format!(
                "请说明要对商品{jancode}做什么：添加、删除，还是修改数量"
            ));
        };
        Ok(ItemIntent { order_id, op })
    }

    async fn check(
        &self,
        intent: &ItemIntent,
        tools: &dyn ToolInvoker,
    ) -> Result<Vec<ValidationError>, AgentError> {
        let Some(order) = fetch_order(tools, &intent.order_id).await? else {
            return Ok(vec![missing_order(&intent.order_id)]);
        };
        let product = match intent.op {
            ItemOp::Remove { .. } => None,
            _ => fetch_product(tools, intent.op.jancode()).await?,
        };
        Ok(item_issues(&order, &intent.op, product.as_ref()))
    }

    fn tool_call(&self, intent: &ItemIntent) -> ToolCall {
        ToolCall::new(
            "modify_order_item",
            json!({ "order_id": intent.order_id, "item": intent.op }),
        )
    }

    fn on_success(
        &self,
        intent: &ItemIntent,
        data: &Value,
        context: &mut ConversationContext,
    ) -> (String, Option<Value>) {
        context.select(EntityKind::Order, vec![intent.order_id.clone()]);
        let action = match &intent.op {
            ItemOp::Add { jancode, quantity } => format!("添加了商品{jancode}×{quantity}"),
            ItemOp::Remove { jancode } => format!("删除了商品{jancode}"),
            ItemOp::SetQuantity { jancode, quantity } => {
                format!("把商品{jancode}的数量改为{quantity}")
            }
        };
        let mut text = format!("已在订单{}中{action}。", intent.order_id);
        if let Some(order) = records_one::<Order>(data) {
            text.push_str(&format!("\n{}", describe(&order)));
        }
        (text, Some(data.clone()))
    }

    fn blocked_reply(&self, intent: &ItemIntent) -> String {
        format!("订单{}的商品没有修改。", intent.order_id)
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
    fn test_parse_ops() {
        let plan = OrderItemPlan;
        let add = plan
            .parse("给订单ORD-1001添加商品4901234567890 2个", &ctx())
            .unwrap();
        assert_eq!(
            add.op,
            ItemOp::Add {
                jancode: "4901234567890".into(),
                quantity: 2
            }
        );
        let set = plan
            .parse("把订单ORD-1001中商品B的数量改为3", &ctx())
            .unwrap();
        assert_eq!(
            set.op,
            ItemOp::SetQuantity {
                jancode: "B".into(),
                quantity: 3
            }
        );
        let remove = plan.parse("从订单ORD-1001删除商品B", &ctx()).unwrap();
        assert_eq!(remove.op, ItemOp::Remove { jancode: "B".into() });
        assert!(plan.parse("给订单ORD-1001添加", &ctx()).is_err());
    }

    #[test]
    fn test_selected_order_used() {
        let mut context = ctx();
        context.select(EntityKind::Order, vec!["ORD-1003".into()]);
        let intent = OrderItemPlan.parse("删除商品4902222333444", &context).unwrap();
        assert_eq!(intent.order_id, "ORD-1003");

        context.select(EntityKind::Order, vec!["ORD-1001".into(), "ORD-1003".into()]);
        assert!(OrderItemPlan.parse("删除商品B", &context).is_err());
    }

    #[tokio::test]
    async fn test_insufficient_stock_blocks_write() {
        let tools = Recording::seeded();
        let leaf = build_leaf(ORDER_ITEM_MODIFICATION, tools.clone()).unwrap();
        let out = leaf
            .execute(
                &TurnInput::new("给订单ORD-1001添加商品4902222333444 99个", "t1"),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(out.result.errors.len(), 1);
        assert!(tools.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_shipped_order_cannot_change() {
        let tools = Recording::seeded();
        let leaf = build_leaf(ORDER_ITEM_MODIFICATION, tools.clone()).unwrap();
        let out = leaf
            .execute(&TurnInput::new("从订单ORD-1002删除商品4901234567890", "t1"), &ctx())
            .await
            .unwrap();
        assert_eq!(out.result.errors[0].field, "order_status");
        assert!(tools.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_quantity() {
        let tools = Recording::seeded();
        let leaf = build_leaf(ORDER_ITEM_MODIFICATION, tools.clone()).unwrap();
        let out = leaf
            .execute(&TurnInput::new("把订单ORD-1001中商品B的数量改为3", "t1"), &ctx())
            .await
            .unwrap();
        assert!(out.result.errors.is_empty(), "{:?}", out.result.errors);
        let order = tools.backoffice.order("ORD-1001").await.unwrap();
        assert_eq!(order.item("B").unwrap().quantity, 3);
        assert_eq!(tools.backoffice.product("B").await.unwrap().stock, 19);
    }
}
