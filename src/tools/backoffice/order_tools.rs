//! 订单相关后台工具

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, to_json, Backoffice};
use crate::domain::{
    cancel_issues, item_issues, status_change_issues, ItemOp, OrderStatus, PaymentStatus,
    ShippingStatus, StatusKind, ValidationError,
};
use crate::tools::Tool;

#[derive(Deserialize)]
struct OrderIdArgs {
    order_id: String,
}

fn rejected(issues: &[ValidationError]) -> String {
    issues
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("；")
}

/// 查询单个订单
pub struct GetOrderTool {
    backoffice: Arc<Backoffice>,
}

impl GetOrderTool {
    pub fn new(backoffice: Arc<Backoffice>) -> Self {
        Self { backoffice }
    }
}

#[async_trait]
impl Tool for GetOrderTool {
    fn name(&self) -> &str {
        "get_order"
    }

    fn description(&self) -> &str {
        "按订单号查询订单详情"
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, _): (OrderIdArgs, _) = parse_args(args)?;
        match self.backoffice.order(&a.order_id).await {
            Some(o) => to_json(&o),
            None => Err(format!("找不到订单 {}", a.order_id)),
        }
    }
}

#[derive(Deserialize, Default)]
struct SearchOrdersArgs {
    /// 只取这些订单号（按给定顺序）
    #[serde(default)]
    order_ids: Option<Vec<String>>,
    #[serde(default)]
    order_status: Option<OrderStatus>,
    #[serde(default)]
    payment_status: Option<PaymentStatus>,
    #[serde(default)]
    shipping_status: Option<ShippingStatus>,
    #[serde(default)]
    customer: Option<String>,
}

/// 按状态 / 客户过滤订单
pub struct SearchOrdersTool {
    backoffice: Arc<Backoffice>,
}

impl SearchOrdersTool {
    pub fn new(backoffice: Arc<Backoffice>) -> Self {
        Self { backoffice }
    }
}

#[async_trait]
impl Tool for SearchOrdersTool {
    fn name(&self) -> &str {
        "search_orders"
    }

    fn description(&self) -> &str {
        "按订单号、订单 / 支付 / 配送状态或客户名搜索订单"
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, _): (SearchOrdersArgs, _) = parse_args(args)?;
        let pool = match &a.order_ids {
            Some(ids) => {
                let mut found = Vec::new();
                for id in ids {
                    if let Some(o) = self.backoffice.order(id).await {
                        found.push(o);
                    }
                }
                found
            }
            None => self.backoffice.orders().await,
        };
        let orders: Vec<_> = pool
            .into_iter()
            .filter(|o| a.order_status.map(|s| o.order_status == s).unwrap_or(true))
            .filter(|o| a.payment_status.map(|s| o.payment_status == s).unwrap_or(true))
            .filter(|o| {
                a.shipping_status
                    .map(|s| o.shipping_status == s)
                    .unwrap_or(true)
            })
            .filter(|o| {
                a.customer
                    .as_deref()
                    .map(|c| o.customer_name.contains(c))
                    .unwrap_or(true)
            })
            .collect();
        Ok(json!({ "count": orders.len(), "orders": orders }))
    }
}

#[derive(Deserialize)]
struct ModifyItemArgs {
    order_id: String,
    item: ItemOp,
}

/// 添加 / 删除订单商品或修改数量，同步扣减或返还库存
pub struct ModifyOrderItemTool {
    backoffice: Arc<Backoffice>,
}

impl ModifyOrderItemTool {
    pub fn new(backoffice: Arc<Backoffice>) -> Self {
        Self { backoffice }
    }
}

#[async_trait]
impl Tool for ModifyOrderItemTool {
    fn name(&self) -> &str {
        "modify_order_item"
    }

    fn description(&self) -> &str {
        "修改订单中的商品（添加 / 删除 / 改数量）"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, key): (ModifyItemArgs, _) = parse_args(args)?;
        self.backoffice
            .mutate(key, |state| {
                let order = state
                    .orders
                    .get(&a.order_id)
                    .ok_or_else(|| format!("找不到订单 {}", a.order_id))?;
                let jancode = a.item.jancode().to_string();
                let product = state.products.get(&jancode).cloned();
                let issues = item_issues(order, &a.item, product.as_ref());
                if !issues.is_empty() {
                    return Err(rejected(&issues));
                }
                let mut updated = order.clone();
                let delta = updated.apply_item(&a.item, product.as_ref())?;
                if let Some(p) = state.products.get_mut(&jancode) {
                    p.stock += delta;
                }
                let out = to_json(&updated)?;
                state.orders.insert(a.order_id.clone(), updated);
                Ok(out)
            })
            .await
    }
}

#[derive(Deserialize)]
struct StatusArgs {
    order_id: String,
    value: String,
}

/// 修改订单的一类状态（订单 / 支付 / 配送各注册一个实例）
pub struct UpdateStatusTool {
    backoffice: Arc<Backoffice>,
    kind: StatusKind,
}

impl UpdateStatusTool {
    pub fn new(backoffice: Arc<Backoffice>, kind: StatusKind) -> Self {
        Self { backoffice, kind }
    }

    pub fn tool_name(kind: StatusKind) -> &'static str {
        match kind {
            StatusKind::Order => "update_order_status",
            StatusKind::Payment => "update_payment_status",
            StatusKind::Shipping => "update_shipping_status",
        }
    }
}

#[async_trait]
impl Tool for UpdateStatusTool {
    fn name(&self) -> &str {
        Self::tool_name(self.kind)
    }

    fn description(&self) -> &str {
        match self.kind {
            StatusKind::Order => "修改订单状态",
            StatusKind::Payment => "修改支付状态",
            StatusKind::Shipping => "修改配送状态",
        }
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, key): (StatusArgs, _) = parse_args(args)?;
        let kind = self.kind;
        self.backoffice
            .mutate(key, |state| {
                let order = state
                    .orders
                    .get(&a.order_id)
                    .ok_or_else(|| format!("找不到订单 {}", a.order_id))?;
                let issues = status_change_issues(order, kind, &a.value);
                if !issues.is_empty() {
                    return Err(rejected(&issues));
                }
                let mut updated = order.clone();
                updated.apply_status(kind, &a.value)?;
                let out = to_json(&updated)?;
                state.orders.insert(a.order_id.clone(), updated);
                Ok(out)
            })
            .await
    }
}

/// 取消订单
pub struct CancelOrderTool {
    backoffice: Arc<Backoffice>,
}

impl CancelOrderTool {
    pub fn new(backoffice: Arc<Backoffice>) -> Self {
        Self { backoffice }
    }
}

#[async_trait]
impl Tool for CancelOrderTool {
    fn name(&self) -> &str {
        "cancel_order"
    }

    fn description(&self) -> &str {
        "取消未发货的订单"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, key): (OrderIdArgs, _) = parse_args(args)?;
        self.backoffice
            .mutate(key, |state| {
                let order = state
                    .orders
                    .get(&a.order_id)
                    .ok_or_else(|| format!("找不到订单 {}", a.order_id))?;
                let issues = cancel_issues(order);
                if !issues.is_empty() {
                    return Err(rejected(&issues));
                }
                let mut updated = order.clone();
                updated.apply_cancel();
                let out = to_json(&updated)?;
                state.orders.insert(a.order_id.clone(), updated);
                Ok(out)
            })
            .await
    }
}
