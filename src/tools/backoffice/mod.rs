//! 内存版 EC 后台
//!
//! 商品 / 订单两张表 + 写操作去重缓存，放在同一把 RwLock 下：一次写操作要么整体生效，要么什么都不改。
//! 同一个去重键重复到达时直接回放第一次的结果，不会再写一次。

mod order_tools;
mod product_tools;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::{Order, OrderStatus, PaymentStatus, Product, ShippingStatus};
use crate::tools::executor::IDEMPOTENCY_ARG;
use crate::tools::ToolRegistry;

pub use order_tools::{
    CancelOrderTool, GetOrderTool, ModifyOrderItemTool, SearchOrdersTool, UpdateStatusTool,
};
pub use product_tools::{
    GetProductTool, PublishProductsTool, SearchProductsTool, UnpublishProductsTool,
    UpdateProductTool,
};

#[derive(Default)]
struct State {
    products: BTreeMap<String, Product>,
    orders: BTreeMap<String, Order>,
    applied: HashMap<String, Value>,
    writes: u64,
}

/// 后台数据
#[derive(Default)]
pub struct Backoffice {
    state: RwLock<State>,
}

impl Backoffice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带演示数据的后台（REPL 使用）
    pub fn seeded() -> Self {
        let rice = Product::new("A", "有机米粉").with_price(480.0);
        let wipes = Product::new("B", "婴儿湿巾")
            .with_category("母婴")
            .with_stock(20)
            .with_price(38.0)
            .published();
        let matcha = Product::new("4901234567890", "抹茶饼干")
            .with_category("食品")
            .with_stock(50)
            .with_price(580.0);
        let bottle = Product::new("4902222333444", "保温杯")
            .with_stock(12)
            .with_price(1200.0);

        let orders = vec![
            Order::new("ORD-1001", "张三").with_item(&wipes, 2),
            Order::new("ORD-1002", "李四")
                .with_item(&matcha, 1)
                .with_status(OrderStatus::Shipped)
                .with_payment(PaymentStatus::Paid),
            Order::new("ORD-1003", "王五")
                .with_item(&bottle, 1)
                .with_status(OrderStatus::Confirmed)
                .with_payment(PaymentStatus::Paid),
        ];

        let mut state = State::default();
        for p in [rice, wipes, matcha, bottle] {
            state.products.insert(p.jancode.clone(), p);
        }
        for mut o in orders {
            if o.order_status == OrderStatus::Shipped {
                o.shipping_status = ShippingStatus::Shipped;
            }
            state.orders.insert(o.order_id.clone(), o);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn insert_product(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.jancode.clone(), product);
    }

    pub async fn product(&self, jancode: &str) -> Option<Product> {
        self.state.read().await.products.get(jancode).cloned()
    }

    pub async fn order(&self, order_id: &str) -> Option<Order> {
        self.state.read().await.orders.get(order_id).cloned()
    }

    pub async fn products(&self) -> Vec<Product> {
        self.state.read().await.products.values().cloned().collect()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.read().await.orders.values().cloned().collect()
    }

    /// 实际生效的写操作次数（回放不计）
    pub async fn write_count(&self) -> u64 {
        self.state.read().await.writes
    }

    /// 执行一次写操作：先查去重缓存，再在写锁内校验并提交
    ///
    /// `f` 返回 Err 时必须没有改动任何数据。
    async fn mutate<F>(&self, key: Option<String>, f: F) -> Result<Value, String>
    where
        F: FnOnce(&mut State) -> Result<Value, String>,
    {
        let mut state = self.state.write().await;
        if let Some(k) = &key {
            if let Some(prev) = state.applied.get(k) {
                tracing::debug!(key = %k, "idempotent replay");
                return Ok(prev.clone());
            }
        }
        let value = f(&mut *state)?;
        state.writes += 1;
        if let Some(k) = key {
            state.applied.insert(k, value.clone());
        }
        Ok(value)
    }
}

/// 把所有后台工具注册进 registry
pub fn register_backoffice_tools(registry: &mut ToolRegistry, backoffice: Arc<Backoffice>) {
    registry.register(GetProductTool::new(backoffice.clone()));
    registry.register(SearchProductsTool::new(backoffice.clone()));
    registry.register(UpdateProductTool::new(backoffice.clone()));
    registry.register(PublishProductsTool::new(backoffice.clone()));
    registry.register(UnpublishProductsTool::new(backoffice.clone()));
    registry.register(GetOrderTool::new(backoffice.clone()));
    registry.register(SearchOrdersTool::new(backoffice.clone()));
    registry.register(ModifyOrderItemTool::new(backoffice.clone()));
    for kind in [
        crate::domain::StatusKind::Order,
        crate::domain::StatusKind::Payment,
        crate::domain::StatusKind::Shipping,
    ] {
        registry.register(UpdateStatusTool::new(backoffice.clone(), kind));
    }
    registry.register(CancelOrderTool::new(backoffice));
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<(T, Option<String>), String> {
    let key = args
        .get(IDEMPOTENCY_ARG)
        .and_then(Value::as_str)
        .map(String::from);
    let parsed = serde_json::from_value(args).map_err(|e| format!("参数错误: {e}"))?;
    Ok((parsed, key))
}

fn to_json<T: serde::Serialize>(v: &T) -> Result<Value, String> {
    serde_json::to_value(v).map_err(|e| e.to_string())
}
