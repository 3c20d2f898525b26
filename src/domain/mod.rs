//! 业务领域：商品 / 订单记录与前置条件规则
//!
//! 规则都是纯函数：同一份记录反复校验得到完全相同的错误列表，叶子智能体和后台写工具共用。

pub mod order;
pub mod product;

use serde::{Deserialize, Serialize};

pub use order::{
    cancel_issues, item_issues, status_change_issues, ItemOp, Order, OrderItem, OrderStatus,
    PaymentStatus, ShippingStatus, StatusKind,
};
pub use product::{
    parse_field_value, publish_issues, unpublish_issues, Product, ProductField, ProductStatus,
};

/// 一条可修复的校验错误：哪个字段、出了什么问题、下一句该怎么说
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    /// 可直接照着说的修复指令
    pub repair_hint: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        repair_hint: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            repair_hint: repair_hint.into(),
        }
    }
}

/// 商品不存在
pub fn missing_product(jancode: &str) -> ValidationError {
    ValidationError::new(
        "jancode",
        format!("找不到商品 {jancode}"),
        "请确认商品编号，或先说：显示所有商品",
    )
}

/// 订单不存在
pub fn missing_order(order_id: &str) -> ValidationError {
    ValidationError::new(
        "order_id",
        format!("找不到订单 {order_id}"),
        "请确认订单号，或先说：显示所有订单",
    )
}
