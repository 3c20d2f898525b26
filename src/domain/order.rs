//! 订单记录、三类状态与订单修改 / 取消规则

use serde::{Deserialize, Serialize};

use super::product::Product;
use super::{missing_product, ValidationError};

/// 订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// 支付状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
    PartialRefund,
}

/// 配送状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    NotShipped,
    Preparing,
    Shipped,
    InTransit,
    Delivered,
}

/// (值, 显示名, 别名)
type StatusRow<T> = (T, &'static str, &'static str, &'static [&'static str]);

const ORDER_ROWS: &[StatusRow<OrderStatus>] = &[
    (OrderStatus::Pending, "pending", "待处理", &["待处理", "待确认", "未处理"]),
    (OrderStatus::Confirmed, "confirmed", "已确认", &["已确认"]),
    (OrderStatus::Processing, "processing", "处理中", &["处理中"]),
    (OrderStatus::Shipped, "shipped", "已发货", &["已发货"]),
    (OrderStatus::Delivered, "delivered", "已送达", &["已送达", "已签收"]),
    (OrderStatus::Cancelled, "cancelled", "已取消", &["已取消", "canceled"]),
];

const PAYMENT_ROWS: &[StatusRow<PaymentStatus>] = &[
    (PaymentStatus::Unpaid, "unpaid", "未付款", &["未付款", "未支付", "待付款"]),
    (PaymentStatus::Paid, "paid", "已付款", &["已付款", "已支付"]),
    (PaymentStatus::Refunded, "refunded", "已退款", &["已退款", "全额退款"]),
    (PaymentStatus::PartialRefund, "partial_refund", "部分退款", &["部分退款"]),
];

const SHIPPING_ROWS: &[StatusRow<ShippingStatus>] = &[
    (ShippingStatus::NotShipped, "not_shipped", "未发货", &["未发货"]),
    (ShippingStatus::Preparing, "preparing", "备货中", &["备货中", "准备中"]),
    (ShippingStatus::Shipped, "shipped", "已发货", &["已发货"]),
    (ShippingStatus::InTransit, "in_transit", "运输中", &["运输中", "配送中"]),
    (ShippingStatus::Delivered, "delivered", "已送达", &["已送达", "已签收"]),
];

fn row_of<T: Copy + PartialEq>(rows: &'static [StatusRow<T>], v: T) -> &'static StatusRow<T> {
    // 每个枚举值在表里恰好出现一次
    rows.iter().find(|r| r.0 == v).unwrap_or(&rows[0])
}

fn parse_exact<T: Copy>(rows: &[StatusRow<T>], raw: &str) -> Option<T> {
    let raw = raw.trim().to_lowercase();
    rows.iter()
        .find(|(_, value, label, aliases)| {
            *value == raw || *label == raw || aliases.iter().any(|a| *a == raw)
        })
        .map(|r| r.0)
}

/// 在一句话里找状态词，取最长匹配
fn find_in_text<T: Copy>(rows: &[StatusRow<T>], text: &str) -> Option<T> {
    let lower = text.to_lowercase();
    let mut best: Option<(usize, T)> = None;
    for (v, value, label, aliases) in rows {
        for term in std::iter::once(value).chain(std::iter::once(label)).chain(aliases.iter()) {
            if lower.contains(*term) && best.map(|(len, _)| term.len() > len).unwrap_or(true) {
                best = Some((term.len(), *v));
            }
        }
    }
    best.map(|(_, v)| v)
}

macro_rules! status_impl {
    ($ty:ty, $rows:expr) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                row_of($rows, *self).1
            }

            pub fn label(&self) -> &'static str {
                row_of($rows, *self).2
            }

            /// 接受英文值、中文显示名或别名
            pub fn parse(raw: &str) -> Option<Self> {
                parse_exact($rows, raw)
            }

            pub fn find_in(text: &str) -> Option<Self> {
                find_in_text($rows, text)
            }

            pub fn all() -> Vec<Self> {
                $rows.iter().map(|r| r.0).collect()
            }
        }
    };
}

status_impl!(OrderStatus, ORDER_ROWS);
status_impl!(PaymentStatus, PAYMENT_ROWS);
status_impl!(ShippingStatus, SHIPPING_ROWS);

/// 三类状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Order,
    Payment,
    Shipping,
}

impl StatusKind {
    /// 对应的订单字段名
    pub fn field(&self) -> &'static str {
        match self {
            StatusKind::Order => "order_status",
            StatusKind::Payment => "payment_status",
            StatusKind::Shipping => "shipping_status",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusKind::Order => "订单状态",
            StatusKind::Payment => "支付状态",
            StatusKind::Shipping => "配送状态",
        }
    }

    /// 该类状态的合法值（英文）
    pub fn valid_values(&self) -> Vec<&'static str> {
        match self {
            StatusKind::Order => OrderStatus::all().iter().map(|s| s.as_str()).collect(),
            StatusKind::Payment => PaymentStatus::all().iter().map(|s| s.as_str()).collect(),
            StatusKind::Shipping => ShippingStatus::all().iter().map(|s| s.as_str()).collect(),
        }
    }

    /// 规范化一个状态值；非法返回 None
    pub fn normalize(&self, raw: &str) -> Option<&'static str> {
        match self {
            StatusKind::Order => OrderStatus::parse(raw).map(|s| s.as_str()),
            StatusKind::Payment => PaymentStatus::parse(raw).map(|s| s.as_str()),
            StatusKind::Shipping => ShippingStatus::parse(raw).map(|s| s.as_str()),
        }
    }

    /// 在句子里找该类状态词
    pub fn find_in(&self, text: &str) -> Option<&'static str> {
        match self {
            StatusKind::Order => OrderStatus::find_in(text).map(|s| s.as_str()),
            StatusKind::Payment => PaymentStatus::find_in(text).map(|s| s.as_str()),
            StatusKind::Shipping => ShippingStatus::find_in(text).map(|s| s.as_str()),
        }
    }

    /// 合法值的中文显示名
    pub fn label_of(&self, value: &str) -> Option<&'static str> {
        match self {
            StatusKind::Order => OrderStatus::parse(value).map(|s| s.label()),
            StatusKind::Payment => PaymentStatus::parse(value).map(|s| s.label()),
            StatusKind::Shipping => ShippingStatus::parse(value).map(|s| s.label()),
        }
    }

    /// 从一句话判断要改哪类状态：提到支付 / 配送字样时按对应类别，其余按订单状态
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        const PAYMENT: &[&str] = &["付款", "支付", "退款", "payment", "paid", "refund", "支払"];
        const SHIPPING: &[&str] = &["配送", "物流", "运输", "shipping", "transit", "备货", "配達"];
        if PAYMENT.iter().any(|w| lower.contains(w)) {
            StatusKind::Payment
        } else if SHIPPING.iter().any(|w| lower.contains(w)) {
            StatusKind::Shipping
        } else {
            StatusKind::Order
        }
    }
}

/// 订单行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub jancode: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
}

/// 订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_name: String,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipping_status: ShippingStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
}

impl Order {
    pub fn new(order_id: impl Into<String>, customer_name: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            customer_name: customer_name.into(),
            order_status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            shipping_status: ShippingStatus::NotShipped,
            items: Vec::new(),
            total_amount: 0.0,
        }
    }

    pub fn with_item(mut self, product: &Product, quantity: i64) -> Self {
        self.items.push(OrderItem {
            jancode: product.jancode.clone(),
            name: product.name.clone(),
            quantity,
            unit_price: product.price,
        });
        self.recalc_total();
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.order_status = status;
        self
    }

    pub fn with_payment(mut self, status: PaymentStatus) -> Self {
        self.payment_status = status;
        self
    }

    pub fn recalc_total(&mut self) {
        self.total_amount = self
            .items
            .iter()
            .map(|i| i.unit_price * i.quantity as f64)
            .sum();
    }

    pub fn status_of(&self, kind: StatusKind) -> &'static str {
        match kind {
            StatusKind::Order => self.order_status.as_str(),
            StatusKind::Payment => self.payment_status.as_str(),
            StatusKind::Shipping => self.shipping_status.as_str(),
        }
    }

    pub fn item(&self, jancode: &str) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.jancode == jancode)
    }

    /// 写入状态（值须已规范化）；订单发货 / 送达时同步配送状态
    pub fn apply_status(&mut self, kind: StatusKind, value: &str) -> Result<(), String> {
        match kind {
            StatusKind::Order => {
                let s = OrderStatus::parse(value).ok_or_else(|| format!("无效的订单状态：{value}"))?;
                self.order_status = s;
                match s {
                    OrderStatus::Shipped => self.shipping_status = ShippingStatus::Shipped,
                    OrderStatus::Delivered => self.shipping_status = ShippingStatus::Delivered,
                    _ => {}
                }
            }
            StatusKind::Payment => {
                self.payment_status =
                    PaymentStatus::parse(value).ok_or_else(|| format!("无效的支付状态：{value}"))?;
            }
            StatusKind::Shipping => {
                self.shipping_status =
                    ShippingStatus::parse(value).ok_or_else(|| format!("无效的配送状态：{value}"))?;
            }
        }
        Ok(())
    }

    /// 取消订单；已付款的转为已退款
    pub fn apply_cancel(&mut self) {
        self.order_status = OrderStatus::Cancelled;
        if self.payment_status == PaymentStatus::Paid {
            self.payment_status = PaymentStatus::Refunded;
        }
    }

    /// 应用订单行修改，返回商品库存变化量（负数表示扣减）
    pub fn apply_item(&mut self, op: &ItemOp, product: Option<&Product>) -> Result<i64, String> {
        let delta = match op {
            ItemOp::Add { jancode, quantity } => {
                let product = product.ok_or_else(|| format!("找不到商品 {jancode}"))?;
                match self.items.iter_mut().find(|i| &i.jancode == jancode) {
                    Some(item) => item.quantity += quantity,
                    None => self.items.push(OrderItem {
                        jancode: jancode.clone(),
                        name: product.name.clone(),
                        quantity: *quantity,
                        unit_price: product.price,
                    }),
                }
                -quantity
            }
            ItemOp::Remove { jancode } => {
                let pos = self
                    .items
                    .iter()
                    .position(|i| &i.jancode == jancode)
                    .ok_or_else(|| format!("订单中没有商品 {jancode}"))?;
                self.items.remove(pos).quantity
            }
            ItemOp::SetQuantity { jancode, quantity } => {
                let item = self
                    .items
                    .iter_mut()
                    .find(|i| &i.jancode == jancode)
                    .ok_or_else(|| format!("订单中没有商品 {jancode}"))?;
                let delta = item.quantity - quantity;
                item.quantity = *quantity;
                delta
            }
        };
        self.recalc_total();
        Ok(delta)
    }
}

/// 订单行修改操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ItemOp {
    Add { jancode: String, quantity: i64 },
    Remove { jancode: String },
    SetQuantity { jancode: String, quantity: i64 },
}

impl ItemOp {
    pub fn jancode(&self) -> &str {
        match self {
            ItemOp::Add { jancode, .. }
            | ItemOp::Remove { jancode }
            | ItemOp::SetQuantity { jancode, .. } => jancode,
        }
    }
}

/// 取消前置条件：未取消、未发货、未送达
pub fn cancel_issues(order: &Order) -> Vec<ValidationError> {
    let id = &order.order_id;
    match order.order_status {
        OrderStatus::Cancelled => vec![ValidationError::new(
            "order_status",
            format!("订单 {id} 已经取消"),
            "无需重复取消；可以说：显示订单详情 查看当前状态",
        )],
        OrderStatus::Shipped | OrderStatus::Delivered => vec![ValidationError::new(
            "order_status",
            format!("订单 {id} 当前为{}，不能取消", order.order_status.label()),
            "已发货或已送达的订单请走退货流程，或联系物流拦截",
        )],
        _ => Vec::new(),
    }
}

/// 状态修改前置条件
pub fn status_change_issues(order: &Order, kind: StatusKind, value: &str) -> Vec<ValidationError> {
    let id = &order.order_id;
    if order.order_status == OrderStatus::Cancelled {
        return vec![ValidationError::new(
            kind.field(),
            format!("订单 {id} 已取消，不能再修改状态"),
            "已取消的订单状态不可变更",
        )];
    }
    let Some(normalized) = kind.normalize(value) else {
        return vec![ValidationError::new(
            kind.field(),
            format!("无效的{}：{value}", kind.label()),
            format!("可选值：{}", kind.valid_values().join(", ")),
        )];
    };
    if kind == StatusKind::Order && normalized == OrderStatus::Cancelled.as_str() {
        return vec![ValidationError::new(
            kind.field(),
            "取消订单需要单独的取消操作".to_string(),
            format!("请说：取消订单{id}"),
        )];
    }
    if order.status_of(kind) == normalized {
        return vec![ValidationError::new(
            kind.field(),
            format!("订单 {id} 的{}已经是 {normalized}", kind.label()),
            format!("无需修改；其他可选值：{}", kind.valid_values().join(", ")),
        )];
    }
    Vec::new()
}

/// 订单行修改前置条件：订单可修改、商品存在、库存充足
pub fn item_issues(order: &Order, op: &ItemOp, product: Option<&Product>) -> Vec<ValidationError> {
    let id = &order.order_id;
    if !matches!(
        order.order_status,
        OrderStatus::Pending | OrderStatus::Confirmed
    ) {
        return vec![ValidationError::new(
            "order_status",
            format!(
                "订单 {id} 当前为{}，不能修改商品",
                order.order_status.label()
            ),
            "只有待处理或已确认的订单可以修改商品",
        )];
    }
    let mut issues = Vec::new();
    match op {
        ItemOp::Add { jancode, quantity } => {
            if *quantity <= 0 {
                issues.push(quantity_issue());
            }
            match product {
                None => issues.push(missing_product(jancode)),
                Some(p) if p.stock < *quantity => issues.push(stock_issue(p, *quantity)),
                Some(_) => {}
            }
        }
        ItemOp::Remove { jancode } => {
            if order.item(jancode).is_none() {
                issues.push(missing_item(id, jancode));
            }
        }
        ItemOp::SetQuantity { jancode, quantity } => {
            if *quantity <= 0 {
                issues.push(ValidationError::new(
                    "quantity",
                    "数量必须大于 0".to_string(),
                    format!("如需删除请说：从订单{id}删除商品{jancode}"),
                ));
            }
            match order.item(jancode) {
                None => issues.push(missing_item(id, jancode)),
                Some(item) => {
                    let extra = quantity - item.quantity;
                    if extra > 0 {
                        match product {
                            None => issues.push(missing_product(jancode)),
                            Some(p) if p.stock < extra => issues.push(stock_issue(p, extra)),
                            Some(_) => {}
                        }
                    }
                }
            }
        }
    }
    issues
}

fn quantity_issue() -> ValidationError {
    ValidationError::new(
        "quantity",
        "数量必须大于 0".to_string(),
        "请给出数量，例如：添加 2 个",
    )
}

fn stock_issue(product: &Product, needed: i64) -> ValidationError {
    ValidationError::new(
        "stock",
        format!(
            "商品 {} 库存不足：需要 {needed}，现有 {}",
            product.jancode, product.stock
        ),
        format!(
            "请减少数量，或先补充库存：把商品{}的库存设置为 {needed}",
            product.jancode
        ),
    )
}

fn missing_item(order_id: &str, jancode: &str) -> ValidationError {
    ValidationError::new(
        "jancode",
        format!("订单 {order_id} 中没有商品 {jancode}"),
        format!("可以先说：查看订单{order_id} 确认商品编号"),
    )
}
