//! 商品记录与上架 / 字段修改规则

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ValidationError;

/// 上架状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Published,
    Unpublished,
}

impl ProductStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ProductStatus::Published => "已上架",
            ProductStatus::Unpublished => "未上架",
        }
    }
}

/// 商品（以 JAN 码为主键）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub jancode: String,
    pub name: String,
    pub category: Option<String>,
    pub status: ProductStatus,
    pub stock: i64,
    pub price: f64,
}

impl Product {
    /// 新建一个未上架、无分类、零库存、零价格的商品
    pub fn new(jancode: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            jancode: jancode.into(),
            name: name.into(),
            category: None,
            status: ProductStatus::Unpublished,
            stock: 0,
            price: 0.0,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock = stock;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn published(mut self) -> Self {
        self.status = ProductStatus::Published;
        self
    }

    fn has_category(&self) -> bool {
        self.category
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    /// 按字段写入已解析的值
    pub fn apply(&mut self, field: ProductField, value: &Value) -> Result<(), String> {
        match field {
            ProductField::Category => {
                let v = value.as_str().ok_or("分类必须是文本")?;
                self.category = Some(v.to_string());
            }
            ProductField::Name => {
                let v = value.as_str().ok_or("名称必须是文本")?;
                self.name = v.to_string();
            }
            ProductField::Stock => {
                self.stock = value.as_i64().ok_or("库存必须是整数")?;
            }
            ProductField::Price => {
                self.price = value.as_f64().ok_or("价格必须是数字")?;
            }
        }
        Ok(())
    }
}

/// 可修改的商品字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductField {
    Category,
    Stock,
    Price,
    Name,
}

impl ProductField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductField::Category => "category",
            ProductField::Stock => "stock",
            ProductField::Price => "price",
            ProductField::Name => "name",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProductField::Category => "分类",
            ProductField::Stock => "库存",
            ProductField::Price => "价格",
            ProductField::Name => "名称",
        }
    }
}

/// 把用户给出的原始值解析成字段值
pub fn parse_field_value(field: ProductField, raw: &str) -> Result<Value, ValidationError> {
    let raw = raw.trim();
    match field {
        ProductField::Category | ProductField::Name => {
            if raw.is_empty() {
                return Err(ValidationError::new(
                    field.as_str(),
                    format!("{}不能为空", field.label()),
                    format!("请给出新的{}，例如：设置{}为'食品'", field.label(), field.label()),
                ));
            }
            Ok(Value::String(raw.to_string()))
        }
        ProductField::Stock => match raw.parse::<i64>() {
            Ok(n) if n >= 0 => Ok(Value::from(n)),
            _ => Err(ValidationError::new(
                "stock",
                format!("库存必须是不小于 0 的整数，收到：{raw}"),
                "请给出整数库存，例如：把库存设置为 10",
            )),
        },
        ProductField::Price => match raw.parse::<f64>() {
            Ok(p) if p > 0.0 && p.is_finite() => Ok(Value::from(p)),
            _ => Err(ValidationError::new(
                "price",
                format!("价格必须大于 0，收到：{raw}"),
                "请给出正数价格，例如：把价格设置为 1200",
            )),
        },
    }
}

/// 上架前置条件；已上架时只报状态问题
///
/// 错误顺序固定为：分类、库存、价格。
pub fn publish_issues(product: &Product) -> Vec<ValidationError> {
    let id = &product.jancode;
    if product.status == ProductStatus::Published {
        return vec![ValidationError::new(
            "status",
            format!("商品 {id} 已经上架"),
            format!("无需重复上架；如需下架请说：下架商品{id}"),
        )];
    }
    let mut issues = Vec::new();
    if !product.has_category() {
        issues.push(ValidationError::new(
            "category",
            format!("商品 {id} 未设置分类"),
            format!("请先设置分类，例如：为商品{id}设置分类为'食品'"),
        ));
    }
    if product.stock <= 0 {
        issues.push(ValidationError::new(
            "stock",
            format!("商品 {id} 库存为 0"),
            format!("请先补充库存，例如：把商品{id}的库存设置为 10"),
        ));
    }
    if product.price <= 0.0 {
        issues.push(ValidationError::new(
            "price",
            format!("商品 {id} 未设置价格"),
            format!("请先设置价格，例如：把商品{id}的价格设置为 1200"),
        ));
    }
    issues
}

/// 下架前置条件
pub fn unpublish_issues(product: &Product) -> Vec<ValidationError> {
    let id = &product.jancode;
    if product.status == ProductStatus::Unpublished {
        return vec![ValidationError::new(
            "status",
            format!("商品 {id} 当前未上架"),
            format!("无需下架；如需上架请说：上架商品{id}"),
        )];
    }
    Vec::new()
}
