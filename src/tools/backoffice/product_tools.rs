//! 商品相关后台工具

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, to_json, Backoffice};
use crate::domain::{
    publish_issues, unpublish_issues, ProductField, ProductStatus, ValidationError,
};
use crate::tools::Tool;

#[derive(Deserialize)]
struct JancodeArgs {
    jancode: String,
}

/// 查询单个商品
pub struct GetProductTool {
    backoffice: Arc<Backoffice>,
}

impl GetProductTool {
    pub fn new(backoffice: Arc<Backoffice>) -> Self {
        Self { backoffice }
    }
}

#[async_trait]
impl Tool for GetProductTool {
    fn name(&self) -> &str {
        "get_product"
    }

    fn description(&self) -> &str {
        "按 JAN 码查询商品详情"
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, _): (JancodeArgs, _) = parse_args(args)?;
        match self.backoffice.product(&a.jancode).await {
            Some(p) => to_json(&p),
            None => Err(format!("找不到商品 {}", a.jancode)),
        }
    }
}

#[derive(Deserialize, Default)]
struct SearchProductsArgs {
    /// 只取这些编号（按给定顺序）
    #[serde(default)]
    jancodes: Option<Vec<String>>,
    #[serde(default)]
    status: Option<ProductStatus>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    stock_min: Option<i64>,
    #[serde(default)]
    stock_max: Option<i64>,
    /// 最多返回条数；count 仍是命中总数
    #[serde(default)]
    limit: Option<usize>,
}

/// 按状态 / 分类 / 名称关键词 / 库存区间过滤商品
pub struct SearchProductsTool {
    backoffice: Arc<Backoffice>,
}

impl SearchProductsTool {
    pub fn new(backoffice: Arc<Backoffice>) -> Self {
        Self { backoffice }
    }
}

#[async_trait]
impl Tool for SearchProductsTool {
    fn name(&self) -> &str {
        "search_products"
    }

    fn description(&self) -> &str {
        "按编号、上架状态、分类、名称关键词、库存区间搜索商品"
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, _): (SearchProductsArgs, _) = parse_args(args)?;
        let pool = match &a.jancodes {
            Some(ids) => {
                let mut found = Vec::new();
                for id in ids {
                    if let Some(p) = self.backoffice.product(id).await {
                        found.push(p);
                    }
                }
                found
            }
            None => self.backoffice.products().await,
        };
        let mut products: Vec<_> = pool
            .into_iter()
            .filter(|p| a.status.map(|s| p.status == s).unwrap_or(true))
            .filter(|p| {
                a.category
                    .as_deref()
                    .map(|c| p.category.as_deref() == Some(c))
                    .unwrap_or(true)
            })
            .filter(|p| {
                a.keyword
                    .as_deref()
                    .map(|k| p.name.contains(k) || p.jancode.contains(k))
                    .unwrap_or(true)
            })
            .filter(|p| a.stock_min.map(|m| p.stock >= m).unwrap_or(true))
            .filter(|p| a.stock_max.map(|m| p.stock <= m).unwrap_or(true))
            .collect();
        let count = products.len();
        if let Some(limit) = a.limit {
            products.truncate(limit);
        }
        Ok(json!({ "count": count, "products": products }))
    }
}

#[derive(Deserialize)]
struct UpdateProductArgs {
    jancodes: Vec<String>,
    field: ProductField,
    value: Value,
}

/// 修改一个或多个商品的同一字段；任一失败则全部不生效
pub struct UpdateProductTool {
    backoffice: Arc<Backoffice>,
}

impl UpdateProductTool {
    pub fn new(backoffice: Arc<Backoffice>) -> Self {
        Self { backoffice }
    }
}

#[async_trait]
impl Tool for UpdateProductTool {
    fn name(&self) -> &str {
        "update_product"
    }

    fn description(&self) -> &str {
        "修改商品的分类 / 库存 / 价格 / 名称"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, key): (UpdateProductArgs, _) = parse_args(args)?;
        if a.jancodes.is_empty() {
            return Err("没有指定商品".to_string());
        }
        self.backoffice
            .mutate(key, |state| {
                let mut staged = Vec::with_capacity(a.jancodes.len());
                for id in &a.jancodes {
                    let mut updated = state
                        .products
                        .get(id)
                        .cloned()
                        .ok_or_else(|| format!("找不到商品 {id}"))?;
                    updated.apply(a.field, &a.value)?;
                    if updated.stock < 0 {
                        return Err("库存不能为负数".to_string());
                    }
                    staged.push(updated);
                }
                let out = json!({ "updated": staged });
                for p in staged {
                    state.products.insert(p.jancode.clone(), p);
                }
                Ok(out)
            })
            .await
    }
}

#[derive(Deserialize)]
struct BulkArgs {
    jancodes: Vec<String>,
}

fn join_issues(issues: &[ValidationError]) -> String {
    issues
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("；")
}

/// 批量上架：全部满足条件才提交
pub struct PublishProductsTool {
    backoffice: Arc<Backoffice>,
}

impl PublishProductsTool {
    pub fn new(backoffice: Arc<Backoffice>) -> Self {
        Self { backoffice }
    }
}

#[async_trait]
impl Tool for PublishProductsTool {
    fn name(&self) -> &str {
        "publish_products"
    }

    fn description(&self) -> &str {
        "批量上架商品；任一商品不满足条件则全部不生效"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, key): (BulkArgs, _) = parse_args(args)?;
        set_status(&self.backoffice, key, a.jancodes, ProductStatus::Published).await
    }
}

/// 批量下架
pub struct UnpublishProductsTool {
    backoffice: Arc<Backoffice>,
}

impl UnpublishProductsTool {
    pub fn new(backoffice: Arc<Backoffice>) -> Self {
        Self { backoffice }
    }
}

#[async_trait]
impl Tool for UnpublishProductsTool {
    fn name(&self) -> &str {
        "unpublish_products"
    }

    fn description(&self) -> &str {
        "批量下架商品"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let (a, key): (BulkArgs, _) = parse_args(args)?;
        set_status(&self.backoffice, key, a.jancodes, ProductStatus::Unpublished).await
    }
}

async fn set_status(
    backoffice: &Backoffice,
    key: Option<String>,
    jancodes: Vec<String>,
    target: ProductStatus,
) -> Result<Value, String> {
    if jancodes.is_empty() {
        return Err("没有指定商品".to_string());
    }
    backoffice
        .mutate(key, |state| {
            let mut problems = Vec::new();
            for id in &jancodes {
                match state.products.get(id) {
                    None => problems.push(format!("找不到商品 {id}")),
                    Some(p) => {
                        let issues = match target {
                            ProductStatus::Published => publish_issues(p),
                            ProductStatus::Unpublished => unpublish_issues(p),
                        };
                        if !issues.is_empty() {
                            problems.push(join_issues(&issues));
                        }
                    }
                }
            }
            if !problems.is_empty() {
                return Err(problems.join("；"));
            }
            for id in &jancodes {
                if let Some(p) = state.products.get_mut(id) {
                    p.status = target;
                }
            }
            let field = match target {
                ProductStatus::Published => "published",
                ProductStatus::Unpublished => "unpublished",
            };
            let mut out = serde_json::Map::new();
            out.insert(field.to_string(), json!(jancodes));
            Ok(Value::Object(out))
        })
        .await
}
