//! 商品信息：查看、搜索、修改分类 / 库存 / 价格 / 名称

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::{contains_any, fetch_product, records, resolve_targets, LeafPlan};
use crate::agents::capability::PRODUCT_DETAIL;
use crate::core::AgentError;
use crate::domain::{missing_product, parse_field_value, Product, ProductField, ProductStatus, ValidationError};
use crate::session::reference::{
    first_number, limit_of, mentions_all, mentions_selection, product_ids, quoted_value, value_of,
};
use crate::session::{ConversationContext, EntityKind};
use crate::tools::{ToolCall, ToolInvoker};

const FIELD_WORDS: &[(&str, ProductField)] = &[
    ("分类", ProductField::Category),
    ("类别", ProductField::Category),
    ("类目", ProductField::Category),
    ("category", ProductField::Category),
    ("カテゴリ", ProductField::Category),
    ("库存", ProductField::Stock),
    ("stock", ProductField::Stock),
    ("在庫", ProductField::Stock),
    ("价格", ProductField::Price),
    ("售价", ProductField::Price),
    ("price", ProductField::Price),
    ("価格", ProductField::Price),
    ("名称", ProductField::Name),
    ("名字", ProductField::Name),
    ("name", ProductField::Name),
];

const SEARCH_WORDS: &[&str] = &[
    "搜索", "查找", "查询", "筛选", "列出", "search", "find", "list", "検索", "一覧",
];

/// 只有出现这些词才会改商品字段
const UPDATE_WORDS: &[&str] = &[
    "设置", "设为", "改", "更新", "调整", "set ", "update", "change", "rename", "変更", "設定",
];

const BELOW_WORDS: &[&str] = &["少于", "低于", "小于", "不足", "不到", "以下", "below", "under", "less than"];
const ABOVE_WORDS: &[&str] = &["多于", "高于", "大于", "超过", "以上", "above", "over", "more than"];
const STOCK_WORDS: &[&str] = &["库存", "stock", "在庫"];

/// search_products 的过滤条件；为空的条件不下发
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProductStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// 名称或编号里包含的关键词
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl ProductQuery {
    fn from_message(message: &str, field: Option<ProductField>, status: Option<ProductStatus>) -> Self {
        let lower = message.to_lowercase();
        let mut query = ProductQuery {
            status,
            limit: limit_of(message),
            ..Default::default()
        };
        match field {
            Some(ProductField::Category) => query.category = value_of(message).map(strip_noun),
            Some(ProductField::Name) => query.keyword = value_of(message).map(strip_noun),
            Some(ProductField::Stock) => {
                if let Some(n) = number_after(&lower, BELOW_WORDS) {
                    query.stock_max = Some(n);
                } else if let Some(n) = number_after(&lower, ABOVE_WORDS) {
                    query.stock_min = Some(n);
                } else if let Some(n) = number_after(&lower, STOCK_WORDS) {
                    query.stock_min = Some(n);
                    query.stock_max = Some(n);
                }
            }
            Some(ProductField::Price) | None => query.keyword = quoted_value(message),
        }
        query
    }
}

/// 「食品的商品」→「食品」
fn strip_noun(value: String) -> String {
    ["的商品", "的产品", "的"]
        .iter()
        .fold(value, |v, suffix| v.trim_end_matches(suffix).to_string())
}

/// 第一个出现的提示词之后的整数
fn number_after(lower: &str, words: &[&str]) -> Option<i64> {
    words.iter().find_map(|w| {
        let at = lower.find(w)?;
        first_number(&lower[at + w.len()..])?.parse::<f64>().ok().map(|n| n as i64)
    })
}

/// 修改示例，取值与字段类型一致
fn update_example(field: ProductField) -> &'static str {
    match field {
        ProductField::Category => "为商品A设置分类为'食品'",
        ProductField::Stock => "把商品A的库存设置为10",
        ProductField::Price => "把商品A的价格设置为480",
        ProductField::Name => "把商品A的名称改为'有机米粉'",
    }
}

fn field_value(p: &Product, field: ProductField) -> String {
    match field {
        ProductField::Category => p.category.clone().unwrap_or_else(|| "未设置".to_string()),
        ProductField::Stock => p.stock.to_string(),
        ProductField::Price => p.price.to_string(),
        ProductField::Name => p.name.clone(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProductIntent {
    /// `field` 为问到的字段（「查看商品A的价格」）
    Show {
        jancodes: Vec<String>,
        field: Option<ProductField>,
    },
    Search(ProductQuery),
    Update {
        jancodes: Vec<String>,
        field: ProductField,
        value: Result<Value, ValidationError>,
    },
}

fn field_in(text: &str) -> Option<ProductField> {
    let lower = text.to_lowercase();
    FIELD_WORDS
        .iter()
        .find(|(w, _)| lower.contains(w))
        .map(|(_, f)| *f)
}

fn status_in(text: &str) -> Option<ProductStatus> {
    let lower = text.to_lowercase();
    if contains_any(&lower, &["未上架", "unpublished", "非公開"]) {
        Some(ProductStatus::Unpublished)
    } else if contains_any(&lower, &["已上架", "published", "公開中"]) {
        Some(ProductStatus::Published)
    } else {
        None
    }
}

/// 一行商品摘要
pub(crate) fn describe(p: &Product) -> String {
    format!(
        "商品{}「{}」：{}，分类 {}，库存 {}，价格 {}",
        p.jancode,
        p.name,
        p.status.label(),
        p.category.as_deref().unwrap_or("未设置"),
        p.stock,
        p.price
    )
}

pub struct ProductDetailPlan;

#[async_trait]
impl LeafPlan for ProductDetailPlan {
    type Intent = ProductIntent;

    fn id(&self) -> &'static str {
        PRODUCT_DETAIL
    }

    fn parse(&self, message: &str, context: &ConversationContext) -> Result<ProductIntent, String> {
        let explicit = product_ids(message);
        let field = field_in(message);
        let status = status_in(message);
        let updating = contains_any(message, UPDATE_WORDS);

        // 没点名具体商品时，搜索词与「所有」优先于修改，不会误写选择里的商品
        let searching = explicit.is_empty()
            && (contains_any(message, SEARCH_WORDS)
                || mentions_all(message)
                || (!updating
                    && (status.is_some() || field.is_some())
                    && !mentions_selection(message)));
        if searching {
            return Ok(ProductIntent::Search(ProductQuery::from_message(
                message, field, status,
            )));
        }

        if let Some(field) = field.filter(|_| updating) {
            let Some(raw) = value_of(message) else {
                return Err(format!(
                    "请告诉我新的{}，例如：{}",
                    field.label(),
                    update_example(field)
                ));
            };
            let jancodes = resolve_targets(explicit, context, EntityKind::Product);
            if jancodes.is_empty() {
                return Err(format!(
                    "请告诉我要修改哪个商品的{}，例如：{}",
                    field.label(),
                    update_example(field)
                ));
            }
            return Ok(ProductIntent::Update {
                jancodes,
                field,
                value: parse_field_value(field, &raw),
            });
        }

        let jancodes = resolve_targets(explicit, context, EntityKind::Product);
        if jancodes.is_empty() {
            return Err("请告诉我要查看哪个商品，例如：查看商品A，或者：显示所有未上架商品".to_string());
        }
        Ok(ProductIntent::Show { jancodes, field })
    }

    async fn check(
        &self,
        intent: &ProductIntent,
        tools: &dyn ToolInvoker,
    ) -> Result<Vec<ValidationError>, AgentError> {
        let mut issues = Vec::new();
        match intent {
            ProductIntent::Search(_) => {}
            ProductIntent::Show { jancodes, .. } => {
                for id in jancodes {
                    if fetch_product(tools, id).await?.is_none() {
                        issues.push(missing_product(id));
                    }
                }
            }
            ProductIntent::Update {
                jancodes, value, ..
            } => {
                for id in jancodes {
                    if fetch_product(tools, id).await?.is_none() {
                        issues.push(missing_product(id));
                    }
                }
                if let Err(e) = value {
                    issues.push(e.clone());
                }
            }
        }
        Ok(issues)
    }

    fn tool_call(&self, intent: &ProductIntent) -> ToolCall {
        match intent {
            ProductIntent::Show { jancodes, .. } => {
                ToolCall::new("search_products", json!({ "jancodes": jancodes }))
            }
            ProductIntent::Search(query) => ToolCall::new(
                "search_products",
                serde_json::to_value(query).unwrap_or_else(|_| json!({})),
            ),
            ProductIntent::Update {
                jancodes,
                field,
                value,
            } => ToolCall::new(
                "update_product",
                json!({
                    "jancodes": jancodes,
                    "field": field,
                    "value": value.clone().unwrap_or(Value::Null),
                }),
            ),
        }
    }

    fn on_success(
        &self,
        intent: &ProductIntent,
        data: &Value,
        context: &mut ConversationContext,
    ) -> (String, Option<Value>) {
        match intent {
            ProductIntent::Update {
                jancodes,
                field,
                value,
            } => {
                context.select(EntityKind::Product, jancodes.clone());
                let shown = match value {
                    Ok(Value::String(s)) => s.clone(),
                    Ok(v) => v.to_string(),
                    Err(_) => String::new(),
                };
                (
                    format!(
                        "已将商品{}的{}设置为「{}」。",
                        jancodes.join("、"),
                        field.label(),
                        shown
                    ),
                    Some(data.clone()),
                )
            }
            ProductIntent::Show { .. } | ProductIntent::Search(_) => {
                let products: Vec<Product> = records(data, "products");
                let ids: Vec<String> = products.iter().map(|p| p.jancode.clone()).collect();
                if ids.is_empty() {
                    context.clear_selection();
                    return ("没有找到符合条件的商品。".to_string(), Some(data.clone()));
                }
                context.select(EntityKind::Product, ids);
                let lines: Vec<String> = products.iter().map(|p| format!("- {}", describe(p))).collect();
                let head = match intent {
                    ProductIntent::Search(_) => format!("找到 {} 个商品：", products.len()),
                    ProductIntent::Show {
                        field: Some(field), ..
                    } => products
                        .iter()
                        .map(|p| format!("商品{}的{}：{}", p.jancode, field.label(), field_value(p, *field)))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    _ => "商品信息：".to_string(),
                };
                (format!("{head}\n{}", lines.join("\n")), Some(data.clone()))
            }
        }
    }

    fn blocked_reply(&self, intent: &ProductIntent) -> String {
        match intent {
            ProductIntent::Update { field, .. } => format!("{}没有修改。", field.label()),
            _ => "没有找到要查看的商品。".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Recording;
    use super::super::{build_leaf, LeafState};
    use super::*;
    use crate::agents::TurnInput;

    fn ctx() -> ConversationContext {
        ConversationContext::new("s", "u")
    }

    #[test]
    fn test_parse_update_show_search() {
        let plan = ProductDetailPlan;
        match plan.parse("为商品A设置分类为'母婴'", &ctx()).unwrap() {
            ProductIntent::Update { jancodes, field, value } => {
                assert_eq!(jancodes, vec!["A"]);
                assert_eq!(field, ProductField::Category);
                assert_eq!(value.unwrap(), json!("母婴"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            plan.parse("显示所有未上架商品", &ctx()).unwrap(),
            ProductIntent::Search(ProductQuery {
                status: Some(ProductStatus::Unpublished),
                ..Default::default()
            })
        );
        assert_eq!(
            plan.parse("查看商品B", &ctx()).unwrap(),
            ProductIntent::Show {
                jancodes: vec!["B".into()],
                field: None,
            }
        );
        assert!(plan.parse("查看详情", &ctx()).is_err());
    }

    #[test]
    fn test_search_words_never_update_selection() {
        let mut context = ctx();
        context.select(EntityKind::Product, vec!["A".into(), "4902222333444".into()]);
        let plan = ProductDetailPlan;
        assert_eq!(
            plan.parse("搜索名称为'牛奶'的商品", &context).unwrap(),
            ProductIntent::Search(ProductQuery {
                keyword: Some("牛奶".into()),
                ..Default::default()
            })
        );
        assert_eq!(
            plan.parse("列出前5个库存少于15的商品", &context).unwrap(),
            ProductIntent::Search(ProductQuery {
                stock_max: Some(15),
                limit: Some(5),
                ..Default::default()
            })
        );
        assert_eq!(
            plan.parse("显示分类为食品的商品", &context).unwrap(),
            ProductIntent::Search(ProductQuery {
                category: Some("食品".into()),
                ..Default::default()
            })
        );
        match plan.parse("查看它们的库存", &context).unwrap() {
            ProductIntent::Show { jancodes, field } => {
                assert_eq!(jancodes.len(), 2);
                assert_eq!(field, Some(ProductField::Stock));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            plan.parse("查找库存超过30的商品", &context).unwrap(),
            ProductIntent::Search(ProductQuery {
                stock_min: Some(30),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_field_read_is_show() {
        let plan = ProductDetailPlan;
        assert_eq!(
            plan.parse("查看商品A的价格", &ctx()).unwrap(),
            ProductIntent::Show {
                jancodes: vec!["A".into()],
                field: Some(ProductField::Price),
            }
        );
        assert_eq!(
            plan.parse("show the name of product A", &ctx()).unwrap(),
            ProductIntent::Show {
                jancodes: vec!["A".into()],
                field: Some(ProductField::Name),
            }
        );
        // 缺新值时的示例与字段类型一致
        let question = plan.parse("把商品A的价格改一下", &ctx()).unwrap_err();
        assert!(question.contains("480"), "{question}");
        assert!(!question.contains("食品"));
    }

    #[test]
    fn test_update_uses_selection() {
        let mut context = ctx();
        context.select(EntityKind::Product, vec!["A".into(), "4902222333444".into()]);
        match ProductDetailPlan.parse("把它们的分类设置为'食品'", &context).unwrap() {
            ProductIntent::Update { jancodes, .. } => assert_eq!(jancodes.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_sets_selection() {
        let tools = Recording::seeded();
        let leaf = build_leaf(PRODUCT_DETAIL, tools).unwrap();
        let out = leaf
            .execute(&TurnInput::new("显示所有未上架商品", "t1"), &ctx())
            .await
            .unwrap();
        assert!(out.result.reply_text.contains("商品A"));
        assert_eq!(out.context.selection_kind, Some(EntityKind::Product));
        assert!(out.context.selected_entity_ids.contains(&"A".to_string()));
        assert!(!out.context.selected_entity_ids.contains(&"B".to_string()));
    }

    #[tokio::test]
    async fn test_keyword_search_reads_only() {
        let tools = Recording::seeded();
        let leaf = build_leaf(PRODUCT_DETAIL, tools.clone()).unwrap();
        let mut context = ctx();
        context.select(EntityKind::Product, vec!["A".into(), "4901234567890".into()]);
        let out = leaf
            .execute(&TurnInput::new("搜索名称为'抹茶'的商品", "t1"), &context)
            .await
            .unwrap();
        assert!(out.result.reply_text.contains("找到 1 个商品"), "{}", out.result.reply_text);
        assert_eq!(out.context.selected_entity_ids, vec!["4901234567890".to_string()]);
        assert!(tools.mutating_calls().is_empty());
        assert_eq!(tools.backoffice.product("A").await.unwrap().name, "有机米粉");
    }

    #[tokio::test]
    async fn test_show_single_field() {
        let tools = Recording::seeded();
        let leaf = build_leaf(PRODUCT_DETAIL, tools.clone()).unwrap();
        let out = leaf
            .execute(&TurnInput::new("查看商品A的价格", "t1"), &ctx())
            .await
            .unwrap();
        assert!(out.result.reply_text.starts_with("商品A的价格：480"), "{}", out.result.reply_text);
        assert!(tools.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_stock_blocks_write() {
        let tools = Recording::seeded();
        let leaf = build_leaf(PRODUCT_DETAIL, tools.clone()).unwrap();
        let out = leaf
            .execute(&TurnInput::new("把商品A的库存设置为-5", "t1"), &ctx())
            .await
            .unwrap();
        assert_eq!(out.result.errors.len(), 1);
        assert_eq!(out.result.errors[0].field, "stock");
        assert!(!out.trace.states.contains(&LeafState::ToolInvoked));
        assert!(tools.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_category() {
        let tools = Recording::seeded();
        let leaf = build_leaf(PRODUCT_DETAIL, tools.clone()).unwrap();
        let out = leaf
            .execute(&TurnInput::new("为商品A设置分类为'母婴'", "t1"), &ctx())
            .await
            .unwrap();
        assert!(out.result.errors.is_empty());
        assert!(out.result.reply_text.contains("母婴"));
        assert_eq!(
            tools.backoffice.product("A").await.unwrap().category.as_deref(),
            Some("母婴")
        );
        assert_eq!(tools.mutating_calls().len(), 1);
    }
}
