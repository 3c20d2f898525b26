//! 智能体能力描述
//!
//! 每个节点一份：给分类器看（关键词、示例指令），也给用户看（能力总览、澄清提示）。
//! 层级配置里没写 capability 的节点，从 `builtin` 取内置描述。

use serde::{Deserialize, Serialize};

pub const DIRECTOR: &str = "director";
pub const PRODUCT_CENTER: &str = "product_center";
pub const ORDER_CENTER: &str = "order_center";
pub const PRODUCT_DETAIL: &str = "product_detail";
pub const PRODUCT_PUBLISH: &str = "product_publish";
pub const ORDER_DETAIL: &str = "order_detail";
pub const ORDER_ITEM_MODIFICATION: &str = "order_item_modification";
pub const ORDER_STATUS_CHANGE: &str = "order_status_change";
pub const ORDER_CANCELLATION: &str = "order_cancellation";

/// 能力描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentCapability {
    /// 显示名（如「商品中心」）
    pub agent_type: String,
    pub description: String,
    /// 领域名词；分类时权重高于普通关键词
    #[serde(default)]
    pub primary_domains: Vec<String>,
    #[serde(default)]
    pub key_functions: Vec<String>,
    #[serde(default)]
    pub example_commands: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl AgentCapability {
    /// 未知节点的最小描述
    pub fn minimal(id: &str) -> Self {
        Self {
            agent_type: id.to_string(),
            description: id.to_string(),
            ..Default::default()
        }
    }

    /// 渲染成一段给 LLM / 用户看的文本
    pub fn render(&self, id: &str) -> String {
        let mut out = format!("- {id}（{}）：{}", self.agent_type, self.description);
        if !self.key_functions.is_empty() {
            out.push_str(&format!("\n  主要功能：{}", self.key_functions.join("、")));
        }
        if !self.example_commands.is_empty() {
            let examples: Vec<String> = self
                .example_commands
                .iter()
                .map(|e| format!("“{e}”"))
                .collect();
            out.push_str(&format!("\n  示例：{}", examples.join("；")));
        }
        out
    }

    /// 一句话简介，用于澄清提示
    pub fn brief(&self) -> String {
        match self.example_commands.first() {
            Some(example) => format!("{}（例如：{}）", self.agent_type, example),
            None => self.agent_type.clone(),
        }
    }

    /// 合并下游能力的关键词与示例（去重，保持顺序）
    pub fn absorb(&mut self, other: &AgentCapability) {
        for k in &other.keywords {
            if !self.keywords.contains(k) {
                self.keywords.push(k.clone());
            }
        }
        for e in &other.example_commands {
            if !self.example_commands.contains(e) {
                self.example_commands.push(e.clone());
            }
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// 内置节点的能力描述
pub fn builtin(id: &str) -> Option<AgentCapability> {
    let cap = match id {
        DIRECTOR => AgentCapability {
            agent_type: "总指挥".into(),
            description: "理解后台指令并分派给对应业务中心".into(),
            ..Default::default()
        },
        PRODUCT_CENTER => AgentCapability {
            agent_type: "商品中心".into(),
            description: "商品信息查询与维护、商品上架下架".into(),
            primary_domains: strings(&["商品", "产品", "product", "jan", "カテゴリ"]),
            key_functions: strings(&["商品详情与字段修改", "商品上架 / 下架"]),
            ..Default::default()
        },
        ORDER_CENTER => AgentCapability {
            agent_type: "订单中心".into(),
            description: "订单查询、订单商品修改、状态变更与取消".into(),
            primary_domains: strings(&["订单", "order", "ord-", "注文"]),
            key_functions: strings(&["订单详情", "订单商品修改", "订单 / 支付 / 配送状态", "取消订单"]),
            ..Default::default()
        },
        PRODUCT_DETAIL => AgentCapability {
            agent_type: "商品信息".into(),
            description: "查看、搜索商品，修改分类 / 库存 / 价格 / 名称".into(),
            key_functions: strings(&["查看商品", "搜索商品", "修改商品字段"]),
            example_commands: strings(&[
                "显示所有未上架商品",
                "为商品A设置分类为'母婴'",
                "把商品A的库存设置为10",
            ]),
            keywords: strings(&[
                "分类", "类别", "类目", "库存", "价格", "售价", "名称", "详情", "查看", "显示",
                "搜索", "查找", "列出", "设置", "修改", "改为", "改成", "未上架", "已上架",
                "category", "stock", "price", "rename", "show", "search", "list", "set",
                "published", "unpublished",
                "在庫", "価格", "表示", "検索",
            ]),
            ..Default::default()
        },
        PRODUCT_PUBLISH => AgentCapability {
            agent_type: "商品上架".into(),
            description: "商品上架与下架，支持多个商品一起处理".into(),
            key_functions: strings(&["上架", "下架"]),
            example_commands: strings(&["上架商品A", "下架商品B", "把它们都上架"]),
            keywords: strings(&[
                "上架", "下架", "取消上架", "发布", "上线", "下线", "publish", "unpublish",
                "公開", "非公開",
            ]),
            ..Default::default()
        },
        ORDER_DETAIL => AgentCapability {
            agent_type: "订单详情".into(),
            description: "查看订单，按状态或客户搜索订单".into(),
            key_functions: strings(&["查看订单", "搜索订单"]),
            example_commands: strings(&["查看订单ORD-1001", "显示所有待处理订单"]),
            keywords: strings(&[
                "详情", "查看", "显示", "搜索", "查找", "列出", "show", "search",
                "list", "表示", "検索",
            ]),
            ..Default::default()
        },
        ORDER_ITEM_MODIFICATION => AgentCapability {
            agent_type: "订单商品修改".into(),
            description: "给订单添加 / 删除商品，修改商品数量".into(),
            key_functions: strings(&["添加商品", "删除商品", "修改数量"]),
            example_commands: strings(&[
                "给订单ORD-1001添加商品4901234567890 2个",
                "把订单ORD-1001中商品B的数量改为3",
            ]),
            keywords: strings(&[
                "添加", "加入", "增加", "删除", "移除", "去掉", "数量", "add", "remove",
                "quantity", "追加", "削除", "数量を",
            ]),
            ..Default::default()
        },
        ORDER_STATUS_CHANGE => AgentCapability {
            agent_type: "订单状态".into(),
            description: "修改订单状态、支付状态、配送状态".into(),
            key_functions: strings(&["订单状态", "支付状态", "配送状态"]),
            example_commands: strings(&["把订单ORD-1001的支付状态改为已付款", "订单ORD-1003已发货"]),
            keywords: strings(&[
                "状态", "付款", "支付", "发货", "配送", "物流", "送达", "签收", "退款",
                "status", "payment", "paid", "shipping", "shipped", "delivered", "ステータス",
                "支払", "発送",
            ]),
            ..Default::default()
        },
        ORDER_CANCELLATION => AgentCapability {
            agent_type: "取消订单".into(),
            description: "取消尚未发货的订单".into(),
            key_functions: strings(&["取消订单"]),
            example_commands: strings(&["取消订单ORD-1001", "把它取消"]),
            keywords: strings(&["取消", "撤销", "作废", "cancel", "キャンセル"]),
            ..Default::default()
        },
        _ => return None,
    };
    Some(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_known_and_unknown() {
        assert!(builtin(PRODUCT_PUBLISH).unwrap().keywords.contains(&"上架".to_string()));
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn test_absorb_dedups() {
        let mut center = builtin(ORDER_CENTER).unwrap();
        let cancel = builtin(ORDER_CANCELLATION).unwrap();
        center.absorb(&cancel);
        center.absorb(&cancel);
        assert_eq!(
            center.keywords.iter().filter(|k| k.as_str() == "取消").count(),
            1
        );
        assert!(center.render(ORDER_CENTER).contains("取消订单ORD-1001"));
    }

    #[test]
    fn test_brief_uses_first_example() {
        let cap = builtin(PRODUCT_DETAIL).unwrap();
        assert_eq!(cap.brief(), "商品信息（例如：显示所有未上架商品）");
        assert_eq!(AgentCapability::minimal("x").brief(), "x");
    }
}
