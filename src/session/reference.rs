//! 从一句话里抽取实体引用与取值
//!
//! - 显式编号：商品A / JAN 码 / ORD-1001 / 订单12345
//! - 指代：它、这些、it、them……（指向上下文里的当前选择）
//! - 取值：引号内文本优先，其次是「设置为 / 改成 / to」之后的尾部片段

use std::sync::OnceLock;

use regex::Regex;

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

static PRODUCT_RE: OnceLock<Option<Regex>> = OnceLock::new();
static JAN_RE: OnceLock<Option<Regex>> = OnceLock::new();
static ORDER_RE: OnceLock<Option<Regex>> = OnceLock::new();
static ORDER_WORD_RE: OnceLock<Option<Regex>> = OnceLock::new();
static PRONOUN_EN_RE: OnceLock<Option<Regex>> = OnceLock::new();
static QUOTED_RE: OnceLock<Option<Regex>> = OnceLock::new();
static TRAILING_RE: OnceLock<Option<Regex>> = OnceLock::new();
static TRAILING_JA_RE: OnceLock<Option<Regex>> = OnceLock::new();
static NUMBER_RE: OnceLock<Option<Regex>> = OnceLock::new();
static QUANTITY_RE: OnceLock<Option<Regex>> = OnceLock::new();
static LIMIT_RE: OnceLock<Option<Regex>> = OnceLock::new();

const PRONOUNS_CJK: &[&str] = &[
    "它们", "它", "这些", "这个", "那些", "那个", "该商品", "该订单", "上述", "刚才", "上面",
    "これら", "それら", "これ", "それ", "あれ",
];

const ALL_WORDS: &[&str] = &["所有", "全部", "一览", "列表", "一覧", "すべて", "all", "every"];

fn push_unique(out: &mut Vec<String>, id: String) {
    if !out.contains(&id) {
        out.push(id);
    }
}

/// 显式商品编号（按出现顺序、去重）
pub fn product_ids(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(re) = cached(
        &PRODUCT_RE,
        r"(?:商品|产品|(?i:\bproducts?\b)|(?i:\bjan(?:code)?\b))\s*[:：#]?\s*([A-Z0-9][A-Za-z0-9_]*)",
    ) {
        for cap in re.captures_iter(text) {
            push_unique(&mut out, cap[1].to_string());
        }
    }
    if let Some(re) = cached(&JAN_RE, r"(?:^|[^0-9A-Za-z_-])(\d{8,13})(?:$|[^0-9])") {
        for cap in re.captures_iter(text) {
            push_unique(&mut out, cap[1].to_string());
        }
    }
    out
}

/// 显式订单号（ORD- 前缀统一为大写）
pub fn order_ids(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(re) = cached(&ORDER_RE, r"(?i)(?:^|[^A-Za-z0-9])(ORD-[A-Za-z0-9-]+)") {
        for cap in re.captures_iter(text) {
            push_unique(&mut out, cap[1].to_uppercase());
        }
    }
    if let Some(re) = cached(
        &ORDER_WORD_RE,
        r"(?:订单|注文|(?i:\border\b))\s*[:：#号]?\s*([A-Z0-9][A-Za-z0-9_-]*)",
    ) {
        for cap in re.captures_iter(text) {
            let id = &cap[1];
            let id = if id.to_uppercase().starts_with("ORD-") {
                id.to_uppercase()
            } else {
                id.to_string()
            };
            push_unique(&mut out, id);
        }
    }
    out
}

/// 是否用指代词指向当前选择
pub fn mentions_selection(text: &str) -> bool {
    if PRONOUNS_CJK.iter().any(|p| text.contains(p)) {
        return true;
    }
    cached(
        &PRONOUN_EN_RE,
        r"(?i)\b(it|its|them|these|those|this|that|they)\b",
    )
    .map(|re| re.is_match(text))
    .unwrap_or(false)
}

/// 是否在要「全部 / 列表」
pub fn mentions_all(text: &str) -> bool {
    let lower = text.to_lowercase();
    ALL_WORDS.iter().any(|w| lower.contains(w))
}

/// 引号内的值
pub fn quoted_value(text: &str) -> Option<String> {
    cached(&QUOTED_RE, r#"['‘’"“”「」『』]([^'‘’"“”「」『』]+)['‘’"“”「」『』]"#)
        .and_then(|re| re.captures(text))
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 句尾「设置为 X / 改成 X / to X」里的 X
pub fn trailing_value(text: &str) -> Option<String> {
    let text = text.trim();
    let zh_en = cached(
        &TRAILING_RE,
        r"(?:设置为|设为|改为|改成|调整为|更新为|修改为|为|成|到|\bto\b|=|：|:)\s*([^\s，。,!！?？为成到]+?)\s*[。.!！]?\s*$",
    )
    .and_then(|re| re.captures(text))
    .map(|c| c[1].to_string());
    zh_en.or_else(|| {
        cached(&TRAILING_JA_RE, r"を\s*([^\s、。]+?)\s*に(?:設定|変更)")
            .and_then(|re| re.captures(text))
            .map(|c| c[1].to_string())
    })
}

/// 字段取值：引号优先，再取句尾
pub fn value_of(text: &str) -> Option<String> {
    quoted_value(text).or_else(|| trailing_value(text))
}

/// 第一个数字（含小数）
pub fn first_number(text: &str) -> Option<String> {
    cached(&NUMBER_RE, r"-?\d+(?:\.\d+)?")
        .and_then(|re| re.find(text))
        .map(|m| m.as_str().to_string())
}

/// 条数上限：「前5个 / 最多10条 / top 3 / limit 20」
pub fn limit_of(text: &str) -> Option<usize> {
    cached(&LIMIT_RE, r"(?i)(?:前|最多|\btop\s*|\blimit\s*|\bfirst\s*)(\d+)")?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
        .filter(|n| *n > 0)
}

/// 数量：「2个 / 3件 / x2 / 数量改为3」
pub fn quantity(text: &str) -> Option<i64> {
    let re = cached(
        &QUANTITY_RE,
        r"(?i)(?:(\d+)\s*(?:个|件|份|箱|点|つ|pcs|units?)|[x×]\s*(\d+)|数量(?:改为|设为|改成|设置为|调整为|为|を)?\s*(\d+))",
    )?;
    let caps = re.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_ids() {
        assert_eq!(product_ids("为商品A设置分类为'母婴'"), vec!["A"]);
        assert_eq!(product_ids("上架商品A和商品B"), vec!["A", "B"]);
        assert_eq!(
            product_ids("给订单ORD-1001添加商品4901234567890 2个"),
            vec!["4901234567890"]
        );
        assert_eq!(product_ids("publish product C"), vec!["C"]);
        assert!(product_ids("show all products with status").is_empty());
        assert!(product_ids("显示所有未上架商品").is_empty());
    }

    #[test]
    fn test_order_ids() {
        assert_eq!(order_ids("查看订单ORD-1001"), vec!["ORD-1001"]);
        assert_eq!(order_ids("cancel order ord-7"), vec!["ORD-7"]);
        assert_eq!(order_ids("把ORD-1002标记为已送达"), vec!["ORD-1002"]);
        assert_eq!(order_ids("订单号12345已发货"), vec!["12345"]);
        assert!(order_ids("把它取消").is_empty());
        assert!(order_ids("订单状态").is_empty());
    }

    #[test]
    fn test_mentions_selection() {
        assert!(mentions_selection("把它取消"));
        assert!(mentions_selection("上架这些"));
        assert!(mentions_selection("publish them"));
        assert!(mentions_selection("それを公開して"));
        assert!(!mentions_selection("上架商品A"));
        assert!(!mentions_selection("publish items"));
    }

    #[test]
    fn test_values() {
        assert_eq!(value_of("为商品A设置分类为'母婴'").as_deref(), Some("母婴"));
        assert_eq!(value_of("把商品A的库存设置为10").as_deref(), Some("10"));
        assert_eq!(value_of("为商品A设置库存为10").as_deref(), Some("10"));
        assert_eq!(value_of("把价格改成12.5。").as_deref(), Some("12.5"));
        assert_eq!(value_of("set price of product A to 1200").as_deref(), Some("1200"));
        assert_eq!(value_of("商品Aの価格を1200に設定").as_deref(), Some("1200"));
        assert!(value_of("上架商品A").is_none());
    }

    #[test]
    fn test_quantity_and_number() {
        assert_eq!(quantity("添加商品4901234567890 2个"), Some(2));
        assert_eq!(quantity("数量改为3"), Some(3));
        assert_eq!(quantity("add item B x4"), Some(4));
        assert_eq!(quantity("删除商品B"), None);
        assert_eq!(first_number("价格 1200 元").as_deref(), Some("1200"));
    }

    #[test]
    fn test_limit_of() {
        assert_eq!(limit_of("列出前5个未上架商品"), Some(5));
        assert_eq!(limit_of("list top 3 products"), Some(3));
        assert_eq!(limit_of("最多0条"), None);
        assert_eq!(limit_of("搜索名称为'牛奶'的商品"), None);
    }

    #[test]
    fn test_mentions_all() {
        assert!(mentions_all("显示所有订单"));
        assert!(mentions_all("list ALL products"));
        assert!(!mentions_all("查看订单ORD-1"));
    }
}
