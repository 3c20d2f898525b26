//! 层级节点与层级定义（静态配置）

use serde::{Deserialize, Serialize};

use crate::agents::capability::{
    self, AgentCapability, DIRECTOR, ORDER_CANCELLATION, ORDER_CENTER, ORDER_DETAIL,
    ORDER_ITEM_MODIFICATION, ORDER_STATUS_CHANGE, PRODUCT_CENTER, PRODUCT_DETAIL,
    PRODUCT_PUBLISH,
};

/// 层级：0 总指挥、1 业务中心、2 叶子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    Director,
    Manager,
    Leaf,
}

impl Level {
    pub fn as_u8(&self) -> u8 {
        match self {
            Level::Director => 0,
            Level::Manager => 1,
            Level::Leaf => 2,
        }
    }

    /// 该层级唯一允许的注入方式
    pub fn injection_method(&self) -> InjectionMethod {
        match self {
            Level::Director => InjectionMethod::TaskRouter,
            Level::Manager => InjectionMethod::AgentTool,
            Level::Leaf => InjectionMethod::BaseTool,
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Level::Director),
            1 => Ok(Level::Manager),
            2 => Ok(Level::Leaf),
            other => Err(format!("invalid level {other}, expected 0, 1 or 2")),
        }
    }
}

impl From<Level> for u8 {
    fn from(l: Level) -> u8 {
        l.as_u8()
    }
}

/// 节点被上层调用的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionMethod {
    TaskRouter,
    AgentTool,
    BaseTool,
}

impl InjectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionMethod::TaskRouter => "task_router",
            InjectionMethod::AgentTool => "agent_tool",
            InjectionMethod::BaseTool => "base_tool",
        }
    }
}

/// 已建好的节点（存于 AgentRegistry 的 arena 中，按下标互相引用）
#[derive(Debug, Clone)]
pub struct AgentNode {
    pub id: String,
    pub level: Level,
    pub injection_method: InjectionMethod,
    pub capability: AgentCapability,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl AgentNode {
    pub fn is_leaf(&self) -> bool {
        self.level == Level::Leaf
    }
}

/// 配置中的节点（嵌套树）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub level: Level,
    pub injection_method: InjectionMethod,
    /// 缺省时使用内置描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<AgentCapability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, level: Level) -> Self {
        Self {
            id: id.into(),
            level,
            injection_method: level.injection_method(),
            capability: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<NodeSpec>) -> Self {
        self.children = children;
        self
    }

    pub fn with_capability(mut self, capability: AgentCapability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub(crate) fn resolved_capability(&self) -> AgentCapability {
        self.capability
            .clone()
            .or_else(|| capability::builtin(&self.id))
            .unwrap_or_else(|| AgentCapability::minimal(&self.id))
    }
}

/// 层级定义（根节点即总指挥）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchySpec {
    pub root: NodeSpec,
}

impl HierarchySpec {
    /// 内置层级：总指挥 → 商品中心 / 订单中心 → 六个叶子
    pub fn builtin() -> Self {
        let leaf = |id: &str| NodeSpec::new(id, Level::Leaf);
        Self {
            root: NodeSpec::new(DIRECTOR, Level::Director).with_children(vec![
                NodeSpec::new(PRODUCT_CENTER, Level::Manager)
                    .with_children(vec![leaf(PRODUCT_DETAIL), leaf(PRODUCT_PUBLISH)]),
                NodeSpec::new(ORDER_CENTER, Level::Manager).with_children(vec![
                    leaf(ORDER_DETAIL),
                    leaf(ORDER_ITEM_MODIFICATION),
                    leaf(ORDER_STATUS_CHANGE),
                    leaf(ORDER_CANCELLATION),
                ]),
            ]),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, super::HierarchyError> {
        toml::from_str(text).map_err(|e| super::HierarchyError::Parse(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, super::HierarchyError> {
        serde_json::from_str(text).map_err(|e| super::HierarchyError::Parse(e.to_string()))
    }

    /// 按扩展名读取（.json 为 JSON，其余按 TOML）
    pub fn load(path: &std::path::Path) -> Result<Self, super::HierarchyError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| super::HierarchyError::Io(format!("{}: {e}", path.display())))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_toml(&text),
        }
    }
}
