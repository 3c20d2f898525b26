//! 工具注册表
//!
//! 所有后台工具实现 Tool trait（name / description / mutating / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时加超时并统一转 AgentError。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 工具 trait：名称、描述、是否写操作、异步执行（args / 返回值均为 JSON）
///
/// `Err(String)` 表示后台明确拒绝（业务失败），不是基础设施故障。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（ToolCall.tool_name）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 是否会修改后台数据；写操作从不自动重试
    fn mutating(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}
