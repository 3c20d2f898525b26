//! 叶子智能体与后台之间的调用边界
//!
//! 叶子只认识 ToolInvoker：一次调用进去，一个 ToolResult 出来。
//! `Err(AgentError)` 只表示基础设施故障（超时、未知工具）；后台拒绝走 `ToolResult { success: false }`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

/// 一次后台调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub args: Value,
    /// 写操作的去重键（trace_id + 工具名）；只读调用为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            idempotency_key: None,
        }
    }

    /// 以本轮 trace_id 生成去重键
    pub fn keyed_by(mut self, trace_id: &str) -> Self {
        self.idempotency_key = Some(format!("{trace_id}:{}", self.tool_name));
        self
    }
}

/// 后台返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// 后台调用接口（叶子智能体依赖它，而不是具体后台）
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, AgentError>;

    /// 该工具是否会修改后台数据
    fn is_mutating(&self, tool_name: &str) -> bool;
}
