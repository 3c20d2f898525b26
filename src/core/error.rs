//! 路由过程中的错误类型与恢复动作
//!
//! 业务校验失败不走这里（见 `ValidationError`）；这里只放基础设施故障：分类器、工具、配置、取消。
//! 与 RecoveryEngine 配合：根据 AgentError 决定返回给用户的兜底结果。

use thiserror::Error;

use crate::hierarchy::HierarchyError;
use crate::llm::LlmError;

/// 路由 / 执行过程中可能出现的基础设施错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Classifier timeout after {0}s")]
    ClassifierTimeout(u64),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Turn cancelled")]
    Cancelled,
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 服务暂不可用（分类器 / LLM），用户稍后重试即可
    ServiceUnavailable,
    /// 后台工具故障，本轮未产生写入，提示重试
    RetryLater,
    /// 本轮被取消
    Abort,
    /// 部署问题（层级 / 配置），需要运维介入
    Misconfigured,
}
