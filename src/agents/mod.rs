//! 三层智能体：总指挥（TaskRouter）→ 业务中心（AgentTool）→ 叶子（LeafAgent）
//!
//! 指令和上下文自上而下传递，`AgentResult` 自下而上原样返回，只在最外层组装一次。

pub mod capability;
pub mod director;
pub mod leaf;
pub mod manager;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use capability::AgentCapability;
pub use director::{Child, Director};
pub use leaf::{build_leaf, LeafAgent, LeafOutcome, LeafState, LeafTrace};
pub use manager::CenterManager;

use crate::core::AgentError;
use crate::domain::ValidationError;
use crate::routing::RoutingDecision;
use crate::session::ConversationContext;

/// 一轮的输入
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub message: String,
    pub trace_id: String,
    /// 只在分类阶段生效；进入工具调用后不再响应取消
    pub cancel: CancellationToken,
}

impl TurnInput {
    pub fn new(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace_id: trace_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// 一个节点给出的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub reply_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,
    /// 只放业务前置条件失败与后台拒绝；基础设施故障不进这里
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    pub trace_id: String,
    /// 出结果的节点
    #[serde(default)]
    pub handled_by: Option<String>,
}

impl AgentResult {
    pub fn reply(
        trace_id: impl Into<String>,
        handled_by: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            reply_text: text.into(),
            structured_data: None,
            errors: Vec::new(),
            trace_id: trace_id.into(),
            handled_by: Some(handled_by.into()),
        }
    }

    pub fn with_errors(mut self, errors: Vec<ValidationError>) -> Self {
        self.errors = errors;
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// 一次完整路由的产物
#[derive(Debug, Clone)]
pub struct Routed {
    /// 每层一条，自顶向下
    pub decisions: Vec<RoutingDecision>,
    pub result: AgentResult,
    /// 本轮结束后的上下文（由引擎决定是否提交）
    pub context: ConversationContext,
    /// 到达叶子时的执行轨迹
    pub leaf_trace: Option<LeafTrace>,
}

impl Routed {
    /// 当前节点直接作答，上下文不变
    pub fn answered(
        decision: RoutingDecision,
        result: AgentResult,
        context: &ConversationContext,
    ) -> Self {
        Self {
            decisions: vec![decision],
            result,
            context: context.clone(),
            leaf_trace: None,
        }
    }

    /// 叶子执行完毕
    pub fn from_leaf(decision: RoutingDecision, outcome: LeafOutcome) -> Self {
        Self {
            decisions: vec![decision],
            result: outcome.result,
            context: outcome.context,
            leaf_trace: Some(outcome.trace),
        }
    }

    /// 在前面补上上层的决策
    pub fn prepend(mut self, decision: RoutingDecision) -> Self {
        self.decisions.insert(0, decision);
        self
    }
}

/// 总指挥的能力：只有 route
#[async_trait]
pub trait TaskRouter: Send + Sync {
    async fn route(
        &self,
        input: &TurnInput,
        context: &ConversationContext,
    ) -> Result<Routed, AgentError>;
}

/// 业务中心的能力：route 只分类，delegate 分类并转交
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn id(&self) -> &str;

    async fn route(
        &self,
        input: &TurnInput,
        context: &ConversationContext,
    ) -> Result<RoutingDecision, AgentError>;

    async fn delegate(
        &self,
        input: &TurnInput,
        context: &ConversationContext,
    ) -> Result<Routed, AgentError>;
}
