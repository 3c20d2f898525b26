//! 叶子智能体：一轮内的执行状态机
//!
//! Idle → IntentParsed → PreconditionChecked → ToolInvoked → Succeeded | Failed → Responded
//!
//! - 解析不出目标：直接 Responded（澄清），不调用任何工具
//! - 前置条件不满足：带 errors 直接 Responded，不发出写调用
//! - 每轮最多一次动作调用；前置检查里的只读查询不算
//!
//! 各叶子只写自己的 `LeafPlan`（解析、检查、调用、结果说明），状态机由 `PlannedLeaf` 统一跑。

pub mod order_cancel;
pub mod order_detail;
pub mod order_item;
pub mod order_status;
pub mod product_detail;
pub mod product_publish;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::capability::{
    ORDER_CANCELLATION, ORDER_DETAIL, ORDER_ITEM_MODIFICATION, ORDER_STATUS_CHANGE,
    PRODUCT_DETAIL, PRODUCT_PUBLISH,
};
use super::{AgentResult, TurnInput};
use crate::core::AgentError;
use crate::domain::{Order, Product, ValidationError};
use crate::session::{ConversationContext, EntityKind};
use crate::tools::{ToolCall, ToolInvoker, ToolResult};

pub use order_cancel::OrderCancelPlan;
pub use order_detail::OrderDetailPlan;
pub use order_item::OrderItemPlan;
pub use order_status::OrderStatusPlan;
pub use product_detail::ProductDetailPlan;
pub use product_publish::ProductPublishPlan;

/// 叶子执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafState {
    Idle,
    IntentParsed,
    PreconditionChecked,
    ToolInvoked,
    Succeeded,
    Failed,
    Responded,
}

/// 叶子执行轨迹（诊断与测试用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafTrace {
    pub leaf_id: String,
    pub states: Vec<LeafState>,
    /// 本轮发出的动作调用；澄清或校验失败时为 None
    pub tool_call: Option<ToolCall>,
}

/// 叶子执行结果
#[derive(Debug, Clone)]
pub struct LeafOutcome {
    pub result: AgentResult,
    pub context: ConversationContext,
    pub trace: LeafTrace,
}

/// 叶子智能体
#[async_trait]
pub trait LeafAgent: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(
        &self,
        input: &TurnInput,
        context: &ConversationContext,
    ) -> Result<LeafOutcome, AgentError>;
}

/// 叶子的业务部分
#[async_trait]
pub trait LeafPlan: Send + Sync + 'static {
    type Intent: Send + Sync;

    fn id(&self) -> &'static str;

    /// 从指令与上下文抽取意图；抽不出来时返回澄清问句
    fn parse(&self, message: &str, context: &ConversationContext) -> Result<Self::Intent, String>;

    /// 前置条件检查；可以做只读查询
    async fn check(
        &self,
        intent: &Self::Intent,
        tools: &dyn ToolInvoker,
    ) -> Result<Vec<ValidationError>, AgentError>;

    /// 本轮唯一的动作调用
    fn tool_call(&self, intent: &Self::Intent) -> ToolCall;

    /// 成功后的回复文本与结构化数据；需要时更新选择
    fn on_success(
        &self,
        intent: &Self::Intent,
        data: &Value,
        context: &mut ConversationContext,
    ) -> (String, Option<Value>);

    /// 前置条件不满足时的回复正文（修复提示由组装层追加）
    fn blocked_reply(&self, _intent: &Self::Intent) -> String {
        "请求没有执行。".to_string()
    }

    /// 后台拒绝或故障时的错误条目
    fn on_failure(&self, _intent: &Self::Intent, reason: &str) -> ValidationError {
        ValidationError::new(
            "tool",
            format!("后台执行失败：{reason}"),
            "本次没有修改任何数据，请确认后重新发送指令",
        )
    }
}

/// 用 LeafPlan + ToolInvoker 组成的叶子
pub struct PlannedLeaf<P> {
    plan: P,
    tools: Arc<dyn ToolInvoker>,
}

impl<P: LeafPlan> PlannedLeaf<P> {
    pub fn new(plan: P, tools: Arc<dyn ToolInvoker>) -> Self {
        Self { plan, tools }
    }
}

#[async_trait]
impl<P: LeafPlan> LeafAgent for PlannedLeaf<P> {
    fn id(&self) -> &str {
        self.plan.id()
    }

    async fn execute(
        &self,
        input: &TurnInput,
        context: &ConversationContext,
    ) -> Result<LeafOutcome, AgentError> {
        let id = self.plan.id();
        let mut states = vec![LeafState::Idle];
        let mut next = context.clone();
        next.last_target = Some(id.to_string());

        let finish = |result: AgentResult,
                      context: ConversationContext,
                      mut states: Vec<LeafState>,
                      tool_call: Option<ToolCall>| {
            states.push(LeafState::Responded);
            tracing::debug!(leaf = id, states = ?states, "leaf responded");
            LeafOutcome {
                result,
                context,
                trace: LeafTrace {
                    leaf_id: id.to_string(),
                    states,
                    tool_call,
                },
            }
        };

        let intent = match self.plan.parse(&input.message, context) {
            Ok(intent) => intent,
            Err(question) => {
                tracing::info!(leaf = id, "target unresolved, asking for clarification");
                let result = AgentResult::reply(&input.trace_id, id, question);
                return Ok(finish(result, next, states, None));
            }
        };
        states.push(LeafState::IntentParsed);

        let issues = self.plan.check(&intent, self.tools.as_ref()).await?;
        states.push(LeafState::PreconditionChecked);
        if !issues.is_empty() {
            tracing::info!(leaf = id, issues = issues.len(), "preconditions not met, no tool call");
            let result = AgentResult::reply(&input.trace_id, id, self.plan.blocked_reply(&intent))
                .with_errors(issues);
            return Ok(finish(result, next, states, None));
        }

        if input.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let mut call = self.plan.tool_call(&intent);
        if self.tools.is_mutating(&call.tool_name) {
            call = call.keyed_by(&input.trace_id);
        }
        states.push(LeafState::ToolInvoked);
        let outcome = match self.tools.invoke(&call).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(leaf = id, tool = %call.tool_name, error = %e, "tool invocation failed");
                ToolResult::failed(e.to_string())
            }
        };

        let result = if outcome.success {
            states.push(LeafState::Succeeded);
            let data = outcome.data.unwrap_or(Value::Null);
            let (text, structured) = self.plan.on_success(&intent, &data, &mut next);
            let mut result = AgentResult::reply(&input.trace_id, id, text);
            result.structured_data = structured;
            result
        } else {
            states.push(LeafState::Failed);
            let reason = outcome.failure_reason.unwrap_or_else(|| "未知错误".to_string());
            let error = self.plan.on_failure(&intent, &reason);
            AgentResult::reply(&input.trace_id, id, self.plan.blocked_reply(&intent))
                .with_errors(vec![error])
        };
        Ok(finish(result, next, states, Some(call)))
    }
}

/// 按节点 id 构造内置叶子；未知 id 返回 None
pub fn build_leaf(id: &str, tools: Arc<dyn ToolInvoker>) -> Option<Arc<dyn LeafAgent>> {
    let leaf: Arc<dyn LeafAgent> = match id {
        PRODUCT_DETAIL => Arc::new(PlannedLeaf::new(ProductDetailPlan, tools)),
        PRODUCT_PUBLISH => Arc::new(PlannedLeaf::new(ProductPublishPlan, tools)),
        ORDER_DETAIL => Arc::new(PlannedLeaf::new(OrderDetailPlan, tools)),
        ORDER_ITEM_MODIFICATION => Arc::new(PlannedLeaf::new(OrderItemPlan, tools)),
        ORDER_STATUS_CHANGE => Arc::new(PlannedLeaf::new(OrderStatusPlan, tools)),
        ORDER_CANCELLATION => Arc::new(PlannedLeaf::new(OrderCancelPlan, tools)),
        _ => return None,
    };
    Some(leaf)
}

/// 显式编号优先，其次是同类的当前选择
pub(crate) fn resolve_targets(
    explicit: Vec<String>,
    context: &ConversationContext,
    kind: EntityKind,
) -> Vec<String> {
    if !explicit.is_empty() {
        explicit
    } else {
        context.selected(kind).to_vec()
    }
}

/// 只读查询商品；不存在时为 None
pub(crate) async fn fetch_product(
    tools: &dyn ToolInvoker,
    jancode: &str,
) -> Result<Option<Product>, AgentError> {
    let r = tools
        .invoke(&ToolCall::new("get_product", json!({ "jancode": jancode })))
        .await?;
    decode(r)
}

/// 只读查询订单；不存在时为 None
pub(crate) async fn fetch_order(
    tools: &dyn ToolInvoker,
    order_id: &str,
) -> Result<Option<Order>, AgentError> {
    let r = tools
        .invoke(&ToolCall::new("get_order", json!({ "order_id": order_id })))
        .await?;
    decode(r)
}

fn decode<T: serde::de::DeserializeOwned>(r: ToolResult) -> Result<Option<T>, AgentError> {
    if !r.success {
        return Ok(None);
    }
    let data = r.data.unwrap_or(Value::Null);
    serde_json::from_value(data)
        .map(Some)
        .map_err(|e| AgentError::ToolExecutionFailed(format!("unexpected record shape: {e}")))
}

/// 从 search_* 的返回里取列表
pub(crate) fn records<T: serde::de::DeserializeOwned>(data: &Value, key: &str) -> Vec<T> {
    data.get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// 写工具返回的单条记录
pub(crate) fn records_one<T: serde::de::DeserializeOwned>(data: &Value) -> Option<T> {
    serde_json::from_value(data.clone()).ok()
}

pub(crate) fn contains_any(text: &str, words: &[&str]) -> bool {
    let lower = text.to_lowercase();
    words.iter().any(|w| lower.contains(w))
}


#[cfg(test)]
mod tests {
    use super::test_support::Recording;
    use super::*;

    #[tokio::test]
    async fn test_build_leaf_known_ids() {
        let tools = Recording::seeded();
        for id in [
            PRODUCT_DETAIL,
            PRODUCT_PUBLISH,
            ORDER_DETAIL,
            ORDER_ITEM_MODIFICATION,
            ORDER_STATUS_CHANGE,
            ORDER_CANCELLATION,
        ] {
            let leaf = build_leaf(id, tools.clone()).unwrap();
            assert_eq!(leaf.id(), id);
        }
        assert!(build_leaf("refund", tools).is_none());
    }

    #[tokio::test]
    async fn test_state_sequence_success() {
        let tools = Recording::seeded();
        let leaf = build_leaf(PRODUCT_DETAIL, tools.clone()).unwrap();
        let out = leaf
            .execute(
                &TurnInput::new("为商品A设置分类为'母婴'", "t1"),
                &ConversationContext::new("s", "u"),
            )
            .await
            .unwrap();
        assert_eq!(
            out.trace.states,
            vec![
                LeafState::Idle,
                LeafState::IntentParsed,
                LeafState::PreconditionChecked,
                LeafState::ToolInvoked,
                LeafState::Succeeded,
                LeafState::Responded,
            ]
        );
        let call = out.trace.tool_call.unwrap();
        assert_eq!(call.idempotency_key.as_deref(), Some("t1:update_product"));
        assert_eq!(out.context.last_target.as_deref(), Some(PRODUCT_DETAIL));
    }

    #[tokio::test]
    async fn test_clarification_skips_tools() {
        let tools = Recording::seeded();
        let leaf = build_leaf(ORDER_CANCELLATION, tools.clone()).unwrap();
        let out = leaf
            .execute(&TurnInput::new("把它取消", "t1"), &ConversationContext::new("s", "u"))
            .await
            .unwrap();
        assert_eq!(out.trace.states, vec![LeafState::Idle, LeafState::Responded]);
        assert!(out.result.errors.is_empty());
        assert!(tools.calls.lock().unwrap().is_empty());
    }

    /// 只读调用照常走种子后台，写调用一律超时
    struct TimedOutWrites {
        inner: Arc<Recording>,
        writes: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ToolInvoker for TimedOutWrites {
        async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
            if self.inner.is_mutating(&call.tool_name) {
                self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                return Err(AgentError::ToolTimeout(call.tool_name.clone()));
            }
            self.inner.invoke(call).await
        }

        fn is_mutating(&self, tool_name: &str) -> bool {
            self.inner.is_mutating(tool_name)
        }
    }

    #[tokio::test]
    async fn test_write_failure_reports_once() {
        let tools = Arc::new(TimedOutWrites {
            inner: Recording::seeded(),
            writes: Default::default(),
        });
        let leaf = build_leaf(ORDER_CANCELLATION, tools.clone()).unwrap();
        let mut ctx = ConversationContext::new("s", "u");
        ctx.select(EntityKind::Order, vec!["ORD-1001".into()]);

        let out = leaf
            .execute(&TurnInput::new("把它取消", "t1"), &ctx)
            .await
            .unwrap();

        assert_eq!(out.result.errors.len(), 1);
        assert_eq!(out.result.errors[0].field, "tool");
        assert!(out.trace.states.contains(&LeafState::Failed));
        assert!(!out.trace.states.contains(&LeafState::Succeeded));
        assert_eq!(tools.writes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(out.context.selected_entity_ids, ctx.selected_entity_ids);
        let order = tools.inner.backoffice.order("ORD-1001").await.unwrap();
        assert_eq!(order.order_status, crate::domain::OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancelled_before_tool_call() {
        let tools = Recording::seeded();
        let leaf = build_leaf(ORDER_CANCELLATION, tools.clone()).unwrap();
        let input = TurnInput::new("取消订单ORD-1001", "t1");
        input.cancel.cancel();
        let err = leaf
            .execute(&input, &ConversationContext::new("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(tools.mutating_calls().is_empty());
    }
}
