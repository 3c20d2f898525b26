//! 引擎：一轮请求的完整流程
//!
//! 取会话锁 → 载入上下文 → 总指挥路由 → 组装响应 → 记录轮次与追踪 → 提交上下文。
//!
//! 轮次主体在 spawn 出去的任务里执行并持有会话锁，调用方放弃等待不会打断正在进行的工具调用；
//! 同一会话的下一轮要等这一轮完整结束才能读到上下文。
//! 基础设施故障（分类超时等）返回兜底回复，轮次照常记录，但上下文不提交。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::agents::{Director, TaskRouter, TurnInput};
use crate::core::{RecoveryEngine, SessionSupervisor};
use crate::response::{ResponseAssembler, RouteResponse};
use crate::session::{ContextSnapshot, ConversationContext, ConversationTurn, Language, SessionStore};
use crate::trace::{TraceRecord, TraceRecorder, Vote};

/// 路由请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub message: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub llm_preference: Option<String>,
    /// 调用方自带上下文；缺省时从会话存储读取
    #[serde(default)]
    pub context: Option<ConversationContext>,
}

impl RouteRequest {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            llm_preference: None,
            context: None,
        }
    }
}

/// 重新生成请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerateRequest {
    pub conversation_id: String,
    pub original_user_message: String,
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub llm_preference: Option<String>,
}

/// 评价请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub trace_id: String,
    pub vote: Vote,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateAck {
    pub trace_id: String,
    /// trace 不存在时为 false
    pub accepted: bool,
}

struct Inner {
    director: Arc<Director>,
    store: Arc<dyn SessionStore>,
    traces: Arc<dyn TraceRecorder>,
    supervisor: SessionSupervisor,
    assembler: ResponseAssembler,
    recovery: RecoveryEngine,
    max_context_turns: usize,
}

/// 一轮的额外输入：重新生成时沿用原 conversation_id 并还原原始选择
struct Replay {
    conversation_id: String,
    snapshot: Option<ContextSnapshot>,
}

/// 路由引擎；clone 共享同一份内部状态
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(
        director: Arc<Director>,
        store: Arc<dyn SessionStore>,
        traces: Arc<dyn TraceRecorder>,
        max_context_turns: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                director,
                store,
                traces,
                supervisor: SessionSupervisor::new(),
                assembler: ResponseAssembler::new(),
                recovery: RecoveryEngine::new(),
                max_context_turns: max_context_turns.max(1),
            }),
        }
    }

    /// 处理一条指令
    pub async fn handle(&self, req: RouteRequest) -> RouteResponse {
        self.spawn_turn(req, None).await
    }

    /// 用原轮次的输入重新跑一遍；原轮次不动，新轮次共享 conversation_id、拿新的 trace_id
    pub async fn regenerate(&self, req: RegenerateRequest) -> RouteResponse {
        let original = self
            .inner
            .store
            .original_turn(&req.session_id, &req.conversation_id)
            .await;
        if original.is_none() {
            tracing::warn!(conversation_id = %req.conversation_id, "regenerate on unknown conversation, using current context");
        }
        let replay = Replay {
            conversation_id: req.conversation_id.clone(),
            snapshot: original.map(|t| t.input),
        };
        let route = RouteRequest {
            message: req.original_user_message,
            user_id: req.user_id,
            session_id: req.session_id,
            llm_preference: req.llm_preference,
            context: None,
        };
        self.spawn_turn(route, Some(replay)).await
    }

    /// 只转给追踪记录
    pub async fn evaluate(&self, req: EvaluateRequest) -> EvaluateAck {
        let accepted = self
            .inner
            .traces
            .evaluate(&req.trace_id, req.vote, &req.user_id)
            .await;
        EvaluateAck {
            trace_id: req.trace_id,
            accepted,
        }
    }

    /// 取消该会话正在分类的轮次
    pub fn cancel(&self, session_id: &str) -> bool {
        self.inner.supervisor.cancel(session_id)
    }

    pub fn shutdown(&self) {
        self.inner.supervisor.shutdown();
    }

    /// 清理一次过期会话；返回 (清掉的上下文数, 清掉的空闲锁槽数)
    pub async fn sweep(&self) -> (usize, usize) {
        self.inner.sweep().await
    }

    /// 启动定期清理任务，`shutdown` 或引擎被释放后退出；没有 tokio 运行时则不启动
    pub fn start_sweeper(&self, every: Duration) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime, idle session sweeping disabled");
            return None;
        };
        let stop = self.inner.supervisor.stop_token();
        let inner = Arc::downgrade(&self.inner);
        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = inner.upgrade() else { break };
                inner.sweep().await;
            }
            tracing::debug!("session sweeper stopped");
        }))
    }

    pub async fn history(&self, session_id: &str, limit: Option<usize>) -> Vec<ConversationTurn> {
        self.inner.store.history(session_id, limit).await
    }

    pub async fn context(&self, session_id: &str, user_id: &str) -> ConversationContext {
        self.inner.store.load_context(session_id, user_id).await
    }

    pub async fn trace(&self, trace_id: &str) -> Option<TraceRecord> {
        self.inner.traces.get(trace_id).await
    }

    /// 层级树形展示
    pub fn tree_display(&self) -> String {
        self.inner.director.registry().tree_display()
    }

    async fn spawn_turn(&self, req: RouteRequest, replay: Option<Replay>) -> RouteResponse {
        let trace_id = Uuid::new_v4().to_string();
        let conversation_id = replay
            .as_ref()
            .map(|r| r.conversation_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let language = Language::detect(&req.message);

        let inner = self.inner.clone();
        let task_trace = trace_id.clone();
        let task_conversation = conversation_id.clone();
        let snapshot = replay.and_then(|r| r.snapshot);
        let task = tokio::spawn(async move {
            inner
                .run_turn(req, task_trace, task_conversation, snapshot)
                .await
        });

        match task.await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(trace_id = %trace_id, error = %e, "turn task aborted");
                let err = crate::core::AgentError::ToolExecutionFailed(e.to_string());
                let result = self.inner.recovery.fallback(&err, &trace_id, language);
                self.inner
                    .assembler
                    .assemble(&result, language, &conversation_id)
            }
        }
    }
}

impl Inner {
    async fn sweep(&self) -> (usize, usize) {
        let contexts = self.store.cleanup_expired().await;
        let slots = self.supervisor.prune_idle();
        if contexts + slots > 0 {
            tracing::info!(contexts, slots, "expired sessions cleaned up");
        }
        (contexts, slots)
    }

    async fn run_turn(
        &self,
        req: RouteRequest,
        trace_id: String,
        conversation_id: String,
        snapshot: Option<ContextSnapshot>,
    ) -> RouteResponse {
        let _guard = self.supervisor.lock(&req.session_id).await;
        let cancel = self.supervisor.begin_turn(&req.session_id);

        let mut context = match req.context {
            Some(ctx) => ctx,
            None => self.store.load_context(&req.session_id, &req.user_id).await,
        };
        if let Some(snapshot) = &snapshot {
            context.restore(snapshot);
        }
        if req.llm_preference.is_some() {
            context.llm_preference = req.llm_preference.clone();
        }
        let input_snapshot = context.snapshot();
        context.language = Language::detect(&req.message);
        let language = context.language;

        tracing::info!(
            trace_id = %trace_id,
            session_id = %req.session_id,
            regenerate = snapshot.is_some(),
            "turn started"
        );
        let input = TurnInput::new(req.message.clone(), trace_id.clone()).with_cancel(cancel);
        let outcome = self.director.route(&input, &context).await;
        self.supervisor.end_turn(&req.session_id);

        let (result, route_path, leaf, failure, committed) = match outcome {
            Ok(routed) => (
                routed.result,
                routed.decisions,
                routed.leaf_trace,
                None,
                Some(routed.context),
            ),
            Err(e) => (
                self.recovery.fallback(&e, &trace_id, language),
                Vec::new(),
                None,
                Some(e.to_string()),
                None,
            ),
        };

        let response = self.assembler.assemble(&result, language, &conversation_id);
        let turn = ConversationTurn {
            turn_id: Uuid::new_v4().to_string(),
            session_id: req.session_id.clone(),
            conversation_id: conversation_id.clone(),
            trace_id: trace_id.clone(),
            user_message: req.message.clone(),
            agent_response: response.response.clone(),
            handled_by: result.handled_by.clone(),
            had_errors: result.has_errors(),
            input: input_snapshot,
            created_at: Utc::now(),
        };

        if let Some(mut next) = committed {
            next.push_turn(turn.clone(), self.max_context_turns);
            self.store.save_context(next).await;
        }
        self.store.append_turn(turn.clone()).await;
        self.traces
            .record(TraceRecord {
                trace_id: trace_id.clone(),
                session_id: req.session_id.clone(),
                conversation_id,
                user_message: req.message,
                route_path,
                handled_by: result.handled_by,
                leaf,
                had_errors: turn.had_errors,
                failure,
                vote: None,
                voted_by: None,
                created_at: turn.created_at,
            })
            .await;
        tracing::info!(trace_id = %trace_id, had_errors = turn.had_errors, "turn finished");
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::EngineBuilder;
    use crate::tools::Backoffice;

    fn engine() -> (Engine, Arc<Backoffice>) {
        let bo = Arc::new(Backoffice::seeded());
        let engine = EngineBuilder::new(AppConfig::default())
            .with_backoffice(bo.clone())
            .build()
            .unwrap();
        (engine, bo)
    }

    #[tokio::test]
    async fn test_selection_carries_to_next_turn() {
        let (engine, bo) = engine();
        let first = engine
            .handle(RouteRequest::new("s1", "u1", "显示所有未上架商品"))
            .await;
        assert!(first.errors.is_empty(), "{}", first.response);
        let ctx = engine.context("s1", "u1").await;
        assert!(ctx.selected_entity_ids.contains(&"A".to_string()));
        assert_eq!(ctx.turns.len(), 1);

        // A 缺分类与库存，整批上架被拦下
        let second = engine.handle(RouteRequest::new("s1", "u1", "把它们都上架")).await;
        assert!(!second.errors.is_empty());
        assert!(second.response.contains("请先处理以下问题"));
        assert_eq!(bo.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_regenerate_keeps_original_turn() {
        let (engine, _) = engine();
        let first = engine.handle(RouteRequest::new("s1", "u1", "查看订单ORD-1001")).await;
        let regen = engine
            .regenerate(RegenerateRequest {
                conversation_id: first.conversation_id.clone(),
                original_user_message: "查看订单ORD-1001".into(),
                session_id: "s1".into(),
                user_id: "u1".into(),
                llm_preference: None,
            })
            .await;
        assert_eq!(regen.conversation_id, first.conversation_id);
        assert_ne!(regen.trace_id, first.trace_id);
        let history = engine.history("s1", None).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].trace_id, first.trace_id);
    }

    #[tokio::test]
    async fn test_regenerate_ignores_other_sessions_conversation() {
        let (engine, _) = engine();
        engine.handle(RouteRequest::new("s1", "u1", "显示所有未上架商品")).await;
        let foreign = engine.history("s1", None).await[0].conversation_id.clone();

        // s1 的选择里有缺分类的商品A；若被带进 s2，这里会出现修复提示
        let resp = engine
            .regenerate(RegenerateRequest {
                conversation_id: foreign,
                original_user_message: "把它们都上架".into(),
                session_id: "s2".into(),
                user_id: "u2".into(),
                llm_preference: None,
            })
            .await;
        assert!(resp.errors.is_empty(), "{}", resp.response);
        let s2 = engine.context("s2", "u2").await;
        assert_eq!(s2.selection_kind, None);
        assert!(s2.selected_entity_ids.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_sessions() {
        let mut config = AppConfig::default();
        config.app.session_timeout_secs = 0;
        let engine = EngineBuilder::new(config).build().unwrap();
        engine.handle(RouteRequest::new("s1", "u1", "查看订单ORD-1001")).await;
        assert_eq!(engine.context("s1", "u1").await.turns.len(), 1);

        assert_eq!(engine.sweep().await, (1, 1));
        assert!(engine.context("s1", "u1").await.turns.is_empty());
        // 轮次记录不受影响
        assert_eq!(engine.history("s1", None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_runs_until_shutdown() {
        let mut config = AppConfig::default();
        config.app.session_timeout_secs = 0;
        config.app.cleanup_interval_secs = 0;
        let engine = EngineBuilder::new(config).build().unwrap();
        let sweeper = engine.start_sweeper(Duration::from_millis(10)).unwrap();

        engine.handle(RouteRequest::new("s1", "u1", "查看订单ORD-1001")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.context("s1", "u1").await.turns.is_empty());

        engine.shutdown();
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_evaluate_unknown_trace() {
        let (engine, _) = engine();
        let ack = engine
            .evaluate(EvaluateRequest {
                trace_id: "nope".into(),
                vote: Vote::Good,
                user_id: "u1".into(),
            })
            .await;
        assert!(!ack.accepted);
    }
}
