//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，invoke 时在超时内调用工具并输出结构化审计日志（JSON）。
//! 只读工具失败或超时按配置重试；写工具只调用一次，去重键透传给后台。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolCall, ToolInvoker, ToolRegistry, ToolResult};

/// 透传给写工具的去重键字段
pub const IDEMPOTENCY_ARG: &str = "_idempotency_key";

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolResult / AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    read_retries: u32,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            read_retries: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    async fn call_once(&self, call: &ToolCall, mutating: bool) -> Result<ToolResult, AgentError> {
        let tool = self
            .registry
            .get(&call.tool_name)
            .ok_or_else(|| AgentError::UnknownTool(call.tool_name.clone()))?;

        let mut args = call.args.clone();
        if mutating {
            if let (Some(key), Value::Object(map)) = (&call.idempotency_key, &mut args) {
                map.insert(IDEMPOTENCY_ARG.to_string(), Value::String(key.clone()));
            }
        }

        let start = Instant::now();
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "rejected"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool_name,
            "mutating": mutating,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "idempotency_key": call.idempotency_key,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(data)) => Ok(ToolResult::ok(data)),
            Ok(Err(reason)) => Ok(ToolResult::failed(reason)),
            Err(_) => Err(AgentError::ToolTimeout(call.tool_name.clone())),
        }
    }
}

#[async_trait]
impl ToolInvoker for ToolExecutor {
    /// 写工具：一次；只读工具：超时或被拒时最多重试 read_retries 次
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        let mutating = self.is_mutating(&call.tool_name);
        let attempts = if mutating { 1 } else { self.read_retries + 1 };

        let mut last = self.call_once(call, mutating).await;
        for attempt in 1..attempts {
            match &last {
                Ok(r) if r.success => break,
                Err(AgentError::UnknownTool(_)) => break,
                _ => {}
            }
            tracing::debug!(tool = %call.tool_name, attempt, "retrying read-only tool");
            last = self.call_once(call, mutating).await;
        }
        last
    }

    fn is_mutating(&self, tool_name: &str) -> bool {
        self.registry
            .get(tool_name)
            .map(|t| t.mutating())
            .unwrap_or(false)
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
