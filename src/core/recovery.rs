//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，并生成对用户的兜底结果。
//! 兜底结果不带 errors（基础设施故障不是用户能修的问题），trace_id 保留。

use crate::agents::AgentResult;
use crate::core::{AgentError, RecoveryAction};
use crate::session::Language;

/// 基础设施故障 → 恢复动作 → 兜底回复
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ClassifierUnavailable(_)
            | AgentError::ClassifierTimeout(_)
            | AgentError::Llm(_) => RecoveryAction::ServiceUnavailable,
            AgentError::ToolExecutionFailed(_)
            | AgentError::ToolTimeout(_)
            | AgentError::UnknownTool(_) => RecoveryAction::RetryLater,
            AgentError::Cancelled => RecoveryAction::Abort,
            AgentError::Hierarchy(_) | AgentError::ConfigError(_) => RecoveryAction::Misconfigured,
        }
    }

    /// 给用户的兜底结果
    pub fn fallback(&self, err: &AgentError, trace_id: &str, language: Language) -> AgentResult {
        let action = self.handle(err);
        tracing::warn!(trace_id, error = %err, action = ?action, "turn failed, returning fallback");
        let text = match (action, language) {
            (RecoveryAction::ServiceUnavailable, Language::Zh) => {
                "服务暂时不可用，请稍后再试。本次没有修改任何数据。"
            }
            (RecoveryAction::ServiceUnavailable, Language::Ja) => {
                "サービスが一時的に利用できません。しばらくしてから再度お試しください。データは変更されていません。"
            }
            (RecoveryAction::ServiceUnavailable, Language::En) => {
                "The service is temporarily unavailable. Please try again later. No data was changed."
            }
            (RecoveryAction::RetryLater, Language::Zh) => "后台暂时无法访问，请稍后重新发送指令。",
            (RecoveryAction::RetryLater, Language::Ja) => {
                "バックオフィスに接続できません。しばらくしてから再送してください。"
            }
            (RecoveryAction::RetryLater, Language::En) => {
                "The back office is unreachable right now. Please resend the instruction later."
            }
            (RecoveryAction::Abort, Language::Zh) => "本次请求已取消，没有修改任何数据。",
            (RecoveryAction::Abort, Language::Ja) => "リクエストはキャンセルされました。データは変更されていません。",
            (RecoveryAction::Abort, Language::En) => "The request was cancelled. No data was changed.",
            (RecoveryAction::Misconfigured, Language::Zh) => "服务配置异常，请联系管理员。",
            (RecoveryAction::Misconfigured, Language::Ja) => {
                "サービスの設定に問題があります。管理者に連絡してください。"
            }
            (RecoveryAction::Misconfigured, Language::En) => {
                "The service is misconfigured. Please contact an administrator."
            }
        };
        AgentResult {
            reply_text: text.to_string(),
            structured_data: None,
            errors: Vec::new(),
            trace_id: trace_id.to_string(),
            handled_by: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_classifier_failures_are_unavailable() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&AgentError::ClassifierTimeout(30)),
            RecoveryAction::ServiceUnavailable
        );
        assert_eq!(
            engine.handle(&AgentError::Llm(LlmError::RateLimited { retry_after_ms: 100 })),
            RecoveryAction::ServiceUnavailable
        );
        assert_eq!(
            engine.handle(&AgentError::ToolTimeout("get_order".into())),
            RecoveryAction::RetryLater
        );
        assert_eq!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort);
    }

    #[test]
    fn test_fallback_keeps_trace_and_language() {
        let engine = RecoveryEngine::new();
        let r = engine.fallback(&AgentError::ClassifierTimeout(30), "t9", Language::En);
        assert_eq!(r.trace_id, "t9");
        assert!(r.errors.is_empty());
        assert!(r.reply_text.contains("temporarily unavailable"));
        let zh = engine.fallback(&AgentError::ClassifierUnavailable("x".into()), "t9", Language::Zh);
        assert!(zh.reply_text.contains("服务暂时不可用"));
    }
}
