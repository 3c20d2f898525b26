//! 最终响应组装
//!
//! 叶子给出的 `AgentResult` 一路原样上传，只在这里组装一次：
//! 有 errors 时把每条 repair_hint 原文附在回复后面，引导语跟随会话语言。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::AgentResult;
use crate::domain::ValidationError;
use crate::session::Language;

/// 对外响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub response: String,
    pub trace_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,
}

fn repair_heading(language: Language) -> &'static str {
    match language {
        Language::Zh => "请先处理以下问题：",
        Language::Ja => "以下の問題を解決してください：",
        Language::En => "Please resolve the following first:",
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseAssembler;

impl ResponseAssembler {
    pub fn new() -> Self {
        Self
    }

    /// 回复正文：原回复 + 修复清单
    pub fn render_text(&self, result: &AgentResult, language: Language) -> String {
        if result.errors.is_empty() {
            return result.reply_text.clone();
        }
        let mut text = result.reply_text.trim_end().to_string();
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(repair_heading(language));
        for (i, e) in result.errors.iter().enumerate() {
            text.push_str(&format!("\n{}. {}\n   → {}", i + 1, e.message, e.repair_hint));
        }
        text
    }

    pub fn assemble(
        &self,
        result: &AgentResult,
        language: Language,
        conversation_id: &str,
    ) -> RouteResponse {
        RouteResponse {
            response: self.render_text(result, language),
            trace_id: result.trace_id.clone(),
            conversation_id: conversation_id.to_string(),
            errors: result.errors.clone(),
            structured_data: result.structured_data.clone(),
        }
    }
}
