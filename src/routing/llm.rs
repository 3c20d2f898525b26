//! LLM 分类器：把候选能力渲染进 system prompt，要求模型只输出一个 JSON 对象
//!
//! 模型按会话的 `llm_preference` 从 ModelRouter 选取。输出里的目标不在候选中时按「无目标、零置信度」处理。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::classifier::{Candidate, Classification, ClassifierProvider};
use crate::core::AgentError;
use crate::llm::{LlmError, Message, ModelRouter};
use crate::session::ConversationContext;

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    rationale: String,
}

/// 从模型输出中取出 JSON（```json 代码块或第一个 { 到最后一个 }）
fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析模型输出；无法解析视为分类器不可用
pub fn parse_classification(
    output: &str,
    candidates: &[Candidate],
) -> Result<Classification, AgentError> {
    let json = extract_json(output).ok_or_else(|| {
        AgentError::ClassifierUnavailable(format!("no JSON in classifier output: {output}"))
    })?;
    let raw: RawClassification = serde_json::from_str(json)
        .map_err(|e| AgentError::ClassifierUnavailable(format!("{e}: {json}")))?;

    let target = raw
        .target
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t != "null" && t != "none");
    match target {
        Some(t) if !candidates.iter().any(|c| c.node_id == t) => {
            tracing::warn!(target = %t, "classifier chose a node outside the candidates");
            Ok(Classification::unknown(format!("unknown target {t}")))
        }
        target => Ok(Classification::new(target, raw.confidence, raw.rationale)),
    }
}

/// LLM 分类器
pub struct LlmClassifier {
    models: Arc<ModelRouter>,
}

impl LlmClassifier {
    pub fn new(models: Arc<ModelRouter>) -> Self {
        Self { models }
    }

    fn system_prompt(candidates: &[Candidate]) -> String {
        let described: Vec<String> = candidates
            .iter()
            .map(|c| c.capability.render(&c.node_id))
            .collect();
        format!(
            "你是电商后台的指令分派器。根据用户指令，从下列候选中选出最合适的一个。\n\n\
             候选：\n{}\n\n\
             只输出一个 JSON 对象，不要解释：\n\
             {{\"target\": \"<候选 id 或 null>\", \"confidence\": <0 到 1>, \"rationale\": \"<一句话理由>\"}}\n\
             用户只是打招呼或询问能做什么时，target 为 null 且 confidence 较高；\
             无法判断时 confidence 给低值。",
            described.join("\n")
        )
    }

    fn user_prompt(text: &str, context: &ConversationContext) -> String {
        let mut prompt = format!("用户指令：{text}");
        if !context.selected_entity_ids.is_empty() {
            let kind = context.selection_kind.map(|k| k.label()).unwrap_or("实体");
            prompt.push_str(&format!(
                "\n当前选中的{kind}：{}",
                context.selected_entity_ids.join("、")
            ));
        }
        if let Some(last) = &context.last_target {
            prompt.push_str(&format!("\n上一轮由 {last} 处理"));
        }
        prompt
    }
}

#[async_trait]
impl ClassifierProvider for LlmClassifier {
    fn name(&self) -> &str {
        "llm"
    }

    async fn classify(
        &self,
        text: &str,
        candidates: &[Candidate],
        context: &ConversationContext,
    ) -> Result<Classification, AgentError> {
        let client = self
            .models
            .select(context.llm_preference.as_deref())
            .ok_or_else(|| AgentError::ClassifierUnavailable("no llm model configured".into()))?;

        let messages = vec![
            Message::system(Self::system_prompt(candidates)),
            Message::user(Self::user_prompt(text, context)),
        ];
        let output = client.complete(&messages).await.map_err(|e| match e {
            LlmError::RateLimited { .. } => AgentError::Llm(e),
            other => AgentError::ClassifierUnavailable(other.to_string()),
        })?;
        let classification = parse_classification(&output, candidates)?;
        tracing::debug!(
            target_node = ?classification.target_node_id,
            confidence = classification.confidence,
            rationale = %classification.rationale,
            "llm classification"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::AgentRegistry;
    use crate::llm::MockLlmClient;

    fn router_with(client: MockLlmClient) -> (Arc<ModelRouter>, Arc<MockLlmClient>) {
        let client = Arc::new(client);
        let mut router = ModelRouter::new("mock");
        router.add_model("mock", client.clone());
        (Arc::new(router), client)
    }

    #[test]
    fn test_parse_fenced_and_bare() {
        let reg = AgentRegistry::builtin().unwrap();
        let cands = reg.candidates("director");
        let fenced = "好的\n```json\n{\"target\": \"order_center\", \"confidence\": 0.8}\n```";
        let c = parse_classification(fenced, &cands).unwrap();
        assert_eq!(c.target_node_id.as_deref(), Some("order_center"));

        let bare = "结果：{\"target\": null, \"confidence\": 0.9, \"rationale\": \"greeting\"}";
        let c = parse_classification(bare, &cands).unwrap();
        assert!(c.target_node_id.is_none());
        assert_eq!(c.confidence, 0.9);
    }

    #[test]
    fn test_parse_unknown_target_and_garbage() {
        let reg = AgentRegistry::builtin().unwrap();
        let cands = reg.candidates("director");
        let c = parse_classification(r#"{"target": "billing", "confidence": 0.99}"#, &cands)
            .unwrap();
        assert!(c.target_node_id.is_none());
        assert_eq!(c.confidence, 0.0);

        assert!(matches!(
            parse_classification("我不知道", &cands),
            Err(AgentError::ClassifierUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_prompt_carries_candidates_and_selection() {
        let (router, client) = router_with(MockLlmClient::with_replies([
            r#"{"target": "product_center", "confidence": 0.85, "rationale": "商品"}"#,
        ]));
        let reg = AgentRegistry::builtin().unwrap();
        let mut ctx = ConversationContext::new("s", "u");
        ctx.select(crate::session::EntityKind::Product, vec!["A".into()]);

        let c = LlmClassifier::new(router)
            .classify("上架它", &reg.candidates("director"), &ctx)
            .await
            .unwrap();
        assert_eq!(c.target_node_id.as_deref(), Some("product_center"));

        let request = client.last_request().unwrap();
        assert!(request[0].content.contains("product_center"));
        assert!(request[1].content.contains("当前选中的商品：A"));
    }

    #[tokio::test]
    async fn test_llm_error_maps_to_unavailable() {
        let (router, client) = router_with(MockLlmClient::new());
        client.push_error(LlmError::Api("boom".into()));
        let reg = AgentRegistry::builtin().unwrap();
        let err = LlmClassifier::new(router)
            .classify("上架商品A", &reg.candidates("director"), &ConversationContext::new("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ClassifierUnavailable(_)));
    }
}
