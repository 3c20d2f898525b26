//! 关键词分类器（确定性，不依赖外部服务）
//!
//! 打分规则：
//! - 领域名词（primary_domains）命中记 2 分，普通关键词记 1 分，同一个词对同一候选只记一次
//! - 长词优先占位：「未上架」命中后，其中的「上架」不再计分；「取消上架」同理压住「取消」
//! - 置信度只看关键词分：第二名为 0 时为 0.6 + 0.1 × 最高分（上限 0.95），否则为 最高 / (最高 + 第二)
//! - 同分时按与示例指令的分词相似度决定谁排第一
//! - 没有任何命中：寒暄返回「无需业务动作」；带指代词时沿用上一轮目标所在分支

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::classifier::{Candidate, Classification, ClassifierProvider};
use super::tokenizer::best_similarity;
use crate::core::AgentError;
use crate::session::reference::mentions_selection;
use crate::session::ConversationContext;

const PRIMARY_WEIGHT: f32 = 2.0;
const KEYWORD_WEIGHT: f32 = 1.0;
const GREETING_CONFIDENCE: f32 = 0.9;
const CONTINUITY_CONFIDENCE: f32 = 0.7;

const GREETINGS: &[&str] = &[
    "你好", "您好", "帮助", "能做什么", "可以做什么", "hello", "help", "what can you do",
    "こんにちは", "ヘルプ",
];

/// 关键词分类器
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn is_greeting(lower: &str) -> bool {
        lower.trim() == "hi" || GREETINGS.iter().any(|g| lower.contains(g))
    }

    /// 每个候选的关键词得分（与 candidates 同序）
    pub fn scores(text: &str, candidates: &[Candidate]) -> Vec<f32> {
        let lower = text.to_lowercase();

        // 词 → [(候选下标, 权重)]
        let mut terms: BTreeMap<String, Vec<(usize, f32)>> = BTreeMap::new();
        for (i, c) in candidates.iter().enumerate() {
            let weighted = c
                .capability
                .primary_domains
                .iter()
                .map(|t| (t, PRIMARY_WEIGHT))
                .chain(c.capability.keywords.iter().map(|t| (t, KEYWORD_WEIGHT)));
            for (term, weight) in weighted {
                let term = term.trim().to_lowercase();
                if term.is_empty() {
                    continue;
                }
                let owners = terms.entry(term).or_default();
                match owners.iter_mut().find(|(idx, _)| *idx == i) {
                    Some(owner) => owner.1 = owner.1.max(weight),
                    None => owners.push((i, weight)),
                }
            }
        }

        let mut ordered: Vec<(String, Vec<(usize, f32)>)> = terms.into_iter().collect();
        ordered.sort_by_key(|(term, _)| std::cmp::Reverse(term.chars().count()));

        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut scores = vec![0.0; candidates.len()];
        for (term, owners) in ordered {
            let spans: Vec<(usize, usize)> = lower
                .match_indices(term.as_str())
                .map(|(start, m)| (start, start + m.len()))
                .filter(|&(s, e)| !claimed.iter().any(|&(cs, ce)| s < ce && cs < e))
                .collect();
            if spans.is_empty() {
                continue;
            }
            for (idx, weight) in owners {
                scores[idx] += weight;
            }
            claimed.extend(spans);
        }
        scores
    }

    fn rationale(candidates: &[Candidate], scores: &[f32]) -> String {
        let parts: Vec<String> = candidates
            .iter()
            .zip(scores)
            .map(|(c, s)| format!("{}={}", c.node_id, s))
            .collect();
        format!("keyword scores: {}", parts.join(", "))
    }
}

#[async_trait]
impl ClassifierProvider for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(
        &self,
        text: &str,
        candidates: &[Candidate],
        context: &ConversationContext,
    ) -> Result<Classification, AgentError> {
        if candidates.is_empty() {
            return Ok(Classification::unknown("no candidates"));
        }
        let lower = text.to_lowercase();
        let scores = Self::scores(text, candidates);
        let similarity: Vec<f32> = candidates
            .iter()
            .map(|c| best_similarity(text, &c.capability.example_commands))
            .collect();

        // 按 (关键词分, 相似度) 排序取前两名
        let mut ranked: Vec<usize> = (0..candidates.len()).collect();
        ranked.sort_by(|&a, &b| {
            scores[b]
                .total_cmp(&scores[a])
                .then(similarity[b].total_cmp(&similarity[a]))
        });
        let best = ranked[0];
        let best_score = scores[best];
        let second_score = ranked.get(1).map(|&i| scores[i]).unwrap_or(0.0);

        if best_score >= KEYWORD_WEIGHT {
            let confidence = if second_score <= 0.0 {
                (0.6 + 0.1 * best_score).min(0.95)
            } else {
                best_score / (best_score + second_score)
            };
            return Ok(Classification::new(
                Some(candidates[best].node_id.clone()),
                confidence,
                Self::rationale(candidates, &scores),
            ));
        }

        if Self::is_greeting(&lower) {
            return Ok(Classification::new(None, GREETING_CONFIDENCE, "greeting or help request"));
        }

        if mentions_selection(text) {
            if let Some(last) = context.last_target.as_deref() {
                if let Some(c) = candidates.iter().find(|c| c.contains(last)) {
                    return Ok(Classification::new(
                        Some(c.node_id.clone()),
                        CONTINUITY_CONFIDENCE,
                        format!("refers to previous target {last}"),
                    ));
                }
            }
        }

        // 只剩分词相似度：给出倾向，但置信度不会过阈值
        if similarity[best] > 0.0 {
            return Ok(Classification::new(
                Some(candidates[best].node_id.clone()),
                similarity[best] * 0.5,
                format!("example similarity {:.2}", similarity[best]),
            ));
        }
        Ok(Classification::unknown("no keyword matched"))
    }
}
