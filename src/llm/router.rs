//! 模型路由：按会话的 `llm_preference` 选择客户端
//!
//! 目录来自配置 `[[llm.models]]`；每个条目在启动时构造一次客户端，之后只读共享。
//! 偏好为空或未知时退回 `default_model`。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{LlmModelEntry, LlmSection};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};

/// 模型目录 + 默认值
pub struct ModelRouter {
    models: BTreeMap<String, Arc<dyn LlmClient>>,
    default_model: String,
}

impl ModelRouter {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            models: BTreeMap::new(),
            default_model: default_model.into(),
        }
    }

    /// 根据 [llm] 段构建；未知 provider 的条目跳过并告警
    pub fn from_config(cfg: &LlmSection) -> Self {
        let mut router = Self::new(cfg.default_model.clone());
        for entry in &cfg.models {
            match create_client(entry, cfg.request_timeout_secs) {
                Some(client) => {
                    tracing::debug!(value = %entry.value, provider = %entry.provider, "llm model registered");
                    router.add_model(entry.value.clone(), client);
                }
                None => tracing::warn!(
                    value = %entry.value,
                    provider = %entry.provider,
                    "unknown llm provider, model skipped"
                ),
            }
        }
        if !router.models.contains_key(&router.default_model) {
            tracing::warn!(default = %router.default_model, "default llm model not in catalogue, using mock");
            router.add_model(router.default_model.clone(), Arc::new(MockLlmClient::new()));
        }
        router
    }

    /// 添加 / 替换模型
    pub fn add_model(&mut self, value: impl Into<String>, client: Arc<dyn LlmClient>) {
        self.models.insert(value.into(), client);
    }

    /// 按偏好选择客户端；偏好未知时退回默认模型
    pub fn select(&self, preference: Option<&str>) -> Option<Arc<dyn LlmClient>> {
        if let Some(pref) = preference {
            if let Some(client) = self.models.get(pref) {
                return Some(Arc::clone(client));
            }
            tracing::warn!(preference = %pref, "unknown llm preference, falling back to default");
        }
        self.models.get(&self.default_model).cloned()
    }

    /// 目录中所有选择值（有序）
    pub fn values(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

fn create_client(entry: &LlmModelEntry, timeout_secs: u64) -> Option<Arc<dyn LlmClient>> {
    let api_key = entry
        .api_key_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok());
    let client = match entry.provider.to_lowercase().as_str() {
        "openai" => {
            if api_key.is_none() {
                tracing::warn!(value = %entry.value, "no API key for openai model");
            }
            OpenAiClient::new(entry.base_url.as_deref(), &entry.model, api_key.as_deref())
        }
        "deepseek" => OpenAiClient::deepseek(&entry.model, api_key.as_deref()),
        "ollama" => OpenAiClient::ollama(entry.base_url.as_deref(), &entry.model),
        "mock" => return Some(Arc::new(MockLlmClient::new())),
        _ => return None,
    };
    Some(Arc::new(client.with_timeout(timeout_secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_preference_and_fallback() {
        let mut router = ModelRouter::new("mock");
        router.add_model("mock", Arc::new(MockLlmClient::new()));
        router.add_model("other", Arc::new(MockLlmClient::new()));

        let other = router.select(Some("other")).unwrap();
        let direct = router.models.get("other").unwrap();
        assert!(Arc::ptr_eq(&other, direct));

        let fallback = router.select(Some("不存在")).unwrap();
        assert!(Arc::ptr_eq(&fallback, router.models.get("mock").unwrap()));
        assert!(router.select(None).is_some());
    }

    #[test]
    fn test_from_config_skips_unknown_provider() {
        let mut cfg = LlmSection::default();
        cfg.models.push(LlmModelEntry {
            value: "weird".into(),
            provider: "carrier-pigeon".into(),
            model: String::new(),
            base_url: None,
            api_key_env: None,
        });
        let router = ModelRouter::from_config(&cfg);
        assert!(!router.values().contains(&"weird"));
        assert!(router.values().contains(&"mock"));
        assert!(router.values().contains(&"ollama_qwen3"));
    }

    #[test]
    fn test_missing_default_gets_mock() {
        let cfg = LlmSection {
            default_model: "nothing".into(),
            request_timeout_secs: 5,
            models: vec![],
        };
        let router = ModelRouter::from_config(&cfg);
        assert_eq!(router.default_model(), "nothing");
        assert!(router.select(None).is_some());
    }
}
