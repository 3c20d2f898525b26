//! OpenAI 兼容端点客户端
//!
//! OpenAI、DeepSeek、Ollama 都走 chat completions 协议，只有 base_url、默认模型与密钥来源不同。
//! 分类只需要一次非流式补全，temperature 固定为 0。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Ollama 不校验密钥，但请求头里必须有值
const OLLAMA_KEY: &str = "ollama";

/// 从候选环境变量里取第一个非空值
fn key_from_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .find(|v| !v.trim().is_empty())
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl OpenAiClient {
    /// `api_key` 为空时读 `OPENAI_API_KEY`；都没有时请求会被端点拒绝，分类器据此降级
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let key = api_key
            .map(str::to_string)
            .or_else(|| key_from_env(&["OPENAI_API_KEY"]))
            .unwrap_or_default();
        let mut config = OpenAIConfig::new().with_api_key(key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout: Duration::from_secs(60),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
        }
    }

    /// DeepSeek：模型为空时用 `deepseek-chat`，密钥依次读 `DEEPSEEK_API_KEY`、`OPENAI_API_KEY`
    pub fn deepseek(model: &str, api_key: Option<&str>) -> Self {
        let model = if model.is_empty() { DEEPSEEK_CHAT } else { model };
        let key = api_key
            .map(str::to_string)
            .or_else(|| key_from_env(&["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]));
        Self::new(Some(DEEPSEEK_BASE_URL), model, key.as_deref())
    }

    /// 本地 Ollama
    pub fn ollama(base_url: Option<&str>, model: &str) -> Self {
        Self::new(
            Some(base_url.unwrap_or(OLLAMA_BASE_URL)),
            model,
            Some(OLLAMA_KEY),
        )
    }

    /// 单次请求超时；0 表示沿用默认的 60 秒
    pub fn with_timeout(mut self, secs: u64) -> Self {
        if secs > 0 {
            self.timeout = Duration::from_secs(secs);
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_message(m: &Message) -> Result<ChatCompletionRequestMessage, LlmError> {
        let content = m.content.clone();
        let built = match m.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()
                .map(ChatCompletionRequestMessage::System),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()
                .map(ChatCompletionRequestMessage::User),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()
                .map(ChatCompletionRequestMessage::Assistant),
        };
        built.map_err(|e| LlmError::Request(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let messages = messages
            .iter()
            .map(Self::request_message)
            .collect::<Result<Vec<_>, _>>()?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .temperature(0.0)
            .messages(messages)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let chat = self.client.chat();
        let response = tokio::time::timeout(self.timeout, chat.create(request))
            .await
            .map_err(|_| LlmError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.prompt_tokens
                .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
            self.completion_tokens
                .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
        }
        tracing::debug!(model = %self.model, choices = response.choices.len(), "chat completion");

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_presets() {
        let ds = OpenAiClient::deepseek("", Some("sk-test"));
        assert_eq!(ds.model(), DEEPSEEK_CHAT);
        let local = OpenAiClient::ollama(None, "qwen3:30b").with_timeout(0);
        assert_eq!(local.model(), "qwen3:30b");
        assert_eq!(local.timeout, Duration::from_secs(60));
        assert_eq!(local.token_usage(), (0, 0, 0));
    }

    #[test]
    fn test_request_message_roles() {
        for m in [
            Message::system("你是路由助手"),
            Message::user("上架商品A"),
            Message::assistant("{}"),
        ] {
            assert!(OpenAiClient::request_message(&m).is_ok());
        }
    }
}
