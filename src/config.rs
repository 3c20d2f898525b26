//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DESK__*` 覆盖（双下划线表示嵌套，如 `DESK__ROUTING__CONFIDENCE_THRESHOLD=0.7`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub routing: RoutingSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub hierarchy: HierarchySection,
}

/// [app] 段：应用名、对话窗口
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 上下文中保留的最近轮数（分类器只看这些）
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
    /// 会话空闲多久后可被清理（秒）
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// 清理过期会话的间隔（秒）；0 表示不清理
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: default_max_context_turns(),
            session_timeout_secs: default_session_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_max_context_turns() -> usize {
    20
}

fn default_session_timeout_secs() -> u64 {
    3600
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

/// 分类器实现选择
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// 纯关键词，离线可用、结果确定
    #[default]
    Keyword,
    /// 只用 LLM
    Llm,
    /// 先关键词，置信度不足再问 LLM
    Chain,
}

/// [routing] 段：置信度阈值、分类超时
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingSection {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_classifier_timeout_secs")]
    pub classifier_timeout_secs: u64,
    #[serde(default)]
    pub classifier: ClassifierKind,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            classifier_timeout_secs: default_classifier_timeout_secs(),
            classifier: ClassifierKind::default(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.6
}

fn default_classifier_timeout_secs() -> u64 {
    30
}

/// [llm] 段：模型目录与默认模型
///
/// `llm_preference` 取 `models[].value`；找不到时退回 `default_model`。
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_models")]
    pub models: Vec<LlmModelEntry>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            request_timeout_secs: default_request_timeout(),
            models: default_models(),
        }
    }
}

/// [[llm.models]] 条目
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LlmModelEntry {
    /// 对外暴露的选择值（即 llm_preference）
    pub value: String,
    /// openai / deepseek / ollama / mock
    pub provider: String,
    #[serde(default)]
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    pub api_key_env: Option<String>,
}

fn default_model() -> String {
    "mock".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_models() -> Vec<LlmModelEntry> {
    vec![
        LlmModelEntry {
            value: "openai_gpt4o_mini".into(),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            base_url: None,
            api_key_env: Some("OPENAI_API_KEY".into()),
        },
        LlmModelEntry {
            value: "deepseek_chat".into(),
            provider: "deepseek".into(),
            model: "deepseek-chat".into(),
            base_url: None,
            api_key_env: Some("DEEPSEEK_API_KEY".into()),
        },
        LlmModelEntry {
            value: "ollama_qwen3".into(),
            provider: "ollama".into(),
            model: "qwen3:30b".into(),
            base_url: Some("http://localhost:11434/v1".into()),
            api_key_env: None,
        },
        LlmModelEntry {
            value: "mock".into(),
            provider: "mock".into(),
            model: String::new(),
            base_url: None,
            api_key_env: None,
        },
    ]
}

/// [tools] 段：工具超时与只读重试
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 只读工具失败时的重试次数；写操作从不重试
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            read_retries: default_read_retries(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_read_retries() -> u32 {
    2
}

/// [hierarchy] 段：层级定义文件；未设置时使用内置层级
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HierarchySection {
    pub path: Option<PathBuf>,
}

/// 默认配置文件的查找位置，取第一个存在的
const DEFAULT_LOCATIONS: [&str; 3] = ["config/default.toml", "../config/default.toml", "default.toml"];

/// 加载配置：默认文件 → 显式文件 → `DESK__*` 环境变量，后者覆盖前者
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(found) = DEFAULT_LOCATIONS.iter().map(Path::new).find(|p| p.exists()) {
        builder = builder.add_source(config::File::from(found).required(false));
    }
    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path));
    }
    let env = config::Environment::with_prefix("DESK")
        .separator("__")
        .try_parsing(true);

    let cfg: AppConfig = builder.add_source(env).build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

impl AppConfig {
    /// 拒绝会让路由失效的取值
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let threshold = self.routing.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(config::ConfigError::Message(format!(
                "routing.confidence_threshold must be within [0, 1], got {threshold}"
            )));
        }
        if self.routing.classifier_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "routing.classifier_timeout_secs must be positive".into(),
            ));
        }
        if self.app.max_context_turns == 0 {
            return Err(config::ConfigError::Message(
                "app.max_context_turns must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_sections_missing() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_context_turns, 20);
        assert!((cfg.routing.confidence_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(cfg.routing.classifier, ClassifierKind::Keyword);
        assert_eq!(cfg.tools.read_retries, 2);
        assert!(cfg.llm.models.iter().any(|m| m.value == "mock"));
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[routing]\nconfidence_threshold = 0.75\nclassifier = \"chain\"\n\n[tools]\nread_retries = 0"
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert!((cfg.routing.confidence_threshold - 0.75).abs() < 1e-6);
        assert_eq!(cfg.routing.classifier, ClassifierKind::Chain);
        assert_eq!(cfg.tools.read_retries, 0);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[routing]\nconfidence_threshold = 1.5").unwrap();
        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }
}
