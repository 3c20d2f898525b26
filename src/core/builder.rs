//! 引擎构建器：统一的初始化逻辑
//!
//! 层级来源优先级：显式传入 → `[hierarchy].path` → 内置层级。
//! 工具、分类器、会话存储、追踪记录都可以替换，测试据此注入假实现。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::agents::{build_leaf, CenterManager, Child, Director, LeafAgent};
use crate::config::{AppConfig, ClassifierKind};
use crate::core::AgentError;
use crate::engine::Engine;
use crate::hierarchy::{AgentRegistry, HierarchyError, HierarchySpec, Level};
use crate::llm::ModelRouter;
use crate::routing::{
    ChainClassifier, ClassifierProvider, KeywordClassifier, LlmClassifier, RoutingPolicy,
};
use crate::session::{MemorySessionStore, SessionStore};
use crate::tools::{register_backoffice_tools, Backoffice, ToolExecutor, ToolInvoker, ToolRegistry};
use crate::trace::{InMemoryTraceRecorder, TraceRecorder};

pub struct EngineBuilder {
    config: AppConfig,
    hierarchy: Option<HierarchySpec>,
    backoffice: Option<Arc<Backoffice>>,
    invoker: Option<Arc<dyn ToolInvoker>>,
    classifier: Option<Arc<dyn ClassifierProvider>>,
    models: Option<Arc<ModelRouter>>,
    store: Option<Arc<dyn SessionStore>>,
    traces: Option<Arc<dyn TraceRecorder>>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            hierarchy: None,
            backoffice: None,
            invoker: None,
            classifier: None,
            models: None,
            store: None,
            traces: None,
        }
    }

    /// 指定层级定义（优先于配置文件）
    pub fn with_hierarchy(mut self, spec: HierarchySpec) -> Self {
        self.hierarchy = Some(spec);
        self
    }

    /// 指定后台数据；未指定时使用演示数据
    pub fn with_backoffice(mut self, backoffice: Arc<Backoffice>) -> Self {
        self.backoffice = Some(backoffice);
        self
    }

    /// 直接替换工具调用层（此时 backoffice 不再使用）
    pub fn with_invoker(mut self, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// 替换分类器（两层共用）
    pub fn with_classifier(mut self, classifier: Arc<dyn ClassifierProvider>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_models(mut self, models: Arc<ModelRouter>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_trace_recorder(mut self, traces: Arc<dyn TraceRecorder>) -> Self {
        self.traces = Some(traces);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 构建并校验层级
    pub fn build_registry(&self) -> Result<AgentRegistry, HierarchyError> {
        if let Some(spec) = &self.hierarchy {
            return AgentRegistry::from_spec(spec);
        }
        match &self.config.hierarchy.path {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading hierarchy from file");
                AgentRegistry::load(path)
            }
            None => AgentRegistry::builtin(),
        }
    }

    /// 构建工具调用层：演示后台 + 超时 / 只读重试
    pub fn build_invoker(&self) -> Arc<dyn ToolInvoker> {
        if let Some(invoker) = &self.invoker {
            return invoker.clone();
        }
        let backoffice = self
            .backoffice
            .clone()
            .unwrap_or_else(|| Arc::new(Backoffice::seeded()));
        let mut registry = ToolRegistry::new();
        register_backoffice_tools(&mut registry, backoffice);
        let executor = ToolExecutor::new(registry, self.config.tools.tool_timeout_secs)
            .with_read_retries(self.config.tools.read_retries);
        tracing::debug!(tools = ?executor.tool_names(), "back-office tools registered");
        Arc::new(executor)
    }

    /// 按 `[routing].classifier` 构建分类器
    pub fn build_classifier(&self) -> Arc<dyn ClassifierProvider> {
        if let Some(classifier) = &self.classifier {
            return classifier.clone();
        }
        let models = || {
            self.models
                .clone()
                .unwrap_or_else(|| Arc::new(ModelRouter::from_config(&self.config.llm)))
        };
        match self.config.routing.classifier {
            ClassifierKind::Keyword => Arc::new(KeywordClassifier::new()),
            ClassifierKind::Llm => Arc::new(LlmClassifier::new(models())),
            ClassifierKind::Chain => {
                // 给关键词兜底留出整体超时的四分之一
                let outer = self.config.routing.classifier_timeout_secs;
                Arc::new(
                    ChainClassifier::new(
                        Arc::new(LlmClassifier::new(models())),
                        self.config.routing.confidence_threshold,
                    )
                    .with_llm_budget(Duration::from_millis(outer * 750)),
                )
            }
        }
    }

    /// 自底向上：叶子 → 业务中心 → 总指挥
    pub fn build_director(
        &self,
        registry: Arc<AgentRegistry>,
        invoker: Arc<dyn ToolInvoker>,
        classifier: Arc<dyn ClassifierProvider>,
    ) -> Result<Director, HierarchyError> {
        let policy = RoutingPolicy::from_config(&self.config.routing);
        let leaf = |id: &str| -> Result<Arc<dyn LeafAgent>, HierarchyError> {
            build_leaf(id, invoker.clone()).ok_or_else(|| HierarchyError::UnknownLeaf(id.to_string()))
        };

        let root = registry.root().id.clone();
        let mut children = HashMap::new();
        for node in registry.children(&root) {
            let child = match node.level {
                Level::Leaf => Child::Leaf(leaf(&node.id)?),
                _ => {
                    let leaves = registry
                        .children(&node.id)
                        .iter()
                        .map(|n| leaf(&n.id))
                        .collect::<Result<Vec<_>, _>>()?;
                    Child::Manager(Arc::new(CenterManager::new(
                        &node.id,
                        &registry,
                        leaves,
                        classifier.clone(),
                        policy.clone(),
                    )?))
                }
            };
            children.insert(node.id.clone(), child);
        }
        Director::new(registry, children, classifier, policy)
    }

    pub fn build(self) -> Result<Engine, AgentError> {
        let registry = Arc::new(self.build_registry()?);
        let invoker = self.build_invoker();
        let classifier = self.build_classifier();
        let director = self.build_director(registry, invoker, classifier.clone())?;
        tracing::info!(
            classifier = classifier.name(),
            threshold = self.config.routing.confidence_threshold,
            "engine ready"
        );

        let store = self.store.clone().unwrap_or_else(|| {
            Arc::new(MemorySessionStore::new(self.config.app.session_timeout_secs))
        });
        let traces = self
            .traces
            .clone()
            .unwrap_or_else(|| Arc::new(InMemoryTraceRecorder::new()));
        let engine = Engine::new(
            Arc::new(director),
            store,
            traces,
            self.config.app.max_context_turns,
        );
        if self.config.app.cleanup_interval_secs > 0 {
            engine.start_sweeper(Duration::from_secs(self.config.app.cleanup_interval_secs));
        }
        Ok(engine)
    }
}
