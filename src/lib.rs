//! Desk - EC 后台多层智能体路由系统
//!
//! 模块划分：
//! - **agents**: 总指挥 / 业务中心 / 叶子智能体与能力描述
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、会话监管、引擎构建
//! - **domain**: 商品 / 订单记录与前置条件规则
//! - **engine**: 一轮请求的完整流程、重新生成与评价
//! - **hierarchy**: 智能体层级定义与注册表
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与模型路由
//! - **response**: 最终响应组装与修复提示
//! - **routing**: 分类器（关键词 / LLM / 组合）与路由决策
//! - **session**: 会话上下文、实体引用抽取、会话存储
//! - **tools**: 工具注册、执行器与内存后台
//! - **trace**: 轮次追踪与评价

pub mod agents;
pub mod config;
pub mod core;
pub mod domain;
pub mod engine;
pub mod hierarchy;
pub mod llm;
pub mod observability;
pub mod response;
pub mod routing;
pub mod session;
pub mod tools;
pub mod trace;

pub use core::{AgentError, EngineBuilder};
pub use engine::{Engine, EvaluateAck, EvaluateRequest, RegenerateRequest, RouteRequest};
pub use response::RouteResponse;
pub use trace::Vote;
