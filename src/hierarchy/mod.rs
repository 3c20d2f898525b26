//! 智能体层级：静态定义、arena 注册表与树约束校验

pub mod node;
pub mod registry;

use thiserror::Error;

pub use node::{AgentNode, HierarchySpec, InjectionMethod, Level, NodeSpec};
pub use registry::AgentRegistry;

/// 层级构建错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HierarchyError {
    #[error("duplicate node id: {0}")]
    DuplicateId(String),

    #[error("root node {0} must be the level-0 director")]
    RootNotDirector(String),

    #[error("expected exactly one root, found {0}")]
    RootCount(usize),

    #[error("child {child} must have a higher level than parent {parent}")]
    LevelOrder { parent: String, child: String },

    #[error("node {id} at level {level} cannot use injection method {method}")]
    InjectionMismatch {
        id: String,
        level: u8,
        method: String,
    },

    #[error("leaf {0} cannot have children")]
    LeafHasChildren(String),

    #[error("routing node {0} has no children")]
    EmptyRouter(String),

    #[error("node {0} is not listed among its parent's children")]
    Dangling(String),

    #[error("cycle detected at node {0}")]
    Cycle(String),

    #[error("no leaf implementation for node {0}")]
    UnknownLeaf(String),

    #[error("hierarchy parse error: {0}")]
    Parse(String),

    #[error("hierarchy io error: {0}")]
    Io(String),
}
