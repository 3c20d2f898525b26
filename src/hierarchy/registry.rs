//! 智能体注册表：arena + id 索引
//!
//! 启动时从层级定义构建一次，之后只读、在各层之间通过 Arc 共享。
//! 构建时检查树的全部约束，不合法的配置不会产生注册表。

use std::collections::HashMap;
use std::path::Path;

use super::node::{AgentNode, HierarchySpec, Level, NodeSpec};
use super::HierarchyError;
use crate::routing::Candidate;

/// 层级注册表
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    nodes: Vec<AgentNode>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    /// 从层级定义构建并校验
    pub fn from_spec(spec: &HierarchySpec) -> Result<Self, HierarchyError> {
        if spec.root.level != Level::Director {
            return Err(HierarchyError::RootNotDirector(spec.root.id.clone()));
        }
        let mut registry = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        };
        registry.insert(&spec.root, None)?;
        registry.validate()?;
        tracing::debug!(nodes = registry.nodes.len(), "agent hierarchy built");
        Ok(registry)
    }

    /// 内置层级
    pub fn builtin() -> Result<Self, HierarchyError> {
        Self::from_spec(&HierarchySpec::builtin())
    }

    /// 从 TOML / JSON 文件构建
    pub fn load(path: &Path) -> Result<Self, HierarchyError> {
        Self::from_spec(&HierarchySpec::load(path)?)
    }

    fn insert(&mut self, spec: &NodeSpec, parent: Option<usize>) -> Result<usize, HierarchyError> {
        if self.index.contains_key(&spec.id) {
            return Err(HierarchyError::DuplicateId(spec.id.clone()));
        }
        if spec.injection_method != spec.level.injection_method() {
            return Err(HierarchyError::InjectionMismatch {
                id: spec.id.clone(),
                level: spec.level.as_u8(),
                method: spec.injection_method.as_str().to_string(),
            });
        }
        let idx = self.nodes.len();
        self.nodes.push(AgentNode {
            id: spec.id.clone(),
            level: spec.level,
            injection_method: spec.injection_method,
            capability: spec.resolved_capability(),
            parent,
            children: Vec::new(),
        });
        self.index.insert(spec.id.clone(), idx);

        for child in &spec.children {
            if child.level <= spec.level {
                return Err(HierarchyError::LevelOrder {
                    parent: spec.id.clone(),
                    child: child.id.clone(),
                });
            }
            let child_idx = self.insert(child, Some(idx))?;
            self.nodes[idx].children.push(child_idx);
        }
        Ok(idx)
    }

    /// 检查树约束：唯一根、父子互指、层级递增、叶子无子节点、路由节点非空、无环
    pub fn validate(&self) -> Result<(), HierarchyError> {
        let roots: Vec<&AgentNode> = self.nodes.iter().filter(|n| n.parent.is_none()).collect();
        match roots.as_slice() {
            [root] if root.level == Level::Director => {}
            [root] => return Err(HierarchyError::RootNotDirector(root.id.clone())),
            _ => return Err(HierarchyError::RootCount(roots.len())),
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() && !node.children.is_empty() {
                return Err(HierarchyError::LeafHasChildren(node.id.clone()));
            }
            if !node.is_leaf() && node.children.is_empty() {
                return Err(HierarchyError::EmptyRouter(node.id.clone()));
            }
            if let Some(p) = node.parent {
                let parent = &self.nodes[p];
                if !parent.children.contains(&idx) {
                    return Err(HierarchyError::Dangling(node.id.clone()));
                }
                if parent.level >= node.level {
                    return Err(HierarchyError::LevelOrder {
                        parent: parent.id.clone(),
                        child: node.id.clone(),
                    });
                }
            }
            // 沿父链向上，步数超过节点数即有环
            let mut steps = 0;
            let mut cursor = node.parent;
            while let Some(p) = cursor {
                steps += 1;
                if steps > self.nodes.len() {
                    return Err(HierarchyError::Cycle(node.id.clone()));
                }
                cursor = self.nodes[p].parent;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 根节点（总指挥）；构建成功即存在
    pub fn root(&self) -> &AgentNode {
        &self.nodes[0]
    }

    pub fn get(&self, id: &str) -> Option<&AgentNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn children(&self, id: &str) -> Vec<&AgentNode> {
        self.get(id)
            .map(|n| n.children.iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: &str) -> Option<&AgentNode> {
        self.get(id).and_then(|n| n.parent).map(|p| &self.nodes[p])
    }

    pub fn nodes_at(&self, level: Level) -> Vec<&AgentNode> {
        self.nodes.iter().filter(|n| n.level == level).collect()
    }

    /// 某节点及其全部后代的 id（先序）
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(&idx) = self.index.get(id) {
            self.collect_subtree(idx, &mut out);
        }
        out
    }

    fn collect_subtree(&self, idx: usize, out: &mut Vec<String>) {
        let node = &self.nodes[idx];
        out.push(node.id.clone());
        for &c in &node.children {
            self.collect_subtree(c, out);
        }
    }

    /// 某路由节点的分类候选：直接子节点，能力中合并了各自后代的关键词与示例
    pub fn candidates(&self, id: &str) -> Vec<Candidate> {
        self.children(id)
            .into_iter()
            .map(|child| {
                let subtree = self.subtree_ids(&child.id);
                let mut capability = child.capability.clone();
                for desc in subtree.iter().skip(1).filter_map(|d| self.get(d)) {
                    capability.absorb(&desc.capability);
                }
                Candidate {
                    node_id: child.id.clone(),
                    capability,
                    subtree,
                }
            })
            .collect()
    }

    /// 树形展示
    pub fn tree_display(&self) -> String {
        let root = self.root();
        let mut out = format!(
            "{} [L{} {}] {}\n",
            root.id,
            root.level.as_u8(),
            root.injection_method.as_str(),
            root.capability.agent_type
        );
        self.render_children(0, "", &mut out);
        out
    }

    fn render_children(&self, idx: usize, prefix: &str, out: &mut String) {
        let children = &self.nodes[idx].children;
        for (i, &c) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            let node = &self.nodes[c];
            out.push_str(&format!(
                "{prefix}{}{} [L{} {}] {}\n",
                if last { "└─ " } else { "├─ " },
                node.id,
                node.level.as_u8(),
                node.injection_method.as_str(),
                node.capability.agent_type
            ));
            let next = format!("{prefix}{}", if last { "   " } else { "│  " });
            self.render_children(c, &next, out);
        }
    }
}
