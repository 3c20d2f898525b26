//! 会话上下文：一次对话里跨轮次保留的选择、语言、模型偏好与最近轮次

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户语言（只影响回复框架文字）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Zh,
    Ja,
    En,
}

impl Language {
    /// 按字符粗判：有假名为日文，有汉字为中文，其余英文
    pub fn detect(text: &str) -> Self {
        let mut has_han = false;
        for c in text.chars() {
            match c {
                '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' => return Language::Ja,
                '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' => has_han = true,
                _ => {}
            }
        }
        if has_han {
            Language::Zh
        } else if text.chars().any(|c| c.is_ascii_alphabetic()) {
            Language::En
        } else {
            Language::Zh
        }
    }
}

/// 选中实体的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Product,
    Order,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Product => "商品",
            EntityKind::Order => "订单",
        }
    }
}

/// 一轮对话记录；写入后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: String,
    pub session_id: String,
    /// 重新生成的轮次与原轮次共享同一个 conversation_id
    pub conversation_id: String,
    pub trace_id: String,
    pub user_message: String,
    pub agent_response: String,
    /// 最终出结果的节点
    pub handled_by: Option<String>,
    pub had_errors: bool,
    /// 本轮开始时的选择快照，重新生成时据此还原输入
    pub input: ContextSnapshot,
    pub created_at: DateTime<Utc>,
}

/// 上下文中会随轮次变化的部分
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContextSnapshot {
    pub selected_entity_ids: Vec<String>,
    pub selection_kind: Option<EntityKind>,
    pub last_target: Option<String>,
    pub language: Language,
}

/// 会话上下文
///
/// 路由各层只读它；要改选择的只有叶子智能体，改完作为新值返回，由引擎在轮次结束时整体提交。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: String,
    pub user_id: String,
    /// 最近若干轮（按时间顺序）
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
    #[serde(default)]
    pub selected_entity_ids: Vec<String>,
    #[serde(default)]
    pub selection_kind: Option<EntityKind>,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub llm_preference: Option<String>,
    /// 上一轮处理请求的叶子节点
    #[serde(default)]
    pub last_target: Option<String>,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            turns: Vec::new(),
            selected_entity_ids: Vec::new(),
            selection_kind: None,
            language: Language::default(),
            llm_preference: None,
            last_target: None,
        }
    }

    /// 替换当前选择
    pub fn select(&mut self, kind: EntityKind, ids: Vec<String>) {
        self.selected_entity_ids = ids;
        self.selection_kind = Some(kind);
    }

    pub fn clear_selection(&mut self) {
        self.selected_entity_ids.clear();
        self.selection_kind = None;
    }

    /// 当前选择中属于该类别的 id；类别不符时为空
    pub fn selected(&self, kind: EntityKind) -> &[String] {
        if self.selection_kind == Some(kind) {
            &self.selected_entity_ids
        } else {
            &[]
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            selected_entity_ids: self.selected_entity_ids.clone(),
            selection_kind: self.selection_kind,
            last_target: self.last_target.clone(),
            language: self.language,
        }
    }

    /// 用快照覆盖可变部分（重新生成时还原输入）
    pub fn restore(&mut self, snapshot: &ContextSnapshot) {
        self.selected_entity_ids = snapshot.selected_entity_ids.clone();
        self.selection_kind = snapshot.selection_kind;
        self.last_target = snapshot.last_target.clone();
        self.language = snapshot.language;
    }

    /// 追加一轮并只保留最近 max_turns 轮
    pub fn push_turn(&mut self, turn: ConversationTurn, max_turns: usize) {
        self.turns.push(turn);
        if self.turns.len() > max_turns {
            let excess = self.turns.len() - max_turns;
            self.turns.drain(..excess);
        }
    }
}
