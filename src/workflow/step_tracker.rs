//! 步骤追踪
//!
//! 记录一个目标内每个字段的解决状态，以及最近几步的表单签名，用来判断表单是否卡住

use std::collections::{HashMap, VecDeque};

use crate::models::{FieldDescriptor, FieldKey};

/// 表单步骤签名：排序后的 (类型, 规范化用途) 多重集
pub type StepSignature = Vec<FieldKey>;

/// 计算当前步骤的签名
pub fn step_signature(fields: &[FieldDescriptor]) -> StepSignature {
    let mut signature: StepSignature = fields.iter().map(FieldDescriptor::key).collect();
    signature.sort();
    signature
}

/// 字段的解决状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldState {
    /// 已成功写入，保存写入的值以便重新渲染后复用
    Resolved(String),
    Unresolved,
}

/// 卡住的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stagnation {
    /// 同一个表单连续出现且没有新字段被解决
    RepeatedStep { repeats: usize },
    /// 未解决字段数超过上限
    TooManyUnresolved { count: usize, cap: usize },
}

impl std::fmt::Display for Stagnation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stagnation::RepeatedStep { repeats } => {
                write!(f, "同一表单连续出现 {} 次且没有进展", repeats)
            }
            Stagnation::TooManyUnresolved { count, cap } => {
                write!(f, "未解决字段 {} 个，超过上限 {}", count, cap)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct StepObservation {
    signature: StepSignature,
    newly_resolved: usize,
}

/// 单个目标的步骤追踪器
///
/// 每个目标新建一个，不跨目标共享
#[derive(Debug)]
pub struct StepTracker {
    repeats: usize,
    unresolved_cap: usize,
    history: VecDeque<StepObservation>,
    fields: HashMap<FieldKey, FieldState>,
}

impl StepTracker {
    /// `repeats`: 连续出现多少次视为卡住（至少 2）
    pub fn new(repeats: usize, unresolved_cap: usize) -> Self {
        let repeats = repeats.max(2);
        Self {
            repeats,
            unresolved_cap,
            history: VecDeque::with_capacity(repeats),
            fields: HashMap::new(),
        }
    }

    /// 之前已解决字段的值
    pub fn cached_value(&self, key: &FieldKey) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldState::Resolved(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// 标记字段已解决；返回这次是否为新解决
    pub fn mark_resolved(&mut self, key: FieldKey, value: impl Into<String>) -> bool {
        let previous = self.fields.insert(key, FieldState::Resolved(value.into()));
        !matches!(previous, Some(FieldState::Resolved(_)))
    }

    pub fn mark_unresolved(&mut self, key: FieldKey) {
        self.fields.insert(key, FieldState::Unresolved);
    }

    /// 当前处于未解决状态的字段数（按 key 去重）
    pub fn unresolved_count(&self) -> usize {
        self.fields
            .values()
            .filter(|state| matches!(state, FieldState::Unresolved))
            .count()
    }

    /// 记录一步的观察结果
    pub fn record_step(&mut self, signature: StepSignature, newly_resolved: usize) {
        if self.history.len() == self.repeats {
            self.history.pop_front();
        }
        self.history.push_back(StepObservation {
            signature,
            newly_resolved,
        });
    }

    /// 判断是否卡住
    pub fn check(&self) -> Option<Stagnation> {
        let count = self.unresolved_count();
        if count > self.unresolved_cap {
            return Some(Stagnation::TooManyUnresolved {
                count,
                cap: self.unresolved_cap,
            });
        }

        if self.history.len() < self.repeats {
            return None;
        }

        let latest = self.history.back()?;
        let same_form = self
            .history
            .iter()
            .all(|obs| obs.signature == latest.signature);
        // 第一次出现时的进展不算，只看之后重复出现的几步
        let no_progress = self
            .history
            .iter()
            .skip(1)
            .all(|obs| obs.newly_resolved == 0);

        if same_form && no_progress {
            Some(Stagnation::RepeatedStep {
                repeats: self.repeats,
            })
        } else {
            None
        }
    }
}
