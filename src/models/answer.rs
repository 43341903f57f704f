//! 答案与提交决策

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::field::FieldKind;

/// 把置信度限制在 [0, 1]，NaN 视为 0
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// 单个字段的解答结果
///
/// 置信度只能通过构造函数和 `penalize` 写入，始终在 [0, 1] 内
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    confidence: f64,
    pub reasoning: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl AnswerRecord {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        confidence: f64,
        kind: FieldKind,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            confidence: clamp_confidence(confidence),
            reasoning: String::new(),
            kind,
            sources: Vec::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// 置信度乘以系数（结果仍然限制在 [0, 1]）
    pub fn penalize(&mut self, factor: f64) {
        self.confidence = clamp_confidence(self.confidence * factor);
    }

    pub fn is_empty(&self) -> bool {
        self.answer.trim().is_empty()
    }
}

/// 提交动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    /// 自动提交
    Submit,
    /// 提交，但标记为不确定
    Uncertain,
    /// 不提交，交给人工
    Manual,
}

impl DecisionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionAction::Submit => "SUBMIT",
            DecisionAction::Uncertain => "UNCERTAIN",
            DecisionAction::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个目标的最终决策，生成后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDecision {
    pub action: DecisionAction,
    /// 所有答案置信度的平均值（保留两位小数）
    pub overall_confidence: f64,
    pub reasoning: String,
    pub low_confidence_questions: Vec<String>,
}
