//! 置信度汇总 - 业务能力层
//!
//! 纯函数：一组答案的置信度 → 提交 / 不确定 / 人工

use crate::models::{AnswerRecord, ApplicationDecision, DecisionAction};
use tracing::info;

/// 默认高阈值（含）
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.85;
/// 默认低阈值（不含）
pub const DEFAULT_LOW_THRESHOLD: f64 = 0.65;

/// 置信度分段统计（仅用于日志）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfidenceSummary {
    pub total: usize,
    pub average: f64,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// 汇总答案，得出决策
///
/// - 任一答案 `< low` → `Manual`，列出所有低、中置信度问题
/// - 否则任一答案在 `[low, high)` → `Uncertain`，列出中置信度问题
/// - 否则 → `Submit`
///
/// 边界：恰好等于 `low` 算中，恰好等于 `high` 算高
pub fn decide(answers: &[AnswerRecord], high: f64, low: f64) -> ApplicationDecision {
    if answers.is_empty() {
        return ApplicationDecision {
            action: DecisionAction::Manual,
            overall_confidence: 0.0,
            reasoning: "no answers produced".to_string(),
            low_confidence_questions: Vec::new(),
        };
    }

    let overall_confidence = overall_confidence(answers);

    let mut low_questions = Vec::new();
    let mut medium_questions = Vec::new();
    for answer in answers {
        let confidence = answer.confidence();
        if confidence < low {
            low_questions.push(answer.question.clone());
        } else if confidence < high {
            medium_questions.push(answer.question.clone());
        }
    }

    let (action, reasoning) = if !low_questions.is_empty() {
        (
            DecisionAction::Manual,
            format!(
                "{} answer(s) below {:.2}; manual review required",
                low_questions.len(),
                low
            ),
        )
    } else if !medium_questions.is_empty() {
        (
            DecisionAction::Uncertain,
            format!(
                "{} answer(s) between {:.2} and {:.2}; submitting flagged as uncertain",
                medium_questions.len(),
                low,
                high
            ),
        )
    } else {
        (
            DecisionAction::Submit,
            format!(
                "all answers at or above {:.2} (mean {:.2})",
                high, overall_confidence
            ),
        )
    };

    let low_confidence_questions = match action {
        DecisionAction::Submit => Vec::new(),
        DecisionAction::Uncertain => medium_questions,
        DecisionAction::Manual => low_questions.into_iter().chain(medium_questions).collect(),
    };

    info!(
        "📊 决策: {} (平均置信度 {:.2}, 待关注问题 {} 个)",
        action,
        overall_confidence,
        low_confidence_questions.len()
    );

    ApplicationDecision {
        action,
        overall_confidence,
        reasoning,
        low_confidence_questions,
    }
}

/// 平均置信度，保留两位小数
pub fn overall_confidence(answers: &[AnswerRecord]) -> f64 {
    if answers.is_empty() {
        return 0.0;
    }
    let sum: f64 = answers.iter().map(AnswerRecord::confidence).sum();
    round2(sum / answers.len() as f64)
}

/// 按阈值分段计数
pub fn confidence_summary(answers: &[AnswerRecord], high: f64, low: f64) -> ConfidenceSummary {
    let mut summary = ConfidenceSummary {
        total: answers.len(),
        average: overall_confidence(answers),
        ..Default::default()
    };
    for answer in answers {
        let c = answer.confidence();
        if c >= high {
            summary.high += 1;
        } else if c >= low {
            summary.medium += 1;
        } else {
            summary.low += 1;
        }
    }
    summary
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
