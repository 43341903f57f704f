//! 单个目标处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责处理单个目标，是目标级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **幂等检查**：状态存储中已有终态记录的目标直接跳过
//! 2. **流程调度**：委托 `ApplicationFlow` 完成申请
//! 3. **状态映射**：流程结果 → `ProcessingStatus`
//! 4. **状态落盘**：每个目标结束后立即写入状态存储
//! 5. **结果输出**：向记录表发送结果事件（失败只告警）

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::FlowError;
use crate::infrastructure::FormDriver;
use crate::models::{ProcessingStatus, Target};
use crate::services::{OutcomeEvent, OutcomeSink, StateStore};
use crate::workflow::{ApplicationFlow, FailureReason, FlowReport, TargetCtx, TargetOutcome};

/// 单个目标的处理结论
#[derive(Debug)]
pub enum TargetVerdict {
    /// 目标已结束（包括跳过），继续下一个
    Completed(OutcomeEvent),
    /// 站点拦截，中止整个运行
    ///
    /// 拦截出现在结果确定之后（已点击提交）时，`event` 带着已记录的结果
    Abort {
        error: FlowError,
        event: Option<OutcomeEvent>,
    },
}

/// 流程结果 → 持久化状态
pub fn status_for(outcome: &TargetOutcome) -> ProcessingStatus {
    match outcome {
        TargetOutcome::Submitted { uncertain: false, .. } => ProcessingStatus::Applied,
        TargetOutcome::Submitted { uncertain: true, .. } => ProcessingStatus::Uncertain,
        TargetOutcome::Held { .. } => ProcessingStatus::Manual,
        TargetOutcome::Skipped => ProcessingStatus::Skipped,
        TargetOutcome::Failed {
            reason: FailureReason::Unavailable,
            ..
        } => ProcessingStatus::Unavailable,
        TargetOutcome::Failed {
            reason: FailureReason::Error,
            ..
        } => ProcessingStatus::Error,
    }
}

/// 写入状态存储的附加信息：暂缓原因或错误信息
fn message_for(outcome: &TargetOutcome) -> Option<String> {
    match outcome {
        TargetOutcome::Held { reason, .. } => Some(reason.to_string()),
        TargetOutcome::Failed { message, .. } => Some(message.clone()),
        TargetOutcome::Submitted { .. } | TargetOutcome::Skipped => None,
    }
}

/// 单个目标处理器
pub struct TargetProcessor {
    flow: ApplicationFlow,
    store: Arc<StateStore>,
    sink: Arc<dyn OutcomeSink>,
}

impl TargetProcessor {
    pub fn new(flow: ApplicationFlow, store: Arc<StateStore>, sink: Arc<dyn OutcomeSink>) -> Self {
        Self { flow, store, sink }
    }

    /// 处理单个目标
    ///
    /// 除站点拦截外不会向上传播任何故障
    pub async fn process(
        &self,
        driver: &dyn FormDriver,
        target: &Target,
        ctx: &TargetCtx,
    ) -> TargetVerdict {
        log_target_start(ctx, target);

        if self.store.is_processed(&target.id) {
            info!("[目标 {}] ⏭️ 已处理过，跳过", ctx.target_index);
            let report = FlowReport {
                outcome: TargetOutcome::Skipped,
                variant: None,
                answers: Vec::new(),
                steps: 0,
                halt: None,
            };
            return TargetVerdict::Completed(build_event(target, &report));
        }

        let report = match self.flow.run(driver, target, ctx).await {
            Ok(report) => report,
            Err(error) => return TargetVerdict::Abort { error, event: None },
        };

        let status = status_for(&report.outcome);
        let message = message_for(&report.outcome);
        let variant_id = report.variant.as_ref().map(|v| v.variant_id());

        if let Err(e) = self.store.record(
            &target.id,
            &target.url,
            status,
            variant_id.as_deref(),
            message.as_deref(),
        ) {
            error!("[目标 {}] ❌ 状态写入失败: {}", ctx.target_index, e);
        }

        let event = build_event(target, &report);
        if let Err(e) = self.sink.emit(&event).await {
            warn!("[目标 {}] ⚠️ 记录表写入失败: {:#}", ctx.target_index, e);
        }

        log_target_complete(ctx, status, report.answers.len());
        match report.halt {
            Some(error) => TargetVerdict::Abort {
                error,
                event: Some(event),
            },
            None => TargetVerdict::Completed(event),
        }
    }
}

fn build_event(target: &Target, report: &FlowReport) -> OutcomeEvent {
    let decision = match &report.outcome {
        TargetOutcome::Submitted { decision, .. } => Some(decision.clone()),
        TargetOutcome::Held { decision, .. } => decision.clone(),
        _ => None,
    };

    OutcomeEvent {
        target_id: target.id.clone(),
        url: target.url.clone(),
        title: target.title.clone(),
        company: target.company.clone(),
        status: status_for(&report.outcome),
        variant_id: report.variant.as_ref().map(|v| v.variant_id()),
        decision,
        answer_confidences: report.answers.iter().map(|a| a.confidence()).collect(),
        message: message_for(&report.outcome),
        timestamp: Utc::now(),
    }
}

// ========== 日志辅助函数 ==========

fn log_target_start(ctx: &TargetCtx, target: &Target) {
    info!("\n[目标 {}] {}", ctx.target_index, "─".repeat(30));
    info!(
        "[目标 {}] 处理第 {}/{} 个目标 (ID: {})",
        ctx.target_index, ctx.target_index, ctx.total, ctx.target_id
    );
    info!(
        "[目标 {}] {} @ {}",
        ctx.target_index, target.title, target.company
    );
}

fn log_target_complete(ctx: &TargetCtx, status: ProcessingStatus, answers: usize) {
    info!(
        "[目标 {}] ✅ 处理完成: {} (答案 {} 个)",
        ctx.target_index, status, answers
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApplicationDecision, DecisionAction};
    use crate::workflow::HoldReason;

    fn decision() -> ApplicationDecision {
        ApplicationDecision {
            action: DecisionAction::Submit,
            overall_confidence: 0.9,
            reasoning: String::new(),
            low_confidence_questions: Vec::new(),
        }
    }

    #[test]
    fn outcomes_map_to_statuses() {
        let cases = [
            (
                TargetOutcome::Submitted {
                    decision: decision(),
                    uncertain: false,
                },
                ProcessingStatus::Applied,
            ),
            (
                TargetOutcome::Submitted {
                    decision: decision(),
                    uncertain: true,
                },
                ProcessingStatus::Uncertain,
            ),
            (
                TargetOutcome::Held {
                    reason: HoldReason::StalledForm,
                    decision: None,
                },
                ProcessingStatus::Manual,
            ),
            (TargetOutcome::Skipped, ProcessingStatus::Skipped),
            (
                TargetOutcome::Failed {
                    reason: FailureReason::Unavailable,
                    message: "closed".into(),
                },
                ProcessingStatus::Unavailable,
            ),
            (
                TargetOutcome::Failed {
                    reason: FailureReason::Error,
                    message: "boom".into(),
                },
                ProcessingStatus::Error,
            ),
        ];

        for (outcome, status) in cases {
            assert_eq!(status_for(&outcome), status, "{:?}", outcome);
        }
    }

    #[test]
    fn held_reason_is_kept_as_message() {
        let outcome = TargetOutcome::Held {
            reason: HoldReason::NoApplyEntry,
            decision: None,
        };
        assert_eq!(message_for(&outcome).as_deref(), Some("no-apply-entry"));
    }
}
