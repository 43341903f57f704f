//! 目标申请流程 - 流程层
//!
//! 核心职责：定义"一个目标"的完整申请流程
//!
//! 流程顺序：
//! 1. 打开目标页面 → 检查是否已关闭 / 被拦截
//! 2. 选择简历变体
//! 3. 打开申请表单 → 逐步填写（最多 max_steps 步）
//! 4. 汇总置信度 → 提交 / 标记不确定后提交 / 交给人工

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::FlowError;
use crate::infrastructure::{timed, ActionControl, FormDriver};
use crate::models::{
    AnswerRecord, ApplicationDecision, DecisionAction, Target, VariantRecommendation,
};
use crate::services::confidence::{confidence_summary, decide};
use crate::services::{AnswerOracle, VariantSelector};
use crate::workflow::form_step::{FormStepProcessor, StepOutcome, StepSettings};
use crate::workflow::step_tracker::StepTracker;
use crate::workflow::target_ctx::TargetCtx;

/// 暂缓（交给人工）的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// 页面上没有申请入口（外部申请）
    NoApplyEntry,
    NoActionControl,
    StalledForm,
    StepLimitExceeded,
    LowConfidence,
}

impl HoldReason {
    pub fn as_str(self) -> &'static str {
        match self {
            HoldReason::NoApplyEntry => "no-apply-entry",
            HoldReason::NoActionControl => "no-action-control",
            HoldReason::StalledForm => "stalled-form",
            HoldReason::StepLimitExceeded => "step-limit-exceeded",
            HoldReason::LowConfidence => "low-confidence",
        }
    }
}

impl std::fmt::Display for HoldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// 目标已关闭
    Unavailable,
    Error,
}

/// 单个目标的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum TargetOutcome {
    /// 已提交；`uncertain` 表示提交时存在中等置信度答案
    Submitted {
        decision: ApplicationDecision,
        uncertain: bool,
    },
    /// 未提交，交给人工
    Held {
        reason: HoldReason,
        decision: Option<ApplicationDecision>,
    },
    /// 之前已处理过
    Skipped,
    Failed {
        reason: FailureReason,
        message: String,
    },
}

/// 流程运行报告
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub outcome: TargetOutcome,
    pub variant: Option<VariantRecommendation>,
    pub answers: Vec<AnswerRecord>,
    /// 实际进入的表单步数
    pub steps: usize,
    /// 结果确定之后才出现的站点拦截；结果照常记录，然后中止运行
    pub halt: Option<FlowError>,
}

/// 流程参数
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub max_steps: usize,
    pub stagnation_repeats: usize,
    pub unresolved_cap: usize,
    pub high_threshold: f64,
    pub low_threshold: f64,
    pub ui_timeout: Duration,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.max_steps,
            stagnation_repeats: config.stagnation_repeats,
            unresolved_cap: config.unresolved_cap,
            high_threshold: config.high_threshold,
            low_threshold: config.low_threshold,
            ui_timeout: Duration::from_secs(config.ui_timeout_secs),
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            stagnation_repeats: 3,
            unresolved_cap: 3,
            high_threshold: 0.85,
            low_threshold: 0.65,
            ui_timeout: Duration::from_secs(20),
        }
    }
}

/// 流程内部的中间状态
#[derive(Default)]
struct FlowRun {
    variant: Option<VariantRecommendation>,
    answers: Vec<AnswerRecord>,
    steps: usize,
    halt: Option<FlowError>,
}

/// 目标申请流程
///
/// - 编排单个目标从打开页面到提交的完整流程
/// - 决定何时填写、何时提交、何时交给人工
/// - 不持有页面资源，驱动由调用方传入
/// - 除站点级拦截外，所有故障都在这里消化为 `Failed`
pub struct ApplicationFlow {
    selector: VariantSelector,
    step_processor: FormStepProcessor,
    settings: FlowSettings,
}

impl ApplicationFlow {
    pub fn new(
        selector: VariantSelector,
        oracle: Arc<dyn AnswerOracle>,
        settings: FlowSettings,
        step_settings: StepSettings,
    ) -> Self {
        Self {
            selector,
            step_processor: FormStepProcessor::new(oracle, step_settings),
            settings,
        }
    }

    pub fn from_config(
        config: &Config,
        selector: VariantSelector,
        oracle: Arc<dyn AnswerOracle>,
    ) -> Self {
        Self::new(
            selector,
            oracle,
            FlowSettings::from_config(config),
            StepSettings::from_config(config),
        )
    }

    /// 运行一个目标
    ///
    /// 只有遇到站点级拦截时返回 `Err`，调用方据此中止整个运行
    pub async fn run(
        &self,
        driver: &dyn FormDriver,
        target: &Target,
        ctx: &TargetCtx,
    ) -> Result<FlowReport, FlowError> {
        let mut run = FlowRun::default();

        let outcome = match self.drive(driver, target, ctx, &mut run).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_hard_block() => {
                error!("[目标 {}] 🛑 站点拦截: {}", ctx.target_index, e);
                return Err(e);
            }
            Err(e) => {
                error!("[目标 {}] ❌ 处理失败: {}", ctx.target_index, e);
                TargetOutcome::Failed {
                    reason: FailureReason::Error,
                    message: e.to_string(),
                }
            }
        };

        Ok(FlowReport {
            outcome,
            variant: run.variant,
            answers: run.answers,
            steps: run.steps,
            halt: run.halt,
        })
    }

    async fn drive(
        &self,
        driver: &dyn FormDriver,
        target: &Target,
        ctx: &TargetCtx,
        run: &mut FlowRun,
    ) -> Result<TargetOutcome, FlowError> {
        // ========== 阶段 1: 打开页面 ==========
        info!("[目标 {}] 🌐 打开页面: {}", ctx.target_index, target.url);
        timed("navigate", self.settings.ui_timeout, driver.navigate(&target.url)).await?;
        self.check_hard_block(driver).await?;

        if timed(
            "is_target_unavailable",
            self.settings.ui_timeout,
            driver.is_target_unavailable(),
        )
        .await?
        {
            warn!("[目标 {}] ⚠️ 目标已关闭", ctx.target_index);
            return Ok(TargetOutcome::Failed {
                reason: FailureReason::Unavailable,
                message: "target no longer accepts applications".to_string(),
            });
        }

        // ========== 阶段 2: 选择简历 ==========
        let variant = self.selector.select(target).await?;
        info!(
            "[目标 {}] 📄 简历: {} (置信度 {:.2})",
            ctx.target_index,
            variant.variant_id(),
            variant.confidence
        );
        run.variant = Some(variant.clone());

        // ========== 阶段 3: 逐步填写表单 ==========
        if !timed("open_form", self.settings.ui_timeout, driver.open_form()).await? {
            info!("[目标 {}] 没有站内申请入口，交给人工", ctx.target_index);
            return Ok(TargetOutcome::Held {
                reason: HoldReason::NoApplyEntry,
                decision: None,
            });
        }

        let mut tracker =
            StepTracker::new(self.settings.stagnation_repeats, self.settings.unresolved_cap);

        let submit_control = loop {
            if run.steps >= self.settings.max_steps {
                warn!(
                    "[目标 {}] ⚠️ 超过最大步数 {}",
                    ctx.target_index, self.settings.max_steps
                );
                return Ok(self.hold(driver, ctx, HoldReason::StepLimitExceeded).await);
            }

            run.steps += 1;
            self.check_hard_block(driver).await?;
            info!("[目标 {}] 📝 第 {} 步", ctx.target_index, run.steps);

            let outcome = self
                .step_processor
                .process(driver, ctx, &variant, &mut tracker, &mut run.answers)
                .await?;

            match outcome {
                StepOutcome::ReadyToSubmit(control) => break control,
                StepOutcome::Advance(control) => {
                    debug!("[目标 {}] 点击: {}", ctx.target_index, control.label);
                    timed(
                        "click_action",
                        self.settings.ui_timeout,
                        driver.click_action(&control),
                    )
                    .await?;
                }
                StepOutcome::NoActionControl => {
                    return Ok(self.hold(driver, ctx, HoldReason::NoActionControl).await);
                }
                StepOutcome::Stalled(_) => {
                    return Ok(self.hold(driver, ctx, HoldReason::StalledForm).await);
                }
            }
        };

        // ========== 阶段 4: 决策 ==========
        self.decide_and_submit(driver, ctx, &submit_control, run)
            .await
    }

    async fn decide_and_submit(
        &self,
        driver: &dyn FormDriver,
        ctx: &TargetCtx,
        submit_control: &ActionControl,
        run: &mut FlowRun,
    ) -> Result<TargetOutcome, FlowError> {
        let answers = run.answers.as_slice();
        let summary = confidence_summary(
            answers,
            self.settings.high_threshold,
            self.settings.low_threshold,
        );
        debug!(
            "[目标 {}] 置信度分布: 高 {} / 中 {} / 低 {} (平均 {:.2})",
            ctx.target_index, summary.high, summary.medium, summary.low, summary.average
        );

        let decision = decide(
            answers,
            self.settings.high_threshold,
            self.settings.low_threshold,
        );

        match decision.action {
            DecisionAction::Submit | DecisionAction::Uncertain => {
                info!(
                    "[目标 {}] 📤 提交申请 ({})",
                    ctx.target_index, decision.action
                );
                timed(
                    "click_action",
                    self.settings.ui_timeout,
                    driver.click_action(submit_control),
                )
                .await?;

                // 点击成功后结果已确定，拦截不能再把目标变回未处理
                if let Err(e) = self.check_hard_block(driver).await {
                    warn!("[目标 {}] 🛑 提交后出现站点拦截: {}", ctx.target_index, e);
                    run.halt = Some(e);
                }

                let uncertain = decision.action == DecisionAction::Uncertain;
                Ok(TargetOutcome::Submitted {
                    decision,
                    uncertain,
                })
            }
            DecisionAction::Manual => {
                info!(
                    "[目标 {}] ✋ 置信度不足，交给人工: {}",
                    ctx.target_index, decision.reasoning
                );
                self.dismiss(driver, ctx).await;
                Ok(TargetOutcome::Held {
                    reason: HoldReason::LowConfidence,
                    decision: Some(decision),
                })
            }
        }
    }

    /// 放弃表单并返回暂缓结果
    async fn hold(&self, driver: &dyn FormDriver, ctx: &TargetCtx, reason: HoldReason) -> TargetOutcome {
        info!("[目标 {}] ✋ 暂缓: {}", ctx.target_index, reason);
        self.dismiss(driver, ctx).await;
        TargetOutcome::Held {
            reason,
            decision: None,
        }
    }

    async fn dismiss(&self, driver: &dyn FormDriver, ctx: &TargetCtx) {
        if let Err(e) = timed("dismiss_form", self.settings.ui_timeout, driver.dismiss_form()).await {
            warn!("[目标 {}] 关闭表单失败: {}", ctx.target_index, e);
        }
    }

    /// 检查站点级拦截；检查本身失败不算拦截
    async fn check_hard_block(&self, driver: &dyn FormDriver) -> Result<(), FlowError> {
        match timed("is_hard_blocked", self.settings.ui_timeout, driver.is_hard_blocked()).await {
            Ok(true) => Err(FlowError::hard_block(
                "verification challenge or rate-limit page detected",
            )),
            Ok(false) => Ok(()),
            Err(e) => {
                debug!("拦截检查失败，按未拦截处理: {}", e);
                Ok(())
            }
        }
    }
}
