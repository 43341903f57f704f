//! 表单步骤处理 - 流程层
//!
//! 处理多步表单中的"一步"：读字段、求答案、写入、找动作按钮
//!
//! 字段处理顺序：
//! 1. 附件字段 → 使用推荐的简历文件
//! 2. 已有值 → 跳过（枚举控件重新选中一次以确认）
//! 3. 本目标内已解决过的字段被重新渲染为空 → 复用缓存值，不再提问
//! 4. 其他 → 询问答题服务，规范化后写入

use regex::Regex;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{BrowserError, FlowError};
use crate::infrastructure::{timed, ActionControl, FormDriver};
use crate::models::{AnswerRecord, FieldDescriptor, FieldKind, VariantRecommendation};
use crate::services::{AnswerOracle, OracleQuery};
use crate::utils::truncate_text;
use crate::workflow::step_tracker::{step_signature, Stagnation, StepTracker};
use crate::workflow::target_ctx::TargetCtx;

/// 表示"提交"的按钮文字
const SUBMIT_KEYWORDS: &[&str] = &["submit", "send", "enviar", "apply"];

/// 表示"下一步"的按钮文字
const ADVANCE_KEYWORDS: &[&str] = &[
    "next",
    "continue",
    "continuar",
    "review",
    "siguiente",
    "revisar",
];

/// 带给答题服务的历史答案条数上限
const PRIOR_ANSWER_LIMIT: usize = 10;

/// 动作按钮的意图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionIntent {
    Submit,
    Advance,
}

/// 根据按钮文字判断意图；无法识别时返回 None
pub fn classify_action(label: &str) -> Option<ActionIntent> {
    let label = label.to_lowercase();
    if SUBMIT_KEYWORDS.iter().any(|kw| label.contains(kw)) {
        Some(ActionIntent::Submit)
    } else if ADVANCE_KEYWORDS.iter().any(|kw| label.contains(kw)) {
        Some(ActionIntent::Advance)
    } else {
        None
    }
}

/// 在可选值中匹配答案：先忽略大小写精确匹配，再双向子串匹配
pub fn match_option(options: &[String], answer: &str) -> Option<String> {
    let wanted = answer.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    let normalized: Vec<(String, &String)> = options
        .iter()
        .map(|opt| (opt.trim().to_lowercase(), opt))
        .filter(|(norm, _)| !norm.is_empty())
        .collect();

    normalized
        .iter()
        .find(|(norm, _)| *norm == wanted)
        .or_else(|| {
            normalized
                .iter()
                .find(|(norm, _)| norm.contains(&wanted) || wanted.contains(norm.as_str()))
        })
        .map(|(_, opt)| (*opt).clone())
}

static NUMBER_PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// 提取答案中的第一个数字
pub fn first_number(text: &str) -> Option<String> {
    let re = NUMBER_PATTERN
        .get_or_init(|| Regex::new(r"\d+(?:\.\d+)?"))
        .as_ref()
        .ok()?;
    re.find(text).map(|m| m.as_str().to_string())
}

/// 单步处理的结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// 到达提交步骤，等待决策
    ReadyToSubmit(ActionControl),
    /// 需要点击进入下一步
    Advance(ActionControl),
    /// 找不到可识别的动作按钮
    NoActionControl,
    /// 表单卡住
    Stalled(Stagnation),
}

/// 单步处理的参数
#[derive(Debug, Clone)]
pub struct StepSettings {
    /// 驱动调用失败后的重试次数
    pub ui_retries: usize,
    pub ui_timeout: Duration,
    /// 枚举 / 数字答案无法规范化时的置信度系数
    pub enum_mismatch_penalty: f64,
}

impl StepSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ui_retries: config.ui_retries,
            ui_timeout: Duration::from_secs(config.ui_timeout_secs),
            enum_mismatch_penalty: config.enum_mismatch_penalty,
        }
    }
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            ui_retries: 2,
            ui_timeout: Duration::from_secs(20),
            enum_mismatch_penalty: 0.8,
        }
    }
}

/// 表单步骤处理器
///
/// - 不持有页面，驱动由调用方传入
/// - 不做提交决策，只报告这一步的结果
pub struct FormStepProcessor {
    oracle: Arc<dyn AnswerOracle>,
    settings: StepSettings,
}

impl FormStepProcessor {
    pub fn new(oracle: Arc<dyn AnswerOracle>, settings: StepSettings) -> Self {
        Self { oracle, settings }
    }

    /// 处理当前步骤
    ///
    /// 新产生的答案追加到 `answers`，字段状态写入 `tracker`
    pub async fn process(
        &self,
        driver: &dyn FormDriver,
        ctx: &TargetCtx,
        variant: &VariantRecommendation,
        tracker: &mut StepTracker,
        answers: &mut Vec<AnswerRecord>,
    ) -> Result<StepOutcome, FlowError> {
        // 读不到字段按空步骤处理，交给卡住检测
        let fields = match self
            .with_retries("find_controls", move || driver.find_controls())
            .await
        {
            Ok(fields) => fields,
            Err(e) => {
                warn!("[目标 {}] ⚠️ 读取字段失败: {}", ctx.target_index, e);
                Vec::new()
            }
        };
        let signature = step_signature(&fields);

        debug!(
            "[目标 {}] 本步共 {} 个字段",
            ctx.target_index,
            fields.len()
        );

        let mut newly_resolved = 0;
        for field in &fields {
            if self
                .handle_field(driver, ctx, field, variant, tracker, answers)
                .await
            {
                newly_resolved += 1;
            }
        }

        tracker.record_step(signature, newly_resolved);
        if let Some(stagnation) = tracker.check() {
            warn!("[目标 {}] ⚠️ 表单卡住: {}", ctx.target_index, stagnation);
            return Ok(StepOutcome::Stalled(stagnation));
        }

        let control = match self
            .with_retries("find_action_control", move || driver.find_action_control())
            .await
        {
            Ok(Some(control)) => control,
            Ok(None) => return Ok(StepOutcome::NoActionControl),
            Err(e) => {
                warn!("[目标 {}] ⚠️ 查找动作按钮失败: {}", ctx.target_index, e);
                return Ok(StepOutcome::NoActionControl);
            }
        };

        match classify_action(&control.label) {
            Some(ActionIntent::Submit) => Ok(StepOutcome::ReadyToSubmit(control)),
            Some(ActionIntent::Advance) => Ok(StepOutcome::Advance(control)),
            None => {
                warn!(
                    "[目标 {}] ⚠️ 无法识别的动作按钮: {}",
                    ctx.target_index, control.label
                );
                Ok(StepOutcome::NoActionControl)
            }
        }
    }

    /// 处理单个字段；返回这个字段是否为新解决
    async fn handle_field(
        &self,
        driver: &dyn FormDriver,
        ctx: &TargetCtx,
        field: &FieldDescriptor,
        variant: &VariantRecommendation,
        tracker: &mut StepTracker,
        answers: &mut Vec<AnswerRecord>,
    ) -> bool {
        let key = field.key();

        if field.kind == FieldKind::Attachment {
            if let Some(existing) = field.existing_value() {
                return tracker.mark_resolved(key, existing);
            }
            let path = variant.attachment_path.to_string_lossy().to_string();
            info!("[目标 {}] 📎 上传简历: {}", ctx.target_index, path);
            return self.apply(driver, ctx, field, &path, tracker).await;
        }

        if let Some(existing) = field.existing_value() {
            if !field.kind.is_enumerated() {
                return tracker.mark_resolved(key, existing);
            }
            if let Some(selection) = valid_selection(field, existing) {
                debug!(
                    "[目标 {}] 确认已选值: {} = {}",
                    ctx.target_index, field.purpose, selection
                );
                return self.apply(driver, ctx, field, &selection, tracker).await;
            }
            // 已有值不在选项里，按空字段处理
        }

        if let Some(cached) = tracker.cached_value(&key).map(str::to_string) {
            debug!(
                "[目标 {}] 字段被重新渲染，复用已填写的值: {}",
                ctx.target_index, field.purpose
            );
            self.apply(driver, ctx, field, &cached, tracker).await;
            return false;
        }

        let record = self.ask(ctx, field, answers).await;
        let value = record.answer.clone();
        answers.push(record);

        if value.trim().is_empty() {
            if field.required {
                warn!(
                    "[目标 {}] ⚠️ 必填字段没有答案: {}",
                    ctx.target_index, field.purpose
                );
                tracker.mark_unresolved(key);
            }
            return false;
        }

        self.apply(driver, ctx, field, &value, tracker).await
    }

    /// 询问答题服务并规范化答案；失败时降级为空答案、置信度 0
    async fn ask(
        &self,
        ctx: &TargetCtx,
        field: &FieldDescriptor,
        answers: &[AnswerRecord],
    ) -> AnswerRecord {
        let prior: Vec<(String, String)> = answers
            .iter()
            .filter(|a| !a.is_empty())
            .rev()
            .take(PRIOR_ANSWER_LIMIT)
            .map(|a| (a.question.clone(), a.answer.clone()))
            .collect();

        let query = OracleQuery::new(&field.purpose, field.kind)
            .with_options(field.options.clone())
            .with_prior_answers(prior);

        let mut record = match self.oracle.answer(&query).await {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "[目标 {}] ⚠️ 答题失败: {} ({})",
                    ctx.target_index, field.purpose, e
                );
                AnswerRecord::new(&field.purpose, "", 0.0, field.kind)
                    .with_reasoning(format!("oracle error: {}", e))
            }
        };

        self.normalize(field, &mut record);

        info!(
            "[目标 {}] 💬 {} → {} (置信度 {:.2})",
            ctx.target_index,
            truncate_text(&field.purpose, 40),
            truncate_text(&record.answer, 40),
            record.confidence()
        );
        record
    }

    /// 把答案规范化到字段允许的取值；无法规范化时只降一次置信度
    fn normalize(&self, field: &FieldDescriptor, record: &mut AnswerRecord) {
        if record.is_empty() {
            return;
        }

        match field.kind {
            FieldKind::EnumSingle if !field.options.is_empty() => {
                match match_option(&field.options, &record.answer) {
                    Some(option) => record.answer = option,
                    None => record.penalize(self.settings.enum_mismatch_penalty),
                }
            }
            FieldKind::EnumMulti if !field.options.is_empty() => {
                let mut mismatched = false;
                let parts: Vec<String> = record
                    .answer
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| {
                        match_option(&field.options, part).unwrap_or_else(|| {
                            mismatched = true;
                            part.to_string()
                        })
                    })
                    .collect();
                record.answer = parts.join(", ");
                if mismatched {
                    record.penalize(self.settings.enum_mismatch_penalty);
                }
            }
            FieldKind::Numeric => match first_number(&record.answer) {
                Some(number) => record.answer = number,
                None => record.penalize(self.settings.enum_mismatch_penalty),
            },
            _ => {}
        }
    }

    /// 写入字段值，失败时重试；重试耗尽则标记为未解决
    async fn apply(
        &self,
        driver: &dyn FormDriver,
        ctx: &TargetCtx,
        field: &FieldDescriptor,
        value: &str,
        tracker: &mut StepTracker,
    ) -> bool {
        match self
            .with_retries("set_value", move || driver.set_value(field, value))
            .await
        {
            Ok(()) => tracker.mark_resolved(field.key(), value),
            Err(e) => {
                warn!(
                    "[目标 {}] ⚠️ 字段写入失败: {} ({})",
                    ctx.target_index, field.purpose, e
                );
                tracker.mark_unresolved(field.key());
                false
            }
        }
    }

    /// 带超时和重试的驱动调用
    async fn with_retries<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, BrowserError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        let attempts = self.settings.ui_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match timed(operation, self.settings.ui_timeout, call()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    debug!("{} 第 {}/{} 次失败: {}", operation, attempt, attempts, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 枚举控件上的已有值是否为合法选项；多选时每一项都要合法
fn valid_selection(field: &FieldDescriptor, existing: &str) -> Option<String> {
    if let Some(option) = field.find_option(existing) {
        return Some(option.to_string());
    }
    if field.kind != FieldKind::EnumMulti {
        return None;
    }
    let parts: Option<Vec<&str>> = existing
        .split(',')
        .map(|part| field.find_option(part))
        .collect();
    parts.map(|parts| parts.join(", "))
}
