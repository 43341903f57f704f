//! 流程层测试用的脚本化驱动和答题服务

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{BrowserError, OracleError};
use crate::infrastructure::{ActionControl, FormDriver};
use crate::models::{
    AnswerRecord, FieldDescriptor, Locale, Target, VariantCategory, VariantRecommendation,
};
use crate::services::variant_selector::attachment_path;
use crate::services::{AnswerOracle, Classification, OracleQuery, VariantClassifier, VariantSelector};

/// 表单的一步：字段 + 动作按钮文字
#[derive(Debug, Clone)]
pub struct FakeStep {
    pub fields: Vec<FieldDescriptor>,
    pub action: Option<String>,
}

impl FakeStep {
    pub fn new(fields: Vec<FieldDescriptor>, action: &str) -> Self {
        Self {
            fields,
            action: Some(action.to_string()),
        }
    }

    pub fn without_action(fields: Vec<FieldDescriptor>) -> Self {
        Self {
            fields,
            action: None,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    current: usize,
    set_values: Vec<(String, String)>,
    clicks: Vec<String>,
    dismissed: bool,
}

/// 按脚本走的假表单
///
/// 点击动作按钮后前进到下一步（`stuck` 时停在原地）
#[derive(Debug, Default)]
pub struct FakeDriver {
    steps: Vec<FakeStep>,
    unavailable: bool,
    blocked: bool,
    no_entry: bool,
    stuck: bool,
    blind: bool,
    no_action_lookup: bool,
    blocked_after_submit: bool,
    failing_controls: HashSet<String>,
    state: Mutex<FakeState>,
}

impl FakeDriver {
    pub fn new(steps: Vec<FakeStep>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn blocked(mut self) -> Self {
        self.blocked = true;
        self
    }

    pub fn without_entry(mut self) -> Self {
        self.no_entry = true;
        self
    }

    pub fn stuck(mut self) -> Self {
        self.stuck = true;
        self
    }

    /// find_controls 永远失败
    pub fn blind(mut self) -> Self {
        self.blind = true;
        self
    }

    /// find_action_control 永远失败
    pub fn without_action_lookup(mut self) -> Self {
        self.no_action_lookup = true;
        self
    }

    /// 点击提交按钮之后才出现拦截页面
    pub fn blocked_after_submit(mut self) -> Self {
        self.blocked_after_submit = true;
        self
    }

    /// 这个控件的 set_value 永远失败
    pub fn failing(mut self, control_id: &str) -> Self {
        self.failing_controls.insert(control_id.to_string());
        self
    }

    pub fn set_values(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().set_values.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn dismissed(&self) -> bool {
        self.state.lock().unwrap().dismissed
    }

    fn current_step(&self) -> Option<&FakeStep> {
        let index = self.state.lock().unwrap().current;
        self.steps.get(index)
    }
}

#[async_trait]
impl FormDriver for FakeDriver {
    async fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn is_target_unavailable(&self) -> Result<bool, BrowserError> {
        Ok(self.unavailable)
    }

    async fn is_hard_blocked(&self) -> Result<bool, BrowserError> {
        if self.blocked_after_submit {
            let state = self.state.lock().unwrap();
            return Ok(state
                .clicks
                .iter()
                .any(|label| label.to_lowercase().contains("submit")));
        }
        Ok(self.blocked)
    }

    async fn open_form(&self) -> Result<bool, BrowserError> {
        Ok(!self.no_entry)
    }

    async fn find_controls(&self) -> Result<Vec<FieldDescriptor>, BrowserError> {
        if self.blind {
            return Err(BrowserError::Timeout {
                operation: "find_controls".into(),
                secs: 1,
            });
        }
        Ok(self
            .current_step()
            .map(|step| step.fields.clone())
            .unwrap_or_default())
    }

    async fn set_value(&self, field: &FieldDescriptor, value: &str) -> Result<(), BrowserError> {
        if self.failing_controls.contains(&field.control_id) {
            return Err(BrowserError::UnexpectedPayload {
                operation: "set_value".into(),
                reason: format!("control {} detached", field.control_id),
            });
        }
        self.state
            .lock()
            .unwrap()
            .set_values
            .push((field.control_id.clone(), value.to_string()));
        Ok(())
    }

    async fn find_action_control(&self) -> Result<Option<ActionControl>, BrowserError> {
        if self.no_action_lookup {
            return Err(BrowserError::Timeout {
                operation: "find_action_control".into(),
                secs: 1,
            });
        }
        Ok(self
            .current_step()
            .and_then(|step| step.action.clone())
            .map(|label| ActionControl::new("action", label)))
    }

    async fn click_action(&self, control: &ActionControl) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.clicks.push(control.label.clone());
        if !self.stuck && state.current + 1 < self.steps.len() {
            state.current += 1;
        }
        Ok(())
    }

    async fn dismiss_form(&self) -> Result<(), BrowserError> {
        self.state.lock().unwrap().dismissed = true;
        Ok(())
    }
}

/// 按问题关键词给出固定答案的答题服务；没有匹配的问题返回错误
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    answers: HashMap<String, (String, f64)>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, keyword: &str, answer: &str, confidence: f64) -> Self {
        self.answers
            .insert(keyword.to_lowercase(), (answer.to_string(), confidence));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerOracle for ScriptedOracle {
    async fn answer(&self, query: &OracleQuery) -> Result<AnswerRecord, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let question = query.question.to_lowercase();
        self.answers
            .iter()
            .find(|(keyword, _)| question.contains(keyword.as_str()))
            .map(|(_, (answer, confidence))| {
                AnswerRecord::new(&query.question, answer, *confidence, query.kind)
            })
            .ok_or_else(|| OracleError::EmptyContent {
                model: "scripted".into(),
            })
    }
}

pub fn variant() -> VariantRecommendation {
    VariantRecommendation {
        category: VariantCategory::Software,
        locale: Locale::En,
        attachment_path: PathBuf::from("/cv/cv_software_en.pdf"),
        confidence: 0.9,
        reasoning: "scripted".into(),
    }
}

/// 总是返回同一类别的分类服务
pub struct FixedClassifier(pub &'static str);

#[async_trait]
impl VariantClassifier for FixedClassifier {
    async fn classify(&self, _: &str, _: &str) -> Result<Classification, OracleError> {
        Ok(Classification {
            category: self.0.to_string(),
            confidence: 0.9,
            reasoning: "fixed".into(),
        })
    }
}

/// 建一个包含全部四份简历的附件目录
pub fn attachments_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for category in [VariantCategory::Software, VariantCategory::Automation] {
        for locale in [Locale::En, Locale::Es] {
            let path = attachment_path(dir.path(), category, locale).unwrap();
            std::fs::write(path, b"%PDF").unwrap();
        }
    }
    dir
}

pub fn selector(dir: &Path) -> VariantSelector {
    VariantSelector::new(std::sync::Arc::new(FixedClassifier("software")), dir)
}

pub fn target(id: &str) -> Target {
    Target {
        id: id.to_string(),
        url: format!("https://jobs.example.com/{}", id),
        title: "Backend Engineer".into(),
        company: "Acme".into(),
        description: "We are looking for a Rust developer with 3 years of experience".into(),
        locale_hints: vec!["en".into()],
    }
}
