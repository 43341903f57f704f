use anyhow::Result;
use async_trait::async_trait;
use auto_apply::browser::connect_to_browser_and_page;
use auto_apply::config::Config;
use auto_apply::error::{BrowserError, OracleError};
use auto_apply::infrastructure::{ActionControl, ChromeFormDriver, FormDriver, JsExecutor};
use auto_apply::models::{
    AnswerRecord, FieldDescriptor, FieldKind, Locale, ProcessingStatus, Target, VariantCategory,
};
use auto_apply::orchestrator::{run_targets, RunContext, TargetProcessor};
use auto_apply::services::variant_selector::attachment_path;
use auto_apply::services::{
    AnswerOracle, Classification, Notifier, OracleQuery, OutcomeEvent, OutcomeSink, RunSummary,
    StateStore, VariantClassifier, VariantSelector,
};
use auto_apply::utils::logging;
use auto_apply::workflow::{ApplicationFlow, FlowSettings, StepSettings};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ========== 脚本化的站点 ==========

/// 一个目标页面：若干表单步骤，每步 (字段, 按钮文字)
#[derive(Clone, Default)]
struct Page {
    steps: Vec<(Vec<FieldDescriptor>, String)>,
    closed: bool,
    blocked: bool,
    /// 提交之后才出现拦截页面
    block_after_submit: bool,
    stuck: bool,
}

#[derive(Default)]
struct SiteState {
    url: String,
    step: usize,
    navigated: Vec<String>,
    uploads: Vec<String>,
    submitted: Vec<String>,
}

/// 按 URL 返回不同页面的假站点
#[derive(Default)]
struct ScriptedSite {
    pages: HashMap<String, Page>,
    state: Mutex<SiteState>,
}

impl ScriptedSite {
    fn with_page(mut self, target: &Target, page: Page) -> Self {
        self.pages.insert(target.url.clone(), page);
        self
    }

    fn page(&self) -> Page {
        let url = self.state.lock().unwrap().url.clone();
        self.pages.get(&url).cloned().unwrap_or_default()
    }

    fn navigated(&self) -> Vec<String> {
        self.state.lock().unwrap().navigated.clone()
    }

    fn uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }

    fn submitted(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl FormDriver for ScriptedSite {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.step = 0;
        state.navigated.push(url.to_string());
        Ok(())
    }

    async fn is_target_unavailable(&self) -> Result<bool, BrowserError> {
        Ok(self.page().closed)
    }

    async fn is_hard_blocked(&self) -> Result<bool, BrowserError> {
        let page = self.page();
        let state = self.state.lock().unwrap();
        Ok(page.blocked || (page.block_after_submit && state.submitted.contains(&state.url)))
    }

    async fn open_form(&self) -> Result<bool, BrowserError> {
        Ok(!self.page().steps.is_empty())
    }

    async fn find_controls(&self) -> Result<Vec<FieldDescriptor>, BrowserError> {
        let step = self.state.lock().unwrap().step;
        Ok(self
            .page()
            .steps
            .get(step)
            .map(|(fields, _)| fields.clone())
            .unwrap_or_default())
    }

    async fn set_value(&self, field: &FieldDescriptor, value: &str) -> Result<(), BrowserError> {
        if field.kind == FieldKind::Attachment {
            self.state.lock().unwrap().uploads.push(value.to_string());
        }
        Ok(())
    }

    async fn find_action_control(&self) -> Result<Option<ActionControl>, BrowserError> {
        let step = self.state.lock().unwrap().step;
        Ok(self
            .page()
            .steps
            .get(step)
            .map(|(_, label)| ActionControl::new("btn", label.clone())))
    }

    async fn click_action(&self, control: &ActionControl) -> Result<(), BrowserError> {
        let page = self.page();
        let mut state = self.state.lock().unwrap();
        if control.label.to_lowercase().contains("submit") {
            let url = state.url.clone();
            state.submitted.push(url);
        } else if !page.stuck {
            state.step += 1;
        }
        Ok(())
    }

    async fn dismiss_form(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

// ========== 脚本化的服务 ==========

/// 按问题关键词回答
struct KeywordOracle(Vec<(&'static str, &'static str, f64)>);

#[async_trait]
impl AnswerOracle for KeywordOracle {
    async fn answer(&self, query: &OracleQuery) -> Result<AnswerRecord, OracleError> {
        let question = query.question.to_lowercase();
        self.0
            .iter()
            .find(|(keyword, _, _)| question.contains(keyword))
            .map(|(_, answer, confidence)| {
                AnswerRecord::new(&query.question, *answer, *confidence, query.kind)
            })
            .ok_or(OracleError::Timeout { secs: 30 })
    }
}

struct FixedClassifier(&'static str);

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

#[derive(Default)]
struct RecordingSink(Mutex<Vec<OutcomeEvent>>);

#[async_trait]
impl OutcomeSink for RecordingSink {
    async fn emit(&self, event: &OutcomeEvent) -> Result<()> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<RunSummary>>);

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, summary: &RunSummary) -> Result<()> {
        self.0.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

// ========== 测试环境 ==========

struct Harness {
    _dir: TempDir,
    ctx: RunContext,
    store: Arc<StateStore>,
    sink: Arc<RecordingSink>,
    notifier: Arc<RecordingNotifier>,
}

fn touch_attachment(dir: &Path, category: VariantCategory, locale: Locale) {
    let path = attachment_path(dir, category, locale).unwrap();
    std::fs::write(path, b"%PDF").unwrap();
}

fn harness(attachments: &[(VariantCategory, Locale)]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    for (category, locale) in attachments {
        touch_attachment(dir.path(), *category, *locale);
    }

    let config = Config {
        pacing_min_ms: 0,
        pacing_max_ms: 0,
        state_file: dir.path().join("state.json").to_string_lossy().to_string(),
        ..Config::default()
    };

    let oracle = Arc::new(KeywordOracle(vec![
        ("email", "me@example.com", 0.95),
        ("years", "4", 0.9),
        ("salary", "50000", 0.7),
        ("hard problem", "It depends", 0.4),
    ]));
    let selector = VariantSelector::new(Arc::new(FixedClassifier("software")), dir.path());
    let flow = ApplicationFlow::new(
        selector,
        oracle,
        FlowSettings::from_config(&config),
        StepSettings {
            ui_timeout: Duration::from_secs(1),
            ..StepSettings::from_config(&config)
        },
    );

    let store = Arc::new(StateStore::new(&config.state_file));
    let sink = Arc::new(RecordingSink::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let processor = TargetProcessor::new(flow, store.clone(), sink.clone());
    let ctx = RunContext::new(
        config,
        Arc::new(Default::default()),
        store.clone(),
        processor,
        notifier.clone(),
    );

    Harness {
        _dir: dir,
        ctx,
        store,
        sink,
        notifier,
    }
}

fn target(id: &str) -> Target {
    Target {
        id: id.to_string(),
        url: format!("https://jobs.example.com/{}", id),
        title: format!("Backend Engineer {}", id),
        company: "Acme".into(),
        description: String::new(),
        locale_hints: vec!["en".into()],
    }
}

/// 两步表单：联系方式 + 简历，然后一个问题
fn form(question: &str) -> Page {
    Page {
        steps: vec![
            (
                vec![
                    FieldDescriptor::new("c1", FieldKind::FreeText, "Email").required(),
                    FieldDescriptor::new("c2", FieldKind::Attachment, "Resume"),
                ],
                "Next".to_string(),
            ),
            (
                vec![FieldDescriptor::new("c3", FieldKind::FreeText, question).required()],
                "Submit application".to_string(),
            ),
        ],
        ..Page::default()
    }
}

const EVERY_ATTACHMENT: &[(VariantCategory, Locale)] = &[
    (VariantCategory::Software, Locale::En),
    (VariantCategory::Software, Locale::Es),
    (VariantCategory::Automation, Locale::En),
    (VariantCategory::Automation, Locale::Es),
];

// ========== 场景测试 ==========

#[tokio::test]
async fn confident_application_is_submitted_and_recorded() {
    let h = harness(EVERY_ATTACHMENT);
    let t1 = target("t1");
    let site = ScriptedSite::default().with_page(&t1, form("Years of Rust"));

    let summary = run_targets(&h.ctx, &site, &[t1.clone()]).await.unwrap();

    assert_eq!(site.submitted(), vec![t1.url.clone()]);
    let record = h.store.get("t1").unwrap();
    assert_eq!(record.status, ProcessingStatus::Applied);
    assert_eq!(record.variant_id.as_deref(), Some("software-en"));
    assert_eq!(summary.count(ProcessingStatus::Applied), 1);
    assert_eq!(h.sink.0.lock().unwrap().len(), 1);
    assert_eq!(h.notifier.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn medium_and_low_confidence_follow_policy() {
    let h = harness(EVERY_ATTACHMENT);
    let uncertain = target("uncertain");
    let manual = target("manual");
    let site = ScriptedSite::default()
        .with_page(&uncertain, form("Expected salary"))
        .with_page(&manual, form("Describe a hard problem"));

    run_targets(&h.ctx, &site, &[uncertain.clone(), manual.clone()])
        .await
        .unwrap();

    assert_eq!(
        h.store.get("uncertain").unwrap().status,
        ProcessingStatus::Uncertain
    );
    let held = h.store.get("manual").unwrap();
    assert_eq!(held.status, ProcessingStatus::Manual);
    assert_eq!(held.error.as_deref(), Some("low-confidence"));
    // 低置信度的目标没有提交
    assert_eq!(site.submitted(), vec![uncertain.url.clone()]);
}

#[tokio::test]
async fn rerun_skips_processed_targets() {
    let h = harness(EVERY_ATTACHMENT);
    let t1 = target("t1");
    let site = ScriptedSite::default().with_page(&t1, form("Years of Rust"));

    run_targets(&h.ctx, &site, &[t1.clone()]).await.unwrap();
    let summary = run_targets(&h.ctx, &site, &[t1.clone()]).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.processed, 0);
    assert_eq!(site.navigated().len(), 1);
    assert_eq!(h.store.get("t1").unwrap().status, ProcessingStatus::Applied);
    assert_eq!(h.sink.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn hard_block_marks_remaining_targets_pending() {
    let h = harness(EVERY_ATTACHMENT);
    let (t1, t2, t3) = (target("t1"), target("t2"), target("t3"));
    let blocked = Page {
        blocked: true,
        ..form("Years of Rust")
    };
    let site = ScriptedSite::default()
        .with_page(&t1, form("Years of Rust"))
        .with_page(&t2, blocked)
        .with_page(&t3, form("Years of Rust"));

    let summary = run_targets(&h.ctx, &site, &[t1.clone(), t2.clone(), t3.clone()])
        .await
        .unwrap();

    assert!(summary.aborted);
    assert_eq!(h.store.get("t1").unwrap().status, ProcessingStatus::Applied);
    assert_eq!(h.store.get("t2").unwrap().status, ProcessingStatus::Pending);
    assert_eq!(h.store.get("t3").unwrap().status, ProcessingStatus::Pending);
    assert!(!site.navigated().contains(&t3.url));

    // PENDING 不算已处理，下次运行会重试
    assert!(!h.store.is_processed("t2"));
    assert!(!h.store.is_processed("t3"));
}

#[tokio::test]
async fn block_after_submit_is_never_submitted_twice() {
    let h = harness(EVERY_ATTACHMENT);
    let (t1, t2) = (target("t1"), target("t2"));
    let site = ScriptedSite::default()
        .with_page(
            &t1,
            Page {
                block_after_submit: true,
                ..form("Years of Rust")
            },
        )
        .with_page(&t2, form("Years of Rust"));
    let targets = [t1.clone(), t2.clone()];

    let first = run_targets(&h.ctx, &site, &targets).await.unwrap();

    assert!(first.aborted);
    assert_eq!(first.count(ProcessingStatus::Applied), 1);
    assert_eq!(h.store.get("t1").unwrap().status, ProcessingStatus::Applied);
    assert_eq!(h.store.get("t2").unwrap().status, ProcessingStatus::Pending);
    assert_eq!(h.sink.0.lock().unwrap().len(), 1);

    let second = run_targets(&h.ctx, &site, &targets).await.unwrap();

    assert!(!second.aborted);
    assert_eq!(second.skipped, 1);
    assert_eq!(site.submitted(), vec![t1.url.clone(), t2.url.clone()]);
    assert_eq!(h.store.get("t2").unwrap().status, ProcessingStatus::Applied);
}

#[tokio::test]
async fn hard_block_keeps_existing_terminal_records() {
    let h = harness(EVERY_ATTACHMENT);
    let (t1, t2) = (target("t1"), target("t2"));
    h.store
        .record("t2", &t2.url, ProcessingStatus::Applied, Some("software-en"), None)
        .unwrap();
    let site = ScriptedSite::default().with_page(
        &t1,
        Page {
            blocked: true,
            ..form("Years of Rust")
        },
    );

    run_targets(&h.ctx, &site, &[t1, t2]).await.unwrap();

    assert_eq!(h.store.get("t1").unwrap().status, ProcessingStatus::Pending);
    assert_eq!(h.store.get("t2").unwrap().status, ProcessingStatus::Applied);
}

#[tokio::test]
async fn missing_primary_attachment_falls_back_to_other_category() {
    let h = harness(&[(VariantCategory::Automation, Locale::En)]);
    let t1 = target("t1");
    let site = ScriptedSite::default().with_page(&t1, form("Years of Rust"));

    run_targets(&h.ctx, &site, &[t1]).await.unwrap();

    let uploads = site.uploads();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].ends_with("cv_automation_en.pdf"));
    assert_eq!(
        h.store.get("t1").unwrap().variant_id.as_deref(),
        Some("automation-en")
    );
}

#[tokio::test]
async fn stalled_form_is_held_for_review() {
    let h = harness(EVERY_ATTACHMENT);
    let t1 = target("t1");
    let stuck = Page {
        stuck: true,
        ..form("Years of Rust")
    };
    let site = ScriptedSite::default().with_page(&t1, stuck);

    run_targets(&h.ctx, &site, &[t1]).await.unwrap();

    let record = h.store.get("t1").unwrap();
    assert_eq!(record.status, ProcessingStatus::Manual);
    assert_eq!(record.error.as_deref(), Some("stalled-form"));
    assert!(site.submitted().is_empty());
}

#[tokio::test]
async fn closed_target_does_not_stop_the_run() {
    let h = harness(EVERY_ATTACHMENT);
    let (closed, open) = (target("closed"), target("open"));
    let site = ScriptedSite::default()
        .with_page(
            &closed,
            Page {
                closed: true,
                ..Page::default()
            },
        )
        .with_page(&open, form("Years of Rust"));

    let summary = run_targets(&h.ctx, &site, &[closed, open]).await.unwrap();

    assert_eq!(
        h.store.get("closed").unwrap().status,
        ProcessingStatus::Unavailable
    );
    assert_eq!(h.store.get("open").unwrap().status, ProcessingStatus::Applied);
    assert_eq!(summary.processed, 2);
    assert!((summary.automation_rate() - 50.0).abs() < 1e-9);
}

// ========== 需要真实浏览器 / LLM 的测试 ==========

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_browser_connection() {
    logging::init(false);

    let config = Config::from_env().expect("配置加载失败");

    let result = connect_to_browser_and_page(config.browser_debug_port, Some(&config.start_url)).await;

    assert!(result.is_ok(), "应该能够成功连接浏览器");
}

#[tokio::test]
#[ignore]
async fn test_read_controls_on_start_page() {
    logging::init(false);

    let config = Config::from_env().expect("配置加载失败");

    let (_browser, page) =
        connect_to_browser_and_page(config.browser_debug_port, Some(&config.start_url))
            .await
            .expect("连接浏览器失败");
    let driver = ChromeFormDriver::new(JsExecutor::new(page));

    let controls = driver.find_controls().await.expect("读取字段失败");
    println!("找到 {} 个字段", controls.len());
    for control in controls {
        println!("  {} [{}] required={}", control.purpose, control.kind, control.required);
    }
}

#[tokio::test]
#[ignore]
async fn test_load_targets() {
    logging::init(false);

    let config = Config::from_env().expect("配置加载失败");

    let result = auto_apply::models::load_all_targets(&config.targets_folder).await;

    assert!(result.is_ok(), "应该能够加载目标文件");
    println!("找到 {} 个目标", result.unwrap().len());
}
