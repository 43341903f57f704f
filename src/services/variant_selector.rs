//! 附件变体选择 - 业务能力层
//!
//! 只负责"这个目标用哪一份简历"能力，不关心流程
//!
//! 分类服务失败永远不会中止目标：退回默认类别并降低置信度；
//! 只有两份候选附件都不存在时才返回错误

use async_trait::async_trait;
use phf::phf_map;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{FlowError, OracleError};
use crate::models::{Locale, Target, VariantCategory, VariantRecommendation};
use crate::services::llm_service::LlmService;

/// (类别:语言) → 附件文件名，相对于附件目录
static ATTACHMENT_FILES: phf::Map<&'static str, &'static str> = phf_map! {
    "software:en" => "cv_software_en.pdf",
    "software:es" => "cv_software_es.pdf",
    "automation:en" => "cv_automation_en.pdf",
    "automation:es" => "cv_automation_es.pdf",
};

/// 置信度下限（类别不合法 / 回退到另一类别时）
const CONFIDENCE_FLOOR: f64 = 0.3;
/// 分类服务失败时使用的置信度
const ORACLE_FAILURE_CONFIDENCE: f64 = 0.2;

const SPANISH_KEYWORDS: &[&str] = &[
    "años",
    "experiencia",
    "requisitos",
    "conocimientos",
    "habilidades",
    "empresa",
    "trabajo",
    "puesto",
    "equipo",
    "desarrollo",
    "buscamos",
    "necesitamos",
    "ofrecemos",
    "únete",
    "postular",
];

const ENGLISH_KEYWORDS: &[&str] = &[
    "years",
    "experience",
    "requirements",
    "skills",
    "knowledge",
    "company",
    "work",
    "position",
    "team",
    "development",
    "looking",
    "seeking",
    "we need",
    "join",
    "apply",
];

/// 分类服务的原始结果，类别尚未校验
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Classification {
    #[serde(alias = "cv_type")]
    pub category: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

fn default_confidence() -> f64 {
    0.5
}

/// 岗位分类能力
#[async_trait]
pub trait VariantClassifier: Send + Sync {
    async fn classify(&self, title: &str, description: &str)
        -> Result<Classification, OracleError>;
}

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are an expert recruiter.
Decide which resume fits a job posting best.

Available resumes:
1. "software": backend / fullstack development, web APIs, microservices
2. "automation": process automation, data engineering, AI / ML integrations

Always answer with valid JSON:
{"category": "software" or "automation", "confidence": 0.0-1.0, "reasoning": "short explanation"}"#;

/// 基于 LLM 的岗位分类
pub struct LlmVariantClassifier {
    llm: Arc<LlmService>,
}

impl LlmVariantClassifier {
    pub fn new(llm: Arc<LlmService>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl VariantClassifier for LlmVariantClassifier {
    async fn classify(
        &self,
        title: &str,
        description: &str,
    ) -> Result<Classification, OracleError> {
        let description: String = description.chars().take(1000).collect();
        let user_message = format!(
            "JOB TO ANALYZE:\nTitle: {}\nDescription: {}\n\nANSWER IN JSON:",
            title, description
        );

        let value = self
            .llm
            .send_for_json(&user_message, Some(CLASSIFIER_SYSTEM_PROMPT))
            .await?;

        serde_json::from_value(value.clone()).map_err(|e| OracleError::MalformedResponse {
            response: value.to_string(),
            reason: e.to_string(),
        })
    }
}

/// 变体选择器
pub struct VariantSelector {
    classifier: Arc<dyn VariantClassifier>,
    attachments_dir: PathBuf,
}

impl VariantSelector {
    pub fn new(classifier: Arc<dyn VariantClassifier>, attachments_dir: impl Into<PathBuf>) -> Self {
        Self {
            classifier,
            attachments_dir: attachments_dir.into(),
        }
    }

    /// 为目标选择附件
    ///
    /// 只有两个类别的附件都不存在时返回错误
    pub async fn select(&self, target: &Target) -> Result<VariantRecommendation, FlowError> {
        let locale = detect_locale(target);
        debug!("语言: {}", locale);

        let (mut category, mut confidence, mut reasoning) =
            match self.classifier.classify(&target.title, &target.description).await {
                Ok(classification) => match VariantCategory::parse(&classification.category) {
                    Some(category) => (
                        category,
                        crate::models::clamp_confidence(classification.confidence),
                        classification.reasoning,
                    ),
                    None => {
                        warn!(
                            "⚠️  分类结果不合法 '{}'，使用默认类别 {}",
                            classification.category,
                            VariantCategory::DEFAULT
                        );
                        (
                            VariantCategory::DEFAULT,
                            (crate::models::clamp_confidence(classification.confidence) - 0.2)
                                .max(CONFIDENCE_FLOOR),
                            classification.reasoning,
                        )
                    }
                },
                Err(e) => {
                    warn!("⚠️  分类服务失败，使用默认类别: {}", e);
                    (
                        VariantCategory::DEFAULT,
                        ORACLE_FAILURE_CONFIDENCE,
                        format!("classifier failed: {}", e),
                    )
                }
            };

        let mut attachment_path = self.existing_attachment(category, locale).await;
        if attachment_path.is_none() {
            let alternative = category.other();
            warn!(
                "⚠️  未找到附件 {}-{}，尝试 {}-{}",
                category, locale, alternative, locale
            );
            attachment_path = self.existing_attachment(alternative, locale).await;
            if attachment_path.is_some() {
                category = alternative;
                confidence = (confidence - 0.3).max(CONFIDENCE_FLOOR);
                reasoning = format!("{} (fallback to {})", reasoning, alternative);
            }
        }

        let attachment_path = attachment_path.ok_or_else(|| {
            FlowError::unavailable(format!("no attachment available for locale {}", locale))
        })?;

        let recommendation = VariantRecommendation {
            category,
            locale,
            attachment_path,
            confidence,
            reasoning,
        };
        info!(
            "📎 附件: {} ({}) - 置信度: {:.2}",
            recommendation.variant_id(),
            recommendation.attachment_path.display(),
            recommendation.confidence
        );
        Ok(recommendation)
    }

    async fn existing_attachment(&self, category: VariantCategory, locale: Locale) -> Option<PathBuf> {
        let path = attachment_path(&self.attachments_dir, category, locale)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }
}

/// 查映射表得到附件路径（不检查文件是否存在）
pub fn attachment_path(dir: &Path, category: VariantCategory, locale: Locale) -> Option<PathBuf> {
    let key = format!("{}:{}", category, locale);
    ATTACHMENT_FILES.get(key.as_str()).map(|file| dir.join(file))
}

/// 确定目标语言：优先使用目标自带的语言提示，否则按关键词判断
pub fn detect_locale(target: &Target) -> Locale {
    if let Some(locale) = target.locale_hints.iter().find_map(|hint| Locale::parse(hint)) {
        return locale;
    }
    detect_language(&format!("{} {}", target.title, target.description))
}

/// 关键词计数，西语关键词更多时判为 es，否则 en
pub fn detect_language(text: &str) -> Locale {
    let text = text.to_lowercase();
    let count = |keywords: &[&str]| keywords.iter().filter(|k| text.contains(*k)).count();
    let spanish = count(SPANISH_KEYWORDS);
    let english = count(ENGLISH_KEYWORDS);
    debug!("语言判断: es={} en={}", spanish, english);
    if spanish > english {
        Locale::Es
    } else {
        Locale::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    struct ScriptedClassifier {
        result: Mutex<Option<Result<Classification, OracleError>>>,
    }

    impl ScriptedClassifier {
        fn ok(category: &str, confidence: f64) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(Ok(Classification {
                    category: category.to_string(),
                    confidence,
                    reasoning: "scripted".to_string(),
                }))),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(Err(OracleError::Timeout { secs: 30 }))),
            })
        }
    }

    #[async_trait]
    impl VariantClassifier for ScriptedClassifier {
        async fn classify(&self, _: &str, _: &str) -> Result<Classification, OracleError> {
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(OracleError::Timeout { secs: 0 }))
        }
    }

    fn target(title: &str, description: &str, hints: &[&str]) -> Target {
        Target {
            id: "t-1".into(),
            url: "https://jobs.example.com/t-1".into(),
            title: title.into(),
            company: String::new(),
            description: description.into(),
            locale_hints: hints.iter().map(|h| h.to_string()).collect(),
        }
    }

    fn touch(dir: &Path, category: VariantCategory, locale: Locale) {
        let path = attachment_path(dir, category, locale).unwrap();
        std::fs::write(path, b"%PDF").unwrap();
    }

    #[test]
    fn every_pair_has_a_mapping() {
        for category in [VariantCategory::Software, VariantCategory::Automation] {
            for locale in [Locale::En, Locale::Es] {
                assert!(attachment_path(Path::new("cfg"), category, locale).is_some());
            }
        }
    }

    #[test]
    fn locale_hint_wins_over_keywords() {
        let t = target("Backend Developer", "We are looking for a team player with experience", &["es-CL"]);
        assert_eq!(detect_locale(&t), Locale::Es);
    }

    #[test]
    fn keyword_heuristic_defaults_to_english() {
        assert_eq!(
            detect_language("Buscamos desarrollador con experiencia y conocimientos en Rust"),
            Locale::Es
        );
        assert_eq!(detect_language("Rust"), Locale::En);
    }

    #[tokio::test]
    async fn valid_category_keeps_confidence() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), VariantCategory::Automation, Locale::En);
        let selector = VariantSelector::new(ScriptedClassifier::ok("automation", 0.9), dir.path());

        let rec = assert_ok!(selector.select(&target("Data Engineer", "ETL pipelines", &["en"])).await);
        assert_eq!(rec.category, VariantCategory::Automation);
        assert_eq!(rec.confidence, 0.9);
        assert_eq!(rec.variant_id(), "automation-en");
    }

    #[tokio::test]
    async fn invalid_category_falls_back_to_default_with_penalty() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), VariantCategory::Software, Locale::En);
        let selector = VariantSelector::new(ScriptedClassifier::ok("marketing", 0.45), dir.path());

        let rec = assert_ok!(selector.select(&target("Growth", "", &["en"])).await);
        assert_eq!(rec.category, VariantCategory::Software);
        assert_eq!(rec.confidence, CONFIDENCE_FLOOR);
    }

    #[tokio::test]
    async fn missing_primary_uses_other_category() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), VariantCategory::Software, Locale::Es);
        let selector = VariantSelector::new(ScriptedClassifier::ok("automation", 0.9), dir.path());

        let rec = assert_ok!(selector.select(&target("Ingeniero de datos", "", &["es"])).await);
        assert_eq!(rec.category, VariantCategory::Software);
        assert_eq!(rec.locale, Locale::Es);
        assert!((rec.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn classifier_failure_uses_low_confidence_default() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), VariantCategory::Software, Locale::En);
        let selector = VariantSelector::new(ScriptedClassifier::failing(), dir.path());

        let rec = assert_ok!(selector.select(&target("Developer", "", &[])).await);
        assert_eq!(rec.category, VariantCategory::Software);
        assert_eq!(rec.confidence, ORACLE_FAILURE_CONFIDENCE);
    }

    #[tokio::test]
    async fn no_attachment_at_all_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let selector = VariantSelector::new(ScriptedClassifier::ok("software", 0.9), dir.path());

        let err = assert_err!(selector.select(&target("Developer", "", &["en"])).await);
        assert_eq!(err.kind, crate::error::FaultKind::ResourceUnavailable);
    }
}
