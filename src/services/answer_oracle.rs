//! 答题服务 - 业务能力层
//!
//! 只负责"给一个问题产出答案 + 置信度"能力，不关心流程

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::OracleError;
use crate::models::{AnswerRecord, CandidateProfile, FieldKind};
use crate::services::llm_service::LlmService;

/// 一次答题请求
#[derive(Debug, Clone, PartialEq)]
pub struct OracleQuery {
    pub question: String,
    pub kind: FieldKind,
    /// 枚举类字段的可选值
    pub options: Vec<String>,
    /// 本目标内已经给出的答案 (问题, 答案)，用于保持前后一致
    pub prior_answers: Vec<(String, String)>,
}

impl OracleQuery {
    pub fn new(question: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            question: question.into(),
            kind,
            options: Vec::new(),
            prior_answers: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_prior_answers(mut self, prior_answers: Vec<(String, String)>) -> Self {
        self.prior_answers = prior_answers;
        self
    }
}

/// 答题能力
///
/// 实现方只需保证返回的 `AnswerRecord` 置信度在 [0, 1] 内；
/// 失败时由调用方降级为空答案、置信度 0
#[async_trait]
pub trait AnswerOracle: Send + Sync {
    async fn answer(&self, query: &OracleQuery) -> Result<AnswerRecord, OracleError>;
}

/// LLM 返回的原始答案，进入系统前必须经过 `into_record` 校验
#[derive(Debug, Clone, Deserialize)]
pub struct OracleAnswer {
    #[serde(default)]
    pub answer: serde_json::Value,
    #[serde(default)]
    pub confidence: serde_json::Value,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl OracleAnswer {
    /// 缺失或无法识别的置信度按 0.5 处理
    const DEFAULT_CONFIDENCE: f64 = 0.5;

    pub fn into_record(self, query: &OracleQuery) -> AnswerRecord {
        let answer = match self.answer {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Null => String::new(),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        };

        let confidence = match &self.confidence {
            serde_json::Value::Number(n) => n.as_f64().unwrap_or(Self::DEFAULT_CONFIDENCE),
            serde_json::Value::String(s) => s.trim().parse().unwrap_or(Self::DEFAULT_CONFIDENCE),
            _ => Self::DEFAULT_CONFIDENCE,
        };

        AnswerRecord::new(query.question.clone(), answer, confidence, query.kind)
            .with_reasoning(self.reasoning.unwrap_or_default())
            .with_sources(self.sources)
    }
}

const SYSTEM_PROMPT: &str = r#"You are an HONEST assistant filling in job applications.
Answer strictly from the candidate profile you are given.

Rules:
1. Use only information that is explicit in the profile.
2. Never invent years of experience. If a technology is not in the profile, answer "0" with low confidence.
3. For numeric fields answer ONLY the number, no units.
4. When options are listed you MUST pick exactly one of them.
5. If you lack clear information, confidence must be below 0.5.
6. Always answer with valid JSON:
{"answer": "...", "confidence": 0.0-1.0, "reasoning": "...", "sources": ["..."]}"#;

/// 基于 LLM 的答题服务
///
/// 常见个人信息问题（邮箱、电话、城市、LinkedIn、工作许可、签证担保、薪资）
/// 直接用资料回答，不调用 LLM
pub struct LlmAnswerOracle {
    llm: Arc<LlmService>,
    profile: Arc<CandidateProfile>,
}

impl LlmAnswerOracle {
    pub fn new(llm: Arc<LlmService>, profile: Arc<CandidateProfile>) -> Self {
        Self { llm, profile }
    }

    fn build_user_message(&self, query: &OracleQuery) -> String {
        let profile = &self.profile;
        let mut message = format!(
            "CANDIDATE PROFILE:\nName: {}\nCity: {}\nWork authorized: {}\nRequires sponsorship: {}\n{}\n\n",
            profile.name,
            profile.city,
            yes_no(profile.work_authorized),
            yes_no(profile.requires_sponsorship),
            profile.summary.trim()
        );

        if !query.prior_answers.is_empty() {
            message.push_str("PREVIOUS ANSWERS (stay consistent):\n");
            for (question, answer) in &query.prior_answers {
                message.push_str(&format!("- {}: {}\n", question, answer));
            }
            message.push('\n');
        }

        message.push_str(&format!(
            "QUESTION:\nField type: {}\nQuestion: {}\n",
            query.kind, query.question
        ));

        if !query.options.is_empty() {
            message.push_str("\nAVAILABLE OPTIONS:\n");
            for option in &query.options {
                message.push_str(&format!("- {}\n", option));
            }
        }

        message.push_str("\nANSWER IN JSON:");
        message
    }
}

#[async_trait]
impl AnswerOracle for LlmAnswerOracle {
    async fn answer(&self, query: &OracleQuery) -> Result<AnswerRecord, OracleError> {
        if let Some(record) = profile_shortcut(&self.profile, query) {
            info!("  📇 资料直答: {} → {}", query.question, record.answer);
            return Ok(record);
        }

        let user_message = self.build_user_message(query);
        let value = self
            .llm
            .send_for_json(&user_message, Some(SYSTEM_PROMPT))
            .await?;

        let raw: OracleAnswer =
            serde_json::from_value(value.clone()).map_err(|e| OracleError::MalformedResponse {
                response: value.to_string(),
                reason: e.to_string(),
            })?;

        let record = raw.into_record(query);
        debug!(
            "LLM 答案: {} (置信度 {:.2}) - {}",
            record.answer,
            record.confidence(),
            record.reasoning
        );
        Ok(record)
    }
}

const AUTHORIZATION_PATTERNS: &[&str] = &[
    "legally eligible",
    "authorized to work",
    "authorised to work",
    "autorizado para trabajar",
    "permiso de trabajo",
];
const SPONSORSHIP_PATTERNS: &[&str] = &[
    "require sponsorship",
    "visa sponsorship",
    "need visa",
    "requiere sponsor",
    "necesita visa",
];
const SALARY_PATTERNS: &[&str] = &[
    "salary",
    "salario",
    "renta",
    "pretensiones",
    "compensation",
    "sueldo",
];
const EMAIL_PATTERNS: &[&str] = &["email", "e-mail", "correo"];
const PHONE_PATTERNS: &[&str] = &["phone", "teléfono", "telefono", "celular", "móvil", "movil"];
const CITY_PATTERNS: &[&str] = &["city", "ciudad", "current location", "ubicación", "ubicacion"];
const LINKEDIN_PATTERNS: &[&str] = &["linkedin"];

/// 用资料直接回答常见个人信息问题
///
/// 资料中没有对应信息时返回 None，交给 LLM
pub fn profile_shortcut(profile: &CandidateProfile, query: &OracleQuery) -> Option<AnswerRecord> {
    let question = query.question.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| question.contains(p));
    let record = |answer: String, confidence: f64, reasoning: &str| {
        AnswerRecord::new(query.question.clone(), answer, confidence, query.kind)
            .with_reasoning(reasoning)
            .with_sources(vec!["profile".to_string()])
    };

    if matches(AUTHORIZATION_PATTERNS) {
        let answer = yes_no_option(&query.options, profile.work_authorized);
        return Some(record(answer, 0.95, "work authorization from profile"));
    }
    if matches(SPONSORSHIP_PATTERNS) {
        let answer = yes_no_option(&query.options, profile.requires_sponsorship);
        return Some(record(answer, 0.95, "sponsorship requirement from profile"));
    }
    if matches(SALARY_PATTERNS) {
        let salary = profile.salary_expectation.as_deref()?.trim();
        if salary.is_empty() {
            return None;
        }
        return Some(record(salary.to_string(), 0.95, "salary expectation from profile"));
    }
    if matches(LINKEDIN_PATTERNS) {
        return non_empty(&profile.linkedin_url)
            .map(|url| record(url.to_string(), 1.0, "linkedin url from profile"));
    }
    if matches(EMAIL_PATTERNS) {
        return non_empty(&profile.email).map(|email| record(email.to_string(), 1.0, "email from profile"));
    }
    if matches(PHONE_PATTERNS) {
        return non_empty(&profile.phone).map(|phone| record(phone.to_string(), 1.0, "phone from profile"));
    }
    if matches(CITY_PATTERNS) {
        return non_empty(&profile.city).map(|city| record(city.to_string(), 0.95, "city from profile"));
    }

    None
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// 是 / 否问题：有选项时挑选对应的选项（兼容 Sí / Si）
fn yes_no_option(options: &[String], value: bool) -> String {
    let wanted: &[&str] = if value { &["yes", "sí", "si"] } else { &["no"] };
    options
        .iter()
        .find(|opt| {
            let lower = opt.trim().to_lowercase();
            wanted.iter().any(|w| lower == *w || lower.starts_with(&format!("{w},")))
        })
        .cloned()
        .unwrap_or_else(|| yes_no(value).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> CandidateProfile {
        CandidateProfile {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            phone: "+56 9 1234 5678".into(),
            city: "Santiago".into(),
            linkedin_url: "https://linkedin.com/in/ana".into(),
            work_authorized: true,
            requires_sponsorship: false,
            salary_expectation: Some("1200000".into()),
            summary: "Backend engineer, Rust 3 years".into(),
        }
    }

    #[test]
    fn shortcut_answers_contact_fields() {
        let p = profile();
        let email = profile_shortcut(&p, &OracleQuery::new("Email address", FieldKind::FreeText)).unwrap();
        assert_eq!(email.answer, "ana@example.com");
        assert_eq!(email.confidence(), 1.0);

        let phone = profile_shortcut(&p, &OracleQuery::new("Número de teléfono", FieldKind::FreeText)).unwrap();
        assert_eq!(phone.answer, "+56 9 1234 5678");

        let linkedin = profile_shortcut(&p, &OracleQuery::new("LinkedIn Profile", FieldKind::FreeText)).unwrap();
        assert_eq!(linkedin.answer, "https://linkedin.com/in/ana");
    }

    #[test]
    fn shortcut_picks_matching_yes_no_option() {
        let p = profile();
        let query = OracleQuery::new("¿Está autorizado para trabajar en Chile?", FieldKind::EnumSingle)
            .with_options(vec!["Sí".into(), "No".into()]);
        assert_eq!(profile_shortcut(&p, &query).unwrap().answer, "Sí");

        let query = OracleQuery::new("Will you require sponsorship?", FieldKind::EnumSingle)
            .with_options(vec!["Yes".into(), "No".into()]);
        let record = profile_shortcut(&p, &query).unwrap();
        assert_eq!(record.answer, "No");
        assert_eq!(record.confidence(), 0.95);
    }

    #[test]
    fn shortcut_skips_missing_profile_data() {
        let p = CandidateProfile {
            salary_expectation: None,
            ..profile()
        };
        assert!(profile_shortcut(&p, &OracleQuery::new("Expected salary", FieldKind::Numeric)).is_none());
        assert!(profile_shortcut(&p, &OracleQuery::new("Years of Rust", FieldKind::Numeric)).is_none());
    }

    #[test]
    fn oracle_answer_is_validated() {
        let query = OracleQuery::new("Years of Rust", FieldKind::Numeric);
        let raw: OracleAnswer =
            serde_json::from_str(r#"{"answer": 3, "confidence": "1.4", "reasoning": "profile"}"#).unwrap();
        let record = raw.into_record(&query);
        assert_eq!(record.answer, "3");
        assert_eq!(record.confidence(), 1.0);

        let raw: OracleAnswer = serde_json::from_str(r#"{"answer": ["Rust", "Go"]}"#).unwrap();
        let record = raw.into_record(&query);
        assert_eq!(record.answer, "Rust, Go");
        assert_eq!(record.confidence(), 0.5);
    }
}
