//! 结果输出服务 - 业务能力层
//!
//! 只负责"把结果告诉外部"能力：每个目标一行记录表，运行结束发一条汇总通知。
//! 两者都是尽力而为，失败只记日志，不影响状态存储

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::models::{ApplicationDecision, ProcessingStatus};

/// 汇总通知中最多列出的待人工项
const MAX_REVIEW_ITEMS: usize = 5;
/// 记录表备注中最多列出的低置信度问题
const MAX_NOTE_QUESTIONS: usize = 3;

/// 单个目标的处理结果事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeEvent {
    pub target_id: String,
    pub url: String,
    pub title: String,
    pub company: String,
    pub status: ProcessingStatus,
    pub variant_id: Option<String>,
    pub decision: Option<ApplicationDecision>,
    /// 本目标所有答案的置信度
    pub answer_confidences: Vec<f64>,
    /// 挂起原因或错误信息
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OutcomeEvent {
    /// 记录表备注：决策置信度 + 前几个低置信度问题 + 挂起原因
    pub fn notes(&self) -> String {
        let mut parts = Vec::new();

        if let Some(decision) = &self.decision {
            parts.push(format!("confidence {:.2}", decision.overall_confidence));

            let questions = &decision.low_confidence_questions;
            if !questions.is_empty() {
                let mut text = questions
                    .iter()
                    .take(MAX_NOTE_QUESTIONS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                if questions.len() > MAX_NOTE_QUESTIONS {
                    text.push_str(&format!(" (+{} more)", questions.len() - MAX_NOTE_QUESTIONS));
                }
                parts.push(format!("low confidence: {}", text));
            }
        }

        if let Some(message) = &self.message {
            parts.push(message.clone());
        }

        parts.join("; ")
    }
}

/// 单目标结果输出（记录表等）
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn emit(&self, event: &OutcomeEvent) -> Result<()>;
}

/// 记录表写入服务
///
/// 职责：
/// - 每个目标追加一行 TSV
/// - 文件不存在时先写表头
/// - 不关心流程顺序
pub struct TrackerWriter {
    tracker_file_path: PathBuf,
}

impl TrackerWriter {
    const HEADER: &'static str =
        "timestamp\ttarget_id\ttitle\tcompany\turl\tstatus\tvariant\tnotes\n";

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            tracker_file_path: path.into(),
        }
    }

    fn format_row(event: &OutcomeEvent) -> String {
        let cells = [
            event
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            event.target_id.clone(),
            event.title.clone(),
            event.company.clone(),
            event.url.clone(),
            event.status.to_string(),
            event.variant_id.clone().unwrap_or_default(),
            event.notes(),
        ];
        let mut row = cells.iter().map(|c| sanitize_cell(c)).collect::<Vec<_>>().join("\t");
        row.push('\n');
        row
    }
}

#[async_trait]
impl OutcomeSink for TrackerWriter {
    async fn emit(&self, event: &OutcomeEvent) -> Result<()> {
        debug!("写入记录表: {} | {}", event.target_id, event.status);

        if let Some(parent) = self.tracker_file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let is_new = !tokio::fs::try_exists(&self.tracker_file_path)
            .await
            .unwrap_or(false);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.tracker_file_path)
            .await
            .with_context(|| format!("无法打开记录表: {}", self.tracker_file_path.display()))?;

        if is_new {
            file.write_all(Self::HEADER.as_bytes()).await?;
        }
        file.write_all(Self::format_row(event).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

fn sanitize_cell(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

/// 需要人工关注的目标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub title: String,
    pub company: String,
    pub status: ProcessingStatus,
    pub reason: String,
}

/// 一次运行的汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// 实际处理的目标数（不含跳过）
    pub processed: usize,
    pub skipped: usize,
    pub by_status: BTreeMap<ProcessingStatus, usize>,
    pub answers: usize,
    pub mean_confidence: Option<f64>,
    /// 最多 5 项
    pub review_items: Vec<ReviewItem>,
    /// 超出部分的数量
    pub review_remainder: usize,
    pub duration: Duration,
    /// 是否因站点拦截提前中止
    pub aborted: bool,
}

impl RunSummary {
    pub fn from_events(events: &[OutcomeEvent], duration: Duration, aborted: bool) -> Self {
        let mut by_status = BTreeMap::new();
        for event in events {
            *by_status.entry(event.status).or_insert(0) += 1;
        }

        let skipped = by_status
            .get(&ProcessingStatus::Skipped)
            .copied()
            .unwrap_or(0);

        let confidences: Vec<f64> = events
            .iter()
            .flat_map(|e| e.answer_confidences.iter().copied())
            .collect();
        let mean_confidence = (!confidences.is_empty())
            .then(|| confidences.iter().sum::<f64>() / confidences.len() as f64);

        let review: Vec<ReviewItem> = events
            .iter()
            .filter(|e| e.status.needs_review())
            .map(|e| ReviewItem {
                title: e.title.clone(),
                company: e.company.clone(),
                status: e.status,
                reason: e.message.clone().unwrap_or_else(|| e.notes()),
            })
            .collect();
        let review_remainder = review.len().saturating_sub(MAX_REVIEW_ITEMS);

        Self {
            processed: events.len() - skipped,
            skipped,
            by_status,
            answers: confidences.len(),
            mean_confidence,
            review_items: review.into_iter().take(MAX_REVIEW_ITEMS).collect(),
            review_remainder,
            duration,
            aborted,
        }
    }

    pub fn count(&self, status: ProcessingStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// 自动提交成功的比例（百分比）
    pub fn automation_rate(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.count(ProcessingStatus::Applied) as f64 / self.processed as f64 * 100.0
    }

    /// 渲染为通知正文
    pub fn render(&self) -> String {
        let mut lines = vec![
            "📊 Application run summary".to_string(),
            String::new(),
            format!("Processed: {} (skipped {})", self.processed, self.skipped),
            format!("✅ Applied: {}", self.count(ProcessingStatus::Applied)),
            format!(
                "⚠️ Needs review: {}",
                self.count(ProcessingStatus::Manual) + self.count(ProcessingStatus::Uncertain)
            ),
            format!("❌ Unavailable: {}", self.count(ProcessingStatus::Unavailable)),
            format!("🔴 Errors: {}", self.count(ProcessingStatus::Error)),
        ];

        if self.count(ProcessingStatus::Pending) > 0 {
            lines.push(format!("⏸️ Pending: {}", self.count(ProcessingStatus::Pending)));
        }

        lines.push(String::new());
        lines.push(format!("Questions answered: {}", self.answers));
        lines.push(format!("Automation rate: {:.1}%", self.automation_rate()));
        lines.push(match self.mean_confidence {
            Some(mean) => format!("Mean confidence: {:.2}", mean),
            None => "Mean confidence: N/A".to_string(),
        });

        if !self.review_items.is_empty() {
            lines.push(String::new());
            lines.push("⚠️ Needs manual attention:".to_string());
            for item in &self.review_items {
                lines.push(format!("• {} - {}", item.title, item.company));
                lines.push(format!("  {} - {}", item.status, item.reason));
            }
            if self.review_remainder > 0 {
                lines.push(format!("  ... and {} more", self.review_remainder));
            }
        }

        if self.aborted {
            lines.push(String::new());
            lines.push("🛑 Run aborted: site block detected".to_string());
        }

        let secs = self.duration.as_secs();
        lines.push(String::new());
        lines.push(format!("⏱️ Duration: {}m {}s", secs / 60, secs % 60));

        lines.join("\n")
    }
}

/// 运行结束时的汇总通知
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &RunSummary) -> Result<()>;
}

/// Telegram 通知
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("无法创建 HTTP 客户端")?;

        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", token),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, summary: &RunSummary) -> Result<()> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": summary.render(),
            "disable_web_page_preview": true,
        });

        self.client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("Telegram 请求失败")?
            .error_for_status()
            .context("Telegram 返回错误状态")?;

        info!("📨 汇总通知已发送");
        Ok(())
    }
}

/// 未配置 Telegram 时，把汇总写进日志
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, summary: &RunSummary) -> Result<()> {
        for line in summary.render().lines() {
            info!("{}", line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecisionAction;
    use tokio_test::assert_ok;

    fn event(id: &str, status: ProcessingStatus, confidences: &[f64]) -> OutcomeEvent {
        OutcomeEvent {
            target_id: id.to_string(),
            url: format!("https://jobs.example.com/{}", id),
            title: format!("Role {}", id),
            company: "Acme".to_string(),
            status,
            variant_id: Some("software-en".to_string()),
            decision: None,
            answer_confidences: confidences.to_vec(),
            message: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn notes_list_three_questions_and_remainder() {
        let mut e = event("a", ProcessingStatus::Manual, &[0.5]);
        e.decision = Some(ApplicationDecision {
            action: DecisionAction::Manual,
            overall_confidence: 0.55,
            reasoning: String::new(),
            low_confidence_questions: vec!["q1".into(), "q2".into(), "q3".into(), "q4".into(), "q5".into()],
        });
        e.message = Some("low-confidence".into());
        assert_eq!(
            e.notes(),
            "confidence 0.55; low confidence: q1, q2, q3 (+2 more); low-confidence"
        );
    }

    #[test]
    fn summary_counts_and_caps_review_items() {
        let mut events = vec![
            event("ok1", ProcessingStatus::Applied, &[0.9, 1.0]),
            event("ok2", ProcessingStatus::Applied, &[0.8]),
            event("skip", ProcessingStatus::Skipped, &[]),
        ];
        for i in 0..7 {
            events.push(event(&format!("m{}", i), ProcessingStatus::Manual, &[0.3]));
        }

        let summary = RunSummary::from_events(&events, Duration::from_secs(125), false);
        assert_eq!(summary.processed, 9);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.review_items.len(), 5);
        assert_eq!(summary.review_remainder, 2);
        assert_eq!(summary.answers, 10);
        assert!((summary.automation_rate() - 2.0 / 9.0 * 100.0).abs() < 1e-9);

        let text = summary.render();
        assert!(text.contains("... and 2 more"));
        assert!(text.contains("Duration: 2m 5s"));
    }

    #[test]
    fn empty_run_has_no_mean_confidence() {
        let summary = RunSummary::from_events(&[], Duration::ZERO, true);
        assert_eq!(summary.mean_confidence, None);
        assert_eq!(summary.automation_rate(), 0.0);
        assert!(summary.render().contains("Run aborted"));
    }

    #[tokio::test]
    async fn tracker_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("tracker.tsv");
        let writer = TrackerWriter::with_path(&path);

        let mut first = event("a", ProcessingStatus::Error, &[]);
        first.message = Some("line\tbreak\nhere".into());
        assert_ok!(writer.emit(&first).await);
        assert_ok!(writer.emit(&event("b", ProcessingStatus::Applied, &[0.9])).await);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp\t"));
        assert!(lines[1].ends_with("line break here"));
        assert_eq!(lines[2].split('\t').nth(5), Some("APPLIED"));
    }
}
