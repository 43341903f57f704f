//! 状态存储 - 业务能力层
//!
//! 只负责"哪些目标已经处理过"能力，不关心流程
//!
//! 文件格式：以 target id 为键的 JSON 对象
//!
//! ```json
//! {
//!   "4012345": {
//!     "url": "https://example.com/jobs/4012345",
//!     "status": "APPLIED",
//!     "timestamp": "2026-01-05T10:00:00Z",
//!     "variant_id": "software-en",
//!     "error": null
//!   }
//! }
//! ```
//!
//! 每次访问完整读取，每次写入完整重写（临时文件 + rename）。单写者，不加锁

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::{ProcessingRecord, ProcessingStatus};

type Records = BTreeMap<String, ProcessingRecord>;

/// 状态统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_status: BTreeMap<ProcessingStatus, usize>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl StoreStats {
    pub fn count(&self, status: ProcessingStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// 状态存储
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 是否已有结果；PENDING 表示被拦截打断，下次运行要重新处理
    pub fn is_processed(&self, target_id: &str) -> bool {
        self.load()
            .get(target_id)
            .is_some_and(|record| record.status != ProcessingStatus::Pending)
    }

    pub fn get(&self, target_id: &str) -> Option<ProcessingRecord> {
        self.load().remove(target_id)
    }

    /// 写入（覆盖）一条记录，时间戳为当前时间
    pub fn record(
        &self,
        target_id: &str,
        url: &str,
        status: ProcessingStatus,
        variant_id: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut records = self.load();
        records.insert(
            target_id.to_string(),
            ProcessingRecord {
                target_id: target_id.to_string(),
                url: url.to_string(),
                status,
                timestamp: Utc::now(),
                variant_id: variant_id.map(str::to_string),
                error: error.map(str::to_string),
            },
        );
        self.save(&records)?;
        debug!("状态已记录: {} → {}", target_id, status);
        Ok(())
    }

    /// 删除一条记录，使目标在下次运行时重新处理
    pub fn clear(&self, target_id: &str) -> Result<bool, StoreError> {
        let mut records = self.load();
        if records.remove(target_id).is_none() {
            return Ok(false);
        }
        self.save(&records)?;
        Ok(true)
    }

    /// 批量标记为 PENDING（一次写入）
    ///
    /// 已有终态记录的目标保持不变；返回实际标记的数量
    pub fn mark_pending<'a, I>(&self, targets: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut records = self.load();
        let now = Utc::now();
        let mut marked = 0;

        for (target_id, url) in targets {
            let terminal = records
                .get(target_id)
                .is_some_and(|r| r.status != ProcessingStatus::Pending);
            if terminal {
                continue;
            }
            records.insert(
                target_id.to_string(),
                ProcessingRecord {
                    target_id: target_id.to_string(),
                    url: url.to_string(),
                    status: ProcessingStatus::Pending,
                    timestamp: now,
                    variant_id: None,
                    error: Some("run aborted".to_string()),
                },
            );
            marked += 1;
        }

        if marked > 0 {
            self.save(&records)?;
        }
        Ok(marked)
    }

    /// 删除早于 `max_age_days` 天的记录，返回删除数量
    pub fn cleanup(&self, max_age_days: i64) -> Result<usize, StoreError> {
        let mut records = self.load();
        let cutoff = Utc::now() - Duration::days(max_age_days);
        let before = records.len();
        records.retain(|_, record| record.timestamp >= cutoff);
        let removed = before - records.len();

        if removed > 0 {
            self.save(&records)?;
            info!("🧹 清理了 {} 条超过 {} 天的记录", removed, max_age_days);
        }
        Ok(removed)
    }

    pub fn stats(&self) -> StoreStats {
        let records = self.load();
        let mut stats = StoreStats {
            total: records.len(),
            ..Default::default()
        };
        for record in records.values() {
            *stats.by_status.entry(record.status).or_insert(0) += 1;
            stats.oldest = Some(stats.oldest.map_or(record.timestamp, |t| t.min(record.timestamp)));
            stats.newest = Some(stats.newest.map_or(record.timestamp, |t| t.max(record.timestamp)));
        }
        stats
    }

    /// 读取全部记录
    ///
    /// 文件不存在视为空；文件损坏时告警并视为空；单条无法解析的记录跳过
    fn load(&self) -> Records {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Records::new(),
            Err(e) => {
                warn!("⚠️  无法读取状态文件 {}: {}", self.path.display(), e);
                return Records::new();
            }
        };

        let raw: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&content)
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("⚠️  状态文件损坏，按空处理 {}: {}", self.path.display(), e);
                return Records::new();
            }
        };

        let mut records = Records::new();
        for (target_id, value) in raw {
            match serde_json::from_value::<ProcessingRecord>(value) {
                Ok(mut record) => {
                    record.target_id = target_id.clone();
                    records.insert(target_id, record);
                }
                Err(e) => warn!("⚠️  跳过无法解析的记录 {}: {}", target_id, e),
            }
        }
        records
    }

    fn save(&self, records: &Records) -> Result<(), StoreError> {
        let io_err = |path: &Path, source| StoreError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let content = serde_json::to_string_pretty(records)?;
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "state.json".to_string());
        let temp_path = self.path.with_file_name(format!("{}.tmp", file_name));

        fs::write(&temp_path, content).map_err(|e| io_err(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}
