//! 状态存储中的处理记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 目标的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// 已提交
    Applied,
    /// 需要人工处理
    Manual,
    /// 目标已关闭 / 撤回
    Unavailable,
    /// 处理出错
    Error,
    /// 已提交但置信度不足
    Uncertain,
    /// 已处理过，本次跳过
    Skipped,
    /// 被全局中止打断，下次运行重试
    Pending,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Applied => "APPLIED",
            ProcessingStatus::Manual => "MANUAL",
            ProcessingStatus::Unavailable => "UNAVAILABLE",
            ProcessingStatus::Error => "ERROR",
            ProcessingStatus::Uncertain => "UNCERTAIN",
            ProcessingStatus::Skipped => "SKIPPED",
            ProcessingStatus::Pending => "PENDING",
        }
    }

    /// 是否需要人工关注
    pub fn needs_review(self) -> bool {
        matches!(self, ProcessingStatus::Manual | ProcessingStatus::Uncertain)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态文件中的一条记录
///
/// 文件以 target id 为键，`target_id` 本身不写入值中，加载时回填
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    #[serde(skip)]
    pub target_id: String,
    pub url: String,
    pub status: ProcessingStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
