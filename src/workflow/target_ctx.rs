//! 目标处理上下文
//!
//! 封装"我正在处理第几个目标"这一信息

use std::fmt::Display;

/// 目标处理上下文
#[derive(Debug, Clone)]
pub struct TargetCtx {
    /// 目标ID
    pub target_id: String,

    /// 目标在本次运行中的序号（从1开始，仅用于日志显示）
    pub target_index: usize,

    /// 本次运行的目标总数
    pub total: usize,
}

impl TargetCtx {
    pub fn new(target_id: impl Into<String>, target_index: usize, total: usize) -> Self {
        Self {
            target_id: target_id.into(),
            target_index,
            total,
        }
    }
}

impl Display for TargetCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[目标 {}/{} ID#{}]",
            self.target_index, self.total, self.target_id
        )
    }
}
