//! 表单驱动接口 - 基础设施层
//!
//! 流程层只通过这个 trait 操作页面，测试中用脚本化的假驱动替换

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::BrowserError;
use crate::models::FieldDescriptor;

/// 表单上的动作按钮（下一步 / 提交）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionControl {
    pub control_id: String,
    /// 按钮文字或 aria-label
    pub label: String,
}

impl ActionControl {
    pub fn new(control_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            control_id: control_id.into(),
            label: label.into(),
        }
    }
}

/// 表单驱动
///
/// 所有方法都可能因为页面变化而失败；调用方负责超时和重试
#[async_trait]
pub trait FormDriver: Send + Sync {
    /// 打开目标页面
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// 目标是否已关闭 / 撤回
    async fn is_target_unavailable(&self) -> Result<bool, BrowserError>;

    /// 是否遇到站点级拦截（验证码、限流页面）
    async fn is_hard_blocked(&self) -> Result<bool, BrowserError>;

    /// 点击申请入口打开表单；没有入口时返回 false
    async fn open_form(&self) -> Result<bool, BrowserError>;

    /// 读取当前步骤的所有字段
    async fn find_controls(&self) -> Result<Vec<FieldDescriptor>, BrowserError>;

    /// 填写一个字段（附件字段的 value 为文件路径）
    async fn set_value(&self, field: &FieldDescriptor, value: &str) -> Result<(), BrowserError>;

    /// 查找当前步骤的主动作按钮
    async fn find_action_control(&self) -> Result<Option<ActionControl>, BrowserError>;

    async fn click_action(&self, control: &ActionControl) -> Result<(), BrowserError>;

    /// 放弃并关闭表单（不提交）
    async fn dismiss_form(&self) -> Result<(), BrowserError>;
}

/// 给驱动调用加上超时
pub async fn timed<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T, BrowserError>
where
    F: Future<Output = Result<T, BrowserError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timed_reports_timeout() {
        let result: Result<(), _> = timed("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(BrowserError::Timeout { .. })));
    }

    #[tokio::test]
    async fn timed_passes_result_through() {
        let result = timed("fast", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
