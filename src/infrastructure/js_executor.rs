//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"导航 + 执行 JS"的能力

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::BrowserError;

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 goto() / eval() 能力
/// - 不认识 Target / FieldDescriptor
/// - 不处理业务流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 导航到指定 URL 并等待加载完成
    pub async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    /// 当前页面 URL
    pub async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// 脚本必须返回可序列化的值（不能是 undefined）
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, BrowserError> {
        let result = self.page.evaluate(js_code.into()).await?;
        result
            .into_value::<JsonValue>()
            .map_err(|e| BrowserError::UnexpectedPayload {
                operation: "eval".to_string(),
                reason: e.to_string(),
            })
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
    ) -> Result<T, BrowserError> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value).map_err(|e| BrowserError::UnexpectedPayload {
            operation: std::any::type_name::<T>().to_string(),
            reason: e.to_string(),
        })
    }
}
