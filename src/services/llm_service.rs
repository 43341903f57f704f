//! LLM 服务 - 业务能力层
//!
//! 只负责"调用 LLM 拿到文本 / JSON"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 OpenRouter 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::OracleError;

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API，带超时和固定间隔重试
/// - 从返回文本中取出 JSON 对象
/// - 不关心提示词的业务含义
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    timeout: Duration,
    max_retries: usize,
    retry_delay: Duration,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            timeout: Duration::from_secs(config.oracle_timeout_secs),
            max_retries: config.oracle_max_retries.max(1),
            retry_delay: Duration::from_millis(config.oracle_retry_delay_ms),
        }
    }

    /// 单次 LLM 调用
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（已去除首尾空白）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<String, OracleError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| self.api_failed(e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| self.api_failed(e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(1024u32)
            .build()
            .map_err(|e| self.api_failed(e))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| OracleError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                self.api_failed(e)
            })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| OracleError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }

    /// 带重试的 JSON 调用
    ///
    /// 超时 / 网络错误按固定间隔重试；内容无法解析同样重试，
    /// 全部失败后返回 `RetriesExhausted`
    pub async fn send_for_json(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<serde_json::Value, OracleError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            let result = match self.send_to_llm(user_message, system_message).await {
                Ok(content) => extract_json(&content),
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "LLM 调用失败 (第 {}/{} 次): {}",
                        attempt, self.max_retries, e
                    );
                    last_error = e.to_string();
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(OracleError::RetriesExhausted {
            attempts: self.max_retries,
            last: last_error,
        })
    }

    fn api_failed(&self, source: async_openai::error::OpenAIError) -> OracleError {
        OracleError::ApiCallFailed {
            model: self.model_name.clone(),
            source: Box::new(source),
        }
    }
}

/// 从 LLM 返回文本中取出第一个 JSON 对象
///
/// 兼容 ```json 代码块和前后夹带说明文字的情况
pub fn extract_json(response: &str) -> Result<serde_json::Value, OracleError> {
    let trimmed = response.trim();

    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Ok(value);
    }

    let malformed = |reason: &str| OracleError::MalformedResponse {
        response: trimmed.chars().take(200).collect(),
        reason: reason.to_string(),
    };

    let start = trimmed.find('{').ok_or_else(|| malformed("没有找到 JSON 对象"))?;
    let end = trimmed.rfind('}').ok_or_else(|| malformed("JSON 对象不完整"))?;
    if end < start {
        return Err(malformed("JSON 对象不完整"));
    }

    match serde_json::from_str::<serde_json::Value>(&trimmed[start..=end]) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(_) => Err(malformed("不是 JSON 对象")),
        Err(e) => Err(malformed(&e.to_string())),
    }
}
