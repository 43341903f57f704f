use std::fmt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 应用程序错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// LLM / 答题服务错误
    #[error("答题服务错误: {0}")]
    Oracle(#[from] OracleError),
    /// 状态存储错误
    #[error("状态存储错误: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: BoxError,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: BoxError,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        #[source]
        source: BoxError,
    },
    /// 脚本返回了无法识别的数据
    #[error("脚本返回数据格式错误 ({operation}): {reason}")]
    UnexpectedPayload { operation: String, reason: String },
    /// 等待页面超时
    #[error("等待页面超时 ({operation}, {secs}秒)")]
    Timeout { operation: String, secs: u64 },
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        }
    }
}

/// LLM 服务错误
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: BoxError,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容无法解析
    #[error("无法解析LLM返回内容 ({reason}): {response}")]
    MalformedResponse { response: String, reason: String },
    /// 调用超时
    #[error("LLM调用超时 ({secs}秒)")]
    Timeout { secs: u64 },
    /// 重试耗尽
    #[error("LLM调用重试 {attempts} 次后仍失败: {last}")]
    RetriesExhausted { attempts: usize, last: String },
}

impl OracleError {
    /// 是否值得重试（超时 / 网络错误）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OracleError::ApiCallFailed { .. } | OracleError::Timeout { .. }
        )
    }
}

/// 状态存储错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("读写状态文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("序列化状态失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 阈值不合法
    #[error("置信度阈值不合法: high={high}, low={low} (要求 0 <= low < high <= 1)")]
    InvalidThresholds { high: f64, low: f64 },
    /// 其他取值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

/// 故障分类
///
/// 除 `HardBlock` 外，所有故障都在单个目标内部消化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// 页面暂时性故障（元素失效、渲染慢）
    TransientUi,
    /// 答案不在允许范围内
    Validation,
    /// 目标关闭、附件缺失
    ResourceUnavailable,
    /// 分类 / 答题服务故障
    Oracle,
    /// 站点级拦截（验证码、限流页面），中止整个运行
    HardBlock,
    /// 未分类
    Unclassified,
}

impl FaultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::TransientUi => "transient-ui",
            FaultKind::Validation => "validation",
            FaultKind::ResourceUnavailable => "resource-unavailable",
            FaultKind::Oracle => "oracle",
            FaultKind::HardBlock => "hard-block",
            FaultKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个目标流程中的故障
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{kind}] {message}")]
pub struct FlowError {
    pub kind: FaultKind,
    pub message: String,
}

impl FlowError {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn hard_block(message: impl Into<String>) -> Self {
        Self::new(FaultKind::HardBlock, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ResourceUnavailable, message)
    }

    pub fn is_hard_block(&self) -> bool {
        self.kind == FaultKind::HardBlock
    }
}

impl From<BrowserError> for FlowError {
    fn from(err: BrowserError) -> Self {
        let kind = match err {
            BrowserError::Timeout { .. } => FaultKind::TransientUi,
            _ => FaultKind::Unclassified,
        };
        FlowError::new(kind, err.to_string())
    }
}

impl From<OracleError> for FlowError {
    fn from(err: OracleError) -> Self {
        let kind = match err {
            OracleError::MalformedResponse { .. } => FaultKind::Validation,
            _ => FaultKind::Oracle,
        };
        FlowError::new(kind, err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
