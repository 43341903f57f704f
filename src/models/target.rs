use serde::{Deserialize, Serialize};

/// 一个待申请的目标，发现后不再变化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// 稳定 ID，状态存储以此为键
    pub id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub description: String,
    /// 语言提示，例如 ["es"]
    #[serde(default)]
    pub locale_hints: Vec<String>,
}

/// 目标 TOML 文件的结构
///
/// ```toml
/// [[targets]]
/// id = "4012345"
/// url = "https://example.com/jobs/4012345"
/// title = "Backend Engineer"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetList {
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(skip)]
    pub file_path: Option<String>,
}
