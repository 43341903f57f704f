use serde::{Deserialize, Serialize};

/// 申请人资料
///
/// 运行开始时加载一次，作为上下文传给答题服务
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub linkedin_url: String,
    #[serde(default)]
    pub work_authorized: bool,
    #[serde(default)]
    pub requires_sponsorship: bool,
    #[serde(default)]
    pub salary_expectation: Option<String>,
    /// 简历摘要，原样放进 LLM 提示词
    #[serde(default)]
    pub summary: String,
}
