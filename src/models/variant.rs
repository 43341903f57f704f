//! 附件变体（使用哪一份简历）

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 变体类别（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantCategory {
    /// 软件开发
    Software,
    /// 自动化 / 数据 / AI
    Automation,
}

impl VariantCategory {
    pub const DEFAULT: VariantCategory = VariantCategory::Software;

    pub fn as_str(self) -> &'static str {
        match self {
            VariantCategory::Software => "software",
            VariantCategory::Automation => "automation",
        }
    }

    /// 解析分类服务返回的类别，不在集合内返回 None
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "software" => Some(VariantCategory::Software),
            "automation" | "engineer" => Some(VariantCategory::Automation),
            _ => None,
        }
    }

    /// 另一个类别，用于附件缺失时回退
    pub fn other(self) -> Self {
        match self {
            VariantCategory::Software => VariantCategory::Automation,
            VariantCategory::Automation => VariantCategory::Software,
        }
    }
}

impl fmt::Display for VariantCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Es,
}

impl Locale {
    pub const DEFAULT: Locale = Locale::En;

    pub fn as_str(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Es => "es",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        let prefix = raw.split(['-', '_']).next().unwrap_or_default();
        match prefix {
            "en" | "english" | "inglés" | "ingles" => Some(Locale::En),
            "es" | "spanish" | "español" | "espanol" => Some(Locale::Es),
            _ => None,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 变体推荐结果，只在本次运行内使用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantRecommendation {
    pub category: VariantCategory,
    pub locale: Locale,
    pub attachment_path: PathBuf,
    pub confidence: f64,
    pub reasoning: String,
}

impl VariantRecommendation {
    /// 写入状态存储的变体标识，例如 `software-en`
    pub fn variant_id(&self) -> String {
        format!("{}-{}", self.category, self.locale)
    }
}
