//! 表单字段描述
//!
//! 每一步从页面上重新读取，从不持久化

use serde::{Deserialize, Serialize};
use std::fmt;

/// 下拉框里表示"尚未选择"的占位文本
const PLACEHOLDER_VALUES: &[&str] = &[
    "select an option",
    "selecciona una opción",
    "selecciona una opcion",
    "choose",
    "-",
];

/// 字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// 自由文本（input / textarea）
    FreeText,
    /// 单选（select / radio）
    EnumSingle,
    /// 多选（checkbox 组）
    EnumMulti,
    /// 附件上传
    Attachment,
    /// 数字
    Numeric,
}

impl FieldKind {
    /// 是否为枚举类控件
    pub fn is_enumerated(self) -> bool {
        matches!(self, FieldKind::EnumSingle | FieldKind::EnumMulti)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::FreeText => "free_text",
            FieldKind::EnumSingle => "enum_single",
            FieldKind::EnumMulti => "enum_multi",
            FieldKind::Attachment => "attachment",
            FieldKind::Numeric => "numeric",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 字段的稳定标识：(类型, 规范化后的用途)
///
/// 同一个控件在重新渲染后 control_id 可能变化，但 key 不变
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub kind: FieldKind,
    pub purpose: String,
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.purpose)
    }
}

/// 当前步骤中观察到的一个表单控件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// 驱动层用于定位控件的句柄
    pub control_id: String,
    pub kind: FieldKind,
    /// 人类可读的用途（label / placeholder / aria-label）
    pub purpose: String,
    #[serde(default)]
    pub required: bool,
    /// 枚举类控件的可选值
    #[serde(default)]
    pub options: Vec<String>,
    /// 控件上已有的值
    #[serde(default)]
    pub current_value: Option<String>,
}

impl FieldDescriptor {
    pub fn new(control_id: impl Into<String>, kind: FieldKind, purpose: impl Into<String>) -> Self {
        Self {
            control_id: control_id.into(),
            kind,
            purpose: purpose.into(),
            required: false,
            options: Vec::new(),
            current_value: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.current_value = Some(value.into());
        self
    }

    pub fn key(&self) -> FieldKey {
        FieldKey {
            kind: self.kind,
            purpose: normalize_purpose(&self.purpose),
        }
    }

    /// 控件上已有的有效值，占位文本视为空
    pub fn existing_value(&self) -> Option<&str> {
        let value = self.current_value.as_deref()?.trim();
        if value.is_empty() || PLACEHOLDER_VALUES.contains(&value.to_lowercase().as_str()) {
            return None;
        }
        Some(value)
    }

    /// 在可选值中精确（忽略大小写）查找
    pub fn find_option(&self, value: &str) -> Option<&str> {
        let wanted = value.trim().to_lowercase();
        self.options
            .iter()
            .find(|opt| opt.trim().to_lowercase() == wanted)
            .map(String::as_str)
    }
}

/// 规范化用途文本：小写、合并空白、去掉必填星号
pub fn normalize_purpose(purpose: &str) -> String {
    purpose
        .trim_end_matches('*')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_case_whitespace_and_required_marker() {
        let a = FieldDescriptor::new("a", FieldKind::FreeText, "Years of  Experience*");
        let b = FieldDescriptor::new("b", FieldKind::FreeText, "years of experience");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn placeholder_is_not_an_existing_value() {
        let field = FieldDescriptor::new("s", FieldKind::EnumSingle, "country")
            .with_value("Select an option");
        assert_eq!(field.existing_value(), None);

        let field = field.with_value("  Chile ");
        assert_eq!(field.existing_value(), Some("Chile"));
    }

    #[test]
    fn find_option_is_case_insensitive() {
        let field = FieldDescriptor::new("s", FieldKind::EnumSingle, "english level")
            .with_options(["Basic", "Advanced"]);
        assert_eq!(field.find_option("advanced"), Some("Advanced"));
        assert_eq!(field.find_option("fluent"), None);
    }
}
