// ==========================================
// 多源表格对账合并引擎 - 数据源与工作表需求
// ==========================================
// 职责: 数据源分类、源文件描述、工作表需求、复合主键
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::rule::MappingTable;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// 目标行: 目标表头 → 值
pub type DestRow = HashMap<String, CellValue>;

/// 源行: 源表头 → 值
pub type SourceRow = HashMap<String, CellValue>;

// ==========================================
// 数据源类别 (Source Category)
// ==========================================
// 由文件所在目录决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    Baseline,
    Response,
    Report,
    Other,
}

impl SourceCategory {
    /// 合并顺序（基准除外）
    pub const MERGE_ORDER: [SourceCategory; 3] = [
        SourceCategory::Response,
        SourceCategory::Report,
        SourceCategory::Other,
    ];

    /// 根据目录名判定类别
    pub fn from_dir_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "baseline" => SourceCategory::Baseline,
            "response" => SourceCategory::Response,
            "report" => SourceCategory::Report,
            _ => SourceCategory::Other,
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceCategory::Baseline => write!(f, "baseline"),
            SourceCategory::Response => write!(f, "response"),
            SourceCategory::Report => write!(f, "report"),
            SourceCategory::Other => write!(f, "other"),
        }
    }
}

// ==========================================
// SourceFile - 源文件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub category: SourceCategory,
    /// 启动校验时读取到的工作表名
    pub sheet_names: Vec<String>,
}

impl SourceFile {
    pub fn new(path: PathBuf, category: SourceCategory, sheet_names: Vec<String>) -> Self {
        Self {
            path,
            category,
            sheet_names,
        }
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names.iter().any(|s| s == name)
    }

    pub fn display_name(&self) -> String {
        file_name_of(&self.path)
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

// ==========================================
// SheetRequirement - 工作表需求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRequirement {
    pub sheet_name: String,
    /// 复合主键列
    pub key_fields: Vec<String>,
    /// 数据有效性校验列
    pub required_fields: Vec<String>,
    /// 回退工作表（按声明顺序）
    pub fallback_sheets: Vec<String>,
}

impl SheetRequirement {
    /// 计算复合主键
    ///
    /// 任一关键字段不在行中（表头缺失）视为主键格式错误
    pub fn key_of(&self, row: &SourceRow) -> Result<CompositeKey, ValidationError> {
        let mut parts = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            let value = row.get(field).ok_or_else(|| ValidationError::MalformedKey {
                field: field.clone(),
            })?;
            parts.push(value.as_key_string());
        }
        Ok(CompositeKey(parts))
    }

    /// 关键字段在复合主键中的位置
    pub fn key_position(&self, field: &str) -> Option<usize> {
        self.key_fields.iter().position(|f| f == field)
    }
}

// ==========================================
// CompositeKey - 复合主键
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey(pub Vec<String>);

impl CompositeKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CompositeKey(parts.into_iter().map(Into::into).collect())
    }

    pub fn part(&self, position: usize) -> Option<&str> {
        self.0.get(position).map(String::as_str)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

// ==========================================
// KeyedSupplement - 外部补充数据
// ==========================================
// 结构: {关键字段值: {字段: 值}}，例如邮件解析结果或单据扫描结果
// 字段按列映射规则转换后合并；未附带映射表时使用 email_mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyedSupplement {
    /// 用于匹配的关键字段（须属于 key_fields）
    pub key_field: String,
    pub entries: HashMap<String, SourceRow>,
    /// 随数据附带的映射表
    #[serde(skip)]
    pub mapping: Option<MappingTable>,
}

impl KeyedSupplement {
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            entries: HashMap::new(),
            mapping: None,
        }
    }

    pub fn with_mapping(mut self, mapping: MappingTable) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn insert(&mut self, key_value: impl Into<String>, fields: SourceRow) {
        self.entries.insert(key_value.into(), fields);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement() -> SheetRequirement {
        SheetRequirement {
            sheet_name: "CREATED".to_string(),
            key_fields: vec!["folder".to_string(), "po".to_string()],
            required_fields: vec![],
            fallback_sheets: vec![],
        }
    }

    #[test]
    fn test_key_string_cast_equivalence() {
        let req = requirement();
        let mut numeric = SourceRow::new();
        numeric.insert("folder".to_string(), CellValue::text("F1"));
        numeric.insert("po".to_string(), CellValue::Number(5.0));

        let mut textual = SourceRow::new();
        textual.insert("folder".to_string(), CellValue::text("F1"));
        textual.insert("po".to_string(), CellValue::text("5"));

        assert_eq!(req.key_of(&numeric).unwrap(), req.key_of(&textual).unwrap());
    }

    #[test]
    fn test_missing_key_field_is_malformed() {
        let req = requirement();
        let mut row = SourceRow::new();
        row.insert("folder".to_string(), CellValue::text("F1"));

        assert_eq!(
            req.key_of(&row),
            Err(ValidationError::MalformedKey {
                field: "po".to_string()
            })
        );
    }

    #[test]
    fn test_category_from_dir_name() {
        assert_eq!(SourceCategory::from_dir_name("Report"), SourceCategory::Report);
        assert_eq!(SourceCategory::from_dir_name("misc"), SourceCategory::Other);
    }
}
