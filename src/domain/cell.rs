// ==========================================
// 多源表格对账合并引擎 - 单元格值
// ==========================================
// 职责: 统一各类表格后端的单元格取值
// 红线: 字符串化规则决定复合主键是否相等（5 与 "5" 视为同一键）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 单元格值
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// 构造文本值
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// 是否为空白（None 或空字符串）
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// 真值判定: 空、""、0、0.0、false 均视为假
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Bool(b) => *b,
            CellValue::Int(i) => *i != 0,
            CellValue::Number(n) => *n != 0.0,
            CellValue::Text(s) => !s.is_empty(),
        }
    }

    /// 去除首尾空白（仅文本）
    pub fn trimmed(self) -> Self {
        match self {
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.len() == s.len() {
                    CellValue::Text(s)
                } else {
                    CellValue::Text(trimmed.to_string())
                }
            }
            other => other,
        }
    }

    /// 字符串化（空值 → ""，整数值浮点数不带小数部分）
    pub fn as_key_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<&calamine::Data> for CellValue {
    fn from(data: &calamine::Data) -> Self {
        use calamine::Data;
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Int(*i),
            Data::Bool(b) => CellValue::Bool(*b),
            // 日期、错误值等统一按文本处理
            other => CellValue::Text(other.to_string()),
        }
    }
}
