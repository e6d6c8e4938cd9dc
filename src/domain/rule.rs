// ==========================================
// 多源表格对账合并引擎 - 字段映射规则
// ==========================================
// 职责: 单个字段的转换/提取规则 + 映射表
// 红线: 构造完成后不可变；map_action 返回显式结果而非抛出
// ==========================================

use crate::domain::cell::CellValue;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 多单元格读取结果的拼接分隔符
pub const DEFAULT_JOINER: &str = "#";

// ==========================================
// 规则参数枚举
// ==========================================

/// 分割后取值模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMode {
    /// 取最后一段
    Last,
    /// 除最后一段外重新拼接
    AllButLast,
}

/// 数值处理方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Round,
}

/// 定向读取方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// 向下（同列下一行）
    #[default]
    Row,
    /// 向右（同行下一列）
    Column,
}

/// 定向读取模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingMode {
    /// 连续读取直到空白单元格
    ReadUntilBlank,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Row => write!(f, "row"),
            Direction::Column => write!(f, "column"),
        }
    }
}

// ==========================================
// Rule - 字段映射规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub field_name: String,
    pub splitter: Option<String>,
    pub mode: Option<SplitMode>,
    /// 1 起始；设置后优先于 mode
    pub index: Option<i64>,
    pub method: Option<Method>,
    pub dp: i32,
    pub dir: Direction,
    pub count: Option<usize>,
    pub reading_mode: Option<ReadingMode>,
    pub consider_empty: bool,
}

impl Rule {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            splitter: None,
            mode: None,
            index: None,
            method: None,
            dp: 2,
            dir: Direction::Row,
            count: None,
            reading_mode: None,
            consider_empty: false,
        }
    }

    /// 根据规则处理原始值
    ///
    /// # 返回
    /// - Ok(None): 原始值为假值（空/0/false），不做处理
    /// - Ok(Some(value)): 处理后的值
    /// - Err: index 越界或 round 输入非数字
    pub fn map_action(&self, raw: &CellValue) -> Result<Option<CellValue>, ValidationError> {
        if !raw.is_truthy() {
            return Ok(None);
        }

        let mut processed = raw.clone();

        if let Some(splitter) = self.splitter.as_deref().filter(|s| !s.is_empty()) {
            let raw_text = raw.to_string();
            let parts: Vec<&str> = raw_text.split(splitter).collect();

            match self.mode {
                Some(SplitMode::Last) => {
                    processed = CellValue::text(parts.last().copied().unwrap_or_default());
                }
                Some(SplitMode::AllButLast) => {
                    let joined = if parts.len() > 1 {
                        parts[..parts.len() - 1].join(splitter)
                    } else {
                        String::new()
                    };
                    processed = CellValue::Text(joined);
                }
                None => {}
            }

            if let Some(index) = self.index {
                if index < 1 || index as usize > parts.len() {
                    return Err(ValidationError::IndexOutOfRange {
                        field: self.field_name.clone(),
                        value: raw_text.clone(),
                        index,
                        len: parts.len(),
                    });
                }
                processed = CellValue::text(parts[index as usize - 1]);
            }
        }

        if self.method == Some(Method::Round) {
            processed = CellValue::Number(self.round_value(&processed)?);
        }

        Ok(Some(processed))
    }

    fn round_value(&self, value: &CellValue) -> Result<f64, ValidationError> {
        let number = match value {
            CellValue::Number(n) => *n,
            CellValue::Int(i) => *i as f64,
            CellValue::Bool(b) => f64::from(u8::from(*b)),
            other => {
                let text = other.to_string();
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| ValidationError::NotNumeric {
                        field: self.field_name.clone(),
                        value: text.clone(),
                    })?
            }
        };
        if !number.is_finite() {
            return Err(ValidationError::NotNumeric {
                field: self.field_name.clone(),
                value: value.to_string(),
            });
        }
        // 银行家舍入（.5 取偶）
        let factor = 10f64.powi(self.dp);
        Ok((number * factor).round_ties_even() / factor)
    }
}

// ==========================================
// MappingTable - 源键 → 规则列表（扇出）
// ==========================================
// 保持源键的声明顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingTable {
    entries: Vec<(String, Vec<Rule>)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加规则（同一源键的多条规则累加）
    pub fn push(&mut self, source_key: impl Into<String>, rule: Rule) {
        let source_key = source_key.into();
        match self.index.get(&source_key) {
            Some(&pos) => self.entries[pos].1.push(rule),
            None => {
                self.index.insert(source_key.clone(), self.entries.len());
                self.entries.push((source_key, vec![rule]));
            }
        }
    }

    pub fn get(&self, source_key: &str) -> Option<&[Rule]> {
        self.index
            .get(source_key)
            .map(|&pos| self.entries[pos].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Rule])> {
        self.entries
            .iter()
            .map(|(key, rules)| (key.as_str(), rules.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 恒等映射表: 每个名称映射到同名目标字段（无转换）
    pub fn identity<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut table = Self::new();
        for name in names {
            if table.get(name).is_none() {
                table.push(name, Rule::new(name));
            }
        }
        table
    }
}

// ==========================================
// FixedMapping - 目标列 → 固定值
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedMapping {
    entries: Vec<(String, String)>,
}

impl FixedMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置固定值（同一目标列后者覆盖前者）
    pub fn insert(&mut self, dest_col: impl Into<String>, literal: impl Into<String>) {
        let dest_col = dest_col.into();
        let literal = literal.into();
        match self.entries.iter_mut().find(|(col, _)| *col == dest_col) {
            Some(entry) => entry.1 = literal,
            None => self.entries.push((dest_col, literal)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(col, literal)| (col.as_str(), literal.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_rule(mode: Option<SplitMode>, index: Option<i64>) -> Rule {
        Rule {
            splitter: Some("-".to_string()),
            mode,
            index,
            ..Rule::new("lot")
        }
    }

    #[test]
    fn test_split_last() {
        let rule = split_rule(Some(SplitMode::Last), None);
        let value = rule.map_action(&CellValue::text("A-B-C")).unwrap();
        assert_eq!(value, Some(CellValue::text("C")));
    }

    #[test]
    fn test_split_all_but_last() {
        let rule = split_rule(Some(SplitMode::AllButLast), None);
        assert_eq!(
            rule.map_action(&CellValue::text("A-B-C")).unwrap(),
            Some(CellValue::text("A-B"))
        );
        // 单段时结果为空字符串
        assert_eq!(
            rule.map_action(&CellValue::text("ABC")).unwrap(),
            Some(CellValue::text(""))
        );
    }

    #[test]
    fn test_index_overrides_mode() {
        let rule = split_rule(Some(SplitMode::Last), Some(2));
        let value = rule.map_action(&CellValue::text("A-B-C")).unwrap();
        assert_eq!(value, Some(CellValue::text("B")));
    }

    #[test]
    fn test_index_out_of_range() {
        let zero = split_rule(None, Some(0));
        assert!(matches!(
            zero.map_action(&CellValue::text("A-B-C")),
            Err(ValidationError::IndexOutOfRange { index: 0, len: 3, .. })
        ));

        let beyond = split_rule(None, Some(4));
        assert!(beyond.map_action(&CellValue::text("A-B-C")).is_err());
    }

    #[test]
    fn test_round_two_places() {
        let rule = Rule {
            method: Some(Method::Round),
            ..Rule::new("weight")
        };
        let value = rule.map_action(&CellValue::text("3.14159")).unwrap();
        assert_eq!(value, Some(CellValue::Number(3.14)));
    }

    #[test]
    fn test_round_custom_dp_on_number() {
        let rule = Rule {
            method: Some(Method::Round),
            dp: 0,
            ..Rule::new("qty")
        };
        let value = rule.map_action(&CellValue::Number(7.6)).unwrap();
        assert_eq!(value, Some(CellValue::Number(8.0)));
    }

    #[test]
    fn test_round_half_to_even() {
        let whole = Rule {
            method: Some(Method::Round),
            dp: 0,
            ..Rule::new("qty")
        };
        assert_eq!(
            whole.map_action(&CellValue::Number(2.5)).unwrap(),
            Some(CellValue::Number(2.0))
        );
        assert_eq!(
            whole.map_action(&CellValue::Number(3.5)).unwrap(),
            Some(CellValue::Number(4.0))
        );

        let cents = Rule {
            method: Some(Method::Round),
            ..Rule::new("price")
        };
        assert_eq!(
            cents.map_action(&CellValue::text("0.125")).unwrap(),
            Some(CellValue::Number(0.12))
        );
    }

    #[test]
    fn test_identity_table_dedupes() {
        let table = MappingTable::identity(["vessel", "eta", "vessel"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("vessel").unwrap()[0].field_name, "vessel");
    }

    #[test]
    fn test_round_non_numeric() {
        let rule = Rule {
            method: Some(Method::Round),
            ..Rule::new("weight")
        };
        assert!(matches!(
            rule.map_action(&CellValue::text("abc")),
            Err(ValidationError::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_split_then_round() {
        let rule = Rule {
            splitter: Some("/".to_string()),
            index: Some(2),
            method: Some(Method::Round),
            dp: 1,
            ..Rule::new("cbm")
        };
        let value = rule.map_action(&CellValue::text("KG/12.345")).unwrap();
        assert_eq!(value, Some(CellValue::Number(12.3)));
    }

    #[test]
    fn test_falsy_input_returns_none() {
        let rule = split_rule(Some(SplitMode::Last), None);
        assert_eq!(rule.map_action(&CellValue::Empty).unwrap(), None);
        assert_eq!(rule.map_action(&CellValue::text("")).unwrap(), None);
        assert_eq!(rule.map_action(&CellValue::Int(0)).unwrap(), None);
    }

    #[test]
    fn test_no_transform_keeps_raw_type() {
        let rule = Rule::new("qty");
        assert_eq!(
            rule.map_action(&CellValue::Number(12.0)).unwrap(),
            Some(CellValue::Number(12.0))
        );
    }

    #[test]
    fn test_mapping_table_fan_out_keeps_order() {
        let mut table = MappingTable::new();
        table.push("PO", Rule::new("po"));
        table.push("LOT", Rule::new("lot"));
        table.push("PO", Rule::new("po_copy"));

        let keys: Vec<&str> = table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["PO", "LOT"]);
        assert_eq!(table.get("PO").map(|r| r.len()), Some(2));
        assert!(table.get("REMARK").is_none());
    }

    #[test]
    fn test_fixed_mapping_last_wins() {
        let mut fixed = FixedMapping::new();
        fixed.insert("status", "NEW");
        fixed.insert("source", "SNT");
        fixed.insert("status", "PROCESSED");

        let entries: Vec<(&str, &str)> = fixed.iter().collect();
        assert_eq!(entries, vec![("status", "PROCESSED"), ("source", "SNT")]);
    }
}
