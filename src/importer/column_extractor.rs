// ==========================================
// 多源表格对账合并引擎 - 列映射提取器
// ==========================================
// 职责: 源行（表头 → 值）按映射表转换为目标字段
// 规则:
// - 源值为真值时写入 map_action 结果
// - considerEmpty 独立生效，写入原始值（覆盖转换结果）
// - 行中不存在的源列直接跳过
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::rule::{FixedMapping, MappingTable};
use crate::domain::source::{DestRow, SourceRow};
use crate::error::ValidationError;

pub struct ColumnExtractor;

impl ColumnExtractor {
    /// 按映射表提取目标字段
    ///
    /// 遍历顺序为映射表声明顺序，多个源列指向同一目标字段时后者覆盖前者
    pub fn extract(row: &SourceRow, table: &MappingTable) -> Result<DestRow, ValidationError> {
        let mut mapped = DestRow::new();

        for (source_key, rules) in table.iter() {
            let Some(raw) = row.get(source_key) else {
                continue;
            };

            for rule in rules {
                if raw.is_truthy() {
                    if let Some(value) = rule.map_action(raw)? {
                        mapped.insert(rule.field_name.clone(), value);
                    }
                }
                if rule.consider_empty {
                    mapped.insert(rule.field_name.clone(), raw.clone());
                }
            }
        }

        Ok(mapped)
    }

    /// 写入固定值
    pub fn stamp_fixed(target: &mut DestRow, fixed: &FixedMapping) {
        for (dest_col, literal) in fixed.iter() {
            target.insert(dest_col.to_string(), CellValue::text(literal));
        }
    }

    /// 以模板表头初始化空行
    pub fn seed_row<'a, I>(headers: I) -> DestRow
    where
        I: IntoIterator<Item = &'a str>,
    {
        headers
            .into_iter()
            .map(|h| (h.to_string(), CellValue::Empty))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::{Method, Rule, SplitMode};

    fn source_row(pairs: &[(&str, CellValue)]) -> SourceRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_extract_applies_rules_and_fan_out() {
        let mut table = MappingTable::new();
        table.push("PO NO.", Rule::new("po"));
        table.push(
            "PO NO.",
            Rule {
                splitter: Some("-".to_string()),
                mode: Some(SplitMode::Last),
                ..Rule::new("po_suffix")
            },
        );
        table.push(
            "WEIGHT",
            Rule {
                method: Some(Method::Round),
                dp: 1,
                ..Rule::new("weight")
            },
        );

        let row = source_row(&[
            ("PO NO.", CellValue::text("PO-77")),
            ("WEIGHT", CellValue::Number(12.345)),
            ("UNMAPPED", CellValue::text("x")),
        ]);
        let mapped = ColumnExtractor::extract(&row, &table).unwrap();

        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped.get("po"), Some(&CellValue::text("PO-77")));
        assert_eq!(mapped.get("po_suffix"), Some(&CellValue::text("77")));
        assert_eq!(mapped.get("weight"), Some(&CellValue::Number(12.3)));
    }

    #[test]
    fn test_falsy_and_absent_columns_skipped() {
        let mut table = MappingTable::new();
        table.push("REMARK", Rule::new("remark"));
        table.push("ETA", Rule::new("eta"));

        let row = source_row(&[("REMARK", CellValue::Empty)]);
        let mapped = ColumnExtractor::extract(&row, &table).unwrap();
        assert!(mapped.is_empty());
    }

    #[test]
    fn test_consider_empty_writes_raw() {
        let mut table = MappingTable::new();
        table.push(
            "REMARK",
            Rule {
                consider_empty: true,
                ..Rule::new("remark")
            },
        );
        table.push(
            "LOT",
            Rule {
                splitter: Some("/".to_string()),
                index: Some(1),
                consider_empty: true,
                ..Rule::new("lot")
            },
        );

        let row = source_row(&[
            ("REMARK", CellValue::Empty),
            ("LOT", CellValue::text("L1/L2")),
        ]);
        let mapped = ColumnExtractor::extract(&row, &table).unwrap();

        assert_eq!(mapped.get("remark"), Some(&CellValue::Empty));
        // 原始值覆盖转换结果
        assert_eq!(mapped.get("lot"), Some(&CellValue::text("L1/L2")));
    }

    #[test]
    fn test_validation_error_propagates() {
        let mut table = MappingTable::new();
        table.push(
            "LOT",
            Rule {
                splitter: Some("-".to_string()),
                index: Some(5),
                ..Rule::new("lot")
            },
        );
        let row = source_row(&[("LOT", CellValue::text("A-B"))]);
        assert!(ColumnExtractor::extract(&row, &table).is_err());
    }

    #[test]
    fn test_stamp_fixed_and_seed() {
        let mut row = ColumnExtractor::seed_row(["po", "status"]);
        assert_eq!(row.get("status"), Some(&CellValue::Empty));

        let mut fixed = FixedMapping::new();
        fixed.insert("status", "NEW");
        ColumnExtractor::stamp_fixed(&mut row, &fixed);
        assert_eq!(row.get("status"), Some(&CellValue::text("NEW")));
    }
}
