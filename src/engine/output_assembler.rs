// ==========================================
// 多源表格对账合并引擎 - 输出组装
// ==========================================
// 职责: 基准表 → 按模板表头排列的输出行
// 缺失字段为 None（写出为空单元格）
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::source::{CompositeKey, DestRow};
use crate::engine::baseline_loader::BaselineTable;
use crate::error::MergeError;

pub type OutputRow = Vec<Option<CellValue>>;

pub struct OutputAssembler;

impl OutputAssembler {
    /// 按基准表插入顺序组装
    pub fn assemble(table: &BaselineTable, headers: &[String]) -> Result<Vec<OutputRow>, MergeError> {
        Ok(table
            .snapshot()?
            .iter()
            .map(|(_, row)| Self::order_row(row, headers))
            .collect())
    }

    /// 按复合主键排序后组装
    pub fn assemble_sorted(
        table: &BaselineTable,
        headers: &[String],
    ) -> Result<Vec<OutputRow>, MergeError> {
        let mut rows: Vec<(CompositeKey, DestRow)> = table.snapshot()?;
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows
            .iter()
            .map(|(_, row)| Self::order_row(row, headers))
            .collect())
    }

    pub fn order_row(row: &DestRow, headers: &[String]) -> OutputRow {
        headers.iter().map(|h| row.get(h).cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        vec!["po".to_string(), "eta".to_string(), "missing".to_string()]
    }

    fn table() -> BaselineTable {
        let mut table = BaselineTable::new();
        for po in ["P2", "P1"] {
            let mut row = DestRow::new();
            row.insert("po".to_string(), CellValue::text(po));
            row.insert("eta".to_string(), CellValue::Empty);
            row.insert("extra".to_string(), CellValue::text("x"));
            table.insert(CompositeKey::new([po]), row);
        }
        table
    }

    #[test]
    fn test_assemble_follows_header_order() {
        let rows = OutputAssembler::assemble(&table(), &headers()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            vec![Some(CellValue::text("P2")), Some(CellValue::Empty), None]
        );
    }

    #[test]
    fn test_assemble_sorted() {
        let rows = OutputAssembler::assemble_sorted(&table(), &headers()).unwrap();
        assert_eq!(rows[0][0], Some(CellValue::text("P1")));
        assert_eq!(rows[1][0], Some(CellValue::text("P2")));
    }
}
