// ==========================================
// 多源表格对账合并引擎 - 定向单元格扫描提取器
// ==========================================
// 职责: 对自由版式单据按“标签 → 相邻单元格”提取字段
// 规则:
// - 行优先扫描，单元格字符串值命中映射表源键即触发其规则
// - 起点为标签下一格（row: 下一行；column: 右一列）
// - readUntilBlank: 读至空白或边界；count: 恰好读 count 格，越界报错
// - 否则只读一格；多格结果以 # 拼接；后命中者覆盖先命中者
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::rule::{Direction, MappingTable, ReadingMode, Rule, DEFAULT_JOINER};
use crate::domain::source::SourceRow;
use crate::error::ValidationError;
use crate::importer::workbook::CellAccess;
use tracing::trace;

pub struct DirectionalExtractor;

impl DirectionalExtractor {
    /// 扫描整张表
    pub fn extract(grid: &dyn CellAccess, table: &MappingTable) -> Result<SourceRow, ValidationError> {
        let mut result = SourceRow::new();
        let (rows, cols) = (grid.row_count(), grid.col_count());

        for row in 0..rows {
            for col in 0..cols {
                let cell = grid.cell(row, col);
                if cell.is_blank() {
                    continue;
                }
                let Some(rules) = table.get(&cell.to_string()) else {
                    continue;
                };

                for rule in rules {
                    let value = Self::read_for_rule(grid, row, col, rule)?;
                    trace!(label = %cell, field = %rule.field_name, row, col, "定向提取命中");
                    result.insert(rule.field_name.clone(), value);
                }
            }
        }

        Ok(result)
    }

    /// 按规则从标签位置 (row, col) 出发读取
    fn read_for_rule(
        grid: &dyn CellAccess,
        row: usize,
        col: usize,
        rule: &Rule,
    ) -> Result<CellValue, ValidationError> {
        let (start_row, start_col, limit) = match rule.dir {
            Direction::Row => (row + 1, col, grid.row_count()),
            Direction::Column => (row, col + 1, grid.col_count()),
        };
        let position = |offset: usize| match rule.dir {
            Direction::Row => (start_row + offset, start_col),
            Direction::Column => (start_row, start_col + offset),
        };
        let along = |pos: (usize, usize)| match rule.dir {
            Direction::Row => pos.0,
            Direction::Column => pos.1,
        };

        // readingMode 优先于 count
        if rule.reading_mode == Some(ReadingMode::ReadUntilBlank) {
            let mut values = Vec::new();
            for offset in 0.. {
                let pos = position(offset);
                if along(pos) >= limit {
                    break;
                }
                let value = grid.cell(pos.0, pos.1);
                if value.is_blank() {
                    break;
                }
                values.push(value.to_string());
            }
            return Ok(CellValue::Text(values.join(DEFAULT_JOINER)));
        }

        if let Some(count) = rule.count.filter(|c| *c > 0) {
            let mut values = Vec::with_capacity(count);
            for offset in 0..count {
                let pos = position(offset);
                if along(pos) >= limit {
                    return Err(ValidationError::OutOfBounds {
                        field: rule.field_name.clone(),
                        row: pos.0,
                        col: pos.1,
                    });
                }
                values.push(grid.cell(pos.0, pos.1).to_string());
            }
            return Ok(CellValue::Text(values.join(DEFAULT_JOINER)));
        }

        Ok(grid.cell(start_row, start_col))
    }
}
