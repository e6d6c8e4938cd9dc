// ==========================================
// 多源表格对账合并引擎 - 行读取器
// ==========================================
// 职责: 以首行为表头，把数据行转换为 表头 → 值
// 规则:
// - 表头为空的列忽略，文本值去首尾空白
// - 全空行跳过；连续空行达到上限后停止读取
// - 必填列过滤: 严格（任一缺失即跳过）/ 宽松（全部缺失才跳过）
// ==========================================

use crate::domain::source::SourceRow;
use crate::importer::workbook::{header_row, CellAccess};
use tracing::debug;

/// 必填列过滤模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredMode {
    Strict,
    Lenient,
}

// ==========================================
// RowReader - 数据行迭代器
// ==========================================
pub struct RowReader<'a> {
    grid: &'a dyn CellAccess,
    /// (列号, 表头)
    columns: Vec<(usize, String)>,
    /// 表头中存在的必填列
    required: Vec<String>,
    mode: RequiredMode,
    empty_row_limit: usize,
    next_row: usize,
    empty_run: usize,
    stopped: bool,
}

impl<'a> RowReader<'a> {
    pub fn new(
        grid: &'a dyn CellAccess,
        required_fields: &[String],
        mode: RequiredMode,
        empty_row_limit: usize,
    ) -> Self {
        let columns: Vec<(usize, String)> = header_row(grid)
            .into_iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .collect();

        // 表头中不存在的必填列不参与校验
        let required = required_fields
            .iter()
            .filter(|field| columns.iter().any(|(_, name)| name == *field))
            .cloned()
            .collect();

        Self {
            grid,
            columns,
            required,
            mode,
            empty_row_limit,
            next_row: 1,
            empty_run: 0,
            stopped: false,
        }
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(_, name)| name.as_str())
    }

    fn read_row(&self, row: usize) -> SourceRow {
        self.columns
            .iter()
            .map(|(col, name)| (name.clone(), self.grid.cell(row, *col).trimmed()))
            .collect()
    }

    fn passes_required(&self, row_idx: usize, data: &SourceRow) -> bool {
        if self.required.is_empty() {
            return true;
        }
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|field| data.get(*field).map_or(true, |v| v.is_blank()))
            .map(String::as_str)
            .collect();

        match self.mode {
            RequiredMode::Strict if !missing.is_empty() => {
                debug!(row = row_idx + 1, missing = ?missing, "严格模式跳过");
                false
            }
            RequiredMode::Lenient if missing.len() == self.required.len() => {
                debug!(row = row_idx + 1, "宽松模式跳过，全部必填字段缺失");
                false
            }
            _ => true,
        }
    }
}

impl Iterator for RowReader<'_> {
    type Item = SourceRow;

    fn next(&mut self) -> Option<SourceRow> {
        while !self.stopped && self.next_row < self.grid.row_count() {
            let row_idx = self.next_row;
            self.next_row += 1;

            let data = self.read_row(row_idx);
            if data.values().all(|v| v.is_blank()) {
                self.empty_run += 1;
                if self.empty_run >= self.empty_row_limit {
                    debug!(
                        empty_rows = self.empty_run,
                        row = row_idx + 1,
                        "连续空行达到上限，提前终止读取"
                    );
                    self.stopped = true;
                }
                continue;
            }
            self.empty_run = 0;

            if self.passes_required(row_idx, &data) {
                return Some(data);
            }
        }
        None
    }
}
