// ==========================================
// 多源表格对账合并引擎 - 输出工作簿写入
// ==========================================
// 职责: 组装后的行 → 带样式的 xlsx 文件
// 样式:
// - 表头: Calibri 粗体白字，底色 4F81BD，冻结首行
// - 数据: Calibri 11，偶数行（Excel 行号）底色 C8D7E9
// - 固定列宽
// 保存: I/O 失败按间隔重试；最终失败时删除残留文件
// ==========================================

use crate::config::EngineSettings;
use crate::domain::cell::CellValue;
use crate::engine::output_assembler::OutputRow;
use crate::error::ResourceError;
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const FONT_NAME: &str = "Calibri";
const HEADER_FILL: u32 = 0x4F81BD;
const STRIPE_FILL: u32 = 0xC8D7E9;

/// 单个输出工作表
#[derive(Debug, Clone, PartialEq)]
pub struct SheetOutput {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<OutputRow>,
}

pub struct WorkbookWriter {
    column_width: f64,
    max_attempts: u32,
    retry_interval: Duration,
}

impl WorkbookWriter {
    pub fn new(column_width: f64, max_attempts: u32, retry_interval: Duration) -> Self {
        Self {
            column_width,
            max_attempts: max_attempts.max(1),
            retry_interval,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(
            settings.column_width,
            settings.save_max_attempts,
            settings.save_retry_interval,
        )
    }

    /// 渲染为 xlsx 字节
    pub fn render(&self, sheets: &[SheetOutput]) -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        for sheet in sheets {
            let worksheet = workbook.add_worksheet();
            self.write_sheet(worksheet, sheet)?;
        }
        workbook.save_to_buffer()
    }

    fn write_sheet(&self, worksheet: &mut Worksheet, sheet: &SheetOutput) -> Result<(), XlsxError> {
        let header_format = Format::new()
            .set_bold()
            .set_font_name(FONT_NAME)
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(HEADER_FILL));
        let plain_format = Format::new().set_font_name(FONT_NAME).set_font_size(11);
        let stripe_format = plain_format
            .clone()
            .set_background_color(Color::RGB(STRIPE_FILL));

        worksheet.set_name(&sheet.name)?;
        worksheet.set_freeze_panes(1, 0)?;

        for (col, header) in sheet.headers.iter().enumerate() {
            let col = column_index(col)?;
            worksheet.write_string_with_format(0, col, header, &header_format)?;
            worksheet.set_column_width(col, self.column_width)?;
        }

        for (idx, row) in sheet.rows.iter().enumerate() {
            let excel_row = row_index(idx + 1)?;
            // Excel 行号 = idx + 2，偶数行填充
            let format = if idx % 2 == 0 { &stripe_format } else { &plain_format };
            for (col, value) in row.iter().enumerate() {
                write_cell(worksheet, excel_row, column_index(col)?, value.as_ref(), format)?;
            }
        }
        Ok(())
    }

    /// 渲染并保存；I/O 失败时重试
    pub async fn save(&self, sheets: &[SheetOutput], path: &Path) -> Result<(), ResourceError> {
        let bytes = self.render(sheets).map_err(|e| save_failed(path, &e))?;

        let mut attempt = 1;
        loop {
            match tokio::fs::write(path, &bytes).await {
                Ok(()) => {
                    info!(path = %path.display(), sheets = sheets.len(), attempt, "输出文件保存完成");
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        path = %path.display(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "文件保存失败，稍后重试（文件可能被占用）"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(e) => {
                    remove_partial(path).await;
                    return Err(save_failed(path, &e));
                }
            }
        }
    }
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<&CellValue>,
    format: &Format,
) -> Result<(), XlsxError> {
    match value {
        None | Some(CellValue::Empty) => worksheet.write_blank(row, col, format)?,
        Some(CellValue::Text(s)) => worksheet.write_string_with_format(row, col, s, format)?,
        Some(CellValue::Number(n)) => worksheet.write_number_with_format(row, col, *n, format)?,
        Some(CellValue::Int(i)) => worksheet.write_number_with_format(row, col, *i as f64, format)?,
        Some(CellValue::Bool(b)) => worksheet.write_boolean_with_format(row, col, *b, format)?,
    };
    Ok(())
}

fn row_index(row: usize) -> Result<u32, XlsxError> {
    u32::try_from(row).map_err(|_| XlsxError::RowColumnLimitError)
}

fn column_index(col: usize) -> Result<u16, XlsxError> {
    u16::try_from(col).map_err(|_| XlsxError::RowColumnLimitError)
}

fn save_failed(path: &Path, err: &dyn std::fmt::Display) -> ResourceError {
    ResourceError::SaveFailed {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

async fn remove_partial(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "残留输出文件删除失败");
        }
    }
}
