// ==========================================
// 多源表格对账合并引擎 - 工作簿读取适配器
// ==========================================
// 支持: Excel (.xlsx/.xlsm/.xls) / CSV (.csv)
// 能力: CellAccess（0 起始坐标的只读单元格访问）
// ==========================================

use crate::domain::cell::CellValue;
use crate::error::ResourceError;
use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// CSV 文件的唯一工作表名
pub const CSV_SHEET_NAME: &str = "Sheet1";

/// Excel 打开中的临时锁文件前缀
const TEMP_FILE_PREFIX: &str = "~$";

// ==========================================
// CellAccess - 单元格访问能力
// ==========================================
pub trait CellAccess: Send + Sync {
    /// 读取 (row, col) 处的值，越界返回 Empty
    fn cell(&self, row: usize, col: usize) -> CellValue;

    fn row_count(&self) -> usize;

    fn col_count(&self) -> usize;
}

// calamine 的 Range 从第一个非空单元格开始，按绝对坐标访问
impl CellAccess for Range<Data> {
    fn cell(&self, row: usize, col: usize) -> CellValue {
        let (Ok(r), Ok(c)) = (u32::try_from(row), u32::try_from(col)) else {
            return CellValue::Empty;
        };
        self.get_value((r, c))
            .map(CellValue::from)
            .unwrap_or_default()
    }

    fn row_count(&self) -> usize {
        self.end().map(|(r, _)| r as usize + 1).unwrap_or(0)
    }

    fn col_count(&self) -> usize {
        self.end().map(|(_, c)| c as usize + 1).unwrap_or(0)
    }
}

// ==========================================
// MemorySheet - 内存工作表
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySheet {
    rows: Vec<Vec<CellValue>>,
    col_count: usize,
}

impl MemorySheet {
    pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Self {
        let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self { rows, col_count }
    }

    /// 由字符串二维表构建，空串记为 Empty
    pub fn from_text_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|s| match s.as_ref() {
                        "" => CellValue::Empty,
                        text => CellValue::text(text),
                    })
                    .collect()
            })
            .collect();
        Self::from_rows(rows)
    }

    /// 读取整个 CSV 文件（无表头语义，第一行同样作为数据保存）
    pub fn from_csv(path: &Path) -> Result<Self, ResourceError> {
        let file = File::open(path).map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ResourceError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        Ok(Self::from_text_rows(rows))
    }
}

impl CellAccess for MemorySheet {
    fn cell(&self, row: usize, col: usize) -> CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or_default()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn col_count(&self) -> usize {
        self.col_count
    }
}

// ==========================================
// SheetGrid - 已加载的工作表
// ==========================================
#[derive(Debug, Clone)]
pub enum SheetGrid {
    Range(Range<Data>),
    Memory(MemorySheet),
}

impl CellAccess for SheetGrid {
    fn cell(&self, row: usize, col: usize) -> CellValue {
        match self {
            SheetGrid::Range(range) => range.cell(row, col),
            SheetGrid::Memory(sheet) => sheet.cell(row, col),
        }
    }

    fn row_count(&self) -> usize {
        match self {
            SheetGrid::Range(range) => range.row_count(),
            SheetGrid::Memory(sheet) => sheet.row_count(),
        }
    }

    fn col_count(&self) -> usize {
        match self {
            SheetGrid::Range(range) => range.col_count(),
            SheetGrid::Memory(sheet) => sheet.col_count(),
        }
    }
}

/// 读取第一行作为表头（去首尾空白，空值为 ""）
pub fn header_row(grid: &dyn CellAccess) -> Vec<String> {
    if grid.row_count() == 0 {
        return Vec::new();
    }
    (0..grid.col_count())
        .map(|col| grid.cell(0, col).to_string().trim().to_string())
        .collect()
}

// ==========================================
// SourceWorkbook - 按扩展名选择后端
// ==========================================
pub enum SourceWorkbook {
    Spreadsheet {
        path: PathBuf,
        sheets: Sheets<BufReader<File>>,
    },
    Csv(MemorySheet),
}

impl SourceWorkbook {
    /// 打开工作簿
    ///
    /// # 错误
    /// - FileNotFound: 文件不存在
    /// - UnsupportedFormat: 扩展名不受支持
    /// - Corrupt: 后端无法解析
    pub fn open(path: &Path) -> Result<Self, ResourceError> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        match extension_of(path).as_str() {
            "xlsx" | "xlsm" | "xls" => {
                let sheets = open_workbook_auto(path).map_err(|e| ResourceError::Corrupt {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                Ok(SourceWorkbook::Spreadsheet {
                    path: path.to_path_buf(),
                    sheets,
                })
            }
            "csv" => Ok(SourceWorkbook::Csv(MemorySheet::from_csv(path)?)),
            _ => Err(ResourceError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn sheet_names(&self) -> Vec<String> {
        match self {
            SourceWorkbook::Spreadsheet { sheets, .. } => sheets.sheet_names(),
            SourceWorkbook::Csv(_) => vec![CSV_SHEET_NAME.to_string()],
        }
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names().iter().any(|s| s == name)
    }

    /// 按名称加载工作表，不存在时返回 None
    pub fn worksheet(&mut self, name: &str) -> Result<Option<SheetGrid>, ResourceError> {
        if !self.has_sheet(name) {
            return Ok(None);
        }
        match self {
            SourceWorkbook::Spreadsheet { path, sheets } => {
                let range = sheets
                    .worksheet_range(name)
                    .map_err(|e| ResourceError::Corrupt {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                Ok(Some(SheetGrid::Range(range)))
            }
            SourceWorkbook::Csv(sheet) => Ok(Some(SheetGrid::Memory(sheet.clone()))),
        }
    }

    /// 加载第一个工作表
    pub fn first_worksheet(&mut self) -> Result<Option<SheetGrid>, ResourceError> {
        match self.sheet_names().into_iter().next() {
            Some(name) => self.worksheet(&name),
            None => Ok(None),
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// 是否为受支持的输入文件（排除 Excel 临时锁文件）
pub fn is_supported_file(path: &Path) -> bool {
    let is_temp = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TEMP_FILE_PREFIX));
    !is_temp && matches!(extension_of(path).as_str(), "xlsx" | "xlsm" | "xls" | "csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_memory_sheet_access() {
        let sheet = MemorySheet::from_text_rows(vec![vec!["PO", "QTY"], vec!["P1", ""], vec!["P2"]]);
        assert_eq!(sheet.row_count(), 3);
        assert_eq!(sheet.col_count(), 2);
        assert_eq!(sheet.cell(1, 0), CellValue::text("P1"));
        assert_eq!(sheet.cell(1, 1), CellValue::Empty);
        assert_eq!(sheet.cell(2, 1), CellValue::Empty);
        assert_eq!(sheet.cell(9, 9), CellValue::Empty);
    }

    #[test]
    fn test_header_row_trims() {
        let sheet = MemorySheet::from_text_rows(vec![vec![" PO ", "", "LOT"]]);
        assert_eq!(header_row(&sheet), vec!["PO", "", "LOT"]);
        assert!(header_row(&MemorySheet::default()).is_empty());
    }

    #[test]
    fn test_csv_workbook_single_sheet() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "PO,QTY").unwrap();
        writeln!(file, "P1,5").unwrap();
        writeln!(file, "P2").unwrap();

        let mut workbook = SourceWorkbook::open(file.path()).unwrap();
        assert_eq!(workbook.sheet_names(), vec![CSV_SHEET_NAME]);

        let grid = workbook.worksheet(CSV_SHEET_NAME).unwrap().unwrap();
        assert_eq!(grid.row_count(), 3);
        assert_eq!(grid.cell(1, 1), CellValue::text("5"));
        assert!(workbook.worksheet("Other").unwrap().is_none());
    }

    #[test]
    fn test_open_errors() {
        assert!(matches!(
            SourceWorkbook::open(Path::new("/nonexistent/a.xlsx")),
            Err(ResourceError::FileNotFound(_))
        ));

        let txt = NamedTempFile::new().unwrap();
        assert!(matches!(
            SourceWorkbook::open(txt.path()),
            Err(ResourceError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_corrupt_xlsx() {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        writeln!(file, "not a zip archive").unwrap();
        assert!(matches!(
            SourceWorkbook::open(file.path()),
            Err(ResourceError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_supported_file_filter() {
        assert!(is_supported_file(Path::new("data/a.xlsx")));
        assert!(is_supported_file(Path::new("data/b.CSV")));
        assert!(!is_supported_file(Path::new("data/~$a.xlsx")));
        assert!(!is_supported_file(Path::new("data/notes.txt")));
    }
}
