// ==========================================
// 多源表格对账合并引擎 - 导入层
// ==========================================
// 职责: 工作簿读取、行读取、字段提取、工作表解析、源文件清单
// 支持: Excel (.xlsx/.xlsm/.xls), CSV
// ==========================================

// 模块声明
pub mod column_extractor;
pub mod directional_extractor;
pub mod inventory;
pub mod row_reader;
pub mod sheet_resolver;
pub mod workbook;

// 重导出核心类型
pub use column_extractor::ColumnExtractor;
pub use directional_extractor::DirectionalExtractor;
pub use inventory::SourceInventory;
pub use row_reader::{RequiredMode, RowReader};
pub use sheet_resolver::{ResolvedSheet, SheetResolver};
pub use workbook::{CellAccess, MemorySheet, SheetGrid, SourceWorkbook};
