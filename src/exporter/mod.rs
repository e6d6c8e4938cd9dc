// ==========================================
// 多源表格对账合并引擎 - 输出层
// ==========================================
// 职责: 模板表头读取、带样式的结果工作簿写入
// ==========================================

pub mod template;
pub mod workbook_writer;

pub use template::OutputTemplate;
pub use workbook_writer::{SheetOutput, WorkbookWriter};
