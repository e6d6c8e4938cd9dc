// ==========================================
// 多源表格对账合并引擎 - 领域模型层
// ==========================================
// 职责: 定义单元格值、映射规则、数据源与主键类型
// 红线: 不含文件读写逻辑,不含并发逻辑
// ==========================================

pub mod cell;
pub mod rule;
pub mod source;

// 重导出核心类型
pub use cell::CellValue;
pub use rule::{
    Direction, FixedMapping, MappingTable, Method, ReadingMode, Rule, SplitMode, DEFAULT_JOINER,
};
pub use source::{
    CompositeKey, DestRow, KeyedSupplement, SheetRequirement, SourceCategory, SourceFile,
    SourceRow,
};
