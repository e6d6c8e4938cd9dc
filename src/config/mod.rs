// ==========================================
// 多源表格对账合并引擎 - 配置层
// ==========================================
// 职责: 映射 DSL 解析、工作表配置、引擎参数、目录布局
// 存储: conf/*.txt
// ==========================================

pub mod config_manager;
pub mod layout;
pub mod mapping_parser;

// 重导出核心配置类型
pub use config_manager::{config_keys, EngineSettings, ReconConfig};
pub use layout::{config_files, RunLayout};
pub use mapping_parser::{DslSyntax, MappingParser};
