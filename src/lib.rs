// ==========================================
// 多源表格对账合并引擎 - 核心库
// ==========================================
// 技术栈: Rust + calamine + rust_xlsxwriter + tokio
// 系统定位: 以基准文件为主键索引，按映射规则合并多类来源数据
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 单元格值、规则、来源
pub mod domain;

// 错误类型
pub mod error;

// 配置层 - 映射 DSL 与目录布局
pub mod config;

// 导入层 - 工作簿读取与字段提取
pub mod importer;

// 引擎层 - 基准加载、并发合并、编排
pub mod engine;

// 输出层 - 结果工作簿
pub mod exporter;

// 进度上报
pub mod progress;

// 日志系统
pub mod logging;

// API 层 - 外部接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    CellValue, CompositeKey, DestRow, KeyedSupplement, MappingTable, Rule, SheetRequirement,
    SourceCategory, SourceRow,
};

pub use config::{EngineSettings, ReconConfig, RunLayout};

pub use engine::{ReconPipeline, RunReport, SheetReport, SheetStatus};

pub use error::{ReconError, ReconResult};

pub use api::{ReconApi, ReconService};

pub use progress::{NoopProgress, ProgressSink, ProgressSnapshot, ProgressTracker, TerminalProgress};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "多源表格对账合并引擎";
