// ==========================================
// 多源表格对账合并引擎 - 引擎层
// ==========================================
// 职责: 基准加载、并发合并、单据扫描、输出组装、运行编排
// 红线: 合并阶段主键索引不可变，行级加锁
// ==========================================

pub mod baseline_loader;
pub mod document_scanner;
pub mod merge_coordinator;
pub mod orchestrator;
pub mod output_assembler;
pub mod worker_pool;

// 重导出核心引擎
pub use baseline_loader::{BaselineLoader, BaselineStats, BaselineTable};
pub use document_scanner::{scan_documents, scan_files};
pub use merge_coordinator::{FileMergeStats, MergeCoordinator, SheetRowCounts};
pub use orchestrator::{ReconPipeline, RunReport, SheetReport, SheetStatus};
pub use output_assembler::{OutputAssembler, OutputRow};
pub use worker_pool::WorkerPool;
