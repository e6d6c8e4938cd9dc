// ==========================================
// 多源表格对账合并引擎 - API 层
// ==========================================
// 职责: 提供运行触发、结果查询与配置读写接口，供外部界面调用
// ==========================================

pub mod error;
pub mod recon_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use recon_api::{ReconApi, ReconService};
