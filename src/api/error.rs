// ==========================================
// 多源表格对账合并引擎 - API 层错误类型
// ==========================================
// 职责: 把引擎错误转换为面向界面的错误消息
// ==========================================

use crate::error::ReconError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("文件访问失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Recon(#[from] ReconError),
}

pub type ApiResult<T> = Result<T, ApiError>;
