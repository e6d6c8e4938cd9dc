// ==========================================
// 多源表格对账合并引擎 - 对账 API
// ==========================================
// 职责: 供外部界面调用的运行触发、结果查询、配置读写接口
// 红线: 同一时刻只允许一次运行
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{config_files, RunLayout};
use crate::engine::ReconPipeline;
use crate::importer::inventory::list_supported_files;
use crate::importer::workbook::SourceWorkbook;
use crate::progress::{ProgressSink, ProgressSnapshot, ProgressTracker};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[async_trait]
pub trait ReconApi: Send + Sync {
    /// 触发一次运行，返回 (是否成功, 消息)
    async fn trigger_run(&self) -> (bool, String);

    /// 结果文件名列表（最新在前）
    async fn list_result_files(&self) -> ApiResult<Vec<String>>;

    /// 结果文件中的工作表名
    async fn result_sheet_names(&self, file_name: &str) -> ApiResult<Vec<String>>;

    /// 读取配置文件内容（不存在时返回空串）
    async fn read_config_file(&self, name: &str) -> ApiResult<String>;

    /// 保存配置文件
    async fn save_config_file(&self, name: &str, content: &str) -> ApiResult<()>;

    /// 当前进度
    fn progress(&self) -> ProgressSnapshot;
}

// ==========================================
// ReconService - 默认实现
// ==========================================
pub struct ReconService {
    layout: RunLayout,
    tracker: Arc<ProgressTracker>,
    run_lock: Mutex<()>,
}

impl ReconService {
    pub fn new(layout: RunLayout) -> Self {
        Self {
            layout,
            tracker: Arc::new(ProgressTracker::new()),
            run_lock: Mutex::new(()),
        }
    }

    fn result_path(&self, file_name: &str) -> ApiResult<PathBuf> {
        if file_name.contains(['/', '\\']) || file_name.contains("..") {
            return Err(ApiError::InvalidInput(format!("非法文件名: {}", file_name)));
        }
        let path = self.layout.target_dir.join(file_name);
        if !path.is_file() {
            return Err(ApiError::NotFound(file_name.to_string()));
        }
        Ok(path)
    }

    fn config_path(&self, name: &str) -> ApiResult<PathBuf> {
        if !config_files::ALL.contains(&name) {
            return Err(ApiError::InvalidInput(format!("未知配置文件: {}", name)));
        }
        Ok(self.layout.conf_file(name))
    }
}

#[async_trait]
impl ReconApi for ReconService {
    async fn trigger_run(&self) -> (bool, String) {
        let Ok(_guard) = self.run_lock.try_lock() else {
            return (false, "已有任务在运行，请稍后再试".to_string());
        };

        let progress: Arc<dyn ProgressSink> = self.tracker.clone();
        let pipeline = ReconPipeline::new(self.layout.clone()).with_progress(progress);

        match pipeline.run().await {
            Ok(report) => (report.success, report.summary()),
            Err(e) => {
                self.tracker.close();
                (false, format!("处理过程中出现错误: {}", e))
            }
        }
    }

    async fn list_result_files(&self) -> ApiResult<Vec<String>> {
        let target_dir = self.layout.target_dir.clone();
        let files = tokio::task::spawn_blocking(move || {
            let paths = list_supported_files(&target_dir)?;
            let mut with_time: Vec<(SystemTime, String)> = paths
                .into_iter()
                .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("xlsx")))
                .filter_map(|p| {
                    let modified = p.metadata().and_then(|m| m.modified()).ok()?;
                    let name = p.file_name()?.to_str()?.to_string();
                    Some((modified, name))
                })
                .collect();
            // 最新在前；同一时间按名称倒序（名称含时间戳）
            with_time.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
            Ok::<_, crate::error::ResourceError>(with_time.into_iter().map(|(_, n)| n).collect())
        })
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?
        .map_err(crate::error::ReconError::from)?;
        Ok(files)
    }

    async fn result_sheet_names(&self, file_name: &str) -> ApiResult<Vec<String>> {
        let path = self.result_path(file_name)?;
        let names = tokio::task::spawn_blocking(move || {
            SourceWorkbook::open(&path).map(|workbook| workbook.sheet_names())
        })
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?
        .map_err(crate::error::ReconError::from)?;
        Ok(names)
    }

    async fn read_config_file(&self, name: &str) -> ApiResult<String> {
        let path = self.config_path(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(ApiError::Io { path, source }),
        }
    }

    async fn save_config_file(&self, name: &str, content: &str) -> ApiResult<()> {
        let path = self.config_path(name)?;
        tokio::fs::create_dir_all(&self.layout.conf_dir)
            .await
            .map_err(|source| ApiError::Io {
                path: self.layout.conf_dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| ApiError::Io {
                path: path.clone(),
                source,
            })?;
        info!(file = name, "配置文件已保存");
        Ok(())
    }

    fn progress(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }
}

impl Drop for ReconService {
    fn drop(&mut self) {
        if self.tracker.snapshot().running {
            warn!("服务释放时仍有运行中的任务");
        }
    }
}
