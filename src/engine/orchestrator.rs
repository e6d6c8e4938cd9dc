// ==========================================
// 多源表格对账合并引擎 - 运行编排器
// ==========================================
// 主流程:
// 1. 创建目录 → 加载配置 → 构造工作池
// 2. 校验源文件 → 读取模板 → 扫描单据（任一失败 → 整次运行失败）
// 3. 各工作表依次处理: 基准加载 → 类别合并 → 补充数据 → 组装
// 4. 全部工作表成功才写出结果文件与运行报告
// 5. 关闭工作池
// ==========================================

use crate::config::{ReconConfig, RunLayout};
use crate::domain::source::{KeyedSupplement, SheetRequirement, SourceCategory};
use crate::engine::baseline_loader::BaselineLoader;
use crate::engine::document_scanner::scan_documents;
use crate::engine::merge_coordinator::{FileMergeStats, MergeCoordinator, SheetRowCounts};
use crate::engine::output_assembler::OutputAssembler;
use crate::engine::worker_pool::{flatten_join, WorkerPool};
use crate::error::{ReconResult, ResourceError};
use crate::exporter::{OutputTemplate, SheetOutput, WorkbookWriter};
use crate::importer::inventory::SourceInventory;
use crate::progress::{NoopProgress, ProgressSink};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// 运行报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetReport {
    pub sheet: String,
    pub status: SheetStatus,
    pub baseline_rows: usize,
    pub duplicate_keys: usize,
    pub files: Vec<FileMergeStats>,
    pub supplements: Vec<SheetRowCounts>,
    pub error: Option<String>,
}

impl SheetReport {
    fn failed(sheet: &str, message: String) -> Self {
        Self {
            sheet: sheet.to_string(),
            status: SheetStatus::Failed,
            baseline_rows: 0,
            duplicate_keys: 0,
            files: Vec::new(),
            supplements: Vec::new(),
            error: Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub success: bool,
    /// 仅在全部工作表成功时存在
    pub output: Option<PathBuf>,
    pub sheets: Vec<SheetReport>,
}

impl RunReport {
    pub fn failed_sheets(&self) -> Vec<&str> {
        self.sheets
            .iter()
            .filter(|s| s.status == SheetStatus::Failed)
            .map(|s| s.sheet.as_str())
            .collect()
    }

    /// 面向界面的一行摘要
    pub fn summary(&self) -> String {
        match &self.output {
            Some(path) if self.success => format!(
                "处理完成: {} 个工作表，结果文件 {}",
                self.sheets.len(),
                path.display()
            ),
            _ => format!(
                "处理失败: 工作表 [{}] 未完成，未生成结果文件",
                self.failed_sheets().join(", ")
            ),
        }
    }
}

// ==========================================
// ReconPipeline - 运行编排
// ==========================================
pub struct ReconPipeline {
    layout: RunLayout,
    progress: Arc<dyn ProgressSink>,
    supplements: Vec<KeyedSupplement>,
}

/// 单次运行的只读上下文
struct RunContext {
    config: Arc<ReconConfig>,
    inventory: SourceInventory,
    template: OutputTemplate,
    supplements: Vec<KeyedSupplement>,
}

impl ReconPipeline {
    pub fn new(layout: RunLayout) -> Self {
        Self {
            layout,
            progress: Arc::new(NoopProgress),
            supplements: Vec::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// 追加外部补充数据（如邮件解析结果），在文件类别之后合并
    pub fn with_supplement(mut self, supplement: KeyedSupplement) -> Self {
        self.supplements.push(supplement);
        self
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// 执行一次完整运行
    ///
    /// # 返回
    /// - Err: 启动阶段失败（配置/文件/模板/单据），或结果文件保存失败
    /// - Ok(report): report.success 表示是否全部工作表成功并已写出结果
    #[instrument(skip(self), fields(root = %self.layout.root.display()))]
    pub async fn run(&self) -> ReconResult<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Local::now();
        info!(%run_id, "开始运行");

        self.layout.ensure_directories()?;
        let config = Arc::new(ReconConfig::load(&self.layout)?);
        let pool = WorkerPool::new(config.settings.worker_count);

        let result = self.run_with_pool(&pool, config, run_id, started_at).await;
        pool.shutdown();

        match &result {
            Ok(report) if report.success => info!(%run_id, "运行完成"),
            Ok(report) => warn!(%run_id, failed = ?report.failed_sheets(), "运行失败，未生成结果文件"),
            Err(e) => error!(%run_id, error = %e, "运行启动失败"),
        }
        result
    }

    async fn run_with_pool(
        &self,
        pool: &WorkerPool,
        config: Arc<ReconConfig>,
        run_id: Uuid,
        started_at: DateTime<Local>,
    ) -> ReconResult<RunReport> {
        let context = self.prepare(pool, config).await?;

        let total = (context.config.requirements.len() * context.inventory.len()) as u64;
        self.progress.init(total, "正在合并数据");

        let mut outputs = Vec::new();
        let mut reports = Vec::new();
        for requirement in &context.config.requirements {
            match self.process_sheet(pool, &context, requirement).await {
                Ok((output, report)) => {
                    outputs.push(output);
                    reports.push(report);
                }
                Err(e) => {
                    error!(sheet = %requirement.sheet_name, error = %e, "工作表处理失败");
                    reports.push(SheetReport::failed(&requirement.sheet_name, e.to_string()));
                }
            }
        }
        self.progress.close();

        let success = reports.iter().all(|r| r.status == SheetStatus::Succeeded);
        let mut report = RunReport {
            run_id,
            started_at,
            finished_at: Local::now(),
            success,
            output: None,
            sheets: reports,
        };

        if success {
            let output = self.layout.output_file(started_at);
            WorkbookWriter::from_settings(&context.config.settings)
                .save(&outputs, &output)
                .await?;
            report.output = Some(output.clone());
            report.finished_at = Local::now();
            write_report(&report, &RunLayout::report_file_for(&output)).await?;
        }

        Ok(report)
    }

    /// 启动阶段: 文件校验、模板读取、单据扫描
    async fn prepare(&self, pool: &WorkerPool, config: Arc<ReconConfig>) -> ReconResult<RunContext> {
        let layout = self.layout.clone();
        let inventory = flatten_join(
            "inventory",
            pool.spawn("inventory", move || SourceInventory::scan(&layout)).await,
        )??;

        let template_file = self.layout.template_file.clone();
        let template = flatten_join(
            "template",
            pool.spawn("template", move || OutputTemplate::load(&template_file))
                .await,
        )??;

        let mut supplements = self.supplements.clone();
        if let Some(documents) = scan_documents(pool, &self.layout, &config).await? {
            supplements.push(documents);
        }

        Ok(RunContext {
            config,
            inventory,
            template,
            supplements,
        })
    }

    #[instrument(skip_all, fields(sheet = %requirement.sheet_name))]
    async fn process_sheet(
        &self,
        pool: &WorkerPool,
        context: &RunContext,
        requirement: &SheetRequirement,
    ) -> ReconResult<(SheetOutput, SheetReport)> {
        info!("开始处理工作表");
        let headers = context.template.headers_for(&requirement.sheet_name)?.to_vec();
        let requirement = Arc::new(requirement.clone());

        // 阶段一: 基准数据
        let baseline_files: Vec<PathBuf> = context
            .inventory
            .by_category(SourceCategory::Baseline)
            .into_iter()
            .map(|f| f.path.clone())
            .collect();
        let baseline_count = baseline_files.len();
        let (table, baseline_stats) = {
            let requirement = Arc::clone(&requirement);
            let config = Arc::clone(&context.config);
            let headers = headers.clone();
            flatten_join(
                "baseline",
                pool.spawn(requirement.sheet_name.clone(), move || {
                    BaselineLoader::new(&requirement, &headers, &config).load(&baseline_files)
                })
                .await,
            )??
        };
        for _ in 0..baseline_count {
            self.progress.advance();
        }
        let table = Arc::new(table);

        // 阶段二: 次级来源合并
        let coordinator = MergeCoordinator::new(
            pool.clone(),
            Arc::clone(&context.config),
            Arc::clone(&requirement),
            Arc::clone(&table),
            Arc::clone(&self.progress),
        );
        let files = coordinator.merge_all(&context.inventory).await?;

        let mut supplements = Vec::with_capacity(context.supplements.len());
        for supplement in &context.supplements {
            supplements.push(coordinator.merge_supplement(supplement)?);
        }

        // 阶段三: 组装
        let rows = OutputAssembler::assemble(&table, &headers)?;
        info!(rows = rows.len(), "工作表处理完成");

        let report = SheetReport {
            sheet: requirement.sheet_name.clone(),
            status: SheetStatus::Succeeded,
            baseline_rows: table.len(),
            duplicate_keys: baseline_stats.duplicates,
            files,
            supplements,
            error: None,
        };
        let output = SheetOutput {
            name: requirement.sheet_name.clone(),
            headers,
            rows,
        };
        Ok((output, report))
    }
}

async fn write_report(report: &RunReport, path: &Path) -> Result<(), ResourceError> {
    let json = serde_json::to_vec_pretty(report).map_err(|e| ResourceError::SaveFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(statuses: &[(&str, SheetStatus)], output: Option<&str>) -> RunReport {
        let now = Local::now();
        RunReport {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            success: statuses.iter().all(|(_, s)| *s == SheetStatus::Succeeded),
            output: output.map(PathBuf::from),
            sheets: statuses
                .iter()
                .map(|(name, status)| SheetReport {
                    status: status.clone(),
                    ..SheetReport::failed(name, String::new())
                })
                .collect(),
        }
    }

    #[test]
    fn test_summary_and_failed_sheets() {
        let ok = report(&[("CREATED", SheetStatus::Succeeded)], Some("target/output.xlsx"));
        assert!(ok.summary().contains("target/output.xlsx"));
        assert!(ok.failed_sheets().is_empty());

        let failed = report(
            &[("CREATED", SheetStatus::Succeeded), ("NOT INCLUDED", SheetStatus::Failed)],
            None,
        );
        assert_eq!(failed.failed_sheets(), vec!["NOT INCLUDED"]);
        assert!(failed.summary().contains("NOT INCLUDED"));
    }

    #[test]
    fn test_report_serializes() {
        let ok = report(&[("CREATED", SheetStatus::Succeeded)], Some("out.xlsx"));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["sheets"][0]["status"], "succeeded");
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn test_missing_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ReconPipeline::new(RunLayout::new(dir.path()));
        let err = pipeline.run().await.unwrap_err();
        assert!(err.is_fatal_to_run());
    }
}
