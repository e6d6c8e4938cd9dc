// ==========================================
// 多源表格对账合并引擎 - 运行目录布局
// ==========================================
// 职责: 根目录下各输入/输出/配置路径的集中定义
// ==========================================

use crate::domain::source::SourceCategory;
use crate::error::ResourceError;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// 配置文件名
pub mod config_files {
    pub const SHEET_CONFIG: &str = "sheet_config.txt";
    pub const FIXED_MAPPING: &str = "fixed_mapping.txt";
    pub const BASELINE_MAPPING: &str = "baseline_mapping.txt";
    pub const RESPONSE_MAPPING: &str = "response_mapping.txt";
    pub const REPORT_MAPPING: &str = "report_mapping.txt";
    pub const DOCUMENT_MAPPING: &str = "document_mapping.txt";
    pub const EMAIL_MAPPING: &str = "email_mapping.txt";
    pub const ENGINE_CONFIG: &str = "engine_config.txt";

    /// 可通过接口读写的全部配置文件
    pub const ALL: [&str; 8] = [
        SHEET_CONFIG,
        FIXED_MAPPING,
        BASELINE_MAPPING,
        RESPONSE_MAPPING,
        REPORT_MAPPING,
        DOCUMENT_MAPPING,
        EMAIL_MAPPING,
        ENGINE_CONFIG,
    ];
}

/// 输出/日志文件名使用的时间戳格式
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ==========================================
// RunLayout - 一次运行的目录布局
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub root: PathBuf,
    pub conf_dir: PathBuf,
    pub baseline_dir: PathBuf,
    pub response_dir: PathBuf,
    pub report_dir: PathBuf,
    /// 其他来源（按回复表映射）
    pub other_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub template_file: PathBuf,
    pub target_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl RunLayout {
    /// 以默认子目录名构建布局
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            conf_dir: root.join("conf"),
            baseline_dir: root.join("baseline"),
            response_dir: root.join("response"),
            report_dir: root.join("report"),
            other_dir: root.join("other"),
            documents_dir: root.join("documents"),
            template_file: root.join("template.xlsx"),
            target_dir: root.join("target"),
            logs_dir: root.join("logs"),
            root,
        }
    }

    pub fn conf_file(&self, name: &str) -> PathBuf {
        self.conf_dir.join(name)
    }

    /// 参与合并的输入目录及其类别（基准在前）
    pub fn input_dirs(&self) -> [(&Path, SourceCategory); 4] {
        [
            (self.baseline_dir.as_path(), SourceCategory::Baseline),
            (self.response_dir.as_path(), SourceCategory::Response),
            (self.report_dir.as_path(), SourceCategory::Report),
            (self.other_dir.as_path(), SourceCategory::Other),
        ]
    }

    /// 创建缺失的输入/输出目录
    pub fn ensure_directories(&self) -> Result<(), ResourceError> {
        let dirs = [
            &self.baseline_dir,
            &self.response_dir,
            &self.report_dir,
            &self.target_dir,
            &self.logs_dir,
        ];
        for dir in dirs {
            std::fs::create_dir_all(dir).map_err(|source| ResourceError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// target/output_<ts>.xlsx
    pub fn output_file(&self, at: DateTime<Local>) -> PathBuf {
        self.target_dir
            .join(format!("output_{}.xlsx", at.format(TIMESTAMP_FORMAT)))
    }

    /// 与输出文件同名的运行报告
    pub fn report_file_for(output: &Path) -> PathBuf {
        output.with_extension("report.json")
    }
}
