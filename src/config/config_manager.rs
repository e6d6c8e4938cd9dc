// ==========================================
// 多源表格对账合并引擎 - 配置管理器
// ==========================================
// 职责: 加载 conf/ 下的工作表配置、映射表与引擎参数
// 存储: 行式 DSL 文本文件（见 mapping_parser）
// ==========================================

use crate::config::layout::{config_files, RunLayout};
use crate::config::mapping_parser::MappingParser;
use crate::domain::rule::{FixedMapping, MappingTable};
use crate::domain::source::{SheetRequirement, SourceCategory};
use crate::error::ConfigError;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // ===== sheet_config.txt =====
    pub const REQUIRED_SHEET: &str = "required_sheet";
    pub const KEY_FIELDS: &str = "key_fields";
    pub const REQUIRED_FIELDS: &str = "required_fields";
    pub const DEFAULT_SHEET: &str = "default_sheet";
    pub const DOCUMENT_KEY: &str = "document_key";

    // ===== engine_config.txt =====
    pub const WORKER_COUNT: &str = "worker_count";
    pub const CATEGORY_WAIT_SECS: &str = "category_wait_secs";
    pub const EMPTY_ROW_LIMIT: &str = "empty_row_limit";
    pub const SAVE_MAX_ATTEMPTS: &str = "save_max_attempts";
    pub const SAVE_RETRY_INTERVAL_SECS: &str = "save_retry_interval_secs";
    pub const COLUMN_WIDTH: &str = "column_width";
}

// ==========================================
// EngineSettings - 引擎参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSettings {
    /// 工作池并发上限
    pub worker_count: usize,
    /// 单个类别等待超时（仅记录日志，不取消）
    pub category_wait: Duration,
    /// 连续空行上限
    pub empty_row_limit: usize,
    pub save_max_attempts: u32,
    pub save_retry_interval: Duration,
    pub column_width: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_count: 16,
            category_wait: Duration::from_secs(60),
            empty_row_limit: 1000,
            save_max_attempts: 5,
            save_retry_interval: Duration::from_secs(5),
            column_width: 40.0,
        }
    }
}

impl EngineSettings {
    /// 从键值对覆写默认值；未知键仅告警
    pub fn from_fixed(values: &FixedMapping) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        for (key, raw) in values.iter() {
            match key {
                config_keys::WORKER_COUNT => {
                    settings.worker_count = parse_value(key, raw)?;
                    if settings.worker_count == 0 {
                        return Err(invalid(key, raw, "并发数必须大于 0"));
                    }
                }
                config_keys::CATEGORY_WAIT_SECS => {
                    settings.category_wait = Duration::from_secs(parse_value(key, raw)?);
                }
                config_keys::EMPTY_ROW_LIMIT => {
                    settings.empty_row_limit = parse_value(key, raw)?;
                    if settings.empty_row_limit == 0 {
                        return Err(invalid(key, raw, "空行上限必须大于 0"));
                    }
                }
                config_keys::SAVE_MAX_ATTEMPTS => {
                    settings.save_max_attempts = parse_value(key, raw)?;
                    if settings.save_max_attempts == 0 {
                        return Err(invalid(key, raw, "保存尝试次数必须大于 0"));
                    }
                }
                config_keys::SAVE_RETRY_INTERVAL_SECS => {
                    settings.save_retry_interval = Duration::from_secs(parse_value(key, raw)?);
                }
                config_keys::COLUMN_WIDTH => {
                    settings.column_width = parse_value(key, raw)?;
                    if !(settings.column_width > 0.0) {
                        return Err(invalid(key, raw, "列宽必须为正数"));
                    }
                }
                unknown => warn!(key = unknown, "忽略未知引擎参数"),
            }
        }

        Ok(settings)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| invalid(key, raw, &e.to_string()))
}

fn invalid(key: &str, raw: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        message: message.to_string(),
    }
}

/// 逗号列表 → 去空白、去空项
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ==========================================
// ReconConfig - 一次运行的全部配置
// ==========================================
#[derive(Debug, Clone)]
pub struct ReconConfig {
    pub requirements: Vec<SheetRequirement>,
    pub fixed: FixedMapping,
    pub baseline: MappingTable,
    pub response: MappingTable,
    pub report: MappingTable,
    /// 定向扫描规则（单据）
    pub document: Option<MappingTable>,
    /// 外部补充数据（邮件）的列映射
    pub supplement: Option<MappingTable>,
    /// 单据扫描结果按哪个关键字段匹配
    pub document_key: Option<String>,
    pub settings: EngineSettings,
}

impl ReconConfig {
    /// 从 conf/ 目录加载
    ///
    /// 必需: sheet_config / fixed_mapping / baseline_mapping / response_mapping
    /// 可选: report_mapping / document_mapping / email_mapping / engine_config
    pub fn load(layout: &RunLayout) -> Result<Self, ConfigError> {
        let parser = MappingParser::default();

        let sheet_config = parser.load_fixed(&layout.conf_file(config_files::SHEET_CONFIG))?;
        let (requirements, document_key) = parse_sheet_config(&sheet_config)?;

        let fixed = parser.load_fixed(&layout.conf_file(config_files::FIXED_MAPPING))?;
        let baseline = parser.load_table(&layout.conf_file(config_files::BASELINE_MAPPING))?;
        let response = parser.load_table(&layout.conf_file(config_files::RESPONSE_MAPPING))?;
        let report = parser
            .load_table_optional(&layout.conf_file(config_files::REPORT_MAPPING))?
            .unwrap_or_default();
        let document =
            parser.load_table_optional(&layout.conf_file(config_files::DOCUMENT_MAPPING))?;
        let supplement =
            parser.load_table_optional(&layout.conf_file(config_files::EMAIL_MAPPING))?;

        let engine_path = layout.conf_file(config_files::ENGINE_CONFIG);
        let settings = if engine_path.exists() {
            EngineSettings::from_fixed(&parser.load_fixed(&engine_path)?)?
        } else {
            EngineSettings::default()
        };

        info!(
            sheets = requirements.len(),
            baseline_rules = baseline.len(),
            response_rules = response.len(),
            report_rules = report.len(),
            worker_count = settings.worker_count,
            "配置加载完成"
        );

        Ok(Self {
            requirements,
            fixed,
            baseline,
            response,
            report,
            document,
            supplement,
            document_key,
            settings,
        })
    }

    /// 类别对应的映射表: report 用报告表，其余用回复表
    pub fn table_for(&self, category: SourceCategory) -> &MappingTable {
        match category {
            SourceCategory::Baseline => &self.baseline,
            SourceCategory::Report => &self.report,
            SourceCategory::Response | SourceCategory::Other => &self.response,
        }
    }
}

/// 解析 sheet_config 的键值
pub fn parse_sheet_config(
    values: &FixedMapping,
) -> Result<(Vec<SheetRequirement>, Option<String>), ConfigError> {
    let lookup = |key: &str| values.iter().find(|(k, _)| *k == key).map(|(_, v)| v);

    let sheets = lookup(config_keys::REQUIRED_SHEET)
        .map(split_list)
        .filter(|list| !list.is_empty())
        .ok_or_else(|| ConfigError::MissingKey(config_keys::REQUIRED_SHEET.to_string()))?;
    let key_fields = lookup(config_keys::KEY_FIELDS)
        .map(split_list)
        .filter(|list| !list.is_empty())
        .ok_or_else(|| ConfigError::MissingKey(config_keys::KEY_FIELDS.to_string()))?;
    let required_fields = lookup(config_keys::REQUIRED_FIELDS)
        .map(split_list)
        .unwrap_or_default();
    let fallback_sheets = lookup(config_keys::DEFAULT_SHEET)
        .map(split_list)
        .unwrap_or_default();
    let document_key = lookup(config_keys::DOCUMENT_KEY)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if let Some(doc_key) = &document_key {
        if !key_fields.contains(doc_key) {
            return Err(ConfigError::InvalidValue {
                key: config_keys::DOCUMENT_KEY.to_string(),
                value: doc_key.clone(),
                message: "必须属于 key_fields".to_string(),
            });
        }
    }

    let requirements = sheets
        .into_iter()
        .map(|sheet_name| SheetRequirement {
            sheet_name,
            key_fields: key_fields.clone(),
            required_fields: required_fields.clone(),
            fallback_sheets: fallback_sheets.clone(),
        })
        .collect();

    Ok((requirements, document_key))
}
