// ==========================================
// 多源表格对账合并引擎 - 错误类型
// ==========================================
// 分类: 配置错误 / 校验错误 / 资源错误 / 合并错误
// 工具: thiserror 派生宏
// ==========================================
// 传播规则:
// - Config / Resource 出现在启动阶段 → 整次运行失败，不生成输出
// - Validation / Merge 出现在单表处理中 → 仅该工作表失败
// ==========================================

use std::path::PathBuf;
use thiserror::Error;

// ==========================================
// ConfigError - 配置错误
// ==========================================
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置行格式错误 ({file}:{line}): {message}")]
    MalformedLine {
        file: String,
        line: usize,
        message: String,
    },

    #[error("参数 {key} 的值 {value:?} 无法转换: {message}")]
    InvalidParameter {
        key: String,
        value: String,
        message: String,
    },

    #[error("缺少必需配置项: {0}")]
    MissingKey(String),

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[error("配置文件读取失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ==========================================
// ValidationError - 校验错误（映射/取值过程）
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("字段分割失败: {field}={value}，index={index} 超出范围 [1, {len}]")]
    IndexOutOfRange {
        field: String,
        value: String,
        index: i64,
        len: usize,
    },

    #[error("四舍五入失败: 字段 {field} 的值 {value:?} 不是有效数字")]
    NotNumeric { field: String, value: String },

    #[error("主键格式错误: 表头缺少关键字段 {field}")]
    MalformedKey { field: String },

    #[error("偏移超出工作表范围: 字段 {field} 读取 ({row}, {col})")]
    OutOfBounds {
        field: String,
        row: usize,
        col: usize,
    },
}

// ==========================================
// ResourceError - 资源错误（文件缺失/占用/损坏）
// ==========================================
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("文件不存在: {0}")]
    FileNotFound(PathBuf),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xlsm/.xls/.csv）")]
    UnsupportedFormat(PathBuf),

    #[error("文件损坏无法打开 ({path}): {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("文件访问失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("未找到基准文件: {0}")]
    NoBaseline(PathBuf),

    #[error("模板文件缺少工作表: {0}")]
    TemplateSheetMissing(String),

    #[error("文件保存失败 ({path}): {message}")]
    SaveFailed { path: PathBuf, message: String },
}

// ==========================================
// MergeError - 合并错误
// ==========================================
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("工作表 [{sheet}] 在基准文件中无法解析（无同名表且无有效回退表）")]
    SheetUnresolvable { sheet: String },

    #[error("合并任务异常退出 ({file}): {message}")]
    TaskPanicked { file: String, message: String },

    #[error("线程池已关闭")]
    PoolClosed,

    #[error("行锁已损坏: {0}")]
    LockPoisoned(String),

    #[error("补充数据的关键字段 {0} 不在 key_fields 中")]
    UnknownSupplementKey(String),
}

// ==========================================
// ReconError - 统一错误类型
// ==========================================
#[derive(Error, Debug)]
pub enum ReconError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),

    #[error("资源错误: {0}")]
    Resource(#[from] ResourceError),

    #[error("合并错误: {0}")]
    Merge(#[from] MergeError),
}

impl ReconError {
    /// 是否为启动阶段的致命错误（整次运行失败）
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, ReconError::Config(_) | ReconError::Resource(_))
    }
}

/// Result 类型别名
pub type ReconResult<T> = Result<T, ReconError>;
