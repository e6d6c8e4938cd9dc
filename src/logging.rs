// ==========================================
// 日志系统初始化
// ==========================================
// 使用 tracing 和 tracing-subscriber
// - 控制台: 人类可读格式，级别由 RUST_LOG 控制
// - 文件: logs/debug_<时间戳>.log，JSON 行格式，固定 debug 级别
// ==========================================

use anyhow::Context;
use chrono::Local;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::layout::TIMESTAMP_FORMAT;

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 控制台日志级别过滤器（默认: info）
///   例如: RUST_LOG=debug 或 RUST_LOG=sheet_recon=trace
///
/// # 返回
/// 本次运行的日志文件路径
///
/// # 示例
/// ```no_run
/// use sheet_recon::logging;
/// let log_file = logging::init(std::path::Path::new("logs"), false).unwrap();
/// ```
pub fn init(log_dir: &Path, verbose: bool) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("无法创建日志目录: {}", log_dir.display()))?;
    let log_file = log_dir.join(format!("debug_{}.log", Local::now().format(TIMESTAMP_FORMAT)));
    let file = File::create(&log_file)
        .with_context(|| format!("无法创建日志文件: {}", log_file.display()))?;

    let default_level = if verbose { "debug" } else { "info" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .json()
        .with_writer(Mutex::new(file))
        .with_thread_ids(true)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("日志系统已初始化")?;

    Ok(log_file)
}

/// 初始化测试环境的日志系统
///
/// 使用更详细的日志级别，便于调试
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
