// ==========================================
// 多源表格对账合并引擎 - 命令行入口
// ==========================================
// 用法: sheet-recon --root <工作目录> [--verbose]
// 退出码: 0 成功 / 1 失败
// ==========================================

use anyhow::Context;
use clap::Parser;
use sheet_recon::{ProgressSink, ReconPipeline, RunLayout, TerminalProgress};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sheet-recon", version, about = "多源表格对账合并引擎")]
struct Cli {
    /// 工作目录（包含 conf/ baseline/ response/ report/ 等子目录）
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// 输出调试级别日志
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let layout = RunLayout::new(&cli.root);

    let log_file = sheet_recon::logging::init(&layout.logs_dir, cli.verbose)?;

    tracing::info!("==================================================");
    tracing::info!("{}", sheet_recon::APP_NAME);
    tracing::info!("系统版本: {}", sheet_recon::VERSION);
    tracing::info!("工作目录: {}", layout.root.display());
    tracing::info!("日志文件: {}", log_file.display());
    tracing::info!("==================================================");

    let progress: Arc<dyn ProgressSink> = Arc::new(TerminalProgress::new());
    let report = ReconPipeline::new(layout)
        .with_progress(progress)
        .run()
        .await
        .context("运行失败")?;

    println!("{}", report.summary());
    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
