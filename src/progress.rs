// ==========================================
// 多源表格对账合并引擎 - 进度上报
// ==========================================
// 职责: 合并过程的进度接口与实现
// 实现:
// - ProgressTracker: 原子计数，可轮询快照（供界面/接口查询）
// - TerminalProgress: indicatif 终端进度条
// - NoopProgress: 不上报
// ==========================================

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

pub trait ProgressSink: Send + Sync {
    fn init(&self, total: u64, description: &str);

    fn advance(&self);

    fn close(&self);
}

// ==========================================
// NoopProgress
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn init(&self, _total: u64, _description: &str) {}

    fn advance(&self) {}

    fn close(&self) {}
}

// ==========================================
// ProgressTracker - 可轮询的进度
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub description: String,
    pub current: u64,
    pub total: u64,
    pub running: bool,
}

impl ProgressSnapshot {
    /// 完成百分比（0-100）
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.current.min(self.total) * 100) / self.total) as u8
    }
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    description: Mutex<String>,
    current: AtomicU64,
    total: AtomicU64,
    running: AtomicBool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let description = self
            .description
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default();
        ProgressSnapshot {
            description,
            current: self.current.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
        }
    }
}

impl ProgressSink for ProgressTracker {
    fn init(&self, total: u64, description: &str) {
        if let Ok(mut d) = self.description.lock() {
            *d = description.to_string();
        }
        self.total.store(total, Ordering::Relaxed);
        self.current.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
    }

    fn advance(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    fn close(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

// ==========================================
// TerminalProgress - 终端进度条
// ==========================================
#[derive(Debug, Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for TerminalProgress {
    fn init(&self, total: u64, description: &str) {
        let bar = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message(description.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn advance(&self) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.inc(1);
            }
        }
    }

    fn close(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish();
            }
        }
    }
}
