// ==========================================
// 多源表格对账合并引擎 - 工作池
// ==========================================
// 职责: 有界并发执行阻塞任务（文件读取 + 合并）
// 实现: Semaphore 许可 + spawn_blocking
// 生命周期: 每次运行构造一个，显式传递，运行结束时关闭
// ==========================================

use crate::error::MergeError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        debug!(size, "工作池创建");
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 提交阻塞任务
    ///
    /// 任务在持有许可期间运行于阻塞线程；池已关闭 → PoolClosed，
    /// 任务 panic → TaskPanicked
    pub fn spawn<F, T>(&self, label: impl Into<String>, task: F) -> JoinHandle<Result<T, MergeError>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let label = label.into();
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| MergeError::PoolClosed)?;
            tokio::task::spawn_blocking(task)
                .await
                .map_err(|e| panicked(&label, e))
        })
    }

    /// 关闭工作池，之后提交的任务均以 PoolClosed 失败
    pub fn shutdown(&self) {
        self.semaphore.close();
        debug!("工作池关闭");
    }

    pub fn is_shutdown(&self) -> bool {
        self.semaphore.is_closed()
    }
}

/// 展平 JoinHandle 的结果
pub fn flatten_join<T>(
    label: &str,
    joined: Result<Result<T, MergeError>, JoinError>,
) -> Result<T, MergeError> {
    joined.map_err(|e| panicked(label, e))?
}

fn panicked(label: &str, err: JoinError) -> MergeError {
    MergeError::TaskPanicked {
        file: label.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.spawn(format!("task-{i}"), move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        let mut total = 0;
        for handle in handles {
            total += flatten_join("task", handle.await).unwrap();
        }

        assert_eq!(total, (0..8).sum::<i32>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_tasks() {
        let pool = WorkerPool::new(1);
        pool.shutdown();
        assert!(pool.is_shutdown());

        let result = flatten_join("late", pool.spawn("late", || 1).await);
        assert!(matches!(result, Err(MergeError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let pool = WorkerPool::new(1);
        let result = flatten_join(
            "boom.xlsx",
            pool.spawn("boom.xlsx", || -> i32 { panic!("boom") }).await,
        );
        assert!(matches!(
            result,
            Err(MergeError::TaskPanicked { file, .. }) if file == "boom.xlsx"
        ));
    }
}
