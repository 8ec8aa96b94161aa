//! 进程级互斥锁，串行化所有包管理器查询
//!
//! 包管理器命令行工具不支持并发调用。长时间运行的升级子进程本身不在锁内，
//! 否则整个升级期间所有查询都会被阻塞；升级期间的查询由 `is_running()` 快速失败。

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct BackendLock {
    inner: Mutex<()>,
}

impl BackendLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 持锁执行 `f`；返回（包括返回错误）时释放
    pub fn with<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.acquire();
        f()
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        // 锁不保护任何数据，忽略中毒
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn calls_never_overlap() {
        let lock = Arc::new(BackendLock::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (lock, active, max_seen) = (lock.clone(), active.clone(), max_seen.clone());
                std::thread::spawn(move || {
                    lock.with(|| {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn released_after_error_and_panic() {
        let lock = Arc::new(BackendLock::new());
        let res: Result<(), &str> = lock.with(|| Err("tool failed"));
        assert!(res.is_err());

        let l = lock.clone();
        let _ = std::thread::spawn(move || l.with(|| panic!("driver crashed"))).join();

        assert_eq!(lock.with(|| 42), 42);
    }
}
