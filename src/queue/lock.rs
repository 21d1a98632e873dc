//! Advisory per-queue lock built on atomic directory creation.
//!
//! `create_dir` either creates the marker or fails with `AlreadyExists`, on
//! every platform and across processes, which makes it a usable mutex for
//! the durable backend.
//!
//! # Liveness
//!
//! The lock has no lease, owner identity or expiry. A process that dies
//! while holding it leaves the marker behind, and every later acquire on
//! that queue waits forever until the marker is removed by hand.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::metrics::QueueMetrics;

/// Default sleep between acquisition attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// A named, non-reentrant lock backed by a marker directory.
#[derive(Debug, Clone)]
pub struct DirLock {
    path: PathBuf,
    retry_interval: Duration,
}

impl DirLock {
    pub fn new(path: impl Into<PathBuf>, retry_interval: Duration) -> Self {
        Self {
            path: path.into(),
            retry_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the marker can be created.
    ///
    /// Retries every `retry_interval` for as long as the marker exists.
    /// Dropping the returned future abandons the attempt without holding
    /// anything.
    ///
    /// # Errors
    ///
    /// Any I/O error other than `AlreadyExists`, e.g. a missing parent
    /// directory or a permission failure.
    pub async fn acquire(&self) -> io::Result<LockGuard> {
        let started = Instant::now();
        let mut retries: u64 = 0;

        loop {
            match tokio::fs::create_dir(&self.path).await {
                Ok(()) => {
                    QueueMetrics::record_lock_wait(started.elapsed());
                    if retries > 0 {
                        tracing::debug!(
                            lock = %self.path.display(),
                            retries = retries,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "Acquired contended queue lock"
                        );
                    }
                    return Ok(LockGuard {
                        path: Some(self.path.clone()),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    retries += 1;
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Proof of holding a [`DirLock`]. Releases the lock when dropped.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    path: Option<PathBuf>,
}

impl LockGuard {
    /// Release explicitly, surfacing any error from removing the marker.
    pub fn release(mut self) -> io::Result<()> {
        match self.path.take() {
            Some(path) => std::fs::remove_dir(path),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_dir(&path) {
                tracing::warn!(
                    lock = %path.display(),
                    error = %e,
                    "Failed to release queue lock"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn test_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ara-lock-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = test_dir();
        let lock = DirLock::new(dir.join(".lock"), Duration::from_millis(5));

        let guard = lock.acquire().await.unwrap();
        assert!(lock.path().exists());

        guard.release().unwrap();
        assert!(!lock.path().exists());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let dir = test_dir();
        let lock = DirLock::new(dir.join(".lock"), Duration::from_millis(5));

        {
            let _guard = lock.acquire().await.unwrap();
            assert!(lock.path().exists());
        }
        assert!(!lock.path().exists());

        // Reacquirable after drop
        let guard = lock.acquire().await.unwrap();
        drop(guard);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_waits_for_holder() {
        let dir = test_dir();
        let lock = DirLock::new(dir.join(".lock"), Duration::from_millis(5));

        let guard = lock.acquire().await.unwrap();

        let contender = lock.clone();
        let handle = tokio::spawn(async move { contender.acquire().await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());

        drop(guard);
        let second = handle.await.unwrap().unwrap();
        drop(second);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_acquire_holds_nothing() {
        let dir = test_dir();
        let lock = DirLock::new(dir.join(".lock"), Duration::from_millis(5));

        let guard = lock.acquire().await.unwrap();
        let attempt = tokio::time::timeout(Duration::from_millis(20), lock.acquire()).await;
        assert!(attempt.is_err());

        drop(guard);
        assert!(!lock.path().exists());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mutual_exclusion() {
        let dir = test_dir();
        let lock = DirLock::new(dir.join(".lock"), Duration::from_millis(1));
        let inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let inside = inside.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let guard = lock.acquire().await.unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_parent_is_error() {
        let dir = test_dir();
        let lock = DirLock::new(dir.join("absent").join(".lock"), Duration::from_millis(5));

        let err = lock.acquire().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
