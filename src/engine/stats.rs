//! ### English
//! Per-bridge counters.
//!
//! ### 中文
//! 帧桥级别的计数器。

use std::sync::atomic::{AtomicU64, Ordering};

/// ### English
/// Snapshot of the bridge counters.
///
/// ### 中文
/// 帧桥计数器快照。
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub frames_posted: u64,
    pub frames_committed: u64,
    pub frames_skipped: u64,
    pub notifications: u64,
    /// ### English
    /// Present worker threads that have not exited yet (including detached ones).
    ///
    /// ### 中文
    /// 尚未退出的呈现 worker 线程数量（包括已分离的线程）。
    pub active_workers: u64,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    frames_posted: AtomicU64,
    frames_committed: AtomicU64,
    frames_skipped: AtomicU64,
    notifications: AtomicU64,
    active_workers: AtomicU64,
}

/// ### English
/// Counts a worker thread as active for as long as it is alive, including on unwind.
///
/// ### 中文
/// 在 worker 线程存活期间（包括 unwind 时）将其计为活动线程。
pub(crate) struct WorkerLiveness<'a>(&'a StatsCounters);

impl Drop for WorkerLiveness<'_> {
    fn drop(&mut self) {
        self.0.active_workers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl StatsCounters {
    #[inline]
    pub(crate) fn posted(&self) {
        self.frames_posted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn committed(&self) {
        self.frames_committed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn notified(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_alive(&self) -> WorkerLiveness<'_> {
        self.active_workers.fetch_add(1, Ordering::AcqRel);
        WorkerLiveness(self)
    }

    pub(crate) fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            frames_posted: self.frames_posted.load(Ordering::Relaxed),
            frames_committed: self.frames_committed.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Acquire),
        }
    }
}
