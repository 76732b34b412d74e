//! ### English
//! Coalescing single-slot mailbox between the producer callback and the present worker.
//!
//! ### 中文
//! 生产者回调与呈现 worker 之间的合并式单槽邮箱。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use dpi::PhysicalSize;

use super::lockfree::{Backoff, LatestSlot};

/// ### English
/// Metadata of one frame announced by the producer.
///
/// ### 中文
/// 生产者通告的一帧元数据。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFrame {
    /// ### English
    /// Producer-side buffer index passed back to `copy_frame`.
    ///
    /// ### 中文
    /// 生产者侧缓冲索引，会原样传回 `copy_frame`。
    pub buffer_index: u32,
    pub size: PhysicalSize<u32>,
    /// ### English
    /// Producer's own row pitch in bytes (informational).
    ///
    /// ### 中文
    /// 生产者自身的行跨度（字节，仅供参考）。
    pub pitch: u32,
}

impl PendingFrame {
    #[inline]
    pub fn new(buffer_index: u32, width: u32, height: u32, pitch: u32) -> Self {
        Self {
            buffer_index,
            size: PhysicalSize::new(width, height),
            pitch,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }
}

/// ### English
/// At-most-one-pending, latest-wins frame mailbox.
///
/// `post` never blocks and does not allocate in steady state. The consumer thread is woken at
/// most once per burst of posts: the `scheduled` flag stays set until the consumer re-arms it.
///
/// Single consumer: the first thread calling `take_latest` becomes the waiter.
///
/// ### 中文
/// 至多一个待处理帧、只保留最新值的帧邮箱。
///
/// `post` 从不阻塞，稳态下不分配。每一批连续的 post 最多唤醒消费者一次：
/// `scheduled` 标记会一直保持，直到消费者重新复位。
///
/// 单消费者：第一个调用 `take_latest` 的线程成为等待者。
pub struct Mailbox {
    slot: LatestSlot<PendingFrame>,
    scheduled: AtomicBool,
    stopped: AtomicBool,
    waiter: OnceLock<thread::Thread>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            slot: LatestSlot::default(),
            scheduled: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            waiter: OnceLock::new(),
        }
    }

    /// ### English
    /// Publishes `frame`, overwriting any unconsumed frame, and wakes the consumer if no wake
    /// is already scheduled.
    ///
    /// Returns false if the mailbox is stopped (the frame is dropped).
    ///
    /// ### 中文
    /// 发布 `frame`，覆盖任何未消费的帧；若尚未安排唤醒则唤醒消费者。
    ///
    /// 若邮箱已停止则返回 false（该帧被丢弃）。
    pub fn post(&self, frame: PendingFrame) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }

        self.slot.publish(frame);

        if !self.scheduled.swap(true, Ordering::SeqCst) {
            if let Some(waiter) = self.waiter.get() {
                waiter.unpark();
            }
        }
        true
    }

    /// ### English
    /// Takes the pending frame, blocking until one exists or the mailbox is stopped.
    ///
    /// Returns `None` only after `stop`.
    ///
    /// ### 中文
    /// 取出待处理帧；若没有则阻塞，直到有帧或邮箱被停止。
    ///
    /// 仅在 `stop` 之后返回 `None`。
    pub fn take_latest(&self) -> Option<PendingFrame> {
        self.waiter.get_or_init(thread::current);

        let mut backoff = Backoff::new();
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return None;
            }

            /*
            ### English
            Re-arm before looking: a post that lands after this store flips the flag again
            and unparks us, so no wake-up is lost between `take` and `park`.

            ### 中文
            先复位再查看：在此 store 之后到达的 post 会再次置位并 unpark，
            因此 `take` 与 `park` 之间不会丢失唤醒。
            */
            self.scheduled.store(false, Ordering::SeqCst);
            if let Some(frame) = self.slot.take() {
                return Some(frame);
            }

            if backoff.is_completed() {
                thread::park();
            } else {
                backoff.snooze();
            }
        }
    }

    /// ### English
    /// Non-blocking take.
    ///
    /// ### 中文
    /// 非阻塞取出。
    #[inline]
    pub fn try_take(&self) -> Option<PendingFrame> {
        self.slot.take()
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.slot.is_pending()
    }

    /// ### English
    /// Stops the mailbox: later posts are dropped and a blocked consumer returns `None`.
    ///
    /// ### 中文
    /// 停止邮箱：之后的 post 被丢弃，阻塞中的消费者返回 `None`。
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(waiter) = self.waiter.get() {
            waiter.unpark();
        }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(index: u32) -> PendingFrame {
        PendingFrame::new(index, 256, 240, 1024)
    }

    #[test]
    fn latest_post_wins() {
        let mailbox = Mailbox::new();
        assert!(mailbox.post(frame(1)));
        assert!(mailbox.post(frame(2)));
        assert!(mailbox.post(frame(3)));
        assert_eq!(mailbox.take_latest(), Some(frame(3)));
        assert_eq!(mailbox.try_take(), None);
    }

    #[test]
    fn stop_releases_blocked_consumer() {
        let mailbox = Arc::new(Mailbox::new());
        let consumer = {
            let mailbox = mailbox.clone();
            thread::spawn(move || mailbox.take_latest())
        };
        thread::sleep(Duration::from_millis(20));
        mailbox.stop();
        assert_eq!(consumer.join().ok().flatten(), None);
        assert!(!mailbox.post(frame(9)));
    }

    #[test]
    fn post_wakes_parked_consumer() {
        let mailbox = Arc::new(Mailbox::new());
        let consumer = {
            let mailbox = mailbox.clone();
            thread::spawn(move || mailbox.take_latest())
        };
        thread::sleep(Duration::from_millis(20));
        mailbox.post(frame(7));
        assert_eq!(consumer.join().ok().flatten(), Some(frame(7)));
    }

    #[test]
    fn concurrent_posts_never_lose_the_final_frame() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = {
            let mailbox = mailbox.clone();
            thread::spawn(move || {
                for index in 1..=10_000 {
                    mailbox.post(frame(index));
                }
            })
        };

        let mut last_seen = 0;
        loop {
            let Some(taken) = mailbox.take_latest() else {
                break;
            };
            assert!(taken.buffer_index > last_seen, "frames must be monotonic");
            last_seen = taken.buffer_index;
            if last_seen == 10_000 {
                break;
            }
        }
        producer.join().ok();
        assert_eq!(last_seen, 10_000);
    }

    proptest! {
        #[test]
        fn take_returns_nth_post(indices in proptest::collection::vec(any::<u32>(), 1..64)) {
            let mailbox = Mailbox::new();
            for &index in &indices {
                mailbox.post(frame(index));
            }
            let last = *indices.last().unwrap_or(&0);
            prop_assert_eq!(mailbox.take_latest(), Some(frame(last)));
            prop_assert!(!mailbox.has_pending());
        }
    }
}
