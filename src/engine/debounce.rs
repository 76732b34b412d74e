//! ### English
//! Debounced, coalesced resize requests (latest-wins, applied after a quiet period).
//!
//! Interactive window dragging can request a new presentation size every frame; recreating GPU
//! resources that often would stall presentation, so only a size that stayed unchanged for the
//! configured delay is handed out.
//!
//! ### 中文
//! 防抖的合并 resize 请求（latest-wins，静默期后才生效）。
//!
//! 交互式拖动窗口可能每帧都请求新的呈现尺寸；如此频繁地重建 GPU 资源会卡住呈现，
//! 因此只有在配置的延迟内保持不变的尺寸才会被交出。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dpi::PhysicalSize;

/// ### English
/// `dirty_at` value meaning "no pending request".
///
/// ### 中文
/// `dirty_at` 取该值表示“没有待处理请求”。
const CLEAN: u64 = 0;

/// ### English
/// `dirty_at` value meaning "apply on the next poll regardless of the delay".
///
/// ### 中文
/// `dirty_at` 取该值表示“下一次轮询立即生效，忽略延迟”。
const IMMEDIATE: u64 = u64::MAX;

#[inline]
pub(crate) fn pack_size(size: PhysicalSize<u32>) -> u64 {
    ((size.width as u64) << 32) | size.height as u64
}

#[inline]
pub(crate) fn unpack_size(packed: u64) -> PhysicalSize<u32> {
    PhysicalSize::new((packed >> 32) as u32, packed as u32)
}

#[repr(C, align(64))]
/// ### English
/// Debounced resize state shared between the requesting thread and the applying thread.
///
/// ### 中文
/// 请求线程与应用线程之间共享的防抖 resize 状态。
pub struct DebouncedResize {
    /// ### English
    /// Time origin for `dirty_at`.
    ///
    /// ### 中文
    /// `dirty_at` 的时间基准。
    base: Instant,
    delay: Duration,
    packed_size: AtomicU64,
    /// ### English
    /// Microseconds since `base` (+1) of the latest request; `CLEAN` or `IMMEDIATE` otherwise.
    ///
    /// ### 中文
    /// 最近一次请求距 `base` 的微秒数（+1）；否则为 `CLEAN` 或 `IMMEDIATE`。
    dirty_at: AtomicU64,
}

impl DebouncedResize {
    pub fn new(delay: Duration) -> Self {
        Self {
            base: Instant::now(),
            delay,
            packed_size: AtomicU64::new(0),
            dirty_at: AtomicU64::new(CLEAN),
        }
    }

    #[inline]
    fn stamp(&self, now: Instant) -> u64 {
        let micros = now.saturating_duration_since(self.base).as_micros();
        (micros.min((IMMEDIATE - 2) as u128) as u64) + 1
    }

    /// ### English
    /// Records `size` as the latest request and restarts the quiet period.
    ///
    /// #### Parameters
    /// - `size`: Requested size.
    /// - `now`: Request time.
    ///
    /// ### 中文
    /// 记录 `size` 为最新请求，并重新开始静默期。
    ///
    /// #### 参数
    /// - `size`：请求的尺寸。
    /// - `now`：请求时间。
    pub fn request(&self, size: PhysicalSize<u32>, now: Instant) {
        self.packed_size.store(pack_size(size), Ordering::Release);
        self.dirty_at.store(self.stamp(now), Ordering::Release);
    }

    /// ### English
    /// Records `size` and makes it available on the next poll without waiting.
    ///
    /// ### 中文
    /// 记录 `size`，并使其在下一次轮询时立即可取，无需等待。
    pub fn request_immediate(&self, size: PhysicalSize<u32>) {
        self.packed_size.store(pack_size(size), Ordering::Release);
        self.dirty_at.store(IMMEDIATE, Ordering::Release);
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.dirty_at.load(Ordering::Acquire) != CLEAN
    }

    /// ### English
    /// Takes the pending size once it has been stable for the configured delay.
    ///
    /// A request racing with this call is never lost: it stays pending for the next poll.
    ///
    /// ### 中文
    /// 当待处理尺寸保持稳定达到配置延迟后将其取出。
    ///
    /// 与本调用竞争的新请求不会丢失：它会保留到下一次轮询。
    pub fn take_ready(&self, now: Instant) -> Option<PhysicalSize<u32>> {
        let dirty_at = self.dirty_at.load(Ordering::Acquire);
        if dirty_at == CLEAN {
            return None;
        }
        if dirty_at != IMMEDIATE {
            let requested = self.base + Duration::from_micros(dirty_at - 1);
            if now.saturating_duration_since(requested) < self.delay {
                return None;
            }
        }

        let size = unpack_size(self.packed_size.load(Ordering::Acquire));
        self.dirty_at
            .compare_exchange(dirty_at, CLEAN, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(600);

    #[test]
    fn applies_only_after_quiet_period() {
        let resize = DebouncedResize::new(DELAY);
        let t0 = Instant::now();
        resize.request(PhysicalSize::new(800, 600), t0);
        assert_eq!(resize.take_ready(t0 + Duration::from_millis(100)), None);
        assert_eq!(
            resize.take_ready(t0 + DELAY),
            Some(PhysicalSize::new(800, 600))
        );
        assert!(!resize.is_pending());
        assert_eq!(resize.take_ready(t0 + DELAY * 2), None);
    }

    #[test]
    fn new_requests_restart_the_timer_and_win() {
        let resize = DebouncedResize::new(DELAY);
        let t0 = Instant::now();
        resize.request(PhysicalSize::new(640, 480), t0);
        resize.request(PhysicalSize::new(1024, 768), t0 + Duration::from_millis(500));
        assert_eq!(resize.take_ready(t0 + Duration::from_millis(700)), None);
        assert_eq!(
            resize.take_ready(t0 + Duration::from_millis(1100)),
            Some(PhysicalSize::new(1024, 768))
        );
    }

    #[test]
    fn immediate_requests_skip_the_delay() {
        let resize = DebouncedResize::new(DELAY);
        resize.request_immediate(PhysicalSize::new(320, 240));
        assert_eq!(
            resize.take_ready(Instant::now()),
            Some(PhysicalSize::new(320, 240))
        );
    }

    #[test]
    fn size_packing_is_lossless() {
        let size = PhysicalSize::new(u32::MAX, 7);
        assert_eq!(unpack_size(pack_size(size)), size);
    }
}
