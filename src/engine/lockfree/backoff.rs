//! ### English
//! Minimal spin-then-yield backoff helper for lock-free hot paths.
//!
//! - Spin briefly to cover short producer/consumer gaps.
//! - Yield after the spin budget to avoid burning CPU on oversubscribed systems.
//! - Report completion once the yield budget is spent so callers can park instead.
//!
//! ### 中文
//! 为无锁热路径提供的“短自旋 + 让出调度”退避工具。
//!
//! - 先短暂自旋，用于覆盖生产者/消费者之间的短间隙；
//! - 超过自旋预算后调用 `yield`，避免在 CPU 过载时空转占满；
//! - 让出预算耗尽后报告完成，调用方可转为 park。

use std::thread;

/// ### English
/// Spin budget before switching to `yield_now()`.
///
/// ### 中文
/// 在切换到 `yield_now()` 之前允许的自旋次数预算。
const SPIN_LIMIT: u32 = 64;

/// ### English
/// Total step budget (spins + yields) before `is_completed` reports true.
///
/// ### 中文
/// `is_completed` 返回 true 之前的总步数预算（自旋 + 让出）。
const YIELD_LIMIT: u32 = SPIN_LIMIT + 16;

/// ### English
/// Spin-then-yield backoff state.
///
/// ### 中文
/// “短自旋 + 让出调度”的退避状态。
pub(crate) struct Backoff {
    spins: u32,
}

impl Backoff {
    #[inline]
    pub(crate) fn new() -> Self {
        Self { spins: 0 }
    }

    /// ### English
    /// Performs one backoff step.
    ///
    /// ### 中文
    /// 执行一次退避步骤。
    #[inline]
    pub(crate) fn snooze(&mut self) {
        if self.spins < SPIN_LIMIT {
            std::hint::spin_loop();
        } else {
            thread::yield_now();
        }
        self.spins = self.spins.saturating_add(1);
    }

    /// ### English
    /// Returns true once spinning is no longer worthwhile and the caller should block.
    ///
    /// ### 中文
    /// 当继续自旋不再划算、调用方应当阻塞时返回 true。
    #[inline]
    pub(crate) fn is_completed(&self) -> bool {
        self.spins >= YIELD_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_after_budget() {
        let mut backoff = Backoff::new();
        let mut steps = 0;
        while !backoff.is_completed() {
            backoff.snooze();
            steps += 1;
        }
        assert_eq!(steps, YIELD_LIMIT);
    }
}
