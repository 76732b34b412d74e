use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// ### English
/// Number of spare nodes kept for reuse.
///
/// Two spares cover the steady state: one node sits in the slot while the consumer returns
/// the previous one, and a burst of overwrites recycles the displaced node.
///
/// ### 中文
/// 保留复用的空闲节点数量。
///
/// 两个空闲节点足以覆盖稳态：一个节点在槽位中，消费者归还上一个节点，
/// 连续覆盖时被替换下来的节点也会被回收。
const SPARE_NODES: usize = 2;

/// ### English
/// Latest-wins single-value slot for `Copy` payloads.
///
/// - Writers publish with an atomic swap; an unconsumed value is overwritten, never queued.
/// - The reader takes the value out and hands the node back to a small spare cache, so the
///   steady state performs no allocation.
/// - Peak memory is bounded to `1 + SPARE_NODES` nodes per slot.
///
/// ### 中文
/// 面向 `Copy` 负载的“只保留最新值（latest-wins）”单值槽。
///
/// - 写端通过原子 swap 发布；未被消费的旧值会被覆盖，而不是排队。
/// - 读端取出值后把节点归还到小型空闲缓存，稳态下不发生分配。
/// - 每个槽的峰值内存上限为 `1 + SPARE_NODES` 个节点。
pub(crate) struct LatestSlot<T: Copy> {
    current: AtomicPtr<T>,
    spare: [AtomicPtr<T>; SPARE_NODES],
}

unsafe impl<T: Copy + Send> Send for LatestSlot<T> {}
unsafe impl<T: Copy + Send> Sync for LatestSlot<T> {}

impl<T: Copy> Default for LatestSlot<T> {
    fn default() -> Self {
        Self {
            current: AtomicPtr::new(ptr::null_mut()),
            spare: [
                AtomicPtr::new(ptr::null_mut()),
                AtomicPtr::new(ptr::null_mut()),
            ],
        }
    }
}

impl<T: Copy> LatestSlot<T> {
    #[inline]
    pub(crate) fn is_pending(&self) -> bool {
        !self.current.load(Ordering::Acquire).is_null()
    }

    /// ### English
    /// Publishes `value`, replacing any unconsumed one.
    ///
    /// Returns true if an older value was overwritten.
    ///
    /// ### 中文
    /// 发布 `value`，替换任何尚未消费的旧值。
    ///
    /// 若覆盖了旧值则返回 true。
    #[inline]
    pub(crate) fn publish(&self, value: T) -> bool {
        let node = match self.pop_spare() {
            Some(ptr) => {
                unsafe { ptr.write(value) };
                ptr
            }
            None => Box::into_raw(Box::new(value)),
        };

        let old = self.current.swap(node, Ordering::AcqRel);
        if old.is_null() {
            false
        } else {
            self.push_spare(old);
            true
        }
    }

    /// ### English
    /// Takes the latest value, leaving the slot empty.
    ///
    /// ### 中文
    /// 取出最新值，并将槽位置空。
    #[inline]
    pub(crate) fn take(&self) -> Option<T> {
        let ptr = self.current.swap(ptr::null_mut(), Ordering::AcqRel);
        if ptr.is_null() {
            return None;
        }
        let value = unsafe { ptr.read() };
        self.push_spare(ptr);
        Some(value)
    }

    #[inline]
    fn pop_spare(&self) -> Option<*mut T> {
        self.spare.iter().find_map(|cell| {
            let ptr = cell.swap(ptr::null_mut(), Ordering::AcqRel);
            (!ptr.is_null()).then_some(ptr)
        })
    }

    #[inline]
    fn push_spare(&self, node: *mut T) {
        for cell in &self.spare {
            if cell
                .compare_exchange(ptr::null_mut(), node, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
        unsafe { drop(Box::from_raw(node)) };
    }
}

impl<T: Copy> Drop for LatestSlot<T> {
    fn drop(&mut self) {
        let current = self.current.swap(ptr::null_mut(), Ordering::AcqRel);
        if !current.is_null() {
            unsafe { drop(Box::from_raw(current)) };
        }
        for cell in &self.spare {
            let ptr = cell.swap(ptr::null_mut(), Ordering::AcqRel);
            if !ptr.is_null() {
                unsafe { drop(Box::from_raw(ptr)) };
            }
        }
    }
}
