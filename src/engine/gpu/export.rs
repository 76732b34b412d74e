//! ### English
//! Compositor-facing view of the GPU shared surface.
//!
//! ### 中文
//! 面向合成器的 GPU 共享表面视图。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dpi::PhysicalSize;
use parking_lot::Mutex;

use super::device::{DeviceToken, ExportHandle};
use crate::engine::config::ChannelOrder;

const NO_FRAME: usize = usize::MAX;

/// ### English
/// Everything a consumer needs to open and sample one shared slot.
///
/// ### 中文
/// 消费者打开并采样一个共享槽位所需的全部信息。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuSurfaceDescriptor {
    pub handle: ExportHandle,
    pub slot: u32,
    /// ### English
    /// Size of the shared texture (presentation resolution).
    ///
    /// ### 中文
    /// 共享纹理尺寸（呈现分辨率）。
    pub size: PhysicalSize<u32>,
    /// ### English
    /// Producer resolution the content was scaled from.
    ///
    /// ### 中文
    /// 内容缩放前的生产者分辨率。
    pub source_size: PhysicalSize<u32>,
    pub order: ChannelOrder,
    pub token: DeviceToken,
}

#[derive(Default)]
struct ExportSlots {
    live: [Option<GpuSurfaceDescriptor>; 2],
    /// ### English
    /// Descriptors of a freshly created resource set, promoted on its first publish.
    ///
    /// ### 中文
    /// 新建资源集的描述符，在其首次发布时生效。
    staged: Option<[Option<GpuSurfaceDescriptor>; 2]>,
}

/// ### English
/// Published slot descriptors plus the read index.
///
/// The worker stages descriptors when a resource set is created and advances the read index on
/// every commit. The previous set stays readable until the new set's first commit (its
/// resources are retired, not destroyed). Pulls take a short lock and never wait for GPU work.
///
/// ### 中文
/// 已发布的槽位描述符以及读索引。
///
/// worker 在创建资源集时暂存描述符，并在每次提交时推进读索引。旧资源集在新资源集首次提交前仍可读取
/// （其资源只是退役而非销毁）。拉取方只持有很短的锁，从不等待 GPU 工作。
pub struct GpuExport {
    slots: Mutex<ExportSlots>,
    read_index: AtomicUsize,
    commits: AtomicU64,
}

impl Default for GpuExport {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuExport {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(ExportSlots::default()),
            read_index: AtomicUsize::new(NO_FRAME),
            commits: AtomicU64::new(0),
        }
    }

    /// ### English
    /// Stages descriptors of a freshly created resource set.
    ///
    /// ### 中文
    /// 暂存新建资源集的描述符。
    pub(crate) fn install(&self, descriptors: [Option<GpuSurfaceDescriptor>; 2]) {
        self.slots.lock().staged = Some(descriptors);
    }

    /// ### English
    /// Forgets every descriptor; used when the device (and thus every handle) is gone.
    ///
    /// ### 中文
    /// 清除所有描述符；用于设备（以及所有句柄）已失效时。
    pub(crate) fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.live = [None, None];
        slots.staged = None;
        self.read_index.store(NO_FRAME, Ordering::Release);
    }

    /// ### English
    /// Publishes `index` as the slot the consumer should read next.
    ///
    /// ### 中文
    /// 发布 `index` 为消费者下一次应读取的槽位。
    pub(crate) fn publish(&self, index: usize) {
        let mut slots = self.slots.lock();
        if let Some(staged) = slots.staged.take() {
            slots.live = staged;
        }
        self.read_index.store(index, Ordering::Release);
        drop(slots);
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    /// ### English
    /// Returns the most recently committed slot, if any.
    ///
    /// ### 中文
    /// 返回最近一次提交的槽位（若有）。
    pub fn current(&self) -> Option<GpuSurfaceDescriptor> {
        let slots = self.slots.lock();
        let index = self.read_index.load(Ordering::Acquire);
        slots.live.get(index).copied().flatten()
    }

    /// ### English
    /// Token of the device that owns the newest resource set (staged first, then live), or
    /// `None` after `clear`. Lets callers learn the device without locking the backend.
    ///
    /// ### 中文
    /// 拥有最新资源集的设备令牌（优先暂存集，其次生效集）；`clear` 之后为 `None`。
    /// 调用方无需锁住后端即可获知设备。
    pub fn device_token(&self) -> Option<DeviceToken> {
        let slots = self.slots.lock();
        slots
            .staged
            .iter()
            .chain(std::iter::once(&slots.live))
            .flatten()
            .flatten()
            .map(|descriptor| descriptor.token)
            .next()
    }

    #[inline]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(handle: u64, slot: u32) -> GpuSurfaceDescriptor {
        GpuSurfaceDescriptor {
            handle,
            slot,
            size: PhysicalSize::new(512, 480),
            source_size: PhysicalSize::new(256, 240),
            order: ChannelOrder::Rgba,
            token: DeviceToken::default(),
        }
    }

    #[test]
    fn nothing_readable_until_publish() {
        let export = GpuExport::new();
        export.install([Some(descriptor(1, 0)), Some(descriptor(2, 1))]);
        assert_eq!(export.current(), None);
        export.publish(1);
        assert_eq!(export.current(), Some(descriptor(2, 1)));
        assert_eq!(export.commit_count(), 1);
    }

    #[test]
    fn previous_set_stays_readable_until_first_commit_of_new_set() {
        let export = GpuExport::new();
        export.install([Some(descriptor(1, 0)), Some(descriptor(2, 1))]);
        export.publish(0);

        export.install([Some(descriptor(3, 0)), Some(descriptor(4, 1))]);
        assert_eq!(export.current().map(|d| d.handle), Some(1));

        export.publish(0);
        assert_eq!(export.current().map(|d| d.handle), Some(3));
    }

    #[test]
    fn device_token_follows_the_newest_set() {
        let export = GpuExport::new();
        assert_eq!(export.device_token(), None);

        let first = DeviceToken {
            generation: 1,
            share: 0,
        };
        let second = DeviceToken {
            generation: 2,
            share: 0,
        };
        let mut old = descriptor(1, 0);
        old.token = first;
        export.install([Some(old), None]);
        export.publish(0);
        assert_eq!(export.device_token(), Some(first));

        let mut new = descriptor(2, 0);
        new.token = second;
        export.install([Some(new), None]);
        assert_eq!(export.device_token(), Some(second));

        export.clear();
        assert_eq!(export.device_token(), None);
    }

    #[test]
    fn clear_hides_everything() {
        let export = GpuExport::new();
        export.install([Some(descriptor(1, 0)), Some(descriptor(2, 1))]);
        export.publish(0);
        export.clear();
        assert_eq!(export.current(), None);
    }
}
