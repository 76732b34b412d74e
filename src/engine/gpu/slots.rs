//! ### English
//! Double-buffered GPU resource sets and deferred retirement.
//!
//! ### 中文
//! 双缓冲 GPU 资源集与延迟退役。

use std::time::Instant;

use dpi::PhysicalSize;

use super::device::{DeviceToken, ExportHandle, GpuDevice};
use super::export::GpuSurfaceDescriptor;
use crate::engine::config::ChannelOrder;
use crate::engine::error::DeviceError;

/// ### English
/// Number of buffer slots per resource set.
///
/// ### 中文
/// 每个资源集的缓冲槽位数。
pub(crate) const SLOT_COUNT: usize = 2;

/// ### English
/// One buffer slot: staging upload, shared output, optional conversion input, and the
/// completion query of the last commit into this slot.
///
/// ### 中文
/// 一个缓冲槽位：staging 上传资源、共享输出、可选的转换输入，以及最近一次提交到该槽位的完成查询。
pub(crate) struct Slot<D: GpuDevice> {
    pub(crate) staging: D::Staging,
    pub(crate) shared: D::Texture,
    pub(crate) handle: ExportHandle,
    pub(crate) intermediate: Option<D::Texture>,
    pub(crate) query: Option<D::Query>,
}

impl<D: GpuDevice> Slot<D> {
    /// ### English
    /// Creates one slot; anything created before a failure is released again.
    ///
    /// #### Parameters
    /// - `device`: Device to allocate on.
    /// - `source`: Producer resolution (staging and intermediate size).
    /// - `output`: Presentation resolution (shared texture size).
    /// - `converts`: Whether an intermediate conversion input is needed.
    ///
    /// ### 中文
    /// 创建一个槽位；失败前已创建的资源会被释放。
    ///
    /// #### 参数
    /// - `device`：分配资源的设备。
    /// - `source`：生产者分辨率（staging 与中间纹理尺寸）。
    /// - `output`：呈现分辨率（共享纹理尺寸）。
    /// - `converts`：是否需要中间转换输入。
    fn create(
        device: &mut D,
        source: PhysicalSize<u32>,
        output: PhysicalSize<u32>,
        converts: bool,
    ) -> Result<Self, DeviceError> {
        let staging = device.create_staging(source)?;
        let (shared, handle) = match device.create_shared(output) {
            Ok(shared) => shared,
            Err(err) => {
                device.release_staging(staging);
                return Err(err);
            }
        };
        let intermediate = if converts {
            match device.create_intermediate(source) {
                Ok(texture) => Some(texture),
                Err(err) => {
                    device.release_texture(shared);
                    device.release_staging(staging);
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(Self {
            staging,
            shared,
            handle,
            intermediate,
            query: None,
        })
    }

    fn release(self, device: &mut D) {
        if let Some(query) = self.query {
            device.release_query(query);
        }
        if let Some(intermediate) = self.intermediate {
            device.release_texture(intermediate);
        }
        device.release_texture(self.shared);
        device.release_staging(self.staging);
    }
}

/// ### English
/// All per-session GPU resources for one (source, output) size pair.
///
/// ### 中文
/// 某一组（源尺寸, 输出尺寸）对应的全部会话级 GPU 资源。
pub(crate) struct ResourceSet<D: GpuDevice> {
    pub(crate) slots: Vec<Slot<D>>,
    pub(crate) source: PhysicalSize<u32>,
    pub(crate) output: PhysicalSize<u32>,
    pub(crate) converts: bool,
}

impl<D: GpuDevice> ResourceSet<D> {
    pub(crate) fn create(
        device: &mut D,
        source: PhysicalSize<u32>,
        output: PhysicalSize<u32>,
        converts: bool,
    ) -> Result<Self, DeviceError> {
        let mut slots = Vec::with_capacity(SLOT_COUNT);
        for _ in 0..SLOT_COUNT {
            match Slot::create(device, source, output, converts) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    for slot in slots {
                        slot.release(device);
                    }
                    return Err(err);
                }
            }
        }
        Ok(Self {
            slots,
            source,
            output,
            converts,
        })
    }

    pub(crate) fn release(self, device: &mut D) {
        for slot in self.slots {
            slot.release(device);
        }
    }

    pub(crate) fn descriptors(
        &self,
        token: DeviceToken,
        order: ChannelOrder,
    ) -> [Option<GpuSurfaceDescriptor>; SLOT_COUNT] {
        let mut descriptors = [None; SLOT_COUNT];
        for (index, slot) in self.slots.iter().enumerate() {
            descriptors[index] = Some(GpuSurfaceDescriptor {
                handle: slot.handle,
                slot: index as u32,
                size: self.output,
                source_size: self.source,
                order,
                token,
            });
        }
        descriptors
    }
}

/// ### English
/// Resource sets replaced by a resize, kept alive until their deadline because a consumer may
/// still sample a handle it obtained just before the resize.
///
/// A set retired while its descriptors are still the published ones has no deadline yet; the
/// clock starts when the next set is published over it.
///
/// ### 中文
/// 因 resize 被替换的资源集；在截止时间前保持存活，因为消费者可能仍在采样 resize 前刚取得的句柄。
///
/// 退役时其描述符仍处于发布状态的资源集暂无截止时间；直到新的资源集发布并覆盖它时才开始计时。
pub(crate) struct RetiredSets<D: GpuDevice> {
    entries: Vec<(ResourceSet<D>, Option<Instant>)>,
}

impl<D: GpuDevice> Default for RetiredSets<D> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<D: GpuDevice> RetiredSets<D> {
    /// ### English
    /// Queues `set`; `None` keeps it until `start_clock` gives it a deadline.
    ///
    /// ### 中文
    /// 将 `set` 入队；`None` 表示在 `start_clock` 赋予截止时间之前一直保留。
    pub(crate) fn push(&mut self, set: ResourceSet<D>, deadline: Option<Instant>) {
        self.entries.push((set, deadline));
    }

    /// ### English
    /// Gives every still-published set the deadline `deadline`.
    ///
    /// ### 中文
    /// 为所有仍处于发布状态的资源集设置截止时间 `deadline`。
    pub(crate) fn start_clock(&mut self, deadline: Instant) {
        for (_, entry) in &mut self.entries {
            if entry.is_none() {
                *entry = Some(deadline);
            }
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// ### English
    /// Releases every set whose deadline has passed; returns how many were released.
    ///
    /// ### 中文
    /// 释放所有已过截止时间的资源集；返回释放的数量。
    pub(crate) fn sweep(&mut self, device: &mut D, now: Instant) -> usize {
        let mut released = 0;
        let mut index = 0;
        while index < self.entries.len() {
            if self.entries[index].1.is_some_and(|deadline| deadline <= now) {
                let (set, _) = self.entries.swap_remove(index);
                set.release(device);
                released += 1;
            } else {
                index += 1;
            }
        }
        released
    }

    /// ### English
    /// Releases everything regardless of deadlines (device teardown).
    ///
    /// ### 中文
    /// 忽略截止时间释放全部资源（设备销毁时）。
    pub(crate) fn release_all(&mut self, device: &mut D) {
        for (set, _) in self.entries.drain(..) {
            set.release(device);
        }
    }
}
