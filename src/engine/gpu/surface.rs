//! ### English
//! GPU shared-surface manager: device health, double-buffered staging -> shared pipeline,
//! optional conversion pass, non-blocking completion polling, independent source/output
//! resize, and deferred retirement of replaced resources.
//!
//! ### 中文
//! GPU 共享表面管理器：设备健康检查、双缓冲 staging -> 共享纹理管线、可选转换 pass、
//! 非阻塞完成轮询、源/输出尺寸独立 resize，以及被替换资源的延迟退役。

use std::sync::Arc;
use std::time::{Duration, Instant};

use dpi::PhysicalSize;

use super::device::{ConversionParams, DeviceFactory, DeviceStatus, DeviceToken, GpuDevice};
use super::export::{GpuExport, GpuSurfaceDescriptor};
use super::slots::{ResourceSet, RetiredSets, SLOT_COUNT};
use crate::engine::config::{ChannelOrder, VideoFilter};
use crate::engine::error::GpuError;

type DeviceOf<F> = <F as DeviceFactory>::Device;
type KernelOf<F> = <DeviceOf<F> as GpuDevice>::Kernel;

/// ### English
/// Initial parameters of a shared surface.
///
/// ### 中文
/// 共享表面的初始参数。
#[derive(Debug, Clone, Copy)]
pub struct SurfaceConfig {
    pub source: PhysicalSize<u32>,
    pub output: PhysicalSize<u32>,
    pub producer_order: ChannelOrder,
    pub filter: VideoFilter,
    pub retire_after: Duration,
}

/// ### English
/// CPU-writable view of the mapped staging buffer; valid until `commit` or `abort_write`.
///
/// ### 中文
/// 已映射 staging 缓冲区的 CPU 可写视图；在 `commit` 或 `abort_write` 之前有效。
pub struct MappedWrite<'a> {
    bytes: &'a mut [u8],
    pitch: usize,
    size: PhysicalSize<u32>,
}

impl MappedWrite<'_> {
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    #[inline]
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    #[inline]
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }
}

/// ### English
/// Platform-agnostic capability interface of a GPU presentation backend.
///
/// The session controller and present worker only talk to this trait, so a shared-texture
/// backend on one platform and a buffer-export backend on another are interchangeable.
///
/// ### 中文
/// 与平台无关的 GPU 呈现后端能力接口。
///
/// 会话控制器与呈现 worker 只通过该 trait 交互，因此不同平台的共享纹理后端与缓冲区导出后端可以互换。
pub trait SharedSurfaceBackend: Send {
    /// ### English
    /// Maps the current write slot; fails with `Busy` (never blocks) if the GPU still uses it.
    ///
    /// ### 中文
    /// 映射当前写槽位；若 GPU 仍在使用则以 `Busy` 失败（从不阻塞）。
    fn map_write(&mut self) -> Result<MappedWrite<'_>, GpuError>;
    /// ### English
    /// Unmaps, copies/converts into the shared slot, issues a completion query, flushes, and
    /// publishes the slot. Returns the committed slot index.
    ///
    /// ### 中文
    /// 解除映射、拷贝/转换到共享槽位、插入完成查询、flush 并发布该槽位。返回提交的槽位索引。
    fn commit(&mut self) -> Result<usize, GpuError>;
    /// ### English
    /// Unmaps without publishing.
    ///
    /// ### 中文
    /// 解除映射但不发布。
    fn abort_write(&mut self);
    fn export_handle(&self) -> Option<GpuSurfaceDescriptor>;
    fn export(&self) -> Arc<GpuExport>;
    fn resize_source(&mut self, size: PhysicalSize<u32>) -> Result<(), GpuError>;
    fn resize_output(&mut self, size: PhysicalSize<u32>) -> Result<(), GpuError>;
    fn source_size(&self) -> PhysicalSize<u32>;
    fn output_size(&self) -> PhysicalSize<u32>;
    fn native_order(&self) -> ChannelOrder;
    fn set_producer_order(&mut self, order: ChannelOrder) -> Result<(), GpuError>;
    fn set_video_filter(&mut self, filter: VideoFilter);
    fn device_token(&self) -> Option<DeviceToken>;
    /// ### English
    /// Releases retired resource sets whose deadline passed; returns how many were released.
    ///
    /// ### 中文
    /// 释放已过截止时间的退役资源集；返回释放的数量。
    fn sweep_retired(&mut self, now: Instant) -> usize;
    /// ### English
    /// Detaches the device from the calling thread before the worker exits.
    ///
    /// ### 中文
    /// worker 退出前将设备与调用线程解绑。
    fn release_thread(&mut self);
    /// ### English
    /// Releases every GPU resource and the device (idempotent).
    ///
    /// ### 中文
    /// 释放全部 GPU 资源与设备（幂等）。
    fn release(&mut self);
}

pub type BoxedBackend = Box<dyn SharedSurfaceBackend>;

/// ### English
/// Creates a backend on the calling (worker) thread.
///
/// ### 中文
/// 在调用线程（worker）上创建后端。
pub type BackendFactory =
    Arc<dyn Fn(SurfaceConfig) -> Result<BoxedBackend, GpuError> + Send + Sync>;

/// ### English
/// Wraps a device factory constructor into a `BackendFactory`.
///
/// ### 中文
/// 将设备工厂构造函数包装为 `BackendFactory`。
pub fn backend_factory<F, M>(make: M) -> BackendFactory
where
    F: DeviceFactory,
    M: Fn() -> F + Send + Sync + 'static,
{
    Arc::new(move |config| {
        let surface = SharedSurface::new(make(), config)?;
        Ok(Box::new(surface) as BoxedBackend)
    })
}

#[inline]
fn check_size(size: PhysicalSize<u32>) -> Result<(), GpuError> {
    if size.width == 0 || size.height == 0 {
        return Err(GpuError::ZeroSize {
            width: size.width,
            height: size.height,
        });
    }
    Ok(())
}

/// ### English
/// Generic shared-surface manager over one `DeviceFactory`.
///
/// State machine: `NoDevice -> Ready -> (lost) -> NoDevice`. Every write-side entry point runs a
/// health check first; a lost device is torn down (all resources released) and recreated
/// before the operation proceeds.
///
/// ### 中文
/// 基于某个 `DeviceFactory` 的通用共享表面管理器。
///
/// 状态机：`NoDevice -> Ready -> (丢失) -> NoDevice`。所有写侧入口都会先做健康检查；
/// 丢失的设备会被销毁（释放全部资源）并在操作继续前重新创建。
pub struct SharedSurface<F: DeviceFactory> {
    factory: F,
    device: Option<DeviceOf<F>>,
    kernel: Option<KernelOf<F>>,
    generation: u64,
    native_order: ChannelOrder,
    resources: Option<ResourceSet<DeviceOf<F>>>,
    /// ### English
    /// Whether the current set was ever published; unpublished sets are released without retirement.
    ///
    /// ### 中文
    /// 当前资源集是否发布过；从未发布的资源集无需退役，直接释放。
    published: bool,
    retired: RetiredSets<DeviceOf<F>>,
    write_index: usize,
    /// ### English
    /// Slot whose staging buffer is currently mapped.
    ///
    /// ### 中文
    /// 当前已映射 staging 缓冲区的槽位。
    mapped: Option<usize>,
    source: PhysicalSize<u32>,
    output: PhysicalSize<u32>,
    producer_order: ChannelOrder,
    filter: VideoFilter,
    retire_after: Duration,
    export: Arc<GpuExport>,
}

impl<F: DeviceFactory> SharedSurface<F> {
    /// ### English
    /// Creates the device and the first resource set.
    ///
    /// ### 中文
    /// 创建设备以及第一组资源。
    pub fn new(factory: F, config: SurfaceConfig) -> Result<Self, GpuError> {
        check_size(config.source)?;
        check_size(config.output)?;

        let mut surface = Self {
            factory,
            device: None,
            kernel: None,
            generation: 0,
            native_order: config.producer_order,
            resources: None,
            published: false,
            retired: RetiredSets::default(),
            write_index: 0,
            mapped: None,
            source: config.source,
            output: config.output,
            producer_order: config.producer_order,
            filter: config.filter,
            retire_after: config.retire_after,
            export: Arc::new(GpuExport::new()),
        };
        surface.ensure_device()?;
        Ok(surface)
    }

    #[inline]
    pub(crate) fn retired_count(&self) -> usize {
        self.retired.len()
    }

    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    fn needs_conversion(&self) -> bool {
        self.producer_order != self.native_order || self.source != self.output
    }

    /// ### English
    /// Verifies device health, recreating the device and resources when needed.
    ///
    /// ### 中文
    /// 校验设备健康状态，必要时重建设备与资源。
    fn ensure_device(&mut self) -> Result<(), GpuError> {
        if let Some(device) = self.device.as_mut() {
            if device.status() == DeviceStatus::Ready {
                if self.resources.is_none() {
                    self.recreate_resources()?;
                }
                return Ok(());
            }
            tracing::warn!(generation = self.generation, "GPU device lost; recreating");
            self.teardown_device();
        }

        let device = self
            .factory
            .create()
            .map_err(|err| GpuError::DeviceUnavailable(err.to_string()))?;
        self.generation = self.generation.wrapping_add(1);
        self.native_order = device.native_order();
        self.device = Some(device);
        tracing::info!(generation = self.generation, "GPU device ready");

        self.recreate_resources()
    }

    /// ### English
    /// Releases everything owned by the current device, then drops it.
    ///
    /// ### 中文
    /// 释放当前设备持有的全部资源，然后丢弃该设备。
    fn teardown_device(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };

        if let Some(index) = self.mapped.take() {
            if let Some(set) = self.resources.as_mut() {
                device.unmap_staging(&mut set.slots[index].staging);
            }
        }
        if let Some(set) = self.resources.take() {
            set.release(&mut device);
        }
        self.retired.release_all(&mut device);
        if let Some(kernel) = self.kernel.take() {
            device.release_kernel(kernel);
        }
        self.export.clear();
    }

    fn recreate_resources(&mut self) -> Result<(), GpuError> {
        let converts = self.needs_conversion();
        let Some(device) = self.device.as_mut() else {
            return Err(GpuError::DeviceUnavailable("no device".to_string()));
        };

        if converts && self.kernel.is_none() {
            self.kernel = Some(device.compile_conversion()?);
        }

        let set = ResourceSet::create(device, self.source, self.output, converts)?;
        let token = DeviceToken {
            generation: self.generation,
            share: device.share_handle(),
        };
        self.export.install(set.descriptors(token, self.native_order));
        self.resources = Some(set);
        self.published = false;
        self.write_index = 0;

        tracing::debug!(
            generation = self.generation,
            source_width = self.source.width,
            source_height = self.source.height,
            output_width = self.output.width,
            output_height = self.output.height,
            converts,
            "GPU resource set created"
        );
        Ok(())
    }

    /// ### English
    /// Moves the current resource set to the retired list (unmapping first). A set that was never
    /// published cannot be referenced by a consumer and is released immediately; a published one
    /// stays readable until the next commit, so its retirement clock starts there.
    ///
    /// ### 中文
    /// 将当前资源集移入退役列表（先解除映射）。从未发布过的资源集不可能被消费者引用，直接释放；
    /// 已发布的资源集在下一次提交前仍可读取，因此从那时才开始退役计时。
    fn retire_current(&mut self) {
        if let Some(index) = self.mapped.take() {
            if let (Some(device), Some(set)) = (self.device.as_mut(), self.resources.as_mut()) {
                device.unmap_staging(&mut set.slots[index].staging);
            }
        }
        let Some(set) = self.resources.take() else {
            return;
        };
        match (self.published, self.device.as_mut()) {
            (false, Some(device)) => set.release(device),
            _ => self.retired.push(set, None),
        }
    }

    fn rebuild(&mut self) -> Result<(), GpuError> {
        self.retire_current();
        self.ensure_device()
    }
}

impl<F: DeviceFactory> SharedSurfaceBackend for SharedSurface<F> {
    fn map_write(&mut self) -> Result<MappedWrite<'_>, GpuError> {
        if self.mapped.is_some() {
            return Err(GpuError::AlreadyMapped);
        }
        self.ensure_device()?;
        self.sweep_retired(Instant::now());

        let index = self.write_index;
        let (Some(device), Some(set)) = (self.device.as_mut(), self.resources.as_mut()) else {
            return Err(GpuError::DeviceUnavailable("no resources".to_string()));
        };
        let slot = &mut set.slots[index];

        if let Some(query) = slot.query.as_ref() {
            if !device.poll_query(query) {
                return Err(GpuError::Busy);
            }
        }
        if let Some(query) = slot.query.take() {
            device.release_query(query);
        }

        let mapping = device.map_staging(&mut slot.staging)?;
        self.mapped = Some(index);

        let bytes = unsafe { std::slice::from_raw_parts_mut(mapping.ptr.as_ptr(), mapping.len) };
        Ok(MappedWrite {
            bytes,
            pitch: mapping.pitch,
            size: set.source,
        })
    }

    fn commit(&mut self) -> Result<usize, GpuError> {
        let Some(index) = self.mapped.take() else {
            return Err(GpuError::NotMapped);
        };
        let (Some(device), Some(set)) = (self.device.as_mut(), self.resources.as_mut()) else {
            return Err(GpuError::DeviceUnavailable("no resources".to_string()));
        };

        let params = ConversionParams {
            swizzle: self.producer_order != self.native_order,
            filter: self.filter,
            source: set.source,
            output: set.output,
        };
        let converts = set.converts;
        let slot = &mut set.slots[index];
        device.unmap_staging(&mut slot.staging);

        match (converts, self.kernel.as_ref(), slot.intermediate.as_ref()) {
            (true, Some(kernel), Some(intermediate)) => {
                device.upload(&slot.staging, intermediate)?;
                device.run_conversion(kernel, intermediate, &slot.shared, &params)?;
            }
            _ => device.copy_direct(&slot.staging, &slot.shared)?,
        }

        slot.query = device.issue_query();
        device.flush();

        /*
        ### English
        Publish optimistically: the query only throttles the next write into this slot.

        ### 中文
        乐观发布：查询只用于限制下一次对该槽位的写入。
        */
        self.export.publish(index);
        self.retired.start_clock(Instant::now() + self.retire_after);
        self.published = true;
        self.write_index = (index + 1) % SLOT_COUNT;
        tracing::trace!(slot = index, generation = self.generation, "GPU frame committed");
        Ok(index)
    }

    fn abort_write(&mut self) {
        if let Some(index) = self.mapped.take() {
            if let (Some(device), Some(set)) = (self.device.as_mut(), self.resources.as_mut()) {
                device.unmap_staging(&mut set.slots[index].staging);
            }
        }
    }

    fn export_handle(&self) -> Option<GpuSurfaceDescriptor> {
        self.export.current()
    }

    fn export(&self) -> Arc<GpuExport> {
        self.export.clone()
    }

    fn resize_source(&mut self, size: PhysicalSize<u32>) -> Result<(), GpuError> {
        check_size(size)?;
        if size == self.source && self.resources.is_some() {
            return Ok(());
        }
        tracing::debug!(width = size.width, height = size.height, "GPU source resize");
        self.source = size;
        self.rebuild()
    }

    fn resize_output(&mut self, size: PhysicalSize<u32>) -> Result<(), GpuError> {
        check_size(size)?;
        if size == self.output && self.resources.is_some() {
            return Ok(());
        }
        tracing::debug!(width = size.width, height = size.height, "GPU output resize");
        self.output = size;
        self.rebuild()
    }

    #[inline]
    fn source_size(&self) -> PhysicalSize<u32> {
        self.source
    }

    #[inline]
    fn output_size(&self) -> PhysicalSize<u32> {
        self.output
    }

    #[inline]
    fn native_order(&self) -> ChannelOrder {
        self.native_order
    }

    fn set_producer_order(&mut self, order: ChannelOrder) -> Result<(), GpuError> {
        if order == self.producer_order {
            return Ok(());
        }
        self.producer_order = order;
        self.rebuild()
    }

    fn set_video_filter(&mut self, filter: VideoFilter) {
        self.filter = filter;
    }

    fn device_token(&self) -> Option<DeviceToken> {
        self.device.as_ref().map(|device| DeviceToken {
            generation: self.generation,
            share: device.share_handle(),
        })
    }

    fn sweep_retired(&mut self, now: Instant) -> usize {
        match self.device.as_mut() {
            Some(device) => self.retired.sweep(device, now),
            None => 0,
        }
    }

    fn release_thread(&mut self) {
        if let Some(device) = self.device.as_mut() {
            device.release_thread();
        }
    }

    fn release(&mut self) {
        self.teardown_device();
    }
}

impl<F: DeviceFactory> Drop for SharedSurface<F> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeDeviceFactory, FakeGpu};

    fn config(source: (u32, u32), output: (u32, u32)) -> SurfaceConfig {
        SurfaceConfig {
            source: PhysicalSize::new(source.0, source.1),
            output: PhysicalSize::new(output.0, output.1),
            producer_order: ChannelOrder::Rgba,
            filter: VideoFilter::Point,
            retire_after: Duration::from_secs(3),
        }
    }

    fn surface(gpu: &Arc<FakeGpu>, cfg: SurfaceConfig) -> SharedSurface<FakeDeviceFactory> {
        SharedSurface::new(FakeDeviceFactory::new(gpu.clone()), cfg).unwrap()
    }

    fn write_tag(
        surface: &mut SharedSurface<FakeDeviceFactory>,
        tag: u8,
    ) -> Result<usize, GpuError> {
        let mut mapped = surface.map_write()?;
        mapped.bytes_mut().fill(tag);
        surface.commit()
    }

    #[test]
    fn matching_sizes_use_direct_copy_and_publish_optimistically() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((256, 240), (256, 240)));
        assert_eq!(gpu.compiles(), 0);

        assert_eq!(write_tag(&mut surface, 7), Ok(0));
        let descriptor = surface.export_handle().unwrap();
        assert_eq!(descriptor.slot, 0);
        assert_eq!(gpu.content(descriptor.handle), Some(7));
        assert_eq!(gpu.direct_copies(), 1);

        assert_eq!(write_tag(&mut surface, 8), Ok(1));
        assert_eq!(surface.export_handle().unwrap().slot, 1);
    }

    #[test]
    fn scaling_or_swizzle_compiles_kernel_once() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((256, 240), (512, 480)));
        assert_eq!(gpu.compiles(), 1);
        write_tag(&mut surface, 3).unwrap();
        assert_eq!(gpu.conversions(), 1);

        surface.resize_output(PhysicalSize::new(768, 720)).unwrap();
        surface.set_producer_order(ChannelOrder::Bgra).unwrap();
        write_tag(&mut surface, 4).unwrap();
        assert_eq!(gpu.compiles(), 1);
        assert_eq!(gpu.content(surface.export_handle().unwrap().handle), Some(4));
    }

    #[test]
    fn resize_decoupling_keeps_output_size() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((256, 240), (256, 240)));

        surface.resize_source(PhysicalSize::new(128, 120)).unwrap();
        surface.resize_output(PhysicalSize::new(512, 480)).unwrap();
        assert_eq!(surface.output_size(), PhysicalSize::new(512, 480));
        assert_eq!(surface.source_size(), PhysicalSize::new(128, 120));

        surface.resize_source(PhysicalSize::new(320, 240)).unwrap();
        let mut mapped = surface.map_write().unwrap();
        assert_eq!(mapped.size(), PhysicalSize::new(320, 240));
        assert_eq!(mapped.pitch(), 320 * 4);
        mapped.bytes_mut().fill(1);
        surface.commit().unwrap();

        let descriptor = surface.export_handle().unwrap();
        assert_eq!(descriptor.size, PhysicalSize::new(512, 480));
        assert_eq!(descriptor.source_size, PhysicalSize::new(320, 240));
    }

    #[test]
    fn busy_slot_is_skipped_without_blocking() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((64, 64), (64, 64)));
        write_tag(&mut surface, 1).unwrap();
        write_tag(&mut surface, 2).unwrap();

        gpu.set_queries_pending(true);
        assert_eq!(surface.map_write().err(), Some(GpuError::Busy));
        assert_eq!(surface.export_handle().map(|d| d.slot), Some(1));

        gpu.set_queries_pending(false);
        assert_eq!(write_tag(&mut surface, 3), Ok(0));
    }

    #[test]
    fn double_map_and_unmapped_commit_are_rejected() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((16, 16), (16, 16)));
        assert_eq!(surface.commit(), Err(GpuError::NotMapped));
        drop(surface.map_write().unwrap());
        assert_eq!(surface.map_write().err(), Some(GpuError::AlreadyMapped));
        surface.abort_write();
        assert!(surface.map_write().is_ok());
    }

    #[test]
    fn retired_sets_outlive_resize_until_deadline() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((64, 64), (64, 64)));
        write_tag(&mut surface, 1).unwrap();
        let old_handle = surface.export_handle().unwrap().handle;

        surface.resize_output(PhysicalSize::new(128, 128)).unwrap();
        assert_eq!(surface.retired_count(), 1);
        assert!(gpu.is_export_live(old_handle));
        assert_eq!(surface.export_handle().map(|d| d.handle), Some(old_handle));

        write_tag(&mut surface, 2).unwrap();
        assert_ne!(surface.export_handle().map(|d| d.handle), Some(old_handle));
        assert_eq!(surface.sweep_retired(Instant::now()), 0);
        assert_eq!(
            surface.sweep_retired(Instant::now() + Duration::from_secs(4)),
            1
        );
        assert!(!gpu.is_export_live(old_handle));
        assert_eq!(gpu.live_exports(), 2);
    }

    #[test]
    fn published_set_survives_until_superseded() {
        let gpu = FakeGpu::new();
        let mut cfg = config((64, 64), (64, 64));
        cfg.retire_after = Duration::from_millis(10);
        let mut surface = surface(&gpu, cfg);
        write_tag(&mut surface, 1).unwrap();
        let old_handle = surface.export_handle().unwrap().handle;

        surface.resize_output(PhysicalSize::new(128, 128)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        drop(surface.map_write().unwrap());
        surface.abort_write();
        assert_eq!(
            surface.sweep_retired(Instant::now() + Duration::from_secs(60)),
            0
        );

        assert_eq!(surface.export_handle().map(|d| d.handle), Some(old_handle));
        assert!(gpu.is_export_live(old_handle));

        write_tag(&mut surface, 2).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(surface.sweep_retired(Instant::now()), 1);
        assert!(!gpu.is_export_live(old_handle));
    }

    #[test]
    fn unpublished_sets_are_released_immediately() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((64, 64), (64, 64)));
        surface.set_producer_order(ChannelOrder::Bgra).unwrap();
        surface.resize_output(PhysicalSize::new(96, 96)).unwrap();
        assert_eq!(surface.retired_count(), 0);
        assert_eq!(gpu.live_exports(), 2);
    }

    #[test]
    fn device_loss_recreates_resources_without_leaks() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((64, 64), (128, 128)));
        write_tag(&mut surface, 1).unwrap();
        surface.resize_output(PhysicalSize::new(256, 256)).unwrap();
        assert_eq!(gpu.live_exports(), 4);
        let generation = surface.generation();

        gpu.lose_device();
        write_tag(&mut surface, 2).unwrap();

        assert_eq!(surface.generation(), generation + 1);
        assert_eq!(gpu.devices_created(), 2);
        assert_eq!(surface.retired_count(), 0);
        assert_eq!(gpu.live_exports(), 2);
        assert_eq!(gpu.live_kernels(), 1);
        let descriptor = surface.export_handle().unwrap();
        assert_eq!(descriptor.token.generation, generation + 1);
        assert_eq!(gpu.content(descriptor.handle), Some(2));
    }

    #[test]
    fn failed_recreation_fails_cleanly() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((64, 64), (64, 64)));
        gpu.lose_device();
        gpu.set_fail_create(true);

        assert!(matches!(
            surface.map_write().err(),
            Some(GpuError::DeviceUnavailable(_))
        ));
        assert_eq!(gpu.live_exports(), 0);
        assert_eq!(gpu.live_staging(), 0);
        assert_eq!(surface.export_handle(), None);

        gpu.set_fail_create(false);
        assert_eq!(write_tag(&mut surface, 5), Ok(0));
        assert_eq!(gpu.live_exports(), 2);
    }

    #[test]
    fn release_frees_everything() {
        let gpu = FakeGpu::new();
        let mut surface = surface(&gpu, config((64, 64), (32, 32)));
        surface.resize_source(PhysicalSize::new(48, 48)).unwrap();
        surface.release();
        surface.release();
        assert_eq!(gpu.live_exports(), 0);
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.live_staging(), 0);
        assert_eq!(gpu.live_kernels(), 0);
    }
}
