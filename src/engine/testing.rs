//! ### English
//! In-memory collaborators for unit tests: producer, registrar, dispatcher, GPU device, overlay.
//!
//! ### 中文
//! 单元测试使用的内存协作者：生产者、注册器、调度器、GPU 设备、overlay。

use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool, AtomicI64, AtomicIsize, AtomicU8, AtomicU64, AtomicUsize, Ordering,
};
use std::time::{Duration, Instant};

use dpi::PhysicalSize;
use parking_lot::{Mutex, RwLock};

use super::compositor::{
    PlatformDispatcher, PlatformTask, TextureId, TextureRegistrar, TextureVariant,
};
use super::config::{BYTES_PER_PIXEL, ChannelOrder, VideoFilter, frame_len};
use super::error::{DeviceError, GpuError};
use super::gpu::device::{ConversionParams, StagingMapping};
use super::gpu::{
    DeviceFactory, DeviceStatus, DeviceToken, ExportHandle, GpuDevice, GpuSurfaceDescriptor,
};
use super::mailbox::PendingFrame;
use super::overlay::{OverlayFactory, OverlayPresenter, OverlayRect};
use super::producer::{FrameProducer, FrameReadyCallback};

/// ### English
/// Polls `condition` until it holds or `timeout` elapses; returns the final result.
///
/// ### 中文
/// 轮询 `condition` 直到成立或超过 `timeout`；返回最终结果。
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return condition();
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// ### English
/// Tag byte the fake producer writes for `buffer_index`.
///
/// ### 中文
/// 假生产者为 `buffer_index` 写入的标记字节。
pub(crate) fn frame_tag(buffer_index: u32) -> u8 {
    (buffer_index % 251) as u8 + 1
}

pub(crate) struct FakeProducer {
    callback: RwLock<Option<FrameReadyCallback>>,
    starts: AtomicUsize,
    copies: AtomicUsize,
    color_format: Mutex<Option<ChannelOrder>>,
    supports_color_format: bool,
    copy_delay: Duration,
}

impl FakeProducer {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_options(true, Duration::ZERO)
    }

    pub(crate) fn with_options(supports_color_format: bool, copy_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            callback: RwLock::new(None),
            starts: AtomicUsize::new(0),
            copies: AtomicUsize::new(0),
            color_format: Mutex::new(None),
            supports_color_format,
            copy_delay,
        })
    }

    /// ### English
    /// Fires the frame-ready callback like the producer thread would. Returns `false` if unhooked.
    ///
    /// ### 中文
    /// 像生产者线程那样触发帧就绪回调。未挂接时返回 `false`。
    pub(crate) fn emit(&self, buffer_index: u32, width: u32, height: u32) -> bool {
        let callback = self.callback.read();
        match callback.as_ref() {
            Some(callback) => {
                callback(PendingFrame::new(
                    buffer_index,
                    width,
                    height,
                    width * BYTES_PER_PIXEL as u32,
                ));
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_hooked(&self) -> bool {
        self.callback.read().is_some()
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    pub(crate) fn color_format(&self) -> Option<ChannelOrder> {
        *self.color_format.lock()
    }
}

impl FrameProducer for FakeProducer {
    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn set_frame_ready_callback(&self, callback: Option<FrameReadyCallback>) {
        *self.callback.write() = callback;
    }

    fn copy_frame(
        &self,
        buffer_index: u32,
        dst: &mut [u8],
        dst_pitch: usize,
        dst_height: u32,
    ) -> usize {
        if !self.copy_delay.is_zero() {
            std::thread::sleep(self.copy_delay);
        }
        let len = (dst_pitch * dst_height as usize).min(dst.len());
        dst[..len].fill(frame_tag(buffer_index));
        self.copies.fetch_add(1, Ordering::SeqCst);
        len
    }

    fn set_color_format(&self, order: ChannelOrder) -> bool {
        if !self.supports_color_format {
            return false;
        }
        *self.color_format.lock() = Some(order);
        true
    }
}

pub(crate) struct FakeRegistrar {
    next_id: AtomicI64,
    registered: Mutex<HashMap<TextureId, Arc<TextureVariant>>>,
    pending: Mutex<Vec<(TextureId, PlatformTask)>>,
    notifications: Mutex<HashMap<TextureId, usize>>,
    fail_register: AtomicBool,
}

impl FakeRegistrar {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1),
            registered: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            notifications: Mutex::new(HashMap::new()),
            fail_register: AtomicBool::new(false),
        })
    }

    pub(crate) fn set_fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn texture(&self, id: TextureId) -> Option<Arc<TextureVariant>> {
        self.registered.lock().get(&id).cloned()
    }

    pub(crate) fn registered_count(&self) -> usize {
        self.registered.lock().len()
    }

    pub(crate) fn pending_unregistrations(&self) -> usize {
        self.pending.lock().len()
    }

    /// ### English
    /// Fires every outstanding unregistration completion.
    ///
    /// ### 中文
    /// 触发所有未完成的反注册完成回调。
    pub(crate) fn complete_unregistrations(&self) -> usize {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        let count = pending.len();
        for (_, on_done) in pending {
            on_done();
        }
        count
    }

    pub(crate) fn notifications(&self, id: TextureId) -> usize {
        self.notifications.lock().get(&id).copied().unwrap_or(0)
    }
}

impl TextureRegistrar for FakeRegistrar {
    fn register_texture(&self, texture: Arc<TextureVariant>) -> Result<TextureId, String> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err("registration rejected".to_string());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.registered.lock().insert(id, texture);
        Ok(id)
    }

    fn unregister_texture(&self, id: TextureId, on_done: PlatformTask) {
        self.registered.lock().remove(&id);
        self.pending.lock().push((id, on_done));
    }

    fn mark_frame_available(&self, id: TextureId) {
        *self.notifications.lock().entry(id).or_insert(0) += 1;
    }
}

/// ### English
/// Runs tasks on the dispatching thread.
///
/// ### 中文
/// 在投递线程上直接执行任务。
pub(crate) struct InlineDispatcher;

impl PlatformDispatcher for InlineDispatcher {
    fn dispatch(&self, task: PlatformTask) {
        task();
    }
}

/// ### English
/// Shared state and counters of the fake GPU.
///
/// ### 中文
/// 假 GPU 的共享状态与计数器。
#[derive(Default)]
pub(crate) struct FakeGpu {
    live_staging: AtomicIsize,
    live_textures: AtomicIsize,
    live_exports: AtomicIsize,
    live_kernels: AtomicIsize,
    live_queries: AtomicIsize,
    compiles: AtomicUsize,
    devices_created: AtomicUsize,
    conversions: AtomicUsize,
    direct_copies: AtomicUsize,
    lost: AtomicBool,
    fail_create: AtomicBool,
    queries_pending: AtomicBool,
    native_bgra: AtomicBool,
    next_handle: AtomicU64,
    exports: Mutex<HashSet<ExportHandle>>,
    contents: Mutex<HashMap<ExportHandle, u8>>,
}

impl FakeGpu {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicU64::new(0x100),
            ..Self::default()
        })
    }

    pub(crate) fn lose_device(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_queries_pending(&self, pending: bool) {
        self.queries_pending.store(pending, Ordering::SeqCst);
    }

    pub(crate) fn set_native_bgra(&self, bgra: bool) {
        self.native_bgra.store(bgra, Ordering::SeqCst);
    }

    pub(crate) fn live_staging(&self) -> isize {
        self.live_staging.load(Ordering::SeqCst)
    }

    pub(crate) fn live_textures(&self) -> isize {
        self.live_textures.load(Ordering::SeqCst)
    }

    pub(crate) fn live_exports(&self) -> isize {
        self.live_exports.load(Ordering::SeqCst)
    }

    pub(crate) fn live_kernels(&self) -> isize {
        self.live_kernels.load(Ordering::SeqCst)
    }

    pub(crate) fn live_queries(&self) -> isize {
        self.live_queries.load(Ordering::SeqCst)
    }

    pub(crate) fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub(crate) fn devices_created(&self) -> usize {
        self.devices_created.load(Ordering::SeqCst)
    }

    pub(crate) fn conversions(&self) -> usize {
        self.conversions.load(Ordering::SeqCst)
    }

    pub(crate) fn direct_copies(&self) -> usize {
        self.direct_copies.load(Ordering::SeqCst)
    }

    pub(crate) fn is_export_live(&self, handle: ExportHandle) -> bool {
        self.exports.lock().contains(&handle)
    }

    /// ### English
    /// Tag byte last written into the shared texture behind `handle`.
    ///
    /// ### 中文
    /// 最近写入 `handle` 对应共享纹理的标记字节。
    pub(crate) fn content(&self, handle: ExportHandle) -> Option<u8> {
        self.contents.lock().get(&handle).copied()
    }
}

pub(crate) struct FakeDeviceFactory {
    gpu: Arc<FakeGpu>,
}

impl FakeDeviceFactory {
    pub(crate) fn new(gpu: Arc<FakeGpu>) -> Self {
        Self { gpu }
    }
}

impl DeviceFactory for FakeDeviceFactory {
    type Device = FakeDevice;

    fn create(&mut self) -> Result<FakeDevice, DeviceError> {
        if self.gpu.fail_create.load(Ordering::SeqCst) {
            return Err(DeviceError::Create("injected failure".to_string()));
        }
        self.gpu.lost.store(false, Ordering::SeqCst);
        let id = self.gpu.devices_created.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        Ok(FakeDevice {
            gpu: self.gpu.clone(),
            id,
        })
    }
}

pub(crate) struct FakeDevice {
    gpu: Arc<FakeGpu>,
    id: u64,
}

pub(crate) struct FakeStaging {
    data: Vec<u8>,
    pitch: usize,
    mapped: bool,
}

pub(crate) struct FakeTexture {
    handle: Option<ExportHandle>,
    tag: AtomicU8,
}

impl FakeTexture {
    fn write(&self, gpu: &FakeGpu, tag: u8) {
        self.tag.store(tag, Ordering::SeqCst);
        if let Some(handle) = self.handle {
            gpu.contents.lock().insert(handle, tag);
        }
    }
}

pub(crate) struct FakeKernel;

pub(crate) struct FakeQuery;

impl FakeDevice {
    fn check(&self) -> Result<(), DeviceError> {
        if self.gpu.lost.load(Ordering::SeqCst) {
            return Err(DeviceError::Lost);
        }
        Ok(())
    }
}

impl GpuDevice for FakeDevice {
    type Staging = FakeStaging;
    type Texture = FakeTexture;
    type Kernel = FakeKernel;
    type Query = FakeQuery;

    fn status(&mut self) -> DeviceStatus {
        if self.gpu.lost.load(Ordering::SeqCst) {
            DeviceStatus::Lost
        } else {
            DeviceStatus::Ready
        }
    }

    fn native_order(&self) -> ChannelOrder {
        if self.gpu.native_bgra.load(Ordering::SeqCst) {
            ChannelOrder::Bgra
        } else {
            ChannelOrder::Rgba
        }
    }

    fn share_handle(&self) -> u64 {
        self.id
    }

    fn create_staging(&mut self, size: PhysicalSize<u32>) -> Result<FakeStaging, DeviceError> {
        self.check()?;
        let len = frame_len(size).ok_or_else(|| DeviceError::Create("overflow".to_string()))?;
        self.gpu.live_staging.fetch_add(1, Ordering::SeqCst);
        Ok(FakeStaging {
            data: vec![0; len],
            pitch: size.width as usize * BYTES_PER_PIXEL,
            mapped: false,
        })
    }

    fn create_shared(
        &mut self,
        _size: PhysicalSize<u32>,
    ) -> Result<(FakeTexture, ExportHandle), DeviceError> {
        self.check()?;
        let handle = self.gpu.next_handle.fetch_add(1, Ordering::SeqCst);
        self.gpu.live_textures.fetch_add(1, Ordering::SeqCst);
        self.gpu.live_exports.fetch_add(1, Ordering::SeqCst);
        self.gpu.exports.lock().insert(handle);
        Ok((
            FakeTexture {
                handle: Some(handle),
                tag: AtomicU8::new(0),
            },
            handle,
        ))
    }

    fn create_intermediate(
        &mut self,
        _size: PhysicalSize<u32>,
    ) -> Result<FakeTexture, DeviceError> {
        self.check()?;
        self.gpu.live_textures.fetch_add(1, Ordering::SeqCst);
        Ok(FakeTexture {
            handle: None,
            tag: AtomicU8::new(0),
        })
    }

    fn compile_conversion(&mut self) -> Result<FakeKernel, DeviceError> {
        self.check()?;
        self.gpu.compiles.fetch_add(1, Ordering::SeqCst);
        self.gpu.live_kernels.fetch_add(1, Ordering::SeqCst);
        Ok(FakeKernel)
    }

    fn map_staging(&mut self, staging: &mut FakeStaging) -> Result<StagingMapping, DeviceError> {
        self.check()?;
        let ptr = NonNull::new(staging.data.as_mut_ptr())
            .ok_or_else(|| DeviceError::Map("empty staging buffer".to_string()))?;
        staging.mapped = true;
        Ok(StagingMapping {
            ptr,
            len: staging.data.len(),
            pitch: staging.pitch,
        })
    }

    fn unmap_staging(&mut self, staging: &mut FakeStaging) {
        staging.mapped = false;
    }

    fn upload(&mut self, staging: &FakeStaging, dst: &FakeTexture) -> Result<(), DeviceError> {
        self.check()?;
        dst.write(&self.gpu, staging.data[0]);
        Ok(())
    }

    fn run_conversion(
        &mut self,
        _kernel: &FakeKernel,
        src: &FakeTexture,
        dst: &FakeTexture,
        _params: &ConversionParams,
    ) -> Result<(), DeviceError> {
        self.check()?;
        self.gpu.conversions.fetch_add(1, Ordering::SeqCst);
        dst.write(&self.gpu, src.tag.load(Ordering::SeqCst));
        Ok(())
    }

    fn copy_direct(
        &mut self,
        staging: &FakeStaging,
        dst: &FakeTexture,
    ) -> Result<(), DeviceError> {
        self.check()?;
        self.gpu.direct_copies.fetch_add(1, Ordering::SeqCst);
        dst.write(&self.gpu, staging.data[0]);
        Ok(())
    }

    fn issue_query(&mut self) -> Option<FakeQuery> {
        self.gpu.live_queries.fetch_add(1, Ordering::SeqCst);
        Some(FakeQuery)
    }

    fn poll_query(&mut self, _query: &FakeQuery) -> bool {
        !self.gpu.queries_pending.load(Ordering::SeqCst)
    }

    fn flush(&mut self) {}

    fn release_query(&mut self, _query: FakeQuery) {
        self.gpu.live_queries.fetch_sub(1, Ordering::SeqCst);
    }

    fn release_staging(&mut self, _staging: FakeStaging) {
        self.gpu.live_staging.fetch_sub(1, Ordering::SeqCst);
    }

    fn release_texture(&mut self, texture: FakeTexture) {
        self.gpu.live_textures.fetch_sub(1, Ordering::SeqCst);
        if let Some(handle) = texture.handle {
            self.gpu.live_exports.fetch_sub(1, Ordering::SeqCst);
            self.gpu.exports.lock().remove(&handle);
            self.gpu.contents.lock().remove(&handle);
        }
    }

    fn release_kernel(&mut self, _kernel: FakeKernel) {
        self.gpu.live_kernels.fetch_sub(1, Ordering::SeqCst);
    }
}

/// ### English
/// Everything the fake overlay presenters observed.
///
/// ### 中文
/// 假 overlay 呈现器观察到的全部调用。
#[derive(Default)]
pub(crate) struct OverlayLog {
    rects: Mutex<Vec<OverlayRect>>,
    visible: AtomicBool,
    presents: AtomicUsize,
    dropped: AtomicUsize,
    swapchain_sizes: Mutex<Vec<PhysicalSize<u32>>>,
    last_handle: Mutex<Option<ExportHandle>>,
}

impl OverlayLog {
    pub(crate) fn last_rect(&self) -> Option<OverlayRect> {
        self.rects.lock().last().copied()
    }

    pub(crate) fn visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub(crate) fn presents(&self) -> usize {
        self.presents.load(Ordering::SeqCst)
    }

    pub(crate) fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub(crate) fn swapchain_sizes(&self) -> Vec<PhysicalSize<u32>> {
        self.swapchain_sizes.lock().clone()
    }

    pub(crate) fn last_handle(&self) -> Option<ExportHandle> {
        *self.last_handle.lock()
    }
}

pub(crate) struct FakeOverlay {
    token: DeviceToken,
    log: Arc<OverlayLog>,
}

impl OverlayPresenter for FakeOverlay {
    fn device_token(&self) -> DeviceToken {
        self.token
    }

    fn set_rect(&mut self, rect: OverlayRect) {
        self.log.rects.lock().push(rect);
    }

    fn set_visible(&mut self, visible: bool) {
        self.log.visible.store(visible, Ordering::SeqCst);
    }

    fn resize_swapchain(&mut self, size: PhysicalSize<u32>) -> Result<(), GpuError> {
        self.log.swapchain_sizes.lock().push(size);
        Ok(())
    }

    fn present(
        &mut self,
        surface: &GpuSurfaceDescriptor,
        _filter: VideoFilter,
    ) -> Result<(), GpuError> {
        *self.log.last_handle.lock() = Some(surface.handle);
        self.log.presents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeOverlay {
    fn drop(&mut self) {
        self.log.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeOverlayFactory {
    log: Arc<OverlayLog>,
    created: AtomicUsize,
}

impl FakeOverlayFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(OverlayLog::default()),
            created: AtomicUsize::new(0),
        })
    }

    pub(crate) fn log(&self) -> &OverlayLog {
        &self.log
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl OverlayFactory for FakeOverlayFactory {
    fn create(
        &self,
        token: DeviceToken,
        _rect: OverlayRect,
    ) -> Result<Box<dyn OverlayPresenter>, GpuError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOverlay {
            token,
            log: self.log.clone(),
        }))
    }
}
