//! ### English
//! Session lifecycle controller: create / dispose / resize / backend switch for the single
//! active texture session, plus the compositor pull API.
//!
//! Lifecycle operations are serialized by one lifecycle lock; the session state itself sits
//! behind a short-lived mutex that is never held across producer, registrar, worker or device
//! calls (state is copied out, then acted on).
//!
//! ### 中文
//! 会话生命周期控制器：负责唯一活动纹理会话的创建/销毁/resize/后端切换，以及合成器拉取 API。
//!
//! 生命周期操作由一把生命周期锁串行化；会话状态本身位于短持有的互斥锁之后，
//! 调用生产者、注册器、worker 或设备时从不持有该锁（先拷出状态，再执行操作）。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use dpi::PhysicalSize;
use parking_lot::Mutex;

use super::aux::AuxTextures;
use super::compositor::{
    BackendKind, FrameNotifier, NO_TEXTURE, PlatformDispatcher, TextureId, TextureRegistrar,
    TextureVariant,
};
use super::config::{BridgeConfig, ChannelOrder, VideoFilter};
use super::debounce::DebouncedResize;
use super::error::BridgeError;
use super::gpu::{BackendFactory, GpuExport, GpuSurfaceDescriptor, SurfaceConfig};
use super::mailbox::Mailbox;
use super::overlay::{OverlayFactory, OverlayRect, OverlayState};
use super::producer::FrameProducer;
use super::stats::{BridgeStats, StatsCounters};
use super::surface::CpuSurface;
use super::worker::{PresentWorker, WorkerContext};

/// ### English
/// External collaborators of one bridge.
///
/// ### 中文
/// 单个帧桥的外部协作者。
pub struct BridgeCollaborators {
    pub producer: Arc<dyn FrameProducer>,
    /// ### English
    /// `None` makes `create` fail with `no_registrar`.
    ///
    /// ### 中文
    /// 为 `None` 时 `create` 以 `no_registrar` 失败。
    pub registrar: Option<Arc<dyn TextureRegistrar>>,
    pub dispatcher: Arc<dyn PlatformDispatcher>,
    /// ### English
    /// GPU backend constructor; `None` means CPU only.
    ///
    /// ### 中文
    /// GPU 后端构造函数；为 `None` 表示只用 CPU。
    pub gpu: Option<BackendFactory>,
    pub overlay: Option<Arc<dyn OverlayFactory>>,
}

struct Session {
    texture_id: TextureId,
    source: PhysicalSize<u32>,
    variant: Arc<TextureVariant>,
    registrar: Arc<dyn TextureRegistrar>,
    notifier: FrameNotifier,
    worker: PresentWorker,
}

impl Session {
    #[inline]
    fn export(&self) -> Option<Arc<GpuExport>> {
        match self.variant.as_ref() {
            TextureVariant::Gpu { export, .. } => Some(export.clone()),
            TextureVariant::Cpu(_) => None,
        }
    }
}

struct StartedBackend {
    worker: PresentWorker,
    mailbox: Arc<Mailbox>,
    variant: TextureVariant,
}

/// ### English
/// Owner of the (at most one) active texture session.
///
/// ### 中文
/// （至多一个）活动纹理会话的持有者。
pub struct SessionController {
    config: BridgeConfig,
    producer: Arc<dyn FrameProducer>,
    registrar: Option<Arc<dyn TextureRegistrar>>,
    dispatcher: Arc<dyn PlatformDispatcher>,
    gpu: Option<BackendFactory>,
    lifecycle: Mutex<()>,
    session: Mutex<Option<Session>>,
    use_gpu: AtomicBool,
    video_filter: Arc<Mutex<VideoFilter>>,
    present_size: Mutex<PhysicalSize<u32>>,
    output_resize: Arc<DebouncedResize>,
    overlay: Arc<OverlayState>,
    stats: Arc<StatsCounters>,
    /// ### English
    /// Set on shutdown; late frame-ready callbacks are dropped.
    ///
    /// ### 中文
    /// 关闭时置位；迟到的帧就绪回调会被丢弃。
    shutting_down: Arc<AtomicBool>,
    aux: AuxTextures,
}

impl SessionController {
    pub fn new(config: BridgeConfig, collaborators: BridgeCollaborators) -> Self {
        let overlay = Arc::new(OverlayState::new(
            collaborators.overlay,
            config.overlay_resize_debounce,
        ));
        overlay.set_filter(config.video_filter);

        Self {
            producer: collaborators.producer,
            registrar: collaborators.registrar,
            dispatcher: collaborators.dispatcher,
            gpu: collaborators.gpu,
            lifecycle: Mutex::new(()),
            session: Mutex::new(None),
            use_gpu: AtomicBool::new(config.prefer_gpu),
            video_filter: Arc::new(Mutex::new(config.video_filter)),
            present_size: Mutex::new(config.default_output_size),
            output_resize: Arc::new(DebouncedResize::new(config.output_resize_debounce)),
            overlay,
            stats: Arc::new(StatsCounters::default()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            aux: AuxTextures::default(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// ### English
    /// Current texture id, or `-1` without an active session.
    ///
    /// ### 中文
    /// 当前纹理 id；无活动会话时为 `-1`。
    pub fn texture_id(&self) -> TextureId {
        self.session
            .lock()
            .as_ref()
            .map_or(NO_TEXTURE, |session| session.texture_id)
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.variant.kind())
    }

    #[inline]
    pub fn stats(&self) -> BridgeStats {
        self.stats.snapshot()
    }

    /// ### English
    /// Creates the texture session, or returns the existing id.
    ///
    /// The GPU backend is tried first (unless CPU was requested); any GPU failure falls back to
    /// the CPU backend transparently.
    ///
    /// #### Parameters
    /// - `width`: Producer width in pixels (0 falls back to the default source size).
    /// - `height`: Producer height in pixels (0 falls back to the default source size).
    ///
    /// ### 中文
    /// 创建纹理会话；若已存在则返回已有 id。
    ///
    /// 优先尝试 GPU 后端（除非请求了 CPU）；任何 GPU 失败都会透明回退到 CPU 后端。
    ///
    /// #### 参数
    /// - `width`：生产者宽度（像素；0 时使用默认源尺寸）。
    /// - `height`：生产者高度（像素；0 时使用默认源尺寸）。
    pub fn create(&self, width: u32, height: u32) -> Result<TextureId, BridgeError> {
        let _lifecycle = self.lifecycle.lock();
        self.create_locked(PhysicalSize::new(width, height))
    }

    fn create_locked(&self, size: PhysicalSize<u32>) -> Result<TextureId, BridgeError> {
        if let Some(id) = self.session.lock().as_ref().map(|session| session.texture_id) {
            return Ok(id);
        }
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(BridgeError::CreateFailed("bridge is shutting down".to_string()));
        }
        let registrar = self.registrar.clone().ok_or(BridgeError::NoRegistrar)?;

        let source = self.config.sanitize_source(size);
        let notifier = FrameNotifier::new(
            registrar.clone(),
            self.dispatcher.clone(),
            self.stats.clone(),
        );
        let started = self.start_backend(&notifier, source)?;
        let kind = started.variant.kind();
        let variant = Arc::new(started.variant);

        let texture_id = match registrar.register_texture(variant.clone()) {
            Ok(id) => id,
            Err(err) => {
                let mut worker = started.worker;
                worker.stop();
                variant.release();
                return Err(BridgeError::RegisterFailed(err));
            }
        };
        notifier.set_texture_id(texture_id);

        if let TextureVariant::Gpu { export, .. } = variant.as_ref() {
            let token = export.device_token();
            if let (true, Some(token)) = (self.overlay.is_enabled(), token) {
                if let Err(err) = self.overlay.build(token) {
                    tracing::warn!(%err, "native overlay unavailable for the new session");
                }
            }
        } else if !self.producer.set_color_format(ChannelOrder::Rgba)
            && self.config.producer_channel_order != ChannelOrder::Rgba
        {
            tracing::warn!("producer cannot switch to RGBA; CPU frames keep the producer order");
        }

        *self.session.lock() = Some(Session {
            texture_id,
            source,
            variant,
            registrar,
            notifier,
            worker: started.worker,
        });

        let mailbox = started.mailbox;
        let shutting_down = self.shutting_down.clone();
        let stats = self.stats.clone();
        self.producer
            .set_frame_ready_callback(Some(Box::new(move |frame| {
                if shutting_down.load(Ordering::Acquire) {
                    return;
                }
                if mailbox.post(frame) {
                    stats.posted();
                }
            })));
        self.producer.start();

        tracing::info!(
            texture_id,
            backend = ?kind,
            width = source.width,
            height = source.height,
            "texture session created"
        );
        Ok(texture_id)
    }

    fn worker_context(&self, notifier: &FrameNotifier) -> WorkerContext {
        WorkerContext {
            mailbox: Arc::new(Mailbox::new()),
            producer: self.producer.clone(),
            notifier: notifier.clone(),
            stats: self.stats.clone(),
            output_resize: self.output_resize.clone(),
            overlay: self.overlay.clone(),
            dispatcher: self.dispatcher.clone(),
            video_filter: self.video_filter.clone(),
        }
    }

    fn start_backend(
        &self,
        notifier: &FrameNotifier,
        source: PhysicalSize<u32>,
    ) -> Result<StartedBackend, BridgeError> {
        if self.use_gpu.load(Ordering::Acquire) {
            if let Some(make_backend) = self.gpu.clone() {
                let ctx = self.worker_context(notifier);
                let mailbox = ctx.mailbox.clone();
                let config = SurfaceConfig {
                    source,
                    output: *self.present_size.lock(),
                    producer_order: self.config.producer_channel_order,
                    filter: *self.video_filter.lock(),
                    retire_after: self.config.retire_after,
                };
                match PresentWorker::spawn_gpu(
                    ctx,
                    make_backend,
                    config,
                    self.config.worker_init_timeout,
                ) {
                    Ok((worker, backend)) => {
                        let export = backend.lock().export();
                        return Ok(StartedBackend {
                            worker,
                            mailbox,
                            variant: TextureVariant::Gpu { export, backend },
                        });
                    }
                    Err(err) => {
                        tracing::warn!(%err, "GPU backend unavailable; falling back to CPU");
                    }
                }
            }
        }

        let surface = Arc::new(CpuSurface::new(source).map_err(BridgeError::from)?);
        let ctx = self.worker_context(notifier);
        let mailbox = ctx.mailbox.clone();
        let worker =
            PresentWorker::spawn_cpu(ctx, surface.clone()).map_err(BridgeError::CreateFailed)?;
        Ok(StartedBackend {
            worker,
            mailbox,
            variant: TextureVariant::Cpu(surface),
        })
    }

    /// ### English
    /// Disposes the active session (no-op without one).
    ///
    /// Order: producer callback unhook, worker stop/join, compositor unregistration with a
    /// keep-alive of the texture, backend release once unregistration completes.
    ///
    /// ### 中文
    /// 销毁活动会话（无会话时为空操作）。
    ///
    /// 顺序：解除生产者回调、停止并 join worker、带纹理保活引用的合成器反注册、反注册完成后释放后端。
    pub fn dispose(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.dispose_locked();
    }

    fn dispose_locked(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        let Session {
            texture_id,
            variant,
            registrar,
            notifier,
            mut worker,
            ..
        } = session;

        self.producer.set_frame_ready_callback(None);
        worker.stop();
        if variant.kind() == BackendKind::Gpu {
            self.overlay.teardown();
        }

        notifier.set_texture_id(NO_TEXTURE);
        let keep_alive = variant;
        registrar.unregister_texture(
            texture_id,
            Box::new(move || {
                keep_alive.release();
                drop(keep_alive);
            }),
        );
        tracing::info!(texture_id, "texture session disposed");
    }

    /// ### English
    /// Switches between the GPU and CPU backends. Returns the new id when a session was rebuilt;
    /// `None` when already in the requested mode or without a session (the preference is kept).
    ///
    /// ### 中文
    /// 在 GPU 与 CPU 后端之间切换。会话重建时返回新 id；已处于请求模式或无会话时返回 `None`（偏好会被保留）。
    pub fn set_backend(&self, use_gpu: bool) -> Result<Option<TextureId>, BridgeError> {
        let _lifecycle = self.lifecycle.lock();
        let previous = self.use_gpu.swap(use_gpu, Ordering::AcqRel);

        if previous == use_gpu {
            return Ok(None);
        }
        let source = self.session.lock().as_ref().map(|session| session.source);
        let Some(source) = source else {
            return Ok(None);
        };

        tracing::info!(use_gpu, "switching texture backend");
        self.overlay.teardown();
        self.dispose_locked();
        self.create_locked(source).map(Some)
    }

    /// ### English
    /// Requests a new presentation size; applied by the worker after the debounce period.
    ///
    /// ### 中文
    /// 请求新的呈现尺寸；worker 在防抖期之后应用。
    pub fn set_present_buffer_size(&self, width: u32, height: u32) -> Result<(), BridgeError> {
        if width == 0 || height == 0 {
            return Err(BridgeError::BadArgs(format!(
                "present buffer size must be non-zero, got {width}x{height}"
            )));
        }
        let size = PhysicalSize::new(width, height);
        *self.present_size.lock() = size;
        self.output_resize.request(size, Instant::now());
        Ok(())
    }

    fn current_export(&self) -> Option<Arc<GpuExport>> {
        self.session.lock().as_ref().and_then(Session::export)
    }

    /// ### English
    /// Enables or disables the native overlay. Must be called on the window-owning thread.
    ///
    /// ### 中文
    /// 启用或禁用原生 overlay。必须在窗口所属线程调用。
    pub fn set_native_overlay(
        &self,
        enabled: bool,
        rect: Option<OverlayRect>,
    ) -> Result<(), BridgeError> {
        if !enabled {
            self.overlay.disable();
            return Ok(());
        }
        if rect.is_some_and(|rect| rect.is_empty()) {
            return Err(BridgeError::BadArgs("overlay rect must be non-empty".to_string()));
        }

        let token = self
            .current_export()
            .and_then(|export| export.device_token());
        self.overlay
            .enable(token, rect)
            .map_err(|err| BridgeError::CreateFailed(err.to_string()))
    }

    /// ### English
    /// Moves/resizes the overlay. Must be called on the window-owning thread.
    ///
    /// ### 中文
    /// 移动/缩放 overlay。必须在窗口所属线程调用。
    pub fn update_overlay_rect(&self, rect: OverlayRect) -> Result<(), BridgeError> {
        if rect.is_empty() {
            return Err(BridgeError::BadArgs("overlay rect must be non-empty".to_string()));
        }
        self.overlay.update_rect(rect, Instant::now());
        Ok(())
    }

    pub fn set_video_filter(&self, filter: VideoFilter) {
        *self.video_filter.lock() = filter;
        self.overlay.set_filter(filter);
    }

    #[inline]
    pub fn video_filter(&self) -> VideoFilter {
        *self.video_filter.lock()
    }

    fn current_variant(&self) -> Option<Arc<TextureVariant>> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.variant.clone())
    }

    /// ### English
    /// Compositor pull (CPU backend): copies the committed front frame; `0` if none.
    ///
    /// ### 中文
    /// 合成器拉取（CPU 后端）：拷贝已提交的 front 帧；没有时返回 `0`。
    pub fn copy_pixels(&self, dst: &mut [u8], dst_pitch: usize, dst_height: u32) -> usize {
        self.current_variant()
            .map_or(0, |variant| variant.copy_pixels(dst, dst_pitch, dst_height))
    }

    /// ### English
    /// Compositor pull (GPU backend): the latest committed shared slot.
    ///
    /// ### 中文
    /// 合成器拉取（GPU 后端）：最近提交的共享槽位。
    pub fn gpu_surface(&self) -> Option<GpuSurfaceDescriptor> {
        self.current_variant()
            .and_then(|variant| variant.gpu_surface())
    }

    pub fn aux_create(&self, id: u32, width: u32, height: u32) -> Result<(), BridgeError> {
        self.aux
            .create(id, PhysicalSize::new(width, height))
            .map_err(BridgeError::from)
    }

    pub fn aux_update(&self, id: u32, rgba: &[u8]) -> bool {
        self.aux.update(id, rgba)
    }

    pub fn aux_copy(&self, id: u32, dst: &mut [u8], dst_pitch: usize) -> usize {
        self.aux.copy(id, dst, dst_pitch)
    }

    pub fn aux_destroy(&self, id: u32) -> bool {
        self.aux.destroy(id)
    }

    /// ### English
    /// Disposes the session and rejects further frames and sessions.
    ///
    /// ### 中文
    /// 销毁会话，并拒绝后续的帧与会话。
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let _lifecycle = self.lifecycle.lock();
        self.dispose_locked();
        self.overlay.disable();
        self.aux.clear();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
