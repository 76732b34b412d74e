//! ### English
//! Host compositor contract: texture registration, frame-available notification, and the
//! platform task queue notifications are marshaled onto.
//!
//! ### 中文
//! 宿主合成器契约：纹理注册、帧可用通知，以及通知所投递到的平台任务队列。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use super::gpu::{BoxedBackend, GpuExport, GpuSurfaceDescriptor};
use super::stats::StatsCounters;
use super::surface::CpuSurface;

/// ### English
/// Compositor texture id; `-1` means "no texture".
///
/// ### 中文
/// 合成器纹理 id；`-1` 表示“无纹理”。
pub type TextureId = i64;

pub const NO_TEXTURE: TextureId = -1;

/// ### English
/// Task executed on the platform (compositor) thread.
///
/// ### 中文
/// 在平台（合成器）线程上执行的任务。
pub type PlatformTask = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    Gpu,
}

/// ### English
/// Texture resource handed to the registrar. Kept alive by reference count until the
/// asynchronous unregistration completes.
///
/// ### 中文
/// 交给注册器的纹理资源。通过引用计数保持存活，直到异步反注册完成。
pub enum TextureVariant {
    Cpu(Arc<CpuSurface>),
    Gpu {
        export: Arc<GpuExport>,
        backend: Arc<Mutex<BoxedBackend>>,
    },
}

impl TextureVariant {
    #[inline]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Cpu(_) => BackendKind::Cpu,
            Self::Gpu { .. } => BackendKind::Gpu,
        }
    }

    /// ### English
    /// Copies the committed CPU front plane into `dst`; `0` for GPU textures or before the first commit.
    ///
    /// ### 中文
    /// 将已提交的 CPU front 平面拷贝到 `dst`；GPU 纹理或首次提交前返回 `0`。
    pub fn copy_pixels(&self, dst: &mut [u8], dst_pitch: usize, dst_height: u32) -> usize {
        match self {
            Self::Cpu(surface) => surface.copy_front_to(dst, dst_pitch, dst_height),
            Self::Gpu { .. } => 0,
        }
    }

    /// ### English
    /// Latest committed shared slot; `None` for CPU textures or before the first commit.
    ///
    /// ### 中文
    /// 最近提交的共享槽位；CPU 纹理或首次提交前返回 `None`。
    pub fn gpu_surface(&self) -> Option<GpuSurfaceDescriptor> {
        match self {
            Self::Cpu(_) => None,
            Self::Gpu { export, .. } => export.current(),
        }
    }

    /// ### English
    /// Releases backend resources. Called once the compositor no longer references the texture.
    ///
    /// ### 中文
    /// 释放后端资源。在合成器不再引用该纹理后调用。
    pub(crate) fn release(&self) {
        if let Self::Gpu { backend, .. } = self {
            backend.lock().release();
        }
    }
}

/// ### English
/// Host texture registrar.
///
/// ### 中文
/// 宿主纹理注册器。
pub trait TextureRegistrar: Send + Sync {
    fn register_texture(&self, texture: Arc<TextureVariant>) -> Result<TextureId, String>;

    /// ### English
    /// Starts unregistering `id`. `on_done` runs later, once the compositor has dropped its
    /// last reference; it may run on any thread.
    ///
    /// ### 中文
    /// 开始反注册 `id`。`on_done` 稍后在合成器释放最后一个引用后执行；可能在任意线程上运行。
    fn unregister_texture(&self, id: TextureId, on_done: PlatformTask);

    /// ### English
    /// Must be called on the platform thread.
    ///
    /// ### 中文
    /// 必须在平台线程上调用。
    fn mark_frame_available(&self, id: TextureId);
}

/// ### English
/// Marshals tasks onto the platform thread.
///
/// ### 中文
/// 将任务投递到平台线程。
pub trait PlatformDispatcher: Send + Sync {
    fn dispatch(&self, task: PlatformTask);
}

/// ### English
/// Host-provided wake hook, invoked when the queue goes from empty to non-empty.
///
/// ### 中文
/// 宿主提供的唤醒钩子，在队列从空变为非空时调用。
pub type WakeCallback = Box<dyn Fn() + Send + Sync>;

/// ### English
/// Default dispatcher: an unbounded queue drained by the host via `pump`.
///
/// ### 中文
/// 默认调度器：由宿主通过 `pump` 排空的无界队列。
pub struct PlatformQueue {
    tx: Sender<PlatformTask>,
    rx: Receiver<PlatformTask>,
    wake_pending: AtomicBool,
    wake: Option<WakeCallback>,
}

impl PlatformQueue {
    pub fn new(wake: Option<WakeCallback>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            wake_pending: AtomicBool::new(false),
            wake,
        }
    }

    /// ### English
    /// Runs every queued task on the calling thread; returns how many ran.
    ///
    /// ### 中文
    /// 在调用线程上执行所有排队任务；返回执行的数量。
    pub fn pump(&self) -> usize {
        self.wake_pending.store(false, Ordering::Release);
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl PlatformDispatcher for PlatformQueue {
    fn dispatch(&self, task: PlatformTask) {
        if self.tx.send(task).is_err() {
            return;
        }
        if !self.wake_pending.swap(true, Ordering::AcqRel) {
            if let Some(wake) = self.wake.as_ref() {
                wake();
            }
        }
    }
}

struct NotifierState {
    registrar: Arc<dyn TextureRegistrar>,
    texture_id: AtomicI64,
    pending: AtomicBool,
    stats: Arc<StatsCounters>,
}

/// ### English
/// Coalesced "frame available" notifier for one session.
///
/// At most one notification is outstanding; requests while one is queued are dropped. The
/// pending flag is cleared before calling the registrar so a commit racing with delivery
/// schedules a fresh notification.
///
/// ### 中文
/// 单个会话的合并式“帧可用”通知器。
///
/// 最多只有一个未完成的通知；已排队时的请求会被丢弃。调用注册器前先清除 pending 标记，
/// 因此与投递竞争的提交会重新调度一次通知。
#[derive(Clone)]
pub struct FrameNotifier {
    state: Arc<NotifierState>,
    dispatcher: Arc<dyn PlatformDispatcher>,
}

impl FrameNotifier {
    pub(crate) fn new(
        registrar: Arc<dyn TextureRegistrar>,
        dispatcher: Arc<dyn PlatformDispatcher>,
        stats: Arc<StatsCounters>,
    ) -> Self {
        Self {
            state: Arc::new(NotifierState {
                registrar,
                texture_id: AtomicI64::new(NO_TEXTURE),
                pending: AtomicBool::new(false),
                stats,
            }),
            dispatcher,
        }
    }

    #[inline]
    pub fn texture_id(&self) -> TextureId {
        self.state.texture_id.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_texture_id(&self, id: TextureId) {
        self.state.texture_id.store(id, Ordering::Release);
    }

    /// ### English
    /// Requests a `mark_frame_available` on the platform thread. Returns `true` if a new
    /// notification was scheduled.
    ///
    /// ### 中文
    /// 请求在平台线程上调用 `mark_frame_available`。若调度了新的通知则返回 `true`。
    pub fn request(&self) -> bool {
        if self.texture_id() < 0 {
            return false;
        }
        if self.state.pending.swap(true, Ordering::AcqRel) {
            return false;
        }

        let state = self.state.clone();
        self.dispatcher.dispatch(Box::new(move || {
            state.pending.store(false, Ordering::Release);
            let id = state.texture_id.load(Ordering::Acquire);
            if id < 0 {
                return;
            }
            state.registrar.mark_frame_available(id);
            state.stats.notified();
        }));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeRegistrar;
    use std::sync::atomic::AtomicUsize;

    fn notifier(queue: &Arc<PlatformQueue>, registrar: &Arc<FakeRegistrar>) -> FrameNotifier {
        FrameNotifier::new(
            registrar.clone(),
            queue.clone(),
            Arc::new(StatsCounters::default()),
        )
    }

    #[test]
    fn notifications_coalesce_until_pumped() {
        let queue = Arc::new(PlatformQueue::new(None));
        let registrar = FakeRegistrar::new();
        let notifier = notifier(&queue, &registrar);
        notifier.set_texture_id(3);

        assert!(notifier.request());
        assert!(!notifier.request());
        assert!(!notifier.request());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pump(), 1);
        assert_eq!(registrar.notifications(3), 1);
        assert!(notifier.request());
    }

    #[test]
    fn inactive_texture_never_notifies() {
        let queue = Arc::new(PlatformQueue::new(None));
        let registrar = FakeRegistrar::new();
        let notifier = notifier(&queue, &registrar);
        assert!(!notifier.request());

        notifier.set_texture_id(5);
        assert!(notifier.request());
        notifier.set_texture_id(NO_TEXTURE);
        queue.pump();
        assert_eq!(registrar.notifications(5), 0);
    }

    #[test]
    fn wake_fires_once_per_empty_to_busy_transition() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let queue = PlatformQueue::new(Some(Box::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })));

        queue.dispatch(Box::new(|| {}));
        queue.dispatch(Box::new(|| {}));
        assert_eq!(wakes.load(Ordering::Relaxed), 1);
        assert_eq!(queue.pump(), 2);
        queue.dispatch(Box::new(|| {}));
        assert_eq!(wakes.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn cpu_variant_copies_front_plane() {
        let surface = Arc::new(CpuSurface::new(dpi::PhysicalSize::new(2, 1)).unwrap());
        let mut guard = surface.begin_write(dpi::PhysicalSize::new(2, 1), 8).unwrap();
        guard.bytes_mut().fill(9);
        guard.commit();

        let variant = TextureVariant::Cpu(surface);
        let mut dst = [0u8; 8];
        assert_eq!(variant.copy_pixels(&mut dst, 8, 1), 8);
        assert_eq!(dst, [9; 8]);
        assert_eq!(variant.gpu_surface(), None);
        assert_eq!(variant.kind(), BackendKind::Cpu);
    }
}
