//! ### English
//! Copy/present worker: one dedicated thread per session that drains the mailbox, copies the
//! latest frame out of the producer into the active surface, commits it, and schedules a
//! coalesced "frame available" notification.
//!
//! ### 中文
//! 拷贝/呈现 worker：每个会话一个独立线程，排空邮箱，将最新帧从生产者拷贝到当前表面、提交，
//! 并调度一次合并的“帧可用”通知。

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, bounded};
use parking_lot::Mutex;

use super::compositor::{FrameNotifier, PlatformDispatcher};
use super::config::{BYTES_PER_PIXEL, VideoFilter};
use super::debounce::DebouncedResize;
use super::error::{GpuError, SurfaceError};
use super::gpu::{BackendFactory, BoxedBackend, GpuExport, GpuSurfaceDescriptor, SurfaceConfig};
use super::mailbox::{Mailbox, PendingFrame};
use super::overlay::OverlayState;
use super::producer::FrameProducer;
use super::stats::StatsCounters;
use super::surface::CpuSurface;

/// ### English
/// Everything the worker shares with the controller.
///
/// ### 中文
/// worker 与控制器共享的全部状态。
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) mailbox: Arc<Mailbox>,
    pub(crate) producer: Arc<dyn FrameProducer>,
    pub(crate) notifier: FrameNotifier,
    pub(crate) stats: Arc<StatsCounters>,
    /// ### English
    /// Debounced presentation-size requests (GPU path only).
    ///
    /// ### 中文
    /// 防抖后的呈现尺寸请求（仅 GPU 路径）。
    pub(crate) output_resize: Arc<DebouncedResize>,
    pub(crate) overlay: Arc<OverlayState>,
    pub(crate) dispatcher: Arc<dyn PlatformDispatcher>,
    /// ### English
    /// Filter requested by the controller; applied by the worker before each GPU commit so
    /// callers never wait on the backend lock.
    ///
    /// ### 中文
    /// 控制器请求的过滤方式；worker 在每次 GPU 提交前应用，调用方从不等待后端锁。
    pub(crate) video_filter: Arc<Mutex<VideoFilter>>,
}

enum Target {
    Cpu(Arc<CpuSurface>),
    Gpu {
        backend: Arc<Mutex<BoxedBackend>>,
        export: Arc<GpuExport>,
    },
}

/// ### English
/// Handle of a running worker thread. Dropping it stops and joins the thread.
///
/// ### 中文
/// 运行中 worker 线程的句柄。drop 时会停止并 join 该线程。
pub(crate) struct PresentWorker {
    mailbox: Arc<Mailbox>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PresentWorker {
    /// ### English
    /// Starts a worker presenting into a CPU double buffer.
    ///
    /// ### 中文
    /// 启动一个向 CPU 双缓冲呈现的 worker。
    pub(crate) fn spawn_cpu(ctx: WorkerContext, surface: Arc<CpuSurface>) -> Result<Self, String> {
        let mailbox = ctx.mailbox.clone();
        let stats = ctx.stats.clone();
        let thread = thread::Builder::new()
            .name("frame-bridge-present".to_string())
            .spawn(move || {
                let _alive = stats.worker_alive();
                run(ctx, Target::Cpu(surface));
            })
            .map_err(|err| format!("Failed to spawn present worker: {err}"))?;
        Ok(Self {
            mailbox,
            thread: Some(thread),
        })
    }

    /// ### English
    /// Starts a worker that creates its GPU backend on its own thread, and waits for that
    /// initialization to finish (or time out).
    ///
    /// #### Parameters
    /// - `ctx`: Shared worker state.
    /// - `make_backend`: Backend constructor, run on the worker thread.
    /// - `config`: Initial surface configuration.
    /// - `timeout`: Upper bound for the initialization handshake.
    ///
    /// ### 中文
    /// 启动一个在自身线程上创建 GPU 后端的 worker，并等待初始化完成（或超时）。
    ///
    /// #### 参数
    /// - `ctx`：共享的 worker 状态。
    /// - `make_backend`：后端构造函数，在 worker 线程上执行。
    /// - `config`：初始表面配置。
    /// - `timeout`：初始化握手的最长等待时间。
    pub(crate) fn spawn_gpu(
        ctx: WorkerContext,
        make_backend: BackendFactory,
        config: SurfaceConfig,
        timeout: Duration,
    ) -> Result<(Self, Arc<Mutex<BoxedBackend>>), String> {
        let mailbox = ctx.mailbox.clone();
        let (init_tx, init_rx) = bounded::<Result<Arc<Mutex<BoxedBackend>>, String>>(1);

        let thread = thread::Builder::new()
            .name("frame-bridge-present".to_string())
            .spawn(move || {
                let stats = ctx.stats.clone();
                let _alive = stats.worker_alive();
                let backend = match init_backend(&ctx, &make_backend, config) {
                    Ok(backend) => Arc::new(Mutex::new(backend)),
                    Err(err) => {
                        let _ = init_tx.send(Err(err.to_string()));
                        return;
                    }
                };
                if init_tx.send(Ok(backend.clone())).is_err() {
                    backend.lock().release_thread();
                    return;
                }
                let export = backend.lock().export();
                run(ctx, Target::Gpu { backend, export });
            })
            .map_err(|err| format!("Failed to spawn present worker: {err}"))?;

        let mut worker = Self {
            mailbox,
            thread: Some(thread),
        };
        match init_rx.recv_timeout(timeout) {
            Ok(Ok(backend)) => Ok((worker, backend)),
            Ok(Err(err)) => {
                worker.stop();
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => {
                worker.detach();
                Err("Timed out initializing GPU backend".to_string())
            }
            Err(RecvTimeoutError::Disconnected) => {
                worker.detach();
                Err("GPU backend initialization aborted".to_string())
            }
        }
    }

    /// ### English
    /// Signals stop and lets the thread finish on its own. Used when initialization is stuck:
    /// once it returns, the failed handshake send makes the thread release its backend and exit.
    ///
    /// ### 中文
    /// 发出停止信号并让线程自行结束。用于初始化卡住的情况：初始化返回后，握手发送失败会使线程
    /// 释放其后端并退出。
    fn detach(&mut self) {
        self.mailbox.stop();
        if self.thread.take().is_some() {
            tracing::warn!("present worker detached during GPU initialization");
        }
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// ### English
    /// Signals stop and joins the thread. An in-flight partial frame is abandoned.
    ///
    /// ### 中文
    /// 发出停止信号并 join 线程。进行中的不完整帧会被放弃。
    pub(crate) fn stop(&mut self) {
        self.mailbox.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("present worker panicked");
            }
        }
    }
}

impl Drop for PresentWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// ### English
/// Creates the backend and matches the producer's channel order to the device's native order
/// when the producer can switch, so no swizzle pass is needed.
///
/// ### 中文
/// 创建后端；若生产者支持切换通道顺序，则将其匹配为设备原生顺序，从而无需通道交换 pass。
fn init_backend(
    ctx: &WorkerContext,
    make_backend: &BackendFactory,
    config: SurfaceConfig,
) -> Result<BoxedBackend, GpuError> {
    let mut backend = make_backend(config)?;
    let native = backend.native_order();
    if native != config.producer_order && ctx.producer.set_color_format(native) {
        backend.set_producer_order(native)?;
    }
    Ok(backend)
}

fn run(ctx: WorkerContext, target: Target) {
    tracing::debug!("present worker started");

    while let Some(frame) = ctx.mailbox.take_latest() {
        /*
        ### English
        Late or malformed frames are dropped silently.

        ### 中文
        迟到或无效的帧直接静默丢弃。
        */
        if frame.is_empty() {
            ctx.stats.skipped();
            continue;
        }

        let committed = match &target {
            Target::Cpu(surface) => present_cpu(&ctx, surface, frame),
            Target::Gpu { backend, export } => present_gpu(&ctx, backend, export, frame),
        };

        if committed {
            ctx.stats.committed();
            ctx.notifier.request();
        } else {
            ctx.stats.skipped();
        }
    }

    if let Target::Gpu { backend, .. } = &target {
        backend.lock().release_thread();
    }
    tracing::debug!("present worker stopped");
}

fn present_cpu(ctx: &WorkerContext, surface: &CpuSurface, frame: PendingFrame) -> bool {
    let size = frame.size;
    if surface.source_size() != size {
        if let Err(err) = surface.resize(size) {
            tracing::warn!(
                width = size.width,
                height = size.height,
                %err,
                "cpu surface resize failed"
            );
            return false;
        }
    }

    let stride = size.width as usize * BYTES_PER_PIXEL;
    let mut write = match surface.begin_write(size, stride) {
        Ok(write) => write,
        Err(SurfaceError::Busy) => {
            tracing::trace!("back plane held by a reader; frame skipped");
            return false;
        }
        Err(err) => {
            tracing::warn!(%err, "cpu surface write rejected; frame skipped");
            return false;
        }
    };

    let written = ctx
        .producer
        .copy_frame(frame.buffer_index, write.bytes_mut(), stride, size.height);

    if written == 0 || ctx.mailbox.is_stopped() {
        return false;
    }
    let index = write.commit();
    tracing::trace!(slot = index, buffer = frame.buffer_index, "cpu frame committed");
    true
}

fn present_gpu(
    ctx: &WorkerContext,
    backend: &Mutex<BoxedBackend>,
    export: &Arc<GpuExport>,
    frame: PendingFrame,
) -> bool {
    let now = Instant::now();
    let filter = *ctx.video_filter.lock();
    let mut guard = backend.lock();
    guard.set_video_filter(filter);

    if let Some(size) = ctx.output_resize.take_ready(now) {
        if let Err(err) = guard.resize_output(size) {
            tracing::warn!(width = size.width, height = size.height, %err, "output resize failed");
        }
    }
    if guard.source_size() != frame.size {
        if let Err(err) = guard.resize_source(frame.size) {
            tracing::warn!(
                width = frame.size.width,
                height = frame.size.height,
                %err,
                "source resize failed; frame skipped"
            );
            return false;
        }
    }

    let written = match guard.map_write() {
        Ok(mut mapped) => {
            let pitch = mapped.pitch();
            let height = mapped.size().height;
            ctx.producer
                .copy_frame(frame.buffer_index, mapped.bytes_mut(), pitch, height)
        }
        Err(GpuError::Busy) => {
            tracing::trace!("write slot busy; frame skipped");
            return false;
        }
        Err(err) => {
            tracing::warn!(%err, "map failed; frame skipped");
            return false;
        }
    };

    if written == 0 || ctx.mailbox.is_stopped() {
        guard.abort_write();
        return false;
    }
    if let Err(err) = guard.commit() {
        tracing::warn!(%err, "commit failed; frame skipped");
        return false;
    }
    let descriptor = guard.export_handle();
    drop(guard);

    if let Some(descriptor) = descriptor {
        present_overlay(ctx, export, &descriptor, now);
    }
    true
}

fn present_overlay(
    ctx: &WorkerContext,
    export: &Arc<GpuExport>,
    descriptor: &GpuSurfaceDescriptor,
    now: Instant,
) {
    match ctx.overlay.present(descriptor, now) {
        Ok(_) => {}
        Err(GpuError::StaleOverlay) => {
            if !ctx.overlay.request_rebuild() {
                return;
            }
            tracing::info!(
                generation = descriptor.token.generation,
                "overlay bound to a stale device; scheduling rebuild"
            );
            let overlay = ctx.overlay.clone();
            let export = export.clone();
            ctx.dispatcher.dispatch(Box::new(move || {
                let token = export.device_token();
                overlay.teardown();
                if let Some(token) = token {
                    if let Err(err) = overlay.build(token) {
                        tracing::warn!(%err, "overlay rebuild failed");
                    }
                }
            }));
        }
        Err(err) => tracing::warn!(%err, "overlay present failed"),
    }
}
