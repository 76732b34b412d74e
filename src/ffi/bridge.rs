//! ### English
//! C ABI bindings for bridge lifecycle (create/destroy/pump/stats).
//!
//! ### 中文
//! 帧桥生命周期相关的 C ABI 绑定（create/destroy/pump/stats）。

use std::ffi::c_void;
use std::sync::Arc;

use super::FrameBridge;
use super::host::{
    FrameBridgeProducerApi, FrameBridgeRegistrarApi, HostProducer, HostRegistrar, wake_callback,
};
use crate::engine::{
    BridgeCollaborators, BridgeConfig, BridgeStats, FrameProducer, GlfwOverlayFactory,
    OverlayFactory, PlatformDispatcher, PlatformQueue, SessionController, TextureRegistrar,
    gl_backend_factory,
};

#[unsafe(no_mangle)]
/// ### English
/// Creates a bridge.
///
/// - `flags`: `FRAME_BRIDGE_FLAG_*` bitmask.
/// - `producer`: required producer table.
/// - `registrar`: optional texture registrar table; NULL makes texture creation fail with
///   `NoRegistrar`.
/// - `wake` / `wake_ctx`: optional callback invoked when platform work is queued; the host
///   should then call `frame_bridge_pump` on its platform thread.
/// - `glfw_host_window`: optional host `GLFWwindow*`; enables the GPU backend and the native
///   overlay (requires `frame_bridge_set_glfw_api`). NULL means CPU only.
///
/// Returns NULL if a required table entry is missing.
///
/// ### 中文
/// 创建帧桥。
///
/// - `flags`：`FRAME_BRIDGE_FLAG_*` 位掩码。
/// - `producer`：必需的生产者函数表。
/// - `registrar`：可选的纹理注册器函数表；为 NULL 时纹理创建以 `NoRegistrar` 失败。
/// - `wake` / `wake_ctx`：可选回调，在平台任务入队时调用；宿主随后应在平台线程调用 `frame_bridge_pump`。
/// - `glfw_host_window`：可选的宿主 `GLFWwindow*`；启用 GPU 后端与原生 overlay
///   （需要先调用 `frame_bridge_set_glfw_api`）。为 NULL 表示只用 CPU。
///
/// 缺少必需表项时返回 NULL。
pub unsafe extern "C" fn frame_bridge_create(
    flags: u32,
    producer: *const FrameBridgeProducerApi,
    registrar: *const FrameBridgeRegistrarApi,
    wake: Option<unsafe extern "C" fn(ctx: *mut c_void)>,
    wake_ctx: *mut c_void,
    glfw_host_window: *mut c_void,
) -> *mut FrameBridge {
    if producer.is_null() {
        return std::ptr::null_mut();
    }

    let producer = match HostProducer::new(unsafe { *producer }) {
        Ok(producer) => Arc::new(producer) as Arc<dyn FrameProducer>,
        Err(err) => {
            tracing::warn!(%err, "rejected producer table");
            return std::ptr::null_mut();
        }
    };

    let registrar = if registrar.is_null() {
        None
    } else {
        match HostRegistrar::new(unsafe { *registrar }) {
            Ok(registrar) => Some(Arc::new(registrar) as Arc<dyn TextureRegistrar>),
            Err(err) => {
                tracing::warn!(%err, "rejected registrar table");
                return std::ptr::null_mut();
            }
        }
    };

    let queue = Arc::new(PlatformQueue::new(wake_callback(wake, wake_ctx)));
    let host_window = glfw_host_window as usize;
    let (gpu, overlay) = if host_window == 0 {
        (None, None)
    } else {
        (
            Some(gl_backend_factory(host_window)),
            Some(Arc::new(GlfwOverlayFactory::new(host_window)) as Arc<dyn OverlayFactory>),
        )
    };

    let controller = SessionController::new(
        BridgeConfig::from_flags(flags),
        BridgeCollaborators {
            producer,
            registrar,
            dispatcher: queue.clone() as Arc<dyn PlatformDispatcher>,
            gpu,
            overlay,
        },
    );

    Box::into_raw(Box::new(FrameBridge { controller, queue }))
}

#[unsafe(no_mangle)]
/// ### English
/// Destroys a bridge created by `frame_bridge_create`.
///
/// Disposes the active session (unhook, join the worker, unregister) and drops late frames.
/// Textures still awaiting their unregistration `done` callback stay valid until it runs.
///
/// ### 中文
/// 销毁由 `frame_bridge_create` 创建的帧桥。
///
/// 销毁活动会话（解除回调、join worker、反注册）并丢弃迟到的帧。
/// 仍在等待反注册 `done` 回调的纹理在回调执行前保持有效。
pub unsafe extern "C" fn frame_bridge_destroy(bridge: *mut FrameBridge) {
    if bridge.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(bridge));
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Runs queued platform tasks (frame notifications, overlay rebuilds). Call on the platform thread.
///
/// Returns the number of tasks executed.
///
/// ### 中文
/// 执行排队的平台任务（帧通知、overlay 重建）。需在平台线程调用。
///
/// 返回执行的任务数量。
pub unsafe extern "C" fn frame_bridge_pump(bridge: *mut FrameBridge) -> u32 {
    if bridge.is_null() {
        return 0;
    }
    let ran = unsafe { (*bridge).queue.pump() };
    ran.min(u32::MAX as usize) as u32
}

#[unsafe(no_mangle)]
/// ### English
/// Writes the bridge counters into `out`. Returns `false` on NULL arguments.
///
/// ### 中文
/// 将帧桥计数器写入 `out`。参数为 NULL 时返回 `false`。
pub unsafe extern "C" fn frame_bridge_stats(
    bridge: *mut FrameBridge,
    out: *mut BridgeStats,
) -> bool {
    if bridge.is_null() || out.is_null() {
        return false;
    }
    unsafe { *out = (*bridge).controller.stats() };
    true
}
