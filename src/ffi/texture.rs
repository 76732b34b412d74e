//! ### English
//! C ABI bindings for the texture session (create/dispose/resize/backend/overlay/filter) and the
//! compositor pull API.
//!
//! ### 中文
//! 纹理会话（create/dispose/resize/后端/overlay/过滤）与合成器拉取 API 的 C ABI 绑定。

use super::host::FrameBridgeTexture;
use super::{FrameBridge, FrameBridgeGpuSurface, FrameBridgeStatus, status_of};
use crate::engine::{BackendKind, GpuSurfaceDescriptor, OverlayRect, VideoFilter};

/// ### English
/// Borrows the bridge behind a possibly-NULL handle.
///
/// ### 中文
/// 借用可能为 NULL 的句柄背后的帧桥。
unsafe fn bridge_ref<'a>(bridge: *mut FrameBridge) -> Option<&'a FrameBridge> {
    unsafe { bridge.as_ref() }
}

fn write_surface(out: *mut FrameBridgeGpuSurface, surface: Option<GpuSurfaceDescriptor>) -> bool {
    match surface {
        Some(surface) if !out.is_null() => {
            unsafe { *out = surface.into() };
            true
        }
        _ => false,
    }
}

/// ### English
/// Views a host buffer as a mutable byte slice; `None` for NULL or empty buffers.
///
/// ### 中文
/// 将宿主缓冲区视为可变字节切片；NULL 或空缓冲区返回 `None`。
unsafe fn host_buffer<'a>(dst: *mut u8, len: usize) -> Option<&'a mut [u8]> {
    if dst.is_null() || len == 0 {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts_mut(dst, len) })
}

#[unsafe(no_mangle)]
/// ### English
/// Creates the texture session (idempotent). Zero sizes fall back to the default source size.
///
/// On success writes the texture id into `out_texture_id`.
///
/// ### 中文
/// 创建纹理会话（幂等）。尺寸为 0 时回退到默认源尺寸。
///
/// 成功时将纹理 id 写入 `out_texture_id`。
pub unsafe extern "C" fn frame_bridge_texture_create(
    bridge: *mut FrameBridge,
    width: u32,
    height: u32,
    out_texture_id: *mut i64,
) -> FrameBridgeStatus {
    let Some(bridge) = (unsafe { bridge_ref(bridge) }) else {
        return FrameBridgeStatus::NullHandle;
    };
    match bridge.controller.create(width, height) {
        Ok(id) => {
            if !out_texture_id.is_null() {
                unsafe { *out_texture_id = id };
            }
            FrameBridgeStatus::Ok
        }
        Err(err) => status_of("texture_create", Err(err)),
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Disposes the texture session; no-op without a session.
///
/// ### 中文
/// 销毁纹理会话；无会话时为 no-op。
pub unsafe extern "C" fn frame_bridge_texture_dispose(bridge: *mut FrameBridge) {
    if let Some(bridge) = unsafe { bridge_ref(bridge) } {
        bridge.controller.dispose();
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Returns the active texture id, or `-1` without a session.
///
/// ### 中文
/// 返回活动纹理 id；无会话时返回 `-1`。
pub unsafe extern "C" fn frame_bridge_texture_id(bridge: *mut FrameBridge) -> i64 {
    unsafe { bridge_ref(bridge) }.map_or(-1, |bridge| bridge.controller.texture_id())
}

#[unsafe(no_mangle)]
/// ### English
/// Requests a new presentation size (GPU backend); applied after the debounce period.
///
/// ### 中文
/// 请求新的呈现尺寸（GPU 后端）；在防抖期后应用。
pub unsafe extern "C" fn frame_bridge_set_present_buffer_size(
    bridge: *mut FrameBridge,
    width: u32,
    height: u32,
) -> FrameBridgeStatus {
    let Some(bridge) = (unsafe { bridge_ref(bridge) }) else {
        return FrameBridgeStatus::NullHandle;
    };
    status_of(
        "set_present_buffer_size",
        bridge.controller.set_present_buffer_size(width, height),
    )
}

#[unsafe(no_mangle)]
/// ### English
/// Switches between the GPU and CPU backends.
///
/// `out_texture_id` receives the new id when the session was rebuilt, or `-1` when nothing
/// changed (already in that mode, or no session).
///
/// ### 中文
/// 在 GPU 与 CPU 后端之间切换。
///
/// 会话被重建时 `out_texture_id` 写入新 id；无变化（已处于该模式或无会话）时写入 `-1`。
pub unsafe extern "C" fn frame_bridge_set_backend(
    bridge: *mut FrameBridge,
    use_gpu: bool,
    out_texture_id: *mut i64,
) -> FrameBridgeStatus {
    let Some(bridge) = (unsafe { bridge_ref(bridge) }) else {
        return FrameBridgeStatus::NullHandle;
    };
    match bridge.controller.set_backend(use_gpu) {
        Ok(id) => {
            if !out_texture_id.is_null() {
                unsafe { *out_texture_id = id.unwrap_or(-1) };
            }
            FrameBridgeStatus::Ok
        }
        Err(err) => status_of("set_backend", Err(err)),
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `1` for a GPU session, `0` for a CPU session, `-1` without a session.
///
/// ### 中文
/// GPU 会话返回 `1`，CPU 会话返回 `0`，无会话返回 `-1`。
pub unsafe extern "C" fn frame_bridge_backend_kind(bridge: *mut FrameBridge) -> i32 {
    match unsafe { bridge_ref(bridge) }.and_then(|bridge| bridge.controller.backend_kind()) {
        Some(BackendKind::Gpu) => 1,
        Some(BackendKind::Cpu) => 0,
        None => -1,
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Enables/disables the native overlay. Call on the window-owning thread.
///
/// When `has_rect` is `false` the previous rectangle is kept.
///
/// ### 中文
/// 启用/禁用原生 overlay。需在窗口所属线程调用。
///
/// `has_rect` 为 `false` 时沿用之前的矩形。
pub unsafe extern "C" fn frame_bridge_set_native_overlay(
    bridge: *mut FrameBridge,
    enabled: bool,
    has_rect: bool,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
) -> FrameBridgeStatus {
    let Some(bridge) = (unsafe { bridge_ref(bridge) }) else {
        return FrameBridgeStatus::NullHandle;
    };
    let rect = has_rect.then(|| OverlayRect::new(x, y, width, height));
    status_of(
        "set_native_overlay",
        bridge.controller.set_native_overlay(enabled, rect),
    )
}

#[unsafe(no_mangle)]
/// ### English
/// Moves/resizes the native overlay. Call on the window-owning thread.
///
/// ### 中文
/// 移动/缩放原生 overlay。需在窗口所属线程调用。
pub unsafe extern "C" fn frame_bridge_update_overlay_rect(
    bridge: *mut FrameBridge,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
) -> FrameBridgeStatus {
    let Some(bridge) = (unsafe { bridge_ref(bridge) }) else {
        return FrameBridgeStatus::NullHandle;
    };
    status_of(
        "update_overlay_rect",
        bridge
            .controller
            .update_overlay_rect(OverlayRect::new(x, y, width, height)),
    )
}

#[unsafe(no_mangle)]
/// ### English
/// Sets the scaling filter: `0` = linear, `1` = point.
///
/// ### 中文
/// 设置缩放过滤方式：`0` = 线性，`1` = 点采样。
pub unsafe extern "C" fn frame_bridge_set_video_filter(
    bridge: *mut FrameBridge,
    filter: i32,
) -> FrameBridgeStatus {
    let Some(bridge) = (unsafe { bridge_ref(bridge) }) else {
        return FrameBridgeStatus::NullHandle;
    };
    match VideoFilter::from_code(i64::from(filter)) {
        Some(filter) => {
            bridge.controller.set_video_filter(filter);
            FrameBridgeStatus::Ok
        }
        None => FrameBridgeStatus::BadArgs,
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Copies the committed CPU frame of the active session into `dst` (RGBA rows of `dst_pitch`
/// bytes). Returns the number of bytes written; `0` for GPU sessions or before the first frame.
///
/// ### 中文
/// 将活动会话已提交的 CPU 帧拷贝到 `dst`（每行 `dst_pitch` 字节的 RGBA）。
/// 返回写入的字节数；GPU 会话或首帧之前返回 `0`。
pub unsafe extern "C" fn frame_bridge_copy_pixels(
    bridge: *mut FrameBridge,
    dst: *mut u8,
    dst_len: usize,
    dst_pitch: usize,
    dst_height: u32,
) -> usize {
    let (Some(bridge), Some(dst)) = (unsafe { bridge_ref(bridge) }, unsafe {
        host_buffer(dst, dst_len)
    }) else {
        return 0;
    };
    bridge.controller.copy_pixels(dst, dst_pitch, dst_height)
}

#[unsafe(no_mangle)]
/// ### English
/// Writes the latest committed GPU slot of the active session into `out`.
/// Returns `false` for CPU sessions or before the first commit.
///
/// ### 中文
/// 将活动会话最近提交的 GPU 槽位写入 `out`。
/// CPU 会话或首次提交前返回 `false`。
pub unsafe extern "C" fn frame_bridge_gpu_surface(
    bridge: *mut FrameBridge,
    out: *mut FrameBridgeGpuSurface,
) -> bool {
    let Some(bridge) = (unsafe { bridge_ref(bridge) }) else {
        return false;
    };
    write_surface(out, bridge.controller.gpu_surface())
}

#[unsafe(no_mangle)]
/// ### English
/// Same as `frame_bridge_copy_pixels`, for a registered texture handle (valid until its
/// unregistration `done` callback has run).
///
/// ### 中文
/// 与 `frame_bridge_copy_pixels` 相同，但作用于已注册的纹理句柄（在其反注册 `done` 回调执行前有效）。
pub unsafe extern "C" fn frame_bridge_texture_copy_pixels(
    texture: *const FrameBridgeTexture,
    dst: *mut u8,
    dst_len: usize,
    dst_pitch: usize,
    dst_height: u32,
) -> usize {
    let (Some(texture), Some(dst)) = (unsafe { texture.as_ref() }, unsafe {
        host_buffer(dst, dst_len)
    }) else {
        return 0;
    };
    texture.variant.copy_pixels(dst, dst_pitch, dst_height)
}

#[unsafe(no_mangle)]
/// ### English
/// Same as `frame_bridge_gpu_surface`, for a registered texture handle.
///
/// ### 中文
/// 与 `frame_bridge_gpu_surface` 相同，但作用于已注册的纹理句柄。
pub unsafe extern "C" fn frame_bridge_texture_gpu_surface(
    texture: *const FrameBridgeTexture,
    out: *mut FrameBridgeGpuSurface,
) -> bool {
    let Some(texture) = (unsafe { texture.as_ref() }) else {
        return false;
    };
    write_surface(out, texture.variant.gpu_surface())
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `1` for a GPU texture handle, `0` for a CPU one, `-1` for NULL.
///
/// ### 中文
/// GPU 纹理句柄返回 `1`，CPU 返回 `0`，NULL 返回 `-1`。
pub unsafe extern "C" fn frame_bridge_texture_kind(texture: *const FrameBridgeTexture) -> i32 {
    match unsafe { texture.as_ref() }.map(|texture| texture.variant.kind()) {
        Some(BackendKind::Gpu) => 1,
        Some(BackendKind::Cpu) => 0,
        None => -1,
    }
}
