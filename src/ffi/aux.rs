//! ### English
//! C ABI bindings for auxiliary RGBA textures (debug viewers).
//!
//! ### 中文
//! 辅助 RGBA 纹理（调试查看器）的 C ABI 绑定。

use super::{FrameBridge, FrameBridgeStatus, status_of};

#[unsafe(no_mangle)]
/// ### English
/// Creates (or replaces) auxiliary texture `id`.
///
/// ### 中文
/// 创建（或替换）辅助纹理 `id`。
pub unsafe extern "C" fn frame_bridge_aux_create(
    bridge: *mut FrameBridge,
    id: u32,
    width: u32,
    height: u32,
) -> FrameBridgeStatus {
    let Some(bridge) = (unsafe { bridge.as_ref() }) else {
        return FrameBridgeStatus::NullHandle;
    };
    status_of("aux_create", bridge.controller.aux_create(id, width, height))
}

#[unsafe(no_mangle)]
/// ### English
/// Uploads a tightly packed RGBA frame into auxiliary texture `id`.
///
/// ### 中文
/// 将紧密排列的 RGBA 帧上传到辅助纹理 `id`。
pub unsafe extern "C" fn frame_bridge_aux_update(
    bridge: *mut FrameBridge,
    id: u32,
    rgba: *const u8,
    len: usize,
) -> bool {
    let Some(bridge) = (unsafe { bridge.as_ref() }) else {
        return false;
    };
    if rgba.is_null() || len == 0 {
        return false;
    }
    let rgba = unsafe { std::slice::from_raw_parts(rgba, len) };
    bridge.controller.aux_update(id, rgba)
}

#[unsafe(no_mangle)]
/// ### English
/// Copies auxiliary texture `id` into `dst`; returns the number of bytes written.
///
/// ### 中文
/// 将辅助纹理 `id` 拷贝到 `dst`；返回写入的字节数。
pub unsafe extern "C" fn frame_bridge_aux_copy(
    bridge: *mut FrameBridge,
    id: u32,
    dst: *mut u8,
    dst_len: usize,
    dst_pitch: usize,
) -> usize {
    let Some(bridge) = (unsafe { bridge.as_ref() }) else {
        return 0;
    };
    if dst.is_null() || dst_len == 0 {
        return 0;
    }
    let dst = unsafe { std::slice::from_raw_parts_mut(dst, dst_len) };
    bridge.controller.aux_copy(id, dst, dst_pitch)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn frame_bridge_aux_destroy(bridge: *mut FrameBridge, id: u32) -> bool {
    let Some(bridge) = (unsafe { bridge.as_ref() }) else {
        return false;
    };
    bridge.controller.aux_destroy(id)
}
