//! ### English
//! Non-Windows placeholder implementation for the internal GLFW loader.
//!
//! ### 中文
//! 内部 GLFW loader 的非 Windows 占位实现。

use std::ffi::{CStr, c_void};

use super::SharedWindowKind;

/// ### English
/// Raw window pointer type used by this crate on non-Windows targets.
///
/// ### 中文
/// 本 crate 在非 Windows 目标上的 window 裸指针类型。
pub type GlfwWindowPtr = *mut c_void;

/// ### English
/// Placeholder GLFW loader for non-Windows builds; `load` always fails, so the GPU backend
/// falls back to the CPU path.
///
/// ### 中文
/// 非 Windows 构建的占位 GLFW loader；`load` 总是失败，因此 GPU 后端会回退到 CPU 路径。
#[derive(Clone, Copy)]
pub struct LoadedGlfwApi;

impl LoadedGlfwApi {
    pub fn load() -> Result<Self, String> {
        Err("GLFW loading is only implemented on Windows in this crate".to_string())
    }

    pub fn supports_overlay(&self) -> bool {
        false
    }

    pub unsafe fn make_current(&self, _window: GlfwWindowPtr) {}

    pub unsafe fn current_context(&self) -> Option<GlfwWindowPtr> {
        None
    }

    pub unsafe fn get_proc_address(&self, _name: &CStr) -> *const c_void {
        std::ptr::null()
    }

    pub unsafe fn destroy_window(&self, _window: GlfwWindowPtr) {}

    pub unsafe fn swap_buffers(&self, _window: GlfwWindowPtr) {}

    pub unsafe fn swap_interval(&self, _interval: i32) {}

    pub unsafe fn window_pos(&self, _window: GlfwWindowPtr) -> (i32, i32) {
        (0, 0)
    }

    pub unsafe fn set_window_pos(&self, _window: GlfwWindowPtr, _x: i32, _y: i32) {}

    pub unsafe fn set_window_size(&self, _window: GlfwWindowPtr, _width: u32, _height: u32) {}

    pub unsafe fn set_window_visible(&self, _window: GlfwWindowPtr, _visible: bool) {}

    /// ### English
    /// Always returns an error on non-Windows builds.
    ///
    /// ### 中文
    /// 非 Windows 构建下总是返回错误。
    pub unsafe fn create_shared_window(
        &self,
        _share: GlfwWindowPtr,
        _kind: SharedWindowKind,
    ) -> Result<GlfwWindowPtr, String> {
        Err("GLFW window creation is only implemented on Windows in this crate".to_string())
    }
}
