/// ### English
/// Minimal GLFW loader backed by an embedder-provided function table (Windows-only in this crate).
/// Used to create the offscreen shared context of the GL device and the native overlay window.
///
/// ### 中文
/// 基于宿主提供函数表的最小 GLFW loader（本 crate 目前仅 Windows）。
/// 用于创建 GL 设备的离屏共享上下文以及原生 overlay 窗口。
#[cfg(windows)]
mod windows;

#[cfg(not(windows))]
mod stub;

#[cfg(windows)]
pub use windows::{GlfwWindowPtr, LoadedGlfwApi};

#[cfg(not(windows))]
pub use stub::{GlfwWindowPtr, LoadedGlfwApi};

#[repr(C)]
#[derive(Clone, Copy, Default)]
/// ### English
/// Function pointer table for GLFW symbols provided by the embedder.
///
/// All fields are raw addresses (`usize`). The context fields (`glfw_get_proc_address` through
/// `glfw_destroy_window`) must be non-zero when installing; the remaining window-control fields
/// may be zero, in which case the native overlay is reported as unsupported.
///
/// ### 中文
/// 由宿主提供的 GLFW 符号函数指针表。
///
/// 所有字段都是原始地址（`usize`）。上下文相关字段（`glfw_get_proc_address` 到
/// `glfw_destroy_window`）安装时必须为非 0；其余窗口控制字段可以为 0，此时原生 overlay 视为不支持。
pub struct EmbedderGlfwApi {
    pub glfw_get_proc_address: usize,
    pub glfw_make_context_current: usize,
    pub glfw_default_window_hints: usize,
    pub glfw_window_hint: usize,
    pub glfw_get_window_attrib: usize,
    pub glfw_create_window: usize,
    pub glfw_destroy_window: usize,
    pub glfw_get_current_context: usize,
    pub glfw_swap_buffers: usize,
    pub glfw_swap_interval: usize,
    pub glfw_get_window_pos: usize,
    pub glfw_set_window_pos: usize,
    pub glfw_set_window_size: usize,
    pub glfw_show_window: usize,
    pub glfw_hide_window: usize,
}

/// ### English
/// Window flavour requested from `LoadedGlfwApi::create_shared_window`.
///
/// ### 中文
/// 向 `LoadedGlfwApi::create_shared_window` 请求的窗口类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedWindowKind {
    /// ### English
    /// Invisible 1x1 window that only carries a GL context.
    ///
    /// ### 中文
    /// 只承载 GL 上下文的不可见 1x1 窗口。
    Offscreen,
    /// ### English
    /// Undecorated, floating, initially hidden window used as a direct-presentation surface.
    ///
    /// ### 中文
    /// 无边框、置顶、初始隐藏的窗口，用作直接呈现表面。
    Overlay { width: u32, height: u32 },
}

/// ### English
/// Installs an embedder-provided GLFW function table used by the internal loader.
/// Must be called before any GPU-backed texture is created.
///
/// ### 中文
/// 安装由宿主提供的 GLFW 函数表（供内部 loader 使用）。
/// 必须在创建任何 GPU 纹理之前调用。
pub(crate) fn install_embedder_glfw_api(api: EmbedderGlfwApi) -> Result<(), String> {
    #[cfg(windows)]
    {
        windows::install_embedder_glfw_api(api)
    }

    #[cfg(not(windows))]
    {
        let _ = api;
        Err("Embedder-provided GLFW API is only supported on Windows in this crate".to_string())
    }
}
