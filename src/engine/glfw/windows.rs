//! ### English
//! Windows implementation of the minimal GLFW symbol loader.
//!
//! Uses an embedder-provided function table (`EmbedderGlfwApi`) instead of dynamic library lookup.
//!
//! ### 中文
//! 最小 GLFW 符号 loader 的 Windows 实现。
//!
//! 使用宿主提供的函数表（`EmbedderGlfwApi`），不做动态库按名查找。

use std::ffi::{CStr, c_char, c_int, c_void};
use std::sync::OnceLock;

use super::SharedWindowKind;

#[repr(C)]
/// ### English
/// Opaque GLFW window type (`GLFWwindow`).
///
/// ### 中文
/// 不透明 GLFW window 类型（`GLFWwindow`）。
pub struct GLFWwindow {
    _private: [u8; 0],
}

#[repr(C)]
/// ### English
/// Opaque GLFW monitor type (`GLFWmonitor`).
///
/// ### 中文
/// 不透明 GLFW monitor 类型（`GLFWmonitor`）。
pub struct GLFWmonitor {
    _private: [u8; 0],
}

type GLFWglproc = *const c_void;
type GlfwGetProcAddress = unsafe extern "C" fn(*const c_char) -> GLFWglproc;
type GlfwMakeContextCurrent = unsafe extern "C" fn(*mut GLFWwindow);
type GlfwDefaultWindowHints = unsafe extern "C" fn();
type GlfwWindowHint = unsafe extern "C" fn(c_int, c_int);
type GlfwGetWindowAttrib = unsafe extern "C" fn(*mut GLFWwindow, c_int) -> c_int;
type GlfwCreateWindow = unsafe extern "C" fn(
    c_int,
    c_int,
    *const c_char,
    *mut GLFWmonitor,
    *mut GLFWwindow,
) -> *mut GLFWwindow;
type GlfwDestroyWindow = unsafe extern "C" fn(*mut GLFWwindow);
type GlfwGetCurrentContext = unsafe extern "C" fn() -> *mut GLFWwindow;
type GlfwSwapBuffers = unsafe extern "C" fn(*mut GLFWwindow);
type GlfwSwapInterval = unsafe extern "C" fn(c_int);
type GlfwGetWindowPos = unsafe extern "C" fn(*mut GLFWwindow, *mut c_int, *mut c_int);
type GlfwSetWindowPos = unsafe extern "C" fn(*mut GLFWwindow, c_int, c_int);
type GlfwSetWindowSize = unsafe extern "C" fn(*mut GLFWwindow, c_int, c_int);
type GlfwShowWindow = unsafe extern "C" fn(*mut GLFWwindow);
type GlfwHideWindow = unsafe extern "C" fn(*mut GLFWwindow);

static EMBEDDER_GLFW_API: OnceLock<GlfwApi> = OnceLock::new();

/// ### English
/// Checks that a required table entry is non-zero.
///
/// ### 中文
/// 校验必需的表项非 0。
fn require(address: usize, name: &str) -> Result<usize, String> {
    if address == 0 {
        return Err(format!("EmbedderGlfwApi.{name} is NULL"));
    }
    Ok(address)
}

/// ### English
/// Installs the embedder-provided GLFW function table for this process.
///
/// This is a one-time installation backed by `OnceLock`; repeated calls return an error.
///
/// #### Parameters
/// - `api`: Embedder function pointer table.
///
/// ### 中文
/// 为当前进程安装宿主提供的 GLFW 函数表。
///
/// 该安装由 `OnceLock` 保证只执行一次；重复调用会返回错误。
///
/// #### 参数
/// - `api`：宿主提供的 GLFW 函数指针表。
pub(super) fn install_embedder_glfw_api(api: super::EmbedderGlfwApi) -> Result<(), String> {
    let get_proc_address = require(api.glfw_get_proc_address, "glfw_get_proc_address")?;
    let make_context_current =
        require(api.glfw_make_context_current, "glfw_make_context_current")?;
    let default_window_hints =
        require(api.glfw_default_window_hints, "glfw_default_window_hints")?;
    let window_hint = require(api.glfw_window_hint, "glfw_window_hint")?;
    let get_window_attrib = require(api.glfw_get_window_attrib, "glfw_get_window_attrib")?;
    let create_window = require(api.glfw_create_window, "glfw_create_window")?;
    let destroy_window = require(api.glfw_destroy_window, "glfw_destroy_window")?;

    /*
    ### English
    Window-control entries are optional; all of them must be present for overlay support.

    ### 中文
    窗口控制表项是可选的；只有全部存在才支持 overlay。
    */
    let overlay = if api.glfw_swap_buffers != 0
        && api.glfw_swap_interval != 0
        && api.glfw_get_window_pos != 0
        && api.glfw_set_window_pos != 0
        && api.glfw_set_window_size != 0
        && api.glfw_show_window != 0
        && api.glfw_hide_window != 0
    {
        Some(OverlayFns {
            swap_buffers: unsafe {
                std::mem::transmute::<usize, GlfwSwapBuffers>(api.glfw_swap_buffers)
            },
            swap_interval: unsafe {
                std::mem::transmute::<usize, GlfwSwapInterval>(api.glfw_swap_interval)
            },
            get_window_pos: unsafe {
                std::mem::transmute::<usize, GlfwGetWindowPos>(api.glfw_get_window_pos)
            },
            set_window_pos: unsafe {
                std::mem::transmute::<usize, GlfwSetWindowPos>(api.glfw_set_window_pos)
            },
            set_window_size: unsafe {
                std::mem::transmute::<usize, GlfwSetWindowSize>(api.glfw_set_window_size)
            },
            show_window: unsafe {
                std::mem::transmute::<usize, GlfwShowWindow>(api.glfw_show_window)
            },
            hide_window: unsafe {
                std::mem::transmute::<usize, GlfwHideWindow>(api.glfw_hide_window)
            },
        })
    } else {
        None
    };

    let get_current_context = (api.glfw_get_current_context != 0).then(|| unsafe {
        std::mem::transmute::<usize, GlfwGetCurrentContext>(api.glfw_get_current_context)
    });

    let table = GlfwApi {
        glfw_get_proc_address: unsafe {
            std::mem::transmute::<usize, GlfwGetProcAddress>(get_proc_address)
        },
        glfw_make_context_current: unsafe {
            std::mem::transmute::<usize, GlfwMakeContextCurrent>(make_context_current)
        },
        glfw_default_window_hints: unsafe {
            std::mem::transmute::<usize, GlfwDefaultWindowHints>(default_window_hints)
        },
        glfw_window_hint: unsafe { std::mem::transmute::<usize, GlfwWindowHint>(window_hint) },
        glfw_get_window_attrib: unsafe {
            std::mem::transmute::<usize, GlfwGetWindowAttrib>(get_window_attrib)
        },
        glfw_create_window: unsafe {
            std::mem::transmute::<usize, GlfwCreateWindow>(create_window)
        },
        glfw_destroy_window: unsafe {
            std::mem::transmute::<usize, GlfwDestroyWindow>(destroy_window)
        },
        glfw_get_current_context: get_current_context,
        overlay,
    };

    EMBEDDER_GLFW_API
        .set(table)
        .map_err(|_| "Embedder GLFW API is already installed".to_string())?;
    tracing::debug!(
        overlay = table.overlay.is_some(),
        "embedder GLFW API installed"
    );
    Ok(())
}

#[derive(Clone, Copy)]
/// ### English
/// Window-control entry points needed by the native overlay.
///
/// ### 中文
/// 原生 overlay 所需的窗口控制入口。
struct OverlayFns {
    swap_buffers: GlfwSwapBuffers,
    swap_interval: GlfwSwapInterval,
    get_window_pos: GlfwGetWindowPos,
    set_window_pos: GlfwSetWindowPos,
    set_window_size: GlfwSetWindowSize,
    show_window: GlfwShowWindow,
    hide_window: GlfwHideWindow,
}

#[derive(Clone, Copy)]
/// ### English
/// Loaded GLFW API used by the bridge (context control, proc loading, overlay windows).
///
/// ### 中文
/// 帧桥使用的 GLFW API（上下文控制、函数指针加载、overlay 窗口）。
pub struct GlfwApi {
    glfw_get_proc_address: GlfwGetProcAddress,
    glfw_make_context_current: GlfwMakeContextCurrent,
    glfw_default_window_hints: GlfwDefaultWindowHints,
    glfw_window_hint: GlfwWindowHint,
    glfw_get_window_attrib: GlfwGetWindowAttrib,
    glfw_create_window: GlfwCreateWindow,
    glfw_destroy_window: GlfwDestroyWindow,
    /// ### English
    /// Optional; lets a foreign thread restore its own context after touching ours.
    ///
    /// ### 中文
    /// 可选；让外部线程在操作完我们的上下文后恢复其原本的上下文。
    glfw_get_current_context: Option<GlfwGetCurrentContext>,
    overlay: Option<OverlayFns>,
}

impl GlfwApi {
    /// ### English
    /// Returns the installed table.
    ///
    /// The embedder must call `frame_bridge_set_glfw_api` before GPU textures are requested.
    ///
    /// ### 中文
    /// 返回已安装的函数表。
    ///
    /// 宿主必须在请求 GPU 纹理之前调用 `frame_bridge_set_glfw_api`。
    #[inline]
    pub fn load() -> Result<Self, String> {
        EMBEDDER_GLFW_API.get().copied().ok_or_else(|| {
            "Embedder GLFW API is not installed; call frame_bridge_set_glfw_api first".to_string()
        })
    }

    #[inline]
    pub fn supports_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    /// ### English
    /// Makes `window` current on the calling thread.
    ///
    /// ### 中文
    /// 将 `window` 设为调用线程的 current 上下文。
    #[inline]
    pub unsafe fn make_current(&self, window: *mut GLFWwindow) {
        unsafe { (self.glfw_make_context_current)(window) };
    }

    /// ### English
    /// Returns the window whose context is current on the calling thread, if the embedder
    /// provided `glfwGetCurrentContext`.
    ///
    /// ### 中文
    /// 若宿主提供了 `glfwGetCurrentContext`，返回调用线程上 current 上下文所属的 window。
    #[inline]
    pub unsafe fn current_context(&self) -> Option<*mut GLFWwindow> {
        self.glfw_get_current_context
            .map(|get_current| unsafe { get_current() })
    }

    /// ### English
    /// Loads an OpenGL function pointer via GLFW.
    ///
    /// #### Parameters
    /// - `name`: NUL-terminated proc name.
    ///
    /// ### 中文
    /// 通过 GLFW 加载 OpenGL 函数指针。
    ///
    /// #### 参数
    /// - `name`：以 NUL 结尾的函数名。
    #[inline]
    pub unsafe fn get_proc_address(&self, name: &CStr) -> *const c_void {
        unsafe { (self.glfw_get_proc_address)(name.as_ptr()) }
    }

    #[inline]
    pub unsafe fn destroy_window(&self, window: *mut GLFWwindow) {
        unsafe { (self.glfw_destroy_window)(window) };
    }

    #[inline]
    pub unsafe fn swap_buffers(&self, window: *mut GLFWwindow) {
        if let Some(overlay) = self.overlay {
            unsafe { (overlay.swap_buffers)(window) };
        }
    }

    /// ### English
    /// Sets the swap interval of the context current on the calling thread.
    ///
    /// ### 中文
    /// 设置调用线程上 current 上下文的交换间隔。
    #[inline]
    pub unsafe fn swap_interval(&self, interval: i32) {
        if let Some(overlay) = self.overlay {
            unsafe { (overlay.swap_interval)(interval) };
        }
    }

    /// ### English
    /// Returns the screen position of the content area of `window`.
    ///
    /// ### 中文
    /// 返回 `window` 内容区域的屏幕坐标。
    pub unsafe fn window_pos(&self, window: *mut GLFWwindow) -> (i32, i32) {
        let Some(overlay) = self.overlay else {
            return (0, 0);
        };
        let mut x: c_int = 0;
        let mut y: c_int = 0;
        unsafe { (overlay.get_window_pos)(window, &mut x, &mut y) };
        (x, y)
    }

    #[inline]
    pub unsafe fn set_window_pos(&self, window: *mut GLFWwindow, x: i32, y: i32) {
        if let Some(overlay) = self.overlay {
            unsafe { (overlay.set_window_pos)(window, x, y) };
        }
    }

    #[inline]
    pub unsafe fn set_window_size(&self, window: *mut GLFWwindow, width: u32, height: u32) {
        if let Some(overlay) = self.overlay {
            let width = width.min(c_int::MAX as u32) as c_int;
            let height = height.min(c_int::MAX as u32) as c_int;
            unsafe { (overlay.set_window_size)(window, width, height) };
        }
    }

    #[inline]
    pub unsafe fn set_window_visible(&self, window: *mut GLFWwindow, visible: bool) {
        if let Some(overlay) = self.overlay {
            if visible {
                unsafe { (overlay.show_window)(window) };
            } else {
                unsafe { (overlay.hide_window)(window) };
            }
        }
    }

    /// ### English
    /// Creates a window whose GL context shares objects with `share`, copying the context
    /// version/profile hints from `share` so both contexts are compatible.
    ///
    /// #### Parameters
    /// - `share`: Window whose context share group is joined.
    /// - `kind`: Offscreen context carrier or overlay presentation window.
    ///
    /// ### 中文
    /// 创建一个 GL 上下文与 `share` 共享对象的 window，并从 `share` 复制上下文版本/profile hint，
    /// 保证两个上下文兼容。
    ///
    /// #### 参数
    /// - `share`：需要加入其共享组的 window。
    /// - `kind`：离屏上下文载体或 overlay 呈现窗口。
    pub unsafe fn create_shared_window(
        &self,
        share: *mut GLFWwindow,
        kind: SharedWindowKind,
    ) -> Result<*mut GLFWwindow, String> {
        const GLFW_TRUE: c_int = 1;
        const GLFW_FALSE: c_int = 0;

        const GLFW_FOCUSED: c_int = 0x0002_0001;
        const GLFW_RESIZABLE: c_int = 0x0002_0003;
        const GLFW_VISIBLE: c_int = 0x0002_0004;
        const GLFW_DECORATED: c_int = 0x0002_0005;
        const GLFW_FLOATING: c_int = 0x0002_0007;
        const GLFW_FOCUS_ON_SHOW: c_int = 0x0002_000C;

        const GLFW_CLIENT_API: c_int = 0x0002_2001;
        const GLFW_CONTEXT_VERSION_MAJOR: c_int = 0x0002_2002;
        const GLFW_CONTEXT_VERSION_MINOR: c_int = 0x0002_2003;
        const GLFW_OPENGL_FORWARD_COMPAT: c_int = 0x0002_2006;
        const GLFW_OPENGL_DEBUG_CONTEXT: c_int = 0x0002_2007;
        const GLFW_OPENGL_PROFILE: c_int = 0x0002_2008;
        const GLFW_CONTEXT_CREATION_API: c_int = 0x0002_200B;

        if share.is_null() {
            return Err("shared GLFW window is NULL".to_string());
        }
        if matches!(kind, SharedWindowKind::Overlay { .. }) && self.overlay.is_none() {
            return Err("embedder GLFW API lacks window-control entries".to_string());
        }

        let attrib = |name: c_int| unsafe { (self.glfw_get_window_attrib)(share, name) };
        let shared_client_api = attrib(GLFW_CLIENT_API);
        let shared_major = attrib(GLFW_CONTEXT_VERSION_MAJOR);
        let shared_minor = attrib(GLFW_CONTEXT_VERSION_MINOR);
        let shared_profile = attrib(GLFW_OPENGL_PROFILE);
        let shared_forward = attrib(GLFW_OPENGL_FORWARD_COMPAT);
        let shared_debug = attrib(GLFW_OPENGL_DEBUG_CONTEXT);
        let shared_creation_api = attrib(GLFW_CONTEXT_CREATION_API);

        let hint = |name: c_int, value: c_int| unsafe { (self.glfw_window_hint)(name, value) };
        unsafe { (self.glfw_default_window_hints)() };
        hint(GLFW_VISIBLE, GLFW_FALSE);
        hint(GLFW_FOCUSED, GLFW_FALSE);
        hint(GLFW_RESIZABLE, GLFW_FALSE);
        let (width, height, title) = match kind {
            SharedWindowKind::Offscreen => (1, 1, c"frame_bridge-offscreen"),
            SharedWindowKind::Overlay { width, height } => {
                hint(GLFW_DECORATED, GLFW_FALSE);
                hint(GLFW_FLOATING, GLFW_TRUE);
                hint(GLFW_FOCUS_ON_SHOW, GLFW_FALSE);
                (
                    width.clamp(1, c_int::MAX as u32) as c_int,
                    height.clamp(1, c_int::MAX as u32) as c_int,
                    c"frame_bridge-overlay",
                )
            }
        };

        if shared_client_api != 0 {
            hint(GLFW_CLIENT_API, shared_client_api);
        }
        if shared_major > 0 {
            hint(GLFW_CONTEXT_VERSION_MAJOR, shared_major);
        }
        if shared_minor > 0 {
            hint(GLFW_CONTEXT_VERSION_MINOR, shared_minor);
        }
        if shared_profile != 0 {
            hint(GLFW_OPENGL_PROFILE, shared_profile);
        }
        hint(GLFW_OPENGL_FORWARD_COMPAT, shared_forward);
        hint(GLFW_OPENGL_DEBUG_CONTEXT, shared_debug);
        if shared_creation_api != 0 {
            hint(GLFW_CONTEXT_CREATION_API, shared_creation_api);
        }

        let window = unsafe {
            (self.glfw_create_window)(width, height, title.as_ptr(), std::ptr::null_mut(), share)
        };
        unsafe { (self.glfw_default_window_hints)() };

        if window.is_null() {
            return Err(
                "glfwCreateWindow failed; ensure the shared window's context is valid".to_string(),
            );
        }
        Ok(window)
    }
}

/// ### English
/// Raw window pointer type used by this crate (alias for `*mut GLFWwindow`).
///
/// ### 中文
/// 本 crate 使用的 window 裸指针类型（`*mut GLFWwindow` 的别名）。
pub type GlfwWindowPtr = *mut GLFWwindow;
pub type LoadedGlfwApi = GlfwApi;
