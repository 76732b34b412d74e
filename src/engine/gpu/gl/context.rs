//! ### English
//! Offscreen GLFW context shared with the host window.
//!
//! The present worker owns this context; after the worker exits, teardown may run on another
//! thread, which binds the context temporarily and restores whatever was current before.
//!
//! ### 中文
//! 与宿主窗口共享的离屏 GLFW 上下文。
//!
//! 呈现 worker 持有该上下文；worker 退出后，销毁可能在其它线程进行，此时临时绑定上下文并在结束后恢复原先的 current 上下文。

use std::cell::Cell;

use glow::HasContext as _;

use crate::engine::glfw::{self, SharedWindowKind};

/// ### English
/// Per-thread "current GLFW window" cache to avoid redundant `makeCurrent` calls.
///
/// ### 中文
/// 每线程缓存“当前 GLFW window”，避免重复 `makeCurrent` 调用。
thread_local! {
    static CURRENT_GLFW_WINDOW: Cell<glfw::GlfwWindowPtr> =
        const { Cell::new(std::ptr::null_mut()) };
}

/// ### English
/// Makes `window` current on the calling thread unless the cache says it already is.
///
/// ### 中文
/// 将 `window` 设为调用线程的 current 上下文（缓存显示已是 current 时跳过）。
pub(crate) fn bind_window(api: &glfw::LoadedGlfwApi, window: glfw::GlfwWindowPtr) {
    CURRENT_GLFW_WINDOW.with(|current| {
        if current.get() == window {
            return;
        }
        unsafe { api.make_current(window) };
        current.set(window);
    });
}

/// ### English
/// Clears the cache entry of the calling thread if it points at `window`.
///
/// ### 中文
/// 若调用线程的缓存指向 `window`，则清除该缓存。
pub(crate) fn forget_window(window: glfw::GlfwWindowPtr) {
    CURRENT_GLFW_WINDOW.with(|current| {
        if current.get() == window {
            current.set(std::ptr::null_mut());
        }
    });
}

/// ### English
/// Parses `"4.6.0 ..."` or `"OpenGL ES 3.2 ..."` into `(major, minor)`.
///
/// ### 中文
/// 将 `"4.6.0 ..."` 或 `"OpenGL ES 3.2 ..."` 解析为 `(major, minor)`。
pub(crate) fn parse_gl_version(version: &str) -> (u32, u32) {
    let Some(token) = version
        .split_whitespace()
        .find(|t| t.starts_with(|c: char| c.is_ascii_digit()))
    else {
        return (0, 0);
    };
    let mut parts = token.split('.');
    let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor = parts
        .next()
        .and_then(|s| {
            let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .unwrap_or(0);
    (major, minor)
}

/// ### English
/// Owns the offscreen GLFW window/context and the glow function table.
///
/// ### 中文
/// 持有离屏 GLFW window/context 以及 glow 函数表。
pub(crate) struct GlContext {
    glfw: glfw::LoadedGlfwApi,
    window: glfw::GlfwWindowPtr,
    gl: glow::Context,
    is_gles: bool,
    version: (u32, u32),
}

/// ### English
/// The context is only used by one thread at a time: the worker while it runs, then the
/// thread that tears the device down.
///
/// ### 中文
/// 该上下文同一时刻只被一个线程使用：运行期间是 worker，之后是销毁设备的线程。
unsafe impl Send for GlContext {}

impl GlContext {
    /// ### English
    /// Creates an offscreen window sharing objects with `host_window` and makes it current on
    /// the calling thread.
    ///
    /// #### Parameters
    /// - `host_window`: Embedder `GLFWwindow*` whose share group the textures join.
    ///
    /// ### 中文
    /// 创建与 `host_window` 共享对象的离屏 window，并使其在调用线程上 current。
    ///
    /// #### 参数
    /// - `host_window`：宿主的 `GLFWwindow*`，纹理将加入其共享组。
    pub(crate) fn new(host_window: glfw::GlfwWindowPtr) -> Result<Self, String> {
        let glfw = glfw::LoadedGlfwApi::load()?;
        let window =
            unsafe { glfw.create_shared_window(host_window, SharedWindowKind::Offscreen)? };
        bind_window(&glfw, window);

        let gl = unsafe {
            glow::Context::from_loader_function_cstr(|name| {
                glfw.get_proc_address(name) as *const _
            })
        };

        let version_string = unsafe { gl.get_parameter_string(glow::VERSION) };
        let is_gles = version_string.starts_with("OpenGL ES");
        let version = parse_gl_version(&version_string);
        tracing::debug!(version = %version_string, "offscreen GL context created");

        Ok(Self {
            glfw,
            window,
            gl,
            is_gles,
            version,
        })
    }

    #[inline]
    pub(crate) fn gl(&self) -> &glow::Context {
        &self.gl
    }

    #[inline]
    pub(crate) fn glfw(&self) -> &glfw::LoadedGlfwApi {
        &self.glfw
    }

    #[inline]
    pub(crate) fn window(&self) -> glfw::GlfwWindowPtr {
        self.window
    }

    #[inline]
    pub(crate) fn is_gles(&self) -> bool {
        self.is_gles
    }

    /// ### English
    /// Whether PBOs, fences and `gl_VertexID` are available (desktop GL 3.2+, GLES 3.0+).
    ///
    /// ### 中文
    /// 是否支持 PBO、fence 以及 `gl_VertexID`（桌面 GL 3.2+，GLES 3.0+）。
    pub(crate) fn meets_minimum_version(&self) -> bool {
        let (major, minor) = self.version;
        if self.is_gles {
            major >= 3
        } else {
            major > 3 || (major == 3 && minor >= 2)
        }
    }

    #[inline]
    pub(crate) fn make_current(&self) {
        bind_window(&self.glfw, self.window);
    }

    /// ### English
    /// Forces this context current on a foreign thread and returns the previously current
    /// window, so `restore` can put it back.
    ///
    /// ### 中文
    /// 在外部线程上强制使该上下文 current，并返回此前 current 的 window，供 `restore` 恢复。
    pub(crate) fn attach_foreign(&self) -> glfw::GlfwWindowPtr {
        let previous = unsafe { self.glfw.current_context() }
            .unwrap_or_else(|| CURRENT_GLFW_WINDOW.with(Cell::get));
        unsafe { self.glfw.make_current(self.window) };
        CURRENT_GLFW_WINDOW.with(|current| current.set(self.window));
        previous
    }

    pub(crate) fn restore(&self, previous: glfw::GlfwWindowPtr) {
        if previous == self.window {
            return;
        }
        unsafe { self.glfw.make_current(previous) };
        CURRENT_GLFW_WINDOW.with(|current| current.set(previous));
    }

    /// ### English
    /// Clears the current context of the calling thread if it is this one.
    ///
    /// ### 中文
    /// 若调用线程的 current 上下文是本上下文，则将其清除。
    pub(crate) fn detach(&self) {
        let is_current = CURRENT_GLFW_WINDOW.with(|current| current.get() == self.window);
        if is_current {
            unsafe { self.glfw.make_current(std::ptr::null_mut()) };
            forget_window(self.window);
        }
    }
}

impl Drop for GlContext {
    /// ### English
    /// Ensures the offscreen window/context is destroyed on drop.
    ///
    /// ### 中文
    /// Drop 时销毁离屏 window/context。
    fn drop(&mut self) {
        self.detach();
        unsafe { self.glfw.destroy_window(self.window) };
    }
}
