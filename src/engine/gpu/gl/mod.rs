//! ### English
//! OpenGL backend: textures live in the host window's share group, so the exported handle is a
//! texture name the compositor can sample directly.
//!
//! ### 中文
//! OpenGL 后端：纹理位于宿主窗口的共享组中，因此导出句柄就是合成器可直接采样的纹理名。

pub(crate) mod context;
mod device;
mod kernel;

pub(crate) use device::GL_CONTEXT_LOST;
pub use device::{GlDevice, GlFence, GlStaging, GlTexture};
pub use kernel::GlKernel;

use crate::engine::error::DeviceError;
use crate::engine::glfw::GlfwWindowPtr;
use crate::engine::gpu::device::DeviceFactory;
use crate::engine::gpu::surface::{BackendFactory, backend_factory};

/// ### English
/// Creates GL device incarnations sharing objects with the embedder's window.
///
/// ### 中文
/// 创建与宿主窗口共享对象的 GL 设备实例。
pub struct GlDeviceFactory {
    /// ### English
    /// Embedder `GLFWwindow*` stored as an address so the factory stays `Send`.
    ///
    /// ### 中文
    /// 宿主 `GLFWwindow*`，以地址形式保存以保持工厂为 `Send`。
    host_window: usize,
}

impl GlDeviceFactory {
    pub fn new(host_window: usize) -> Self {
        Self { host_window }
    }
}

impl DeviceFactory for GlDeviceFactory {
    type Device = GlDevice;

    fn create(&mut self) -> Result<GlDevice, DeviceError> {
        let ctx = context::GlContext::new(self.host_window as GlfwWindowPtr)
            .map_err(DeviceError::Create)?;
        GlDevice::new(ctx)
    }
}

/// ### English
/// Backend factory for the GL shared-texture path.
///
/// #### Parameters
/// - `host_window`: Embedder `GLFWwindow*` (as an address) whose share group receives the textures.
///
/// ### 中文
/// GL 共享纹理路径的后端工厂。
///
/// #### 参数
/// - `host_window`：宿主 `GLFWwindow*`（地址形式），纹理将位于其共享组中。
pub fn gl_backend_factory(host_window: usize) -> BackendFactory {
    backend_factory(move || GlDeviceFactory::new(host_window))
}
