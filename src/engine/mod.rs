/// ### English
/// Bridge internal modules (mailbox, surfaces, present worker, GPU manager, session control).
///
/// ### 中文
/// 帧桥内部模块（邮箱、表面、呈现 worker、GPU 管理器、会话控制等）。
pub(crate) mod aux;
pub mod channel;
pub mod compositor;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod flags;
pub mod glfw;
pub mod gpu;
pub(crate) mod lockfree;
pub mod mailbox;
pub mod overlay;
pub mod producer;
pub mod stats;
pub mod surface;
#[cfg(test)]
pub(crate) mod testing;
pub(crate) mod worker;

pub use channel::{MethodArgs, MethodValue, handle_method_call};
pub use compositor::{
    BackendKind, FrameNotifier, NO_TEXTURE, PlatformDispatcher, PlatformQueue, PlatformTask,
    TextureId, TextureRegistrar, TextureVariant, WakeCallback,
};
pub use config::{BYTES_PER_PIXEL, BridgeConfig, ChannelOrder, VideoFilter};
pub use controller::{BridgeCollaborators, SessionController};
pub use error::{BridgeError, DeviceError, GpuError, SurfaceError};
pub use glfw::{EmbedderGlfwApi, SharedWindowKind};
pub(crate) use glfw::install_embedder_glfw_api;
pub use gpu::gl::{GlDeviceFactory, gl_backend_factory};
pub use gpu::{GpuExport, GpuSurfaceDescriptor, SharedSurfaceBackend};
pub use mailbox::{Mailbox, PendingFrame};
pub use overlay::glfw::GlfwOverlayFactory;
pub use overlay::{OverlayFactory, OverlayPresenter, OverlayRect};
pub use producer::{FrameProducer, FrameReadyCallback};
pub use stats::BridgeStats;
pub use surface::CpuSurface;
