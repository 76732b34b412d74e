//! ### English
//! GPU shared-surface path: device capability traits, resource sets, the shared-surface
//! manager, the consumer-facing export, and the OpenGL backend.
//!
//! ### 中文
//! GPU 共享表面路径：设备能力 trait、资源集、共享表面管理器、面向消费者的导出，以及 OpenGL 后端。

pub mod device;
pub mod export;
pub mod gl;
pub(crate) mod slots;
pub mod surface;

pub use device::{DeviceFactory, DeviceStatus, DeviceToken, ExportHandle, GpuDevice};
pub use export::{GpuExport, GpuSurfaceDescriptor};
pub use surface::{
    BackendFactory, BoxedBackend, MappedWrite, SharedSurface, SharedSurfaceBackend,
    SurfaceConfig, backend_factory,
};
