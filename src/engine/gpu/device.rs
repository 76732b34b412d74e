//! ### English
//! Device capability surface consumed by the shared-surface manager.
//!
//! A concrete backend (OpenGL share group, D3D shared texture, exported buffer, ...) implements
//! these primitives; lifecycle policy (health checks, recreation, double buffering, retirement)
//! lives in `SharedSurface` and is identical for every backend.
//!
//! ### 中文
//! 共享表面管理器所使用的设备能力接口。
//!
//! 具体后端（OpenGL 共享组、D3D 共享纹理、导出缓冲区等）实现这些原语；
//! 生命周期策略（健康检查、重建、双缓冲、延迟退役）位于 `SharedSurface` 中，对所有后端一致。

use std::ptr::NonNull;

use dpi::PhysicalSize;

use crate::engine::config::{ChannelOrder, VideoFilter};
use crate::engine::error::DeviceError;

/// ### English
/// Backend-specific handle through which the consumer opens a shared texture
/// (GL texture name, NT handle, dma-buf fd, ...).
///
/// ### 中文
/// 消费者打开共享纹理所用的后端相关句柄（GL 纹理名、NT handle、dma-buf fd 等）。
pub type ExportHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Ready,
    Lost,
}

/// ### English
/// Identity of one device incarnation. Anything bound to a device (the overlay presenter)
/// must compare tokens before touching device objects.
///
/// ### 中文
/// 某一次设备实例的身份标识。任何绑定到设备的对象（如 overlay 呈现器）在访问设备对象前都必须比较 token。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceToken {
    /// ### English
    /// Monotonic counter bumped on every device (re)creation.
    ///
    /// ### 中文
    /// 每次设备（重新）创建时递增的单调计数。
    pub generation: u64,
    /// ### English
    /// Backend handle other surfaces share objects with (e.g. the offscreen GLFW window).
    ///
    /// ### 中文
    /// 其它表面用于共享对象的后端句柄（例如离屏 GLFW window）。
    pub share: u64,
}

/// ### English
/// CPU-visible mapping of a staging resource; valid until `unmap_staging`.
///
/// ### 中文
/// staging 资源的 CPU 可见映射；在 `unmap_staging` 之前有效。
#[derive(Debug, Clone, Copy)]
pub struct StagingMapping {
    pub ptr: NonNull<u8>,
    pub len: usize,
    pub pitch: usize,
}

/// ### English
/// Parameters of one conversion pass (channel swizzle and/or scaling).
///
/// ### 中文
/// 一次转换 pass 的参数（通道交换和/或缩放）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionParams {
    pub swizzle: bool,
    pub filter: VideoFilter,
    pub source: PhysicalSize<u32>,
    pub output: PhysicalSize<u32>,
}

/// ### English
/// Primitive GPU operations for one device incarnation.
///
/// All methods run on the thread that owns the device (the present worker). Release methods
/// must tolerate a lost device.
///
/// ### 中文
/// 单个设备实例的 GPU 原语操作。
///
/// 所有方法都在持有设备的线程（呈现 worker）上执行。释放类方法必须能容忍设备已丢失。
pub trait GpuDevice: Send {
    /// ### English
    /// CPU-writable upload resource sized to the source resolution.
    ///
    /// ### 中文
    /// CPU 可写的上传资源，尺寸为源分辨率。
    type Staging: Send;
    type Texture: Send;
    /// ### English
    /// Compiled conversion kernel; compiled once per device and reused across resizes.
    ///
    /// ### 中文
    /// 已编译的转换内核；每个设备只编译一次，resize 之间复用。
    type Kernel: Send;
    /// ### English
    /// GPU completion query (fence).
    ///
    /// ### 中文
    /// GPU 完成查询（fence）。
    type Query: Send;

    fn status(&mut self) -> DeviceStatus;
    fn native_order(&self) -> ChannelOrder;
    fn share_handle(&self) -> u64;

    fn create_staging(&mut self, size: PhysicalSize<u32>) -> Result<Self::Staging, DeviceError>;
    fn create_shared(
        &mut self,
        size: PhysicalSize<u32>,
    ) -> Result<(Self::Texture, ExportHandle), DeviceError>;
    fn create_intermediate(&mut self, size: PhysicalSize<u32>)
    -> Result<Self::Texture, DeviceError>;
    fn compile_conversion(&mut self) -> Result<Self::Kernel, DeviceError>;

    fn map_staging(&mut self, staging: &mut Self::Staging) -> Result<StagingMapping, DeviceError>;
    fn unmap_staging(&mut self, staging: &mut Self::Staging);

    /// ### English
    /// Copies staging into a texture of the same (source) size.
    ///
    /// ### 中文
    /// 将 staging 拷贝到同为源尺寸的纹理。
    fn upload(&mut self, staging: &Self::Staging, dst: &Self::Texture) -> Result<(), DeviceError>;
    fn run_conversion(
        &mut self,
        kernel: &Self::Kernel,
        src: &Self::Texture,
        dst: &Self::Texture,
        params: &ConversionParams,
    ) -> Result<(), DeviceError>;
    /// ### English
    /// Copies staging straight into the shared texture; sizes and channel order must match.
    ///
    /// ### 中文
    /// 将 staging 直接拷贝到共享纹理；尺寸与通道顺序必须一致。
    fn copy_direct(
        &mut self,
        staging: &Self::Staging,
        dst: &Self::Texture,
    ) -> Result<(), DeviceError>;

    /// ### English
    /// Issues a completion query after the commands recorded so far, if supported.
    ///
    /// ### 中文
    /// 在已记录的命令之后插入完成查询（若支持）。
    fn issue_query(&mut self) -> Option<Self::Query>;
    /// ### English
    /// Non-blocking poll; true once the GPU has passed the query.
    ///
    /// ### 中文
    /// 非阻塞轮询；GPU 越过该查询后返回 true。
    fn poll_query(&mut self, query: &Self::Query) -> bool;
    fn flush(&mut self);

    fn release_query(&mut self, query: Self::Query);
    fn release_staging(&mut self, staging: Self::Staging);
    fn release_texture(&mut self, texture: Self::Texture);
    fn release_kernel(&mut self, kernel: Self::Kernel);

    /// ### English
    /// Detaches the device from the calling thread (e.g. clears the current GL context)
    /// so another thread may tear it down.
    ///
    /// ### 中文
    /// 将设备与调用线程解绑（例如清除 current GL 上下文），以便其它线程销毁它。
    fn release_thread(&mut self) {}
}

/// ### English
/// Creates device incarnations; called again after device loss.
///
/// ### 中文
/// 创建设备实例；设备丢失后会再次调用。
pub trait DeviceFactory: Send + 'static {
    type Device: GpuDevice;

    fn create(&mut self) -> Result<Self::Device, DeviceError>;
}
