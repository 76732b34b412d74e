//! ### English
//! Error types for each layer of the frame bridge.
//!
//! Worker-side failures are logged and degrade to "skip this frame"; only the
//! controller-facing `BridgeError` is surfaced to callers.
//!
//! ### 中文
//! 帧桥各层的错误类型。
//!
//! worker 侧失败只记录日志并降级为“跳过该帧”；只有面向控制器的 `BridgeError` 会返回给调用方。

use thiserror::Error;

/// ### English
/// Failures of the double-buffered CPU surface.
///
/// ### 中文
/// CPU 双缓冲表面的失败类型。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("a write is already active on this surface")]
    WriteActive,
    #[error("back plane is still held by a reader")]
    Busy,
    #[error("zero-sized frame {width}x{height}")]
    ZeroSize { width: u32, height: u32 },
    #[error("stride {actual} does not match tightly packed stride {expected}")]
    StrideMismatch { expected: usize, actual: usize },
    #[error("failed to allocate {bytes} bytes for pixel storage")]
    Alloc { bytes: usize },
}

/// ### English
/// Failures reported by a concrete GPU device.
///
/// ### 中文
/// 具体 GPU 设备上报的失败类型。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("GPU device lost")]
    Lost,
    #[error("unsupported by this device: {0}")]
    Unsupported(String),
    #[error("failed to create GPU resource: {0}")]
    Create(String),
    #[error("failed to map staging resource: {0}")]
    Map(String),
}

/// ### English
/// Failures of the shared-surface manager and the overlay presenter.
///
/// `Busy` is not an error condition for the worker: the frame is simply skipped.
///
/// ### 中文
/// 共享表面管理器与 overlay 呈现器的失败类型。
///
/// `Busy` 对 worker 来说不是错误：只是跳过该帧。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    #[error("the write slot is still in use by the GPU")]
    Busy,
    #[error("a staging buffer is already mapped")]
    AlreadyMapped,
    #[error("no staging buffer is mapped")]
    NotMapped,
    #[error("zero-sized surface {width}x{height}")]
    ZeroSize { width: u32, height: u32 },
    #[error("GPU device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("overlay is bound to a stale device")]
    StaleOverlay,
}

/// ### English
/// Structured errors returned to the host application layer.
///
/// ### 中文
/// 返回给宿主应用层的结构化错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("no texture registrar is available")]
    NoRegistrar,
    #[error("failed to create the texture backend: {0}")]
    CreateFailed(String),
    #[error("failed to register the texture: {0}")]
    RegisterFailed(String),
    #[error("bad arguments: {0}")]
    BadArgs(String),
    #[error("method not implemented: {0}")]
    NotImplemented(String),
}

impl BridgeError {
    /// ### English
    /// Stable string code used by the method channel and the C ABI.
    ///
    /// ### 中文
    /// 方法通道与 C ABI 使用的稳定错误码字符串。
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoRegistrar => "no_registrar",
            Self::CreateFailed(_) => "create_failed",
            Self::RegisterFailed(_) => "register_failed",
            Self::BadArgs(_) => "bad_args",
            Self::NotImplemented(_) => "not_implemented",
        }
    }
}

impl From<SurfaceError> for BridgeError {
    fn from(err: SurfaceError) -> Self {
        Self::CreateFailed(err.to_string())
    }
}

impl From<GpuError> for BridgeError {
    fn from(err: GpuError) -> Self {
        Self::CreateFailed(err.to_string())
    }
}
