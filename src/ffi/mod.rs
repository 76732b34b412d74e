//! ### English
//! C ABI surface for `frame_bridge`.
//!
//! All exported symbols are `extern "C"` functions; structs are `#[repr(C)]`.
//! Fallible calls return a `FrameBridgeStatus` code; pointer-returning calls return NULL on failure.
//!
//! ### 中文
//! `frame_bridge` 的 C ABI 接口层。
//!
//! 所有导出符号均为 `extern "C"` 函数；结构体使用 `#[repr(C)]`。
//! 可失败的调用返回 `FrameBridgeStatus` 状态码；返回指针的调用在失败时返回 NULL。
mod abi;
mod aux;
mod bridge;
mod glfw;
mod host;
mod texture;

use std::sync::Arc;

use crate::engine::{BridgeError, GpuSurfaceDescriptor, PlatformQueue, SessionController};

/// ### English
/// Opaque bridge handle owning the session controller and the platform task queue.
///
/// ### 中文
/// 不透明帧桥句柄，持有会话控制器与平台任务队列。
pub struct FrameBridge {
    controller: SessionController,
    /// ### English
    /// Drained by the host on its platform thread through `frame_bridge_pump`.
    ///
    /// ### 中文
    /// 由宿主在其平台线程上通过 `frame_bridge_pump` 排空。
    queue: Arc<PlatformQueue>,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// ### English
/// Status codes returned across the C ABI. Negative values mirror `BridgeError` variants.
///
/// ### 中文
/// 通过 C ABI 返回的状态码。负值与 `BridgeError` 错误码一一对应。
pub enum FrameBridgeStatus {
    Ok = 0,
    NoRegistrar = -1,
    CreateFailed = -2,
    RegisterFailed = -3,
    BadArgs = -4,
    NotImplemented = -5,
    NullHandle = -6,
}

impl From<&BridgeError> for FrameBridgeStatus {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::NoRegistrar => Self::NoRegistrar,
            BridgeError::CreateFailed(_) => Self::CreateFailed,
            BridgeError::RegisterFailed(_) => Self::RegisterFailed,
            BridgeError::BadArgs(_) => Self::BadArgs,
            BridgeError::NotImplemented(_) => Self::NotImplemented,
        }
    }
}

/// ### English
/// Logs a failed call and converts it into a status code.
///
/// ### 中文
/// 记录失败调用并转换为状态码。
fn status_of(call: &str, result: Result<(), BridgeError>) -> FrameBridgeStatus {
    match result {
        Ok(()) => FrameBridgeStatus::Ok,
        Err(err) => {
            tracing::debug!(call, code = err.code(), %err, "bridge call failed");
            FrameBridgeStatus::from(&err)
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
/// ### English
/// Latest committed GPU slot as seen by the compositor.
///
/// ### 中文
/// 合成器看到的最近一次提交的 GPU 槽位。
pub struct FrameBridgeGpuSurface {
    /// ### English
    /// Backend export handle (GL texture name in the host share group).
    ///
    /// ### 中文
    /// 后端导出句柄（宿主共享组中的 GL 纹理名）。
    pub handle: u64,
    pub slot: u32,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
    /// ### English
    /// `1` if the texture holds BGRA-ordered pixels, `0` for RGBA.
    ///
    /// ### 中文
    /// 纹理为 BGRA 顺序时为 `1`，RGBA 时为 `0`。
    pub bgra: u32,
    /// ### English
    /// Device generation; changes after device loss and recreation.
    ///
    /// ### 中文
    /// 设备代数；设备丢失并重建后会变化。
    pub generation: u64,
}

impl From<GpuSurfaceDescriptor> for FrameBridgeGpuSurface {
    fn from(value: GpuSurfaceDescriptor) -> Self {
        Self {
            handle: value.handle,
            slot: value.slot,
            width: value.size.width,
            height: value.size.height,
            source_width: value.source_size.width,
            source_height: value.source_size.height,
            bgra: u32::from(value.order.is_alternate()),
            generation: value.token.generation,
        }
    }
}

/// ### English
/// C ABI version for `frame_bridge`.
///
/// ### 中文
/// `frame_bridge` 的 C ABI 版本号。
const FRAME_BRIDGE_ABI_VERSION: u32 = 1;
