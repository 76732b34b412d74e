//! ### English
//! Bitflags controlling optional bridge behaviors.
//!
//! These are passed through the C ABI as a `u32` bitmask.
//!
//! ### 中文
//! 控制帧桥可选行为的位标志（bitflags）。
//!
//! 通过 C ABI 以 `u32` 位掩码传入。
/// ### English
/// Start sessions on the CPU pixel-buffer backend even if a GPU device factory is installed.
///
/// ### 中文
/// 即使安装了 GPU 设备工厂，也让会话以 CPU 像素缓冲后端启动。
pub const FRAME_BRIDGE_FLAG_PREFER_CPU: u32 = 1 << 0;

/// ### English
/// Use linear filtering when scaling source frames to the presentation size
/// (default is point/nearest sampling, which keeps pixel art crisp).
///
/// ### 中文
/// 源帧缩放到呈现尺寸时使用线性过滤（默认点采样/最近邻，保持像素画清晰）。
pub const FRAME_BRIDGE_FLAG_LINEAR_FILTER: u32 = 1 << 1;

/// ### English
/// The producer emits RGBA when it cannot switch its channel order
/// (default assumption is BGRA).
///
/// ### 中文
/// 当生产者无法切换通道顺序时，声明其输出为 RGBA（默认假设 BGRA）。
pub const FRAME_BRIDGE_FLAG_PRODUCER_RGBA: u32 = 1 << 2;

/// ### English
/// Mask of all known flags; unknown bits are ignored.
///
/// ### 中文
/// 所有已知标志的掩码；未知位会被忽略。
pub const FRAME_BRIDGE_FLAG_MASK: u32 = FRAME_BRIDGE_FLAG_PREFER_CPU
    | FRAME_BRIDGE_FLAG_LINEAR_FILTER
    | FRAME_BRIDGE_FLAG_PRODUCER_RGBA;
