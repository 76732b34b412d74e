//! ### English
//! Interface of the external frame producer (emulator core on its own thread).
//!
//! ### 中文
//! 外部帧生产者（运行在独立线程上的模拟器核心）的接口。

use super::config::ChannelOrder;
use super::mailbox::PendingFrame;

/// ### English
/// Frame-ready callback installed into the producer. Called on the producer thread; must not block.
///
/// ### 中文
/// 安装到生产者中的帧就绪回调。在生产者线程上调用；不得阻塞。
pub type FrameReadyCallback = Box<dyn Fn(PendingFrame) + Send + Sync>;

/// ### English
/// External frame producer.
///
/// ### 中文
/// 外部帧生产者。
pub trait FrameProducer: Send + Sync {
    /// ### English
    /// Starts producing frames (idempotent on the producer side).
    ///
    /// ### 中文
    /// 开始生产帧（生产者侧应保证幂等）。
    fn start(&self);

    /// ### English
    /// Installs (`Some`) or removes (`None`) the frame-ready callback.
    ///
    /// Once this returns after `None`, the previous callback must not be invoked again.
    ///
    /// ### 中文
    /// 安装（`Some`）或移除（`None`）帧就绪回调。
    ///
    /// 以 `None` 调用返回后，之前的回调不得再被调用。
    fn set_frame_ready_callback(&self, callback: Option<FrameReadyCallback>);

    /// ### English
    /// Copies frame `buffer_index` into `dst` and returns the number of bytes written.
    ///
    /// #### Parameters
    /// - `buffer_index`: Index reported by the frame-ready callback.
    /// - `dst`: Destination pixels.
    /// - `dst_pitch`: Destination row pitch in bytes.
    /// - `dst_height`: Number of destination rows.
    ///
    /// ### 中文
    /// 将第 `buffer_index` 帧拷贝到 `dst`，返回写入的字节数。
    ///
    /// #### 参数
    /// - `buffer_index`：帧就绪回调上报的索引。
    /// - `dst`：目标像素。
    /// - `dst_pitch`：目标行跨度（字节）。
    /// - `dst_height`：目标行数。
    fn copy_frame(&self, buffer_index: u32, dst: &mut [u8], dst_pitch: usize, dst_height: u32)
    -> usize;

    /// ### English
    /// Switches the output channel order. Returns `false` if unsupported.
    ///
    /// ### 中文
    /// 切换输出通道顺序。不支持时返回 `false`。
    fn set_color_format(&self, order: ChannelOrder) -> bool {
        let _ = order;
        false
    }
}
