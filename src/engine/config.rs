//! ### English
//! Bridge configuration and shared pixel-format vocabulary.
//!
//! ### 中文
//! 帧桥配置以及共享的像素格式定义。

use std::time::Duration;

use dpi::PhysicalSize;

use super::flags;

/// ### English
/// Bytes per pixel for every surface in the bridge (8-bit, four channels).
///
/// ### 中文
/// 帧桥内所有表面的每像素字节数（8 位四通道）。
pub const BYTES_PER_PIXEL: usize = 4;

/// ### English
/// Channel order of 32-bit pixels.
///
/// ### 中文
/// 32 位像素的通道顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgba,
    Bgra,
}

impl ChannelOrder {
    /// ### English
    /// Whether this is the producer's "alternate" channel order (BGRA).
    ///
    /// ### 中文
    /// 是否为生产者的“备用”通道顺序（BGRA）。
    #[inline]
    pub fn is_alternate(self) -> bool {
        matches!(self, Self::Bgra)
    }
}

/// ### English
/// Sampling filter used when scaling frames.
///
/// ### 中文
/// 缩放帧时使用的采样过滤方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoFilter {
    Linear,
    #[default]
    Point,
}

impl VideoFilter {
    /// ### English
    /// Decodes the method-channel filter code (`0` = linear, `1` = point).
    ///
    /// ### 中文
    /// 解码方法通道中的过滤代码（`0` = 线性，`1` = 点采样）。
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Linear),
            1 => Some(Self::Point),
            _ => None,
        }
    }

    #[inline]
    pub fn is_linear(self) -> bool {
        matches!(self, Self::Linear)
    }
}

/// ### English
/// Tunables for one bridge instance.
///
/// ### 中文
/// 单个帧桥实例的可调参数。
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// ### English
    /// Source size used when the host passes an invalid size to `create`.
    ///
    /// ### 中文
    /// 宿主向 `create` 传入无效尺寸时使用的源尺寸。
    pub default_source_size: PhysicalSize<u32>,
    /// ### English
    /// Initial presentation size for the GPU backend.
    ///
    /// ### 中文
    /// GPU 后端的初始呈现尺寸。
    pub default_output_size: PhysicalSize<u32>,
    /// ### English
    /// Quiet period before a requested output resize is applied.
    ///
    /// ### 中文
    /// 输出尺寸请求在应用前需要保持稳定的时长。
    pub output_resize_debounce: Duration,
    /// ### English
    /// Quiet period before the overlay swapchain follows a geometry change.
    ///
    /// ### 中文
    /// overlay 交换链跟随几何变化前需要保持稳定的时长。
    pub overlay_resize_debounce: Duration,
    /// ### English
    /// How long replaced GPU resources are kept before destruction.
    ///
    /// ### 中文
    /// 被替换的 GPU 资源在销毁前保留的时长。
    pub retire_after: Duration,
    /// ### English
    /// Upper bound for the GPU worker initialization handshake.
    ///
    /// ### 中文
    /// GPU worker 初始化握手的最长等待时间。
    pub worker_init_timeout: Duration,
    /// ### English
    /// Try the GPU backend first when a device factory is available.
    ///
    /// ### 中文
    /// 存在设备工厂时优先尝试 GPU 后端。
    pub prefer_gpu: bool,
    pub video_filter: VideoFilter,
    /// ### English
    /// Channel order assumed for producers that cannot switch formats.
    ///
    /// ### 中文
    /// 对无法切换格式的生产者所假设的通道顺序。
    pub producer_channel_order: ChannelOrder,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_source_size: PhysicalSize::new(256, 240),
            default_output_size: PhysicalSize::new(256, 240),
            output_resize_debounce: Duration::from_millis(600),
            overlay_resize_debounce: Duration::from_millis(500),
            retire_after: Duration::from_secs(3),
            worker_init_timeout: Duration::from_secs(5),
            prefer_gpu: true,
            video_filter: VideoFilter::Point,
            producer_channel_order: ChannelOrder::Bgra,
        }
    }
}

impl BridgeConfig {
    /// ### English
    /// Builds a configuration from C ABI bitflags on top of the defaults.
    ///
    /// #### Parameters
    /// - `bits`: `FRAME_BRIDGE_FLAG_*` bitmask; unknown bits are ignored.
    ///
    /// ### 中文
    /// 在默认配置基础上根据 C ABI 位标志构建配置。
    ///
    /// #### 参数
    /// - `bits`：`FRAME_BRIDGE_FLAG_*` 位掩码；未知位会被忽略。
    pub fn from_flags(bits: u32) -> Self {
        let bits = bits & flags::FRAME_BRIDGE_FLAG_MASK;
        let mut config = Self::default();
        config.prefer_gpu = (bits & flags::FRAME_BRIDGE_FLAG_PREFER_CPU) == 0;
        if (bits & flags::FRAME_BRIDGE_FLAG_LINEAR_FILTER) != 0 {
            config.video_filter = VideoFilter::Linear;
        }
        if (bits & flags::FRAME_BRIDGE_FLAG_PRODUCER_RGBA) != 0 {
            config.producer_channel_order = ChannelOrder::Rgba;
        }
        config
    }

    /// ### English
    /// Replaces zero dimensions with the default source size.
    ///
    /// ### 中文
    /// 将为 0 的尺寸替换为默认源尺寸。
    pub fn sanitize_source(&self, size: PhysicalSize<u32>) -> PhysicalSize<u32> {
        if size.width == 0 || size.height == 0 {
            self.default_source_size
        } else {
            size
        }
    }
}

/// ### English
/// Tightly packed byte length of a frame, or `None` on overflow.
///
/// ### 中文
/// 紧密排列帧的字节长度；溢出时返回 `None`。
#[inline]
pub fn frame_len(size: PhysicalSize<u32>) -> Option<usize> {
    (size.width as usize)
        .checked_mul(size.height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_nes_output() {
        let config = BridgeConfig::default();
        assert_eq!(config.default_source_size, PhysicalSize::new(256, 240));
        assert_eq!(config.output_resize_debounce, Duration::from_millis(600));
        assert_eq!(config.overlay_resize_debounce, Duration::from_millis(500));
        assert_eq!(config.video_filter, VideoFilter::Point);
        assert!(config.prefer_gpu);
    }

    #[test]
    fn flags_override_defaults() {
        let config = BridgeConfig::from_flags(
            flags::FRAME_BRIDGE_FLAG_PREFER_CPU
                | flags::FRAME_BRIDGE_FLAG_LINEAR_FILTER
                | flags::FRAME_BRIDGE_FLAG_PRODUCER_RGBA
                | (1 << 31),
        );
        assert!(!config.prefer_gpu);
        assert_eq!(config.video_filter, VideoFilter::Linear);
        assert_eq!(config.producer_channel_order, ChannelOrder::Rgba);
    }

    #[test]
    fn zero_sizes_fall_back_to_default() {
        let config = BridgeConfig::default();
        assert_eq!(
            config.sanitize_source(PhysicalSize::new(0, 100)),
            PhysicalSize::new(256, 240)
        );
        assert_eq!(
            config.sanitize_source(PhysicalSize::new(320, 200)),
            PhysicalSize::new(320, 200)
        );
    }

    #[test]
    fn filter_codes() {
        assert_eq!(VideoFilter::from_code(0), Some(VideoFilter::Linear));
        assert_eq!(VideoFilter::from_code(1), Some(VideoFilter::Point));
        assert_eq!(VideoFilter::from_code(7), None);
    }

    #[test]
    fn frame_len_overflow_is_detected() {
        assert_eq!(frame_len(PhysicalSize::new(2, 3)), Some(24));
        assert_eq!(frame_len(PhysicalSize::new(u32::MAX, u32::MAX)), None);
    }
}
