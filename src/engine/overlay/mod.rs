//! ### English
//! Native overlay presenter: a secondary direct-presentation surface placed over a child region
//! of the host window, fed with the latest committed GPU slot by the present worker.
//!
//! Geometry and visibility changes run on the window-owning (platform) thread; the worker only
//! presents and resizes the swapchain.
//!
//! ### 中文
//! 原生 overlay 呈现器：覆盖在宿主窗口某个子区域上的次级直接呈现表面，由呈现 worker 送入最新提交的 GPU 槽位。
//!
//! 几何与可见性变更在窗口所属（平台）线程执行；worker 只负责呈现与交换链 resize。

pub mod glfw;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use dpi::{PhysicalPosition, PhysicalSize};
use parking_lot::Mutex;

use super::config::VideoFilter;
use super::debounce::DebouncedResize;
use super::error::GpuError;
use super::gpu::{DeviceToken, GpuSurfaceDescriptor};

/// ### English
/// Overlay rectangle in host-window physical pixels.
///
/// ### 中文
/// overlay 矩形（宿主窗口物理像素）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRect {
    pub position: PhysicalPosition<i32>,
    pub size: PhysicalSize<u32>,
}

impl OverlayRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            position: PhysicalPosition::new(x, y),
            size: PhysicalSize::new(width, height),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }
}

impl Default for OverlayRect {
    fn default() -> Self {
        Self::new(0, 0, 1, 1)
    }
}

/// ### English
/// A direct-presentation surface bound to one device incarnation.
///
/// ### 中文
/// 绑定到某个设备实例的直接呈现表面。
pub trait OverlayPresenter: Send {
    fn device_token(&self) -> DeviceToken;
    /// ### English
    /// Window-thread only.
    ///
    /// ### 中文
    /// 只能在窗口线程调用。
    fn set_rect(&mut self, rect: OverlayRect);
    /// ### English
    /// Window-thread only.
    ///
    /// ### 中文
    /// 只能在窗口线程调用。
    fn set_visible(&mut self, visible: bool);
    fn resize_swapchain(&mut self, size: PhysicalSize<u32>) -> Result<(), GpuError>;
    /// ### English
    /// Draws `surface` into the swapchain and presents it.
    ///
    /// ### 中文
    /// 将 `surface` 绘制到交换链并呈现。
    fn present(
        &mut self,
        surface: &GpuSurfaceDescriptor,
        filter: VideoFilter,
    ) -> Result<(), GpuError>;
}

/// ### English
/// Creates presenters on the window-owning thread.
///
/// ### 中文
/// 在窗口所属线程上创建呈现器。
pub trait OverlayFactory: Send + Sync {
    fn create(
        &self,
        token: DeviceToken,
        rect: OverlayRect,
    ) -> Result<Box<dyn OverlayPresenter>, GpuError>;
}

/// ### English
/// Overlay state shared by the controller (platform thread) and the present worker.
///
/// ### 中文
/// 控制器（平台线程）与呈现 worker 共享的 overlay 状态。
pub(crate) struct OverlayState {
    factory: Option<Arc<dyn OverlayFactory>>,
    presenter: Mutex<Option<Box<dyn OverlayPresenter>>>,
    enabled: AtomicBool,
    rect: Mutex<OverlayRect>,
    swapchain: DebouncedResize,
    filter: AtomicU8,
    rebuild_pending: AtomicBool,
}

const FILTER_LINEAR: u8 = 0;
const FILTER_POINT: u8 = 1;

impl OverlayState {
    pub(crate) fn new(factory: Option<Arc<dyn OverlayFactory>>, debounce: Duration) -> Self {
        Self {
            factory,
            presenter: Mutex::new(None),
            enabled: AtomicBool::new(false),
            rect: Mutex::new(OverlayRect::default()),
            swapchain: DebouncedResize::new(debounce),
            filter: AtomicU8::new(FILTER_POINT),
            rebuild_pending: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.presenter.lock().is_some()
    }

    #[inline]
    pub(crate) fn rect(&self) -> OverlayRect {
        *self.rect.lock()
    }

    pub(crate) fn set_filter(&self, filter: VideoFilter) {
        let code = if filter.is_linear() {
            FILTER_LINEAR
        } else {
            FILTER_POINT
        };
        self.filter.store(code, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn filter(&self) -> VideoFilter {
        match self.filter.load(Ordering::Relaxed) {
            FILTER_LINEAR => VideoFilter::Linear,
            _ => VideoFilter::Point,
        }
    }

    /// ### English
    /// Enables the overlay at `rect`; builds the presenter now if a device is available.
    ///
    /// #### Parameters
    /// - `token`: Current device token, `None` without an active GPU session.
    /// - `rect`: Initial rectangle; `None` keeps the previous one.
    ///
    /// ### 中文
    /// 在 `rect` 处启用 overlay；若设备可用则立即创建呈现器。
    ///
    /// #### 参数
    /// - `token`：当前设备 token；无活动 GPU 会话时为 `None`。
    /// - `rect`：初始矩形；`None` 表示沿用之前的矩形。
    pub(crate) fn enable(
        &self,
        token: Option<DeviceToken>,
        rect: Option<OverlayRect>,
    ) -> Result<(), GpuError> {
        if let Some(rect) = rect {
            *self.rect.lock() = rect;
        }
        self.enabled.store(true, Ordering::Release);
        match token {
            Some(token) => self.build(token),
            None => Ok(()),
        }
    }

    pub(crate) fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.teardown();
    }

    /// ### English
    /// (Re)creates the presenter against `token`. Window-thread only.
    ///
    /// ### 中文
    /// 基于 `token` （重新）创建呈现器。只能在窗口线程调用。
    pub(crate) fn build(&self, token: DeviceToken) -> Result<(), GpuError> {
        self.rebuild_pending.store(false, Ordering::Release);
        if !self.is_enabled() {
            return Ok(());
        }
        let Some(factory) = self.factory.as_ref() else {
            tracing::debug!("native overlay requested without an overlay factory");
            return Ok(());
        };

        let rect = self.rect();
        let mut slot = self.presenter.lock();
        if let Some(mut old) = slot.take() {
            old.set_visible(false);
        }
        let mut presenter = factory.create(token, rect)?;
        presenter.set_rect(rect);
        presenter.set_visible(true);
        *slot = Some(presenter);
        drop(slot);

        self.swapchain.request_immediate(rect.size);
        tracing::info!(
            generation = token.generation,
            width = rect.size.width,
            height = rect.size.height,
            "native overlay built"
        );
        Ok(())
    }

    /// ### English
    /// Destroys the presenter but keeps the enabled flag. Window-thread only.
    ///
    /// ### 中文
    /// 销毁呈现器但保留启用标记。只能在窗口线程调用。
    pub(crate) fn teardown(&self) {
        if let Some(mut presenter) = self.presenter.lock().take() {
            presenter.set_visible(false);
        }
    }

    /// ### English
    /// Moves the overlay; the swapchain follows after the debounce period. Window-thread only.
    ///
    /// ### 中文
    /// 移动 overlay；交换链在防抖期后跟随。只能在窗口线程调用。
    pub(crate) fn update_rect(&self, rect: OverlayRect, now: Instant) {
        *self.rect.lock() = rect;
        if let Some(presenter) = self.presenter.lock().as_mut() {
            presenter.set_rect(rect);
        }
        self.swapchain.request(rect.size, now);
    }

    /// ### English
    /// Returns `true` if the caller should schedule a rebuild (first request since the last build).
    ///
    /// ### 中文
    /// 若调用方应调度一次重建（自上次创建后的首次请求）则返回 `true`。
    pub(crate) fn request_rebuild(&self) -> bool {
        !self.rebuild_pending.swap(true, Ordering::AcqRel)
    }

    /// ### English
    /// Worker-side present. Returns `Ok(false)` when there is nothing to present to or the
    /// presenter is busy with a window-thread call.
    ///
    /// ### 中文
    /// worker 侧呈现。当没有可呈现的目标，或呈现器正被窗口线程调用占用时返回 `Ok(false)`。
    pub(crate) fn present(
        &self,
        surface: &GpuSurfaceDescriptor,
        now: Instant,
    ) -> Result<bool, GpuError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let Some(mut slot) = self.presenter.try_lock() else {
            return Ok(false);
        };
        let Some(presenter) = slot.as_mut() else {
            return Ok(false);
        };
        if presenter.device_token() != surface.token {
            return Err(GpuError::StaleOverlay);
        }
        if let Some(size) = self.swapchain.take_ready(now) {
            presenter.resize_swapchain(size)?;
        }
        presenter.present(surface, self.filter())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::ChannelOrder;
    use crate::engine::testing::FakeOverlayFactory;

    fn descriptor(generation: u64) -> GpuSurfaceDescriptor {
        GpuSurfaceDescriptor {
            handle: 7,
            slot: 0,
            size: PhysicalSize::new(64, 64),
            source_size: PhysicalSize::new(64, 64),
            order: ChannelOrder::Rgba,
            token: DeviceToken {
                generation,
                share: 1,
            },
        }
    }

    fn token(generation: u64) -> DeviceToken {
        DeviceToken {
            generation,
            share: 1,
        }
    }

    #[test]
    fn enabling_without_device_defers_build() {
        let factory = FakeOverlayFactory::new();
        let state = OverlayState::new(Some(factory.clone()), Duration::from_millis(500));

        state.enable(None, Some(OverlayRect::new(10, 20, 300, 200))).unwrap();
        assert!(state.is_enabled());
        assert!(!state.is_active());
        assert_eq!(factory.created(), 0);

        state.build(token(1)).unwrap();
        assert!(state.is_active());
        assert_eq!(factory.log().last_rect(), Some(OverlayRect::new(10, 20, 300, 200)));
        assert!(factory.log().visible());
    }

    #[test]
    fn stale_device_token_is_never_presented() {
        let factory = FakeOverlayFactory::new();
        let state = OverlayState::new(Some(factory.clone()), Duration::from_millis(500));
        state.enable(Some(token(1)), None).unwrap();

        let now = Instant::now();
        assert_eq!(state.present(&descriptor(1), now), Ok(true));
        assert_eq!(state.present(&descriptor(2), now), Err(GpuError::StaleOverlay));
        assert_eq!(factory.log().presents(), 1);

        assert!(state.request_rebuild());
        assert!(!state.request_rebuild());
        state.build(token(2)).unwrap();
        assert_eq!(state.present(&descriptor(2), now), Ok(true));
        assert_eq!(factory.created(), 2);
        assert_eq!(factory.log().dropped(), 1);
    }

    #[test]
    fn swapchain_follows_geometry_after_debounce() {
        let factory = FakeOverlayFactory::new();
        let state = OverlayState::new(Some(factory.clone()), Duration::from_millis(500));
        state
            .enable(Some(token(1)), Some(OverlayRect::new(0, 0, 100, 100)))
            .unwrap();

        let start = Instant::now();
        state.present(&descriptor(1), start).unwrap();
        assert_eq!(factory.log().swapchain_sizes(), vec![PhysicalSize::new(100, 100)]);

        state.update_rect(OverlayRect::new(0, 0, 200, 150), start);
        state.update_rect(OverlayRect::new(0, 0, 400, 300), start);
        state.present(&descriptor(1), start).unwrap();
        assert_eq!(factory.log().swapchain_sizes().len(), 1);
        assert_eq!(factory.log().last_rect(), Some(OverlayRect::new(0, 0, 400, 300)));

        state
            .present(&descriptor(1), start + Duration::from_millis(600))
            .unwrap();
        assert_eq!(
            factory.log().swapchain_sizes(),
            vec![PhysicalSize::new(100, 100), PhysicalSize::new(400, 300)]
        );
    }

    #[test]
    fn disable_tears_down_presenter() {
        let factory = FakeOverlayFactory::new();
        let state = OverlayState::new(Some(factory.clone()), Duration::from_millis(500));
        state.enable(Some(token(1)), None).unwrap();
        state.disable();
        assert!(!state.is_active());
        assert!(!factory.log().visible());
        assert_eq!(state.present(&descriptor(1), Instant::now()), Ok(false));
    }
}
