//! ### English
//! GLFW overlay presenter: an undecorated floating window whose context shares objects with the
//! GL device, so the committed slot texture can be blitted straight into its back buffer.
//!
//! ### 中文
//! GLFW overlay 呈现器：无边框置顶窗口，其上下文与 GL 设备共享对象，
//! 因此可以直接把已提交槽位的纹理 blit 到它的后缓冲。

use std::num::NonZeroU32;

use dpi::PhysicalSize;
use glow::HasContext as _;

use super::{OverlayFactory, OverlayPresenter, OverlayRect};
use crate::engine::config::VideoFilter;
use crate::engine::error::{DeviceError, GpuError};
use crate::engine::glfw::{self, GlfwWindowPtr, SharedWindowKind};
use crate::engine::gpu::gl::GL_CONTEXT_LOST;
use crate::engine::gpu::gl::context::{bind_window, forget_window};
use crate::engine::gpu::{DeviceToken, GpuSurfaceDescriptor};

/// ### English
/// Creates overlay windows positioned relative to the embedder's host window.
///
/// ### 中文
/// 创建相对于宿主窗口定位的 overlay 窗口。
pub struct GlfwOverlayFactory {
    host_window: usize,
}

impl GlfwOverlayFactory {
    pub fn new(host_window: usize) -> Self {
        Self { host_window }
    }
}

impl OverlayFactory for GlfwOverlayFactory {
    fn create(
        &self,
        token: DeviceToken,
        rect: OverlayRect,
    ) -> Result<Box<dyn OverlayPresenter>, GpuError> {
        let api = glfw::LoadedGlfwApi::load().map_err(GpuError::DeviceUnavailable)?;
        if !api.supports_overlay() {
            return Err(GpuError::DeviceUnavailable(
                "embedder GLFW API lacks window-control entries".to_string(),
            ));
        }
        let share = token.share as usize as GlfwWindowPtr;
        let window = unsafe {
            api.create_shared_window(
                share,
                SharedWindowKind::Overlay {
                    width: rect.size.width,
                    height: rect.size.height,
                },
            )
        }
        .map_err(|err| GpuError::Device(DeviceError::Create(err)))?;

        let mut presenter = GlfwOverlay {
            api,
            window,
            host_window: self.host_window as GlfwWindowPtr,
            device_window: share,
            token,
            gl: None,
            read_framebuffer: None,
            drawable: rect.size,
        };
        presenter.set_rect(rect);
        tracing::debug!(
            generation = token.generation,
            width = rect.size.width,
            height = rect.size.height,
            "overlay window created"
        );
        Ok(Box::new(presenter))
    }
}

struct GlfwOverlay {
    api: glfw::LoadedGlfwApi,
    window: GlfwWindowPtr,
    host_window: GlfwWindowPtr,
    /// ### English
    /// Device context re-bound after every present so the worker keeps its own context current.
    ///
    /// ### 中文
    /// 每次呈现后重新绑定的设备上下文，使 worker 保持其自身上下文为 current。
    device_window: GlfwWindowPtr,
    token: DeviceToken,
    /// ### English
    /// Loaded lazily on the presenting thread; GLFW requires a current context to resolve procs.
    ///
    /// ### 中文
    /// 在呈现线程上延迟加载；GLFW 解析函数指针需要 current 上下文。
    gl: Option<glow::Context>,
    read_framebuffer: Option<glow::Framebuffer>,
    drawable: PhysicalSize<u32>,
}

/// ### English
/// Window calls happen on the platform thread and presents on the worker, serialized by the
/// overlay state's presenter lock.
///
/// ### 中文
/// 窗口调用发生在平台线程，呈现发生在 worker 上，二者由 overlay 状态的呈现器锁串行化。
unsafe impl Send for GlfwOverlay {}

impl GlfwOverlay {
    fn ensure_gl(&mut self) -> Result<(), GpuError> {
        if self.gl.is_some() {
            return Ok(());
        }
        let api = self.api;
        let gl = unsafe {
            glow::Context::from_loader_function_cstr(|name| {
                api.get_proc_address(name) as *const _
            })
        };
        unsafe { api.swap_interval(0) };
        let framebuffer = unsafe { gl.create_framebuffer() }
            .map_err(|err| GpuError::Device(DeviceError::Create(err)))?;
        self.read_framebuffer = Some(framebuffer);
        self.gl = Some(gl);
        Ok(())
    }

    fn blit(
        &mut self,
        texture: glow::Texture,
        source: PhysicalSize<u32>,
        filter: VideoFilter,
    ) -> Result<(), GpuError> {
        self.ensure_gl()?;
        let (Some(gl), Some(framebuffer)) = (self.gl.as_ref(), self.read_framebuffer) else {
            return Err(GpuError::DeviceUnavailable("overlay GL not loaded".to_string()));
        };
        let src_w = source.width.min(i32::MAX as u32) as i32;
        let src_h = source.height.min(i32::MAX as u32) as i32;
        let dst_w = self.drawable.width.min(i32::MAX as u32) as i32;
        let dst_h = self.drawable.height.min(i32::MAX as u32) as i32;
        let gl_filter = if filter.is_linear() {
            glow::LINEAR
        } else {
            glow::NEAREST
        };

        let error = unsafe {
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::READ_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            gl.viewport(0, 0, dst_w, dst_h);
            /*
            ### English
            Slot rows are stored top row first; the window origin is bottom-left, so flip Y.

            ### 中文
            槽位按首行在前存储；窗口原点在左下角，因此翻转 Y。
            */
            gl.blit_framebuffer(
                0,
                0,
                src_w,
                src_h,
                0,
                dst_h,
                dst_w,
                0,
                glow::COLOR_BUFFER_BIT,
                gl_filter,
            );
            gl.framebuffer_texture_2d(
                glow::READ_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                None,
                0,
            );
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
            gl.get_error()
        };

        match error {
            glow::NO_ERROR => Ok(()),
            GL_CONTEXT_LOST => Err(GpuError::Device(DeviceError::Lost)),
            other => {
                tracing::trace!(error = other, "overlay blit reported a GL error");
                Ok(())
            }
        }
    }
}

impl OverlayPresenter for GlfwOverlay {
    fn device_token(&self) -> DeviceToken {
        self.token
    }

    fn set_rect(&mut self, rect: OverlayRect) {
        let (host_x, host_y) = unsafe { self.api.window_pos(self.host_window) };
        unsafe {
            self.api.set_window_pos(
                self.window,
                host_x.saturating_add(rect.position.x),
                host_y.saturating_add(rect.position.y),
            );
            self.api
                .set_window_size(self.window, rect.size.width, rect.size.height);
        }
    }

    fn set_visible(&mut self, visible: bool) {
        unsafe { self.api.set_window_visible(self.window, visible) };
    }

    fn resize_swapchain(&mut self, size: PhysicalSize<u32>) -> Result<(), GpuError> {
        if size.width == 0 || size.height == 0 {
            return Err(GpuError::ZeroSize {
                width: size.width,
                height: size.height,
            });
        }
        self.drawable = size;
        Ok(())
    }

    fn present(
        &mut self,
        surface: &GpuSurfaceDescriptor,
        filter: VideoFilter,
    ) -> Result<(), GpuError> {
        if surface.token != self.token {
            return Err(GpuError::StaleOverlay);
        }
        let Some(name) = u32::try_from(surface.handle).ok().and_then(NonZeroU32::new) else {
            return Err(GpuError::DeviceUnavailable(format!(
                "invalid GL texture handle {}",
                surface.handle
            )));
        };

        bind_window(&self.api, self.window);
        let result = self.blit(glow::NativeTexture(name), surface.size, filter);
        if result.is_ok() {
            unsafe { self.api.swap_buffers(self.window) };
        }
        bind_window(&self.api, self.device_window);
        result
    }
}

impl Drop for GlfwOverlay {
    fn drop(&mut self) {
        forget_window(self.window);
        unsafe { self.api.destroy_window(self.window) };
        tracing::debug!(generation = self.token.generation, "overlay window destroyed");
    }
}
