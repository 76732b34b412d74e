//! ### English
//! OpenGL implementation of `GpuDevice`.
//!
//! - Staging: a pixel-unpack buffer (PBO) mapped write-only.
//! - Shared/intermediate texture: RGBA8 texture with its own framebuffer; the exported handle is
//!   the texture name, valid in every context of the host share group.
//! - Query: a `GL_SYNC_GPU_COMMANDS_COMPLETE` fence polled with a zero timeout.
//!
//! ### 中文
//! `GpuDevice` 的 OpenGL 实现。
//!
//! - Staging：以只写方式映射的像素解包缓冲区（PBO）。
//! - 共享/中间纹理：带独立 framebuffer 的 RGBA8 纹理；导出句柄为纹理名，在宿主共享组的所有上下文中有效。
//! - Query：`GL_SYNC_GPU_COMMANDS_COMPLETE` fence，以零超时轮询。

use std::ptr::NonNull;

use dpi::PhysicalSize;
use glow::HasContext as _;

use super::context::GlContext;
use super::kernel::{self, GlKernel};
use crate::engine::config::{BYTES_PER_PIXEL, ChannelOrder, VideoFilter};
use crate::engine::error::DeviceError;
use crate::engine::glfw::GlfwWindowPtr;
use crate::engine::gpu::device::{
    ConversionParams, DeviceStatus, ExportHandle, GpuDevice, StagingMapping,
};

/// ### English
/// `GL_CONTEXT_LOST` (GL 4.5 / KHR_robustness); not exported by every glow build.
///
/// ### 中文
/// `GL_CONTEXT_LOST`（GL 4.5 / KHR_robustness）；并非所有 glow 构建都导出该常量。
pub(crate) const GL_CONTEXT_LOST: u32 = 0x0507;

/// ### English
/// Upper bound on `glGetError` drains per check; the error queue is finite but a lost
/// context may keep reporting.
///
/// ### 中文
/// 每次检查最多读取 `glGetError` 的次数；错误队列有限，但丢失的上下文可能持续报告错误。
const MAX_ERROR_DRAIN: usize = 16;

pub struct GlStaging {
    buffer: glow::Buffer,
    size: PhysicalSize<u32>,
    len: i32,
}

pub struct GlTexture {
    texture: glow::Texture,
    framebuffer: glow::Framebuffer,
    size: PhysicalSize<u32>,
}

/// ### English
/// Fence wrapper; `GLsync` is an opaque pointer owned by the context.
///
/// ### 中文
/// fence 封装；`GLsync` 是由上下文持有的不透明指针。
pub struct GlFence(glow::Fence);

unsafe impl Send for GlFence {}

/// ### English
/// One incarnation of the OpenGL device: an offscreen context plus loss tracking.
///
/// ### 中文
/// OpenGL 设备的一次实例：离屏上下文加丢失状态跟踪。
pub struct GlDevice {
    ctx: GlContext,
    lost: bool,
    /// ### English
    /// Set by `release_thread`; later calls come from a foreign thread.
    ///
    /// ### 中文
    /// 由 `release_thread` 设置；之后的调用来自外部线程。
    detached: bool,
    /// ### English
    /// Context that was current on the foreign thread before we attached.
    ///
    /// ### 中文
    /// 附加前外部线程上原本 current 的上下文。
    restore: Option<GlfwWindowPtr>,
}

unsafe impl Send for GlDevice {}

impl GlDevice {
    /// ### English
    /// Wraps a freshly created context; rejects contexts older than GL 3.2 / GLES 3.0.
    ///
    /// ### 中文
    /// 封装新创建的上下文；拒绝低于 GL 3.2 / GLES 3.0 的上下文。
    pub(crate) fn new(ctx: GlContext) -> Result<Self, DeviceError> {
        if !ctx.meets_minimum_version() {
            return Err(DeviceError::Unsupported(
                "OpenGL 3.2 or OpenGL ES 3.0 is required".to_string(),
            ));
        }
        Ok(Self {
            ctx,
            lost: false,
            detached: false,
            restore: None,
        })
    }

    fn bind(&mut self) {
        if self.detached {
            if self.restore.is_none() {
                self.restore = Some(self.ctx.attach_foreign());
            }
            return;
        }
        self.ctx.make_current();
    }

    #[inline]
    fn gl(&self) -> &glow::Context {
        self.ctx.gl()
    }

    /// ### English
    /// Drains pending GL errors; context loss is sticky.
    ///
    /// ### 中文
    /// 读取并清空待处理的 GL 错误；上下文丢失状态是粘滞的。
    fn check(&mut self, what: &str) -> Result<(), DeviceError> {
        if self.lost {
            return Err(DeviceError::Lost);
        }
        let mut first = None;
        for _ in 0..MAX_ERROR_DRAIN {
            let err = unsafe { self.gl().get_error() };
            if err == glow::NO_ERROR {
                break;
            }
            if err == GL_CONTEXT_LOST {
                self.lost = true;
                tracing::warn!(what, "GL context lost");
                return Err(DeviceError::Lost);
            }
            first.get_or_insert(err);
        }
        match first {
            None => Ok(()),
            Some(err) => Err(DeviceError::Create(format!("{what}: GL error 0x{err:04X}"))),
        }
    }

    fn create_texture(&mut self, size: PhysicalSize<u32>) -> Result<GlTexture, DeviceError> {
        self.bind();
        let (width, height) = gl_size(size)?;
        let gl = self.ctx.gl();
        let texture = unsafe { gl.create_texture() }.map_err(DeviceError::Create)?;
        let framebuffer = match unsafe { gl.create_framebuffer() } {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                unsafe { gl.delete_texture(texture) };
                return Err(DeviceError::Create(err));
            }
        };
        let complete = unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(None),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);

            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            status == glow::FRAMEBUFFER_COMPLETE
        };

        let texture = GlTexture {
            texture,
            framebuffer,
            size,
        };
        let checked = self.check("create_texture").and_then(|()| {
            if complete {
                Ok(())
            } else {
                Err(DeviceError::Create("framebuffer incomplete".to_string()))
            }
        });
        if let Err(err) = checked {
            self.release_texture(texture);
            return Err(err);
        }
        Ok(texture)
    }

    /// ### English
    /// Uploads the staging PBO into `dst` (same size, RGBA byte order).
    ///
    /// ### 中文
    /// 将 staging PBO 上传到 `dst`（尺寸相同，RGBA 字节序）。
    fn upload_pbo(&mut self, staging: &GlStaging, dst: &GlTexture) -> Result<(), DeviceError> {
        if staging.size != dst.size {
            return Err(DeviceError::Unsupported(format!(
                "staging {}x{} does not match texture {}x{}",
                staging.size.width, staging.size.height, dst.size.width, dst.size.height
            )));
        }
        self.bind();
        let (width, height) = gl_size(dst.size)?;
        let gl = self.ctx.gl();
        unsafe {
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, Some(staging.buffer));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
            gl.bind_texture(glow::TEXTURE_2D, Some(dst.texture));
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::BufferOffset(0),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
        }
        self.check("upload")
    }
}

fn gl_size(size: PhysicalSize<u32>) -> Result<(i32, i32), DeviceError> {
    match (i32::try_from(size.width), i32::try_from(size.height)) {
        (Ok(width), Ok(height)) if width > 0 && height > 0 => Ok((width, height)),
        _ => Err(DeviceError::Create(format!(
            "invalid texture size {}x{}",
            size.width, size.height
        ))),
    }
}

fn gl_filter(filter: VideoFilter) -> i32 {
    if filter.is_linear() {
        glow::LINEAR as i32
    } else {
        glow::NEAREST as i32
    }
}

impl GpuDevice for GlDevice {
    type Staging = GlStaging;
    type Texture = GlTexture;
    type Kernel = GlKernel;
    type Query = GlFence;

    fn status(&mut self) -> DeviceStatus {
        if self.lost {
            return DeviceStatus::Lost;
        }
        self.bind();
        match self.check("status") {
            Err(DeviceError::Lost) => DeviceStatus::Lost,
            Err(err) => {
                tracing::trace!(%err, "stale GL error drained");
                DeviceStatus::Ready
            }
            Ok(()) => DeviceStatus::Ready,
        }
    }

    fn native_order(&self) -> ChannelOrder {
        ChannelOrder::Rgba
    }

    fn share_handle(&self) -> u64 {
        self.ctx.window() as usize as u64
    }

    fn create_staging(&mut self, size: PhysicalSize<u32>) -> Result<GlStaging, DeviceError> {
        self.bind();
        let (width, height) = gl_size(size)?;
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL))
            .and_then(|bytes| i32::try_from(bytes).ok())
            .ok_or_else(|| DeviceError::Create(format!("staging {width}x{height} too large")))?;

        let gl = self.ctx.gl();
        let buffer = unsafe { gl.create_buffer() }.map_err(DeviceError::Create)?;
        unsafe {
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, Some(buffer));
            gl.buffer_data_size(glow::PIXEL_UNPACK_BUFFER, len, glow::STREAM_DRAW);
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
        }
        let staging = GlStaging { buffer, size, len };
        if let Err(err) = self.check("create_staging") {
            self.release_staging(staging);
            return Err(err);
        }
        Ok(staging)
    }

    fn create_shared(
        &mut self,
        size: PhysicalSize<u32>,
    ) -> Result<(GlTexture, ExportHandle), DeviceError> {
        let texture = self.create_texture(size)?;
        let handle = u64::from(texture.texture.0.get());
        Ok((texture, handle))
    }

    fn create_intermediate(&mut self, size: PhysicalSize<u32>) -> Result<GlTexture, DeviceError> {
        self.create_texture(size)
    }

    fn compile_conversion(&mut self) -> Result<GlKernel, DeviceError> {
        self.bind();
        let kernel = kernel::build(self.ctx.gl(), self.ctx.is_gles())?;
        if let Err(err) = self.check("compile_conversion") {
            self.release_kernel(kernel);
            return Err(err);
        }
        tracing::debug!("conversion kernel compiled");
        Ok(kernel)
    }

    fn map_staging(&mut self, staging: &mut GlStaging) -> Result<StagingMapping, DeviceError> {
        self.bind();
        let gl = self.ctx.gl();
        let ptr = unsafe {
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, Some(staging.buffer));
            let ptr = gl.map_buffer_range(
                glow::PIXEL_UNPACK_BUFFER,
                0,
                staging.len,
                glow::MAP_WRITE_BIT | glow::MAP_INVALIDATE_BUFFER_BIT,
            );
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
            ptr
        };
        self.check("map_staging")?;
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| DeviceError::Map("glMapBufferRange returned NULL".to_string()))?;
        Ok(StagingMapping {
            ptr,
            len: staging.len as usize,
            pitch: staging.size.width as usize * BYTES_PER_PIXEL,
        })
    }

    fn unmap_staging(&mut self, staging: &mut GlStaging) {
        self.bind();
        let gl = self.ctx.gl();
        unsafe {
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, Some(staging.buffer));
            gl.unmap_buffer(glow::PIXEL_UNPACK_BUFFER);
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
        }
    }

    fn upload(&mut self, staging: &GlStaging, dst: &GlTexture) -> Result<(), DeviceError> {
        self.upload_pbo(staging, dst)
    }

    fn run_conversion(
        &mut self,
        kernel: &GlKernel,
        src: &GlTexture,
        dst: &GlTexture,
        params: &ConversionParams,
    ) -> Result<(), DeviceError> {
        self.bind();
        let (width, height) = gl_size(dst.size)?;
        let filter = gl_filter(params.filter);
        let gl = self.ctx.gl();
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(dst.framebuffer));
            gl.viewport(0, 0, width, height);
            gl.disable(glow::BLEND);
            gl.disable(glow::SCISSOR_TEST);
            gl.disable(glow::DEPTH_TEST);

            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(src.texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter);

            gl.use_program(Some(kernel.program));
            gl.uniform_1_i32(kernel.u_swizzle.as_ref(), i32::from(params.swizzle));
            gl.bind_vertex_array(Some(kernel.vao));
            gl.draw_arrays(glow::TRIANGLES, 0, 3);
            gl.bind_vertex_array(None);
            gl.use_program(None);

            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        self.check("run_conversion")
    }

    fn copy_direct(&mut self, staging: &GlStaging, dst: &GlTexture) -> Result<(), DeviceError> {
        self.upload_pbo(staging, dst)
    }

    fn issue_query(&mut self) -> Option<GlFence> {
        self.bind();
        unsafe { self.gl().fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) }
            .ok()
            .map(GlFence)
    }

    fn poll_query(&mut self, query: &GlFence) -> bool {
        if self.lost {
            return true;
        }
        self.bind();
        let status = unsafe { self.gl().client_wait_sync(query.0, 0, 0) };
        /*
        ### English
        WAIT_FAILED counts as done; the next health check reports a lost context.

        ### 中文
        WAIT_FAILED 视为已完成；下一次健康检查会报告上下文丢失。
        */
        status != glow::TIMEOUT_EXPIRED
    }

    fn flush(&mut self) {
        self.bind();
        unsafe { self.gl().flush() };
    }

    fn release_query(&mut self, query: GlFence) {
        self.bind();
        unsafe { self.gl().delete_sync(query.0) };
    }

    fn release_staging(&mut self, staging: GlStaging) {
        self.bind();
        unsafe { self.gl().delete_buffer(staging.buffer) };
    }

    fn release_texture(&mut self, texture: GlTexture) {
        self.bind();
        unsafe {
            self.gl().delete_framebuffer(texture.framebuffer);
            self.gl().delete_texture(texture.texture);
        }
    }

    fn release_kernel(&mut self, kernel: GlKernel) {
        self.bind();
        kernel::release(self.ctx.gl(), kernel);
    }

    fn release_thread(&mut self) {
        self.ctx.detach();
        self.detached = true;
    }
}

impl Drop for GlDevice {
    fn drop(&mut self) {
        if let Some(previous) = self.restore.take() {
            self.ctx.restore(previous);
        }
    }
}
