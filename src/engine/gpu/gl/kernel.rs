//! ### English
//! Conversion kernel: a fullscreen-triangle program that samples the source texture, optionally
//! swaps the red and blue channels, and writes into the destination framebuffer. Scaling comes
//! from the viewport and the sampler filter.
//!
//! ### 中文
//! 转换内核：全屏三角形程序，采样源纹理、可选地交换红蓝通道，并写入目标 framebuffer。
//! 缩放由 viewport 与采样过滤方式完成。

use glow::HasContext as _;

use crate::engine::error::DeviceError;

const VERTEX_BODY: &str = r"
out vec2 v_uv;
void main() {
    vec2 pos = vec2(float((gl_VertexID << 1) & 2), float(gl_VertexID & 2));
    v_uv = pos;
    gl_Position = vec4(pos * 2.0 - 1.0, 0.0, 1.0);
}
";

const FRAGMENT_BODY: &str = r"
uniform sampler2D u_source;
uniform int u_swizzle;
in vec2 v_uv;
out vec4 o_color;
void main() {
    vec4 color = texture(u_source, v_uv);
    o_color = u_swizzle != 0 ? color.bgra : color;
}
";

/// ### English
/// Compiled program plus the empty VAO required to draw attribute-less geometry.
///
/// ### 中文
/// 已编译的程序，以及绘制无属性几何所需的空 VAO。
pub struct GlKernel {
    pub(super) program: glow::Program,
    pub(super) vao: glow::VertexArray,
    pub(super) u_swizzle: Option<glow::UniformLocation>,
}

fn compile_stage(
    gl: &glow::Context,
    stage: u32,
    source: &str,
) -> Result<glow::Shader, DeviceError> {
    unsafe {
        let shader = gl.create_shader(stage).map_err(DeviceError::Create)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(DeviceError::Create(format!("shader compile error: {log}")));
        }
        Ok(shader)
    }
}

/// ### English
/// Builds the conversion program for the current context.
///
/// #### Parameters
/// - `gl`: Context the program is created in (must be current).
/// - `is_gles`: Selects the GLSL ES 3.00 header instead of GLSL 3.30 core.
///
/// ### 中文
/// 为当前上下文构建转换程序。
///
/// #### 参数
/// - `gl`：创建程序所在的上下文（必须为 current）。
/// - `is_gles`：选择 GLSL ES 3.00 头部而非 GLSL 3.30 core。
pub(super) fn build(gl: &glow::Context, is_gles: bool) -> Result<GlKernel, DeviceError> {
    let header = if is_gles {
        "#version 300 es\nprecision mediump float;\n"
    } else {
        "#version 330 core\n"
    };
    let vs_src = format!("{header}{VERTEX_BODY}");
    let fs_src = format!("{header}{FRAGMENT_BODY}");

    let vs = compile_stage(gl, glow::VERTEX_SHADER, &vs_src)?;
    let fs = match compile_stage(gl, glow::FRAGMENT_SHADER, &fs_src) {
        Ok(fs) => fs,
        Err(err) => {
            unsafe { gl.delete_shader(vs) };
            return Err(err);
        }
    };

    unsafe {
        let program = match gl.create_program() {
            Ok(program) => program,
            Err(err) => {
                gl.delete_shader(vs);
                gl.delete_shader(fs);
                return Err(DeviceError::Create(err));
            }
        };
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);
        let linked = gl.get_program_link_status(program);
        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        if !linked {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(DeviceError::Create(format!("program link error: {log}")));
        }

        gl.use_program(Some(program));
        if let Some(loc) = gl.get_uniform_location(program, "u_source") {
            gl.uniform_1_i32(Some(&loc), 0);
        }
        let u_swizzle = gl.get_uniform_location(program, "u_swizzle");
        gl.use_program(None);

        let vao = match gl.create_vertex_array() {
            Ok(vao) => vao,
            Err(err) => {
                gl.delete_program(program);
                return Err(DeviceError::Create(err));
            }
        };

        Ok(GlKernel {
            program,
            vao,
            u_swizzle,
        })
    }
}

pub(super) fn release(gl: &glow::Context, kernel: GlKernel) {
    unsafe {
        gl.delete_vertex_array(kernel.vao);
        gl.delete_program(kernel.program);
    }
}
