use crate::engine::{EmbedderGlfwApi, install_embedder_glfw_api};

#[unsafe(no_mangle)]
/// ### English
/// Installs an embedder-provided GLFW function table.
///
/// Must be called before `frame_bridge_create` when a host window is passed for the GPU path.
/// All function pointers must come from the same GLFW library instance that created that
/// `GLFWwindow*`. Without an installed table, GPU textures fall back to the CPU backend.
///
/// Returns `true` on success.
///
/// ### 中文
/// 安装由宿主提供的 GLFW 函数表。
///
/// 当为 GPU 路径传入宿主窗口时，必须在 `frame_bridge_create` 之前调用。
/// 所有函数指针必须来自创建该 `GLFWwindow*` 的同一个 GLFW 库实例。
/// 未安装函数表时，GPU 纹理会回退到 CPU 后端。
///
/// 成功返回 `true`。
pub unsafe extern "C" fn frame_bridge_set_glfw_api(api: *const EmbedderGlfwApi) -> bool {
    if api.is_null() {
        return false;
    }

    let api = unsafe { *api };
    match install_embedder_glfw_api(api) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%err, "failed to install embedder GLFW API");
            false
        }
    }
}
