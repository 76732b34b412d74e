/// ### English
/// `frame_bridge` crate root.
/// Exposes the C ABI via `ffi`; the presentation pipeline lives under `engine`.
///
/// ### 中文
/// `frame_bridge` 的 crate 根。
/// 通过 `ffi` 导出 C ABI；呈现管线位于 `engine` 模块。
pub mod engine;
mod ffi;
