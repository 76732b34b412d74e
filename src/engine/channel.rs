//! ### English
//! Method-channel dispatch: validates loosely typed argument maps from the host UI layer and
//! routes them to the session controller.
//!
//! ### 中文
//! 方法通道分发：校验宿主 UI 层传入的弱类型参数表，并转发给会话控制器。

use std::collections::HashMap;

use super::config::VideoFilter;
use super::controller::SessionController;
use super::error::BridgeError;
use super::overlay::OverlayRect;

/// ### English
/// Loosely typed value as carried by the host's method channel.
///
/// ### 中文
/// 宿主方法通道所携带的弱类型值。
#[derive(Debug, Clone, PartialEq)]
pub enum MethodValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl MethodValue {
    /// ### English
    /// Numeric value, accepting both integers and doubles (doubles are truncated).
    ///
    /// ### 中文
    /// 数值；同时接受整数与浮点数（浮点数截断）。
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(value) => Some(value),
            Self::Double(value) if value.is_finite() => Some(value as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(value) => Some(value),
            _ => None,
        }
    }
}

pub type MethodArgs = HashMap<String, MethodValue>;

fn bad_args(message: impl Into<String>) -> BridgeError {
    BridgeError::BadArgs(message.into())
}

fn require_map(args: Option<&MethodArgs>) -> Result<&MethodArgs, BridgeError> {
    args.ok_or_else(|| bad_args("Expected map"))
}

fn int_arg(args: &MethodArgs, key: &str) -> Result<Option<i64>, BridgeError> {
    match args.get(key) {
        None | Some(MethodValue::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| bad_args(format!("`{key}` must be a number"))),
    }
}

fn bool_arg(args: &MethodArgs, key: &str) -> Result<Option<bool>, BridgeError> {
    match args.get(key) {
        None | Some(MethodValue::Null) => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| bad_args(format!("`{key}` must be a bool"))),
    }
}

fn dimension(value: i64, key: &str) -> Result<u32, BridgeError> {
    u32::try_from(value)
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| bad_args(format!("`{key}` must be > 0")))
}

fn coordinate(value: i64, key: &str) -> Result<i32, BridgeError> {
    i32::try_from(value).map_err(|_| bad_args(format!("`{key}` is out of range")))
}

/// ### English
/// Reads `x/y/width/height`; `Ok(None)` if none of them is present.
///
/// ### 中文
/// 读取 `x/y/width/height`；四者都不存在时返回 `Ok(None)`。
fn rect_arg(args: &MethodArgs) -> Result<Option<OverlayRect>, BridgeError> {
    let x = int_arg(args, "x")?;
    let y = int_arg(args, "y")?;
    let width = int_arg(args, "width")?;
    let height = int_arg(args, "height")?;
    match (x, y, width, height) {
        (None, None, None, None) => Ok(None),
        (Some(x), Some(y), Some(width), Some(height)) => Ok(Some(OverlayRect::new(
            coordinate(x, "x")?,
            coordinate(y, "y")?,
            dimension(width, "width")?,
            dimension(height, "height")?,
        ))),
        _ => Err(bad_args("Missing x/y/width/height")),
    }
}

/// ### English
/// Handles one method call and returns its result value.
///
/// #### Parameters
/// - `controller`: Target session controller.
/// - `method`: Method name.
/// - `args`: Argument map, if the call carried one.
///
/// ### 中文
/// 处理一次方法调用并返回结果值。
///
/// #### 参数
/// - `controller`：目标会话控制器。
/// - `method`：方法名。
/// - `args`：参数表（若调用携带）。
pub fn handle_method_call(
    controller: &SessionController,
    method: &str,
    args: Option<&MethodArgs>,
) -> Result<MethodValue, BridgeError> {
    match method {
        "createNesTexture" => {
            let (mut width, mut height) = (0, 0);
            if let Some(args) = args {
                if let (Some(w), Some(h)) = (int_arg(args, "width")?, int_arg(args, "height")?) {
                    width = u32::try_from(w).unwrap_or(0);
                    height = u32::try_from(h).unwrap_or(0);
                }
            }
            controller.create(width, height).map(MethodValue::Int)
        }
        "disposeNesTexture" => {
            controller.dispose();
            Ok(MethodValue::Null)
        }
        "setPresentBufferSize" => {
            let args = require_map(args)?;
            let (Some(width), Some(height)) = (int_arg(args, "width")?, int_arg(args, "height")?)
            else {
                return Err(bad_args("Missing width/height"));
            };
            controller.set_present_buffer_size(
                dimension(width, "width")?,
                dimension(height, "height")?,
            )?;
            Ok(MethodValue::Null)
        }
        "setWindowsVideoBackend" => {
            let args = require_map(args)?;
            let use_gpu = bool_arg(args, "useGpu")?.ok_or_else(|| bad_args("Missing useGpu"))?;
            Ok(controller
                .set_backend(use_gpu)?
                .map_or(MethodValue::Null, MethodValue::Int))
        }
        "setNativeOverlay" => {
            let args = require_map(args)?;
            let enabled = bool_arg(args, "enabled")?.unwrap_or(false);
            let rect = if enabled { rect_arg(args)? } else { None };
            controller.set_native_overlay(enabled, rect)?;
            Ok(MethodValue::Null)
        }
        "updateNativeOverlayRect" => {
            let args = require_map(args)?;
            let rect = rect_arg(args)?.ok_or_else(|| bad_args("Missing x/y/width/height"))?;
            controller.update_overlay_rect(rect)?;
            Ok(MethodValue::Null)
        }
        "setVideoFilter" => {
            let args = require_map(args)?;
            if let Some(code) = int_arg(args, "filter")? {
                let filter = VideoFilter::from_code(code)
                    .ok_or_else(|| bad_args(format!("unknown filter {code}")))?;
                controller.set_video_filter(filter);
            }
            Ok(MethodValue::Null)
        }
        other => Err(BridgeError::NotImplemented(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compositor::BackendKind;
    use crate::engine::config::BridgeConfig;
    use crate::engine::controller::BridgeCollaborators;
    use crate::engine::testing::{FakeProducer, FakeRegistrar, InlineDispatcher};
    use std::sync::Arc;

    fn controller() -> SessionController {
        SessionController::new(
            BridgeConfig::default(),
            BridgeCollaborators {
                producer: FakeProducer::new(),
                registrar: Some(FakeRegistrar::new()),
                dispatcher: Arc::new(InlineDispatcher),
                gpu: None,
                overlay: None,
            },
        )
    }

    fn args(pairs: &[(&str, MethodValue)]) -> MethodArgs {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn create_accepts_missing_or_numeric_sizes() {
        let controller = controller();
        let first = handle_method_call(&controller, "createNesTexture", None).unwrap();
        let again = handle_method_call(
            &controller,
            "createNesTexture",
            Some(&args(&[
                ("width", MethodValue::Double(256.0)),
                ("height", MethodValue::Int(240)),
            ])),
        )
        .unwrap();
        assert_eq!(first, again);
        assert!(matches!(first, MethodValue::Int(id) if id >= 0));
    }

    #[test]
    fn malformed_arguments_are_bad_args() {
        let controller = controller();
        let cases: Vec<(&str, Option<MethodArgs>)> = vec![
            ("setPresentBufferSize", None),
            (
                "setPresentBufferSize",
                Some(args(&[("width", MethodValue::Int(10))])),
            ),
            (
                "setPresentBufferSize",
                Some(args(&[
                    ("width", MethodValue::Int(-1)),
                    ("height", MethodValue::Int(10)),
                ])),
            ),
            (
                "setWindowsVideoBackend",
                Some(args(&[("useGpu", MethodValue::Int(1))])),
            ),
            ("setWindowsVideoBackend", Some(MethodArgs::new())),
            (
                "updateNativeOverlayRect",
                Some(args(&[("x", MethodValue::Int(1))])),
            ),
            (
                "setVideoFilter",
                Some(args(&[("filter", MethodValue::String("linear".into()))])),
            ),
            ("setVideoFilter", Some(args(&[("filter", MethodValue::Int(7))]))),
        ];
        for (method, call_args) in cases {
            let err = handle_method_call(&controller, method, call_args.as_ref()).unwrap_err();
            assert_eq!(err.code(), "bad_args", "{method} {call_args:?}");
        }
    }

    #[test]
    fn unknown_methods_are_not_implemented() {
        let controller = controller();
        let err = handle_method_call(&controller, "reboot", None).unwrap_err();
        assert_eq!(err.code(), "not_implemented");
    }

    #[test]
    fn backend_switch_and_filter_round_trip() {
        let controller = controller();
        handle_method_call(&controller, "createNesTexture", None).unwrap();
        let result = handle_method_call(
            &controller,
            "setWindowsVideoBackend",
            Some(&args(&[("useGpu", MethodValue::Bool(false))])),
        )
        .unwrap();
        assert!(matches!(result, MethodValue::Int(_)));
        assert_eq!(controller.backend_kind(), Some(BackendKind::Cpu));

        handle_method_call(
            &controller,
            "setVideoFilter",
            Some(&args(&[("filter", MethodValue::Int(0))])),
        )
        .unwrap();
        assert_eq!(controller.video_filter(), VideoFilter::Linear);

        assert_eq!(
            handle_method_call(&controller, "disposeNesTexture", None),
            Ok(MethodValue::Null)
        );
        assert_eq!(controller.texture_id(), -1);
    }

    #[test]
    fn overlay_calls_validate_rects() {
        let controller = controller();
        assert_eq!(
            handle_method_call(
                &controller,
                "setNativeOverlay",
                Some(&args(&[
                    ("enabled", MethodValue::Bool(true)),
                    ("x", MethodValue::Double(4.5)),
                    ("y", MethodValue::Int(2)),
                    ("width", MethodValue::Int(320)),
                    ("height", MethodValue::Int(240)),
                ])),
            ),
            Ok(MethodValue::Null)
        );
        assert_eq!(
            handle_method_call(
                &controller,
                "updateNativeOverlayRect",
                Some(&args(&[
                    ("x", MethodValue::Int(0)),
                    ("y", MethodValue::Int(0)),
                    ("width", MethodValue::Int(0)),
                    ("height", MethodValue::Int(240)),
                ])),
            )
            .unwrap_err()
            .code(),
            "bad_args"
        );
        assert_eq!(
            handle_method_call(
                &controller,
                "setNativeOverlay",
                Some(&args(&[("enabled", MethodValue::Bool(false))])),
            ),
            Ok(MethodValue::Null)
        );
    }
}
