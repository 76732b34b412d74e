//! ### English
//! Adapters from host-supplied C function tables to the engine's producer / registrar traits.
//!
//! ### 中文
//! 将宿主提供的 C 函数表适配为引擎的生产者/注册器 trait。

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::engine::{
    ChannelOrder, FrameProducer, FrameReadyCallback, PendingFrame, PlatformTask, TextureId,
    TextureRegistrar, TextureVariant, WakeCallback,
};

/// ### English
/// Frame-ready callback invoked by the producer thread.
///
/// ### 中文
/// 由生产者线程调用的帧就绪回调。
pub type FrameBridgeFrameReadyFn =
    unsafe extern "C" fn(buffer_index: u32, width: u32, height: u32, pitch: u32, ctx: *mut c_void);

/// ### English
/// Completion callback handed to `unregister_texture`; the host calls it exactly once.
///
/// ### 中文
/// 传给 `unregister_texture` 的完成回调；宿主必须且只能调用一次。
pub type FrameBridgeDoneFn = unsafe extern "C" fn(ctx: *mut c_void);

#[repr(C)]
#[derive(Clone, Copy)]
/// ### English
/// Producer function table. `start`, `set_frame_ready_callback` and `copy_frame` are required;
/// `set_color_format` may be NULL.
///
/// ### 中文
/// 生产者函数表。`start`、`set_frame_ready_callback` 与 `copy_frame` 必须提供；`set_color_format` 可为 NULL。
pub struct FrameBridgeProducerApi {
    pub ctx: *mut c_void,
    pub start: Option<unsafe extern "C" fn(ctx: *mut c_void)>,
    pub set_frame_ready_callback: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            callback: Option<FrameBridgeFrameReadyFn>,
            callback_ctx: *mut c_void,
        ),
    >,
    pub copy_frame: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            buffer_index: u32,
            dst: *mut u8,
            dst_pitch: usize,
            dst_height: u32,
        ) -> usize,
    >,
    pub set_color_format:
        Option<unsafe extern "C" fn(ctx: *mut c_void, use_alternate_order: bool) -> bool>,
}

#[repr(C)]
#[derive(Clone, Copy)]
/// ### English
/// Texture registrar function table. All entries are required.
///
/// `register_texture` receives an opaque `FrameBridgeTexture*` that stays valid until the host
/// invokes the `done` callback passed to `unregister_texture`; it returns the texture id, or a
/// negative value on failure.
///
/// ### 中文
/// 纹理注册器函数表。所有表项都必须提供。
///
/// `register_texture` 接收不透明的 `FrameBridgeTexture*`，该指针在宿主调用 `unregister_texture`
/// 传入的 `done` 回调之前一直有效；返回纹理 id，失败时返回负值。
pub struct FrameBridgeRegistrarApi {
    pub ctx: *mut c_void,
    pub register_texture:
        Option<unsafe extern "C" fn(ctx: *mut c_void, texture: *const FrameBridgeTexture) -> i64>,
    pub unregister_texture: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            id: i64,
            done: FrameBridgeDoneFn,
            done_ctx: *mut c_void,
        ),
    >,
    pub mark_frame_available: Option<unsafe extern "C" fn(ctx: *mut c_void, id: i64)>,
}

/// ### English
/// Opaque texture handle given to the host compositor.
///
/// ### 中文
/// 交给宿主合成器的不透明纹理句柄。
pub struct FrameBridgeTexture {
    pub(super) variant: Arc<TextureVariant>,
}

/// ### English
/// Stable callback cell the producer trampoline points at; replaced under a write lock.
///
/// ### 中文
/// 生产者跳板函数指向的稳定回调单元；在写锁下替换。
type CallbackCell = RwLock<Option<FrameReadyCallback>>;

pub(super) struct HostProducer {
    api: FrameBridgeProducerApi,
    start: unsafe extern "C" fn(*mut c_void),
    set_callback: unsafe extern "C" fn(*mut c_void, Option<FrameBridgeFrameReadyFn>, *mut c_void),
    copy_frame: unsafe extern "C" fn(*mut c_void, u32, *mut u8, usize, u32) -> usize,
    callback: Box<CallbackCell>,
}

/// ### English
/// The host guarantees its producer entry points are callable from any thread.
///
/// ### 中文
/// 宿主保证其生产者入口可从任意线程调用。
unsafe impl Send for HostProducer {}
unsafe impl Sync for HostProducer {}

unsafe extern "C" fn frame_ready_trampoline(
    buffer_index: u32,
    width: u32,
    height: u32,
    pitch: u32,
    ctx: *mut c_void,
) {
    if ctx.is_null() {
        return;
    }
    let cell = unsafe { &*(ctx as *const CallbackCell) };
    if let Some(callback) = cell.read().as_ref() {
        callback(PendingFrame::new(buffer_index, width, height, pitch));
    }
}

impl HostProducer {
    pub(super) fn new(api: FrameBridgeProducerApi) -> Result<Self, String> {
        let start = api.start.ok_or("FrameBridgeProducerApi.start is NULL")?;
        let set_callback = api
            .set_frame_ready_callback
            .ok_or("FrameBridgeProducerApi.set_frame_ready_callback is NULL")?;
        let copy_frame = api
            .copy_frame
            .ok_or("FrameBridgeProducerApi.copy_frame is NULL")?;
        Ok(Self {
            api,
            start,
            set_callback,
            copy_frame,
            callback: Box::new(RwLock::new(None)),
        })
    }
}

impl FrameProducer for HostProducer {
    fn start(&self) {
        unsafe { (self.start)(self.api.ctx) };
    }

    fn set_frame_ready_callback(&self, callback: Option<FrameReadyCallback>) {
        let cell = &*self.callback as *const CallbackCell as *mut c_void;
        match callback {
            Some(callback) => {
                *self.callback.write() = Some(callback);
                unsafe { (self.set_callback)(self.api.ctx, Some(frame_ready_trampoline), cell) };
            }
            None => {
                unsafe { (self.set_callback)(self.api.ctx, None, std::ptr::null_mut()) };
                *self.callback.write() = None;
            }
        }
    }

    fn copy_frame(
        &self,
        buffer_index: u32,
        dst: &mut [u8],
        dst_pitch: usize,
        dst_height: u32,
    ) -> usize {
        let available_rows = if dst_pitch == 0 {
            0
        } else {
            (dst.len() / dst_pitch).min(dst_height as usize) as u32
        };
        let written = unsafe {
            (self.copy_frame)(
                self.api.ctx,
                buffer_index,
                dst.as_mut_ptr(),
                dst_pitch,
                available_rows,
            )
        };
        written.min(dst.len())
    }

    fn set_color_format(&self, order: ChannelOrder) -> bool {
        match self.api.set_color_format {
            Some(set_color_format) => unsafe {
                set_color_format(self.api.ctx, order.is_alternate())
            },
            None => false,
        }
    }
}

pub(super) struct HostRegistrar {
    api: FrameBridgeRegistrarApi,
    register: unsafe extern "C" fn(*mut c_void, *const FrameBridgeTexture) -> i64,
    unregister: unsafe extern "C" fn(*mut c_void, i64, FrameBridgeDoneFn, *mut c_void),
    mark: unsafe extern "C" fn(*mut c_void, i64),
    /// ### English
    /// Handles owned by the host between register and unregister completion.
    ///
    /// ### 中文
    /// 在注册到反注册完成之间由宿主持有的句柄。
    textures: Mutex<HashMap<TextureId, usize>>,
}

unsafe impl Send for HostRegistrar {}
unsafe impl Sync for HostRegistrar {}

unsafe extern "C" fn unregister_done_trampoline(ctx: *mut c_void) {
    if ctx.is_null() {
        return;
    }
    let task = unsafe { Box::from_raw(ctx as *mut PlatformTask) };
    task();
}

impl HostRegistrar {
    pub(super) fn new(api: FrameBridgeRegistrarApi) -> Result<Self, String> {
        let register = api
            .register_texture
            .ok_or("FrameBridgeRegistrarApi.register_texture is NULL")?;
        let unregister = api
            .unregister_texture
            .ok_or("FrameBridgeRegistrarApi.unregister_texture is NULL")?;
        let mark = api
            .mark_frame_available
            .ok_or("FrameBridgeRegistrarApi.mark_frame_available is NULL")?;
        Ok(Self {
            api,
            register,
            unregister,
            mark,
            textures: Mutex::new(HashMap::new()),
        })
    }
}

impl TextureRegistrar for HostRegistrar {
    fn register_texture(&self, texture: Arc<TextureVariant>) -> Result<TextureId, String> {
        let handle = Box::into_raw(Box::new(FrameBridgeTexture { variant: texture }));
        let id = unsafe { (self.register)(self.api.ctx, handle) };
        if id < 0 {
            drop(unsafe { Box::from_raw(handle) });
            return Err(format!("host registrar returned {id}"));
        }
        self.textures.lock().insert(id, handle as usize);
        Ok(id)
    }

    fn unregister_texture(&self, id: TextureId, on_done: PlatformTask) {
        let handle = self.textures.lock().remove(&id);
        let task: PlatformTask = Box::new(move || {
            if let Some(handle) = handle {
                drop(unsafe { Box::from_raw(handle as *mut FrameBridgeTexture) });
            }
            on_done();
        });
        let ctx = Box::into_raw(Box::new(task)) as *mut c_void;
        unsafe { (self.unregister)(self.api.ctx, id, unregister_done_trampoline, ctx) };
    }

    fn mark_frame_available(&self, id: TextureId) {
        unsafe { (self.mark)(self.api.ctx, id) };
    }
}

/// ### English
/// Wraps the host wake function into a `WakeCallback`.
///
/// ### 中文
/// 将宿主唤醒函数封装为 `WakeCallback`。
pub(super) fn wake_callback(
    wake: Option<unsafe extern "C" fn(ctx: *mut c_void)>,
    ctx: *mut c_void,
) -> Option<WakeCallback> {
    struct HostWake {
        wake: unsafe extern "C" fn(*mut c_void),
        ctx: *mut c_void,
    }
    unsafe impl Send for HostWake {}
    unsafe impl Sync for HostWake {}

    let host = HostWake { wake: wake?, ctx };
    Some(Box::new(move || {
        let host = &host;
        unsafe { (host.wake)(host.ctx) }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use crate::engine::CpuSurface;
    use dpi::PhysicalSize;

    struct ProducerState {
        callback: Mutex<Option<(FrameBridgeFrameReadyFn, usize)>>,
        starts: AtomicU32,
        color_alternate: Mutex<Option<bool>>,
    }

    unsafe extern "C" fn start(ctx: *mut c_void) {
        let state = unsafe { &*(ctx as *const ProducerState) };
        state.starts.fetch_add(1, Ordering::SeqCst);
    }

    unsafe extern "C" fn set_callback(
        ctx: *mut c_void,
        callback: Option<FrameBridgeFrameReadyFn>,
        callback_ctx: *mut c_void,
    ) {
        let state = unsafe { &*(ctx as *const ProducerState) };
        *state.callback.lock() = callback.map(|cb| (cb, callback_ctx as usize));
    }

    unsafe extern "C" fn copy_frame(
        _ctx: *mut c_void,
        buffer_index: u32,
        dst: *mut u8,
        dst_pitch: usize,
        dst_height: u32,
    ) -> usize {
        let len = dst_pitch * dst_height as usize;
        unsafe { std::ptr::write_bytes(dst, buffer_index as u8, len) };
        len
    }

    unsafe extern "C" fn set_color_format(ctx: *mut c_void, alternate: bool) -> bool {
        let state = unsafe { &*(ctx as *const ProducerState) };
        *state.color_alternate.lock() = Some(alternate);
        true
    }

    fn producer_api(state: &ProducerState) -> FrameBridgeProducerApi {
        FrameBridgeProducerApi {
            ctx: state as *const ProducerState as *mut c_void,
            start: Some(start),
            set_frame_ready_callback: Some(set_callback),
            copy_frame: Some(copy_frame),
            set_color_format: Some(set_color_format),
        }
    }

    #[test]
    fn producer_table_requires_core_entries() {
        let state = ProducerState {
            callback: Mutex::new(None),
            starts: AtomicU32::new(0),
            color_alternate: Mutex::new(None),
        };
        let mut api = producer_api(&state);
        api.copy_frame = None;
        assert!(HostProducer::new(api).is_err());
    }

    #[test]
    fn host_producer_routes_callbacks_and_copies() {
        let state = ProducerState {
            callback: Mutex::new(None),
            starts: AtomicU32::new(0),
            color_alternate: Mutex::new(None),
        };
        let producer = HostProducer::new(producer_api(&state)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        producer.set_frame_ready_callback(Some(Box::new(move |frame| sink.lock().push(frame))));
        producer.start();
        assert_eq!(state.starts.load(Ordering::SeqCst), 1);

        let (callback, ctx) = (*state.callback.lock()).unwrap();
        unsafe { callback(1, 4, 2, 16, ctx as *mut c_void) };
        assert_eq!(*seen.lock(), vec![PendingFrame::new(1, 4, 2, 16)]);

        producer.set_frame_ready_callback(None);
        assert!(state.callback.lock().is_none());

        let mut dst = vec![0u8; 32];
        assert_eq!(producer.copy_frame(7, &mut dst, 16, 4), 32);
        assert!(dst.iter().all(|&b| b == 7));

        assert!(producer.set_color_format(ChannelOrder::Bgra));
        assert_eq!(*state.color_alternate.lock(), Some(true));
    }

    #[derive(Default)]
    struct RegistrarState {
        registered: AtomicUsize,
        pending_done: Mutex<Vec<(FrameBridgeDoneFn, usize)>>,
    }

    unsafe extern "C" fn register(ctx: *mut c_void, texture: *const FrameBridgeTexture) -> i64 {
        assert!(!texture.is_null());
        let state = unsafe { &*(ctx as *const RegistrarState) };
        state.registered.fetch_add(1, Ordering::SeqCst) as i64 + 10
    }

    unsafe extern "C" fn unregister(
        ctx: *mut c_void,
        _id: i64,
        done: FrameBridgeDoneFn,
        done_ctx: *mut c_void,
    ) {
        let state = unsafe { &*(ctx as *const RegistrarState) };
        state.pending_done.lock().push((done, done_ctx as usize));
    }

    unsafe extern "C" fn mark(_ctx: *mut c_void, _id: i64) {}

    #[test]
    fn unregistration_completes_when_host_calls_done() {
        let state = RegistrarState::default();
        let registrar = HostRegistrar::new(FrameBridgeRegistrarApi {
            ctx: &state as *const RegistrarState as *mut c_void,
            register_texture: Some(register),
            unregister_texture: Some(unregister),
            mark_frame_available: Some(mark),
        })
        .unwrap();

        let surface = Arc::new(CpuSurface::new(PhysicalSize::new(2, 2)).unwrap());
        let variant = Arc::new(TextureVariant::Cpu(surface));
        let id = registrar.register_texture(variant.clone()).unwrap();
        assert!(id >= 10);
        assert_eq!(Arc::strong_count(&variant), 2);

        let finished = Arc::new(AtomicU32::new(0));
        let flag = finished.clone();
        registrar.unregister_texture(id, Box::new(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&variant), 2);

        let (done, ctx) = state.pending_done.lock().pop().unwrap();
        unsafe { done(ctx as *mut c_void) };
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::strong_count(&variant), 1);
    }
}
