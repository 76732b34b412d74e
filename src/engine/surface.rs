//! ### English
//! Double-buffered CPU pixel surface.
//!
//! The writer (present worker) fills the back plane and publishes it as front with one atomic
//! store; the compositor reads the front plane under that plane's lock. The writer never
//! touches the published plane, and the reader never waits on a plane the writer holds.
//!
//! ### 中文
//! 双缓冲 CPU 像素表面。
//!
//! 写端（呈现 worker）填充后台平面，并通过一次原子 store 将其发布为前台；合成器在该平面的锁内读取前台平面。
//! 写端从不触碰已发布的平面，读端也不会等待写端持有的平面。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use dpi::PhysicalSize;
use parking_lot::{Mutex, MutexGuard};

use super::config::{BYTES_PER_PIXEL, frame_len};
use super::debounce::{pack_size, unpack_size};
use super::error::SurfaceError;
use super::lockfree::Backoff;

/// ### English
/// Byte value used to clear planes on resize.
///
/// ### 中文
/// resize 时清空平面所用的字节值。
const BACKGROUND: u8 = 0;

struct Plane {
    data: Vec<u8>,
    size: PhysicalSize<u32>,
    /// ### English
    /// True only after the writer committed a complete frame into this plane.
    ///
    /// ### 中文
    /// 只有写端向该平面提交完整帧后才为 true。
    committed: bool,
}

impl Plane {
    fn empty() -> Self {
        Self {
            data: Vec::new(),
            size: PhysicalSize::new(0, 0),
            committed: false,
        }
    }

    /// ### English
    /// Grows backing storage to at least `len` bytes; capacity never shrinks.
    ///
    /// ### 中文
    /// 将底层存储扩展到至少 `len` 字节；容量从不收缩。
    fn ensure_len(&mut self, len: usize) -> Result<(), SurfaceError> {
        if self.data.len() >= len {
            return Ok(());
        }
        let additional = len - self.data.len();
        self.data
            .try_reserve(additional)
            .map_err(|_| SurfaceError::Alloc { bytes: len })?;
        self.data.resize(len, BACKGROUND);
        Ok(())
    }

    #[inline]
    fn frame_bytes(&self) -> &[u8] {
        let len = frame_len(self.size).unwrap_or(0).min(self.data.len());
        &self.data[..len]
    }
}

/// ### English
/// Two pixel planes with an atomically published front index.
///
/// ### 中文
/// 两个像素平面，以及原子发布的前台索引。
pub struct CpuSurface {
    planes: [Mutex<Plane>; 2],
    front: AtomicU8,
    write_active: AtomicBool,
    source_size: AtomicU64,
}

impl CpuSurface {
    /// ### English
    /// Creates a surface sized for `size`, cleared to the background value.
    ///
    /// ### 中文
    /// 创建尺寸为 `size` 的表面，并清空为背景值。
    pub fn new(size: PhysicalSize<u32>) -> Result<Self, SurfaceError> {
        let surface = Self {
            planes: [Mutex::new(Plane::empty()), Mutex::new(Plane::empty())],
            front: AtomicU8::new(0),
            write_active: AtomicBool::new(false),
            source_size: AtomicU64::new(0),
        };
        surface.resize(size)?;
        Ok(surface)
    }

    #[inline]
    pub fn source_size(&self) -> PhysicalSize<u32> {
        unpack_size(self.source_size.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_write_active(&self) -> bool {
        self.write_active.load(Ordering::Acquire)
    }

    /// ### English
    /// Reallocates both planes for `size`, clears them, and resets front to plane 0.
    ///
    /// Must not race with an active write; the worker calls this before `begin_write`.
    ///
    /// ### 中文
    /// 按 `size` 重新分配两个平面、清空并将前台重置为平面 0。
    ///
    /// 不得与进行中的写入并发；worker 在 `begin_write` 之前调用。
    pub fn resize(&self, size: PhysicalSize<u32>) -> Result<(), SurfaceError> {
        if size.width == 0 || size.height == 0 {
            return Err(SurfaceError::ZeroSize {
                width: size.width,
                height: size.height,
            });
        }
        if self.is_write_active() {
            return Err(SurfaceError::WriteActive);
        }
        let len = frame_len(size).ok_or(SurfaceError::Alloc { bytes: usize::MAX })?;

        for plane in &self.planes {
            let mut plane = plane.lock();
            plane.ensure_len(len)?;
            plane.data.fill(BACKGROUND);
            plane.size = size;
            plane.committed = false;
        }
        self.front.store(0, Ordering::Release);
        self.source_size.store(pack_size(size), Ordering::Release);
        tracing::debug!(width = size.width, height = size.height, "cpu surface resized");
        Ok(())
    }

    /// ### English
    /// Starts writing a frame into the back plane.
    ///
    /// Fails if a write is already active, if `size` is zero, or if `stride` is not the tightly
    /// packed row length. Never waits: a reader still holding the back plane yields `Busy`.
    /// Backing storage grows lazily and never shrinks.
    ///
    /// #### Parameters
    /// - `size`: Frame size in pixels.
    /// - `stride`: Row pitch the caller will write with, in bytes.
    ///
    /// ### 中文
    /// 开始向后台平面写入一帧。
    ///
    /// 若已有写入进行中、`size` 为 0，或 `stride` 不是紧密排列的行长度，则失败。
    /// 从不等待：读端仍持有后台平面时返回 `Busy`。底层存储按需增长且从不收缩。
    ///
    /// #### 参数
    /// - `size`：帧尺寸（像素）。
    /// - `stride`：调用方写入时使用的行跨度（字节）。
    pub fn begin_write(
        &self,
        size: PhysicalSize<u32>,
        stride: usize,
    ) -> Result<WriteGuard<'_>, SurfaceError> {
        if size.width == 0 || size.height == 0 {
            return Err(SurfaceError::ZeroSize {
                width: size.width,
                height: size.height,
            });
        }
        let expected = size.width as usize * BYTES_PER_PIXEL;
        if stride != expected {
            return Err(SurfaceError::StrideMismatch {
                expected,
                actual: stride,
            });
        }
        let len = frame_len(size).ok_or(SurfaceError::Alloc { bytes: usize::MAX })?;

        if self
            .write_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SurfaceError::WriteActive);
        }

        let index = 1 - self.front.load(Ordering::Acquire) as usize;
        let Some(mut plane) = self.planes[index].try_lock() else {
            self.write_active.store(false, Ordering::Release);
            return Err(SurfaceError::Busy);
        };
        if let Err(err) = plane.ensure_len(len) {
            drop(plane);
            self.write_active.store(false, Ordering::Release);
            return Err(err);
        }
        plane.size = size;
        plane.committed = false;

        Ok(WriteGuard {
            surface: self,
            plane: Some(plane),
            index,
            len,
        })
    }

    /// ### English
    /// Locks and returns the committed front plane, or `None` if nothing was committed yet.
    ///
    /// Never blocks on the writer: if the front moved while locking, the new front is tried.
    ///
    /// ### 中文
    /// 锁定并返回已提交的前台平面；若尚无提交则返回 `None`。
    ///
    /// 从不阻塞等待写端：若加锁期间前台发生变化，则改为尝试新的前台。
    pub fn snapshot_front(&self) -> Option<FrontSnapshot<'_>> {
        let mut backoff = Backoff::new();
        loop {
            let index = self.front.load(Ordering::Acquire) as usize;
            if let Some(plane) = self.planes[index].try_lock() {
                if index == self.front.load(Ordering::Acquire) as usize {
                    return plane.committed.then_some(FrontSnapshot { plane, index });
                }
            }
            if backoff.is_completed() {
                return None;
            }
            backoff.snooze();
        }
    }

    /// ### English
    /// Copies the committed front frame into `dst`, row by row.
    ///
    /// Returns the number of bytes copied (0 if nothing is committed).
    ///
    /// #### Parameters
    /// - `dst`: Destination buffer.
    /// - `dst_pitch`: Destination row pitch in bytes.
    /// - `dst_height`: Maximum number of rows to copy.
    ///
    /// ### 中文
    /// 将已提交的前台帧逐行拷贝到 `dst`。
    ///
    /// 返回拷贝的字节数（无提交时为 0）。
    ///
    /// #### 参数
    /// - `dst`：目标缓冲区。
    /// - `dst_pitch`：目标行跨度（字节）。
    /// - `dst_height`：最多拷贝的行数。
    pub fn copy_front_to(&self, dst: &mut [u8], dst_pitch: usize, dst_height: u32) -> usize {
        match self.snapshot_front() {
            Some(snapshot) => copy_rows(
                snapshot.bytes(),
                snapshot.size().width as usize * BYTES_PER_PIXEL,
                snapshot.size().height.min(dst_height) as usize,
                dst,
                dst_pitch,
            ),
            None => 0,
        }
    }
}

/// ### English
/// Copies `rows` rows between buffers with differing pitches; returns bytes copied.
///
/// ### 中文
/// 在行跨度不同的缓冲区之间拷贝 `rows` 行；返回拷贝的字节数。
pub(crate) fn copy_rows(
    src: &[u8],
    src_pitch: usize,
    rows: usize,
    dst: &mut [u8],
    dst_pitch: usize,
) -> usize {
    let row_len = src_pitch.min(dst_pitch);
    let mut copied = 0;
    for y in 0..rows {
        let src_start = y * src_pitch;
        let dst_start = y * dst_pitch;
        if src_start + row_len > src.len() || dst_start + row_len > dst.len() {
            break;
        }
        dst[dst_start..dst_start + row_len].copy_from_slice(&src[src_start..src_start + row_len]);
        copied += row_len;
    }
    copied
}

/// ### English
/// Exclusive access to the back plane; `commit` publishes it, dropping aborts the write.
///
/// ### 中文
/// 对后台平面的独占访问；`commit` 发布它，直接 drop 则放弃本次写入。
pub struct WriteGuard<'a> {
    surface: &'a CpuSurface,
    plane: Option<MutexGuard<'a, Plane>>,
    index: usize,
    len: usize,
}

impl WriteGuard<'_> {
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        match self.plane.as_mut() {
            Some(plane) => &mut plane.data[..len],
            None => &mut [],
        }
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.plane
            .as_ref()
            .map_or(0, |plane| plane.size.width as usize * BYTES_PER_PIXEL)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// ### English
    /// Publishes the written plane as front and ends the write. Returns the published index.
    ///
    /// ### 中文
    /// 将写好的平面发布为前台并结束写入。返回发布的索引。
    pub fn commit(mut self) -> usize {
        if let Some(plane) = self.plane.as_mut() {
            plane.committed = true;
        }
        self.finish();
        self.index
    }

    /// ### English
    /// Unlocks the plane, then publishes it if committed and clears the write flag.
    /// Unlocking first lets a reader that observes the new front lock it immediately.
    ///
    /// ### 中文
    /// 先解锁平面；若已提交则发布，并清除写入标记。
    /// 先解锁可使观察到新前台的读端立即加锁。
    fn finish(&mut self) {
        let Some(plane) = self.plane.take() else {
            return;
        };
        let committed = plane.committed;
        drop(plane);
        if committed {
            self.surface.front.store(self.index as u8, Ordering::Release);
        }
        self.surface.write_active.store(false, Ordering::Release);
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// ### English
/// Locked view of the committed front plane.
///
/// ### 中文
/// 已提交前台平面的加锁视图。
pub struct FrontSnapshot<'a> {
    plane: MutexGuard<'a, Plane>,
    index: usize,
}

impl FrontSnapshot<'_> {
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.plane.frame_bytes()
    }

    #[inline]
    pub fn size(&self) -> PhysicalSize<u32> {
        self.plane.size
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}
