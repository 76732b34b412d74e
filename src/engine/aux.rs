//! ### English
//! Auxiliary RGBA textures (debug viewers) owned by the bridge and keyed by `u32` id.
//!
//! ### 中文
//! 由帧桥持有、以 `u32` id 为键的辅助 RGBA 纹理（调试查看器）。

use std::collections::HashMap;
use std::sync::Arc;

use dpi::PhysicalSize;
use parking_lot::Mutex;

use super::config::{BYTES_PER_PIXEL, frame_len};
use super::error::SurfaceError;
use super::surface::CpuSurface;

#[derive(Default)]
pub(crate) struct AuxTextures {
    textures: Mutex<HashMap<u32, Arc<CpuSurface>>>,
}

impl AuxTextures {
    /// ### English
    /// Creates (or replaces) texture `id` at `size`.
    ///
    /// ### 中文
    /// 以 `size` 创建（或替换）纹理 `id`。
    pub(crate) fn create(&self, id: u32, size: PhysicalSize<u32>) -> Result<(), SurfaceError> {
        let surface = Arc::new(CpuSurface::new(size)?);
        self.textures.lock().insert(id, surface);
        Ok(())
    }

    #[inline]
    fn get(&self, id: u32) -> Option<Arc<CpuSurface>> {
        self.textures.lock().get(&id).cloned()
    }

    /// ### English
    /// Publishes a tightly packed RGBA frame. Returns `false` for unknown ids or short input.
    ///
    /// ### 中文
    /// 发布一帧紧密排列的 RGBA 数据。id 未知或输入过短时返回 `false`。
    pub(crate) fn update(&self, id: u32, rgba: &[u8]) -> bool {
        let Some(surface) = self.get(id) else {
            return false;
        };
        let size = surface.source_size();
        let Some(len) = frame_len(size) else {
            return false;
        };
        if rgba.len() < len {
            return false;
        }

        let mut write = match surface.begin_write(size, size.width as usize * BYTES_PER_PIXEL) {
            Ok(write) => write,
            Err(err) => {
                tracing::debug!(id, %err, "aux texture update rejected");
                return false;
            }
        };
        write.bytes_mut()[..len].copy_from_slice(&rgba[..len]);
        write.commit();
        true
    }

    /// ### English
    /// Copies the latest committed frame of `id` into `dst`; returns bytes copied.
    ///
    /// ### 中文
    /// 将 `id` 最近提交的帧拷贝到 `dst`；返回拷贝的字节数。
    pub(crate) fn copy(&self, id: u32, dst: &mut [u8], dst_pitch: usize) -> usize {
        if dst_pitch == 0 {
            return 0;
        }
        let Some(surface) = self.get(id) else {
            return 0;
        };
        let rows = (dst.len() / dst_pitch).min(u32::MAX as usize) as u32;
        surface.copy_front_to(dst, dst_pitch, rows)
    }

    pub(crate) fn destroy(&self, id: u32) -> bool {
        self.textures.lock().remove(&id).is_some()
    }

    pub(crate) fn size(&self, id: u32) -> Option<PhysicalSize<u32>> {
        self.get(id).map(|surface| surface.source_size())
    }

    pub(crate) fn clear(&self) {
        self.textures.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_then_copy_with_wider_pitch() {
        let aux = AuxTextures::default();
        aux.create(3, PhysicalSize::new(2, 2)).unwrap();
        let rgba: Vec<u8> = (0..16).collect();
        assert!(aux.update(3, &rgba));

        let mut dst = vec![0xEE; 12 * 2];
        assert_eq!(aux.copy(3, &mut dst, 12), 16);
        assert_eq!(&dst[..8], &rgba[..8]);
        assert_eq!(&dst[8..12], &[0xEE; 4]);
        assert_eq!(&dst[12..20], &rgba[8..16]);
    }

    #[test]
    fn unknown_ids_and_short_input_are_rejected() {
        let aux = AuxTextures::default();
        assert!(!aux.update(1, &[0; 16]));
        assert_eq!(aux.copy(1, &mut [0; 16], 8), 0);

        aux.create(1, PhysicalSize::new(2, 2)).unwrap();
        assert!(!aux.update(1, &[0; 15]));
        assert_eq!(aux.copy(1, &mut [0; 16], 8), 0);
    }

    #[test]
    fn create_replaces_and_destroy_removes() {
        let aux = AuxTextures::default();
        aux.create(1, PhysicalSize::new(2, 2)).unwrap();
        assert!(aux.update(1, &[1; 16]));
        aux.create(1, PhysicalSize::new(4, 1)).unwrap();
        assert_eq!(aux.size(1), Some(PhysicalSize::new(4, 1)));
        assert_eq!(aux.copy(1, &mut [0; 16], 16), 0);

        assert!(aux.destroy(1));
        assert!(!aux.destroy(1));
        assert!(aux.create(2, PhysicalSize::new(0, 1)).is_err());
    }
}
