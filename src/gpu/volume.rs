//! Wrapper around one GPU volume resource.

use super::{GpuBackend, TextureId, VolumeDescriptor};

/// A live GPU volume texture plus the descriptor it was created with.
///
/// Created, refilled and freed exclusively by the cache layer; renderers only
/// ever see the [`TextureId`].
#[derive(Debug)]
pub struct GpuVolume {
    texture: TextureId,
    desc: VolumeDescriptor,
}

impl GpuVolume {
    pub(crate) fn new(texture: TextureId, desc: VolumeDescriptor) -> Self {
        Self { texture, desc }
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn descriptor(&self) -> &VolumeDescriptor {
        &self.desc
    }

    /// GPU byte footprint of this resource, for budget accounting.
    pub fn gpu_bytes(&self) -> u64 {
        self.desc.byte_size()
    }

    pub(crate) fn destroy(self, backend: &mut dyn GpuBackend) {
        backend.destroy(self.texture);
    }
}
