//! Generic GPU resource abstraction and the wgpu production backend.

mod backend;
mod volume;
mod wgpu_backend;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{GpuBackend, GpuError, LayoutError, TextureId, TextureLayout, VolumeDescriptor};
pub use volume::GpuVolume;
pub use wgpu_backend::WgpuVolumeBackend;
