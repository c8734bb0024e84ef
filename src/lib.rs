//! EmberVis GPU memory management.
//!
//! The core of an interactive volume renderer is not the shading, it is
//! deciding which bricks of a file-backed multi-resolution dataset are
//! resident on the GPU at any moment. This crate implements that layer:
//! a brick cache with least-recently-used replacement, power-of-two padding
//! and format conversion on the upload path, reference-counted sharing of
//! datasets, simple textures and transfer functions across renderer
//! instances, and pool plus per-dataset GPU budgets.
//!
//! Datasets are consumed through the [`Dataset`] trait; file-format parsing
//! stays outside. GPU resources are consumed through the [`GpuBackend`]
//! trait, with [`WgpuVolumeBackend`] as the production implementation.
//!
//! The calling model is single-threaded and synchronous: construct one
//! [`GpuMemMan`], hand it to your renderers, and call it from the render
//! loop. A multi-threaded embedding must add its own locking.

pub mod constants;
pub mod dataset;
pub mod error;
pub mod gpu;
pub mod memory;

pub use dataset::{
    BrickKey, Dataset, DatasetError, DatasetId, DatasetLoader, DatasetRegistry, RendererId,
};
pub use error::{MemManError, MemManResult};
pub use gpu::{
    GpuBackend, GpuError, GpuVolume, TextureId, TextureLayout, VolumeDescriptor,
    WgpuVolumeBackend,
};
pub use memory::{
    BrickFormat, FrameStamp, GpuMemMan, MemManConfig, MemManStats, SimpleTextureId,
    Transfer1dId, Transfer2dId, TransferFunction1d, TransferFunction2d, VolumeId, VolumeLease,
};

// Re-export wgpu so embedders construct the production backend against the
// same version.
pub use wgpu;
