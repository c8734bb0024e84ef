//! GPU memory management: the brick cache and its sibling texture stores.

mod manager;
mod simple_textures;
mod transfer_functions;
pub mod transform;
mod volume_cache;

pub use manager::{GpuMemMan, MemManConfig, MemManStats};
pub use simple_textures::SimpleTextureId;
pub use transfer_functions::{
    Transfer1dId, Transfer2dId, TransferFunction1d, TransferFunction2d,
};
pub use volume_cache::{BrickFormat, FrameStamp, VolumeId, VolumeLease};
