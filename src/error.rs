//! Unified error type for the memory manager.
//!
//! Recoverable failures (shape errors, cache misses, allocation exhaustion)
//! are returned as values so renderers can degrade gracefully, e.g. by
//! skipping a brick or falling back to a lower resolution.

use crate::dataset::{DatasetError, DatasetId};
use crate::gpu::GpuError;

pub type MemManResult<T> = Result<T, MemManError>;

#[derive(Debug, thiserror::Error)]
pub enum MemManError {
    #[error("failed to open dataset {path}: {message}")]
    DatasetOpen { path: String, message: String },

    #[error("dataset {0:?} is not registered")]
    UnknownDataset(DatasetId),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("unsupported component count {0}")]
    UnsupportedComponentCount(u32),

    #[error("unsupported bit width {0}")]
    UnsupportedBitWidth(u32),

    #[error("cannot downsample {bit_width} bit data to 8 bit")]
    UnsupportedQuantization { bit_width: u32 },

    #[error("host allocation of {bytes} bytes failed")]
    HostAllocation { bytes: usize },

    #[error("GPU allocation of {bytes} bytes failed: {message}")]
    GpuAllocation { bytes: u64, message: String },

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("failed to load texture {path}: {message}")]
    TextureLoad { path: String, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
