//! Dataset abstraction for multi-resolution, file-backed volumes.
//!
//! File-format parsing lives outside this crate; the cache only sees brick
//! metadata and raw bytes through the [`Dataset`] trait.

mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::{DatasetId, DatasetRegistry, RegistryStats};

use glam::UVec3;

/// Identifies a brick within a multi-resolution dataset: a resolution level
/// plus a spatial brick coordinate. Ordering is lexicographic and consistent
/// with the dataset's own brick enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BrickKey {
    /// Resolution level, 0 = finest.
    pub lod: u32,
    /// Spatial brick coordinate within the level.
    pub brick: [u32; 3],
}

impl BrickKey {
    pub fn new(lod: u32, x: u32, y: u32, z: u32) -> Self {
        Self {
            lod,
            brick: [x, y, z],
        }
    }
}

/// Opaque identity of a renderer instance issuing cache requests.
/// Used for reference counting of datasets and transfer functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererId(pub u64);

/// Errors surfaced by dataset implementations.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("unknown brick key {0:?}")]
    UnknownBrick(BrickKey),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dataset: {0}")]
    Malformed(String),

    #[error("unsupported dataset format: {0}")]
    Unsupported(String),
}

/// An open, possibly huge, file-backed multi-resolution volume.
///
/// Implementations are expected to be cheap to query for metadata;
/// only [`Dataset::fetch_brick`] may touch the disk.
pub trait Dataset {
    /// The filename this dataset was opened from; the registry reuses open
    /// datasets by this key.
    fn filename(&self) -> &str;

    /// Voxel counts of the brick identified by `key`.
    fn brick_voxel_counts(&self, key: BrickKey) -> Result<UVec3, DatasetError>;

    /// Bits per component (8, 16 or 32).
    fn bit_width(&self) -> u32;

    /// Components per voxel (1, 3 or 4).
    fn component_count(&self) -> u32;

    /// Value range (min, max) of the scalar data, used for quantization.
    fn range(&self) -> (f64, f64);

    /// Whether the on-disk byte order matches the host byte order.
    fn is_same_endianness(&self) -> bool;

    /// Fetch the raw bytes of a brick into `buffer`. The buffer is resized
    /// to exactly the brick's byte length.
    fn fetch_brick(&self, key: BrickKey, buffer: &mut Vec<u8>) -> Result<(), DatasetError>;

    /// Byte length of a brick as stored: voxels x components x bytes per
    /// component.
    fn brick_byte_size(&self, key: BrickKey) -> Result<u64, DatasetError> {
        let v = self.brick_voxel_counts(key)?;
        Ok(u64::from(v.x) * u64::from(v.y) * u64::from(v.z)
            * u64::from(self.component_count())
            * u64::from(self.bit_width() / 8))
    }
}

/// Opens datasets from filenames. This is the only point in the subsystem
/// that may block on disk and parse file formats.
pub trait DatasetLoader {
    fn open(&self, path: &str) -> Result<Box<dyn Dataset>, DatasetError>;
}
