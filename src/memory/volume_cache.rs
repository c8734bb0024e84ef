//! Cache entries binding volume bricks to GPU resources.

use glam::UVec3;

use crate::dataset::{BrickKey, Dataset, DatasetId};
use crate::error::MemManError;
use crate::gpu::{
    GpuBackend, GpuVolume, LayoutError, TextureId, TextureLayout, VolumeDescriptor,
};
use crate::memory::transform::{dims_are_pow2, next_pow2, pad_to_pow2, quantize_16_to_8, swap_endian_16};

/// Handle to a volume cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId(pub(crate) u64);

/// Format policy of a brick request. Two requests hit the same cache entry
/// only when all four flags match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrickFormat {
    /// Pad the texture to power-of-two extents.
    pub padded_to_pow2: bool,
    /// Quantize 16 bit data down to 8 bit using the dataset's value range.
    pub downsample_to_8bit: bool,
    /// Leave padding zero-filled instead of replicating the border.
    pub disable_border: bool,
    /// Emulate the 3D volume with a stack of 2D slices.
    pub stack_2d: bool,
}

/// Caller-supplied recency stamp. Must be monotonically non-decreasing
/// across a render session for the LRU policy to behave correctly; the cache
/// never generates stamps itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FrameStamp {
    pub frame: u64,
    pub intra_frame: u64,
}

impl FrameStamp {
    pub fn new(frame: u64, intra_frame: u64) -> Self {
        Self { frame, intra_frame }
    }
}

/// Proof of one `get_volume` access. Returning it to
/// [`GpuMemMan::release_volume`](crate::memory::GpuMemMan::release_volume)
/// is the only way to decrement the entry's user count, so unmatched frees
/// cannot be expressed.
#[derive(Debug)]
#[must_use = "a lease keeps its cache entry pinned until released"]
pub struct VolumeLease {
    pub(crate) volume: VolumeId,
    pub(crate) dataset: DatasetId,
    pub(crate) key: BrickKey,
    pub(crate) texture: TextureId,
}

impl VolumeLease {
    /// The GPU texture backing the leased brick.
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn volume_id(&self) -> VolumeId {
        self.volume
    }

    pub fn key(&self) -> BrickKey {
        self.key
    }
}

/// One GPU resource bound to one brick of one dataset.
///
/// An entry is replaceable only while its user count is zero; entries in
/// active use are never evicted mid-frame.
#[derive(Debug)]
pub(crate) struct VolumeCacheEntry {
    dataset: DatasetId,
    key: BrickKey,
    format: BrickFormat,
    /// Raw voxel counts of the currently bound brick.
    dims: UVec3,
    volume: GpuVolume,
    user_count: u32,
    stamp: FrameStamp,
    /// Private staging buffer; empty outside of an upload, capacity kept for
    /// replace operations.
    staging: Vec<u8>,
}

impl VolumeCacheEntry {
    /// Fetch, transform and upload a brick into a new GPU resource.
    ///
    /// The new entry starts with a user count of one, owed to the lease the
    /// manager hands out for it. On any failure nothing is left behind.
    pub(crate) fn create(
        dataset_id: DatasetId,
        dataset: &dyn Dataset,
        key: BrickKey,
        format: BrickFormat,
        stamp: FrameStamp,
        hub: &mut Vec<u8>,
        incore_hint: u64,
        backend: &mut dyn GpuBackend,
    ) -> Result<Self, MemManError> {
        let dims = dataset.brick_voxel_counts(key)?;
        let brick_bytes = dataset.brick_byte_size(key)?;

        let mut staging = Vec::new();
        let use_hub = hub_eligible(hub, brick_bytes, incore_hint);
        let buf = if use_hub { &mut *hub } else { &mut staging };

        dataset.fetch_brick(key, buf)?;
        let prepared = prepare(buf, dims, dataset, format)?;
        let desc = prepared.desc;

        let texture = backend
            .create_volume(&desc, prepared.bytes(buf))
            .map_err(|e| MemManError::GpuAllocation {
                bytes: desc.byte_size(),
                message: e.to_string(),
            })?;

        staging.clear();
        log::debug!(
            "[VolumeCacheEntry::create] Uploaded brick {:?} as {}x{}x{} texture",
            key,
            desc.dims.x,
            desc.dims.y,
            desc.dims.z
        );

        Ok(Self {
            dataset: dataset_id,
            key,
            format,
            dims,
            volume: GpuVolume::new(texture, desc),
            user_count: 1,
            stamp,
            staging,
        })
    }

    /// Rebind this entry to a different brick of the same shape, reusing the
    /// existing GPU allocation.
    ///
    /// Only valid on a replace candidate (user count zero, equal voxel
    /// counts and format). On failure the caller must tear the entry down;
    /// its GPU contents are no longer meaningful.
    pub(crate) fn replace(
        &mut self,
        dataset: &dyn Dataset,
        key: BrickKey,
        stamp: FrameStamp,
        hub: &mut Vec<u8>,
        incore_hint: u64,
        backend: &mut dyn GpuBackend,
    ) -> Result<(), MemManError> {
        debug_assert_eq!(self.user_count, 0, "replacing an entry in use");

        let dims = dataset.brick_voxel_counts(key)?;
        let brick_bytes = dataset.brick_byte_size(key)?;

        let use_hub = hub_eligible(hub, brick_bytes, incore_hint);
        let buf = if use_hub { &mut *hub } else { &mut self.staging };

        dataset.fetch_brick(key, buf)?;
        let prepared = prepare(buf, dims, dataset, self.format)?;
        debug_assert_eq!(
            prepared.desc,
            *self.volume.descriptor(),
            "replace changed the byte layout"
        );

        backend.update_volume(self.volume.texture(), &prepared.desc, prepared.bytes(buf))?;

        self.key = key;
        self.dims = dims;
        self.stamp = stamp;
        self.user_count = 1;
        self.staging.clear();
        Ok(())
    }

    /// Register one more user and refresh the recency stamps.
    pub(crate) fn access(&mut self, stamp: FrameStamp) -> TextureId {
        self.stamp = stamp;
        self.user_count += 1;
        self.volume.texture()
    }

    /// Drop one user. Returns `false` when the count was already zero.
    pub(crate) fn release(&mut self) -> bool {
        if self.user_count == 0 {
            return false;
        }
        self.user_count -= 1;
        true
    }

    /// Exact match: same dataset, brick and format flags.
    pub(crate) fn matches(&self, dataset: DatasetId, key: BrickKey, format: BrickFormat) -> bool {
        self.dataset == dataset && self.key == key && self.format == format
    }

    /// Whether this entry may be rebound to a brick with voxel counts `dims`
    /// under `format`: same dataset and shape, same flags, currently unused.
    pub(crate) fn is_replace_candidate(
        &self,
        dataset: DatasetId,
        dims: UVec3,
        format: BrickFormat,
    ) -> bool {
        self.user_count == 0
            && self.dataset == dataset
            && self.dims == dims
            && self.format == format
    }

    pub(crate) fn dataset(&self) -> DatasetId {
        self.dataset
    }

    pub(crate) fn key(&self) -> BrickKey {
        self.key
    }

    pub(crate) fn stamp(&self) -> FrameStamp {
        self.stamp
    }

    pub(crate) fn user_count(&self) -> u32 {
        self.user_count
    }

    pub(crate) fn texture(&self) -> TextureId {
        self.volume.texture()
    }

    pub(crate) fn gpu_bytes(&self) -> u64 {
        self.volume.gpu_bytes()
    }

    #[cfg(test)]
    pub(crate) fn staging_is_empty(&self) -> bool {
        self.staging.is_empty()
    }

    pub(crate) fn destroy(self, backend: &mut dyn GpuBackend) {
        self.volume.destroy(backend);
    }
}

/// Compute the texture descriptor a request would produce, without touching
/// any voxel data. Shape errors surface here, before a fetch or an entry
/// ever exists.
pub(crate) fn plan_descriptor(
    bit_width: u32,
    component_count: u32,
    dims: UVec3,
    format: BrickFormat,
) -> Result<VolumeDescriptor, MemManError> {
    let effective_bit_width = if format.downsample_to_8bit && bit_width != 8 {
        if bit_width != 16 {
            return Err(MemManError::UnsupportedQuantization { bit_width });
        }
        8
    } else {
        bit_width
    };

    let layout =
        TextureLayout::select(effective_bit_width, component_count).map_err(|e| match e {
            LayoutError::ComponentCount(c) => MemManError::UnsupportedComponentCount(c),
            LayoutError::BitWidth(w) => MemManError::UnsupportedBitWidth(w),
        })?;

    let tex_dims = if format.padded_to_pow2 && !dims_are_pow2(dims) {
        UVec3::new(next_pow2(dims.x), next_pow2(dims.y), next_pow2(dims.z))
    } else {
        dims
    };

    Ok(VolumeDescriptor {
        dims: tex_dims,
        layout,
        stack_2d: format.stack_2d,
    })
}

enum PreparedData {
    /// Padding produced a fresh buffer.
    Padded(Vec<u8>),
    /// Upload directly from the first `len` bytes of the staging buffer.
    InPlace { len: usize },
}

struct Prepared {
    data: PreparedData,
    desc: VolumeDescriptor,
}

impl Prepared {
    fn bytes<'a>(&'a self, buf: &'a [u8]) -> &'a [u8] {
        match &self.data {
            PreparedData::Padded(v) => v,
            PreparedData::InPlace { len } => &buf[..*len],
        }
    }
}

/// Run the upload transform pipeline over freshly fetched brick bytes:
/// endian swap, optional 16 to 8 bit quantization, then power-of-two
/// padding. The swap runs first so quantization reads host-order values.
fn prepare(
    data: &mut [u8],
    dims: UVec3,
    dataset: &dyn Dataset,
    format: BrickFormat,
) -> Result<Prepared, MemManError> {
    let bit_width = dataset.bit_width();
    let desc = plan_descriptor(bit_width, dataset.component_count(), dims, format)?;

    let mut len = data.len();
    if !dataset.is_same_endianness() && bit_width == 16 {
        swap_endian_16(&mut data[..len]);
    }

    if format.downsample_to_8bit && bit_width == 16 {
        let (min, max) = dataset.range();
        len = quantize_16_to_8(&mut data[..len], min, max);
    }

    if format.padded_to_pow2 && !dims_are_pow2(dims) {
        let element_size = desc.layout.bytes_per_element() as usize;
        let (padded, padded_dims) =
            pad_to_pow2(&data[..len], dims, element_size, format.disable_border)?;
        debug_assert_eq!(padded_dims, desc.dims);
        Ok(Prepared {
            data: PreparedData::Padded(padded),
            desc,
        })
    } else {
        Ok(Prepared {
            data: PreparedData::InPlace { len },
            desc,
        })
    }
}

/// Hub reuse rule: the shared buffer is used when it is enabled (non-empty)
/// and the brick fits within a bounded multiple of the IO in-core size.
pub(crate) fn hub_eligible(hub: &[u8], brick_bytes: u64, incore_hint: u64) -> bool {
    !hub.is_empty()
        && brick_bytes <= incore_hint.saturating_mul(crate::constants::memory::HUB_SLACK_FACTOR)
}
