//! Backend abstraction over GPU texture resources.
//!
//! The cache layer never talks to a graphics API directly. It describes what
//! it needs (dimensions, layout, 3D or stacked-2D) and the backend creates,
//! refills and destroys the actual resources. Production uses the wgpu
//! backend; tests use a mock.

use glam::UVec3;

/// Opaque handle to a backend texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) u64);

/// Texture element layout, selected from a dataset's component count and
/// effective bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureLayout {
    /// Single channel, byte-normalized.
    R8,
    /// Single channel, short-normalized.
    R16,
    /// Single channel, 32 bit float.
    R32Float,
    Rgb8,
    Rgb16,
    Rgba8,
    Rgba16,
}

impl TextureLayout {
    /// Select a layout from component count and bit width.
    ///
    /// Components: 1, 3 or 4. Bit widths: 8 and 16 for any component count,
    /// 32 bit float for single-channel data only.
    pub fn select(bit_width: u32, component_count: u32) -> Result<Self, LayoutError> {
        match (component_count, bit_width) {
            (1, 8) => Ok(Self::R8),
            (1, 16) => Ok(Self::R16),
            (1, 32) => Ok(Self::R32Float),
            (3, 8) => Ok(Self::Rgb8),
            (3, 16) => Ok(Self::Rgb16),
            (4, 8) => Ok(Self::Rgba8),
            (4, 16) => Ok(Self::Rgba16),
            (1 | 3 | 4, w) => Err(LayoutError::BitWidth(w)),
            (c, _) => Err(LayoutError::ComponentCount(c)),
        }
    }

    /// Bytes per voxel element in the cache's byte accounting.
    pub fn bytes_per_element(&self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::R16 => 2,
            Self::R32Float => 4,
            Self::Rgb8 => 3,
            Self::Rgb16 => 6,
            Self::Rgba8 => 4,
            Self::Rgba16 => 8,
        }
    }
}

/// Why a layout could not be selected. Converted into the crate error at the
/// request boundary, where the distinction between the two cases matters.
#[derive(Debug, Clone, Copy)]
pub enum LayoutError {
    ComponentCount(u32),
    BitWidth(u32),
}

/// Describes a volume texture to be created or refilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDescriptor {
    /// Texture extent in voxels (padded extent when padding applies).
    pub dims: UVec3,
    pub layout: TextureLayout,
    /// Emulate the 3D volume with a stack of 2D slices.
    pub stack_2d: bool,
}

impl VolumeDescriptor {
    /// GPU byte footprint of a resource with this descriptor.
    pub fn byte_size(&self) -> u64 {
        u64::from(self.dims.x)
            * u64::from(self.dims.y)
            * u64::from(self.dims.z)
            * u64::from(self.layout.bytes_per_element())
    }
}

/// Errors surfaced by backends.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("texture extent {0}x{1}x{2} exceeds device limits")]
    ExtentExceedsLimits(u32, u32, u32),

    #[error("GPU out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: u64 },

    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Creates, refills and destroys GPU texture resources.
///
/// All data is tightly packed in the layout's element order; `data` length
/// must equal the descriptor's byte size. Simple 2D/1D textures take RGBA8
/// texel data.
pub trait GpuBackend {
    fn create_volume(&mut self, desc: &VolumeDescriptor, data: &[u8])
        -> Result<TextureId, GpuError>;

    /// Refill an existing volume resource in place. The descriptor must equal
    /// the one the resource was created with.
    fn update_volume(
        &mut self,
        id: TextureId,
        desc: &VolumeDescriptor,
        data: &[u8],
    ) -> Result<(), GpuError>;

    fn create_texture_2d(&mut self, width: u32, height: u32, data: &[u8])
        -> Result<TextureId, GpuError>;

    fn create_texture_1d(&mut self, size: u32, data: &[u8]) -> Result<TextureId, GpuError>;

    fn update_texture_2d(
        &mut self,
        id: TextureId,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<(), GpuError>;

    fn update_texture_1d(&mut self, id: TextureId, size: u32, data: &[u8])
        -> Result<(), GpuError>;

    /// Destroy a resource. Unknown ids are ignored; destruction must not fail.
    fn destroy(&mut self, id: TextureId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_selection() {
        assert_eq!(TextureLayout::select(8, 1).unwrap(), TextureLayout::R8);
        assert_eq!(TextureLayout::select(16, 1).unwrap(), TextureLayout::R16);
        assert_eq!(
            TextureLayout::select(32, 1).unwrap(),
            TextureLayout::R32Float
        );
        assert_eq!(TextureLayout::select(16, 3).unwrap(), TextureLayout::Rgb16);
        assert_eq!(TextureLayout::select(8, 4).unwrap(), TextureLayout::Rgba8);

        // float is single-channel only
        assert!(matches!(
            TextureLayout::select(32, 3),
            Err(LayoutError::BitWidth(32))
        ));
        assert!(matches!(
            TextureLayout::select(8, 2),
            Err(LayoutError::ComponentCount(2))
        ));
        assert!(matches!(
            TextureLayout::select(12, 1),
            Err(LayoutError::BitWidth(12))
        ));
    }

    #[test]
    fn test_descriptor_byte_size() {
        let desc = VolumeDescriptor {
            dims: UVec3::new(16, 8, 4),
            layout: TextureLayout::R16,
            stack_2d: false,
        };
        assert_eq!(desc.byte_size(), 16 * 8 * 4 * 2);

        let stacked = VolumeDescriptor {
            stack_2d: true,
            ..desc
        };
        assert_eq!(stacked.byte_size(), desc.byte_size());
    }
}
