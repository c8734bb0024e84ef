//! wgpu implementation of the texture backend.

use std::collections::HashMap;
use std::sync::Arc;

use super::{GpuBackend, GpuError, TextureId, TextureLayout, VolumeDescriptor};

/// Production backend: creates and fills textures on a wgpu device.
///
/// wgpu has no 3-component texture formats, so RGB data is widened to RGBA
/// at the upload boundary; the cache layer keeps accounting in 3 components.
pub struct WgpuVolumeBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    textures: HashMap<TextureId, wgpu::Texture>,
    next_id: u64,
}

impl WgpuVolumeBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            textures: HashMap::new(),
            next_id: 0,
        }
    }

    fn alloc_id(&mut self) -> TextureId {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        id
    }

    fn check_limits(&self, desc: &VolumeDescriptor) -> Result<(), GpuError> {
        let limits = self.device.limits();
        let max = if desc.stack_2d {
            limits.max_texture_dimension_2d
        } else {
            limits.max_texture_dimension_3d
        };
        let d = desc.dims;
        if d.x > max || d.y > max || (!desc.stack_2d && d.z > max) {
            log::warn!(
                "[WgpuVolumeBackend] Texture extent {}x{}x{} exceeds device limit {}",
                d.x,
                d.y,
                d.z,
                max
            );
            return Err(GpuError::ExtentExceedsLimits(d.x, d.y, d.z));
        }
        if desc.stack_2d && d.z > limits.max_texture_array_layers {
            return Err(GpuError::ExtentExceedsLimits(d.x, d.y, d.z));
        }
        Ok(())
    }

    fn write(&self, texture: &wgpu::Texture, desc: &VolumeDescriptor, data: &[u8]) {
        let (_, texel_bytes, widen) = wgpu_format(desc.layout);
        let upload;
        let bytes: &[u8] = if widen {
            upload = widen_rgb_to_rgba(data, desc.layout.bytes_per_element() / 3);
            &upload
        } else {
            data
        };

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(texel_bytes * desc.dims.x),
                rows_per_image: Some(desc.dims.y),
            },
            wgpu::Extent3d {
                width: desc.dims.x,
                height: desc.dims.y,
                depth_or_array_layers: desc.dims.z,
            },
        );
    }

    fn insert_2d(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        data: &[u8],
        dimension: wgpu::TextureDimension,
    ) -> Result<TextureId, GpuError> {
        let limits = self.device.limits();
        let limit = match dimension {
            wgpu::TextureDimension::D1 => limits.max_texture_dimension_1d,
            _ => limits.max_texture_dimension_2d,
        };
        if width > limit || height > limit {
            return Err(GpuError::ExtentExceedsLimits(width, height, 1));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let id = self.alloc_id();
        self.textures.insert(id, texture);
        Ok(id)
    }
}

impl GpuBackend for WgpuVolumeBackend {
    fn create_volume(
        &mut self,
        desc: &VolumeDescriptor,
        data: &[u8],
    ) -> Result<TextureId, GpuError> {
        self.check_limits(desc)?;
        let (format, _, _) = wgpu_format(desc.layout);

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume Brick"),
            size: wgpu::Extent3d {
                width: desc.dims.x,
                height: desc.dims.y,
                depth_or_array_layers: desc.dims.z,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: if desc.stack_2d {
                wgpu::TextureDimension::D2
            } else {
                wgpu::TextureDimension::D3
            },
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.write(&texture, desc, data);

        let id = self.alloc_id();
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn update_volume(
        &mut self,
        id: TextureId,
        desc: &VolumeDescriptor,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let texture = self.textures.get(&id).ok_or(GpuError::UnknownTexture(id))?;
        self.write(texture, desc, data);
        Ok(())
    }

    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<TextureId, GpuError> {
        self.insert_2d("Simple Texture", width, height, data, wgpu::TextureDimension::D2)
    }

    fn create_texture_1d(&mut self, size: u32, data: &[u8]) -> Result<TextureId, GpuError> {
        self.insert_2d("Transfer Function", size, 1, data, wgpu::TextureDimension::D1)
    }

    fn update_texture_2d(
        &mut self,
        id: TextureId,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let texture = self.textures.get(&id).ok_or(GpuError::UnknownTexture(id))?;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn update_texture_1d(&mut self, id: TextureId, size: u32, data: &[u8]) -> Result<(), GpuError> {
        self.update_texture_2d(id, size, 1, data)
    }

    fn destroy(&mut self, id: TextureId) {
        if let Some(texture) = self.textures.remove(&id) {
            texture.destroy();
        }
    }
}

/// wgpu format for a layout: (format, upload bytes per texel, widen RGB).
fn wgpu_format(layout: TextureLayout) -> (wgpu::TextureFormat, u32, bool) {
    match layout {
        TextureLayout::R8 => (wgpu::TextureFormat::R8Unorm, 1, false),
        TextureLayout::R16 => (wgpu::TextureFormat::R16Unorm, 2, false),
        TextureLayout::R32Float => (wgpu::TextureFormat::R32Float, 4, false),
        TextureLayout::Rgb8 => (wgpu::TextureFormat::Rgba8Unorm, 4, true),
        TextureLayout::Rgb16 => (wgpu::TextureFormat::Rgba16Unorm, 8, true),
        TextureLayout::Rgba8 => (wgpu::TextureFormat::Rgba8Unorm, 4, false),
        TextureLayout::Rgba16 => (wgpu::TextureFormat::Rgba16Unorm, 8, false),
    }
}

/// Widen tightly packed RGB texels to RGBA with an opaque alpha.
/// `component_bytes` is 1 for 8 bit channels, 2 for 16 bit.
fn widen_rgb_to_rgba(data: &[u8], component_bytes: u32) -> Vec<u8> {
    let cb = component_bytes as usize;
    let texel = 3 * cb;
    let mut out = Vec::with_capacity(data.len() / texel * 4 * cb);
    for rgb in data.chunks_exact(texel) {
        out.extend_from_slice(rgb);
        // opaque alpha in the channel's own width
        out.extend(std::iter::repeat(0xFF).take(cb));
    }
    out
}
