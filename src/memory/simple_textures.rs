//! Filename-keyed cache of simple 2D textures.
//!
//! Unlike volume bricks there is no eviction policy: entries live until
//! their access count drops to zero, and backend exhaustion is a hard
//! failure rather than a trigger for reclaiming other entries.

use std::collections::HashMap;

use crate::error::MemManError;
use crate::gpu::{GpuBackend, TextureId};

/// Handle to a cached simple texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimpleTextureId(pub(crate) u64);

struct SimpleTextureEntry {
    filename: String,
    texture: TextureId,
    access_count: u32,
    gpu_bytes: u64,
}

pub(crate) struct SimpleTextureCache {
    entries: HashMap<SimpleTextureId, SimpleTextureEntry>,
    next_id: u64,
}

impl SimpleTextureCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 0,
        }
    }

    /// Load an image file as a 2D texture, reusing an already-loaded file by
    /// name with a plain access counter.
    pub fn load(
        &mut self,
        backend: &mut dyn GpuBackend,
        path: &str,
    ) -> Result<(SimpleTextureId, TextureId), MemManError> {
        if let Some((&id, entry)) = self
            .entries
            .iter_mut()
            .find(|(_, e)| e.filename == path)
        {
            log::info!("[SimpleTextureCache::load] Reusing {}", path);
            entry.access_count += 1;
            return Ok((id, entry.texture));
        }

        log::info!("[SimpleTextureCache::load] Loading {}", path);
        let image = image::open(path)
            .map_err(|e| MemManError::TextureLoad {
                path: path.to_string(),
                message: e.to_string(),
            })?
            .to_rgba8();
        let (width, height) = image.dimensions();

        let texture = backend.create_texture_2d(width, height, image.as_raw())?;
        let id = SimpleTextureId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            SimpleTextureEntry {
                filename: path.to_string(),
                texture,
                access_count: 1,
                gpu_bytes: u64::from(width) * u64::from(height) * 4,
            },
        );
        Ok((id, texture))
    }

    /// Decrement the access counter, destroying the texture at zero.
    /// Unknown handles are a diagnostic, not an error.
    pub fn free(&mut self, backend: &mut dyn GpuBackend, id: SimpleTextureId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            log::warn!("[SimpleTextureCache::free] Texture not found");
            return;
        };
        entry.access_count -= 1;
        if entry.access_count == 0 {
            log::info!(
                "[SimpleTextureCache::free] Deleted texture {}",
                entry.filename
            );
            let texture = entry.texture;
            self.entries.remove(&id);
            backend.destroy(texture);
        } else {
            log::info!(
                "[SimpleTextureCache::free] Decreased access count but the texture {} is still in use",
                entry.filename
            );
        }
    }

    pub fn destroy_all(&mut self, backend: &mut dyn GpuBackend) {
        for (_, entry) in self.entries.drain() {
            backend.destroy(entry.texture);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn gpu_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.gpu_bytes).sum()
    }
}
