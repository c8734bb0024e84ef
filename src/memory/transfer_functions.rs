//! Per-renderer transfer-function entries.
//!
//! Transfer functions are not a shared cache: every entry belongs to the
//! renderer that requested it and is neither reused across renderers nor
//! evicted. Non-owner access is a diagnostic and leaves state unchanged.

use std::collections::HashMap;

use crate::dataset::RendererId;
use crate::error::MemManError;
use crate::gpu::{GpuBackend, TextureId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transfer1dId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transfer2dId(pub(crate) u64);

/// CPU-side 1D transfer function: an RGBA lookup ramp.
#[derive(Debug, Clone)]
pub struct TransferFunction1d {
    rgba: Vec<[u8; 4]>,
}

impl TransferFunction1d {
    /// A fully transparent ramp of `size` entries.
    pub fn new(size: usize) -> Self {
        Self {
            rgba: vec![[0; 4]; size],
        }
    }

    pub fn len(&self) -> usize {
        self.rgba.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rgba.is_empty()
    }

    pub fn set(&mut self, index: usize, rgba: [u8; 4]) {
        if let Some(slot) = self.rgba.get_mut(index) {
            *slot = rgba;
        }
    }

    pub fn texels(&self) -> &[u8] {
        bytemuck::cast_slice(&self.rgba)
    }
}

/// CPU-side 2D transfer function: an RGBA table indexed by value and
/// gradient magnitude.
#[derive(Debug, Clone)]
pub struct TransferFunction2d {
    width: u32,
    height: u32,
    rgba: Vec<[u8; 4]>,
}

impl TransferFunction2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![[0; 4]; (width * height) as usize],
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn set(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x < self.width && y < self.height {
            self.rgba[(x + y * self.width) as usize] = rgba;
        }
    }

    pub fn texels(&self) -> &[u8] {
        bytemuck::cast_slice(&self.rgba)
    }
}

struct Transfer1dEntry {
    func: TransferFunction1d,
    texture: TextureId,
    owner: RendererId,
}

struct Transfer2dEntry {
    func: TransferFunction2d,
    texture: TextureId,
    owner: RendererId,
}

pub(crate) struct TransferFunctionStore {
    t1d: HashMap<Transfer1dId, Transfer1dEntry>,
    t2d: HashMap<Transfer2dId, Transfer2dEntry>,
    next_id: u64,
}

impl TransferFunctionStore {
    pub fn new() -> Self {
        Self {
            t1d: HashMap::new(),
            t2d: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn get_empty_1d(
        &mut self,
        backend: &mut dyn GpuBackend,
        size: usize,
        requester: RendererId,
    ) -> Result<(Transfer1dId, TextureId), MemManError> {
        log::info!("[TransferFunctionStore::get_empty_1d] Creating new empty 1D transfer function");
        let func = TransferFunction1d::new(size);
        let texture = backend.create_texture_1d(size as u32, func.texels())?;
        let id = Transfer1dId(self.next_id);
        self.next_id += 1;
        self.t1d.insert(
            id,
            Transfer1dEntry {
                func,
                texture,
                owner: requester,
            },
        );
        Ok((id, texture))
    }

    pub fn get_empty_2d(
        &mut self,
        backend: &mut dyn GpuBackend,
        width: u32,
        height: u32,
        requester: RendererId,
    ) -> Result<(Transfer2dId, TextureId), MemManError> {
        log::info!("[TransferFunctionStore::get_empty_2d] Creating new empty 2D transfer function");
        let func = TransferFunction2d::new(width, height);
        let texture = backend.create_texture_2d(width, height, func.texels())?;
        let id = Transfer2dId(self.next_id);
        self.next_id += 1;
        self.t2d.insert(
            id,
            Transfer2dEntry {
                func,
                texture,
                owner: requester,
            },
        );
        Ok((id, texture))
    }

    /// Mutate the owning renderer's function and re-upload its texture.
    pub fn update_1d(
        &mut self,
        backend: &mut dyn GpuBackend,
        id: Transfer1dId,
        requester: RendererId,
        edit: impl FnOnce(&mut TransferFunction1d),
    ) -> Result<(), MemManError> {
        let Some(entry) = self.t1d.get_mut(&id) else {
            log::warn!("[TransferFunctionStore::update_1d] Transfer function not found");
            return Ok(());
        };
        if entry.owner != requester {
            log::warn!(
                "[TransferFunctionStore::update_1d] Requester {:?} does not own this transfer function",
                requester
            );
            return Ok(());
        }
        edit(&mut entry.func);
        backend.update_texture_1d(entry.texture, entry.func.len() as u32, entry.func.texels())?;
        Ok(())
    }

    pub fn update_2d(
        &mut self,
        backend: &mut dyn GpuBackend,
        id: Transfer2dId,
        requester: RendererId,
        edit: impl FnOnce(&mut TransferFunction2d),
    ) -> Result<(), MemManError> {
        let Some(entry) = self.t2d.get_mut(&id) else {
            log::warn!("[TransferFunctionStore::update_2d] Transfer function not found");
            return Ok(());
        };
        if entry.owner != requester {
            log::warn!(
                "[TransferFunctionStore::update_2d] Requester {:?} does not own this transfer function",
                requester
            );
            return Ok(());
        }
        edit(&mut entry.func);
        let (width, height) = entry.func.size();
        backend.update_texture_2d(entry.texture, width, height, entry.func.texels())?;
        Ok(())
    }

    /// Texture handle for the owning renderer; `None` (with a diagnostic)
    /// for unknown entries or non-owners.
    pub fn access_1d(&self, id: Transfer1dId, requester: RendererId) -> Option<TextureId> {
        match self.t1d.get(&id) {
            Some(entry) if entry.owner == requester => Some(entry.texture),
            Some(_) => {
                log::warn!(
                    "[TransferFunctionStore::access_1d] Requester {:?} does not own this transfer function",
                    requester
                );
                None
            }
            None => {
                log::warn!("[TransferFunctionStore::access_1d] Transfer function not found");
                None
            }
        }
    }

    pub fn access_2d(&self, id: Transfer2dId, requester: RendererId) -> Option<TextureId> {
        match self.t2d.get(&id) {
            Some(entry) if entry.owner == requester => Some(entry.texture),
            Some(_) => {
                log::warn!(
                    "[TransferFunctionStore::access_2d] Requester {:?} does not own this transfer function",
                    requester
                );
                None
            }
            None => {
                log::warn!("[TransferFunctionStore::access_2d] Transfer function not found");
                None
            }
        }
    }

    pub fn free_1d(&mut self, backend: &mut dyn GpuBackend, id: Transfer1dId, requester: RendererId) {
        match self.t1d.get(&id) {
            Some(entry) if entry.owner == requester => {
                let texture = entry.texture;
                self.t1d.remove(&id);
                backend.destroy(texture);
            }
            Some(_) => {
                log::warn!(
                    "[TransferFunctionStore::free_1d] Requester {:?} does not own this transfer function",
                    requester
                );
            }
            None => {
                log::warn!("[TransferFunctionStore::free_1d] Transfer function not found");
            }
        }
    }

    pub fn free_2d(&mut self, backend: &mut dyn GpuBackend, id: Transfer2dId, requester: RendererId) {
        match self.t2d.get(&id) {
            Some(entry) if entry.owner == requester => {
                let texture = entry.texture;
                self.t2d.remove(&id);
                backend.destroy(texture);
            }
            Some(_) => {
                log::warn!(
                    "[TransferFunctionStore::free_2d] Requester {:?} does not own this transfer function",
                    requester
                );
            }
            None => {
                log::warn!("[TransferFunctionStore::free_2d] Transfer function not found");
            }
        }
    }

    /// Free every entry owned by `requester`, e.g. on renderer shutdown.
    pub fn free_all_for(&mut self, backend: &mut dyn GpuBackend, requester: RendererId) {
        let t1d: Vec<_> = self
            .t1d
            .iter()
            .filter(|(_, e)| e.owner == requester)
            .map(|(&id, _)| id)
            .collect();
        for id in t1d {
            if let Some(entry) = self.t1d.remove(&id) {
                backend.destroy(entry.texture);
            }
        }
        let t2d: Vec<_> = self
            .t2d
            .iter()
            .filter(|(_, e)| e.owner == requester)
            .map(|(&id, _)| id)
            .collect();
        for id in t2d {
            if let Some(entry) = self.t2d.remove(&id) {
                backend.destroy(entry.texture);
            }
        }
    }

    pub fn destroy_all(&mut self, backend: &mut dyn GpuBackend) {
        for (_, entry) in self.t1d.drain() {
            backend.destroy(entry.texture);
        }
        for (_, entry) in self.t2d.drain() {
            backend.destroy(entry.texture);
        }
    }

    pub fn len(&self) -> usize {
        self.t1d.len() + self.t2d.len()
    }

    pub fn gpu_bytes(&self) -> u64 {
        let t1d: u64 = self.t1d.values().map(|e| e.func.len() as u64 * 4).sum();
        let t2d: u64 = self
            .t2d
            .values()
            .map(|e| {
                let (w, h) = e.func.size();
                u64::from(w) * u64::from(h) * 4
            })
            .sum();
        t1d + t2d
    }
}
