//! The GPU memory manager: owner of all cache entries and budgets.
//!
//! One manager instance is constructed per application and injected into
//! every renderer; renderers identify themselves by [`RendererId`] and talk
//! to the manager through handles and leases, never through references into
//! its storage.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::memory::{
    DEFAULT_DATASET_BUDGET, DEFAULT_GPU_BUDGET, DEFAULT_INCORE_SIZE, HUB_SLACK_FACTOR,
};
use crate::dataset::{BrickKey, Dataset, DatasetId, DatasetLoader, DatasetRegistry, RendererId};
use crate::error::MemManError;
use crate::gpu::{GpuBackend, TextureId};
use crate::memory::simple_textures::{SimpleTextureCache, SimpleTextureId};
use crate::memory::transfer_functions::{
    Transfer1dId, Transfer2dId, TransferFunction1d, TransferFunction2d, TransferFunctionStore,
};
use crate::memory::volume_cache::{
    plan_descriptor, BrickFormat, FrameStamp, VolumeCacheEntry, VolumeId, VolumeLease,
};

/// Memory manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemManConfig {
    /// Whole-pool GPU budget for volume bricks, in bytes.
    pub gpu_budget_bytes: u64,
    /// Per-dataset GPU budget for volume bricks, in bytes.
    pub dataset_budget_bytes: u64,
    /// IO subsystem's in-core size hint; bounds hub-buffer reuse.
    pub incore_size_bytes: u64,
    /// Whether to keep a shared upload hub at all.
    pub use_hub: bool,
}

impl Default for MemManConfig {
    fn default() -> Self {
        Self {
            gpu_budget_bytes: DEFAULT_GPU_BUDGET,
            dataset_budget_bytes: DEFAULT_DATASET_BUDGET,
            incore_size_bytes: DEFAULT_INCORE_SIZE,
            use_hub: true,
        }
    }
}

impl MemManConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), MemManError> {
        if self.gpu_budget_bytes == 0 {
            return Err(MemManError::InvalidConfig(
                "gpu_budget_bytes cannot be 0".into(),
            ));
        }
        if self.dataset_budget_bytes == 0 || self.dataset_budget_bytes > self.gpu_budget_bytes {
            return Err(MemManError::InvalidConfig(format!(
                "dataset_budget_bytes {} must be nonzero and no larger than the pool budget {}",
                self.dataset_budget_bytes, self.gpu_budget_bytes
            )));
        }
        if self.use_hub && self.incore_size_bytes == 0 {
            return Err(MemManError::InvalidConfig(
                "the upload hub requires a nonzero incore_size_bytes".into(),
            ));
        }
        Ok(())
    }
}

/// Memory manager usage summary.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemManStats {
    pub dataset_count: usize,
    pub volume_count: usize,
    /// GPU bytes held by volume brick entries.
    pub volume_bytes: u64,
    pub simple_texture_count: usize,
    pub transfer_count: usize,
    /// Total resident GPU bytes across all entry kinds.
    pub gpu_bytes_used: u64,
    pub evictions: u64,
}

/// Owns all cache entries (volume bricks, simple 2D textures, transfer
/// functions), enforces the pool and per-dataset budgets, and serves
/// load/access/free requests from multiple renderer clients.
///
/// Single-threaded by design: each render loop calls into the manager in
/// sequence. A multi-threaded embedding must wrap it in a mutex.
pub struct GpuMemMan {
    backend: Box<dyn GpuBackend>,
    loader: Box<dyn DatasetLoader>,
    config: MemManConfig,
    datasets: DatasetRegistry,
    volumes: HashMap<VolumeId, VolumeCacheEntry>,
    next_volume: u64,
    simple_textures: SimpleTextureCache,
    transfers: TransferFunctionStore,
    /// Shared upload staging buffer; empty when disabled.
    hub: Vec<u8>,
    evictions: u64,
}

impl GpuMemMan {
    pub fn new(
        backend: Box<dyn GpuBackend>,
        loader: Box<dyn DatasetLoader>,
        config: MemManConfig,
    ) -> Result<Self, MemManError> {
        config.validate()?;
        let hub = if config.use_hub {
            vec![0; (config.incore_size_bytes.saturating_mul(HUB_SLACK_FACTOR)) as usize]
        } else {
            Vec::new()
        };
        log::info!(
            "[GpuMemMan::new] Pool budget {} MB, per-dataset budget {} MB, hub {}",
            config.gpu_budget_bytes / 1024 / 1024,
            config.dataset_budget_bytes / 1024 / 1024,
            if config.use_hub { "enabled" } else { "disabled" }
        );
        Ok(Self {
            backend,
            loader,
            config,
            datasets: DatasetRegistry::new(),
            volumes: HashMap::new(),
            next_volume: 0,
            simple_textures: SimpleTextureCache::new(),
            transfers: TransferFunctionStore::new(),
            hub,
            evictions: 0,
        })
    }

    // === datasets ===

    /// Open a dataset for `requester`, reusing an already-open instance with
    /// the same filename. May block on disk.
    pub fn load_dataset(
        &mut self,
        path: &str,
        requester: RendererId,
    ) -> Result<DatasetId, MemManError> {
        self.datasets.load(self.loader.as_ref(), path, requester)
    }

    /// Release `requester`'s use of a dataset. When the last user releases
    /// it, the dataset is destroyed together with all its resident bricks.
    pub fn free_dataset(&mut self, dataset: DatasetId, requester: RendererId) {
        if self.datasets.free(dataset, requester) {
            self.free_associated_bricks(dataset);
        }
    }

    pub fn dataset(&self, id: DatasetId) -> Option<&dyn Dataset> {
        self.datasets.dataset(id)
    }

    // === volume bricks ===

    /// Resolve a brick request to a GPU resource.
    ///
    /// In order of preference: an exact cached match (access), the least
    /// recently used unused entry of the same shape and format (replace in
    /// place), or a fresh allocation. `stamp` is the caller's current
    /// `(frame, intra_frame)` position and must be non-decreasing across
    /// the session.
    pub fn get_volume(
        &mut self,
        dataset: DatasetId,
        key: BrickKey,
        format: BrickFormat,
        stamp: FrameStamp,
    ) -> Result<VolumeLease, MemManError> {
        // fast path: the exact brick is already resident
        if let Some((&id, entry)) = self
            .volumes
            .iter_mut()
            .find(|(_, e)| e.matches(dataset, key, format))
        {
            let texture = entry.access(stamp);
            return Ok(VolumeLease {
                volume: id,
                dataset,
                key,
                texture,
            });
        }

        let (dims, bit_width, component_count) = {
            let ds = self
                .datasets
                .dataset(dataset)
                .ok_or(MemManError::UnknownDataset(dataset))?;
            (
                ds.brick_voxel_counts(key)?,
                ds.bit_width(),
                ds.component_count(),
            )
        };
        // shape errors surface here, before any fetch or entry creation
        let desc = plan_descriptor(bit_width, component_count, dims, format)?;

        // LRU replace among unused same-shape entries of this dataset
        let candidate = self
            .volumes
            .iter()
            .filter(|(_, e)| e.is_replace_candidate(dataset, dims, format))
            .min_by_key(|(_, e)| e.stamp())
            .map(|(&id, _)| id);

        if let Some(id) = candidate {
            let replaced = match (self.datasets.dataset(dataset), self.volumes.get_mut(&id)) {
                (Some(ds), Some(entry)) => entry
                    .replace(
                        ds,
                        key,
                        stamp,
                        &mut self.hub,
                        self.config.incore_size_bytes,
                        self.backend.as_mut(),
                    )
                    .map(|_| entry.texture()),
                _ => Err(MemManError::UnknownDataset(dataset)),
            };
            return match replaced {
                Ok(texture) => {
                    log::debug!(
                        "[GpuMemMan::get_volume] Rebound cached texture to brick {:?}",
                        key
                    );
                    Ok(VolumeLease {
                        volume: id,
                        dataset,
                        key,
                        texture,
                    })
                }
                Err(e) => {
                    // the entry's GPU contents are undefined now; tear it down
                    log::warn!(
                        "[GpuMemMan::get_volume] Replace failed for brick {:?}: {}",
                        key,
                        e
                    );
                    if let Some(dead) = self.volumes.remove(&id) {
                        dead.destroy(self.backend.as_mut());
                    }
                    Err(e)
                }
            };
        }

        // no reusable entry: make room under the budgets and allocate
        self.make_room(dataset, desc.byte_size())?;

        let Some(ds) = self.datasets.dataset(dataset) else {
            return Err(MemManError::UnknownDataset(dataset));
        };
        let entry = VolumeCacheEntry::create(
            dataset,
            ds,
            key,
            format,
            stamp,
            &mut self.hub,
            self.config.incore_size_bytes,
            self.backend.as_mut(),
        )?;

        let id = VolumeId(self.next_volume);
        self.next_volume += 1;
        let texture = entry.texture();
        self.volumes.insert(id, entry);
        Ok(VolumeLease {
            volume: id,
            dataset,
            key,
            texture,
        })
    }

    /// Return a lease, dropping one user from its entry. A lease whose entry
    /// has since been destroyed is a diagnostic, not an error.
    pub fn release_volume(&mut self, lease: VolumeLease) {
        match self.volumes.get_mut(&lease.volume) {
            Some(entry) => {
                if !entry.release() {
                    log::warn!(
                        "[GpuMemMan::release_volume] Entry for brick {:?} was not in use",
                        lease.key
                    );
                }
            }
            None => {
                log::warn!(
                    "[GpuMemMan::release_volume] Brick {:?} is no longer resident",
                    lease.key
                );
            }
        }
    }

    /// Destroy every volume entry bound to `dataset`. Entries still in use
    /// are logged and destroyed anyway; the dataset is going away.
    pub fn free_associated_bricks(&mut self, dataset: DatasetId) {
        let ids: Vec<_> = self
            .volumes
            .iter()
            .filter(|(_, e)| e.dataset() == dataset)
            .map(|(&id, _)| id)
            .collect();
        for id in ids {
            if let Some(entry) = self.volumes.remove(&id) {
                if entry.user_count() > 0 {
                    log::warn!(
                        "[GpuMemMan::free_associated_bricks] Brick {:?} still has {} users",
                        entry.key(),
                        entry.user_count()
                    );
                }
                entry.destroy(self.backend.as_mut());
            }
        }
    }

    // === budgets ===

    /// GPU bytes held by volume brick entries.
    pub fn volume_bytes(&self) -> u64 {
        self.volumes.values().map(|e| e.gpu_bytes()).sum()
    }

    /// GPU bytes held by volume brick entries of one dataset.
    pub fn volume_bytes_by(&self, dataset: DatasetId) -> u64 {
        self.volumes
            .values()
            .filter(|e| e.dataset() == dataset)
            .map(|e| e.gpu_bytes())
            .sum()
    }

    /// Total resident GPU bytes across all entry kinds.
    pub fn gpu_bytes_used(&self) -> u64 {
        self.volume_bytes() + self.simple_textures.gpu_bytes() + self.transfers.gpu_bytes()
    }

    /// Change the pool budget, evicting unused entries down to the new limit.
    pub fn set_gpu_budget(&mut self, bytes: u64) {
        self.config.gpu_budget_bytes = bytes;
        while self.volume_bytes() > bytes {
            if !self.evict_lru(None) {
                log::warn!(
                    "[GpuMemMan::set_gpu_budget] {} bytes still resident above the new budget, all in use",
                    self.volume_bytes()
                );
                break;
            }
        }
    }

    /// Evict unused entries until `incoming` more bytes fit under both the
    /// pool and the per-dataset budget.
    fn make_room(&mut self, dataset: DatasetId, incoming: u64) -> Result<(), MemManError> {
        while self.volume_bytes().saturating_add(incoming) > self.config.gpu_budget_bytes {
            if !self.evict_lru(None) {
                return Err(MemManError::GpuAllocation {
                    bytes: incoming,
                    message: "volume pool budget exhausted".into(),
                });
            }
        }
        while self.volume_bytes_by(dataset).saturating_add(incoming)
            > self.config.dataset_budget_bytes
        {
            if !self.evict_lru(Some(dataset)) {
                return Err(MemManError::GpuAllocation {
                    bytes: incoming,
                    message: "per-dataset budget exhausted".into(),
                });
            }
        }
        Ok(())
    }

    /// Destroy the least recently used unused entry, optionally restricted
    /// to one dataset. Returns `false` when nothing is evictable.
    fn evict_lru(&mut self, dataset: Option<DatasetId>) -> bool {
        let victim = self
            .volumes
            .iter()
            .filter(|(_, e)| {
                e.user_count() == 0 && dataset.map_or(true, |d| e.dataset() == d)
            })
            .min_by_key(|(_, e)| e.stamp())
            .map(|(&id, _)| id);
        let Some(id) = victim else {
            return false;
        };
        if let Some(entry) = self.volumes.remove(&id) {
            log::info!(
                "[GpuMemMan::evict_lru] Evicting brick {:?} ({} bytes)",
                entry.key(),
                entry.gpu_bytes()
            );
            entry.destroy(self.backend.as_mut());
            self.evictions += 1;
            true
        } else {
            false
        }
    }

    // === simple textures ===

    pub fn load_texture(&mut self, path: &str) -> Result<(SimpleTextureId, TextureId), MemManError> {
        self.simple_textures.load(self.backend.as_mut(), path)
    }

    pub fn free_texture(&mut self, id: SimpleTextureId) {
        self.simple_textures.free(self.backend.as_mut(), id);
    }

    // === transfer functions ===

    pub fn get_empty_transfer_1d(
        &mut self,
        size: usize,
        requester: RendererId,
    ) -> Result<(Transfer1dId, TextureId), MemManError> {
        self.transfers
            .get_empty_1d(self.backend.as_mut(), size, requester)
    }

    pub fn get_empty_transfer_2d(
        &mut self,
        width: u32,
        height: u32,
        requester: RendererId,
    ) -> Result<(Transfer2dId, TextureId), MemManError> {
        self.transfers
            .get_empty_2d(self.backend.as_mut(), width, height, requester)
    }

    pub fn update_transfer_1d(
        &mut self,
        id: Transfer1dId,
        requester: RendererId,
        edit: impl FnOnce(&mut TransferFunction1d),
    ) -> Result<(), MemManError> {
        self.transfers
            .update_1d(self.backend.as_mut(), id, requester, edit)
    }

    pub fn update_transfer_2d(
        &mut self,
        id: Transfer2dId,
        requester: RendererId,
        edit: impl FnOnce(&mut TransferFunction2d),
    ) -> Result<(), MemManError> {
        self.transfers
            .update_2d(self.backend.as_mut(), id, requester, edit)
    }

    pub fn access_transfer_1d(&self, id: Transfer1dId, requester: RendererId) -> Option<TextureId> {
        self.transfers.access_1d(id, requester)
    }

    pub fn access_transfer_2d(&self, id: Transfer2dId, requester: RendererId) -> Option<TextureId> {
        self.transfers.access_2d(id, requester)
    }

    pub fn free_transfer_1d(&mut self, id: Transfer1dId, requester: RendererId) {
        self.transfers.free_1d(self.backend.as_mut(), id, requester);
    }

    pub fn free_transfer_2d(&mut self, id: Transfer2dId, requester: RendererId) {
        self.transfers.free_2d(self.backend.as_mut(), id, requester);
    }

    /// Free every transfer function owned by `requester`, for renderer
    /// shutdown. Datasets still need their own `free_dataset` calls.
    pub fn free_renderer_resources(&mut self, requester: RendererId) {
        self.transfers.free_all_for(self.backend.as_mut(), requester);
    }

    pub fn stats(&self) -> MemManStats {
        MemManStats {
            dataset_count: self.datasets.len(),
            volume_count: self.volumes.len(),
            volume_bytes: self.volume_bytes(),
            simple_texture_count: self.simple_textures.len(),
            transfer_count: self.transfers.len(),
            gpu_bytes_used: self.gpu_bytes_used(),
            evictions: self.evictions,
        }
    }
}

impl Drop for GpuMemMan {
    fn drop(&mut self) {
        for (_, entry) in self.volumes.drain() {
            entry.destroy(self.backend.as_mut());
        }
        self.simple_textures.destroy_all(self.backend.as_mut());
        self.transfers.destroy_all(self.backend.as_mut());
    }
}
