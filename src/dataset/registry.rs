//! Open-dataset tracking with per-requester reference counting.

use std::collections::HashMap;

use super::{Dataset, DatasetLoader, RendererId};
use crate::error::MemManError;

/// Handle to a registered dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetId(pub(crate) u64);

struct DatasetSlot {
    dataset: Box<dyn Dataset>,
    users: Vec<RendererId>,
}

/// Tracks which logical datasets are open and by how many renderers.
///
/// Datasets are reused by filename: a second `load` for the same file
/// registers the requester on the existing instance instead of re-reading
/// from storage. A dataset is destroyed when its last user releases it.
pub struct DatasetRegistry {
    slots: HashMap<DatasetId, DatasetSlot>,
    next_id: u64,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_id: 0,
        }
    }

    /// Open `path` for `requester`, reusing an already-open dataset with the
    /// same filename. Opening delegates to `loader` and may block on disk.
    pub fn load(
        &mut self,
        loader: &dyn DatasetLoader,
        path: &str,
        requester: RendererId,
    ) -> Result<DatasetId, MemManError> {
        if let Some((&id, slot)) = self
            .slots
            .iter_mut()
            .find(|(_, slot)| slot.dataset.filename() == path)
        {
            log::info!("[DatasetRegistry::load] Reusing {}", path);
            if !slot.users.contains(&requester) {
                slot.users.push(requester);
            }
            return Ok(id);
        }

        log::info!("[DatasetRegistry::load] Loading {}", path);
        let dataset = loader
            .open(path)
            .map_err(|e| MemManError::DatasetOpen {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        let id = DatasetId(self.next_id);
        self.next_id += 1;
        self.slots.insert(
            id,
            DatasetSlot {
                dataset,
                users: vec![requester],
            },
        );
        Ok(id)
    }

    /// Remove `requester` from the dataset's user set, destroying the dataset
    /// when the set empties. Unknown ids or unregistered requesters are a
    /// diagnostic, not an error.
    ///
    /// Returns `true` when the dataset was destroyed.
    pub fn free(&mut self, id: DatasetId, requester: RendererId) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            log::warn!(
                "[DatasetRegistry::free] Dataset {:?} not found or not being used by requester",
                id
            );
            return false;
        };
        let Some(pos) = slot.users.iter().position(|u| *u == requester) else {
            log::warn!(
                "[DatasetRegistry::free] Dataset {} not being used by requester {:?}",
                slot.dataset.filename(),
                requester
            );
            return false;
        };

        slot.users.remove(pos);
        if slot.users.is_empty() {
            log::info!(
                "[DatasetRegistry::free] Released dataset {}",
                slot.dataset.filename()
            );
            self.slots.remove(&id);
            true
        } else {
            log::info!(
                "[DatasetRegistry::free] Decreased access count but dataset {} is still in use",
                slot.dataset.filename()
            );
            false
        }
    }

    pub fn dataset(&self, id: DatasetId) -> Option<&dyn Dataset> {
        self.slots.get(&id).map(|slot| slot.dataset.as_ref())
    }

    pub fn user_count(&self, id: DatasetId) -> usize {
        self.slots.get(&id).map_or(0, |slot| slot.users.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            dataset_count: self.slots.len(),
            user_count: self.slots.values().map(|s| s.users.len()).sum(),
        }
    }
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry usage summary.
#[derive(Debug, Clone, Copy)]
pub struct RegistryStats {
    pub dataset_count: usize,
    pub user_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::testing::{TestDataset, TestLoader};
    use crate::dataset::RendererId;
    use glam::UVec3;

    const R1: RendererId = RendererId(1);
    const R2: RendererId = RendererId(2);

    fn loader() -> TestLoader {
        TestLoader::with(TestDataset::single_brick(
            "volume.uvf",
            UVec3::new(4, 4, 4),
            8,
            1,
        ))
    }

    #[test]
    fn test_load_reuses_open_dataset() {
        let loader = loader();
        let mut registry = DatasetRegistry::new();

        let a = registry.load(&loader, "volume.uvf", R1).unwrap();
        let b = registry.load(&loader, "volume.uvf", R2).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.user_count(a), 2);
    }

    #[test]
    fn test_duplicate_registration_counts_once() {
        let loader = loader();
        let mut registry = DatasetRegistry::new();

        let id = registry.load(&loader, "volume.uvf", R1).unwrap();
        registry.load(&loader, "volume.uvf", R1).unwrap();
        assert_eq!(registry.user_count(id), 1);

        assert!(registry.free(id, R1));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_free_requires_both_users() {
        let loader = loader();
        let mut registry = DatasetRegistry::new();

        let id = registry.load(&loader, "volume.uvf", R1).unwrap();
        registry.load(&loader, "volume.uvf", R2).unwrap();

        assert!(!registry.free(id, R1));
        assert_eq!(registry.len(), 1);
        assert!(registry.free(id, R2));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_free_unknown_is_diagnostic_only() {
        let loader = loader();
        let mut registry = DatasetRegistry::new();
        let id = registry.load(&loader, "volume.uvf", R1).unwrap();

        assert!(!registry.free(DatasetId(99), R1));
        assert!(!registry.free(id, R2));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.user_count(id), 1);
    }

    #[test]
    fn test_open_failure_leaves_registry_empty() {
        let loader = TestLoader::default();
        let mut registry = DatasetRegistry::new();

        let err = registry.load(&loader, "missing.uvf", R1).unwrap_err();
        assert!(matches!(err, crate::error::MemManError::DatasetOpen { .. }));
        assert!(registry.is_empty());
    }
}
