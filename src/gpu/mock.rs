//! In-memory backend for tests. Records every resource and supports
//! failure injection for allocation paths.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{GpuBackend, GpuError, TextureId, VolumeDescriptor};

#[derive(Debug, Clone)]
pub enum MockResource {
    Volume {
        desc: VolumeDescriptor,
        data: Vec<u8>,
    },
    Texture2d {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
    Texture1d {
        size: u32,
        data: Vec<u8>,
    },
}

#[derive(Debug, Default)]
pub struct MockState {
    pub resources: HashMap<TextureId, MockResource>,
    pub created: u64,
    pub updated: u64,
    pub destroyed: u64,
    /// When set, every create fails with `OutOfMemory`.
    pub fail_creates: bool,
    next_id: u64,
}

impl MockState {
    pub fn volume(&self, id: TextureId) -> &MockResource {
        &self.resources[&id]
    }
}

/// Test double for [`GpuBackend`]. State is shared behind `Rc` so tests keep
/// a handle after the backend moves into the manager.
pub struct MockBackend {
    state: Rc<RefCell<MockState>>,
}

impl MockBackend {
    pub fn new() -> (Self, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState::default()));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }

    fn create(&mut self, bytes: u64, resource: MockResource) -> Result<TextureId, GpuError> {
        let mut state = self.state.borrow_mut();
        if state.fail_creates {
            return Err(GpuError::OutOfMemory { bytes });
        }
        let id = TextureId(state.next_id);
        state.next_id += 1;
        state.created += 1;
        state.resources.insert(id, resource);
        Ok(id)
    }
}

impl GpuBackend for MockBackend {
    fn create_volume(
        &mut self,
        desc: &VolumeDescriptor,
        data: &[u8],
    ) -> Result<TextureId, GpuError> {
        assert_eq!(data.len() as u64, desc.byte_size(), "upload size mismatch");
        self.create(
            desc.byte_size(),
            MockResource::Volume {
                desc: *desc,
                data: data.to_vec(),
            },
        )
    }

    fn update_volume(
        &mut self,
        id: TextureId,
        desc: &VolumeDescriptor,
        data: &[u8],
    ) -> Result<(), GpuError> {
        assert_eq!(data.len() as u64, desc.byte_size(), "upload size mismatch");
        let mut state = self.state.borrow_mut();
        state.updated += 1;
        match state.resources.get_mut(&id) {
            Some(MockResource::Volume {
                desc: stored,
                data: stored_data,
            }) => {
                *stored = *desc;
                *stored_data = data.to_vec();
                Ok(())
            }
            _ => Err(GpuError::UnknownTexture(id)),
        }
    }

    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<TextureId, GpuError> {
        self.create(
            u64::from(width) * u64::from(height) * 4,
            MockResource::Texture2d {
                width,
                height,
                data: data.to_vec(),
            },
        )
    }

    fn create_texture_1d(&mut self, size: u32, data: &[u8]) -> Result<TextureId, GpuError> {
        self.create(
            u64::from(size) * 4,
            MockResource::Texture1d {
                size,
                data: data.to_vec(),
            },
        )
    }

    fn update_texture_2d(
        &mut self,
        id: TextureId,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let mut state = self.state.borrow_mut();
        state.updated += 1;
        match state.resources.get_mut(&id) {
            Some(MockResource::Texture2d {
                width: w,
                height: h,
                data: stored,
            }) => {
                *w = width;
                *h = height;
                *stored = data.to_vec();
                Ok(())
            }
            _ => Err(GpuError::UnknownTexture(id)),
        }
    }

    fn update_texture_1d(&mut self, id: TextureId, size: u32, data: &[u8]) -> Result<(), GpuError> {
        let mut state = self.state.borrow_mut();
        state.updated += 1;
        match state.resources.get_mut(&id) {
            Some(MockResource::Texture1d { size: s, data: stored }) => {
                *s = size;
                *stored = data.to_vec();
                Ok(())
            }
            _ => Err(GpuError::UnknownTexture(id)),
        }
    }

    fn destroy(&mut self, id: TextureId) {
        let mut state = self.state.borrow_mut();
        if state.resources.remove(&id).is_some() {
            state.destroyed += 1;
        }
    }
}
