//! In-memory dataset and loader used by unit tests.

use std::collections::HashMap;

use glam::UVec3;

use super::{BrickKey, Dataset, DatasetError, DatasetLoader};

/// A dataset held entirely in memory, one entry per brick.
#[derive(Debug, Clone)]
pub(crate) struct TestDataset {
    pub filename: String,
    pub bit_width: u32,
    pub component_count: u32,
    pub range: (f64, f64),
    pub same_endian: bool,
    pub dims: HashMap<BrickKey, UVec3>,
    pub bricks: HashMap<BrickKey, Vec<u8>>,
}

impl TestDataset {
    /// The key most tests use for their only brick.
    pub const KEY: BrickKey = BrickKey {
        lod: 0,
        brick: [0, 0, 0],
    };

    /// A dataset with one brick at [`Self::KEY`], filled with a cycling byte
    /// pattern of the correct length.
    pub fn single_brick(
        filename: &str,
        dims: UVec3,
        bit_width: u32,
        component_count: u32,
    ) -> Self {
        let mut ds = Self {
            filename: filename.to_string(),
            bit_width,
            component_count,
            range: (0.0, 255.0),
            same_endian: true,
            dims: HashMap::new(),
            bricks: HashMap::new(),
        };
        ds.add_brick(Self::KEY, dims);
        ds
    }

    /// Add a brick with generated contents.
    pub fn add_brick(&mut self, key: BrickKey, dims: UVec3) {
        let bytes = (dims.x * dims.y * dims.z * self.component_count * self.bit_width / 8) as usize;
        let data = (0..bytes).map(|i| (i % 251) as u8).collect();
        self.dims.insert(key, dims);
        self.bricks.insert(key, data);
    }
}

impl Dataset for TestDataset {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn brick_voxel_counts(&self, key: BrickKey) -> Result<UVec3, DatasetError> {
        self.dims
            .get(&key)
            .copied()
            .ok_or(DatasetError::UnknownBrick(key))
    }

    fn bit_width(&self) -> u32 {
        self.bit_width
    }

    fn component_count(&self) -> u32 {
        self.component_count
    }

    fn range(&self) -> (f64, f64) {
        self.range
    }

    fn is_same_endianness(&self) -> bool {
        self.same_endian
    }

    fn fetch_brick(&self, key: BrickKey, buffer: &mut Vec<u8>) -> Result<(), DatasetError> {
        let data = self
            .bricks
            .get(&key)
            .ok_or(DatasetError::UnknownBrick(key))?;
        buffer.clear();
        buffer.extend_from_slice(data);
        Ok(())
    }
}

/// Loader backed by a map of prepared datasets; unknown paths fail like a
/// missing file would.
#[derive(Default)]
pub(crate) struct TestLoader {
    pub datasets: HashMap<String, TestDataset>,
}

impl TestLoader {
    pub fn with(dataset: TestDataset) -> Self {
        let mut loader = Self::default();
        loader.add(dataset);
        loader
    }

    pub fn add(&mut self, dataset: TestDataset) {
        self.datasets.insert(dataset.filename.clone(), dataset);
    }
}

impl DatasetLoader for TestLoader {
    fn open(&self, path: &str) -> Result<Box<dyn Dataset>, DatasetError> {
        self.datasets
            .get(path)
            .cloned()
            .map(|ds| Box::new(ds) as Box<dyn Dataset>)
            .ok_or_else(|| DatasetError::Malformed(format!("no such dataset: {}", path)))
    }
}
