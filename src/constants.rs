//! Engine-wide constants.

/// Memory manager defaults and tuning knobs.
pub mod memory {
    /// A brick may be fetched through the shared upload hub when its byte
    /// size is at most this multiple of the IO subsystem's in-core size.
    pub const HUB_SLACK_FACTOR: u64 = 4;

    /// Default whole-pool GPU budget for volume bricks (512 MB).
    pub const DEFAULT_GPU_BUDGET: u64 = 512 * 1024 * 1024;

    /// Default per-dataset GPU budget for volume bricks (256 MB).
    pub const DEFAULT_DATASET_BUDGET: u64 = 256 * 1024 * 1024;

    /// Default in-core size hint used to bound hub reuse (8 MB).
    pub const DEFAULT_INCORE_SIZE: u64 = 8 * 1024 * 1024;
}
