//! Pure voxel-buffer transforms used on the brick upload path.
//!
//! Everything here operates on tightly packed row-major data and reports
//! allocation failure instead of aborting, so a too-large brick degrades to
//! a failed request rather than corrupting resident entries.

use glam::UVec3;

use crate::error::MemManError;

pub fn next_pow2(x: u32) -> u32 {
    x.next_power_of_two()
}

pub fn is_pow2(x: u32) -> bool {
    x.is_power_of_two()
}

/// Whether all three extents are already powers of two.
pub fn dims_are_pow2(dims: UVec3) -> bool {
    is_pow2(dims.x) && is_pow2(dims.y) && is_pow2(dims.z)
}

/// Pad raw voxel data to power-of-two extents.
///
/// The target buffer is zero-initialized and each source row is copied into
/// the row-major target layout. With `disable_border` unset, the last real
/// element, row and plane are replicated along x, y and z so sampling beyond
/// the true data behaves like clamp-to-edge; with it set, the padding stays
/// zero for a hard edge.
///
/// `element_size` is bytes per voxel (bit width / 8 times component count).
/// Idempotent on already power-of-two input.
pub fn pad_to_pow2(
    data: &[u8],
    dims: UVec3,
    element_size: usize,
    disable_border: bool,
) -> Result<(Vec<u8>, UVec3), MemManError> {
    let padded = UVec3::new(next_pow2(dims.x), next_pow2(dims.y), next_pow2(dims.z));

    let row_src = dims.x as usize * element_size;
    let row_tgt = padded.x as usize * element_size;
    let plane_tgt = row_tgt * padded.y as usize;

    let total_u64 = plane_tgt as u64 * u64::from(padded.z);
    let total: usize = total_u64
        .try_into()
        .map_err(|_| MemManError::HostAllocation {
            bytes: usize::MAX,
        })?;

    let mut out = Vec::new();
    out.try_reserve_exact(total)
        .map_err(|_| MemManError::HostAllocation { bytes: total })?;
    out.resize(total, 0);

    debug_assert!(data.len() >= row_src * dims.y as usize * dims.z as usize);

    for z in 0..dims.z as usize {
        let plane_base = z * plane_tgt;
        for y in 0..dims.y as usize {
            let src = y * row_src + z * row_src * dims.y as usize;
            let tgt = plane_base + y * row_tgt;
            out[tgt..tgt + row_src].copy_from_slice(&data[src..src + row_src]);

            // clamp along x: repeat the last element to the end of the row
            if !disable_border && row_tgt > row_src {
                let last = tgt + row_src - element_size;
                for i in 0..(padded.x as usize - dims.x as usize) {
                    let dst = tgt + row_src + i * element_size;
                    out.copy_within(last..last + element_size, dst);
                }
            }
        }

        // clamp along y: repeat the last real row
        if !disable_border && padded.y > dims.y {
            let last_row = plane_base + (dims.y as usize - 1) * row_tgt;
            for y in dims.y as usize..padded.y as usize {
                let dst = plane_base + y * row_tgt;
                out.copy_within(last_row..last_row + row_tgt, dst);
            }
        }
    }

    // clamp along z: repeat the last real plane
    if !disable_border && padded.z > dims.z {
        let last_plane = (dims.z as usize - 1) * plane_tgt;
        for z in dims.z as usize..padded.z as usize {
            let dst = z * plane_tgt;
            out.copy_within(last_plane..last_plane + plane_tgt, dst);
        }
    }

    Ok((out, padded))
}

/// Quantize 16 bit elements to 8 bit in place using the dataset's value
/// range: `(value - min) / (max - min) * 255`, truncated.
///
/// The result occupies the first half of `data`; the element count is
/// returned. Values are read in host byte order, so any endian swap must
/// happen first.
pub fn quantize_16_to_8(data: &mut [u8], min: f64, max: f64) -> usize {
    let scale = if max > min { 255.0 / (max - min) } else { 0.0 };
    let count = data.len() / 2;
    for i in 0..count {
        let v = f64::from(u16::from_ne_bytes([data[2 * i], data[2 * i + 1]]));
        data[i] = ((v - min) * scale).clamp(0.0, 255.0) as u8;
    }
    count
}

/// Swap the byte order of every 16 bit element in place.
pub fn swap_endian_16(data: &mut [u8]) {
    for pair in data.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_pow2() {
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(2), 2);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(17), 32);
        assert_eq!(next_pow2(256), 256);
    }

    #[test]
    fn test_pad_identity_on_pow2_input() {
        let dims = UVec3::new(4, 2, 2);
        let data: Vec<u8> = (0..16).collect();
        let (padded, size) = pad_to_pow2(&data, dims, 1, false).unwrap();
        assert_eq!(size, dims);
        assert_eq!(padded, data);
    }

    #[test]
    fn test_pad_border_replication() {
        // 3x3x3 -> 4x4x4: every voxel beyond the source bounds must equal
        // the nearest in-bounds voxel along the clamped axes.
        let dims = UVec3::new(3, 3, 3);
        let data: Vec<u8> = (0..27).collect();
        let (padded, size) = pad_to_pow2(&data, dims, 1, false).unwrap();
        assert_eq!(size, UVec3::new(4, 4, 4));

        for z in 0..4usize {
            for y in 0..4usize {
                for x in 0..4usize {
                    let sx = x.min(2);
                    let sy = y.min(2);
                    let sz = z.min(2);
                    let expected = data[sx + sy * 3 + sz * 9];
                    let actual = padded[x + y * 4 + z * 16];
                    assert_eq!(actual, expected, "mismatch at ({}, {}, {})", x, y, z);
                }
            }
        }
    }

    #[test]
    fn test_pad_disable_border_zero_fills() {
        let dims = UVec3::new(3, 3, 1);
        let data = vec![7u8; 9];
        let (padded, size) = pad_to_pow2(&data, dims, 1, true).unwrap();
        assert_eq!(size, UVec3::new(4, 4, 1));

        for y in 0..4usize {
            for x in 0..4usize {
                let expected = if x < 3 && y < 3 { 7 } else { 0 };
                assert_eq!(padded[x + y * 4], expected);
            }
        }
    }

    #[test]
    fn test_pad_multibyte_elements() {
        // two-byte elements must be replicated as whole elements
        let dims = UVec3::new(3, 1, 1);
        let data = vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        let (padded, size) = pad_to_pow2(&data, dims, 2, false).unwrap();
        assert_eq!(size, UVec3::new(4, 1, 1));
        assert_eq!(padded, vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0xEE, 0xFF]);
    }

    #[test]
    fn test_quantize_midpoint() {
        let mut data = 32768u16.to_ne_bytes().to_vec();
        let count = quantize_16_to_8(&mut data, 0.0, 65535.0);
        assert_eq!(count, 1);
        assert_eq!(data[0], 127);
    }

    #[test]
    fn test_quantize_range_ends() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u16.to_ne_bytes());
        data.extend_from_slice(&65535u16.to_ne_bytes());
        let count = quantize_16_to_8(&mut data, 0.0, 65535.0);
        assert_eq!(count, 2);
        assert_eq!(&data[..2], &[0, 255]);
    }

    #[test]
    fn test_quantize_narrow_range_clamps() {
        // values outside the advertised range saturate instead of wrapping
        let mut data = Vec::new();
        data.extend_from_slice(&100u16.to_ne_bytes());
        data.extend_from_slice(&5000u16.to_ne_bytes());
        quantize_16_to_8(&mut data, 1000.0, 2000.0);
        assert_eq!(&data[..2], &[0, 255]);
    }

    #[test]
    fn test_swap_endian_16() {
        let mut data = vec![0x12, 0x34, 0xAB, 0xCD];
        swap_endian_16(&mut data);
        assert_eq!(data, vec![0x34, 0x12, 0xCD, 0xAB]);
    }
}
