//! Conversion from the Tegra X1 block linear and pitch linear surface layouts to row major order.
//!
//! Addresses are computed in units of format blocks, so a 4x4 compressed block or a single
//! uncompressed pixel each occupy `bytes_per_pixel` bytes.
//! Block linear surfaces are split into GOBs of 512 bytes covering 64 bytes by 8 rows.
//! GOBs are stacked vertically in groups of `block_height` GOBs.

/// The memory layout of a texture surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileMode {
    BlockLinear,
    PitchLinear,
}

impl From<u16> for TileMode {
    fn from(value: u16) -> Self {
        match value {
            1 => TileMode::PitchLinear,
            _ => TileMode::BlockLinear,
        }
    }
}

/// The dimensions and layout of a surface to deswizzle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    pub block_width: u32,
    pub block_height: u32,
    pub bytes_per_pixel: u32,
    pub tile_mode: TileMode,
    /// The log2 of the number of GOBs stacked vertically in each block.
    pub block_height_log2: u32,
}

impl SurfaceInfo {
    /// The size in bytes of the row major output.
    pub fn deswizzled_size(&self) -> usize {
        self.width_in_blocks() as usize
            * self.height_in_blocks() as usize
            * self.bytes_per_pixel as usize
    }

    fn width_in_blocks(&self) -> u32 {
        div_round_up(self.width, self.block_width)
    }

    fn height_in_blocks(&self) -> u32 {
        div_round_up(self.height, self.block_height)
    }
}

pub fn div_round_up(n: u32, d: u32) -> u32 {
    (n + d - 1) / d
}

/// Rounds `x` up to a multiple of the power of two `y`.
pub fn round_up(x: u32, y: u32) -> u32 {
    ((x.wrapping_sub(1)) | (y - 1)).wrapping_add(1)
}

pub fn pow2_round_up(x: u32) -> u32 {
    if x <= 1 {
        1
    } else {
        x.next_power_of_two()
    }
}

/// The block height log2 to use for the base level of a surface with `height` pixels.
///
/// Surfaces shorter than the nominal block use a block one GOB level smaller.
pub fn adjusted_block_height_log2(height: u32, block_height: u32, block_height_log2: u32) -> u32 {
    let lines_per_block_height = (1u32 << block_height_log2) * 8;
    if pow2_round_up(div_round_up(height, block_height)) < lines_per_block_height {
        block_height_log2.saturating_sub(1)
    } else {
        block_height_log2
    }
}

/// Converts the tiled `data` of a surface to row major order.
///
/// The result contains `bytes_per_pixel` bytes for each block in raster order.
/// Blocks whose source would fall outside the surface or `data` are left as zeros.
pub fn deswizzle(surface: &SurfaceInfo, data: &[u8]) -> Vec<u8> {
    let bpp = surface.bytes_per_pixel as usize;
    let width = surface.width_in_blocks() as usize;
    let height = surface.height_in_blocks() as usize;
    let block_height = 1usize << surface.block_height_log2;

    let (pitch, surface_size) = match surface.tile_mode {
        TileMode::PitchLinear => {
            let pitch = round_up((width * bpp) as u32, 32) as usize;
            (pitch, pitch * height)
        }
        TileMode::BlockLinear => {
            let pitch = round_up((width * bpp) as u32, 64) as usize;
            let rows = round_up(height as u32, (block_height * 8) as u32) as usize;
            (pitch, pitch * rows)
        }
    };
    let available = surface_size.min(data.len());

    let mut result = vec![0u8; width * height * bpp];
    for y in 0..height {
        for x in 0..width {
            let pos = match surface.tile_mode {
                TileMode::PitchLinear => y * pitch + x * bpp,
                TileMode::BlockLinear => block_linear_address(x, y, width, bpp, block_height),
            };
            let pos_out = (y * width + x) * bpp;

            if pos + bpp <= available {
                result[pos_out..pos_out + bpp].copy_from_slice(&data[pos..pos + bpp]);
            }
        }
    }

    result
}

/// The byte address of block `(x, y)` in a block linear surface `width` blocks wide.
pub fn block_linear_address(
    x: usize,
    y: usize,
    width: usize,
    bytes_per_pixel: usize,
    block_height: usize,
) -> usize {
    let width_in_gobs = (width * bytes_per_pixel + 63) / 64;

    let gob_address = (y / (8 * block_height)) * 512 * block_height * width_in_gobs
        + (x * bytes_per_pixel / 64) * 512 * block_height
        + (y % (8 * block_height) / 8) * 512;

    let x = x * bytes_per_pixel;

    gob_address
        + ((x % 64) / 32) * 256
        + ((y % 8) / 2) * 64
        + ((x % 32) / 16) * 32
        + (y % 2) * 16
        + (x % 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sentinel_surface(surface_size: usize) -> Vec<u8> {
        // Each 4 byte group stores its own index so every block is unique.
        (0..surface_size / 4)
            .flat_map(|i| (i as u32).to_le_bytes())
            .collect()
    }

    fn assert_bijection(surface: &SurfaceInfo, surface_size: usize) {
        let data = sentinel_surface(surface_size);
        let result = deswizzle(surface, &data);
        assert_eq!(surface.deswizzled_size(), result.len());

        let blocks: Vec<&[u8]> = result
            .chunks_exact(surface.bytes_per_pixel as usize)
            .collect();
        let unique: HashSet<&[u8]> = blocks.iter().copied().collect();
        assert_eq!(blocks.len(), unique.len());
    }

    #[test]
    fn round_up_values() {
        assert_eq!(32, round_up(1, 32));
        assert_eq!(32, round_up(32, 32));
        assert_eq!(64, round_up(33, 32));
        assert_eq!(0, round_up(0, 32));
    }

    #[test]
    fn pow2_round_up_values() {
        assert_eq!(1, pow2_round_up(0));
        assert_eq!(1, pow2_round_up(1));
        assert_eq!(4, pow2_round_up(3));
        assert_eq!(16, pow2_round_up(16));
        assert_eq!(32, pow2_round_up(17));
    }

    #[test]
    fn div_round_up_values() {
        assert_eq!(2, div_round_up(5, 4));
        assert_eq!(1, div_round_up(4, 4));
        assert_eq!(0, div_round_up(0, 4));
    }

    #[test]
    fn block_height_adjustment() {
        // 64 / 4 = 16 block rows is less than the 32 rows of a 4 GOB block.
        assert_eq!(1, adjusted_block_height_log2(64, 4, 2));
        // 128 / 4 = 32 block rows fills the block.
        assert_eq!(2, adjusted_block_height_log2(128, 4, 2));
        assert_eq!(0, adjusted_block_height_log2(1, 1, 0));
    }

    #[test]
    fn gob_address_pattern() {
        // The first GOB of a 64 byte wide surface with 4 byte pixels.
        assert_eq!(0, block_linear_address(0, 0, 16, 4, 1));
        assert_eq!(16, block_linear_address(0, 1, 16, 4, 1));
        assert_eq!(64, block_linear_address(0, 2, 16, 4, 1));
        assert_eq!(4, block_linear_address(1, 0, 16, 4, 1));
        assert_eq!(32, block_linear_address(4, 0, 16, 4, 1));
        assert_eq!(256, block_linear_address(8, 0, 16, 4, 1));
        assert_eq!(511, block_linear_address(15, 7, 16, 4, 1) + 3);
        // The next GOB down.
        assert_eq!(512, block_linear_address(0, 8, 16, 4, 1));
    }

    #[test]
    fn gob_address_second_column() {
        // Two GOBs wide with two GOBs stacked per block.
        assert_eq!(1024, block_linear_address(16, 0, 32, 4, 2));
        assert_eq!(512, block_linear_address(0, 8, 32, 4, 2));
        assert_eq!(2048, block_linear_address(0, 16, 32, 4, 2));
    }

    #[test]
    fn deswizzle_pitch_linear() {
        // 2x2 pixels with 4 bytes each and rows padded to 32 bytes.
        let surface = SurfaceInfo {
            width: 2,
            height: 2,
            block_width: 1,
            block_height: 1,
            bytes_per_pixel: 4,
            tile_mode: TileMode::PitchLinear,
            block_height_log2: 0,
        };
        let mut data = vec![0u8; 64];
        data[0..8].copy_from_slice(&[1, 1, 1, 1, 2, 2, 2, 2]);
        data[32..40].copy_from_slice(&[3, 3, 3, 3, 4, 4, 4, 4]);

        assert_eq!(
            vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4],
            deswizzle(&surface, &data)
        );
    }

    #[test]
    fn deswizzle_block_linear_bijection() {
        // 64x64 BC1 has 16x16 blocks of 8 bytes.
        let surface = SurfaceInfo {
            width: 64,
            height: 64,
            block_width: 4,
            block_height: 4,
            bytes_per_pixel: 8,
            tile_mode: TileMode::BlockLinear,
            block_height_log2: 1,
        };
        assert_bijection(&surface, 128 * 16);
    }

    #[test]
    fn deswizzle_block_linear_rgba_bijection() {
        let surface = SurfaceInfo {
            width: 32,
            height: 32,
            block_width: 1,
            block_height: 1,
            bytes_per_pixel: 4,
            tile_mode: TileMode::BlockLinear,
            block_height_log2: 2,
        };
        assert_bijection(&surface, 128 * 32);
    }

    #[test]
    fn deswizzle_pitch_linear_bijection() {
        let surface = SurfaceInfo {
            width: 12,
            height: 12,
            block_width: 4,
            block_height: 4,
            bytes_per_pixel: 16,
            tile_mode: TileMode::PitchLinear,
            block_height_log2: 0,
        };
        assert_bijection(&surface, 64 * 3);
    }

    #[test]
    fn deswizzle_short_data() {
        // Missing source data leaves zeros instead of reading out of bounds.
        let surface = SurfaceInfo {
            width: 16,
            height: 16,
            block_width: 4,
            block_height: 4,
            bytes_per_pixel: 16,
            tile_mode: TileMode::BlockLinear,
            block_height_log2: 0,
        };
        let data = vec![0xFFu8; 16];
        let result = deswizzle(&surface, &data);
        assert_eq!(256, result.len());
        assert_eq!(vec![0xFFu8; 16], result[..16].to_vec());
        assert!(result[16..].iter().all(|b| *b == 0));
    }
}
