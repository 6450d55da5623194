//! Decoders for block compressed and packed uncompressed texture formats.
//!
//! Every codec produces tightly packed RGBA `f32` values in row major order
//! with `width * height * 4` elements.
use bfres_lib::formats::bntx::TextureDataType;
use bfres_lib::swizzle::div_round_up;
use bfres_lib::DecodeError;

pub mod bc1;
pub mod bc4;
pub mod bc6h;
pub mod bc7;
pub mod rgb;
pub mod tables;

use tables::{PARTITIONS_2, PARTITIONS_3, WEIGHTS_2, WEIGHTS_3, WEIGHTS_4};

/// A decoder for a single texture format id.
pub trait TextureCodec: Send + Sync {
    /// The display name of the format such as `"BC7"`.
    fn name(&self) -> &'static str;

    /// Decodes the base mip level to RGBA values.
    /// The `data_type` selects between unsigned, signed, and sRGB variants of the format.
    fn decompress(
        &self,
        width: u32,
        height: u32,
        data: &[u8],
        data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError>;
}

/// The decoded RGBA values of a 4x4 block in row major order.
pub type Block = [[f32; 4]; 16];

/// Checks that `data` has enough bytes for every `block_width` x `block_height` block of the image.
pub(crate) fn check_data_size(
    width: u32,
    height: u32,
    block_width: u32,
    block_height: u32,
    block_size: usize,
    data: &[u8],
) -> Result<usize, DecodeError> {
    let expected = div_round_up(width, block_width) as usize
        * div_round_up(height, block_height) as usize
        * block_size;
    if data.len() < expected {
        Err(DecodeError::IncompleteData {
            expected,
            actual: data.len(),
        })
    } else {
        Ok(expected)
    }
}

/// Decodes each `block_size` byte 4x4 block with `decode_block`.
/// Texels outside the image for blocks on the right or bottom edge are discarded.
pub(crate) fn decode_blocks<F>(
    width: u32,
    height: u32,
    block_size: usize,
    data: &[u8],
    decode_block: F,
) -> Result<Vec<f32>, DecodeError>
where
    F: Fn(&[u8]) -> Result<Block, DecodeError>,
{
    let expected = check_data_size(width, height, 4, 4, block_size, data)?;

    let width = width as usize;
    let height = height as usize;
    let blocks_x = div_round_up(width as u32, 4) as usize;

    let mut rgba = vec![0.0f32; width * height * 4];
    for (i, block_data) in data[..expected].chunks_exact(block_size).enumerate() {
        let block = decode_block(block_data)?;

        let x0 = (i % blocks_x) * 4;
        let y0 = (i / blocks_x) * 4;
        for (texel, color) in block.iter().enumerate() {
            let x = x0 + texel % 4;
            let y = y0 + texel / 4;
            if x < width && y < height {
                let start = (y * width + x) * 4;
                rgba[start..start + 4].copy_from_slice(color);
            }
        }
    }

    Ok(rgba)
}

/// The subset for texel `index` using the 2 or 3 subset partition tables.
pub(crate) fn subset_index(subset_count: usize, partition: usize, index: usize) -> usize {
    match subset_count {
        2 => ((PARTITIONS_2[partition] >> index) & 1) as usize,
        3 => ((PARTITIONS_3[partition] >> (2 * index)) & 3) as usize,
        _ => 0,
    }
}

/// The interpolation weights out of 64 for indices with `bits` bits.
pub(crate) fn weights(bits: usize) -> &'static [u32] {
    match bits {
        2 => &WEIGHTS_2,
        3 => &WEIGHTS_3,
        _ => &WEIGHTS_4,
    }
}
