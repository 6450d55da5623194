//! BC4 and BC5 decoding.
//! The single channel blocks use the same 8 entry palette as BC3 alpha.
use byteorder::{ByteOrder, LittleEndian};

use super::{decode_blocks, Block, TextureCodec};
use bfres_lib::formats::bntx::TextureDataType;
use bfres_lib::DecodeError;

pub struct Bc4;
pub struct Bc5;

/// The palette for unsigned endpoints.
/// Equal or decreasing endpoints use 6 interpolated values followed by 0 and 255.
pub(crate) fn unorm_palette(a0: u8, a1: u8) -> [u32; 8] {
    let (a0, a1) = (a0 as u32, a1 as u32);
    let mut palette = [a0, a1, 0, 0, 0, 0, 0, 0];
    if a0 > a1 {
        for i in 2..8 {
            palette[i] = (a0 * (8 - i as u32) + a1 * (i as u32 - 1)) / 7;
        }
    } else {
        for i in 2..6 {
            palette[i] = (a0 * (6 - i as u32) + a1 * (i as u32 - 1)) / 5;
        }
        palette[6] = 0;
        palette[7] = 255;
    }
    palette
}

/// The palette for endpoints in the -128 to 127 range.
pub(crate) fn snorm_palette(a0: u8, a1: u8) -> [i32; 8] {
    let (a0, a1) = (a0 as i8 as i32, a1 as i8 as i32);
    let mut palette = [a0, a1, 0, 0, 0, 0, 0, 0];
    if a0 > a1 {
        for i in 2..8 {
            palette[i] = (a0 * (8 - i as i32) + a1 * (i as i32 - 1)).div_euclid(7);
        }
    } else {
        for i in 2..6 {
            palette[i] = (a0 * (6 - i as i32) + a1 * (i as i32 - 1)).div_euclid(5);
        }
        palette[6] = -128;
        palette[7] = 127;
    }
    palette
}

/// The 3 bit palette index for each texel stored after the two endpoints of an 8 byte block.
pub(crate) fn alpha_indices(data: &[u8]) -> [usize; 16] {
    let bits = LittleEndian::read_u48(&data[2..8]);
    let mut indices = [0; 16];
    for (i, index) in indices.iter_mut().enumerate() {
        *index = ((bits >> (3 * i)) & 7) as usize;
    }
    indices
}

/// Decodes a single channel block to values in the range 0.0 to 1.0.
fn channel(data: &[u8], signed: bool) -> [f32; 16] {
    let indices = alpha_indices(data);

    let mut values = [0.0; 16];
    if signed {
        let palette = snorm_palette(data[0], data[1]);
        for (value, index) in values.iter_mut().zip(indices.iter()) {
            *value = (palette[*index] + 128) as f32 / 255.0;
        }
    } else {
        let palette = unorm_palette(data[0], data[1]);
        for (value, index) in values.iter_mut().zip(indices.iter()) {
            *value = palette[*index] as f32 / 255.0;
        }
    }
    values
}

fn bc4_block(data: &[u8], signed: bool) -> Result<Block, DecodeError> {
    let red = channel(&data[0..8], signed);

    let mut block = [[0.0; 4]; 16];
    for (texel, r) in block.iter_mut().zip(red.iter()) {
        *texel = [*r, *r, *r, 1.0];
    }
    Ok(block)
}

fn bc5_block(data: &[u8], signed: bool) -> Result<Block, DecodeError> {
    let red = channel(&data[0..8], signed);
    let green = channel(&data[8..16], signed);

    let mut block = [[0.0; 4]; 16];
    for (i, texel) in block.iter_mut().enumerate() {
        *texel = [red[i], green[i], 0.0, 1.0];
    }
    Ok(block)
}

/// Every data type except UNORM uses signed endpoints.
fn is_signed(data_type: TextureDataType) -> bool {
    data_type != TextureDataType::Unorm
}

impl TextureCodec for Bc4 {
    fn name(&self) -> &'static str {
        "BC4"
    }

    fn decompress(
        &self,
        width: u32,
        height: u32,
        data: &[u8],
        data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError> {
        let signed = is_signed(data_type);
        decode_blocks(width, height, 8, data, |b| bc4_block(b, signed))
    }
}

impl TextureCodec for Bc5 {
    fn name(&self) -> &'static str {
        "BC5"
    }

    fn decompress(
        &self,
        width: u32,
        height: u32,
        data: &[u8],
        data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError> {
        let signed = is_signed(data_type);
        decode_blocks(width, height, 16, data, |b| bc5_block(b, signed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_bytes;
    use approx::assert_relative_eq;

    #[test]
    fn unorm_palette_8_values() {
        assert_eq!([255, 0, 218, 182, 145, 109, 72, 36], unorm_palette(255, 0));
    }

    #[test]
    fn unorm_palette_6_values() {
        assert_eq!([0, 255, 51, 102, 153, 204, 0, 255], unorm_palette(0, 255));
        assert_eq!([7, 7, 7, 7, 7, 7, 0, 255], unorm_palette(7, 7));
    }

    #[test]
    fn snorm_palette_8_values() {
        // 127 > -127 compares as signed values.
        assert_eq!(
            [127, -127, 90, 54, 18, -19, -55, -91],
            snorm_palette(0x7F, 0x81)
        );
    }

    #[test]
    fn snorm_palette_6_values() {
        // 0xFF is -1 so the endpoints are not decreasing.
        assert_eq!([-1, 0, -1, -1, -1, -1, -128, 127], snorm_palette(0xFF, 0x00));
    }

    #[test]
    fn indices_across_bytes() {
        // Texel 2 has bits 6..9 spanning the first two index bytes.
        let data = hex_bytes("00 00 C0 01 00 00 00 00");
        let indices = alpha_indices(&data);
        assert_eq!(7, indices[2]);
        assert_eq!(0, indices[1]);
        assert_eq!(0, indices[3]);
    }

    #[test]
    fn bc4_unorm() {
        let data = hex_bytes("FF00 000000000000");
        let rgba = Bc4
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        for texel in rgba.chunks_exact(4) {
            assert_eq!(&[1.0, 1.0, 1.0, 1.0], texel);
        }
    }

    #[test]
    fn bc4_snorm() {
        // Index 7 in the 6 value mode is the signed maximum of 127.
        let data = hex_bytes("0000 FFFFFFFFFFFF");
        let rgba = Bc4
            .decompress(4, 4, &data, TextureDataType::Snorm)
            .unwrap();
        for texel in rgba.chunks_exact(4) {
            assert_eq!(&[1.0, 1.0, 1.0, 1.0], texel);
        }

        // Index 0 with an endpoint of 0 is the midpoint of the range.
        let rgba = Bc4
            .decompress(4, 4, &[0u8; 8], TextureDataType::Snorm)
            .unwrap();
        assert_relative_eq!(128.0 / 255.0, rgba[0]);
    }

    #[test]
    fn bc4_signed_data_types() {
        // Only UNORM uses unsigned endpoints.
        let data = [0u8; 8];
        for data_type in [
            TextureDataType::Snorm,
            TextureDataType::SInt,
            TextureDataType::Srgb,
        ] {
            let rgba = Bc4.decompress(4, 4, &data, data_type).unwrap();
            assert_relative_eq!(128.0 / 255.0, rgba[0]);
        }

        let rgba = Bc4
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        assert_eq!(0.0, rgba[0]);
    }

    #[test]
    fn bc5_unorm() {
        let data = hex_bytes("FF00 000000000000 00FF 000000000000");
        let rgba = Bc5
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        for texel in rgba.chunks_exact(4) {
            assert_eq!(&[1.0, 0.0, 0.0, 1.0], texel);
        }
    }

    #[test]
    fn bc5_incomplete() {
        let result = Bc5.decompress(4, 4, &[0u8; 8], TextureDataType::Unorm);
        assert!(matches!(
            result,
            Err(DecodeError::IncompleteData {
                expected: 16,
                actual: 8
            })
        ));
    }
}
