//! BC1, BC2, and BC3 decoding.
//! All three formats share the same 8 byte color block with two RGB565 endpoints.
use byteorder::{ByteOrder, LittleEndian};

use super::bc4::{alpha_indices, unorm_palette};
use super::{decode_blocks, Block, TextureCodec};
use bfres_lib::formats::bntx::TextureDataType;
use bfres_lib::DecodeError;

pub struct Bc1;
pub struct Bc2;
pub struct Bc3;

fn rgb565(color: u16) -> [u32; 3] {
    let r = ((color as u32 >> 11) & 0x1f) << 3;
    let g = ((color as u32 >> 5) & 0x3f) << 2;
    let b = (color as u32 & 0x1f) << 3;
    [r | r >> 5, g | g >> 5, b | b >> 5]
}

/// The four RGBA8 palette entries of a color block.
/// Only BC1 uses the 3 color mode with a transparent black entry when `c0 <= c1`.
fn color_palette(data: &[u8], is_bc1: bool) -> [[u32; 4]; 4] {
    let c0 = LittleEndian::read_u16(&data[0..2]);
    let c1 = LittleEndian::read_u16(&data[2..4]);
    let [r0, g0, b0] = rgb565(c0);
    let [r1, g1, b1] = rgb565(c1);

    let (color2, color3) = if c0 > c1 || !is_bc1 {
        (
            [(2 * r0 + r1) / 3, (2 * g0 + g1) / 3, (2 * b0 + b1) / 3, 255],
            [(r0 + 2 * r1) / 3, (g0 + 2 * g1) / 3, (b0 + 2 * b1) / 3, 255],
        )
    } else {
        (
            [(r0 + r1) / 2, (g0 + g1) / 2, (b0 + b1) / 2, 255],
            [0, 0, 0, 0],
        )
    };

    [[r0, g0, b0, 255], [r1, g1, b1, 255], color2, color3]
}

/// Decodes the color block in `data` as RGBA8 palette entries for each texel.
fn color_block(data: &[u8], is_bc1: bool) -> [[u32; 4]; 16] {
    let palette = color_palette(data, is_bc1);
    let indices = LittleEndian::read_u32(&data[4..8]);

    let mut texels = [[0u32; 4]; 16];
    for (i, texel) in texels.iter_mut().enumerate() {
        *texel = palette[((indices >> (2 * i)) & 3) as usize];
    }
    texels
}

fn to_float(texel: [u32; 4]) -> [f32; 4] {
    [
        texel[0] as f32 / 255.0,
        texel[1] as f32 / 255.0,
        texel[2] as f32 / 255.0,
        texel[3] as f32 / 255.0,
    ]
}

fn bc1_block(data: &[u8]) -> Result<Block, DecodeError> {
    let mut block = [[0.0; 4]; 16];
    for (out, texel) in block.iter_mut().zip(color_block(data, true).iter()) {
        *out = to_float(*texel);
    }
    Ok(block)
}

fn bc2_block(data: &[u8]) -> Result<Block, DecodeError> {
    let mut block = [[0.0; 4]; 16];
    for (i, (out, texel)) in block
        .iter_mut()
        .zip(color_block(&data[8..16], false).iter())
        .enumerate()
    {
        // Explicit 4 bit alpha with two texels per byte.
        let alpha = (data[i / 2] >> (4 * (i & 1))) as u32 & 0xf;
        *out = to_float([texel[0], texel[1], texel[2], alpha | alpha << 4]);
    }
    Ok(block)
}

fn bc3_block(data: &[u8]) -> Result<Block, DecodeError> {
    let alpha = unorm_palette(data[0], data[1]);
    let alpha_indices = alpha_indices(&data[0..8]);

    let mut block = [[0.0; 4]; 16];
    for (i, (out, texel)) in block
        .iter_mut()
        .zip(color_block(&data[8..16], false).iter())
        .enumerate()
    {
        *out = to_float([texel[0], texel[1], texel[2], alpha[alpha_indices[i]]]);
    }
    Ok(block)
}

impl TextureCodec for Bc1 {
    fn name(&self) -> &'static str {
        "BC1"
    }

    fn decompress(
        &self,
        width: u32,
        height: u32,
        data: &[u8],
        _data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError> {
        decode_blocks(width, height, 8, data, bc1_block)
    }
}

impl TextureCodec for Bc2 {
    fn name(&self) -> &'static str {
        "BC2"
    }

    fn decompress(
        &self,
        width: u32,
        height: u32,
        data: &[u8],
        _data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError> {
        decode_blocks(width, height, 16, data, bc2_block)
    }
}

impl TextureCodec for Bc3 {
    fn name(&self) -> &'static str {
        "BC3"
    }

    fn decompress(
        &self,
        width: u32,
        height: u32,
        data: &[u8],
        _data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError> {
        decode_blocks(width, height, 16, data, bc3_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_bytes;
    use approx::assert_relative_eq;

    #[test]
    fn expand_rgb565() {
        assert_eq!([255, 255, 255], rgb565(0xFFFF));
        assert_eq!([0, 0, 0], rgb565(0));
        assert_eq!([255, 0, 0], rgb565(0xF800));
        assert_eq!([0, 255, 0], rgb565(0x07E0));
        assert_eq!([0, 0, 255], rgb565(0x001F));
    }

    #[test]
    fn bc1_equal_endpoints_transparent() {
        // c0 == c1 selects the 3 color mode, so index 3 is transparent black.
        let data = hex_bytes("0000 0000 FFFFFFFF");
        let rgba = Bc1
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        assert_eq!(vec![0.0; 64], rgba);
    }

    #[test]
    fn bc1_all_zeros_opaque_black() {
        // Index 0 is always c0 with full alpha.
        let rgba = Bc1
            .decompress(4, 4, &[0u8; 8], TextureDataType::Unorm)
            .unwrap();
        for texel in rgba.chunks_exact(4) {
            assert_eq!(&[0.0, 0.0, 0.0, 1.0], texel);
        }
    }

    #[test]
    fn bc1_four_color_mode() {
        // c0 > c1 keeps index 3 opaque as 2/3 of the way from c0 to c1.
        let data = hex_bytes("FFFF 0000 FFFFFFFF");
        let rgba = Bc1
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        for texel in rgba.chunks_exact(4) {
            assert_relative_eq!(85.0 / 255.0, texel[0]);
            assert_relative_eq!(85.0 / 255.0, texel[1]);
            assert_relative_eq!(85.0 / 255.0, texel[2]);
            assert_eq!(1.0, texel[3]);
        }
    }

    #[test]
    fn bc1_three_color_mode_midpoint() {
        // c0 < c1 so index 2 is the average of both endpoints.
        let data = hex_bytes("0000 FFFF AAAAAAAA");
        let rgba = Bc1
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        assert_relative_eq!(127.0 / 255.0, rgba[0]);
        assert_eq!(1.0, rgba[3]);
    }

    #[test]
    fn bc1_index_order() {
        // Texel 0 uses c1 and the remaining texels use c0.
        let data = hex_bytes("00F8 1F00 01000000");
        let rgba = Bc1
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        assert_eq!(&[0.0, 0.0, 1.0, 1.0], &rgba[0..4]);
        assert_eq!(&[1.0, 0.0, 0.0, 1.0], &rgba[4..8]);
    }

    #[test]
    fn bc2_explicit_alpha() {
        let data = hex_bytes("F0 00 00 00 00 00 00 0F 0000 0000 00000000");
        let rgba = Bc2
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        // The low nibble is the first texel of each pair.
        assert_eq!(0.0, rgba[3]);
        assert_eq!(1.0, rgba[4 + 3]);
        assert_eq!(0.0, rgba[2 * 4 + 3]);
        assert_eq!(1.0, rgba[14 * 4 + 3]);
        assert_eq!(0.0, rgba[15 * 4 + 3]);
    }

    #[test]
    fn bc2_never_transparent_black() {
        // BC2 always uses the 4 color mode even when c0 <= c1.
        let data = hex_bytes("FFFFFFFFFFFFFFFF 0000 0000 FFFFFFFF");
        let rgba = Bc2
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        for texel in rgba.chunks_exact(4) {
            assert_eq!(&[0.0, 0.0, 0.0, 1.0], texel);
        }
    }

    #[test]
    fn bc3_alpha_endpoints() {
        // Alpha index 1 for the first texel and index 0 for the rest.
        let data = hex_bytes("FF 00 010000000000 FFFF 0000 00000000");
        let rgba = Bc3
            .decompress(4, 4, &data, TextureDataType::Unorm)
            .unwrap();
        assert_eq!(&[1.0, 1.0, 1.0, 0.0], &rgba[0..4]);
        assert_eq!(&[1.0, 1.0, 1.0, 1.0], &rgba[4..8]);
    }

    #[test]
    fn bc3_incomplete() {
        let result = Bc3.decompress(8, 4, &[0u8; 16], TextureDataType::Unorm);
        assert!(matches!(
            result,
            Err(DecodeError::IncompleteData {
                expected: 32,
                actual: 16
            })
        ));
    }
}
