//! Uncompressed formats with components packed into a little endian integer per pixel.
use byteorder::{ByteOrder, LittleEndian};

use super::{check_data_size, TextureCodec};
use bfres_lib::formats::bntx::TextureDataType;
use bfres_lib::DecodeError;

const R: usize = 0;
const G: usize = 1;
const B: usize = 2;
const A: usize = 3;

/// A packed format described by its output channel and bit count for each component.
/// Components are listed starting from the least significant bit.
pub struct PackedFormat {
    name: &'static str,
    bytes_per_pixel: usize,
    components: &'static [(usize, u32)],
}

pub const R4_G4: PackedFormat = PackedFormat {
    name: "R4_G4",
    bytes_per_pixel: 1,
    components: &[(R, 4), (G, 4)],
};

pub const R8: PackedFormat = PackedFormat {
    name: "R8",
    bytes_per_pixel: 1,
    components: &[(R, 8)],
};

pub const R4_G4_B4_A4: PackedFormat = PackedFormat {
    name: "R4_G4_B4_A4",
    bytes_per_pixel: 2,
    components: &[(R, 4), (G, 4), (B, 4), (A, 4)],
};

pub const R5_G5_B5_A1: PackedFormat = PackedFormat {
    name: "R5_G5_B5_A1",
    bytes_per_pixel: 2,
    components: &[(R, 5), (G, 5), (B, 5), (A, 1)],
};

pub const R5_G6_B5: PackedFormat = PackedFormat {
    name: "R5_G6_B5",
    bytes_per_pixel: 2,
    components: &[(R, 5), (G, 6), (B, 5)],
};

pub const R8_G8: PackedFormat = PackedFormat {
    name: "R8_G8",
    bytes_per_pixel: 2,
    components: &[(R, 8), (G, 8)],
};

pub const R8_G8_B8_A8: PackedFormat = PackedFormat {
    name: "R8_G8_B8_A8",
    bytes_per_pixel: 4,
    components: &[(R, 8), (G, 8), (B, 8), (A, 8)],
};

pub const B8_G8_R8_A8: PackedFormat = PackedFormat {
    name: "B8_G8_R8_A8",
    bytes_per_pixel: 4,
    components: &[(B, 8), (G, 8), (R, 8), (A, 8)],
};

pub const R10_G10_B10_A2: PackedFormat = PackedFormat {
    name: "R10_G10_B10_A2",
    bytes_per_pixel: 4,
    components: &[(R, 10), (G, 10), (B, 10), (A, 2)],
};

/// Converts a component to a float.
/// Single bit components have no sign bit and are always unsigned.
fn normalize(value: u32, bits: u32, signed: bool) -> f32 {
    if signed && bits > 1 {
        let max = (1i32 << (bits - 1)) - 1;
        let value = if value & (1 << (bits - 1)) != 0 {
            value as i32 - (1 << bits)
        } else {
            value as i32
        };
        (value as f32 / max as f32).max(-1.0)
    } else {
        value as f32 / ((1u64 << bits) - 1) as f32
    }
}

impl TextureCodec for PackedFormat {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decompress(
        &self,
        width: u32,
        height: u32,
        data: &[u8],
        data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError> {
        let size = check_data_size(width, height, 1, 1, self.bytes_per_pixel, data)?;
        let signed = matches!(data_type, TextureDataType::Snorm | TextureDataType::SInt);

        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for pixel in data[..size].chunks_exact(self.bytes_per_pixel) {
            let packed = LittleEndian::read_uint(pixel, self.bytes_per_pixel);

            // Missing color channels are 0 and missing alpha is 1.
            let mut color = [0.0, 0.0, 0.0, 1.0];
            let mut shift = 0;
            for (channel, bits) in self.components {
                let value = (packed >> shift) as u32 & ((1u64 << bits) - 1) as u32;
                color[*channel] = normalize(value, *bits, signed);
                shift += bits;
            }
            rgba.extend_from_slice(&color);
        }

        Ok(rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_bytes;
    use approx::assert_relative_eq;

    #[test]
    fn bytes_per_pixel_matches_components() {
        for format in &[
            R4_G4,
            R8,
            R4_G4_B4_A4,
            R5_G5_B5_A1,
            R5_G6_B5,
            R8_G8,
            R8_G8_B8_A8,
            B8_G8_R8_A8,
            R10_G10_B10_A2,
        ] {
            let bits: u32 = format.components.iter().map(|(_, b)| b).sum();
            assert_eq!(format.bytes_per_pixel as u32 * 8, bits, "{}", format.name);
        }
    }

    #[test]
    fn r8_g8_b8_a8_unorm() {
        let data = hex_bytes("FF008000");
        let rgba = R8_G8_B8_A8
            .decompress(1, 1, &data, TextureDataType::Unorm)
            .unwrap();
        assert_eq!(1.0, rgba[0]);
        assert_eq!(0.0, rgba[1]);
        assert_relative_eq!(128.0 / 255.0, rgba[2]);
        assert_eq!(0.0, rgba[3]);
    }

    #[test]
    fn b8_g8_r8_a8_swaps_red_blue() {
        let data = hex_bytes("FF0000FF 00FF00FF");
        let rgba = B8_G8_R8_A8
            .decompress(2, 1, &data, TextureDataType::Srgb)
            .unwrap();
        assert_eq!(vec![0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0], rgba);
    }

    #[test]
    fn r5_g6_b5_default_alpha() {
        // Green is the middle 6 bits.
        let data = hex_bytes("E007");
        let rgba = R5_G6_B5
            .decompress(1, 1, &data, TextureDataType::Unorm)
            .unwrap();
        assert_eq!(vec![0.0, 1.0, 0.0, 1.0], rgba);
    }

    #[test]
    fn r5_g5_b5_a1_snorm_alpha() {
        assert_eq!(0.0, normalize(0, 1, true));
        assert_eq!(1.0, normalize(1, 1, true));

        let data = hex_bytes("0080 0000");
        let rgba = R5_G5_B5_A1
            .decompress(2, 1, &data, TextureDataType::Snorm)
            .unwrap();
        assert_eq!(1.0, rgba[3]);
        assert_eq!(0.0, rgba[7]);
    }

    #[test]
    fn r8_snorm() {
        let data = hex_bytes("7F 81 80 00");
        let rgba = R8.decompress(4, 1, &data, TextureDataType::Snorm).unwrap();
        assert_eq!(1.0, rgba[0]);
        assert_eq!(-1.0, rgba[4]);
        // -128 is clamped.
        assert_eq!(-1.0, rgba[8]);
        assert_eq!(0.0, rgba[12]);
        assert_eq!(&[0.0, 0.0, 1.0], &rgba[13..16]);
    }

    #[test]
    fn r10_g10_b10_a2_unorm() {
        // Red is 1023, green is 0, blue is 512, and alpha is 3.
        let data = hex_bytes("FF0300E0");
        let rgba = R10_G10_B10_A2
            .decompress(1, 1, &data, TextureDataType::Unorm)
            .unwrap();
        assert_eq!(1.0, rgba[0]);
        assert_eq!(0.0, rgba[1]);
        assert_relative_eq!(512.0 / 1023.0, rgba[2]);
        assert_eq!(1.0, rgba[3]);
    }

    #[test]
    fn r4_g4_incomplete() {
        let result = R4_G4.decompress(4, 4, &[0u8; 15], TextureDataType::Unorm);
        assert!(matches!(
            result,
            Err(DecodeError::IncompleteData {
                expected: 16,
                actual: 15
            })
        ));
    }
}
