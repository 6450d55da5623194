//! BC7 decoding.
use super::tables::{ANCHORS_2, ANCHORS_3_SECOND, ANCHORS_3_THIRD};
use super::{decode_blocks, subset_index, weights, Block, TextureCodec};
use crate::bitutils::BitReader;
use bfres_lib::formats::bntx::TextureDataType;
use bfres_lib::DecodeError;

pub struct Bc7;

struct Mode {
    subsets: usize,
    partition_bits: usize,
    rotation_bits: usize,
    index_selection_bits: usize,
    color_bits: usize,
    alpha_bits: usize,
    endpoint_pbits: bool,
    shared_pbits: bool,
    index_bits: usize,
    /// The bits for the separate alpha indices or 0 if alpha uses the color indices.
    index_bits2: usize,
}

#[allow(clippy::too_many_arguments)]
const fn mode(
    subsets: usize,
    partition_bits: usize,
    rotation_bits: usize,
    index_selection_bits: usize,
    color_bits: usize,
    alpha_bits: usize,
    endpoint_pbits: bool,
    shared_pbits: bool,
    index_bits: usize,
    index_bits2: usize,
) -> Mode {
    Mode {
        subsets,
        partition_bits,
        rotation_bits,
        index_selection_bits,
        color_bits,
        alpha_bits,
        endpoint_pbits,
        shared_pbits,
        index_bits,
        index_bits2,
    }
}

const MODES: [Mode; 8] = [
    mode(3, 4, 0, 0, 4, 0, true, false, 3, 0),
    mode(2, 6, 0, 0, 6, 0, false, true, 3, 0),
    mode(3, 6, 0, 0, 5, 0, false, false, 2, 0),
    mode(2, 6, 0, 0, 7, 0, true, false, 2, 0),
    mode(1, 0, 2, 1, 5, 6, false, false, 2, 3),
    mode(1, 0, 2, 0, 7, 8, false, false, 2, 2),
    mode(1, 0, 0, 0, 7, 7, true, false, 4, 0),
    mode(2, 6, 0, 0, 5, 5, true, false, 2, 0),
];

/// The mode is the number of 0 bits before the first 1 bit.
fn read_mode(reader: &mut BitReader) -> Result<usize, DecodeError> {
    let mut mode = 0;
    while !reader.read_bit()? {
        mode += 1;
        if mode >= MODES.len() {
            return Err(DecodeError::UnsupportedFormat {
                kind: "BC7 mode",
                value: mode as u32,
            });
        }
    }
    Ok(mode)
}

/// Expands a value with `bits` bits to 8 bits by replicating the high bits.
fn unquantize(value: u32, bits: usize) -> u32 {
    let value = value << (8 - bits);
    value | value >> bits
}

fn interpolate(e0: u32, e1: u32, weight: u32) -> u32 {
    ((64 - weight) * e0 + weight * e1 + 32) >> 6
}

fn is_anchor(subsets: usize, partition: usize, i: usize) -> bool {
    match subsets {
        2 => i == 0 || i == ANCHORS_2[partition] as usize,
        3 => {
            i == 0
                || i == ANCHORS_3_SECOND[partition] as usize
                || i == ANCHORS_3_THIRD[partition] as usize
        }
        _ => i == 0,
    }
}

fn bc7_block(data: &[u8]) -> Result<Block, DecodeError> {
    let mut reader = BitReader::from_slice(data);

    let mode = &MODES[read_mode(&mut reader)?];
    let partition = reader.read(mode.partition_bits)? as usize;
    let rotation = reader.read(mode.rotation_bits)?;
    let index_selection = reader.read(mode.index_selection_bits)? != 0;

    let endpoint_count = mode.subsets * 2;
    let mut endpoints = [[0u32; 4]; 6];

    // Each channel stores all endpoints before moving to the next channel.
    for c in 0..3 {
        for endpoint in endpoints.iter_mut().take(endpoint_count) {
            endpoint[c] = reader.read(mode.color_bits)?;
        }
    }
    for endpoint in endpoints.iter_mut().take(endpoint_count) {
        endpoint[3] = if mode.alpha_bits == 0 {
            255
        } else {
            reader.read(mode.alpha_bits)?
        };
    }

    let has_pbits = mode.endpoint_pbits || mode.shared_pbits;
    if has_pbits {
        let shared = if mode.shared_pbits {
            [reader.read_bit()? as u32, reader.read_bit()? as u32]
        } else {
            [0, 0]
        };

        for (i, endpoint) in endpoints.iter_mut().take(endpoint_count).enumerate() {
            // Shared P-bits apply to both endpoints of a subset.
            let p = if mode.endpoint_pbits {
                reader.read_bit()? as u32
            } else {
                shared[i >> 1]
            };

            for c in 0..3 {
                endpoint[c] = endpoint[c] << 1 | p;
            }
            if mode.alpha_bits > 0 {
                endpoint[3] = endpoint[3] << 1 | p;
            }
        }
    }

    let color_bits = mode.color_bits + has_pbits as usize;
    let alpha_bits = mode.alpha_bits + mode.endpoint_pbits as usize;
    for endpoint in endpoints.iter_mut().take(endpoint_count) {
        for c in 0..3 {
            endpoint[c] = unquantize(endpoint[c], color_bits);
        }
        if mode.alpha_bits > 0 {
            endpoint[3] = unquantize(endpoint[3], alpha_bits);
        }
    }

    // The secondary indices start after the color indices.
    // Each subset has an anchor with one less index bit.
    let has_alpha_indices = mode.alpha_bits > 0 && mode.index_bits2 > 0;
    let mut alpha_reader = BitReader::from_slice(data);
    alpha_reader.set_position(reader.position() + 16 * mode.index_bits - mode.subsets);

    let color_weights = weights(mode.index_bits);
    let alpha_weights = weights(mode.index_bits2);

    let mut block = [[0.0; 4]; 16];
    for (i, texel) in block.iter_mut().enumerate() {
        let subset = subset_index(mode.subsets, partition, i);

        let bits = if is_anchor(mode.subsets, partition, i) {
            mode.index_bits - 1
        } else {
            mode.index_bits
        };
        let index = reader.read(bits)? as usize;

        let (color_weight, alpha_weight) = if has_alpha_indices {
            let bits2 = if i == 0 {
                mode.index_bits2 - 1
            } else {
                mode.index_bits2
            };
            let index2 = alpha_reader.read(bits2)? as usize;

            if index_selection {
                (alpha_weights[index2], color_weights[index])
            } else {
                (color_weights[index], alpha_weights[index2])
            }
        } else {
            (color_weights[index], color_weights[index])
        };

        let e0 = endpoints[subset * 2];
        let e1 = endpoints[subset * 2 + 1];
        let mut color = [
            interpolate(e0[0], e1[0], color_weight),
            interpolate(e0[1], e1[1], color_weight),
            interpolate(e0[2], e1[2], color_weight),
            interpolate(e0[3], e1[3], alpha_weight),
        ];

        match rotation {
            1 => color.swap(0, 3),
            2 => color.swap(1, 3),
            3 => color.swap(2, 3),
            _ => (),
        }

        for (out, value) in texel.iter_mut().zip(color.iter()) {
            *out = *value as f32 / 255.0;
        }
    }

    Ok(block)
}

impl TextureCodec for Bc7 {
    fn name(&self) -> &'static str {
        "BC7"
    }

    fn decompress(
        &self,
        width: u32,
        height: u32,
        data: &[u8],
        _data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError> {
        decode_blocks(width, height, 16, data, bc7_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_bytes;
    use approx::assert_relative_eq;

    #[test]
    fn mode_bit_counts() {
        for (i, mode) in MODES.iter().enumerate() {
            let endpoints = mode.subsets * 2;
            let pbits = if mode.endpoint_pbits {
                endpoints
            } else if mode.shared_pbits {
                2
            } else {
                0
            };
            let index_bits2 = if mode.index_bits2 > 0 {
                16 * mode.index_bits2 - 1
            } else {
                0
            };
            let total = i
                + 1
                + mode.partition_bits
                + mode.rotation_bits
                + mode.index_selection_bits
                + endpoints * (3 * mode.color_bits + mode.alpha_bits)
                + pbits
                + 16 * mode.index_bits
                - mode.subsets
                + index_bits2;
            assert_eq!(128, total, "mode {}", i);
        }
    }

    #[test]
    fn unquantize_replicates_bits() {
        assert_eq!(0xFF, unquantize(0x7F, 7));
        assert_eq!(0x86, unquantize(0x21, 6));
        assert_eq!(2, unquantize(1, 7));
        assert_eq!(0x88, unquantize(0x8, 4));
    }

    #[test]
    fn mode_6_max_endpoints() {
        let data = hex_bytes("C0FFFFFF FFFFFFFF 01000000 00000000");
        let rgba = Bc7.decompress(4, 4, &data, TextureDataType::Unorm).unwrap();
        assert_eq!(vec![1.0; 64], rgba);
    }

    #[test]
    fn mode_6_interpolate() {
        // Endpoint 0 is black and endpoint 1 is white.
        // Texel 1 has index 15 and texel 2 has index 8.
        let data = hex_bytes("40C01FF0 07FC017F F1080000 00000000");
        let rgba = Bc7.decompress(4, 4, &data, TextureDataType::Unorm).unwrap();
        assert_eq!(&[0.0, 0.0, 0.0, 0.0], &rgba[0..4]);
        assert_eq!(&[1.0, 1.0, 1.0, 1.0], &rgba[4..8]);
        for value in &rgba[8..12] {
            assert_relative_eq!(135.0 / 255.0, *value);
        }
    }

    #[test]
    fn mode_1_shared_pbits() {
        // The second P-bit only applies to the endpoints of the second subset.
        let data = hex_bytes("02000000 00000000 00000200 00000000");
        let rgba = Bc7.decompress(4, 4, &data, TextureDataType::Unorm).unwrap();
        assert_eq!(&[0.0, 0.0, 0.0, 1.0], &rgba[0..4]);
        assert_relative_eq!(2.0 / 255.0, rgba[8]);
        assert_relative_eq!(2.0 / 255.0, rgba[9]);
        assert_relative_eq!(2.0 / 255.0, rgba[10]);
        assert_eq!(1.0, rgba[11]);
    }

    #[test]
    fn mode_5_rotation() {
        // Red and alpha are swapped after interpolation.
        let data = hex_bytes("607F0000 00000000 00000000 00000000");
        let rgba = Bc7.decompress(4, 4, &data, TextureDataType::Unorm).unwrap();
        for texel in rgba.chunks_exact(4) {
            assert_eq!(&[0.0, 0.0, 0.0, 1.0], texel);
        }
    }

    #[test]
    fn reserved_mode() {
        let result = Bc7.decompress(4, 4, &[0u8; 16], TextureDataType::Unorm);
        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedFormat {
                kind: "BC7 mode",
                value: 8
            })
        ));
    }
}
