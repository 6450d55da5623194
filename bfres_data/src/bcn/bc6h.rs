//! BC6H decoding for unsigned and signed half precision RGB.
use half::f16;

use super::tables::{ANCHORS_2, BC6H_BIT_PACKINGS};
use super::{decode_blocks, subset_index, weights, Block, TextureCodec};
use crate::bitutils::BitReader;
use bfres_lib::formats::bntx::TextureDataType;
use bfres_lib::DecodeError;

pub struct Bc6h;

struct Mode {
    transformed: bool,
    partition_bits: usize,
    endpoint_bits: u32,
    delta_bits: [u32; 3],
}

const fn mode(
    transformed: bool,
    partition_bits: usize,
    endpoint_bits: u32,
    delta_bits: [u32; 3],
) -> Mode {
    Mode {
        transformed,
        partition_bits,
        endpoint_bits,
        delta_bits,
    }
}

const MODES: [Mode; 14] = [
    mode(true, 5, 10, [5, 5, 5]),
    mode(true, 5, 7, [6, 6, 6]),
    mode(true, 5, 11, [5, 4, 4]),
    mode(true, 5, 11, [4, 5, 4]),
    mode(true, 5, 11, [4, 4, 5]),
    mode(true, 5, 9, [5, 5, 5]),
    mode(true, 5, 8, [6, 5, 5]),
    mode(true, 5, 8, [5, 6, 5]),
    mode(true, 5, 8, [5, 5, 6]),
    mode(false, 5, 6, [6, 6, 6]),
    mode(false, 0, 10, [10, 10, 10]),
    mode(true, 0, 11, [9, 9, 9]),
    mode(true, 0, 12, [8, 8, 8]),
    mode(true, 0, 16, [4, 4, 4]),
];

fn sign_extend(value: i32, bits: u32) -> i32 {
    if value & (1 << (bits - 1)) != 0 {
        value | (!0 << bits)
    } else {
        value
    }
}

fn unquantize(component: i32, bits: u32, signed: bool) -> i32 {
    if signed {
        if bits >= 16 {
            return component;
        }

        let magnitude = component.abs();
        let unquantized = if magnitude == 0 {
            0
        } else if magnitude >= (1 << (bits - 1)) - 1 {
            0x7FFF
        } else {
            ((magnitude << 15) + 0x4000) >> (bits - 1)
        };

        if component < 0 {
            -unquantized
        } else {
            unquantized
        }
    } else if bits >= 15 {
        component
    } else if component == 0 {
        0
    } else if component == (1 << bits) - 1 {
        0xFFFF
    } else {
        ((component << 15) + 0x4000) >> (bits - 1)
    }
}

/// Scales an interpolated value to the bits of a half float.
fn finalize(value: i32, signed: bool) -> u16 {
    if signed {
        if value < 0 {
            0x8000 | ((-value * 31) >> 5) as u16
        } else {
            ((value * 31) >> 5) as u16
        }
    } else {
        ((value * 31) >> 6) as u16
    }
}

/// Reads the variable length mode field.
/// Modes 0 and 1 use 2 bits and the remaining modes use 5 bits.
fn read_mode(reader: &mut BitReader) -> Result<usize, DecodeError> {
    let low = reader.read(2)? as usize;
    if low < 2 {
        return Ok(low);
    }

    let bits = (reader.read(3)? as usize) << 2 | low;
    let mode = if bits & 3 == 2 {
        2 + (bits >> 2)
    } else {
        10 + (bits >> 2)
    };
    if mode >= MODES.len() {
        return Err(DecodeError::UnsupportedFormat {
            kind: "BC6H mode",
            value: bits as u32,
        });
    }
    Ok(mode)
}

fn bc6h_block(data: &[u8], signed: bool) -> Result<Block, DecodeError> {
    let mut reader = BitReader::from_slice(data);

    let mode_index = read_mode(&mut reader)?;
    let mode = &MODES[mode_index];
    let index_bits = if mode_index >= 10 { 4 } else { 3 };

    // Components are ordered r0 g0 b0 r1 g1 b1 and so on for each endpoint.
    let mut endpoints = [0i32; 12];
    for packing in BC6H_BIT_PACKINGS[mode_index] {
        let component = (packing >> 4) as usize;
        let bit = packing & 0xF;
        endpoints[component] |= (reader.read_bit()? as i32) << bit;
    }

    let partition = reader.read(mode.partition_bits)? as usize;
    let subset_count = if mode.partition_bits > 0 { 2 } else { 1 };
    let component_count = subset_count * 6;

    if signed {
        for c in 0..3 {
            endpoints[c] = sign_extend(endpoints[c], mode.endpoint_bits);
        }
    }

    if signed || mode.transformed {
        for i in 3..component_count {
            endpoints[i] = sign_extend(endpoints[i], mode.delta_bits[i % 3]);
        }
    }

    if mode.transformed {
        // The remaining endpoints are deltas from the first endpoint.
        let mask = (1 << mode.endpoint_bits) - 1;
        for i in 3..component_count {
            endpoints[i] = (endpoints[i] + endpoints[i % 3]) & mask;
            if signed {
                endpoints[i] = sign_extend(endpoints[i], mode.endpoint_bits);
            }
        }
    }

    let mut unquantized = [0i32; 12];
    for (u, e) in unquantized.iter_mut().zip(endpoints.iter()).take(component_count) {
        *u = unquantize(*e, mode.endpoint_bits, signed);
    }

    let weights = weights(index_bits);
    let mut block = [[0.0; 4]; 16];
    for (i, texel) in block.iter_mut().enumerate() {
        let subset = subset_index(subset_count, partition, i);

        // The most significant bit of each anchor index is implied to be 0.
        let is_anchor = i == 0 || (subset_count == 2 && i == ANCHORS_2[partition] as usize);
        let bits = if is_anchor {
            index_bits - 1
        } else {
            index_bits
        };
        let weight = weights[reader.read(bits)? as usize] as i32;

        let e0 = &unquantized[subset * 6..subset * 6 + 3];
        let e1 = &unquantized[subset * 6 + 3..subset * 6 + 6];
        for c in 0..3 {
            let value = (e0[c] * (64 - weight) + e1[c] * weight + 32) >> 6;
            texel[c] = f16::from_bits(finalize(value, signed)).to_f32();
        }
        texel[3] = 1.0;
    }

    Ok(block)
}

impl TextureCodec for Bc6h {
    fn name(&self) -> &'static str {
        "BC6H"
    }

    fn decompress(
        &self,
        width: u32,
        height: u32,
        data: &[u8],
        data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError> {
        let signed = data_type == TextureDataType::Single;
        decode_blocks(width, height, 16, data, |b| bc6h_block(b, signed))
    }
}
