//! The static table of BNTX texture format properties.
//!
//! The size of a block in bytes and its dimensions in pixels only depend on the format id.
//! Uncompressed formats use 1x1 blocks.

#[cfg(feature = "derive_serde")]
use serde::Serialize;

#[cfg_attr(feature = "derive_serde", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub id: u8,
    pub name: &'static str,
    /// The size in bytes of a single block.
    pub bytes_per_pixel: u32,
    pub block_width: u32,
    pub block_height: u32,
}

const fn format(
    id: u8,
    name: &'static str,
    bytes_per_pixel: u32,
    block_width: u32,
    block_height: u32,
) -> FormatInfo {
    FormatInfo {
        id,
        name,
        bytes_per_pixel,
        block_width,
        block_height,
    }
}

pub static FORMATS: [FormatInfo; 30] = [
    format(0x01, "R4_G4", 1, 1, 1),
    format(0x02, "R8", 1, 1, 1),
    format(0x03, "R4_G4_B4_A4", 2, 1, 1),
    format(0x05, "R5_G5_B5_A1", 2, 1, 1),
    format(0x07, "R5_G6_B5", 2, 1, 1),
    format(0x09, "R8_G8", 2, 1, 1),
    format(0x0B, "R8_G8_B8_A8", 4, 1, 1),
    format(0x0C, "B8_G8_R8_A8", 4, 1, 1),
    format(0x0E, "R10_G10_B10_A2", 4, 1, 1),
    format(0x1A, "BC1", 8, 4, 4),
    format(0x1B, "BC2", 16, 4, 4),
    format(0x1C, "BC3", 16, 4, 4),
    format(0x1D, "BC4", 8, 4, 4),
    format(0x1E, "BC5", 16, 4, 4),
    format(0x1F, "BC6H", 16, 4, 4),
    format(0x20, "BC7", 16, 4, 4),
    format(0x2D, "ASTC_4x4", 16, 4, 4),
    format(0x2E, "ASTC_5x4", 16, 5, 4),
    format(0x2F, "ASTC_5x5", 16, 5, 5),
    format(0x30, "ASTC_6x5", 16, 6, 5),
    format(0x31, "ASTC_6x6", 16, 6, 6),
    format(0x32, "ASTC_8x5", 16, 8, 5),
    format(0x33, "ASTC_8x6", 16, 8, 6),
    format(0x34, "ASTC_8x8", 16, 8, 8),
    format(0x35, "ASTC_10x5", 16, 10, 5),
    format(0x36, "ASTC_10x6", 16, 10, 6),
    format(0x37, "ASTC_10x8", 16, 10, 8),
    format(0x38, "ASTC_10x10", 16, 10, 10),
    format(0x39, "ASTC_12x10", 16, 12, 10),
    format(0x3A, "ASTC_12x12", 16, 12, 12),
];

/// Finds the properties for the format `id` or `None` if the format is unknown.
pub fn format_info(id: u8) -> Option<&'static FormatInfo> {
    FORMATS.iter().find(|f| f.id == id)
}
