//! The supported binary formats.
//! [bfres] model archives and [bntx] texture archives share the [BinaryHeader].
//! Resources inside a [bfres::ResFile] start with a [BlockHeader].

pub mod bfres;
pub mod bntx;
pub mod material;
pub mod model;
pub mod skeletal_anim;
pub mod skeleton;

use crate::{ByteCursor, DecodeError, Endian, OffsetBase};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

/// The 0x20 byte header at the start of BFRES and BNTX files.
///
/// | off | type | field |
/// | --- | --- | --- |
/// | 0x00 | [u8; 4] | magic |
/// | 0x04 | [u8; 4] | padding |
/// | 0x08 | u32 | version |
/// | 0x0C | u16 | byte order mark |
/// | 0x0E | u8 | alignment shift |
/// | 0x0F | u8 | target address size |
/// | 0x10 | u32 | file name offset |
/// | 0x14 | u16 | flags |
/// | 0x16 | u16 | first block offset |
/// | 0x18 | u32 | relocation table offset |
/// | 0x1C | u32 | file size |
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub endian: Endian,
    pub alignment_shift: u8,
    pub address_size: u8,
    pub file_name: String,
    pub flags: u16,
    pub first_block_offset: u16,
    pub relocation_table_offset: u32,
    pub file_size: u32,
}

impl BinaryHeader {
    pub const SIZE: u64 = 0x20;

    /// Reads the header and sets the reader's byte order from the byte order mark.
    pub fn read(reader: &mut ByteCursor, magic: &[u8; 4]) -> Result<Self, DecodeError> {
        let start = reader.position();
        reader.read_signature(magic)?;
        reader.skip(4)?;

        // The byte order mark comes after the version it applies to.
        let bom_offset = start + 0x0C;
        let bom = reader.temporary_seek(bom_offset, |r| r.read_bytes(2))?;
        let endian = Endian::from_bom([bom[0], bom[1]]).ok_or_else(|| {
            DecodeError::MalformedFile(format!(
                "Invalid byte order mark {:02X}{:02X} at offset 0x{:X}.",
                bom[0], bom[1], bom_offset
            ))
        })?;
        reader.set_endian(endian);

        let version = reader.read_u32()?;
        reader.skip(2)?;
        let alignment_shift = reader.read_u8()?;
        let address_size = reader.read_u8()?;
        let file_name_offset = reader.read_offset32(OffsetBase::FileStart)?;
        let flags = reader.read_u16()?;
        let first_block_offset = reader.read_u16()?;
        let relocation_table_offset = reader.read_u32()?;
        let file_size = reader.read_u32()?;

        // The name offset points at the characters after the length.
        let file_name = match file_name_offset {
            Some(offset) if offset >= 2 => reader.read_string_at(Some(offset - 2))?,
            _ => String::new(),
        };

        Ok(Self {
            magic: *magic,
            version,
            endian,
            alignment_shift,
            address_size,
            file_name,
            flags,
            first_block_offset,
            relocation_table_offset,
            file_size,
        })
    }

    /// The major, minor, and micro version numbers.
    pub fn version_parts(&self) -> (u16, u8, u8) {
        (
            (self.version >> 16) as u16,
            (self.version >> 8) as u8,
            self.version as u8,
        )
    }
}

/// The 0x10 byte header at the start of each model, skeleton, vertex buffer,
/// shape, material, and skeletal animation.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// The absolute offset of the next block or `None` for the last block.
    pub next_block: Option<u64>,
    pub size: u32,
}

impl BlockHeader {
    pub const SIZE: u64 = 0x10;

    pub fn read(reader: &mut ByteCursor, magic: &[u8; 4]) -> Result<Self, DecodeError> {
        reader.read_signature(magic)?;
        let next_block = reader.read_offset32(OffsetBase::Field)?;
        let size = reader.read_u32()?;
        reader.skip(4)?;
        Ok(Self { next_block, size })
    }
}
