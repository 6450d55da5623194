//! The BFRES model archive.
//!
//! The FRES root follows the [BinaryHeader] at 0x20 and ends at 0xD0.
//! Material, bone visibility, shape, and scene animations are counted but not decoded.
use binread::BinRead;
use log::debug;

use super::model::Model;
use super::skeletal_anim::SkeletalAnim;
use super::BinaryHeader;
use crate::loader::{load_dict, Loadable, ResMap};
use crate::{ByteCursor, DecodeError, Endian, LoadLimits};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

/// The location of the region holding all vertex and index data.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub unk1: u32,
    pub size: u32,
    pub offset: u64,
}

/// An embedded file such as a BNTX texture archive or a text file.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFile {
    pub data: Vec<u8>,
}

impl Loadable for ExternalFile {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let offset = reader.read_offset64()?;
        let size = reader.read_u32()? as usize;
        reader.skip(4)?;

        let data = match offset {
            Some(offset) => reader.temporary_seek(offset, |r| r.read_bytes(size))?.to_vec(),
            None => Vec::new(),
        };
        Ok(Self { data })
    }
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ResFile {
    pub header: BinaryHeader,
    pub name: String,
    pub models: ResMap<Model>,
    pub skeletal_anims: ResMap<SkeletalAnim>,
    pub external_files: ResMap<ExternalFile>,
    pub buffer_info: Option<BufferInfo>,
    /// The vertex and index data referenced by [BufferInfo].
    pub buffer_region: Vec<u8>,
    pub material_anim_count: u16,
    pub bone_visibility_anim_count: u16,
    pub shape_anim_count: u16,
    pub scene_anim_count: u16,
    pub string_table_size: u32,
}

impl ResFile {
    /// Reads a BFRES from `bytes` with the default [LoadLimits].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::from_bytes_with_limits(bytes, LoadLimits::default())
    }

    pub fn from_bytes_with_limits(bytes: &[u8], limits: LoadLimits) -> Result<Self, DecodeError> {
        let mut reader = ByteCursor::new(bytes).with_limits(limits);
        Self::read(&mut reader)
    }

    pub fn endian(&self) -> Endian {
        self.header.endian
    }

    /// Reads a BFRES starting at the reader's current position.
    pub fn read(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let header = BinaryHeader::read(reader, b"FRES")?;
        let name = reader.read_name()?;
        let model_array = reader.read_offset64()?;
        let model_dict = reader.read_offset64()?;
        let skeletal_anim_array = reader.read_offset64()?;
        let skeletal_anim_dict = reader.read_offset64()?;
        // Other animation arrays and dictionaries followed by the memory pool.
        reader.skip(72)?;
        let buffer_info_offset = reader.read_offset64()?;
        let external_file_array = reader.read_offset64()?;
        let external_file_dict = reader.read_offset64()?;
        // User pointer and string table.
        reader.skip(16)?;
        let string_table_size = reader.read_u32()?;
        let model_count = reader.read_u16()? as usize;
        let skeletal_anim_count = reader.read_u16()? as usize;
        let material_anim_count = reader.read_u16()?;
        let bone_visibility_anim_count = reader.read_u16()?;
        let shape_anim_count = reader.read_u16()?;
        let scene_anim_count = reader.read_u16()?;
        let external_file_count = reader.read_u16()? as usize;
        reader.skip(6)?;

        let buffer_info: Option<BufferInfo> = match buffer_info_offset {
            Some(offset) => Some(reader.temporary_seek(offset, |r| r.read_struct())?),
            None => None,
        };
        let buffer_region = match buffer_info {
            Some(info) => read_buffer_region(reader, &info)?,
            None => Vec::new(),
        };

        let models = load_dict(reader, model_array, model_dict, model_count)?;
        let skeletal_anims = load_dict(
            reader,
            skeletal_anim_array,
            skeletal_anim_dict,
            skeletal_anim_count,
        )?;
        let external_files = load_dict(
            reader,
            external_file_array,
            external_file_dict,
            external_file_count,
        )?;

        debug!(
            "Read BFRES {:?} with {} models, {} skeletal animations, and {} external files",
            name,
            models.len(),
            skeletal_anims.len(),
            external_files.len()
        );

        Ok(Self {
            header,
            name,
            models,
            skeletal_anims,
            external_files,
            buffer_info,
            buffer_region,
            material_anim_count,
            bone_visibility_anim_count,
            shape_anim_count,
            scene_anim_count,
            string_table_size,
        })
    }
}

fn read_buffer_region(reader: &mut ByteCursor, info: &BufferInfo) -> Result<Vec<u8>, DecodeError> {
    if info.offset == 0 {
        return Ok(Vec::new());
    }
    reader
        .temporary_seek(info.offset, |r| r.read_bytes(info.size as usize))
        .map(|bytes| bytes.to_vec())
        .map_err(|_| {
            DecodeError::MalformedFile(format!(
                "Buffer region of {} bytes at offset 0x{:X} exceeds the file size.",
                info.size, info.offset
            ))
        })
}
