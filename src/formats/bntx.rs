//! The BNTX texture archive and its BRTI textures.
//!
//! Texture data is deswizzled while loading, so [Texture::data] is always in row major block order.
//! Only the base mip level of the first array layer is kept.
use std::convert::TryFrom;

use log::{debug, warn};
use modular_bitfield::prelude::*;

use super::BinaryHeader;
use crate::format_info::{format_info, FormatInfo};
use crate::loader::{load_pointer_table, load_values, Loadable};
use crate::swizzle::{adjusted_block_height_log2, deswizzle, div_round_up, SurfaceInfo, TileMode};
use crate::{ByteCursor, DecodeError, LoadLimits};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

/// How the components of a texture format are interpreted.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDataType {
    Unorm,
    Snorm,
    UInt,
    SInt,
    /// Signed floating point.
    Single,
    Srgb,
    /// Unsigned floating point.
    UHalf,
}

impl TryFrom<u8> for TextureDataType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Unorm),
            2 => Ok(Self::Snorm),
            3 => Ok(Self::UInt),
            4 => Ok(Self::SInt),
            5 => Ok(Self::Single),
            6 => Ok(Self::Srgb),
            10 => Ok(Self::UHalf),
            _ => Err(DecodeError::UnsupportedFormat {
                kind: "texture data type",
                value: value as u32,
            }),
        }
    }
}

/// The source of an output channel when sampling a texture.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Zero,
    One,
    Red,
    Green,
    Blue,
    Alpha,
}

impl TryFrom<u8> for ChannelType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            2 => Ok(Self::Red),
            3 => Ok(Self::Green),
            4 => Ok(Self::Blue),
            5 => Ok(Self::Alpha),
            _ => Err(DecodeError::UnsupportedFormat {
                kind: "channel type",
                value: value as u32,
            }),
        }
    }
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    Texture1d,
    Texture2d,
    Texture3d,
    Cube,
    CubeFar,
}

impl TryFrom<i32> for TextureType {
    type Error = DecodeError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Texture1d),
            1 => Ok(Self::Texture2d),
            2 => Ok(Self::Texture3d),
            3 => Ok(Self::Cube),
            8 => Ok(Self::CubeFar),
            _ => Err(DecodeError::UnsupportedFormat {
                kind: "texture type",
                value: value as u32,
            }),
        }
    }
}

#[bitfield(bits = 32)]
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLayout {
    /// The log2 of the GOBs per block for block linear surfaces.
    pub block_height_log2: B3,
    #[skip]
    __: B29,
}

/// A single BRTI texture.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub flags: u8,
    pub dimension: u8,
    pub tile_mode: u16,
    pub swizzle: u16,
    pub mip_count: u16,
    pub sample_count: u16,
    pub data_type: TextureDataType,
    /// The id into the [format_info] table.
    pub format: u8,
    pub access_flags: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_count: u32,
    pub layout: TextureLayout,
    pub layout2: u32,
    pub data_length: u32,
    pub alignment: u32,
    /// The source of the red, green, blue, and alpha output channels.
    pub channel_types: [ChannelType; 4],
    pub texture_type: TextureType,
    /// The absolute offset of each mip level.
    pub mip_offsets: Vec<u64>,
    /// The deswizzled base mip level or empty if the file does not contain the full surface.
    pub data: Vec<u8>,
}

impl Texture {
    pub fn format_info(&self) -> Option<&'static FormatInfo> {
        format_info(self.format)
    }

    pub fn tile_mode(&self) -> TileMode {
        TileMode::from(self.tile_mode)
    }

    fn surface(&self, info: &FormatInfo) -> SurfaceInfo {
        SurfaceInfo {
            width: self.width,
            height: self.height,
            block_width: info.block_width,
            block_height: info.block_height,
            bytes_per_pixel: info.bytes_per_pixel,
            tile_mode: self.tile_mode(),
            block_height_log2: adjusted_block_height_log2(
                self.height,
                info.block_height,
                self.layout.block_height_log2() as u32,
            ),
        }
    }
}

fn dimension(value: i32, name: &str) -> Result<u32, DecodeError> {
    u32::try_from(value).map_err(|_| {
        DecodeError::MalformedFile(format!("Texture {} {} is negative.", name, value))
    })
}

fn check_surface_size(width: u32, height: u32, info: &FormatInfo, limits: LoadLimits) -> Result<(), DecodeError> {
    let size = div_round_up(width, info.block_width) as u64
        * div_round_up(height, info.block_height) as u64
        * info.bytes_per_pixel as u64;
    if size > limits.max_surface_bytes as u64 {
        return Err(DecodeError::MalformedFile(format!(
            "Surface of {}x{} {} requires {} bytes, which exceeds the limit of {} bytes.",
            width, height, info.name, size, limits.max_surface_bytes
        )));
    }
    Ok(())
}

impl Loadable for Texture {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        reader.read_signature(b"BRTI")?;
        reader.skip(12)?;
        let flags = reader.read_u8()?;
        let dimension_value = reader.read_u8()?;
        let tile_mode = reader.read_u16()?;
        let swizzle = reader.read_u16()?;
        let mip_count = reader.read_u16()?;
        let sample_count = reader.read_u16()?;
        reader.skip(2)?;
        let data_type = TextureDataType::try_from(reader.read_u8()?)?;
        let format = reader.read_u8()?;
        reader.skip(2)?;
        let access_flags = reader.read_u32()?;
        let width = dimension(reader.read_i32()?, "width")?;
        let height = dimension(reader.read_i32()?, "height")?;
        let depth = dimension(reader.read_i32()?, "depth")?;
        let array_count = reader.read_u32()?;
        let layout = TextureLayout::from_bytes(reader.read_u32()?.to_le_bytes());
        let layout2 = reader.read_u32()?;
        reader.skip(20)?;
        let data_length = reader.read_u32()?;
        let alignment = reader.read_u32()?;
        let mut channel_types = [ChannelType::Zero; 4];
        for channel in channel_types.iter_mut() {
            *channel = ChannelType::try_from(reader.read_u8()?)?;
        }
        let texture_type = TextureType::try_from(reader.read_i32()?)?;
        let name = reader.read_name()?;
        // The parent BNTX isn't needed after loading.
        reader.skip(8)?;
        let mip_table = reader.read_offset64()?;

        let info = format_info(format).ok_or(DecodeError::UnsupportedFormat {
            kind: "texture format",
            value: format as u32,
        })?;
        check_surface_size(width, height, info, reader.limits())?;

        let mip_offsets: Vec<u64> = load_values(reader, mip_table, mip_count as usize)?;
        if mip_offsets.len() != mip_count as usize {
            return Err(DecodeError::MalformedFile(format!(
                "Texture {:?} declares {} mip levels but has {} mip offsets.",
                name,
                mip_count,
                mip_offsets.len()
            )));
        }

        let mut texture = Self {
            name,
            flags,
            dimension: dimension_value,
            tile_mode,
            swizzle,
            mip_count,
            sample_count,
            data_type,
            format,
            access_flags,
            width,
            height,
            depth,
            array_count,
            layout,
            layout2,
            data_length,
            alignment,
            channel_types,
            texture_type,
            mip_offsets,
            data: Vec::new(),
        };

        if let Some(offset) = texture.mip_offsets.first().copied() {
            let raw = reader.temporary_seek(offset, |r| r.read_bytes(data_length as usize))?;
            let surface = texture.surface(info);
            if raw.len() >= surface.deswizzled_size() {
                texture.data = deswizzle(&surface, raw);
            } else {
                warn!(
                    "Texture {:?} has {} bytes of data but a {}x{} {} surface requires {} bytes.",
                    texture.name,
                    raw.len(),
                    width,
                    height,
                    info.name,
                    surface.deswizzled_size()
                );
            }
        }

        Ok(texture)
    }
}

/// A BNTX texture archive.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Bntx {
    pub header: BinaryHeader,
    /// The textures that could be decoded in file order.
    pub textures: Vec<Texture>,
    pub memory_pool_offset: u32,
}

impl Bntx {
    /// Reads a BNTX from `bytes` with the default [LoadLimits].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::from_bytes_with_limits(bytes, LoadLimits::default())
    }

    pub fn from_bytes_with_limits(bytes: &[u8], limits: LoadLimits) -> Result<Self, DecodeError> {
        let mut reader = ByteCursor::new(bytes).with_limits(limits);
        Self::read(&mut reader)
    }

    pub fn texture(&self, name: &str) -> Option<&Texture> {
        self.textures.iter().find(|t| t.name == name)
    }

    /// Reads a BNTX starting at the reader's current position.
    ///
    /// Textures that fail with a recoverable error are logged and skipped.
    pub fn read(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let header = BinaryHeader::read(reader, b"BNTX")?;
        reader.read_signature(b"NX  ")?;
        let texture_count = reader.read_i32()?;
        let texture_table = reader.read_offset64()?;
        // Texture data, dictionary, memory pool, and user memory pool.
        reader.skip(32)?;
        let memory_pool_offset = reader.read_u32()?;
        reader.skip(4)?;

        let texture_count = usize::try_from(texture_count).map_err(|_| {
            DecodeError::MalformedFile(format!("Texture count {} is negative.", texture_count))
        })?;

        let mut textures = Vec::new();
        for (i, pointer) in load_pointer_table(reader, texture_table, texture_count)?
            .into_iter()
            .enumerate()
        {
            match reader.temporary_seek(pointer, Texture::load) {
                Ok(texture) => {
                    debug!(
                        "Read texture {:?} {}x{} format 0x{:02X}",
                        texture.name, texture.width, texture.height, texture.format
                    );
                    textures.push(texture)
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping texture {} at offset 0x{:X}: {}", i, pointer, e)
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self {
            header,
            textures,
            memory_pool_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_bytes;

    // An 8x8 pitch linear BC1 texture with 32 bytes of zeros.
    fn bntx_bytes() -> Vec<u8> {
        hex_bytes(
            "424E5458 00000000 00000400 FFFE 0C 40
             00000000 0000 2000 00000000 08010000

             4E582020 01000000 5800000000000000
             0000000000000000 0000000000000000
             0000000000000000 0000000000000000
             00000000 00000000

             6000000000000000

             42525449 78000000 7800000000000000
             01 02 0100 0000 0100 0100 0000 01 1A 0000
             00000000 08000000 08000000 01000000
             01000000 00000000 00000000
             00000000 00000000 00000000 00000000 00000000
             20000000 00020000 02030405 01000000
             D800000000000000 0000000000000000 E000000000000000

             0300 746578 00 0000
             E800000000000000
             0000000000000000 0000000000000000
             0000000000000000 0000000000000000",
        )
    }

    #[test]
    fn read_bntx_bc1() {
        let data = bntx_bytes();
        assert_eq!(0x108, data.len());

        let bntx = Bntx::from_bytes(&data).unwrap();
        assert_eq!(1, bntx.textures.len());

        let texture = bntx.texture("tex").unwrap();
        assert_eq!(8, texture.width);
        assert_eq!(8, texture.height);
        assert_eq!(TextureDataType::Unorm, texture.data_type);
        assert_eq!("BC1", texture.format_info().unwrap().name);
        assert_eq!(TileMode::PitchLinear, texture.tile_mode());
        assert_eq!(TextureType::Texture2d, texture.texture_type);
        assert_eq!(
            [
                ChannelType::Red,
                ChannelType::Green,
                ChannelType::Blue,
                ChannelType::Alpha
            ],
            texture.channel_types
        );
        assert_eq!(vec![0xE8], texture.mip_offsets);
        assert_eq!(vec![0u8; 32], texture.data);
    }

    #[test]
    fn skip_unsupported_format() {
        let mut data = bntx_bytes();
        data[0x7D] = 0xFF;
        let bntx = Bntx::from_bytes(&data).unwrap();
        assert!(bntx.textures.is_empty());
    }

    #[test]
    fn skip_negative_width() {
        let mut data = bntx_bytes();
        data[0x84..0x88].copy_from_slice(&(-8i32).to_le_bytes());
        let bntx = Bntx::from_bytes(&data).unwrap();
        assert!(bntx.textures.is_empty());
    }

    #[test]
    fn skip_surface_over_limit() {
        let data = bntx_bytes();
        let limits = LoadLimits {
            max_surface_bytes: 16,
        };
        let bntx = Bntx::from_bytes_with_limits(&data, limits).unwrap();
        assert!(bntx.textures.is_empty());
    }

    #[test]
    fn incomplete_surface_has_no_data() {
        let mut data = bntx_bytes();
        // 16x8 requires 64 bytes.
        data[0x84] = 16;
        let bntx = Bntx::from_bytes(&data).unwrap();
        assert!(bntx.textures[0].data.is_empty());
    }

    #[test]
    fn invalid_texture_signature() {
        let mut data = bntx_bytes();
        data[0x60..0x64].copy_from_slice(b"BRTX");
        assert!(matches!(
            Bntx::from_bytes(&data),
            Err(DecodeError::SignatureMismatch { offset: 0x60, .. })
        ));
    }

    #[test]
    fn invalid_file_signature() {
        let data = bntx_bytes();
        assert!(matches!(
            Bntx::from_bytes(&data[0x20..]),
            Err(DecodeError::SignatureMismatch { offset: 0, .. })
        ));
    }

    #[test]
    fn block_height_adjusted_for_short_surfaces() {
        let data = bntx_bytes();
        let mut texture = Bntx::from_bytes(&data).unwrap().textures.remove(0);
        texture.layout = TextureLayout::new().with_block_height_log2(4);
        let surface = texture.surface(texture.format_info().unwrap());
        // 2 block rows round up to 2, which is less than 128 lines.
        assert_eq!(3, surface.block_height_log2);
    }
}
