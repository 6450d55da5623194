//! # bfres_lib
//!
//! Low level reading of the Nintendo Switch BFRES model archive and BNTX texture archive formats.
//!
//! The types in [formats] mirror the binary layout closely and are loaded with a
//! [ByteCursor] that resolves offsets, string pools, and dictionaries.
//! Textures are deswizzled at load time using the table in [format_info].
//! Higher level decoding such as block compressed texture decompression and vertex attribute
//! conversion is provided by the `bfres_data` crate.
/*!
```no_run
use bfres_lib::formats::bfres::ResFile;

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let bytes = std::fs::read("model.bfres")?;
let bfres = ResFile::from_bytes(&bytes)?;
for model in bfres.models.values() {
    println!("{} {}", model.name, model.shapes.len());
}
# Ok(())
# }
```
 */
pub mod cursor;
pub mod dict;
mod error;
pub mod format_info;
pub mod formats;
pub mod loader;
pub mod swizzle;

pub use cursor::{ByteCursor, LoadLimits, OffsetBase};
pub use error::DecodeError;

use binread::{
    io::{Read, Seek},
    BinRead, BinResult, ReadOptions,
};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

/// The byte order of a file as declared by its byte order mark.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Determines the byte order from the two byte order mark bytes as they appear in the file.
    pub fn from_bom(bom: [u8; 2]) -> Option<Self> {
        match bom {
            [0xFF, 0xFE] => Some(Endian::Little),
            [0xFE, 0xFF] => Some(Endian::Big),
            _ => None,
        }
    }
}

/// A string stored as a `u16` length followed by the characters.
/// Invalid UTF-8 is replaced rather than rejected.
#[derive(Debug, PartialEq, Eq)]
pub struct PrefixedString(pub String);

impl BinRead for PrefixedString {
    type Args = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        options: &ReadOptions,
        _args: Self::Args,
    ) -> BinResult<Self> {
        let length = u16::read_options(reader, options, ())?;
        let mut bytes = vec![0u8; length as usize];
        reader.read_exact(&mut bytes)?;
        Ok(Self(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

/// Three contiguous floats for encoding XYZ data.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Four contiguous floats for encoding XYZW or quaternion data.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// A row-major 3x4 affine transform with the translation in the last column.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Default)]
pub struct Matrix3x4 {
    pub row1: Vector4,
    pub row2: Vector4,
    pub row3: Vector4,
}

#[cfg(test)]
pub(crate) fn hex_bytes(hex: &str) -> Vec<u8> {
    // Remove any whitespace used to make the tests more readable.
    let no_whitespace: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(no_whitespace).unwrap()
}
