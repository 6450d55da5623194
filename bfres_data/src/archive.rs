//! Unwrapping of compressed and archived BFRES and BNTX files.
//!
//! Switch games commonly store models in a zstd or Yaz0 compressed SARC archive.
//! [unwrap_container] repeatedly removes these layers until a BFRES or BNTX remains.
use std::borrow::Cow;
use std::io::Read;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::debug;

use bfres_lib::{DecodeError, Endian};

pub const BFRES_MAGIC: [u8; 4] = *b"FRES";
pub const BNTX_MAGIC: [u8; 4] = *b"BNTX";
pub const SARC_MAGIC: [u8; 4] = *b"SARC";
pub const YAZ0_MAGIC: [u8; 4] = *b"Yaz0";
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// The maximum number of nested containers.
const MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Bfres,
    Bntx,
    Sarc,
    Zstd,
    Yaz0,
}

impl FileType {
    /// Detects the file type from the first 4 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let magic = first4(bytes);
        match magic {
            BFRES_MAGIC => Ok(FileType::Bfres),
            BNTX_MAGIC => Ok(FileType::Bntx),
            SARC_MAGIC => Ok(FileType::Sarc),
            ZSTD_MAGIC => Ok(FileType::Zstd),
            YAZ0_MAGIC => Ok(FileType::Yaz0),
            _ => Err(DecodeError::UnsupportedFileType { magic }),
        }
    }
}

fn first4(bytes: &[u8]) -> [u8; 4] {
    let mut magic = [0u8; 4];
    let take = bytes.len().min(4);
    magic[..take].copy_from_slice(&bytes[..take]);
    magic
}

/// Removes compression and archive layers from `bytes`.
/// Returns the inner file type, which is always [FileType::Bfres] or [FileType::Bntx], and its bytes.
/// Decompressed data larger than `max_bytes` is rejected.
pub fn unwrap_container(
    bytes: &[u8],
    max_bytes: usize,
) -> Result<(FileType, Cow<'_, [u8]>), DecodeError> {
    let mut data = Cow::Borrowed(bytes);
    for _ in 0..MAX_DEPTH {
        let file_type = FileType::from_bytes(&data)?;
        data = match file_type {
            FileType::Bfres | FileType::Bntx => return Ok((file_type, data)),
            FileType::Sarc => {
                debug!("Extracting BFRES from SARC.");
                match data {
                    Cow::Borrowed(b) => Cow::Borrowed(extract_sarc_bfres(b)?),
                    Cow::Owned(b) => Cow::Owned(extract_sarc_bfres(&b)?.to_vec()),
                }
            }
            FileType::Zstd => {
                debug!("Decompressing zstd data.");
                Cow::Owned(decompress_zstd(&data, max_bytes)?)
            }
            FileType::Yaz0 => {
                debug!("Decompressing Yaz0 data.");
                Cow::Owned(decompress_yaz0(&data, max_bytes)?)
            }
        };
    }

    Err(DecodeError::MalformedFile(format!(
        "Files are nested more than {} levels deep.",
        MAX_DEPTH
    )))
}

/// Finds the first file in a SARC archive that starts with the BFRES magic.
pub fn extract_sarc_bfres(bytes: &[u8]) -> Result<&[u8], DecodeError> {
    let bom = read_slice(bytes, 0x06, 2)?;
    let endian = Endian::from_bom([bom[0], bom[1]]).ok_or_else(|| {
        DecodeError::MalformedFile(format!("Invalid SARC byte order mark {:?}.", bom))
    })?;

    let read_u16 = |offset: usize| -> Result<u16, DecodeError> {
        let b = read_slice(bytes, offset, 2)?;
        Ok(match endian {
            Endian::Little => LittleEndian::read_u16(b),
            Endian::Big => BigEndian::read_u16(b),
        })
    };
    let read_u32 = |offset: usize| -> Result<u32, DecodeError> {
        let b = read_slice(bytes, offset, 4)?;
        Ok(match endian {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        })
    };

    let data_offset = read_u32(0x0C)? as usize;
    let node_count = read_u16(0x1A)? as usize;

    for i in 0..node_count {
        let node = 0x20 + i * 0x10;
        let start = data_offset + read_u32(node + 0x08)? as usize;
        let end = data_offset + read_u32(node + 0x0C)? as usize;

        if let Some(file) = bytes.get(start..end) {
            if file.starts_with(&BFRES_MAGIC) {
                return Ok(file);
            }
        }
    }

    Err(DecodeError::MalformedFile(
        "Embedded SARC file does not contain FRES".to_string(),
    ))
}

fn read_slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    bytes
        .get(offset..offset + len)
        .ok_or(DecodeError::TruncatedInput {
            offset: offset as u64,
            len: bytes.len() as u64,
        })
}

fn too_large(max_bytes: usize) -> DecodeError {
    DecodeError::MalformedFile(format!(
        "Decompressed data exceeds the limit of {} bytes.",
        max_bytes
    ))
}

/// Decompresses a zstd frame with at most `max_bytes` of output.
pub fn decompress_zstd(bytes: &[u8], max_bytes: usize) -> Result<Vec<u8>, DecodeError> {
    let zstd_error = |e: std::io::Error| DecodeError::MalformedFile(format!("Invalid zstd data: {}", e));

    let mut decoder = zstd::stream::read::Decoder::new(bytes).map_err(zstd_error)?;
    let mut output = Vec::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = decoder.read(&mut buffer).map_err(zstd_error)?;
        if read == 0 {
            break;
        }
        if output.len() + read > max_bytes {
            return Err(too_large(max_bytes));
        }
        output.extend_from_slice(&buffer[..read]);
    }
    Ok(output)
}

/// Decompresses Yaz0 data with at most `max_bytes` of output.
pub fn decompress_yaz0(bytes: &[u8], max_bytes: usize) -> Result<Vec<u8>, DecodeError> {
    let size = BigEndian::read_u32(read_slice(bytes, 0x04, 4)?) as usize;
    if size > max_bytes {
        return Err(too_large(max_bytes));
    }

    let mut input = bytes.iter().copied().skip(0x10);
    let mut next = || {
        input.next().ok_or(DecodeError::TruncatedInput {
            offset: bytes.len() as u64,
            len: bytes.len() as u64,
        })
    };

    let mut output = Vec::with_capacity(size);
    while output.len() < size {
        let header = next()?;
        // Each group header bit selects a literal byte or back reference starting from the high bit.
        for bit in (0..8).rev() {
            if output.len() >= size {
                break;
            }

            if header & (1 << bit) != 0 {
                output.push(next()?);
            } else {
                let b0 = next()?;
                let b1 = next()?;
                let distance = ((((b0 & 0xF) as usize) << 8) | b1 as usize) + 1;
                let length = match b0 >> 4 {
                    0 => next()? as usize + 0x12,
                    n => n as usize + 2,
                };

                if distance > output.len() {
                    return Err(DecodeError::MalformedFile(format!(
                        "Yaz0 back reference distance {} exceeds the {} decompressed bytes.",
                        distance,
                        output.len()
                    )));
                }

                // The copy can overlap the bytes being written.
                let start = output.len() - distance;
                for i in 0..length.min(size - output.len()) {
                    output.push(output[start + i]);
                }
            }
        }
    }

    Ok(output)
}
