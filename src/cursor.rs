//! A bounds checked reader over an in memory file.
use std::io::{Read, Seek, SeekFrom};

use binread::{BinRead, BinReaderExt};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{DecodeError, Endian, PrefixedString};

/// Limits checked before allocating memory proportional to values declared in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadLimits {
    /// The largest decoded texture surface in bytes.
    pub max_surface_bytes: usize,
}

impl Default for LoadLimits {
    fn default() -> Self {
        Self {
            max_surface_bytes: 256 * 1024 * 1024,
        }
    }
}

/// The position an offset field is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetBase {
    /// The offset is relative to the start of the file.
    FileStart,
    /// The offset is relative to the position of the offset field itself.
    Field,
}

/// A seekable reader over a byte buffer with a runtime byte order.
///
/// Reads never go past the end of the buffer and fail with
/// [DecodeError::TruncatedInput] instead.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: u64,
    endian: Endian,
    limits: LoadLimits,
}

macro_rules! read_primitive {
    ($name:ident, $ty:ty, $size:expr, $read:ident) => {
        pub fn $name(&mut self) -> Result<$ty, DecodeError> {
            let bytes = self.read_bytes($size)?;
            Ok(match self.endian {
                Endian::Little => LittleEndian::$read(bytes),
                Endian::Big => BigEndian::$read(bytes),
            })
        }
    };
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            endian: Endian::Little,
            limits: LoadLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: LoadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> LoadLimits {
        self.limits
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// The entire underlying buffer regardless of the current position.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Moves to the absolute position `pos`.
    /// Positions past the end of the buffer are rejected.
    pub fn seek(&mut self, pos: u64) -> Result<(), DecodeError> {
        if pos > self.len() {
            return Err(self.truncated(pos));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: u64) -> Result<(), DecodeError> {
        self.seek(self.pos.saturating_add(count))
    }

    /// Reads `count` bytes without copying.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let start = self.pos as usize;
        let end = start
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.truncated(self.pos))?;

        self.pos = end as u64;
        Ok(&self.data[start..end])
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    read_primitive!(read_u16, u16, 2, read_u16);
    read_primitive!(read_i16, i16, 2, read_i16);
    read_primitive!(read_u32, u32, 4, read_u32);
    read_primitive!(read_i32, i32, 4, read_i32);
    read_primitive!(read_u64, u64, 8, read_u64);
    read_primitive!(read_f32, f32, 4, read_f32);

    /// Checks that the next bytes match `expected` and advances past them.
    pub fn read_signature(&mut self, expected: &[u8]) -> Result<(), DecodeError> {
        let offset = self.pos;
        let found = self.read_bytes(expected.len())?;
        if found != expected {
            return Err(DecodeError::SignatureMismatch {
                offset,
                expected: String::from_utf8_lossy(expected).into_owned(),
                found: String::from_utf8_lossy(found).into_owned(),
            });
        }
        Ok(())
    }

    /// Reads a 32 bit offset and returns the absolute position it designates.
    /// A stored value of 0 always means no offset and returns `None`.
    pub fn read_offset32(&mut self, base: OffsetBase) -> Result<Option<u64>, DecodeError> {
        let field_pos = self.pos;
        let value = self.read_u32()? as u64;
        Ok(match (value, base) {
            (0, _) => None,
            (value, OffsetBase::FileStart) => Some(value),
            (value, OffsetBase::Field) => Some(field_pos + value),
        })
    }

    /// Reads an absolute 64 bit offset.
    /// A stored value of 0 means no offset and returns `None`.
    pub fn read_offset64(&mut self) -> Result<Option<u64>, DecodeError> {
        let value = self.read_u64()?;
        Ok(if value == 0 { None } else { Some(value) })
    }

    /// Reads a string stored as a `u16` length followed by the characters.
    pub fn read_length_prefixed_string(&mut self) -> Result<String, DecodeError> {
        self.read_struct::<PrefixedString>().map(|s| s.0)
    }

    /// Reads the length prefixed string at `offset` without changing the position.
    /// An offset of `None` is an empty string.
    pub fn read_string_at(&mut self, offset: Option<u64>) -> Result<String, DecodeError> {
        match offset {
            Some(offset) => self.temporary_seek(offset, |r| r.read_length_prefixed_string()),
            None => Ok(String::new()),
        }
    }

    /// Reads a 64 bit string offset and then the string it points to.
    pub fn read_name(&mut self) -> Result<String, DecodeError> {
        let offset = self.read_offset64()?;
        self.read_string_at(offset)
    }

    /// Seeks to `pos`, runs `read`, and then restores the original position
    /// even if `read` fails.
    pub fn temporary_seek<T, F>(&mut self, pos: u64, read: F) -> Result<T, DecodeError>
    where
        F: FnOnce(&mut Self) -> Result<T, DecodeError>,
    {
        let saved_pos = self.pos;
        let result = self.seek(pos).and_then(|_| read(self));
        self.pos = saved_pos;
        result
    }

    /// Reads a [BinRead] type using the current byte order.
    pub fn read_struct<T: BinRead<Args = ()>>(&mut self) -> Result<T, DecodeError> {
        let start = self.pos;
        let result = match self.endian {
            Endian::Little => self.read_le::<T>(),
            Endian::Big => self.read_be::<T>(),
        };
        result.map_err(|e| {
            self.pos = start;
            DecodeError::from_binread(e, start, self.len())
        })
    }

    fn truncated(&self, offset: u64) -> DecodeError {
        DecodeError::TruncatedInput {
            offset,
            len: self.len(),
        }
    }
}

impl<'a> Read for ByteCursor<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let start = (self.pos as usize).min(self.data.len());
        let count = buf.len().min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        self.pos += count as u64;
        Ok(count)
    }
}

impl<'a> Seek for ByteCursor<'a> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(pos) => Some(pos),
            SeekFrom::End(offset) => offset_position(self.len(), offset),
            SeekFrom::Current(offset) => offset_position(self.pos, offset),
        };
        match new_pos {
            Some(new_pos) => {
                self.pos = new_pos;
                Ok(new_pos)
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

fn offset_position(base: u64, offset: i64) -> Option<u64> {
    if offset >= 0 {
        base.checked_add(offset as u64)
    } else {
        base.checked_sub(offset.unsigned_abs())
    }
}
