use thiserror::Error;

/// Errors while decoding BFRES, BNTX, or texture data.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The bytes at `offset` did not match the expected magic.
    #[error(
        "Expected signature {:?} at offset 0x{:X} but found {:?}.",
        expected,
        offset,
        found
    )]
    SignatureMismatch {
        offset: u64,
        expected: String,
        found: String,
    },

    /// A read starting at `offset` would go past the end of the `len` byte buffer.
    #[error(
        "Attempted to read past the end of the {} byte buffer at offset 0x{:X}.",
        len,
        offset
    )]
    TruncatedInput { offset: u64, len: u64 },

    /// A compressed block required more than its fixed 128 bits.
    #[error("Attempted to read past the end of the 128 bit block.")]
    BitstreamOverrun,

    /// The declared dimensions require more image data than was provided.
    #[error(
        "Compressed data is incomplete. Expected at least {} bytes but found {}.",
        expected,
        actual
    )]
    IncompleteData { expected: usize, actual: usize },

    /// A numeric format, type, or mode has no supported decoder.
    #[error("Unsupported {} 0x{:X}.", kind, value)]
    UnsupportedFormat { kind: &'static str, value: u32 },

    /// The file is structurally inconsistent.
    #[error("{0}")]
    MalformedFile(String),

    /// The input does not start with a recognized file signature.
    #[error("Unsupported file type with magic {:?}.", magic)]
    UnsupportedFileType { magic: [u8; 4] },
}

impl DecodeError {
    /// Returns `true` if the error only invalidates the resource being decoded
    /// and decoding the remaining resources of the file can continue.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            DecodeError::SignatureMismatch { .. } | DecodeError::UnsupportedFileType { .. }
        )
    }

    pub(crate) fn from_binread(error: binread::Error, offset: u64, len: u64) -> Self {
        match error {
            binread::Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                DecodeError::TruncatedInput { offset, len }
            }
            // The expected magic is not part of the binread error.
            binread::Error::BadMagic { pos, found } => DecodeError::MalformedFile(format!(
                "Unexpected magic {:?} at offset 0x{:X}.",
                found, pos
            )),
            e => DecodeError::MalformedFile(format!(
                "Failed to read data at offset 0x{:X}: {}",
                offset, e
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binread_bad_magic() {
        let error = binread::Error::BadMagic {
            pos: 0x10,
            found: Box::new(0x4C444D46u32),
        };
        let error = DecodeError::from_binread(error, 0x10, 0x20);
        assert_eq!(
            "Unexpected magic 1279544646 at offset 0x10.",
            error.to_string()
        );
    }

    #[test]
    fn binread_eof() {
        let error = binread::Error::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(matches!(
            DecodeError::from_binread(error, 4, 6),
            DecodeError::TruncatedInput { offset: 4, len: 6 }
        ));
    }
}
