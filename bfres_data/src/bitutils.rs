use bfres_lib::DecodeError;
use bitvec::prelude::*;
use thiserror::Error;

/// Reads little endian bit fields from the start of a byte slice.
/// Bits are consumed from the least significant bit of each byte.
pub struct BitReader<'a> {
    bits: &'a BitSlice<u8, Lsb0>,
    index: usize,
}

#[derive(Debug, Error)]
pub enum BitReadError {
    #[error("Failed to read enough bits from reader.")]
    NotEnoughBits,
}

impl From<BitReadError> for DecodeError {
    fn from(_: BitReadError) -> Self {
        DecodeError::BitstreamOverrun
    }
}

impl<'a> BitReader<'a> {
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self {
            bits: bytes.view_bits::<Lsb0>(),
            index: 0,
        }
    }

    /// The number of bits read so far.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn set_position(&mut self, index: usize) {
        self.index = index;
    }

    /// Reads `bit_count` bits with the first bit read as the least significant bit.
    /// Reading 0 bits always succeeds and returns 0.
    pub fn read(&mut self, bit_count: usize) -> Result<u32, BitReadError> {
        if bit_count == 0 {
            return Ok(0);
        }
        if bit_count > 32 {
            return Err(BitReadError::NotEnoughBits);
        }

        let value: u32 = self
            .bits
            .get(self.index..self.index + bit_count)
            .ok_or(BitReadError::NotEnoughBits)?
            .load_le();
        self.index += bit_count;

        Ok(value)
    }

    /// Reads `bit_count` bits with the first bit read as the most significant bit.
    pub fn read_reversed(&mut self, bit_count: usize) -> Result<u32, BitReadError> {
        let mut value = 0;
        for _ in 0..bit_count {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool, BitReadError> {
        let value = self
            .bits
            .get(self.index)
            .as_deref()
            .copied()
            .ok_or(BitReadError::NotEnoughBits)?;

        self.index += 1;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_bits() {
        let data = [0b1011];
        let mut reader = BitReader::from_slice(&data);
        assert_eq!(true, reader.read_bit().unwrap());
        assert_eq!(true, reader.read_bit().unwrap());
        assert_eq!(false, reader.read_bit().unwrap());
        assert_eq!(true, reader.read_bit().unwrap());
        assert_eq!(4, reader.position());
    }

    #[test]
    fn read_across_bytes() {
        let data = [0b1100_0000, 0b0000_0101];
        let mut reader = BitReader::from_slice(&data);
        reader.set_position(6);
        assert_eq!(0b10111, reader.read(5).unwrap());
    }

    #[test]
    fn read_zero_bits() {
        let data = [0xFFu8; 16];
        let mut reader = BitReader::from_slice(&data);
        reader.read(32).unwrap();
        reader.read(32).unwrap();
        reader.read(32).unwrap();
        reader.read(32).unwrap();
        assert_eq!(0, reader.read(0).unwrap());
        assert_eq!(128, reader.position());
    }

    #[test]
    fn read_reversed() {
        let data = [0b0000_0001];
        let mut reader = BitReader::from_slice(&data);
        assert_eq!(0b100, reader.read_reversed(3).unwrap());
    }

    #[test]
    fn read_full_block() {
        // Each byte is its own index.
        let data: Vec<u8> = (0..16).collect();
        for n in [1, 7, 8, 13, 32] {
            let mut reader = BitReader::from_slice(&data);
            let first = reader.read(n).unwrap();

            let mut rest = Vec::new();
            while reader.position() < 128 {
                let count = (128 - reader.position()).min(32);
                rest.push((reader.read(count).unwrap(), count));
            }

            // Reassemble the bits in order.
            let mut bits = BitVec::<u8, Lsb0>::new();
            bits.extend((0..n).map(|i| first >> i & 1 == 1));
            for (value, count) in rest {
                bits.extend((0..count).map(|i| value >> i & 1 == 1));
            }
            assert_eq!(data, bits.into_vec());
        }
    }

    #[test]
    fn read_past_block() {
        let data = [0u8; 16];
        let mut reader = BitReader::from_slice(&data);
        reader.read(32).unwrap();
        reader.read(32).unwrap();
        reader.read(32).unwrap();
        reader.read(31).unwrap();
        assert!(matches!(reader.read(2), Err(BitReadError::NotEnoughBits)));
        assert_eq!(127, reader.position());
        reader.read_bit().unwrap();
        assert!(matches!(reader.read_bit(), Err(BitReadError::NotEnoughBits)));
    }

    #[test]
    fn convert_error() {
        assert!(matches!(
            DecodeError::from(BitReadError::NotEnoughBits),
            DecodeError::BitstreamOverrun
        ));
    }
}
