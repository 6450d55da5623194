//! Vertex attribute formats and decoding of interleaved vertex buffers.
//!
//! The 16 bit format code stores the pack pattern in the low byte and [FormatCode] flags in the high byte.
//! Plain integer formats are normalized unless the INTEGER or SCALED flags are set.
use std::convert::TryFrom;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use modular_bitfield::prelude::*;

use bfres_lib::formats::model::{Attribute, VertexBuffer};
use bfres_lib::{DecodeError, Endian};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[bitfield(bits = 16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCode {
    pub pattern: B8,
    pub integer: bool,
    pub signed: bool,
    pub degamma: bool,
    pub scaled: bool,
    #[skip]
    __: B4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    Byte,
    Short,
    Int,
    Float,
}

impl ComponentType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ComponentType::Byte => 1,
            ComponentType::Short => 2,
            ComponentType::Int => 4,
            ComponentType::Float => 4,
        }
    }
}

/// Special encodings that do not store one value per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    None,
    /// Two 4 bit values per byte with the low nibble first.
    Nibbles,
    /// Half precision floats without infinity or NaN.
    ArmHalf,
    /// Three signed 10 bit values and an unsigned 2 bit value.
    Signed10_10_10_2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeFormat {
    pub code: FormatCode,
    pub component_type: ComponentType,
    /// The number of stored values of [AttributeFormat::component_type].
    pub count: usize,
    pub packing: Packing,
    /// `true` if integer components use two's complement.
    pub signed: bool,
}

impl TryFrom<u16> for AttributeFormat {
    type Error = DecodeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let code = FormatCode::from_bytes(value.to_le_bytes());
        let (component_type, count, packing) = match code.pattern() {
            0x00 => (ComponentType::Byte, 1, Packing::None),
            0x01 => (ComponentType::Byte, 1, Packing::Nibbles),
            0x02 => (ComponentType::Short, 1, Packing::None),
            0x03 => (ComponentType::Short, 1, Packing::ArmHalf),
            0x04 => (ComponentType::Byte, 2, Packing::None),
            0x05 => (ComponentType::Int, 1, Packing::None),
            0x06 => (ComponentType::Float, 1, Packing::None),
            0x07 => (ComponentType::Short, 2, Packing::None),
            0x08 => (ComponentType::Short, 2, Packing::ArmHalf),
            0x0A => (ComponentType::Byte, 4, Packing::None),
            0x0B => (ComponentType::Int, 1, Packing::Signed10_10_10_2),
            0x0C => (ComponentType::Int, 2, Packing::None),
            0x0D => (ComponentType::Float, 2, Packing::None),
            0x0E => (ComponentType::Short, 4, Packing::None),
            0x0F => (ComponentType::Short, 4, Packing::ArmHalf),
            0x10 => (ComponentType::Int, 3, Packing::None),
            0x11 => (ComponentType::Float, 3, Packing::None),
            0x12 => (ComponentType::Int, 4, Packing::None),
            0x13 => (ComponentType::Float, 4, Packing::None),
            // 0x09 is 10-11-11 packed floats.
            _ => {
                return Err(DecodeError::UnsupportedFormat {
                    kind: "attribute format",
                    value: value as u32,
                })
            }
        };

        Ok(Self {
            code,
            component_type,
            count,
            packing,
            signed: code.signed() && packing == Packing::None,
        })
    }
}

impl AttributeFormat {
    /// The size of the attribute for a single vertex.
    pub fn size_in_bytes(&self) -> usize {
        self.component_type.size_in_bytes() * self.count
    }

    /// The number of decoded values for each vertex.
    pub fn component_count(&self) -> usize {
        match self.packing {
            Packing::Nibbles => self.count * 2,
            Packing::Signed10_10_10_2 => 4,
            _ => self.count,
        }
    }

    /// The minimum and maximum stored values for plain integer formats.
    pub fn range(&self) -> Option<(f64, f64)> {
        if self.packing != Packing::None {
            return None;
        }
        match (self.component_type, self.signed) {
            (ComponentType::Byte, false) => Some((0.0, 255.0)),
            (ComponentType::Byte, true) => Some((-128.0, 127.0)),
            (ComponentType::Short, false) => Some((0.0, 65535.0)),
            (ComponentType::Short, true) => Some((-32768.0, 32767.0)),
            (ComponentType::Int, false) => Some((0.0, u32::MAX as f64)),
            (ComponentType::Int, true) => Some((i32::MIN as f64, i32::MAX as f64)),
            (ComponentType::Float, _) => None,
        }
    }

    fn is_normalized(&self) -> bool {
        !self.code.integer() && !self.code.scaled()
    }

    /// Decodes a single vertex from `bytes` and appends the values to `values`.
    pub(crate) fn read(&self, bytes: &[u8], endian: Endian, values: &mut Vec<f32>) {
        match self.packing {
            Packing::Nibbles => {
                for b in &bytes[..self.count] {
                    for nibble in [b & 0xF, b >> 4] {
                        if self.code.integer() {
                            values.push(nibble as f32);
                        } else {
                            values.push(nibble as f32 / 15.0);
                        }
                    }
                }
            }
            Packing::ArmHalf => {
                for chunk in bytes[..self.size_in_bytes()].chunks_exact(2) {
                    values.push(arm_half(read_u16(chunk, endian)));
                }
            }
            Packing::Signed10_10_10_2 => {
                values.extend_from_slice(&unpack_10_10_10_2(read_u32(bytes, endian)));
            }
            Packing::None => {
                let size = self.component_type.size_in_bytes();
                for chunk in bytes[..self.size_in_bytes()].chunks_exact(size) {
                    values.push(self.read_component(chunk, endian));
                }
            }
        }
    }

    fn read_component(&self, bytes: &[u8], endian: Endian) -> f32 {
        let value = match (self.component_type, self.signed) {
            (ComponentType::Byte, false) => bytes[0] as f64,
            (ComponentType::Byte, true) => bytes[0] as i8 as f64,
            (ComponentType::Short, false) => read_u16(bytes, endian) as f64,
            (ComponentType::Short, true) => read_u16(bytes, endian) as i16 as f64,
            (ComponentType::Int, false) => read_u32(bytes, endian) as f64,
            (ComponentType::Int, true) => read_u32(bytes, endian) as i32 as f64,
            (ComponentType::Float, _) => return f32::from_bits(read_u32(bytes, endian)),
        };

        match self.range() {
            Some((min, max)) if self.is_normalized() => {
                if self.signed && value == min {
                    -1.0
                } else {
                    (value / max) as f32
                }
            }
            _ => value as f32,
        }
    }
}

fn read_u16(bytes: &[u8], endian: Endian) -> u16 {
    match endian {
        Endian::Little => LittleEndian::read_u16(bytes),
        Endian::Big => BigEndian::read_u16(bytes),
    }
}

fn read_u32(bytes: &[u8], endian: Endian) -> u32 {
    match endian {
        Endian::Little => LittleEndian::read_u32(bytes),
        Endian::Big => BigEndian::read_u32(bytes),
    }
}

/// Decodes a half float where exponent 0 is denormalized and the maximum exponent is finite.
pub fn arm_half(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1F) as i32;
    let fraction = (bits & 0x3FF) as f32 / 1024.0;
    if exponent == 0 {
        sign * 2f32.powi(-14) * fraction
    } else {
        sign * 2f32.powi(exponent - 15) * (1.0 + fraction)
    }
}

/// Decodes three signed normalized 10 bit values and an unnormalized 2 bit value.
pub fn unpack_10_10_10_2(value: u32) -> [f32; 4] {
    let mut output = [0.0; 4];
    for (i, component) in output.iter_mut().take(3).enumerate() {
        let bits = value >> (10 * i);
        let mut v = (bits & 0x1FF) as i32;
        if bits & 0x200 != 0 {
            v -= 512;
        }
        *component = v.max(-511) as f32 / 511.0;
    }
    output[3] = (value >> 30) as f32;
    output
}

/// Decoded values for each vertex with 1 to 4 components.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    Vector1(Vec<f32>),
    Vector2(Vec<[f32; 2]>),
    Vector3(Vec<[f32; 3]>),
    Vector4(Vec<[f32; 4]>),
}

impl VectorData {
    fn from_flat(values: &[f32], component_count: usize) -> Self {
        match component_count {
            1 => VectorData::Vector1(values.to_vec()),
            2 => VectorData::Vector2(values.chunks_exact(2).map(|v| [v[0], v[1]]).collect()),
            3 => VectorData::Vector3(
                values
                    .chunks_exact(3)
                    .map(|v| [v[0], v[1], v[2]])
                    .collect(),
            ),
            _ => VectorData::Vector4(
                values
                    .chunks_exact(4)
                    .map(|v| [v[0], v[1], v[2], v[3]])
                    .collect(),
            ),
        }
    }

    /// The number of vectors.
    pub fn len(&self) -> usize {
        match self {
            VectorData::Vector1(v) => v.len(),
            VectorData::Vector2(v) => v.len(),
            VectorData::Vector3(v) => v.len(),
            VectorData::Vector4(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn component_count(&self) -> usize {
        match self {
            VectorData::Vector1(_) => 1,
            VectorData::Vector2(_) => 2,
            VectorData::Vector3(_) => 3,
            VectorData::Vector4(_) => 4,
        }
    }

    /// Pads the data to 4 components with missing components set to 0 and `w`.
    /// Existing w components are kept.
    pub fn to_vec4_with_w(&self, w: f32) -> Vec<[f32; 4]> {
        match self {
            VectorData::Vector1(data) => data.iter().map(|x| [*x, 0.0, 0.0, w]).collect(),
            VectorData::Vector2(data) => data.iter().map(|[x, y]| [*x, *y, 0.0, w]).collect(),
            VectorData::Vector3(data) => data.iter().map(|[x, y, z]| [*x, *y, *z, w]).collect(),
            VectorData::Vector4(data) => data.clone(),
        }
    }

    /// Keeps only the vectors in `range`.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        match self {
            VectorData::Vector1(v) => VectorData::Vector1(v[range].to_vec()),
            VectorData::Vector2(v) => VectorData::Vector2(v[range].to_vec()),
            VectorData::Vector3(v) => VectorData::Vector3(v[range].to_vec()),
            VectorData::Vector4(v) => VectorData::Vector4(v[range].to_vec()),
        }
    }
}

/// Decodes `attribute` for every vertex in `vertex_buffer`.
/// Buffer offsets are resolved against the file's buffer `region`.
pub fn read_attribute(
    vertex_buffer: &VertexBuffer,
    attribute: &Attribute,
    region: &[u8],
    endian: Endian,
) -> Result<VectorData, DecodeError> {
    let format = AttributeFormat::try_from(attribute.format)?;
    let buffer_index = attribute.buffer_index as usize;
    let buffer = vertex_buffer.buffer(buffer_index, region)?;
    let stride = vertex_buffer.stride(buffer_index).ok_or_else(|| {
        DecodeError::MalformedFile(format!(
            "Attribute {:?} has no stride for buffer {}.",
            attribute.name, buffer_index
        ))
    })? as usize;

    let size = format.size_in_bytes();
    let offset = attribute.offset as usize;
    let vertex_count = vertex_buffer.vertex_count as usize;
    check_attribute_extent(attribute, vertex_count, stride, size, buffer.len())?;

    // The vertex count is now bounded by the buffer length.
    let mut values = Vec::with_capacity(vertex_count * format.component_count());
    for i in 0..vertex_count {
        let start = i * stride + offset;
        let bytes = buffer.get(start..start + size).ok_or_else(|| {
            DecodeError::MalformedFile(format!(
                "Attribute {:?} for vertex {} is out of range for buffer {} with {} bytes.",
                attribute.name,
                i,
                buffer_index,
                buffer.len()
            ))
        })?;
        format.read(bytes, endian, &mut values);
    }

    Ok(VectorData::from_flat(&values, format.component_count()))
}

/// Checks that the last vertex of `attribute` ends within the buffer.
/// A stride of 0 is only valid for a single vertex.
fn check_attribute_extent(
    attribute: &Attribute,
    vertex_count: usize,
    stride: usize,
    size: usize,
    buffer_len: usize,
) -> Result<(), DecodeError> {
    if vertex_count == 0 {
        return Ok(());
    }
    if stride == 0 && vertex_count > 1 {
        return Err(DecodeError::MalformedFile(format!(
            "Attribute {:?} has a stride of 0 for {} vertices.",
            attribute.name, vertex_count
        )));
    }

    let end = (vertex_count - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(attribute.offset as usize))
        .and_then(|v| v.checked_add(size));
    match end {
        Some(end) if end <= buffer_len => Ok(()),
        _ => Err(DecodeError::MalformedFile(format!(
            "Attribute {:?} for {} vertices with stride {} does not fit in {} bytes.",
            attribute.name, vertex_count, stride, buffer_len
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bfres_lib::formats::model::{BufferSize, BufferStride};
    use bfres_lib::formats::BlockHeader;
    use bfres_lib::loader::ResMap;

    fn read(code: u16, bytes: &[u8]) -> Vec<f32> {
        let format = AttributeFormat::try_from(code).unwrap();
        let mut values = Vec::new();
        format.read(bytes, Endian::Little, &mut values);
        values
    }

    #[test]
    fn format_flags() {
        let format = AttributeFormat::try_from(0x20A).unwrap();
        assert_eq!(0x0A, format.code.pattern());
        assert!(format.code.signed());
        assert!(!format.code.integer());
        assert!(format.signed);
        assert_eq!(4, format.count);
        assert_eq!(4, format.size_in_bytes());
        assert_eq!(Some((-128.0, 127.0)), format.range());

        let format = AttributeFormat::try_from(0x90E).unwrap();
        assert!(format.code.integer());
        assert!(format.code.scaled());
        assert!(!format.signed);
        assert_eq!(Some((0.0, 65535.0)), format.range());
    }

    #[test]
    fn unsupported_formats() {
        assert!(matches!(
            AttributeFormat::try_from(0x09),
            Err(DecodeError::UnsupportedFormat { value: 0x09, .. })
        ));
        assert!(AttributeFormat::try_from(0x14).is_err());
    }

    #[test]
    fn unorm8x4() {
        assert_eq!(vec![0.0, 1.0, 0.2, 0.6], read(0x0A, &[0, 255, 51, 153]));
    }

    #[test]
    fn snorm8x2_minimum() {
        // The minimum maps to -1 rather than -128 / 127.
        assert_eq!(vec![-1.0, -1.0], read(0x204, &[0x80, 0x81]));
    }

    #[test]
    fn uint16_integer_not_normalized() {
        assert_eq!(vec![3.0, 65535.0], read(0x107, &[3, 0, 255, 255]));
    }

    #[test]
    fn nibbles() {
        assert_eq!(vec![1.0, 0.0], read(0x01, &[0x0F]));
        assert_eq!(vec![15.0, 0.0], read(0x101, &[0x0F]));
    }

    #[test]
    fn floats_not_normalized() {
        let bytes = [0x00, 0x00, 0x80, 0x3F, 0x00, 0x00, 0x20, 0x41];
        assert_eq!(vec![1.0, 10.0], read(0x0D, &bytes));
        assert_eq!(vec![1.0, 10.0], read(0x20D, &bytes));
    }

    #[test]
    fn big_endian_shorts() {
        let format = AttributeFormat::try_from(0x107).unwrap();
        let mut values = Vec::new();
        format.read(&[0, 3, 1, 0], Endian::Big, &mut values);
        assert_eq!(vec![3.0, 256.0], values);
    }

    #[test]
    fn arm_half_values() {
        assert_eq!(1.0, arm_half(0x3C00));
        assert_eq!(-2.0, arm_half(0xC000));
        assert_eq!(0.0, arm_half(0x0000));
        // Exponent 0 is denormalized.
        assert_relative_eq!(2f32.powi(-14) * 0.5, arm_half(0x0200));
        // The maximum exponent is a finite value.
        assert_eq!(65536.0, arm_half(0x7C00));
    }

    #[test]
    fn arm_half_attribute() {
        assert_eq!(vec![1.0, 0.5], read(0x08, &[0x00, 0x3C, 0x00, 0x38]));
    }

    #[test]
    fn packed_10_10_10_2() {
        // A set sign bit with magnitude 511 is exactly -1.
        assert_eq!([-1.0, 0.0, 0.0, 0.0], unpack_10_10_10_2(0x201));
        // -512 is clamped to -1.
        assert_eq!([-1.0, 0.0, 0.0, 0.0], unpack_10_10_10_2(0x200));
        assert_eq!([0.0, 0.0, 0.0, 0.0], unpack_10_10_10_2(0));
        assert_eq!([0.0, 1.0, 0.0, 3.0], unpack_10_10_10_2(0xC007_FC00));
    }

    #[test]
    fn packed_attribute_components() {
        let format = AttributeFormat::try_from(0x20B).unwrap();
        assert_eq!(4, format.component_count());
        assert_eq!(4, format.size_in_bytes());
        assert!(!format.signed);
        assert_eq!(None, format.range());
    }

    fn vertex_buffer(stride: u32, vertex_count: u32) -> VertexBuffer {
        VertexBuffer {
            header: BlockHeader {
                next_block: None,
                size: 0,
            },
            attributes: ResMap::default(),
            buffer_sizes: vec![BufferSize {
                size: stride * vertex_count,
                flags: 0,
            }],
            buffer_strides: vec![BufferStride { stride }],
            buffer_offset: 8,
            index: 0,
            vertex_count,
            vertex_skin_count: 0,
        }
    }

    #[test]
    fn read_interleaved_attribute() {
        let mut region = vec![0xFFu8; 8];
        // Two vertices with a float2 at offset 0 and bytes at offset 8.
        for (x, y, b) in [(1.0f32, 2.0f32, 255u8), (3.0, 4.0, 0)] {
            region.extend_from_slice(&x.to_le_bytes());
            region.extend_from_slice(&y.to_le_bytes());
            region.extend_from_slice(&[b, 0, 0, 0]);
        }

        let buffer = vertex_buffer(12, 2);
        let position = Attribute {
            name: "_u0".to_string(),
            format: 0x0D,
            offset: 0,
            buffer_index: 0,
        };
        assert_eq!(
            VectorData::Vector2(vec![[1.0, 2.0], [3.0, 4.0]]),
            read_attribute(&buffer, &position, &region, Endian::Little).unwrap()
        );

        let color = Attribute {
            name: "_c0".to_string(),
            format: 0x00,
            offset: 8,
            buffer_index: 0,
        };
        assert_eq!(
            VectorData::Vector1(vec![1.0, 0.0]),
            read_attribute(&buffer, &color, &region, Endian::Little).unwrap()
        );
    }

    #[test]
    fn read_attribute_out_of_range() {
        let region = vec![0u8; 8 + 12];
        // The buffer is too small for the declared vertex count.
        let mut buffer = vertex_buffer(12, 2);
        buffer.buffer_sizes[0].size = 12;

        let attribute = Attribute {
            name: "_p0".to_string(),
            format: 0x11,
            offset: 0,
            buffer_index: 0,
        };
        assert!(matches!(
            read_attribute(&buffer, &attribute, &region, Endian::Little),
            Err(DecodeError::MalformedFile(_))
        ));
    }

    #[test]
    fn read_attribute_vertex_count_too_large() {
        let region = vec![0u8; 8 + 12];
        let mut buffer = vertex_buffer(12, 1);
        buffer.vertex_count = u32::MAX;

        let attribute = Attribute {
            name: "_p0".to_string(),
            format: 0x11,
            offset: 0,
            buffer_index: 0,
        };
        assert!(matches!(
            read_attribute(&buffer, &attribute, &region, Endian::Little),
            Err(DecodeError::MalformedFile(_))
        ));
    }

    #[test]
    fn read_attribute_zero_stride() {
        let region = vec![0u8; 8 + 12];
        let mut buffer = vertex_buffer(12, 1);
        buffer.buffer_strides[0].stride = 0;
        buffer.vertex_count = 30_000_000;

        let attribute = Attribute {
            name: "_p0".to_string(),
            format: 0x11,
            offset: 0,
            buffer_index: 0,
        };
        assert!(matches!(
            read_attribute(&buffer, &attribute, &region, Endian::Little),
            Err(DecodeError::MalformedFile(_))
        ));

        // A single vertex does not need a stride.
        buffer.vertex_count = 1;
        assert_eq!(
            VectorData::Vector3(vec![[0.0, 0.0, 0.0]]),
            read_attribute(&buffer, &attribute, &region, Endian::Little).unwrap()
        );
    }

    #[test]
    fn vector_data_to_vec4() {
        let data = VectorData::Vector3(vec![[1.0, 2.0, 3.0]]);
        assert_eq!(vec![[1.0, 2.0, 3.0, 1.0]], data.to_vec4_with_w(1.0));
        assert_eq!(1, data.len());
        assert_eq!(3, data.component_count());
    }
}
