//! The FMDL model with its vertex buffers and shapes.
//!
//! Vertex and index data offsets are relative to the buffer region of the
//! [ResFile](super::bfres::ResFile) and are resolved on demand,
//! so a bad offset only invalidates the shape that uses it.
use std::ops::Range;

use binread::BinRead;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::material::Material;
use super::skeleton::Skeleton;
use super::BlockHeader;
use crate::loader::{load_array, load_dict, load_values, Loadable, ResMap};
use crate::{ByteCursor, DecodeError, Endian};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub header: BlockHeader,
    pub name: String,
    pub path: String,
    pub skeleton: Skeleton,
    pub vertex_buffers: Vec<VertexBuffer>,
    pub shapes: ResMap<Shape>,
    pub materials: ResMap<Material>,
    pub user_data_count: u16,
    pub total_vertex_count: u32,
}

impl Loadable for Model {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let header = BlockHeader::read(reader, b"FMDL")?;
        let name = reader.read_name()?;
        let path = reader.read_name()?;
        let skeleton_offset = reader.read_offset64()?;
        let vertex_buffer_array = reader.read_offset64()?;
        let shape_array = reader.read_offset64()?;
        let shape_dict = reader.read_offset64()?;
        let material_array = reader.read_offset64()?;
        let material_dict = reader.read_offset64()?;
        // User data and the user pointer.
        reader.skip(24)?;
        let vertex_buffer_count = reader.read_u16()? as usize;
        let shape_count = reader.read_u16()? as usize;
        let material_count = reader.read_u16()? as usize;
        let user_data_count = reader.read_u16()?;
        let total_vertex_count = reader.read_u32()?;
        reader.skip(4)?;

        let skeleton = match skeleton_offset {
            Some(offset) => reader.temporary_seek(offset, Skeleton::load)?,
            None => {
                return Err(DecodeError::MalformedFile(format!(
                    "Model {:?} does not have a skeleton.",
                    name
                )))
            }
        };
        let vertex_buffers = load_array(reader, vertex_buffer_array, vertex_buffer_count)?;
        let shapes: ResMap<Shape> = load_dict(reader, shape_array, shape_dict, shape_count)?;
        let materials: ResMap<Material> =
            load_dict(reader, material_array, material_dict, material_count)?;

        for shape in shapes.values() {
            if shape.material_index as usize >= materials.len() {
                return Err(DecodeError::MalformedFile(format!(
                    "Shape {:?} references material {} but model {:?} has {} materials.",
                    shape.name,
                    shape.material_index,
                    name,
                    materials.len()
                )));
            }
            if shape.vertex_buffer_index as usize >= vertex_buffers.len() {
                return Err(DecodeError::MalformedFile(format!(
                    "Shape {:?} references vertex buffer {} but model {:?} has {} vertex buffers.",
                    shape.name,
                    shape.vertex_buffer_index,
                    name,
                    vertex_buffers.len()
                )));
            }
        }

        Ok(Self {
            header,
            name,
            path,
            skeleton,
            vertex_buffers,
            shapes,
            materials,
            user_data_count,
            total_vertex_count,
        })
    }
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSize {
    pub size: u32,
    #[br(pad_after = 8)]
    pub flags: u32,
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStride {
    #[br(pad_after = 12)]
    pub stride: u32,
}

/// A set of vertex attributes interleaved across one or more buffers.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBuffer {
    pub header: BlockHeader,
    pub attributes: ResMap<Attribute>,
    pub buffer_sizes: Vec<BufferSize>,
    pub buffer_strides: Vec<BufferStride>,
    /// The start of the first buffer relative to the buffer region.
    pub buffer_offset: u32,
    pub index: u16,
    pub vertex_count: u32,
    pub vertex_skin_count: u8,
}

impl VertexBuffer {
    /// The byte range of each buffer relative to the buffer region.
    /// Buffers are stored consecutively with each start aligned to 8 bytes.
    pub fn buffer_ranges(&self) -> Vec<Range<usize>> {
        let mut offset = self.buffer_offset as usize;
        self.buffer_sizes
            .iter()
            .map(|s| {
                let start = (offset + 7) & !7;
                offset = start + s.size as usize;
                start..offset
            })
            .collect()
    }

    /// The bytes of buffer `index` in the file's buffer `region`.
    pub fn buffer<'b>(&self, index: usize, region: &'b [u8]) -> Result<&'b [u8], DecodeError> {
        let range = self.buffer_ranges().into_iter().nth(index).ok_or_else(|| {
            DecodeError::MalformedFile(format!(
                "Buffer index {} is out of range for {} buffers.",
                index,
                self.buffer_sizes.len()
            ))
        })?;
        slice_region(region, range)
    }

    pub fn stride(&self, index: usize) -> Option<u32> {
        self.buffer_strides.get(index).map(|s| s.stride)
    }
}

impl Loadable for VertexBuffer {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let header = BlockHeader::read(reader, b"FVTX")?;
        let attribute_array = reader.read_offset64()?;
        let attribute_dict = reader.read_offset64()?;
        // Memory pool, runtime buffers, and user buffers.
        reader.skip(24)?;
        let buffer_size_array = reader.read_offset64()?;
        let buffer_stride_array = reader.read_offset64()?;
        reader.skip(8)?;
        let buffer_offset = reader.read_u32()?;
        let attribute_count = reader.read_u8()? as usize;
        let buffer_count = reader.read_u8()? as usize;
        let index = reader.read_u16()?;
        let vertex_count = reader.read_u32()?;
        let vertex_skin_count = reader.read_u8()?;
        reader.skip(3)?;

        let attributes = load_dict(reader, attribute_array, attribute_dict, attribute_count)?;
        let buffer_sizes = load_values(reader, buffer_size_array, buffer_count)?;
        let buffer_strides = load_values(reader, buffer_stride_array, buffer_count)?;

        Ok(Self {
            header,
            attributes,
            buffer_sizes,
            buffer_strides,
            buffer_offset,
            index,
            vertex_count,
            vertex_skin_count,
        })
    }
}

/// A named vertex attribute such as `_p0` for positions or `_u0` for texture coordinates.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// The pack pattern in the low byte and flags in the high byte.
    pub format: u16,
    /// The offset in bytes from the start of each vertex.
    pub offset: u16,
    pub buffer_index: u8,
}

impl Loadable for Attribute {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let name = reader.read_name()?;
        let format = reader.read_u16()?;
        reader.skip(2)?;
        let offset = reader.read_u16()?;
        let buffer_index = reader.read_u8()?;
        reader.skip(1)?;
        Ok(Self {
            name,
            format,
            offset,
            buffer_index,
        })
    }
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub header: BlockHeader,
    pub name: String,
    /// The level of detail meshes with the most detailed mesh first.
    pub meshes: Vec<Mesh>,
    pub skin_bone_indices: Vec<u16>,
    pub flags: u32,
    pub index: u16,
    pub material_index: u16,
    /// The bone for shapes without skinning.
    pub bone_index: u16,
    pub vertex_buffer_index: u16,
    /// The number of bone influences per vertex.
    pub vertex_skin_count: u8,
    pub key_shape_count: u8,
    pub target_attribute_count: u8,
}

impl Loadable for Shape {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let header = BlockHeader::read(reader, b"FSHP")?;
        let name = reader.read_name()?;
        // The vertex buffer is also identified by index.
        reader.skip(8)?;
        let mesh_array = reader.read_offset64()?;
        let skin_bone_index_array = reader.read_offset64()?;
        // Key shapes, bounding boxes, bounding radii, and the user pointer.
        reader.skip(40)?;
        let flags = reader.read_u32()?;
        let index = reader.read_u16()?;
        let material_index = reader.read_u16()?;
        let bone_index = reader.read_u16()?;
        let vertex_buffer_index = reader.read_u16()?;
        let skin_bone_index_count = reader.read_u16()? as usize;
        let vertex_skin_count = reader.read_u8()?;
        let mesh_count = reader.read_u8()? as usize;
        let key_shape_count = reader.read_u8()?;
        let target_attribute_count = reader.read_u8()?;
        reader.skip(6)?;

        let meshes = load_array(reader, mesh_array, mesh_count)?;
        let skin_bone_indices = load_values(reader, skin_bone_index_array, skin_bone_index_count)?;

        Ok(Self {
            header,
            name,
            meshes,
            skin_bone_indices,
            flags,
            index,
            material_index,
            bone_index,
            vertex_buffer_index,
            vertex_skin_count,
            key_shape_count,
            target_attribute_count,
        })
    }
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineStrip,
    Triangles,
}

impl PrimitiveType {
    /// The number of indices to advance for each primitive.
    pub fn step(&self) -> usize {
        match self {
            PrimitiveType::Points => 1,
            PrimitiveType::Lines => 2,
            PrimitiveType::LineStrip => 1,
            PrimitiveType::Triangles => 3,
        }
    }

    /// The number of vertices in each primitive.
    pub fn vertices_per_primitive(&self) -> usize {
        match self {
            PrimitiveType::Points => 1,
            PrimitiveType::Lines => 2,
            PrimitiveType::LineStrip => 2,
            PrimitiveType::Triangles => 3,
        }
    }
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    UInt16,
    UInt32,
}

impl IndexFormat {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            IndexFormat::UInt16 => 2,
            IndexFormat::UInt32 => 4,
        }
    }
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMesh {
    pub offset: u32,
    pub count: u32,
}

/// A single level of detail for a [Shape].
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub sub_meshes: Vec<SubMesh>,
    /// The start of the index buffer relative to the buffer region.
    pub index_buffer_offset: u32,
    pub primitive_type: u32,
    pub index_format: u32,
    pub index_count: u32,
    /// The value added to every index.
    pub first_vertex: u32,
}

impl Mesh {
    pub fn primitive_type(&self) -> Result<PrimitiveType, DecodeError> {
        match self.primitive_type {
            0 => Ok(PrimitiveType::Points),
            1 => Ok(PrimitiveType::Lines),
            2 => Ok(PrimitiveType::LineStrip),
            3 => Ok(PrimitiveType::Triangles),
            value => Err(DecodeError::UnsupportedFormat {
                kind: "primitive type",
                value,
            }),
        }
    }

    pub fn index_format(&self) -> Result<IndexFormat, DecodeError> {
        match self.index_format {
            1 => Ok(IndexFormat::UInt16),
            2 => Ok(IndexFormat::UInt32),
            value => Err(DecodeError::UnsupportedFormat {
                kind: "index format",
                value,
            }),
        }
    }

    /// The raw index buffer bytes in the file's buffer `region`.
    pub fn index_buffer<'b>(&self, region: &'b [u8]) -> Result<&'b [u8], DecodeError> {
        let format = self.index_format()?;
        let start = self.index_buffer_offset as usize;
        let size = (self.index_count as usize)
            .checked_mul(format.size_in_bytes())
            .ok_or_else(|| {
                DecodeError::MalformedFile(format!(
                    "Index count {} is too large.",
                    self.index_count
                ))
            })?;
        slice_region(region, start..start.saturating_add(size))
    }

    /// Decodes the index buffer using the file's byte order.
    /// The values do not include [Mesh::first_vertex].
    pub fn indices(&self, region: &[u8], endian: Endian) -> Result<Vec<u32>, DecodeError> {
        let bytes = self.index_buffer(region)?;
        let indices = match (self.index_format()?, endian) {
            (IndexFormat::UInt16, Endian::Little) => bytes
                .chunks_exact(2)
                .map(|b| LittleEndian::read_u16(b) as u32)
                .collect(),
            (IndexFormat::UInt16, Endian::Big) => bytes
                .chunks_exact(2)
                .map(|b| BigEndian::read_u16(b) as u32)
                .collect(),
            (IndexFormat::UInt32, Endian::Little) => {
                bytes.chunks_exact(4).map(LittleEndian::read_u32).collect()
            }
            (IndexFormat::UInt32, Endian::Big) => {
                bytes.chunks_exact(4).map(BigEndian::read_u32).collect()
            }
        };
        Ok(indices)
    }
}

impl Loadable for Mesh {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let sub_mesh_array = reader.read_offset64()?;
        // Memory pool, buffer, and buffer size pointers.
        reader.skip(24)?;
        let index_buffer_offset = reader.read_u32()?;
        let primitive_type = reader.read_u32()?;
        let index_format = reader.read_u32()?;
        let index_count = reader.read_u32()?;
        let first_vertex = reader.read_u32()?;
        let sub_mesh_count = reader.read_u16()? as usize;
        reader.skip(2)?;

        let sub_meshes = load_values(reader, sub_mesh_array, sub_mesh_count)?;

        Ok(Self {
            sub_meshes,
            index_buffer_offset,
            primitive_type,
            index_format,
            index_count,
            first_vertex,
        })
    }
}

fn slice_region(region: &[u8], range: Range<usize>) -> Result<&[u8], DecodeError> {
    region.get(range.clone()).ok_or_else(|| {
        DecodeError::MalformedFile(format!(
            "Buffer range 0x{:X}..0x{:X} exceeds the buffer region of {} bytes.",
            range.start,
            range.end,
            region.len()
        ))
    })
}
