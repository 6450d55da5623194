//! The FSKL skeleton and its bones.
use std::convert::TryFrom;

use modular_bitfield::prelude::*;

use super::BlockHeader;
use crate::loader::{load_dict, load_values, Loadable, ResMap};
use crate::{ByteCursor, DecodeError, Matrix3x4, Vector3, Vector4};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

/// How a bone stores its rotation.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationMode {
    /// A quaternion stored as x, y, z, w.
    Quaternion,
    /// Euler angles in radians applied in X, Y, Z order.
    EulerXyz,
}

impl From<u8> for RotationMode {
    fn from(value: u8) -> Self {
        match value {
            1 => RotationMode::EulerXyz,
            _ => RotationMode::Quaternion,
        }
    }
}

#[bitfield(bits = 32)]
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkeletonFlags {
    #[skip]
    __: B8,
    pub scaling_mode: B2,
    #[skip]
    __: B2,
    pub rotation_mode: B2,
    #[skip]
    __: B18,
}

#[bitfield(bits = 32)]
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneFlags {
    pub visible: bool,
    #[skip]
    __: B11,
    pub rotation_mode: B2,
    #[skip]
    __: B18,
}

/// A single bone with its transform relative to the parent bone.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub index: u16,
    /// The index of the parent bone or -1 for root bones.
    pub parent_index: i16,
    pub smooth_matrix_index: i16,
    pub rigid_matrix_index: i16,
    pub billboard_index: i16,
    pub user_data_count: u16,
    pub flags: BoneFlags,
    pub scale: Vector3,
    /// A quaternion or Euler angles depending on [Bone::rotation_mode].
    pub rotation: Vector4,
    pub translation: Vector3,
}

impl Bone {
    pub fn rotation_mode(&self) -> RotationMode {
        RotationMode::from(self.flags.rotation_mode())
    }

    pub fn parent(&self) -> Option<usize> {
        usize::try_from(self.parent_index).ok()
    }
}

impl Loadable for Bone {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let name = reader.read_name()?;
        // User data isn't decoded.
        reader.skip(16)?;
        let index = reader.read_u16()?;
        let parent_index = reader.read_i16()?;
        let smooth_matrix_index = reader.read_i16()?;
        let rigid_matrix_index = reader.read_i16()?;
        let billboard_index = reader.read_i16()?;
        let user_data_count = reader.read_u16()?;
        let flags = BoneFlags::from_bytes(reader.read_u32()?.to_le_bytes());
        let scale = reader.read_struct()?;
        let rotation = reader.read_struct()?;
        let translation = reader.read_struct()?;

        Ok(Self {
            name,
            index,
            parent_index,
            smooth_matrix_index,
            rigid_matrix_index,
            billboard_index,
            user_data_count,
            flags,
            scale,
            rotation,
            translation,
        })
    }
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    pub header: BlockHeader,
    pub bones: ResMap<Bone>,
    /// The bone index for each smooth matrix followed by each rigid matrix.
    pub matrix_to_bone: Vec<u16>,
    /// The inverse model space transform for each smooth matrix.
    pub inverse_model_matrices: Vec<Matrix3x4>,
    pub flags: SkeletonFlags,
    pub smooth_matrix_count: u16,
    pub rigid_matrix_count: u16,
}

impl Skeleton {
    pub fn rotation_mode(&self) -> RotationMode {
        RotationMode::from(self.flags.rotation_mode())
    }

    /// The bone index for the smooth or rigid matrix `matrix_index`.
    pub fn bone_for_matrix(&self, matrix_index: usize) -> Option<usize> {
        self.matrix_to_bone.get(matrix_index).map(|i| *i as usize)
    }
}

impl Loadable for Skeleton {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let header = BlockHeader::read(reader, b"FSKL")?;
        let bone_dict = reader.read_offset64()?;
        let bone_array = reader.read_offset64()?;
        let matrix_to_bone_offset = reader.read_offset64()?;
        let inverse_matrices_offset = reader.read_offset64()?;
        reader.skip(8)?;
        let flags = SkeletonFlags::from_bytes(reader.read_u32()?.to_le_bytes());
        let bone_count = reader.read_u16()? as usize;
        let smooth_matrix_count = reader.read_u16()?;
        let rigid_matrix_count = reader.read_u16()?;
        reader.skip(6)?;

        let bones = load_dict(reader, bone_array, bone_dict, bone_count)?;
        let matrix_to_bone = load_values(
            reader,
            matrix_to_bone_offset,
            smooth_matrix_count as usize + rigid_matrix_count as usize,
        )?;
        let inverse_model_matrices =
            load_values(reader, inverse_matrices_offset, smooth_matrix_count as usize)?;

        Ok(Self {
            header,
            bones,
            matrix_to_bone,
            inverse_model_matrices,
            flags,
            smooth_matrix_count,
            rigid_matrix_count,
        })
    }
}
