//! The FSKA skeletal animation.
//! Only the base values of each bone animation are read. Animation curves are not decoded.
use modular_bitfield::prelude::*;

use super::skeleton::RotationMode;
use super::BlockHeader;
use crate::loader::{load_array, load_values, Loadable};
use crate::{ByteCursor, DecodeError, Vector3, Vector4};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

#[bitfield(bits = 32)]
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkeletalAnimFlags {
    #[skip]
    __: B2,
    pub looping: bool,
    #[skip]
    __: B9,
    pub rotation_mode: B2,
    #[skip]
    __: B18,
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletalAnim {
    pub header: BlockHeader,
    pub name: String,
    pub path: String,
    pub flags: SkeletalAnimFlags,
    pub frame_count: i32,
    pub curve_count: i32,
    pub baked_size: u32,
    /// The skeleton bone index for each bone animation.
    pub bind_indices: Vec<u16>,
    pub bone_anims: Vec<BoneAnim>,
    pub user_data_count: u16,
}

impl SkeletalAnim {
    pub fn rotation_mode(&self) -> RotationMode {
        RotationMode::from(self.flags.rotation_mode())
    }
}

impl Loadable for SkeletalAnim {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let header = BlockHeader::read(reader, b"FSKA")?;
        let name = reader.read_name()?;
        let path = reader.read_name()?;
        // The bound skeleton is only set at runtime.
        reader.skip(8)?;
        let bind_index_array = reader.read_offset64()?;
        let bone_anim_array = reader.read_offset64()?;
        reader.skip(16)?;
        let flags = SkeletalAnimFlags::from_bytes(reader.read_u32()?.to_le_bytes());
        let frame_count = reader.read_i32()?;
        let curve_count = reader.read_i32()?;
        let baked_size = reader.read_u32()?;
        let bone_anim_count = reader.read_u16()? as usize;
        let user_data_count = reader.read_u16()?;
        reader.skip(4)?;

        let bind_indices = load_values(reader, bind_index_array, bone_anim_count)?;
        let bone_anims = load_array(reader, bone_anim_array, bone_anim_count)?;

        Ok(Self {
            header,
            name,
            path,
            flags,
            frame_count,
            curve_count,
            baked_size,
            bind_indices,
            bone_anims,
            user_data_count,
        })
    }
}

#[bitfield(bits = 32)]
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneAnimFlags {
    #[skip]
    __: B3,
    pub base_scale: bool,
    pub base_rotate: bool,
    pub base_translate: bool,
    #[skip]
    __: B26,
}

/// The values of a bone at the start of the animation.
/// Missing values use the bind pose.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoneAnimBase {
    pub scale: Option<Vector3>,
    /// A quaternion or Euler angles depending on the animation's rotation mode.
    pub rotation: Option<Vector4>,
    pub translation: Option<Vector3>,
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BoneAnim {
    pub name: String,
    pub flags: BoneAnimFlags,
    pub base: BoneAnimBase,
    pub begin_rotate: u8,
    pub begin_translate: u8,
    pub curve_count: u8,
    pub begin_curve: u16,
    pub begin_base_translate: u16,
}

impl Loadable for BoneAnim {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let name = reader.read_name()?;
        reader.skip(8)?;
        let base_data = reader.read_offset64()?;
        let flags = BoneAnimFlags::from_bytes(reader.read_u32()?.to_le_bytes());
        let begin_rotate = reader.read_u8()?;
        let begin_translate = reader.read_u8()?;
        let curve_count = reader.read_u8()?;
        reader.skip(1)?;
        let begin_curve = reader.read_u16()?;
        let begin_base_translate = reader.read_u16()?;
        reader.skip(4)?;

        let base = match base_data {
            Some(offset) => reader.temporary_seek(offset, |r| {
                // Only the flagged values are stored.
                Ok(BoneAnimBase {
                    scale: flags.base_scale().then(|| r.read_struct()).transpose()?,
                    rotation: flags.base_rotate().then(|| r.read_struct()).transpose()?,
                    translation: flags.base_translate().then(|| r.read_struct()).transpose()?,
                })
            })?,
            None => BoneAnimBase::default(),
        };

        Ok(Self {
            name,
            flags,
            base,
            begin_rotate,
            begin_translate,
            curve_count,
            begin_curve,
            begin_base_translate,
        })
    }
}
