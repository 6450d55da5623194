//! Bone transforms for an FSKL skeleton.
//!
//! Transforms are stored as column major 4x4 matrices.
//! World transforms are calculated once when converting the [Skeleton].
use ahash::AHashMap;
use bfres_lib::formats::skeleton::{Bone, RotationMode, Skeleton};
use bfres_lib::{DecodeError, Vector3, Vector4};
use glam::{EulerRot, Mat4, Quat, Vec3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BoneData {
    pub name: String,
    pub parent_index: Option<usize>,
    /// The transform relative to the parent bone.
    pub transform: [[f32; 4]; 4],
    /// The accumulated transform of this bone and all of its parents.
    pub world_transform: [[f32; 4]; 4],
    pub smooth_matrix_index: Option<usize>,
    pub rigid_matrix_index: Option<usize>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SkelData {
    pub bones: Vec<BoneData>,
    /// The bone index for each smooth matrix followed by each rigid matrix.
    pub matrix_to_bone: Vec<usize>,
}

impl SkelData {
    /// Calculates the transforms for all bones in `skeleton`.
    /// Parents must appear before their children.
    pub fn from_skeleton(skeleton: &Skeleton) -> Result<Self, DecodeError> {
        let mut bones: Vec<BoneData> = Vec::with_capacity(skeleton.bones.len());
        for (i, bone) in skeleton.bones.values().iter().enumerate() {
            let transform = bone_transform(bone);

            let world_transform = match bone.parent() {
                Some(parent) => {
                    let parent_bone = bones.get(parent).ok_or_else(|| {
                        DecodeError::MalformedFile(format!(
                            "Bone {:?} at index {} has parent index {} that does not precede it.",
                            bone.name, i, parent
                        ))
                    })?;
                    Mat4::from_cols_array_2d(&parent_bone.world_transform) * transform
                }
                None => transform,
            };

            bones.push(BoneData {
                name: bone.name.clone(),
                parent_index: bone.parent(),
                transform: transform.to_cols_array_2d(),
                world_transform: world_transform.to_cols_array_2d(),
                smooth_matrix_index: matrix_index(bone.smooth_matrix_index),
                rigid_matrix_index: matrix_index(bone.rigid_matrix_index),
            });
        }

        Ok(Self {
            bones,
            matrix_to_bone: skeleton
                .matrix_to_bone
                .iter()
                .map(|i| *i as usize)
                .collect(),
        })
    }

    pub fn find_bone(&self, name: &str) -> Option<&BoneData> {
        self.bones.iter().find(|b| b.name == name)
    }

    /// The world transform of the bone at `index`.
    pub fn world_transform(&self, index: usize) -> Option<Mat4> {
        self.bones
            .get(index)
            .map(|b| Mat4::from_cols_array_2d(&b.world_transform))
    }

    /// The world transform of the bone for the smooth or rigid matrix `matrix_index`.
    pub fn matrix_world_transform(&self, matrix_index: usize) -> Option<Mat4> {
        let bone = self.matrix_to_bone.get(matrix_index)?;
        self.world_transform(*bone)
    }

    /// Maps each smooth and rigid matrix index to the index of its bone.
    /// Later bones replace earlier bones with the same matrix index.
    pub fn matrix_groups(&self) -> AHashMap<usize, usize> {
        let mut groups = AHashMap::new();
        for (i, bone) in self.bones.iter().enumerate() {
            for index in bone.smooth_matrix_index.iter().chain(bone.rigid_matrix_index.iter()) {
                groups.insert(*index, i);
            }
        }
        groups
    }
}

fn matrix_index(index: i16) -> Option<usize> {
    if index >= 0 {
        Some(index as usize)
    } else {
        None
    }
}

/// Converts a quaternion or Euler XYZ rotation in radians.
/// Euler angles apply X first followed by Y and then Z.
pub fn rotation_quat(rotation: &Vector4, mode: RotationMode) -> Quat {
    match mode {
        RotationMode::Quaternion => Quat::from_xyzw(rotation.x, rotation.y, rotation.z, rotation.w),
        RotationMode::EulerXyz => {
            Quat::from_euler(EulerRot::ZYX, rotation.z, rotation.y, rotation.x)
        }
    }
}

pub(crate) fn vec3(v: &Vector3) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// The transform of `bone` relative to its parent as translation * rotation * scale.
pub fn bone_transform(bone: &Bone) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        vec3(&bone.scale),
        rotation_quat(&bone.rotation, bone.rotation_mode()),
        vec3(&bone.translation),
    )
}
