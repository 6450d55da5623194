//! Base poses for FSKA skeletal animations.
//!
//! Only the values at the start of the animation are decoded.
//! Each value is relative to the bind pose of the skeleton bone with the same name,
//! so an animation that matches the bind pose has identity transforms.
use ahash::AHashMap;
use glam::{Quat, Vec3};

use crate::skel_data::{rotation_quat, vec3};
use bfres_lib::formats::model::Model;
use bfres_lib::formats::skeletal_anim::{BoneAnim, SkeletalAnim};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The rest transform of a bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindPose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BindPose {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Collects the bind pose of every bone by name.
/// Bones in later models replace bones with the same name in earlier models.
pub fn bind_poses<'a>(models: impl IntoIterator<Item = &'a Model>) -> AHashMap<String, BindPose> {
    let mut poses = AHashMap::new();
    for model in models {
        for bone in model.skeleton.bones.values() {
            poses.insert(
                bone.name.clone(),
                BindPose {
                    translation: vec3(&bone.translation),
                    rotation: rotation_quat(&bone.rotation, bone.rotation_mode()),
                    scale: vec3(&bone.scale),
                },
            );
        }
    }
    poses
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BoneAnimData {
    pub name: String,
    /// The translation minus the bind translation.
    pub translation: Option<[f32; 3]>,
    /// The rotation relative to the bind rotation as a quaternion in x, y, z, w order.
    pub rotation: Option<[f32; 4]>,
    /// The scale divided by the bind scale.
    pub scale: Option<[f32; 3]>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AnimData {
    pub name: String,
    pub frame_count: i32,
    pub looping: bool,
    pub bones: Vec<BoneAnimData>,
}

impl AnimData {
    pub fn from_skeletal_anim(anim: &SkeletalAnim, bind_poses: &AHashMap<String, BindPose>) -> Self {
        Self {
            name: anim.name.clone(),
            frame_count: anim.frame_count,
            looping: anim.flags.looping(),
            bones: anim
                .bone_anims
                .iter()
                .map(|b| {
                    let bind = bind_poses.get(&b.name).copied().unwrap_or_default();
                    relative_base(anim, b, &bind)
                })
                .collect(),
        }
    }
}

fn relative_base(anim: &SkeletalAnim, bone_anim: &BoneAnim, bind: &BindPose) -> BoneAnimData {
    let flags = bone_anim.flags;
    let base = &bone_anim.base;

    let translation = base
        .translation
        .filter(|_| flags.base_translate())
        .map(|t| (vec3(&t) - bind.translation).to_array());

    let rotation = base.rotation.filter(|_| flags.base_rotate()).map(|r| {
        let rotation = rotation_quat(&r, anim.rotation_mode());
        (bind.rotation.inverse() * rotation).to_array()
    });

    let scale = base.scale.filter(|_| flags.base_scale()).map(|s| {
        let s = vec3(&s);
        // Avoid infinite values for bones with a bind scale of 0.
        let ratio = |value: f32, bind: f32| if bind != 0.0 { value / bind } else { value };
        [
            ratio(s.x, bind.scale.x),
            ratio(s.y, bind.scale.y),
            ratio(s.z, bind.scale.z),
        ]
    });

    BoneAnimData {
        name: bone_anim.name.clone(),
        translation,
        rotation,
        scale,
    }
}
