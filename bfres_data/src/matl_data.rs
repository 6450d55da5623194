//! Material summaries with texture assignments and parameters.
use std::convert::TryFrom;

use bfres_lib::formats::material::{Material, RenderInfoValues, ShaderParamValue, TexSrt};
use bfres_lib::DecodeError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The parameter used for [MatlData::texture_transform].
const TEXTURE_TRANSFORM_PARAM: &str = "tex_mtx0";

/// A well known use for a texture determined by its shader sampler.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureRole {
    BaseColor,
    Roughness,
    Metalness,
    Normal,
    Emission,
    Opacity,
}

impl TextureRole {
    /// The role for shader sampler names like `_a0`.
    pub fn from_shader_sampler(name: &str) -> Option<Self> {
        match name {
            "_a0" => Some(TextureRole::BaseColor),
            "_r0" => Some(TextureRole::Roughness),
            "_m0" => Some(TextureRole::Metalness),
            "_n0" => Some(TextureRole::Normal),
            "_e0" => Some(TextureRole::Emission),
            "_op0" => Some(TextureRole::Opacity),
            _ => None,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TextureAssignment {
    /// The material sampler name such as `_a0` or `s_albedo`.
    pub sampler_name: String,
    /// The shader sampler this material sampler is assigned to.
    pub shader_sampler_name: Option<String>,
    pub texture_name: String,
    pub role: Option<TextureRole>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexSrtMode {
    Maya,
    Max3ds,
    Softimage,
}

impl TryFrom<u32> for TexSrtMode {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TexSrtMode::Maya),
            1 => Ok(TexSrtMode::Max3ds),
            2 => Ok(TexSrtMode::Softimage),
            _ => Err(DecodeError::UnsupportedFormat {
                kind: "texture transform mode",
                value,
            }),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TextureTransform {
    pub mode: TexSrtMode,
    pub scaling: [f32; 2],
    /// The rotation in radians.
    pub rotation: f32,
    pub translation: [f32; 2],
}

impl TryFrom<&TexSrt> for TextureTransform {
    type Error = DecodeError;

    fn try_from(value: &TexSrt) -> Result<Self, Self::Error> {
        Ok(Self {
            mode: TexSrtMode::try_from(value.mode)?,
            scaling: value.scaling,
            rotation: value.rotation,
            translation: value.translation,
        })
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MatlData {
    pub name: String,
    pub shader_archive_name: Option<String>,
    pub shading_model_name: Option<String>,
    pub shader_options: Vec<(String, String)>,
    pub render_infos: Vec<(String, RenderInfoValues)>,
    pub shader_params: Vec<(String, ShaderParamValue)>,
    pub textures: Vec<TextureAssignment>,
    pub texture_transform: Option<TextureTransform>,
}

impl MatlData {
    pub fn from_material(material: &Material) -> Result<Self, DecodeError> {
        let shader_assign = material.shader_assign.as_ref();

        // Samplers and texture names are stored in the same order.
        let textures = material
            .sampler_textures()
            .map(|(sampler, texture)| {
                let shader_sampler_name = shader_assign
                    .and_then(|a| a.shader_sampler(sampler))
                    .map(|s| s.to_string());
                TextureAssignment {
                    sampler_name: sampler.to_string(),
                    role: shader_sampler_name
                        .as_deref()
                        .and_then(TextureRole::from_shader_sampler),
                    shader_sampler_name,
                    texture_name: texture.to_string(),
                }
            })
            .collect();

        let texture_transform = match material
            .shader_params
            .get(TEXTURE_TRANSFORM_PARAM)
            .map(|p| &p.value)
        {
            Some(ShaderParamValue::TexSrt(srt)) | Some(ShaderParamValue::TexSrtEx(srt)) => {
                Some(TextureTransform::try_from(srt)?)
            }
            _ => None,
        };

        Ok(Self {
            name: material.name.clone(),
            shader_archive_name: shader_assign.map(|a| a.shader_archive_name.clone()),
            shading_model_name: shader_assign.map(|a| a.shading_model_name.clone()),
            shader_options: shader_assign
                .map(|a| {
                    a.shader_options
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            render_infos: material
                .render_infos
                .iter()
                .map(|(k, v)| (k.to_string(), v.values.clone()))
                .collect(),
            shader_params: material
                .shader_params
                .iter()
                .map(|(k, v)| (k.to_string(), v.value.clone()))
                .collect(),
            textures,
            texture_transform,
        })
    }

    /// The texture assigned to the first sampler with `role`.
    pub fn texture(&self, role: TextureRole) -> Option<&TextureAssignment> {
        self.textures.iter().find(|t| t.role == Some(role))
    }

    pub fn shader_option(&self, name: &str) -> Option<&str> {
        self.shader_options
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}
