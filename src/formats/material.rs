//! The FMAT material with its render infos, samplers, shader parameters, and shader assignment.
use binread::BinRead;

use super::BlockHeader;
use crate::loader::{
    load_dict, load_string_array, load_string_dict, load_values, Loadable, ResMap,
};
use crate::{ByteCursor, DecodeError, Vector3};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub header: BlockHeader,
    pub name: String,
    pub render_infos: ResMap<RenderInfo>,
    pub shader_assign: Option<ShaderAssign>,
    /// The texture names in the same order as [Material::samplers].
    pub texture_names: Vec<String>,
    pub samplers: ResMap<Sampler>,
    pub shader_params: ResMap<ShaderParam>,
    pub flags: u32,
    pub index: u16,
    pub user_data_count: u16,
}

impl Material {
    /// Pairs each sampler name with the texture assigned to it.
    pub fn sampler_textures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.samplers
            .names()
            .zip(self.texture_names.iter().map(|t| t.as_str()))
    }
}

impl Loadable for Material {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let header = BlockHeader::read(reader, b"FMAT")?;
        let name = reader.read_name()?;
        let render_info_array = reader.read_offset64()?;
        let render_info_dict = reader.read_offset64()?;
        let shader_assign_offset = reader.read_offset64()?;
        let texture_name_array = reader.read_offset64()?;
        let sampler_array = reader.read_offset64()?;
        let sampler_dict = reader.read_offset64()?;
        let shader_param_array = reader.read_offset64()?;
        let shader_param_dict = reader.read_offset64()?;
        let shader_param_data = reader.read_offset64()?;
        reader.skip(16)?;
        let flags = reader.read_u32()?;
        let index = reader.read_u16()?;
        let render_info_count = reader.read_u16()? as usize;
        let texture_count = reader.read_u8()? as usize;
        let sampler_count = reader.read_u8()? as usize;
        let shader_param_count = reader.read_u16()? as usize;
        reader.skip(2)?;
        let user_data_count = reader.read_u16()?;

        let render_infos = load_dict(reader, render_info_array, render_info_dict, render_info_count)?;
        let shader_assign = match shader_assign_offset {
            Some(offset) => Some(reader.temporary_seek(offset, ShaderAssign::load)?),
            None => None,
        };
        let texture_names = load_string_array(reader, texture_name_array, texture_count)?;
        let samplers = load_dict(reader, sampler_array, sampler_dict, sampler_count)?;

        let shader_params = load_dict::<ShaderParamHeader>(
            reader,
            shader_param_array,
            shader_param_dict,
            shader_param_count,
        )?
        .try_map(|h| h.read_value(reader, shader_param_data))?;

        Ok(Self {
            header,
            name,
            render_infos,
            shader_assign,
            texture_names,
            samplers,
            shader_params,
            flags,
            index,
            user_data_count,
        })
    }
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum RenderInfoValues {
    Int(Vec<i32>),
    Float(Vec<f32>),
    String(Vec<String>),
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInfo {
    pub name: String,
    pub values: RenderInfoValues,
}

impl Loadable for RenderInfo {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let name = reader.read_name()?;
        let data = reader.read_offset64()?;
        let count = reader.read_u16()? as usize;
        let data_type = reader.read_u8()?;
        reader.skip(5)?;

        let values = match data_type {
            0 => RenderInfoValues::Int(load_values(reader, data, count)?),
            1 => RenderInfoValues::Float(load_values(reader, data, count)?),
            2 => RenderInfoValues::String(load_string_array(reader, data, count)?),
            value => {
                return Err(DecodeError::UnsupportedFormat {
                    kind: "render info type",
                    value: value as u32,
                })
            }
        };
        Ok(Self { name, values })
    }
}

/// Texture sampling state for one texture of a [Material].
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq)]
pub struct Sampler {
    pub wrap_u: u8,
    pub wrap_v: u8,
    pub wrap_w: u8,
    pub compare_func: u8,
    pub border_color: u8,
    pub max_anisotropy: u8,
    pub filter: u16,
    pub min_lod: f32,
    pub max_lod: f32,
    #[br(pad_after = 12)]
    pub lod_bias: f32,
}

impl Loadable for Sampler {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        reader.read_struct()
    }
}

/// A 2D scale, rotation, and translation.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq)]
pub struct Srt2d {
    pub scaling: [f32; 2],
    pub rotation: f32,
    pub translation: [f32; 2],
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq)]
pub struct Srt3d {
    pub scaling: Vector3,
    pub rotation: Vector3,
    pub translation: Vector3,
}

/// A texture coordinate transform.
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq)]
pub struct TexSrt {
    /// The transform convention with 0 for Maya, 1 for 3ds Max, and 2 for Softimage.
    pub mode: u32,
    pub scaling: [f32; 2],
    pub rotation: f32,
    pub translation: [f32; 2],
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderParamValue {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    /// Scalars, vectors, and row major matrices.
    Float(Vec<f32>),
    Srt2d(Srt2d),
    Srt3d(Srt3d),
    TexSrt(TexSrt),
    /// A [TexSrt] followed by a runtime matrix pointer.
    TexSrtEx(TexSrt),
    /// The raw bytes for unrecognized types.
    Unknown(Vec<u8>),
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderParam {
    pub name: String,
    pub param_type: u8,
    pub data_size: u8,
    /// The offset into the material's shader parameter data.
    pub data_offset: u16,
    pub depended_index: u16,
    pub depend_index: u16,
    pub value: ShaderParamValue,
}

struct ShaderParamHeader {
    name: String,
    param_type: u8,
    data_size: u8,
    data_offset: u16,
    depended_index: u16,
    depend_index: u16,
}

impl Loadable for ShaderParamHeader {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        // Runtime callback pointer.
        reader.skip(8)?;
        let name = reader.read_name()?;
        let param_type = reader.read_u8()?;
        let data_size = reader.read_u8()?;
        let data_offset = reader.read_u16()?;
        let depended_index = reader.read_u16()?;
        let depend_index = reader.read_u16()?;
        reader.skip(8)?;
        Ok(Self {
            name,
            param_type,
            data_size,
            data_offset,
            depended_index,
            depend_index,
        })
    }
}

fn read_vec<T: BinRead<Args = ()>>(
    reader: &mut ByteCursor,
    count: usize,
) -> Result<Vec<T>, DecodeError> {
    (0..count).map(|_| reader.read_struct()).collect()
}

impl ShaderParamHeader {
    fn read_value(
        self,
        reader: &mut ByteCursor,
        param_data: Option<u64>,
    ) -> Result<ShaderParam, DecodeError> {
        let param_data = param_data.ok_or_else(|| {
            DecodeError::MalformedFile(format!(
                "Shader param {:?} has no parameter data.",
                self.name
            ))
        })?;

        let param_type = self.param_type;
        let data_size = self.data_size as usize;
        // Vectors have 1 to 4 components.
        let components = (param_type & 3) as usize + 1;

        let value = reader.temporary_seek(param_data + self.data_offset as u64, |r| {
            Ok(match param_type {
                0..=3 => ShaderParamValue::Bool(
                    read_vec::<u32>(r, components)?
                        .into_iter()
                        .map(|v| v != 0)
                        .collect(),
                ),
                4..=7 => ShaderParamValue::Int(read_vec(r, components)?),
                8..=11 => ShaderParamValue::UInt(read_vec(r, components)?),
                12..=15 => ShaderParamValue::Float(read_vec(r, components)?),
                17..=19 | 21..=23 | 25..=27 => {
                    let rows = (param_type >> 2) as usize - 2;
                    ShaderParamValue::Float(read_vec(r, rows * components)?)
                }
                28 => ShaderParamValue::Srt2d(r.read_struct()?),
                29 => ShaderParamValue::Srt3d(r.read_struct()?),
                30 => ShaderParamValue::TexSrt(r.read_struct()?),
                31 => ShaderParamValue::TexSrtEx(r.read_struct()?),
                _ => ShaderParamValue::Unknown(r.read_bytes(data_size)?.to_vec()),
            })
        })?;

        Ok(ShaderParam {
            name: self.name,
            param_type,
            data_size: self.data_size,
            data_offset: self.data_offset,
            depended_index: self.depended_index,
            depend_index: self.depend_index,
            value,
        })
    }
}

/// The shader program and options used to render a [Material].
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderAssign {
    pub shader_archive_name: String,
    pub shading_model_name: String,
    /// Shader attribute names mapped to vertex attribute names.
    pub attribute_assigns: ResMap<String>,
    /// Shader sampler names mapped to material sampler names.
    pub sampler_assigns: ResMap<String>,
    /// Shader option names mapped to their values.
    pub shader_options: ResMap<String>,
    pub revision: u32,
}

impl ShaderAssign {
    /// Finds the shader sampler name such as `_a0` assigned to the material sampler `sampler`.
    pub fn shader_sampler(&self, sampler: &str) -> Option<&str> {
        self.sampler_assigns
            .iter()
            .find(|(_, material_sampler)| *material_sampler == sampler)
            .map(|(shader_sampler, _)| shader_sampler)
    }
}

impl Loadable for ShaderAssign {
    fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        let shader_archive_name = reader.read_name()?;
        let shading_model_name = reader.read_name()?;
        let attribute_assign_array = reader.read_offset64()?;
        let attribute_assign_dict = reader.read_offset64()?;
        let sampler_assign_array = reader.read_offset64()?;
        let sampler_assign_dict = reader.read_offset64()?;
        let shader_option_array = reader.read_offset64()?;
        let shader_option_dict = reader.read_offset64()?;
        let revision = reader.read_u32()?;
        let attribute_assign_count = reader.read_u8()? as usize;
        let sampler_assign_count = reader.read_u8()? as usize;
        let shader_option_count = reader.read_u16()? as usize;

        let attribute_assigns = load_string_dict(
            reader,
            attribute_assign_array,
            attribute_assign_dict,
            attribute_assign_count,
        )?;
        let sampler_assigns = load_string_dict(
            reader,
            sampler_assign_array,
            sampler_assign_dict,
            sampler_assign_count,
        )?;
        let shader_options = load_string_dict(
            reader,
            shader_option_array,
            shader_option_dict,
            shader_option_count,
        )?;

        Ok(Self {
            shader_archive_name,
            shading_model_name,
            attribute_assigns,
            sampler_assigns,
            shader_options,
            revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_bytes;

    fn material_bytes() -> Vec<u8> {
        hex_bytes(
            "464D4154 00000000 80000000 00000000
             6401000000000000
             A800000000000000 8000000000000000
             0000000000000000
             5801000000000000
             E800000000000000 C000000000000000
             3001000000000000 0801000000000000
             5001000000000000
             0000000000000000 0000000000000000
             01000000 0000 0100 01 01 0100 0800 0000

             5F444943 01000000
             FFFFFFFF 0100 0000 0000000000000000
             00000000 0000 0000 6A01000000000000

             6A01000000000000 6001000000000000 0100 01 0000000000

             5F444943 01000000
             FFFFFFFF 0100 0000 0000000000000000
             00000000 0000 0000 7001000000000000

             00 01 02 00 00 01 2A00 00000000 0000D041 00000000
             000000000000000000000000

             5F444943 01000000
             FFFFFFFF 0100 0000 0000000000000000
             00000000 0000 0000 7601000000000000

             0000000000000000 7601000000000000 0D 08 0000 0000 0000
             0000000000000000

             0000803F 00000040
             7C01000000000000
             0000003F
             0300 6D6174 00
             0300 726566 00
             0300 5F6130 00
             0300 757630 00
             0400 626F6479 00",
        )
    }

    #[test]
    fn load_material() {
        let data = material_bytes();
        let mut reader = ByteCursor::new(&data);
        let material = Material::load(&mut reader).unwrap();
        assert_eq!(0x80, reader.position());

        assert_eq!("mat", material.name);
        assert_eq!(None, material.shader_assign);
        assert_eq!(
            RenderInfoValues::Float(vec![0.5]),
            material.render_infos.get("ref").unwrap().values
        );
        assert_eq!(vec!["body".to_string()], material.texture_names);
        assert_eq!(
            vec![("_a0", "body")],
            material.sampler_textures().collect::<Vec<_>>()
        );

        let sampler = material.samplers.get("_a0").unwrap();
        assert_eq!((0, 1, 2), (sampler.wrap_u, sampler.wrap_v, sampler.wrap_w));
        assert_eq!(0x2A, sampler.filter);
        assert_eq!(26.0, sampler.max_lod);

        let param = material.shader_params.get("uv0").unwrap();
        assert_eq!(0x0D, param.param_type);
        assert_eq!(ShaderParamValue::Float(vec![1.0, 2.0]), param.value);
    }

    #[test]
    fn load_render_info_unsupported_type() {
        let data = hex_bytes("0000000000000000 0000000000000000 0100 07 0000000000");
        let mut reader = ByteCursor::new(&data);
        assert!(matches!(
            RenderInfo::load(&mut reader),
            Err(DecodeError::UnsupportedFormat { value: 7, .. })
        ));
    }

    #[test]
    fn load_render_info_strings() {
        let data = hex_bytes(
            "0000000000000000 1800000000000000 0100 02 0000000000
             2000000000000000
             0600 6F706171756500",
        );
        let mut reader = ByteCursor::new(&data);
        let render_info = RenderInfo::load(&mut reader).unwrap();
        assert_eq!(
            RenderInfoValues::String(vec!["opaque".to_string()]),
            render_info.values
        );
        assert_eq!(0x18, reader.position());
    }

    fn param_value(param_type: u8, data_size: u8, data: &str) -> ShaderParamValue {
        let data = hex_bytes(data);
        let mut reader = ByteCursor::new(&data);
        let header = ShaderParamHeader {
            name: String::new(),
            param_type,
            data_size,
            data_offset: 4,
            depended_index: 0,
            depend_index: 0,
        };
        let param = header.read_value(&mut reader, Some(0)).unwrap();
        assert_eq!(0, reader.position());
        param.value
    }

    #[test]
    fn shader_param_tex_srt() {
        assert_eq!(
            ShaderParamValue::TexSrt(TexSrt {
                mode: 1,
                scaling: [1.0, 2.0],
                rotation: 0.5,
                translation: [0.0, 1.0],
            }),
            param_value(
                30,
                24,
                "FFFFFFFF 01000000 0000803F 00000040 0000003F 00000000 0000803F"
            )
        );
    }

    #[test]
    fn shader_param_bool_and_int() {
        assert_eq!(
            ShaderParamValue::Bool(vec![true, false]),
            param_value(1, 8, "FFFFFFFF 01000000 00000000")
        );
        assert_eq!(
            ShaderParamValue::Int(vec![-1]),
            param_value(4, 4, "00000000 FFFFFFFF")
        );
    }

    #[test]
    fn shader_param_matrix() {
        // float2x3 has 6 components.
        let value = param_value(
            18,
            24,
            "00000000 0000803F 0000803F 0000803F 0000803F 0000803F 0000803F",
        );
        assert_eq!(ShaderParamValue::Float(vec![1.0; 6]), value);
    }

    #[test]
    fn shader_param_unknown() {
        assert_eq!(
            ShaderParamValue::Unknown(vec![1, 2]),
            param_value(0xFF, 2, "00000000 0102")
        );
    }

    #[test]
    fn shader_param_without_data() {
        let header = ShaderParamHeader {
            name: "a".to_string(),
            param_type: 12,
            data_size: 4,
            data_offset: 0,
            depended_index: 0,
            depend_index: 0,
        };
        let data = [0u8; 4];
        let mut reader = ByteCursor::new(&data);
        assert!(matches!(
            header.read_value(&mut reader, None),
            Err(DecodeError::MalformedFile(_))
        ));
    }

    #[test]
    fn load_shader_assign() {
        let data = hex_bytes(
            "7800000000000000 7E00000000000000
             0000000000000000 0000000000000000
             4800000000000000 5000000000000000
             0000000000000000 0000000000000000
             02000000 00 01 0000

             8400000000000000

             5F444943 01000000
             FFFFFFFF 0100 0000 0000000000000000
             00000000 0000 0000 8A00000000000000

             0300 617263 00
             0300 6D646C 00
             0300 5F6130 00
             0300 5F6130 00",
        );
        let mut reader = ByteCursor::new(&data);
        let assign = ShaderAssign::load(&mut reader).unwrap();
        assert_eq!(0x48, reader.position());
        assert_eq!("arc", assign.shader_archive_name);
        assert_eq!("mdl", assign.shading_model_name);
        assert_eq!(2, assign.revision);
        assert_eq!(Some("_a0"), assign.shader_sampler("_a0"));
        assert_eq!(None, assign.shader_sampler("_n0"));
        assert!(assign.shader_options.is_empty());
    }
}
