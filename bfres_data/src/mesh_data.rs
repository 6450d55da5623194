//! Decoded geometry for each FSHP shape.
//!
//! A [MeshData] contains the vertices used by a single level of detail.
//! Vertex indices in [MeshData::primitives] are relative to the start of the vertex data.
use std::ops::Range;

use glam::{Mat4, Vec3};
use itertools::Itertools;
use log::warn;

use crate::attribute::{read_attribute, VectorData};
use crate::skel_data::SkelData;
use crate::ImportOptions;
use bfres_lib::formats::model::{Model, PrimitiveType, Shape, VertexBuffer};
use bfres_lib::{DecodeError, Endian};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The maximum number of influences stored in `_i0` and `_w0`.
const MAX_INFLUENCES: usize = 4;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct VertexWeight {
    pub vertex_index: u32,
    pub vertex_weight: f32,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BoneInfluence {
    pub bone_name: String,
    pub vertex_weights: Vec<VertexWeight>,
}

/// A named set of texture coordinates such as `_u0`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct UvData {
    pub name: String,
    pub data: Vec<[f32; 2]>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub material_name: Option<String>,
    /// The level of detail used after clamping to the available meshes.
    pub lod_index: usize,
    pub vertex_skin_count: u8,
    pub primitive_type: PrimitiveType,
    pub primitives: Vec<Vec<u32>>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub texture_coordinates: Vec<UvData>,
    pub bone_influences: Vec<BoneInfluence>,
}

struct ShapeVertices<'a> {
    vertex_buffer: &'a VertexBuffer,
    region: &'a [u8],
    endian: Endian,
    range: Range<usize>,
}

impl<'a> ShapeVertices<'a> {
    /// Reads the attribute `name` for the vertices used by the selected mesh.
    fn read(&self, name: &str) -> Result<Option<VectorData>, DecodeError> {
        match self.vertex_buffer.attributes.get(name) {
            Some(attribute) => {
                let data = read_attribute(self.vertex_buffer, attribute, self.region, self.endian)?;
                Ok(Some(data.slice(self.range.clone())))
            }
            None => Ok(None),
        }
    }

    fn read_required(&self, name: &str) -> Result<VectorData, DecodeError> {
        self.read(name)?.ok_or_else(|| {
            DecodeError::MalformedFile(format!("Missing required attribute {:?}.", name))
        })
    }
}

impl MeshData {
    /// Decodes the vertices and primitives of `shape` for [ImportOptions::lod_index].
    /// Rigid shapes are transformed by their bone so all vertices share the same space.
    pub fn from_shape(
        shape: &Shape,
        model: &Model,
        skel: &SkelData,
        region: &[u8],
        endian: Endian,
        options: &ImportOptions,
    ) -> Result<Self, DecodeError> {
        let vertex_buffer = model
            .vertex_buffers
            .get(shape.vertex_buffer_index as usize)
            .ok_or_else(|| {
                DecodeError::MalformedFile(format!(
                    "Shape {:?} uses vertex buffer {} but the model has {} vertex buffers.",
                    shape.name,
                    shape.vertex_buffer_index,
                    model.vertex_buffers.len()
                ))
            })?;

        if shape.meshes.is_empty() {
            return Err(DecodeError::MalformedFile(format!(
                "Shape {:?} has no meshes.",
                shape.name
            )));
        }
        let lod_index = options.lod_index.min(shape.meshes.len() - 1);
        let mesh = &shape.meshes[lod_index];

        let primitive_type = mesh.primitive_type()?;
        let indices = mesh.indices(region, endian)?;

        // Only the vertices up to the largest index are used.
        let vertex_count = indices.iter().max().map(|i| *i as usize + 1).unwrap_or(0);
        let start = mesh.first_vertex as usize;
        let range = start..start + vertex_count;
        if range.end > vertex_buffer.vertex_count as usize {
            return Err(DecodeError::MalformedFile(format!(
                "Shape {:?} uses vertices {}..{} but the vertex buffer has {} vertices.",
                shape.name, range.start, range.end, vertex_buffer.vertex_count
            )));
        }

        let vertices = ShapeVertices {
            vertex_buffer,
            region,
            endian,
            range,
        };

        let positions = vertices.read_required("_p0")?.to_vec4_with_w(1.0);
        let invalid_w = positions.iter().filter(|p| p[3] != 1.0).count();
        if invalid_w > 0 {
            warn!(
                "Shape {:?} has {} vertices with a position W coordinate other than 1.",
                shape.name, invalid_w
            );
        }

        let normals = vertices.read("_n0")?.map(|n| n.to_vec4_with_w(0.0));
        let colors = vertices.read("_c0")?.map(|c| c.to_vec4_with_w(1.0));
        let bone_indices = vertices.read("_i0")?.map(|i| i.to_vec4_with_w(0.0));
        let weights = vertices.read("_w0")?.map(|w| w.to_vec4_with_w(0.0));

        let texture_coordinates = read_texture_coordinates(&vertices, options.flip_vertical)?;

        let transforms = vertex_transforms(
            shape,
            skel,
            bone_indices.as_deref(),
            positions.len(),
        )?;
        let (positions, normals) = match transforms {
            Some(transforms) => (
                positions
                    .iter()
                    .zip(transforms.iter())
                    .map(|(p, m)| m.transform_point3(Vec3::new(p[0], p[1], p[2])).to_array())
                    .collect_vec(),
                normals.map(|normals| {
                    normals
                        .iter()
                        .zip(transforms.iter())
                        .map(|(n, m)| transform_normal(m, n))
                        .collect_vec()
                }),
            ),
            None => (
                positions.iter().map(|p| [p[0], p[1], p[2]]).collect_vec(),
                normals.map(|normals| normals.iter().map(|n| [n[0], n[1], n[2]]).collect_vec()),
            ),
        };

        let bone_influences = bone_influences(
            shape,
            skel,
            model,
            bone_indices.as_deref(),
            weights.as_deref(),
            positions.len(),
        )?;

        check_finite(&shape.name, "_p0", positions.iter().flatten());
        if let Some(normals) = &normals {
            check_finite(&shape.name, "_n0", normals.iter().flatten());
        }

        Ok(Self {
            name: shape.name.clone(),
            material_name: model
                .materials
                .get_index(shape.material_index as usize)
                .map(|m| m.name.clone()),
            lod_index,
            vertex_skin_count: shape.vertex_skin_count,
            primitive_type,
            primitives: primitives(&indices, primitive_type),
            positions,
            normals,
            colors,
            texture_coordinates,
            bone_influences,
        })
    }
}

/// Groups indices into primitives.
/// Trailing indices that do not form a complete primitive are ignored.
pub fn primitives(indices: &[u32], primitive_type: PrimitiveType) -> Vec<Vec<u32>> {
    let count = primitive_type.vertices_per_primitive();
    (0..indices.len())
        .step_by(primitive_type.step())
        .filter_map(|i| indices.get(i..i + count))
        .map(|p| p.to_vec())
        .collect()
}

fn read_texture_coordinates(
    vertices: &ShapeVertices,
    flip_vertical: bool,
) -> Result<Vec<UvData>, DecodeError> {
    let mut texture_coordinates = Vec::new();
    for i in 0.. {
        let name = format!("_u{}", i);
        match vertices.read(&name)? {
            Some(data) => {
                let data = data
                    .to_vec4_with_w(0.0)
                    .iter()
                    .map(|[u, v, _, _]| if flip_vertical { [*u, 1.0 - v] } else { [*u, *v] })
                    .collect();
                texture_coordinates.push(UvData { name, data });
            }
            None => break,
        }
    }
    Ok(texture_coordinates)
}

/// The transform for each vertex or `None` if the vertices are already in model space.
fn vertex_transforms(
    shape: &Shape,
    skel: &SkelData,
    bone_indices: Option<&[[f32; 4]]>,
    vertex_count: usize,
) -> Result<Option<Vec<Mat4>>, DecodeError> {
    match shape.vertex_skin_count {
        0 => {
            let transform = skel
                .world_transform(shape.bone_index as usize)
                .ok_or_else(|| {
                    DecodeError::MalformedFile(format!(
                        "Shape {:?} has invalid bone index {}.",
                        shape.name, shape.bone_index
                    ))
                })?;
            Ok(Some(vec![transform; vertex_count]))
        }
        1 => {
            let bone_indices = bone_indices.ok_or_else(|| {
                DecodeError::MalformedFile(format!(
                    "Shape {:?} with a skin count of 1 is missing \"_i0\".",
                    shape.name
                ))
            })?;
            bone_indices
                .iter()
                .map(|i| {
                    let matrix_index = i[0] as usize;
                    skel.matrix_world_transform(matrix_index).ok_or_else(|| {
                        DecodeError::MalformedFile(format!(
                            "Shape {:?} references invalid matrix index {}.",
                            shape.name, matrix_index
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some)
        }
        _ => Ok(None),
    }
}

/// Applies only the rotation of `transform` to `normal`.
fn transform_normal(transform: &Mat4, normal: &[f32; 4]) -> [f32; 3] {
    let (_, rotation, _) = transform.to_scale_rotation_translation();
    (rotation * Vec3::new(normal[0], normal[1], normal[2])).to_array()
}

fn bone_influences(
    shape: &Shape,
    skel: &SkelData,
    model: &Model,
    bone_indices: Option<&[[f32; 4]]>,
    weights: Option<&[[f32; 4]]>,
    vertex_count: usize,
) -> Result<Vec<BoneInfluence>, DecodeError> {
    // Each bone index has a list of weights.
    let mut bone_weights: Vec<Vec<VertexWeight>> = vec![Vec::new(); skel.bones.len()];

    match shape.vertex_skin_count {
        0 => {
            let weights = bone_weights
                .get_mut(shape.bone_index as usize)
                .ok_or_else(|| {
                    DecodeError::MalformedFile(format!(
                        "Shape {:?} has invalid bone index {}.",
                        shape.name, shape.bone_index
                    ))
                })?;
            weights.extend((0..vertex_count).map(|i| VertexWeight {
                vertex_index: i as u32,
                vertex_weight: 1.0,
            }));
        }
        skin_count => {
            let groups = skel.matrix_groups();
            let bone_indices = match bone_indices {
                Some(bone_indices) => bone_indices,
                None => {
                    warn!("Shape {:?} is skinned but has no \"_i0\".", shape.name);
                    return Ok(Vec::new());
                }
            };

            if skin_count == 1 {
                for (i, indices) in bone_indices.iter().enumerate() {
                    if let Some(bone) = groups.get(&(indices[0] as usize)) {
                        bone_weights[*bone].push(VertexWeight {
                            vertex_index: i as u32,
                            vertex_weight: 1.0,
                        });
                    }
                }
            } else if let Some(weights) = weights {
                let count = (skin_count as usize).min(MAX_INFLUENCES);
                for (i, (indices, weights)) in bone_indices.iter().zip(weights.iter()).enumerate()
                {
                    for (index, weight) in indices.iter().zip(weights.iter()).take(count) {
                        // Unknown groups are skipped.
                        if *weight > 0.0 {
                            if let Some(bone) = groups.get(&(*index as usize)) {
                                bone_weights[*bone].push(VertexWeight {
                                    vertex_index: i as u32,
                                    vertex_weight: *weight,
                                });
                            }
                        }
                    }
                }
            } else {
                warn!("Shape {:?} has no \"_w0\" weights.", shape.name);
            }
        }
    }

    Ok(bone_weights
        .into_iter()
        .enumerate()
        .filter(|(_, weights)| !weights.is_empty())
        .filter_map(|(i, vertex_weights)| {
            let bone = model.skeleton.bones.get_index(i)?;
            Some(BoneInfluence {
                bone_name: bone.name.clone(),
                vertex_weights,
            })
        })
        .collect())
}

fn check_finite<'a>(shape: &str, attribute: &str, values: impl Iterator<Item = &'a f32>) {
    let count = values.filter(|v| !v.is_finite()).count();
    if count > 0 {
        warn!(
            "Shape {:?} has {} NaN or infinite values in {:?}.",
            shape, count, attribute
        );
    }
}
