//! # bfres_data
//!
//! bfres_data converts the low level types of bfres_lib into decoded data
//! that can be used directly by rendering or scene assembly code.
//!
//! ## Features
//! - Decompression of BC1 to BC7 and packed uncompressed textures to RGBA floats
//! - Decoding of packed and normalized vertex attributes
//! - Skinned and rigid meshes with bone influences
//! - Skeleton world transforms and animation base poses
//! - Unwrapping of SARC archives and zstd or Yaz0 compression
//!
//! ## Getting Started
//! The simplest way to decode every model and texture in a file is [import_file].
/*!
```no_run
use bfres_data::{import_file, ImportOptions};

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let data = import_file("model.bfres.zs", &ImportOptions::default())?;
for model in &data.models {
    println!("{} {}", model.name, model.meshes.len());
}
for texture in &data.textures {
    println!("{} {}x{}", texture.name, texture.width, texture.height);
}
# Ok(())
# }
```
 */
//!
//! Failures for a single shape, material, or texture are logged with the [log] crate
//! and the remaining resources are still imported.
pub mod anim_data;
pub mod archive;
pub mod attribute;
pub mod bcn;
mod bitutils;
pub mod matl_data;
pub mod mesh_data;
pub mod registry;
pub mod skel_data;
pub mod texture_data;

use std::error::Error;
use std::path::Path;

use log::{debug, error, info, warn};

use anim_data::{bind_poses, AnimData};
use archive::{unwrap_container, FileType};
use bfres_lib::formats::bfres::ResFile;
use bfres_lib::formats::bntx::Bntx;
use bfres_lib::formats::model::Model;
use bfres_lib::{DecodeError, Endian, LoadLimits};
use matl_data::MatlData;
use mesh_data::MeshData;
use registry::{default_registry, TextureFormatRegistry};
use skel_data::SkelData;
use texture_data::TextureImage;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The maximum number of nested embedded files.
const MAX_EMBEDDED_DEPTH: usize = 4;

/// Settings for [import_bytes] and [import_file].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    /// The level of detail to decode for each shape.
    /// Values past the last level of detail use the last level of detail.
    pub lod_index: usize,
    /// Flip images and texture coordinates vertically.
    pub flip_vertical: bool,
    /// Remap texture channels using the texture's channel types.
    pub apply_channel_swizzle: bool,
    /// Calculate the blue channel of BC5 normal maps.
    pub reconstruct_normal_z: bool,
    pub import_animations: bool,
    /// The largest decoded texture or decompressed file in bytes.
    pub max_texture_bytes: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            lod_index: 0,
            flip_vertical: true,
            apply_channel_swizzle: true,
            reconstruct_normal_z: true,
            import_animations: true,
            max_texture_bytes: 256 * 1024 * 1024,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ModelData {
    pub name: String,
    pub skel: SkelData,
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MatlData>,
}

/// An embedded text file.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TextData {
    pub name: String,
    pub text: String,
}

/// The decoded contents of a file and its embedded files.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportData {
    pub models: Vec<ModelData>,
    pub textures: Vec<TextureImage>,
    pub animations: Vec<AnimData>,
    pub texts: Vec<TextData>,
}

/// Reads the file at `path` and decodes it with [import_bytes].
pub fn import_file<P: AsRef<Path>>(
    path: P,
    options: &ImportOptions,
) -> Result<ImportData, Box<dyn Error>> {
    let bytes = std::fs::read(path)?;
    Ok(import_bytes(&bytes, options)?)
}

/// Decodes a BFRES or BNTX file after removing any SARC, zstd, or Yaz0 layers.
///
/// Errors for the file header abort the import.
/// Errors for individual shapes, materials, textures, or embedded files are logged and skipped.
pub fn import_bytes(bytes: &[u8], options: &ImportOptions) -> Result<ImportData, DecodeError> {
    let mut importer = Importer {
        options,
        registry: default_registry(),
        data: ImportData::default(),
    };
    importer.import(bytes, 0)?;
    importer.warn_missing_textures();
    Ok(importer.data)
}

struct Importer<'a> {
    options: &'a ImportOptions,
    registry: &'a TextureFormatRegistry,
    data: ImportData,
}

impl<'a> Importer<'a> {
    fn limits(&self) -> LoadLimits {
        LoadLimits {
            max_surface_bytes: self.options.max_texture_bytes,
        }
    }

    fn import(&mut self, bytes: &[u8], depth: usize) -> Result<(), DecodeError> {
        let (file_type, bytes) = unwrap_container(bytes, self.options.max_texture_bytes)?;
        match file_type {
            FileType::Bntx => {
                let bntx = Bntx::from_bytes_with_limits(&bytes, self.limits())?;
                self.import_bntx(&bntx);
                Ok(())
            }
            _ => {
                let bfres = ResFile::from_bytes_with_limits(&bytes, self.limits())?;
                self.import_bfres(&bfres, depth);
                Ok(())
            }
        }
    }

    fn import_bfres(&mut self, bfres: &ResFile, depth: usize) {
        for (name, file) in bfres.external_files.iter() {
            self.import_embedded(name, &file.data, depth);
        }

        if self.options.import_animations {
            let poses = bind_poses(bfres.models.values());
            for anim in bfres.skeletal_anims.values() {
                info!("Importing animation '{}'...", anim.name);
                self.data
                    .animations
                    .push(AnimData::from_skeletal_anim(anim, &poses));
            }
        }

        for model in bfres.models.values() {
            info!("Importing model '{}'...", model.name);
            match self.import_model(model, &bfres.buffer_region, bfres.endian()) {
                Ok(model) => self.data.models.push(model),
                Err(e) => error!("Failed to import model '{}': {}", model.name, e),
            }
        }
    }

    fn import_model(
        &self,
        model: &Model,
        region: &[u8],
        endian: Endian,
    ) -> Result<ModelData, DecodeError> {
        let skel = SkelData::from_skeleton(&model.skeleton)?;

        let materials = model
            .materials
            .values()
            .iter()
            .filter_map(|m| {
                MatlData::from_material(m)
                    .map_err(|e| error!("Failed to import material '{}': {}", m.name, e))
                    .ok()
            })
            .collect();

        let meshes = model
            .shapes
            .values()
            .iter()
            .filter_map(|shape| {
                info!("Importing shape '{}'...", shape.name);
                MeshData::from_shape(shape, model, &skel, region, endian, self.options)
                    .map_err(|e| error!("Failed to import shape '{}': {}", shape.name, e))
                    .ok()
            })
            .collect();

        Ok(ModelData {
            name: model.name.clone(),
            skel,
            meshes,
            materials,
        })
    }

    fn import_bntx(&mut self, bntx: &Bntx) {
        let count = bntx.textures.len();
        for (i, texture) in bntx.textures.iter().enumerate() {
            let format = texture.format_info().map(|f| f.name).unwrap_or("unknown");
            info!(
                "Importing texture {:>3}/{:>3} '{}' ({})...",
                i + 1,
                count,
                texture.name,
                format
            );

            match TextureImage::from_texture(texture, self.registry, self.options) {
                Ok(image) => self.data.textures.push(image),
                Err(e) => error!("Failed to import texture '{}': {}", texture.name, e),
            }
        }
    }

    fn import_embedded(&mut self, name: &str, data: &[u8], depth: usize) {
        if name.ends_with(".txt") {
            self.data.texts.push(TextData {
                name: name.to_string(),
                text: String::from_utf8_lossy(data).into_owned(),
            });
        } else if data.is_empty() {
            debug!("Embedded file '{}' is empty.", name);
        } else if depth >= MAX_EMBEDDED_DEPTH {
            warn!(
                "Skipping embedded file '{}' nested more than {} levels deep.",
                name, MAX_EMBEDDED_DEPTH
            );
        } else {
            match self.import(data, depth + 1) {
                Ok(()) => (),
                Err(DecodeError::UnsupportedFileType { magic }) => {
                    debug!(
                        "Embedded file '{}' is of unsupported type {:?}.",
                        name, magic
                    )
                }
                Err(e) => error!("Failed to import embedded file '{}': {}", name, e),
            }
        }
    }

    fn warn_missing_textures(&self) {
        for material in self.data.models.iter().flat_map(|m| m.materials.iter()) {
            for assignment in &material.textures {
                if !self
                    .data
                    .textures
                    .iter()
                    .any(|t| t.name == assignment.texture_name)
                {
                    warn!(
                        "Missing texture '{}' for material '{}'.",
                        assignment.texture_name, material.name
                    );
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn hex_bytes(hex: &str) -> Vec<u8> {
    // Remove any whitespace used to make the tests more readable.
    let no_whitespace: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(no_whitespace).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    // A BNTX with a single 8x8 BC1 texture named "tex" with all zero blocks.
    fn bntx_bytes() -> Vec<u8> {
        hex_bytes(
            "424E5458 00000000 00000400 FFFE 0C 40
             00000000 0000 2000 00000000 08010000

             4E582020 01000000 5800000000000000
             0000000000000000 0000000000000000
             0000000000000000 0000000000000000
             00000000 00000000

             6000000000000000

             42525449 78000000 7800000000000000
             01 02 0100 0000 0100 0100 0000 01 1A 0000
             00000000 08000000 08000000 01000000
             01000000 00000000 00000000
             00000000 00000000 00000000 00000000 00000000
             20000000 00020000 02030405 01000000
             D800000000000000 0000000000000000 E000000000000000

             0300 746578 00 0000
             E800000000000000
             0000000000000000 0000000000000000
             0000000000000000 0000000000000000",
        )
    }

    #[test]
    fn import_bntx() {
        let data = import_bytes(&bntx_bytes(), &ImportOptions::default()).unwrap();
        assert!(data.models.is_empty());
        assert!(data.animations.is_empty());
        assert_eq!(1, data.textures.len());

        let texture = &data.textures[0];
        assert_eq!("tex", texture.name);
        assert_eq!(8, texture.width);
        assert_eq!(8, texture.height);
        assert!(texture.is_data);
        assert!(texture.has_alpha);

        // Zeroed BC1 blocks decode to opaque black.
        assert_eq!(8 * 8 * 4, texture.rgba.len());
        for pixel in texture.rgba.chunks_exact(4) {
            assert_eq!(&[0.0, 0.0, 0.0, 1.0], pixel);
        }
    }

    #[test]
    fn import_compressed_bntx() {
        let compressed = zstd::encode_all(&bntx_bytes()[..], 0).unwrap();
        let data = import_bytes(&compressed, &ImportOptions::default()).unwrap();
        assert_eq!(1, data.textures.len());
    }

    #[test]
    fn import_unsupported_file_type() {
        let result = import_bytes(b"Unknown", &ImportOptions::default());
        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedFileType { magic }) if &magic == b"Unkn"
        ));
    }

    #[test]
    fn import_bntx_texture_too_large() {
        let options = ImportOptions {
            max_texture_bytes: 16,
            ..Default::default()
        };
        // The texture is skipped when loading the BNTX.
        let data = import_bytes(&bntx_bytes(), &options).unwrap();
        assert!(data.textures.is_empty());
    }

    #[test]
    fn embedded_files() {
        let mut importer = Importer {
            options: &ImportOptions::default(),
            registry: default_registry(),
            data: ImportData::default(),
        };
        importer.import_embedded("readme.txt", b"hello", 0);
        importer.import_embedded("empty.bin", &[], 0);
        importer.import_embedded("unknown.bin", b"ABCD1234", 0);
        importer.import_embedded("textures.bntx", &bntx_bytes(), 0);
        importer.import_embedded("nested.bntx", &bntx_bytes(), MAX_EMBEDDED_DEPTH);

        assert_eq!(
            vec![TextData {
                name: "readme.txt".to_string(),
                text: "hello".to_string()
            }],
            importer.data.texts
        );
        assert_eq!(1, importer.data.textures.len());
    }

    #[test]
    fn default_options() {
        let options = ImportOptions::default();
        assert_eq!(0, options.lod_index);
        assert!(options.flip_vertical);
        assert!(options.apply_channel_swizzle);
        assert!(options.reconstruct_normal_z);
        assert!(options.import_animations);
        assert_eq!(256 * 1024 * 1024, options.max_texture_bytes);
    }
}
