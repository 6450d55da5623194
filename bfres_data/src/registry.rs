//! Lookup of the texture decoder for each BNTX format id.
//!
//! The default codecs are registered explicitly in [TextureFormatRegistry::with_default_codecs].
//! ASTC formats can be deswizzled by [bfres_lib] but have no decoder.
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::bcn::bc1::{Bc1, Bc2, Bc3};
use crate::bcn::bc4::{Bc4, Bc5};
use crate::bcn::bc6h::Bc6h;
use crate::bcn::bc7::Bc7;
use crate::bcn::rgb;
use crate::bcn::TextureCodec;
use bfres_lib::formats::bntx::TextureDataType;
use bfres_lib::DecodeError;

/// A mapping from format id to the codec that decodes it.
#[derive(Default)]
pub struct TextureFormatRegistry {
    codecs: BTreeMap<u8, Box<dyn TextureCodec>>,
}

impl TextureFormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with codecs for all the BC and packed uncompressed formats.
    pub fn with_default_codecs() -> Self {
        let mut registry = Self::new();
        registry.register(0x01, rgb::R4_G4);
        registry.register(0x02, rgb::R8);
        registry.register(0x03, rgb::R4_G4_B4_A4);
        registry.register(0x05, rgb::R5_G5_B5_A1);
        registry.register(0x07, rgb::R5_G6_B5);
        registry.register(0x09, rgb::R8_G8);
        registry.register(0x0B, rgb::R8_G8_B8_A8);
        registry.register(0x0C, rgb::B8_G8_R8_A8);
        registry.register(0x0E, rgb::R10_G10_B10_A2);
        registry.register(0x1A, Bc1);
        registry.register(0x1B, Bc2);
        registry.register(0x1C, Bc3);
        registry.register(0x1D, Bc4);
        registry.register(0x1E, Bc5);
        registry.register(0x1F, Bc6h);
        registry.register(0x20, Bc7);
        registry
    }

    /// Adds or replaces the codec for `format`.
    pub fn register<C: TextureCodec + 'static>(&mut self, format: u8, codec: C) {
        self.codecs.insert(format, Box::new(codec));
    }

    pub fn get(&self, format: u8) -> Option<&dyn TextureCodec> {
        self.codecs.get(&format).map(|c| c.as_ref())
    }

    /// The registered format ids in ascending order.
    pub fn formats(&self) -> impl Iterator<Item = u8> + '_ {
        self.codecs.keys().copied()
    }

    /// Decodes `data` with the codec for `format`.
    pub fn decompress(
        &self,
        format: u8,
        width: u32,
        height: u32,
        data: &[u8],
        data_type: TextureDataType,
    ) -> Result<Vec<f32>, DecodeError> {
        self.get(format)
            .ok_or(DecodeError::UnsupportedFormat {
                kind: "texture format",
                value: format as u32,
            })?
            .decompress(width, height, data, data_type)
    }
}

/// The process wide registry of default codecs.
/// The registry is created on first use and is read only afterwards.
pub fn default_registry() -> &'static TextureFormatRegistry {
    static REGISTRY: OnceLock<TextureFormatRegistry> = OnceLock::new();
    REGISTRY.get_or_init(TextureFormatRegistry::with_default_codecs)
}
