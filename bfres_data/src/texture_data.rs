//! Decoded RGBA images for BNTX textures.
use log::warn;

use crate::registry::TextureFormatRegistry;
use crate::ImportOptions;
use bfres_lib::formats::bntx::{ChannelType, Texture, TextureDataType};
use bfres_lib::DecodeError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const BC5_FORMAT: u8 = 0x1E;

/// The decoded base mip level of a texture.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// RGBA values for each pixel in row major order.
    /// This is empty if the texture did not contain enough data to decode.
    pub rgba: Vec<f32>,
    /// `true` if the values are linear data rather than sRGB color.
    pub is_data: bool,
    pub has_alpha: bool,
    /// `true` for high dynamic range formats with values outside 0.0 to 1.0.
    pub is_float: bool,
}

impl TextureImage {
    /// Decodes `texture` using the codec for its format in `registry`.
    ///
    /// Textures with incomplete data produce an image with empty [TextureImage::rgba].
    pub fn from_texture(
        texture: &Texture,
        registry: &TextureFormatRegistry,
        options: &ImportOptions,
    ) -> Result<Self, DecodeError> {
        let is_float = matches!(
            texture.data_type,
            TextureDataType::UHalf | TextureDataType::Single
        );
        let is_data = !is_float && texture.data_type != TextureDataType::Srgb;
        let has_alpha = texture.channel_types.contains(&ChannelType::Alpha);

        let rgba = match registry.decompress(
            texture.format,
            texture.width,
            texture.height,
            &texture.data,
            texture.data_type,
        ) {
            Ok(mut rgba) => {
                if options.reconstruct_normal_z && texture.format == BC5_FORMAT {
                    reconstruct_normal_z(&mut rgba);
                }
                if options.apply_channel_swizzle {
                    remap_channels(&mut rgba, &texture.channel_types);
                }
                if options.flip_vertical {
                    flip_vertical(&rgba, texture.width as usize)
                } else {
                    rgba
                }
            }
            Err(DecodeError::IncompleteData { expected, actual }) => {
                warn!(
                    "Texture '{}' is incomplete. Expected {} bytes but found {}.",
                    texture.name, expected, actual
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            name: texture.name.clone(),
            width: texture.width,
            height: texture.height,
            rgba,
            is_data,
            has_alpha,
            is_float,
        })
    }
}

/// Calculates the blue channel of a tangent space normal map from the red and green channels.
fn reconstruct_normal_z(rgba: &mut [f32]) {
    for pixel in rgba.chunks_exact_mut(4) {
        let x = pixel[0] * 2.0 - 1.0;
        let y = pixel[1] * 2.0 - 1.0;
        // Compression error can place the normal slightly outside the unit circle.
        let z = (1.0 - x * x - y * y).max(0.0).sqrt();
        pixel[2] = (z + 1.0) * 0.5;
        pixel[3] = 1.0;
    }
}

fn remap_channels(rgba: &mut [f32], channels: &[ChannelType; 4]) {
    for pixel in rgba.chunks_exact_mut(4) {
        let source = [pixel[0], pixel[1], pixel[2], pixel[3]];
        for (value, channel) in pixel.iter_mut().zip(channels.iter()) {
            *value = match channel {
                ChannelType::Zero => 0.0,
                ChannelType::One => 1.0,
                ChannelType::Red => source[0],
                ChannelType::Green => source[1],
                ChannelType::Blue => source[2],
                ChannelType::Alpha => source[3],
            };
        }
    }
}

/// Reverses the row order to convert from top to bottom rows to bottom to top rows.
fn flip_vertical(rgba: &[f32], width: usize) -> Vec<f32> {
    let row_size = width * 4;
    if row_size == 0 {
        return rgba.to_vec();
    }
    rgba.chunks_exact(row_size)
        .rev()
        .flat_map(|row| row.iter().copied())
        .collect()
}
