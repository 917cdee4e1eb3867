//! Material and texture inputs
//!
//! Decoded pixel buffers arrive from the asset layer as [`TextureData`]; the
//! backend decides the GPU format from the channel layout and the texture's
//! role.

/// Channel order of a decoded pixel buffer, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    /// Single channel
    R,
    /// Two channels
    Rg,
    /// Red, green, blue
    Rgb,
    /// Red, green, blue, alpha
    Rgba,
    /// Blue, green, red
    Bgr,
    /// Blue, green, red, alpha
    Bgra,
}

impl PixelLayout {
    /// Bytes per pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::R => 1,
            Self::Rg => 2,
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra => 4,
        }
    }

    /// Four-channel layout with the same channel order
    pub const fn with_alpha(self) -> Self {
        match self {
            Self::Bgr | Self::Bgra => Self::Bgra,
            _ => Self::Rgba,
        }
    }

    /// Expand three-channel pixels to four channels with opaque alpha.
    /// Other layouts are returned unchanged.
    pub fn expand_to_alpha(self, pixels: &[u8]) -> Vec<u8> {
        match self {
            Self::Rgb | Self::Bgr => pixels
                .chunks_exact(3)
                .flat_map(|px| [px[0], px[1], px[2], u8::MAX])
                .collect(),
            _ => pixels.to_vec(),
        }
    }
}

/// Role of a texture inside a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Albedo / base color
    BaseColor,
    /// Tangent-space normals
    Normal,
    /// Metalness
    Metallic,
    /// Roughness
    Roughness,
    /// Ambient occlusion
    AmbientOcclusion,
    /// Height / displacement
    HeightMap,
    /// Emissive color
    Emissive,
}

impl TextureKind {
    /// Whether texels hold sRGB-encoded color
    pub const fn is_srgb(self) -> bool {
        matches!(self, Self::BaseColor | Self::Emissive)
    }
}

/// Decoded texture ready for upload
#[derive(Debug, Clone)]
pub struct TextureData {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Channel layout of `pixels`
    pub layout: PixelLayout,
    /// Role, selects sRGB or linear sampling
    pub kind: TextureKind,
    /// Row-major pixel bytes
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Expected byte length for the declared size and layout
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.bytes_per_pixel()
    }

    /// Whether `pixels` matches the declared size and layout
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixels.len() == self.expected_len()
    }
}

/// Surface description of a mesh
#[derive(Debug, Clone)]
pub struct Material {
    /// Display name
    pub name: String,
    /// Base color factor, linear RGBA
    pub base_color: [f32; 4],
    /// Optional base color texture
    pub base_color_texture: Option<TextureData>,
}

impl Material {
    /// Untextured material with a solid color
    pub fn solid(name: impl Into<String>, base_color: [f32; 4]) -> Self {
        Self {
            name: name.into(),
            base_color,
            base_color_texture: None,
        }
    }

    /// Attach a base color texture
    #[must_use]
    pub fn with_texture(mut self, texture: TextureData) -> Self {
        self.base_color_texture = Some(texture);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Color maps are sRGB, data maps stay linear
    #[test]
    fn test_texture_kind_color_space() {
        assert!(TextureKind::BaseColor.is_srgb());
        assert!(TextureKind::Emissive.is_srgb());
        assert!(!TextureKind::Normal.is_srgb());
        assert!(!TextureKind::Roughness.is_srgb());
        assert!(!TextureKind::HeightMap.is_srgb());
    }

    /// Three-channel pixels gain an opaque alpha byte
    #[test]
    fn test_expand_to_alpha() {
        let rgb = [10, 20, 30, 40, 50, 60];
        assert_eq!(
            PixelLayout::Rgb.expand_to_alpha(&rgb),
            vec![10, 20, 30, 255, 40, 50, 60, 255]
        );
        assert_eq!(PixelLayout::Bgr.with_alpha(), PixelLayout::Bgra);
        assert_eq!(PixelLayout::Rgb.with_alpha(), PixelLayout::Rgba);
        assert_eq!(PixelLayout::Rgba.expand_to_alpha(&[1, 2, 3, 4]), vec![1, 2, 3, 4]);
    }

    /// Pixel buffers must match their declared dimensions
    #[test]
    fn test_texture_well_formed() {
        let mut texture = TextureData {
            width: 2,
            height: 2,
            layout: PixelLayout::Rgba,
            kind: TextureKind::BaseColor,
            pixels: vec![0; 16],
        };
        assert!(texture.is_well_formed());

        texture.pixels.pop();
        assert!(!texture.is_well_formed());
        assert_eq!(texture.expected_len(), 16);
    }
}
