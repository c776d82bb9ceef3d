use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

/// Portable texture formats. Only formats every supported back-end family can
/// express are listed; a back-end rejects what its runtime cannot create.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize,
)]
pub enum TextureFormat {
    #[default]
    Invalid,
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    B8G8R8A8Unorm,
    B8G8R8A8UnormSrgb,
    R10G10B10A2Unorm,
    R16G16B16A16Float,
    R32G32B32A32Float,
    R8Uint,
    R16Uint,
    R32Uint,
    D16Unorm,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8Uint,
}

impl TextureFormat {
    /// Size in bytes of one texel block. All listed formats are 1x1 blocks.
    pub fn texel_block_size(&self) -> usize {
        match self {
            Self::Invalid => 0,
            Self::R8Unorm | Self::R8Uint => 1,
            Self::R8G8Unorm | Self::R16Uint | Self::D16Unorm => 2,
            Self::R8G8B8A8Unorm
            | Self::R8G8B8A8UnormSrgb
            | Self::B8G8R8A8Unorm
            | Self::B8G8R8A8UnormSrgb
            | Self::R10G10B10A2Unorm
            | Self::R32Uint
            | Self::D24UnormS8Uint
            | Self::D32Float => 4,
            Self::R16G16B16A16Float | Self::D32FloatS8Uint => 8,
            Self::R32G32B32A32Float => 16,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::R8Uint | Self::R16Uint | Self::R32Uint)
    }

    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::D16Unorm | Self::D24UnormS8Uint | Self::D32Float | Self::D32FloatS8Uint
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    /// Whether render-target writes in this format are stored linearly
    /// (the 2D renderer linearizes its draw colors for such targets).
    pub fn is_linear(&self) -> bool {
        matches!(
            self,
            Self::R8G8B8A8UnormSrgb | Self::B8G8R8A8UnormSrgb | Self::R16G16B16A16Float
        )
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexElementFormat {
    Float1,
    #[default]
    Float2,
    Float3,
    Float4,
    Byte4Norm,
    Ubyte4Norm,
    Short2,
    Short4,
    Uint1,
}

impl VertexElementFormat {
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Float1 | Self::Byte4Norm | Self::Ubyte4Norm | Self::Short2 | Self::Uint1 => 4,
            Self::Float2 | Self::Short4 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexElementSize {
    #[default]
    Bits16,
    Bits32,
}

impl IndexElementSize {
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Bits16 => 2,
            Self::Bits32 => 4,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleCount {
    #[default]
    S1,
    S2,
    S4,
    S8,
}

impl SampleCount {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::S1 => 1,
            Self::S2 => 2,
            Self::S4 => 4,
            Self::S8 => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texel_block_sizes() {
        assert_eq!(TextureFormat::B8G8R8A8Unorm.texel_block_size(), 4);
        assert_eq!(TextureFormat::R16G16B16A16Float.texel_block_size(), 8);
        assert_eq!(TextureFormat::R32G32B32A32Float.texel_block_size(), 16);
        assert_eq!(TextureFormat::R8Unorm.texel_block_size(), 1);
        assert_eq!(TextureFormat::Invalid.texel_block_size(), 0);
    }

    #[test]
    fn format_predicates() {
        assert!(TextureFormat::R16Uint.is_integer());
        assert!(!TextureFormat::R8G8B8A8Unorm.is_integer());
        assert!(TextureFormat::D24UnormS8Uint.is_depth_stencil());
        assert!(TextureFormat::D24UnormS8Uint.has_stencil());
        assert!(!TextureFormat::D32Float.has_stencil());
        assert!(TextureFormat::B8G8R8A8UnormSrgb.is_linear());
    }
}
