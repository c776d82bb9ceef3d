use serde::{Deserialize, Serialize};

use crate::formats::TextureFormat;
use crate::resources::{BufferId, SamplerId, TextureId, TransferBufferId};

#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadOp {
    #[default]
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorTargetInfo {
    pub texture: TextureId,
    pub mip_level: u32,
    pub layer: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: Color,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthStencilTargetInfo {
    pub texture: TextureId,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferBinding {
    pub buffer: BufferId,
    pub offset: u64,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSamplerBinding {
    pub texture: TextureId,
    pub sampler: SamplerId,
}

/// Source description for a texture upload/download; `pixels_per_row` and
/// `rows_per_layer` of zero mean tightly packed.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureTransferInfo {
    pub transfer_buffer: TransferBufferId,
    pub offset: u64,
    pub pixels_per_row: u32,
    pub rows_per_layer: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureRegion {
    pub texture: TextureId,
    pub mip_level: u32,
    pub layer: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBufferLocation {
    pub transfer_buffer: TransferBufferId,
    pub offset: u64,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferRegion {
    pub buffer: BufferId,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlitRegion {
    pub texture: TextureId,
    pub mip_level: u32,
    pub layer: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlitInfo {
    pub source: BlitRegion,
    pub destination: BlitRegion,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresentMode {
    #[default]
    Vsync,
    Immediate,
    Mailbox,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapchainComposition {
    #[default]
    Sdr,
    SdrLinear,
    Hdr,
    HdrAdvanced,
}

impl SwapchainComposition {
    /// The back-buffer format each composition maps to. The sRGB flavor
    /// shares the UNORM back-buffer format; only its render-target view
    /// differs.
    pub fn texture_format(&self) -> TextureFormat {
        match self {
            Self::Sdr => TextureFormat::B8G8R8A8Unorm,
            Self::SdrLinear => TextureFormat::B8G8R8A8UnormSrgb,
            Self::Hdr => TextureFormat::R16G16B16A16Float,
            Self::HdrAdvanced => TextureFormat::R10G10B10A2Unorm,
        }
    }
}
