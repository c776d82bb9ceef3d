use serde::{Deserialize, Serialize};

use crate::formats::{SampleCount, TextureFormat};
use crate::state::{
    CompareOp, DepthStencilState, Filter, GraphicsPipelineTargetInfo, PrimitiveType,
    RasterizerState, SamplerAddressMode, SamplerMipmapMode, VertexInputState,
};

macro_rules! resource_id {
    ($name:ident) => {
        #[derive(
            Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u128);
    };
}

resource_id!(TextureId);
resource_id!(BufferId);
resource_id!(TransferBufferId);
resource_id!(SamplerId);
resource_id!(ShaderId);
resource_id!(GraphicsPipelineId);
resource_id!(ComputePipelineId);
resource_id!(FenceId);
resource_id!(WindowId);

bitflags::bitflags! {
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TextureUsage: u32 {
        const SAMPLER = 1 << 0;
        const COLOR_TARGET = 1 << 1;
        const DEPTH_STENCIL_TARGET = 1 << 2;
        const GRAPHICS_STORAGE_READ = 1 << 3;
        const COMPUTE_STORAGE_READ = 1 << 4;
        const COMPUTE_STORAGE_WRITE = 1 << 5;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const INDIRECT = 1 << 3;
        const GRAPHICS_STORAGE_READ = 1 << 4;
        const COMPUTE_STORAGE_READ = 1 << 5;
        const COMPUTE_STORAGE_WRITE = 1 << 6;
    }
}

bitflags::bitflags! {
    /// Shader blob formats a back-end can ingest. Doubles as the device
    /// creation request ("which formats will I hand you").
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ShaderFormat: u32 {
        const SECRET = 1 << 0;
        const SPIRV = 1 << 1;
        const DXBC = 1 << 2;
        const DXIL = 1 << 3;
        const MSL = 1 << 4;
        const METALLIB = 1 << 5;
        /// HLSL source text, compiled by the back-end at shader creation.
        const HLSL = 1 << 6;
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureType {
    #[default]
    D2,
    D2Array,
    Cube,
    D3,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureCreateInfo {
    pub format: TextureFormat,
    pub ty: TextureType,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layer_count: u32,
    pub level_count: u32,
    pub sample_count: SampleCount,
    pub usage: TextureUsage,
}

impl Default for TextureCreateInfo {
    fn default() -> Self {
        Self {
            format: TextureFormat::R8G8B8A8Unorm,
            ty: TextureType::D2,
            width: 1,
            height: 1,
            depth: 1,
            layer_count: 1,
            level_count: 1,
            sample_count: SampleCount::S1,
            usage: TextureUsage::SAMPLER,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferCreateInfo {
    pub usage: BufferUsage,
    pub size: u64,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferBufferUsage {
    #[default]
    Upload,
    Download,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBufferCreateInfo {
    pub usage: TransferBufferUsage,
    pub size: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerCreateInfo {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mipmap_mode: SamplerMipmapMode,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: Option<u32>,
    pub compare_op: Option<CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerCreateInfo {
    fn default() -> Self {
        Self {
            min_filter: Filter::Nearest,
            mag_filter: Filter::Nearest,
            mipmap_mode: SamplerMipmapMode::Nearest,
            address_mode_u: SamplerAddressMode::Repeat,
            address_mode_v: SamplerAddressMode::Repeat,
            address_mode_w: SamplerAddressMode::Repeat,
            mip_lod_bias: 0.0,
            max_anisotropy: None,
            compare_op: None,
            min_lod: 0.0,
            max_lod: 1000.0,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    #[default]
    Vertex,
    Fragment,
    Compute,
}

/// Per-stage resource counts a shader expects. They participate in the
/// back-end binding-layout synthesis and are validated against the fixed
/// limits at creation time.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderResourceCounts {
    pub sampler_count: u32,
    pub storage_texture_count: u32,
    pub storage_buffer_count: u32,
    pub uniform_buffer_count: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderCreateInfo {
    pub source: Vec<u8>,
    pub entry_point: String,
    pub format: ShaderFormat,
    pub stage: ShaderStage,
    pub counts: ShaderResourceCounts,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicsPipelineCreateInfo {
    pub vertex_shader: ShaderId,
    pub fragment_shader: ShaderId,
    pub vertex_input: VertexInputState,
    pub primitive_type: PrimitiveType,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub target_info: GraphicsPipelineTargetInfo,
    pub blend_constants: [f32; 4],
    pub stencil_reference: u8,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputePipelineCreateInfo {
    pub shader: ShaderId,
    pub thread_count: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_format_overlap() {
        let backend = ShaderFormat::DXBC | ShaderFormat::DXIL | ShaderFormat::HLSL;
        let requested = ShaderFormat::SPIRV | ShaderFormat::DXBC;
        assert!(backend.intersects(requested));
        assert_eq!(backend & requested, ShaderFormat::DXBC);
    }
}
