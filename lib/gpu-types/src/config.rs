use serde::{Deserialize, Serialize};

use crate::resources::ShaderFormat;

pub const MAX_COLOR_TARGET_BINDINGS: usize = 4;
pub const MAX_VERTEX_BUFFER_BINDINGS: usize = 16;
pub const MAX_VERTEX_ATTRIBUTES: usize = 16;

pub const MAX_VERTEX_UNIFORM_BUFFERS: usize = 14;
pub const MAX_FRAGMENT_UNIFORM_BUFFERS: usize = 14;
pub const MAX_COMPUTE_UNIFORM_BUFFERS: usize = 14;
pub const MAX_VERTEX_SAMPLERS: usize = 16;
pub const MAX_FRAGMENT_SAMPLERS: usize = 16;
pub const MAX_COMPUTE_SAMPLERS: usize = 16;
/// Combined per-stage resource count: srv-like + uniforms + extra slots.
pub const MAX_STAGE_RESOURCES: usize = 128 + 14 + 8;
pub const MAX_COMPUTE_WRITE_TEXTURES: usize = 8;
pub const MAX_COMPUTE_WRITE_BUFFERS: usize = 8;

pub const MAX_TEXTURE_SIZE_2D: u32 = 16384;
pub const MAX_TEXTURE_SIZE_3D: u32 = 2048;

/// Size of one pooled uniform ring buffer lease.
pub const UNIFORM_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuDriverKind {
    D3D12,
    /// Headless driver, always compiled in. Accepts every operation and
    /// completes all work immediately.
    #[default]
    Null,
}

impl GpuDriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::D3D12 => "direct3d12",
            Self::Null => "null",
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuType {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    #[default]
    Unknown,
}

/// Recognized device-creation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Shader formats the caller will supply. A driver is selectable only
    /// when at least one of its advertised formats is requested.
    pub shader_formats: ShaderFormat,
    /// Enables argument and invariant validation in the front-end.
    pub debug_mode: bool,
    /// Prefer an integrated adapter over a discrete one.
    pub prefer_low_power: bool,
    /// Force a driver by identifier; also the only way to select drivers
    /// flagged as not selectable by default.
    pub driver_name: Option<String>,
}
