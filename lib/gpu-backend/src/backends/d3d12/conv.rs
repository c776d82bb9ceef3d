//! Portable-state to D3D12/DXGI conversion tables.

use gpu_types::formats::{IndexElementSize, SampleCount, TextureFormat, VertexElementFormat};
use gpu_types::passes::SwapchainComposition;
use gpu_types::state::{
    BlendFactor, BlendOp, ColorComponentFlags, CompareOp, CullMode, FillMode, Filter,
    PrimitiveType, SamplerAddressMode, SamplerMipmapMode, StencilOp,
};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

pub fn texture_format(format: TextureFormat) -> DXGI_FORMAT {
    match format {
        TextureFormat::Invalid => DXGI_FORMAT_UNKNOWN,
        TextureFormat::R8Unorm => DXGI_FORMAT_R8_UNORM,
        TextureFormat::R8G8Unorm => DXGI_FORMAT_R8G8_UNORM,
        TextureFormat::R8G8B8A8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        TextureFormat::B8G8R8A8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        TextureFormat::B8G8R8A8UnormSrgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        TextureFormat::R10G10B10A2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
        TextureFormat::R16G16B16A16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        TextureFormat::R32G32B32A32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
        TextureFormat::R8Uint => DXGI_FORMAT_R8_UINT,
        TextureFormat::R16Uint => DXGI_FORMAT_R16_UINT,
        TextureFormat::R32Uint => DXGI_FORMAT_R32_UINT,
        TextureFormat::D16Unorm => DXGI_FORMAT_D16_UNORM,
        TextureFormat::D24UnormS8Uint => DXGI_FORMAT_D24_UNORM_S8_UINT,
        TextureFormat::D32Float => DXGI_FORMAT_D32_FLOAT,
        TextureFormat::D32FloatS8Uint => DXGI_FORMAT_D32_FLOAT_S8X24_UINT,
    }
}

/// Back-buffer resource formats are created without the sRGB flag; the sRGB
/// flavor only exists on the render-target view.
pub fn swapchain_format(composition: SwapchainComposition) -> DXGI_FORMAT {
    match composition {
        SwapchainComposition::Sdr | SwapchainComposition::SdrLinear => DXGI_FORMAT_B8G8R8A8_UNORM,
        SwapchainComposition::Hdr => DXGI_FORMAT_R16G16B16A16_FLOAT,
        SwapchainComposition::HdrAdvanced => DXGI_FORMAT_R10G10B10A2_UNORM,
    }
}

pub fn swapchain_rtv_format(composition: SwapchainComposition) -> DXGI_FORMAT {
    match composition {
        SwapchainComposition::SdrLinear => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        other => swapchain_format(other),
    }
}

pub fn swapchain_color_space(composition: SwapchainComposition) -> DXGI_COLOR_SPACE_TYPE {
    match composition {
        SwapchainComposition::Sdr | SwapchainComposition::SdrLinear => {
            DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709
        }
        SwapchainComposition::Hdr => DXGI_COLOR_SPACE_RGB_FULL_G10_NONE_P709,
        SwapchainComposition::HdrAdvanced => DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020,
    }
}

pub fn vertex_format(format: VertexElementFormat) -> DXGI_FORMAT {
    match format {
        VertexElementFormat::Float1 => DXGI_FORMAT_R32_FLOAT,
        VertexElementFormat::Float2 => DXGI_FORMAT_R32G32_FLOAT,
        VertexElementFormat::Float3 => DXGI_FORMAT_R32G32B32_FLOAT,
        VertexElementFormat::Float4 => DXGI_FORMAT_R32G32B32A32_FLOAT,
        VertexElementFormat::Byte4Norm => DXGI_FORMAT_R8G8B8A8_SNORM,
        VertexElementFormat::Ubyte4Norm => DXGI_FORMAT_R8G8B8A8_UNORM,
        VertexElementFormat::Short2 => DXGI_FORMAT_R16G16_SINT,
        VertexElementFormat::Short4 => DXGI_FORMAT_R16G16B16A16_SINT,
        VertexElementFormat::Uint1 => DXGI_FORMAT_R32_UINT,
    }
}

pub fn index_format(size: IndexElementSize) -> DXGI_FORMAT {
    match size {
        IndexElementSize::Bits16 => DXGI_FORMAT_R16_UINT,
        IndexElementSize::Bits32 => DXGI_FORMAT_R32_UINT,
    }
}

pub fn sample_desc(count: SampleCount) -> DXGI_SAMPLE_DESC {
    DXGI_SAMPLE_DESC {
        Count: count.as_u32(),
        Quality: 0,
    }
}

/// The straight color-channel mapping.
pub fn blend_factor(factor: BlendFactor) -> D3D12_BLEND {
    match factor {
        BlendFactor::Zero => D3D12_BLEND_ZERO,
        BlendFactor::One => D3D12_BLEND_ONE,
        BlendFactor::SrcColor => D3D12_BLEND_SRC_COLOR,
        BlendFactor::OneMinusSrcColor => D3D12_BLEND_INV_SRC_COLOR,
        BlendFactor::DstColor => D3D12_BLEND_DEST_COLOR,
        BlendFactor::OneMinusDstColor => D3D12_BLEND_INV_DEST_COLOR,
        BlendFactor::SrcAlpha => D3D12_BLEND_SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => D3D12_BLEND_INV_SRC_ALPHA,
        BlendFactor::DstAlpha => D3D12_BLEND_DEST_ALPHA,
        BlendFactor::OneMinusDstAlpha => D3D12_BLEND_INV_DEST_ALPHA,
        BlendFactor::ConstantColor => D3D12_BLEND_BLEND_FACTOR,
        BlendFactor::OneMinusConstantColor => D3D12_BLEND_INV_BLEND_FACTOR,
        BlendFactor::SrcAlphaSaturate => D3D12_BLEND_SRC_ALPHA_SAT,
    }
}

/// The alpha-channel mapping. D3D12 rejects color factors in the alpha
/// slots, so the color enumerants remap to their alpha counterparts. Other
/// back-end families behave this way implicitly; the remap keeps the
/// observable blending identical.
pub fn alpha_blend_factor(factor: BlendFactor) -> D3D12_BLEND {
    match factor {
        BlendFactor::SrcColor => D3D12_BLEND_SRC_ALPHA,
        BlendFactor::OneMinusSrcColor => D3D12_BLEND_INV_SRC_ALPHA,
        BlendFactor::DstColor => D3D12_BLEND_DEST_ALPHA,
        BlendFactor::OneMinusDstColor => D3D12_BLEND_INV_DEST_ALPHA,
        other => blend_factor(other),
    }
}

pub fn blend_op(op: BlendOp) -> D3D12_BLEND_OP {
    match op {
        BlendOp::Add => D3D12_BLEND_OP_ADD,
        BlendOp::Subtract => D3D12_BLEND_OP_SUBTRACT,
        BlendOp::RevSubtract => D3D12_BLEND_OP_REV_SUBTRACT,
        BlendOp::Min => D3D12_BLEND_OP_MIN,
        BlendOp::Max => D3D12_BLEND_OP_MAX,
    }
}

pub fn write_mask(mask: ColorComponentFlags) -> u8 {
    let mut out = 0u8;
    if mask.contains(ColorComponentFlags::R) {
        out |= D3D12_COLOR_WRITE_ENABLE_RED.0 as u8;
    }
    if mask.contains(ColorComponentFlags::G) {
        out |= D3D12_COLOR_WRITE_ENABLE_GREEN.0 as u8;
    }
    if mask.contains(ColorComponentFlags::B) {
        out |= D3D12_COLOR_WRITE_ENABLE_BLUE.0 as u8;
    }
    if mask.contains(ColorComponentFlags::A) {
        out |= D3D12_COLOR_WRITE_ENABLE_ALPHA.0 as u8;
    }
    out
}

pub fn compare_op(op: CompareOp) -> D3D12_COMPARISON_FUNC {
    match op {
        CompareOp::Never => D3D12_COMPARISON_FUNC_NEVER,
        CompareOp::Less => D3D12_COMPARISON_FUNC_LESS,
        CompareOp::Equal => D3D12_COMPARISON_FUNC_EQUAL,
        CompareOp::LessOrEqual => D3D12_COMPARISON_FUNC_LESS_EQUAL,
        CompareOp::Greater => D3D12_COMPARISON_FUNC_GREATER,
        CompareOp::NotEqual => D3D12_COMPARISON_FUNC_NOT_EQUAL,
        CompareOp::GreaterOrEqual => D3D12_COMPARISON_FUNC_GREATER_EQUAL,
        CompareOp::Always => D3D12_COMPARISON_FUNC_ALWAYS,
    }
}

pub fn stencil_op(op: StencilOp) -> D3D12_STENCIL_OP {
    match op {
        StencilOp::Keep => D3D12_STENCIL_OP_KEEP,
        StencilOp::Zero => D3D12_STENCIL_OP_ZERO,
        StencilOp::Replace => D3D12_STENCIL_OP_REPLACE,
        StencilOp::IncrementAndClamp => D3D12_STENCIL_OP_INCR_SAT,
        StencilOp::DecrementAndClamp => D3D12_STENCIL_OP_DECR_SAT,
        StencilOp::Invert => D3D12_STENCIL_OP_INVERT,
        StencilOp::IncrementAndWrap => D3D12_STENCIL_OP_INCR,
        StencilOp::DecrementAndWrap => D3D12_STENCIL_OP_DECR,
    }
}

pub fn fill_mode(mode: FillMode) -> D3D12_FILL_MODE {
    match mode {
        FillMode::Fill => D3D12_FILL_MODE_SOLID,
        FillMode::Line => D3D12_FILL_MODE_WIREFRAME,
    }
}

pub fn cull_mode(mode: CullMode) -> D3D12_CULL_MODE {
    match mode {
        CullMode::None => D3D12_CULL_MODE_NONE,
        CullMode::Front => D3D12_CULL_MODE_FRONT,
        CullMode::Back => D3D12_CULL_MODE_BACK,
    }
}

pub fn topology_type(primitive: PrimitiveType) -> D3D12_PRIMITIVE_TOPOLOGY_TYPE {
    match primitive {
        PrimitiveType::TriangleList | PrimitiveType::TriangleStrip => {
            D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE
        }
        PrimitiveType::LineList | PrimitiveType::LineStrip => D3D12_PRIMITIVE_TOPOLOGY_TYPE_LINE,
        PrimitiveType::PointList => D3D12_PRIMITIVE_TOPOLOGY_TYPE_POINT,
    }
}

pub fn topology(primitive: PrimitiveType) -> D3D_PRIMITIVE_TOPOLOGY {
    match primitive {
        PrimitiveType::TriangleList => D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
        PrimitiveType::TriangleStrip => D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
        PrimitiveType::LineList => D3D_PRIMITIVE_TOPOLOGY_LINELIST,
        PrimitiveType::LineStrip => D3D_PRIMITIVE_TOPOLOGY_LINESTRIP,
        PrimitiveType::PointList => D3D_PRIMITIVE_TOPOLOGY_POINTLIST,
    }
}

pub fn sampler_filter(
    min: Filter,
    mag: Filter,
    mip: SamplerMipmapMode,
    anisotropic: bool,
) -> D3D12_FILTER {
    if anisotropic {
        return D3D12_FILTER_ANISOTROPIC;
    }
    // D3D12 packs min/mag/mip into one bitfield: mip at bit 0, mag at bit 2,
    // min at bit 4
    let mut bits = 0i32;
    if mip == SamplerMipmapMode::Linear {
        bits |= 0x1;
    }
    if mag == Filter::Linear {
        bits |= 0x4;
    }
    if min == Filter::Linear {
        bits |= 0x10;
    }
    D3D12_FILTER(bits)
}

pub fn address_mode(mode: SamplerAddressMode) -> D3D12_TEXTURE_ADDRESS_MODE {
    match mode {
        SamplerAddressMode::Repeat => D3D12_TEXTURE_ADDRESS_MODE_WRAP,
        SamplerAddressMode::MirroredRepeat => D3D12_TEXTURE_ADDRESS_MODE_MIRROR,
        SamplerAddressMode::ClampToEdge => D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
    }
}

pub fn present_flags(mode: gpu_types::passes::PresentMode, allow_tearing: bool) -> (u32, u32) {
    match mode {
        gpu_types::passes::PresentMode::Vsync => (1, 0),
        gpu_types::passes::PresentMode::Immediate => {
            if allow_tearing {
                (0, DXGI_PRESENT_ALLOW_TEARING.0)
            } else {
                (0, 0)
            }
        }
        gpu_types::passes::PresentMode::Mailbox => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_channel_remaps_color_factors() {
        assert_eq!(alpha_blend_factor(BlendFactor::SrcColor), D3D12_BLEND_SRC_ALPHA);
        assert_eq!(
            alpha_blend_factor(BlendFactor::OneMinusSrcColor),
            D3D12_BLEND_INV_SRC_ALPHA
        );
        assert_eq!(alpha_blend_factor(BlendFactor::DstColor), D3D12_BLEND_DEST_ALPHA);
        assert_eq!(
            alpha_blend_factor(BlendFactor::OneMinusDstColor),
            D3D12_BLEND_INV_DEST_ALPHA
        );
        // the straight mapping differs for the same enumerants
        assert_eq!(blend_factor(BlendFactor::SrcColor), D3D12_BLEND_SRC_COLOR);
        // non-color factors pass through unchanged
        assert_eq!(alpha_blend_factor(BlendFactor::One), D3D12_BLEND_ONE);
        assert_eq!(
            alpha_blend_factor(BlendFactor::SrcAlpha),
            D3D12_BLEND_SRC_ALPHA
        );
    }

    #[test]
    fn srgb_composition_keeps_unorm_backbuffer() {
        assert_eq!(
            swapchain_format(SwapchainComposition::SdrLinear),
            DXGI_FORMAT_B8G8R8A8_UNORM
        );
        assert_eq!(
            swapchain_rtv_format(SwapchainComposition::SdrLinear),
            DXGI_FORMAT_B8G8R8A8_UNORM_SRGB
        );
    }
}
