//! Pipeline-state-object assembly from the portable create-info.

use std::collections::HashMap;

use anyhow::anyhow;
use gpu_types::resources::{
    ComputePipelineCreateInfo, GraphicsPipelineCreateInfo, ShaderId, ShaderResourceCounts,
};
use gpu_types::state::{PrimitiveType, VertexInputRate};
use windows::core::PCSTR;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT, DXGI_FORMAT_UNKNOWN};

use super::conv;
use super::root_signature::{
    create_root_signature, merged_counts, plan_root_signature, RootSignatureLayout,
};
use super::shader::D3d12Shader;

/// All vertex attributes use the `TEXCOORD<location>` semantic; the shader
/// toolchain emits HLSL with the same convention.
const VERTEX_SEMANTIC: PCSTR = PCSTR(b"TEXCOORD\0".as_ptr());

#[derive(Debug)]
pub struct D3d12GraphicsPipeline {
    pub pso: ID3D12PipelineState,
    pub root_signature: ID3D12RootSignature,
    pub layout: RootSignatureLayout,
    pub primitive_type: PrimitiveType,
    pub blend_constants: [f32; 4],
    pub stencil_reference: u8,
    pub vertex_counts: ShaderResourceCounts,
    pub fragment_counts: ShaderResourceCounts,
    /// Per-slot vertex strides; vertex-buffer views carry the stride here,
    /// not the input layout, so binds flush at draw time.
    pub vertex_strides: [u32; 16],
}

#[derive(Debug)]
pub struct D3d12ComputePipeline {
    pub pso: ID3D12PipelineState,
    pub root_signature: ID3D12RootSignature,
    pub layout: RootSignatureLayout,
    pub counts: ShaderResourceCounts,
}

fn shader_bytecode(bytes: &[u8]) -> D3D12_SHADER_BYTECODE {
    D3D12_SHADER_BYTECODE {
        pShaderBytecode: bytes.as_ptr() as *const _,
        BytecodeLength: bytes.len(),
    }
}

fn default_blend_desc() -> D3D12_RENDER_TARGET_BLEND_DESC {
    D3D12_RENDER_TARGET_BLEND_DESC {
        BlendEnable: false.into(),
        LogicOpEnable: false.into(),
        SrcBlend: D3D12_BLEND_ONE,
        DestBlend: D3D12_BLEND_ZERO,
        BlendOp: D3D12_BLEND_OP_ADD,
        SrcBlendAlpha: D3D12_BLEND_ONE,
        DestBlendAlpha: D3D12_BLEND_ZERO,
        BlendOpAlpha: D3D12_BLEND_OP_ADD,
        LogicOp: D3D12_LOGIC_OP_NOOP,
        RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
    }
}

pub fn create_graphics_pipeline(
    device: &ID3D12Device,
    info: &GraphicsPipelineCreateInfo,
    shaders: &HashMap<ShaderId, D3d12Shader>,
) -> anyhow::Result<D3d12GraphicsPipeline> {
    let vertex = shaders
        .get(&info.vertex_shader)
        .ok_or_else(|| anyhow!("unknown vertex shader"))?;
    let fragment = shaders
        .get(&info.fragment_shader)
        .ok_or_else(|| anyhow!("unknown fragment shader"))?;

    let layout = plan_root_signature(merged_counts(vertex.counts, fragment.counts))?;
    let root_signature = create_root_signature(device, &layout)?;

    // vertex input: semantic TEXCOORD<location>, classification and step
    // rate from the owning binding
    let mut input_elements: Vec<D3D12_INPUT_ELEMENT_DESC> =
        Vec::with_capacity(info.vertex_input.attributes.len());
    for attribute in &info.vertex_input.attributes {
        let binding = info
            .vertex_input
            .buffers
            .iter()
            .find(|b| b.slot == attribute.buffer_slot)
            .ok_or_else(|| anyhow!("vertex attribute references unbound slot"))?;
        let per_instance = binding.input_rate == VertexInputRate::Instance;
        input_elements.push(D3D12_INPUT_ELEMENT_DESC {
            SemanticName: VERTEX_SEMANTIC,
            SemanticIndex: attribute.location,
            Format: conv::vertex_format(attribute.format),
            InputSlot: attribute.buffer_slot,
            AlignedByteOffset: attribute.offset,
            InputSlotClass: if per_instance {
                D3D12_INPUT_CLASSIFICATION_PER_INSTANCE_DATA
            } else {
                D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA
            },
            InstanceDataStepRate: if per_instance {
                binding.instance_step_rate
            } else {
                0
            },
        });
    }

    let rasterizer = &info.rasterizer;
    let rasterizer_desc = D3D12_RASTERIZER_DESC {
        FillMode: conv::fill_mode(rasterizer.fill_mode),
        CullMode: conv::cull_mode(rasterizer.cull_mode),
        FrontCounterClockwise: (rasterizer.front_face
            == gpu_types::state::FrontFace::CounterClockwise)
            .into(),
        DepthBias: if rasterizer.depth_bias_enable {
            rasterizer.depth_bias_constant_factor.round() as i32
        } else {
            0
        },
        DepthBiasClamp: if rasterizer.depth_bias_enable {
            rasterizer.depth_bias_clamp
        } else {
            0.0
        },
        SlopeScaledDepthBias: if rasterizer.depth_bias_enable {
            rasterizer.depth_bias_slope_factor
        } else {
            0.0
        },
        DepthClipEnable: true.into(),
        MultisampleEnable: false.into(),
        AntialiasedLineEnable: false.into(),
        ForcedSampleCount: 0,
        ConservativeRaster: D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
    };

    let mut blend_desc = D3D12_BLEND_DESC {
        AlphaToCoverageEnable: false.into(),
        IndependentBlendEnable: false.into(),
        RenderTarget: [default_blend_desc(); 8],
    };
    for (slot, target) in info.target_info.color_targets.iter().enumerate() {
        let blend = &target.blend_state;
        blend_desc.RenderTarget[slot] = D3D12_RENDER_TARGET_BLEND_DESC {
            BlendEnable: blend.blend_enable.into(),
            LogicOpEnable: false.into(),
            SrcBlend: conv::blend_factor(blend.src_color_factor),
            DestBlend: conv::blend_factor(blend.dst_color_factor),
            BlendOp: conv::blend_op(blend.color_op),
            SrcBlendAlpha: conv::alpha_blend_factor(blend.src_alpha_factor),
            DestBlendAlpha: conv::alpha_blend_factor(blend.dst_alpha_factor),
            BlendOpAlpha: conv::blend_op(blend.alpha_op),
            LogicOp: D3D12_LOGIC_OP_NOOP,
            RenderTargetWriteMask: conv::write_mask(blend.write_mask),
        };
    }
    if info.target_info.color_targets.len() > 1 {
        blend_desc.IndependentBlendEnable = true.into();
    }

    let depth = &info.depth_stencil;
    let depth_stencil_desc = D3D12_DEPTH_STENCIL_DESC {
        DepthEnable: depth.depth_test_enable.into(),
        DepthWriteMask: if depth.depth_write_enable {
            D3D12_DEPTH_WRITE_MASK_ALL
        } else {
            D3D12_DEPTH_WRITE_MASK_ZERO
        },
        DepthFunc: conv::compare_op(depth.compare_op),
        StencilEnable: depth.stencil_test_enable.into(),
        StencilReadMask: depth.compare_mask,
        StencilWriteMask: depth.write_mask,
        FrontFace: D3D12_DEPTH_STENCILOP_DESC {
            StencilFailOp: conv::stencil_op(depth.front_stencil.fail_op),
            StencilDepthFailOp: conv::stencil_op(depth.front_stencil.depth_fail_op),
            StencilPassOp: conv::stencil_op(depth.front_stencil.pass_op),
            StencilFunc: conv::compare_op(depth.front_stencil.compare_op),
        },
        BackFace: D3D12_DEPTH_STENCILOP_DESC {
            StencilFailOp: conv::stencil_op(depth.back_stencil.fail_op),
            StencilDepthFailOp: conv::stencil_op(depth.back_stencil.depth_fail_op),
            StencilPassOp: conv::stencil_op(depth.back_stencil.pass_op),
            StencilFunc: conv::compare_op(depth.back_stencil.compare_op),
        },
    };

    let mut rtv_formats = [DXGI_FORMAT_UNKNOWN; 8];
    for (slot, target) in info.target_info.color_targets.iter().enumerate() {
        rtv_formats[slot] = conv::texture_format(target.format);
    }
    let dsv_format: DXGI_FORMAT = info
        .target_info
        .depth_stencil_format
        .map(conv::texture_format)
        .unwrap_or(DXGI_FORMAT_UNKNOWN);

    let desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
        pRootSignature: unsafe { std::mem::transmute_copy(&root_signature) },
        VS: shader_bytecode(&vertex.bytecode),
        PS: shader_bytecode(&fragment.bytecode),
        DS: Default::default(),
        HS: Default::default(),
        GS: Default::default(),
        StreamOutput: Default::default(),
        BlendState: blend_desc,
        SampleMask: u32::MAX,
        RasterizerState: rasterizer_desc,
        DepthStencilState: depth_stencil_desc,
        InputLayout: D3D12_INPUT_LAYOUT_DESC {
            pInputElementDescs: if input_elements.is_empty() {
                std::ptr::null()
            } else {
                input_elements.as_ptr()
            },
            NumElements: input_elements.len() as u32,
        },
        IBStripCutValue: D3D12_INDEX_BUFFER_STRIP_CUT_VALUE_DISABLED,
        PrimitiveTopologyType: conv::topology_type(info.primitive_type),
        NumRenderTargets: info.target_info.color_targets.len() as u32,
        RTVFormats: rtv_formats,
        DSVFormat: dsv_format,
        SampleDesc: conv::sample_desc(info.target_info.sample_count),
        NodeMask: 0,
        CachedPSO: Default::default(),
        Flags: D3D12_PIPELINE_STATE_FLAG_NONE,
    };

    let pso: ID3D12PipelineState = unsafe { device.CreateGraphicsPipelineState(&desc) }
        .map_err(|err| anyhow!("graphics pipeline creation failed: {err}"))?;

    let mut vertex_strides = [0u32; 16];
    for buffer in &info.vertex_input.buffers {
        vertex_strides[buffer.slot as usize] = buffer.pitch;
    }

    Ok(D3d12GraphicsPipeline {
        pso,
        root_signature,
        layout,
        primitive_type: info.primitive_type,
        blend_constants: info.blend_constants,
        stencil_reference: info.stencil_reference,
        vertex_counts: vertex.counts,
        fragment_counts: fragment.counts,
        vertex_strides,
    })
}

pub fn create_compute_pipeline(
    device: &ID3D12Device,
    info: &ComputePipelineCreateInfo,
    shaders: &HashMap<ShaderId, D3d12Shader>,
) -> anyhow::Result<D3d12ComputePipeline> {
    let shader = shaders
        .get(&info.shader)
        .ok_or_else(|| anyhow!("unknown compute shader"))?;
    let layout = plan_root_signature(shader.counts)?;
    let root_signature = create_root_signature(device, &layout)?;

    let desc = D3D12_COMPUTE_PIPELINE_STATE_DESC {
        pRootSignature: unsafe { std::mem::transmute_copy(&root_signature) },
        CS: shader_bytecode(&shader.bytecode),
        NodeMask: 0,
        CachedPSO: Default::default(),
        Flags: D3D12_PIPELINE_STATE_FLAG_NONE,
    };

    let pso: ID3D12PipelineState = unsafe { device.CreateComputePipelineState(&desc) }
        .map_err(|err| anyhow!("compute pipeline creation failed: {err}"))?;

    Ok(D3d12ComputePipeline {
        pso,
        root_signature,
        layout,
        counts: shader.counts,
    })
}
