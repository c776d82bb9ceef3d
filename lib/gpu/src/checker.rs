//! Debug-layer argument and invariant checks.
//!
//! Every function here is pure over the create-info records and the device's
//! resource metadata. They run before delegation when the device was created
//! with debug mode; without it the front-end delegates unchecked.

use std::collections::HashMap;

use gpu_types::config::{
    MAX_COLOR_TARGET_BINDINGS, MAX_COMPUTE_UNIFORM_BUFFERS, MAX_COMPUTE_WRITE_BUFFERS,
    MAX_COMPUTE_WRITE_TEXTURES, MAX_FRAGMENT_SAMPLERS, MAX_STAGE_RESOURCES,
    MAX_TEXTURE_SIZE_2D, MAX_TEXTURE_SIZE_3D, MAX_VERTEX_ATTRIBUTES, MAX_VERTEX_BUFFER_BINDINGS,
    MAX_VERTEX_UNIFORM_BUFFERS,
};
use gpu_types::formats::SampleCount;
use gpu_types::resources::{
    BufferCreateInfo, ComputePipelineCreateInfo, GraphicsPipelineCreateInfo, SamplerCreateInfo,
    ShaderCreateInfo, ShaderFormat, ShaderId, ShaderStage, TextureCreateInfo, TextureType,
    TextureUsage, TransferBufferCreateInfo,
};

use crate::device::ShaderMeta;
use crate::error::GpuError;

pub fn check_texture_create(info: &TextureCreateInfo) -> Result<(), GpuError> {
    if info.width == 0 || info.height == 0 || info.depth == 0 {
        return Err(GpuError::Validation(
            "texture extents must be positive".into(),
        ));
    }
    if info.layer_count == 0 || info.level_count == 0 {
        return Err(GpuError::Validation(
            "layer and level counts must be positive".into(),
        ));
    }
    if info.usage.is_empty() {
        return Err(GpuError::Validation("texture needs at least one usage".into()));
    }
    if info.usage.contains(TextureUsage::SAMPLER | TextureUsage::GRAPHICS_STORAGE_READ) {
        return Err(GpuError::Validation(
            "SAMPLER and GRAPHICS_STORAGE_READ are mutually exclusive".into(),
        ));
    }
    if info.format.is_integer() && info.usage.contains(TextureUsage::SAMPLER) {
        return Err(GpuError::Validation(
            "integer-format textures cannot be sampled".into(),
        ));
    }
    match info.ty {
        TextureType::Cube => {
            if info.width != info.height {
                return Err(GpuError::Validation(
                    "width and height must be identical".into(),
                ));
            }
            if info.depth != 1 {
                return Err(GpuError::Validation("cube textures have depth 1".into()));
            }
            if info.layer_count != 6 {
                return Err(GpuError::Validation("cube textures have 6 layers".into()));
            }
            if info.sample_count != SampleCount::S1 {
                return Err(GpuError::Validation(
                    "cube textures cannot be multisampled".into(),
                ));
            }
            if info.width > MAX_TEXTURE_SIZE_2D {
                return Err(GpuError::Validation("cube texture too large".into()));
            }
        }
        TextureType::D3 => {
            if info.layer_count != 1 {
                return Err(GpuError::Validation("3D textures have one layer".into()));
            }
            if info.sample_count != SampleCount::S1 {
                return Err(GpuError::Validation(
                    "3D textures cannot be multisampled".into(),
                ));
            }
            if info.usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
                return Err(GpuError::Validation(
                    "3D textures cannot be depth-stencil targets".into(),
                ));
            }
            if info.width > MAX_TEXTURE_SIZE_3D
                || info.height > MAX_TEXTURE_SIZE_3D
                || info.depth > MAX_TEXTURE_SIZE_3D
            {
                return Err(GpuError::Validation("3D texture too large".into()));
            }
        }
        TextureType::D2 | TextureType::D2Array => {
            if info.depth != 1 {
                return Err(GpuError::Validation("2D textures have depth 1".into()));
            }
            if info.width > MAX_TEXTURE_SIZE_2D || info.height > MAX_TEXTURE_SIZE_2D {
                return Err(GpuError::Validation("2D texture too large".into()));
            }
            if info.sample_count != SampleCount::S1 && info.level_count != 1 {
                return Err(GpuError::Validation(
                    "multisampled textures have a single mip level".into(),
                ));
            }
        }
    }
    Ok(())
}

pub fn check_buffer_create(info: &BufferCreateInfo) -> Result<(), GpuError> {
    if info.size == 0 {
        return Err(GpuError::Validation("buffer size must be positive".into()));
    }
    if info.usage.is_empty() {
        return Err(GpuError::Validation("buffer needs at least one usage".into()));
    }
    Ok(())
}

pub fn check_transfer_buffer_create(info: &TransferBufferCreateInfo) -> Result<(), GpuError> {
    if info.size == 0 {
        return Err(GpuError::Validation(
            "transfer buffer size must be positive".into(),
        ));
    }
    Ok(())
}

pub fn check_sampler_create(info: &SamplerCreateInfo) -> Result<(), GpuError> {
    if info.max_lod < info.min_lod {
        return Err(GpuError::Validation("max LOD below min LOD".into()));
    }
    if info.max_anisotropy == Some(0) {
        return Err(GpuError::Validation(
            "anisotropy, when enabled, must be positive".into(),
        ));
    }
    Ok(())
}

pub fn check_shader_create(
    info: &ShaderCreateInfo,
    accepted_formats: ShaderFormat,
) -> Result<(), GpuError> {
    if info.source.is_empty() {
        return Err(GpuError::InvalidArgument("shader source is empty".into()));
    }
    if info.entry_point.is_empty() {
        return Err(GpuError::InvalidArgument("entry point name is empty".into()));
    }
    if info.format.bits().count_ones() != 1 {
        return Err(GpuError::InvalidArgument(
            "exactly one shader format must be given".into(),
        ));
    }
    if !accepted_formats.intersects(info.format) {
        return Err(GpuError::Unsupported(format!(
            "shader format {:?} was not requested at device creation",
            info.format
        )));
    }
    let c = &info.counts;
    let uniform_limit = match info.stage {
        ShaderStage::Compute => MAX_COMPUTE_UNIFORM_BUFFERS,
        _ => MAX_VERTEX_UNIFORM_BUFFERS,
    };
    if c.uniform_buffer_count as usize > uniform_limit {
        return Err(GpuError::Validation("too many uniform buffers".into()));
    }
    if c.sampler_count as usize > MAX_FRAGMENT_SAMPLERS {
        return Err(GpuError::Validation("too many samplers".into()));
    }
    let combined = c.sampler_count + c.storage_texture_count + c.storage_buffer_count
        + c.uniform_buffer_count;
    if combined as usize > MAX_STAGE_RESOURCES {
        return Err(GpuError::Validation(
            "combined resource count exceeds the per-stage limit".into(),
        ));
    }
    Ok(())
}

pub fn check_graphics_pipeline_create(
    info: &GraphicsPipelineCreateInfo,
    shaders: &HashMap<ShaderId, ShaderMeta>,
) -> Result<(), GpuError> {
    let vertex = shaders
        .get(&info.vertex_shader)
        .ok_or_else(|| GpuError::InvalidArgument("unknown vertex shader".into()))?;
    let fragment = shaders
        .get(&info.fragment_shader)
        .ok_or_else(|| GpuError::InvalidArgument("unknown fragment shader".into()))?;
    if vertex.stage != ShaderStage::Vertex {
        return Err(GpuError::Validation(
            "vertex shader was not created for the vertex stage".into(),
        ));
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err(GpuError::Validation(
            "fragment shader was not created for the fragment stage".into(),
        ));
    }
    let targets = &info.target_info;
    if targets.color_targets.is_empty() && targets.depth_stencil_format.is_none() {
        return Err(GpuError::Validation(
            "pipeline needs a color or depth-stencil target".into(),
        ));
    }
    if targets.color_targets.len() > MAX_COLOR_TARGET_BINDINGS {
        return Err(GpuError::Validation("too many color targets".into()));
    }
    if let Some(format) = targets.depth_stencil_format {
        if !format.is_depth_stencil() {
            return Err(GpuError::Validation(
                "depth-stencil format is not a depth format".into(),
            ));
        }
    }
    let input = &info.vertex_input;
    if input.buffers.len() > MAX_VERTEX_BUFFER_BINDINGS {
        return Err(GpuError::Validation("too many vertex buffer bindings".into()));
    }
    if input.attributes.len() > MAX_VERTEX_ATTRIBUTES {
        return Err(GpuError::Validation("too many vertex attributes".into()));
    }
    for attribute in &input.attributes {
        if !input.buffers.iter().any(|b| b.slot == attribute.buffer_slot) {
            return Err(GpuError::Validation(format!(
                "vertex attribute {} references unbound buffer slot {}",
                attribute.location, attribute.buffer_slot
            )));
        }
    }
    Ok(())
}

pub fn check_compute_pipeline_create(
    info: &ComputePipelineCreateInfo,
    shaders: &HashMap<ShaderId, ShaderMeta>,
) -> Result<(), GpuError> {
    let shader = shaders
        .get(&info.shader)
        .ok_or_else(|| GpuError::InvalidArgument("unknown compute shader".into()))?;
    if shader.stage != ShaderStage::Compute {
        return Err(GpuError::Validation(
            "shader was not created for the compute stage".into(),
        ));
    }
    if info.thread_count.iter().any(|&c| c == 0) {
        return Err(GpuError::Validation(
            "thread counts must be positive".into(),
        ));
    }
    if shader.counts.storage_texture_count as usize > MAX_COMPUTE_WRITE_TEXTURES {
        return Err(GpuError::Validation("too many writable textures".into()));
    }
    if shader.counts.storage_buffer_count as usize > MAX_COMPUTE_WRITE_BUFFERS {
        return Err(GpuError::Validation("too many writable buffers".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_types::formats::TextureFormat;

    fn cube_info(width: u32, height: u32) -> TextureCreateInfo {
        TextureCreateInfo {
            ty: TextureType::Cube,
            width,
            height,
            layer_count: 6,
            usage: TextureUsage::SAMPLER,
            ..Default::default()
        }
    }

    #[test]
    fn cube_must_be_square() {
        let err = check_texture_create(&cube_info(256, 128)).unwrap_err();
        assert!(err.to_string().contains("width and height must be identical"));
        assert!(check_texture_create(&cube_info(256, 256)).is_ok());
    }

    #[test]
    fn sampler_storage_read_exclusive() {
        let info = TextureCreateInfo {
            usage: TextureUsage::SAMPLER | TextureUsage::GRAPHICS_STORAGE_READ,
            ..Default::default()
        };
        assert!(check_texture_create(&info).is_err());
    }

    #[test]
    fn integer_formats_not_sampled() {
        let info = TextureCreateInfo {
            format: TextureFormat::R32Uint,
            usage: TextureUsage::SAMPLER,
            ..Default::default()
        };
        assert!(check_texture_create(&info).is_err());
        let info = TextureCreateInfo {
            format: TextureFormat::R32Uint,
            usage: TextureUsage::COLOR_TARGET,
            ..Default::default()
        };
        assert!(check_texture_create(&info).is_ok());
    }

    #[test]
    fn multisampled_single_level() {
        let info = TextureCreateInfo {
            sample_count: SampleCount::S4,
            level_count: 4,
            usage: TextureUsage::COLOR_TARGET,
            ..Default::default()
        };
        assert!(check_texture_create(&info).is_err());
    }

    #[test]
    fn d3_no_depth_stencil() {
        let info = TextureCreateInfo {
            ty: TextureType::D3,
            depth: 8,
            usage: TextureUsage::DEPTH_STENCIL_TARGET,
            format: TextureFormat::D32Float,
            ..Default::default()
        };
        assert!(check_texture_create(&info).is_err());
    }
}
