//! The pre-baked shader bundle contract. The shader toolchain emits, per
//! source, one byte array per target format; the renderer picks the variant
//! the device accepts and creates its five shaders up front.

use anyhow::anyhow;
use gpu::Gpu;
use gpu_types::resources::{
    ShaderCreateInfo, ShaderFormat, ShaderId, ShaderResourceCounts, ShaderStage,
};

#[derive(Debug, Clone)]
pub struct ShaderBlob {
    pub format: ShaderFormat,
    pub bytes: Vec<u8>,
    pub entry_point: String,
}

/// One logical shader, available in several target formats.
#[derive(Debug, Clone, Default)]
pub struct ShaderVariants {
    pub blobs: Vec<ShaderBlob>,
}

impl ShaderVariants {
    fn pick(&self, accepted: ShaderFormat) -> Option<&ShaderBlob> {
        self.blobs.iter().find(|blob| accepted.intersects(blob.format))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShaderBundle2d {
    pub line_point_vertex: ShaderVariants,
    pub triangle_color_vertex: ShaderVariants,
    pub triangle_texture_vertex: ShaderVariants,
    pub color_fragment: ShaderVariants,
    pub texture_fragment: ShaderVariants,
}

/// The created shader handles the renderer draws with.
#[derive(Debug, Copy, Clone)]
pub struct ShaderSet2d {
    pub line_point_vertex: ShaderId,
    pub triangle_color_vertex: ShaderId,
    pub triangle_texture_vertex: ShaderId,
    pub color_fragment: ShaderId,
    pub texture_fragment: ShaderId,
}

fn create_one(
    device: &Gpu,
    variants: &ShaderVariants,
    stage: ShaderStage,
    counts: ShaderResourceCounts,
    what: &str,
) -> anyhow::Result<ShaderId> {
    let blob = variants
        .pick(device.shader_formats())
        .ok_or_else(|| anyhow!("shader bundle carries no usable {what} variant"))?;
    device.create_shader(&ShaderCreateInfo {
        source: blob.bytes.clone(),
        entry_point: blob.entry_point.clone(),
        format: blob.format,
        stage,
        counts,
    })
}

pub fn create_shader_set(device: &Gpu, bundle: &ShaderBundle2d) -> anyhow::Result<ShaderSet2d> {
    let vertex_counts = ShaderResourceCounts {
        uniform_buffer_count: 1,
        ..Default::default()
    };
    let color_counts = ShaderResourceCounts::default();
    let texture_counts = ShaderResourceCounts {
        sampler_count: 1,
        ..Default::default()
    };
    Ok(ShaderSet2d {
        line_point_vertex: create_one(
            device,
            &bundle.line_point_vertex,
            ShaderStage::Vertex,
            vertex_counts,
            "line/point vertex",
        )?,
        triangle_color_vertex: create_one(
            device,
            &bundle.triangle_color_vertex,
            ShaderStage::Vertex,
            vertex_counts,
            "triangle vertex",
        )?,
        triangle_texture_vertex: create_one(
            device,
            &bundle.triangle_texture_vertex,
            ShaderStage::Vertex,
            vertex_counts,
            "textured-triangle vertex",
        )?,
        color_fragment: create_one(
            device,
            &bundle.color_fragment,
            ShaderStage::Fragment,
            color_counts,
            "color fragment",
        )?,
        texture_fragment: create_one(
            device,
            &bundle.texture_fragment,
            ShaderStage::Fragment,
            texture_counts,
            "texture fragment",
        )?,
    })
}
