//! Shader ingest: HLSL text is compiled with the runtime compiler, DXBC is
//! taken as-is. The stored bytecode is owned by the shader record and freed
//! with it.

use anyhow::anyhow;
use gpu_types::resources::{ShaderCreateInfo, ShaderFormat, ShaderResourceCounts, ShaderStage};
use windows::core::PCSTR;
use windows::Win32::Graphics::Direct3D::Fxc::D3DCompile;

use super::root_signature::blob_to_string;

#[derive(Debug)]
pub struct D3d12Shader {
    pub bytecode: Vec<u8>,
    pub stage: ShaderStage,
    pub counts: ShaderResourceCounts,
}

fn profile(stage: ShaderStage) -> &'static [u8] {
    match stage {
        ShaderStage::Vertex => b"vs_5_1\0",
        ShaderStage::Fragment => b"ps_5_1\0",
        ShaderStage::Compute => b"cs_5_1\0",
    }
}

pub fn ingest_shader(info: &ShaderCreateInfo) -> anyhow::Result<D3d12Shader> {
    let bytecode = match info.format {
        ShaderFormat::DXBC => info.source.clone(),
        ShaderFormat::HLSL => compile_hlsl(info)?,
        other => return Err(anyhow!("shader format {other:?} is not ingestible here")),
    };
    Ok(D3d12Shader {
        bytecode,
        stage: info.stage,
        counts: info.counts,
    })
}

fn compile_hlsl(info: &ShaderCreateInfo) -> anyhow::Result<Vec<u8>> {
    let mut entry_point = info.entry_point.clone().into_bytes();
    entry_point.push(0);

    let mut blob = None;
    let mut error_blob = None;
    let result = unsafe {
        D3DCompile(
            info.source.as_ptr() as *const _,
            info.source.len(),
            PCSTR::null(),
            None,
            None,
            PCSTR(entry_point.as_ptr()),
            PCSTR(profile(info.stage).as_ptr()),
            0,
            0,
            &mut blob,
            Some(&mut error_blob),
        )
    };
    if let Err(err) = result {
        // the compiler's error text is surfaced verbatim
        let detail = error_blob.as_ref().map(blob_to_string).unwrap_or_default();
        return Err(anyhow!("shader compilation failed: {err}\n{detail}"));
    }
    let blob = blob.ok_or_else(|| anyhow!("shader compilation returned no blob"))?;
    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };
    Ok(bytes.to_vec())
}
