//! Root-signature synthesis.
//!
//! One descriptor table per non-empty resource category, in the fixed order
//! CBV (uniforms), UAV (storage buffers), UAV (storage textures), SAMPLER.
//! Each table holds a single range covering the whole category, starting at
//! register 0 with append offsets; every parameter uses ALL visibility and
//! the signature allows input-assembler input layouts.

use anyhow::anyhow;
use gpu_types::resources::ShaderResourceCounts;
use windows::Win32::Graphics::Direct3D::D3D_ROOT_SIGNATURE_VERSION_1;
use windows::Win32::Graphics::Direct3D12::*;

pub const MAX_ROOT_SIGNATURE_PARAMETERS: usize = 64;

/// The plan both the factory and the draw-time descriptor flush share: which
/// root parameter index each category landed on.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RootSignatureLayout {
    pub uniform_table: Option<u32>,
    pub storage_buffer_table: Option<u32>,
    pub storage_texture_table: Option<u32>,
    pub sampler_table: Option<u32>,
    pub counts: ShaderResourceCounts,
}

impl RootSignatureLayout {
    pub fn parameter_count(&self) -> usize {
        [
            self.uniform_table,
            self.storage_buffer_table,
            self.storage_texture_table,
            self.sampler_table,
        ]
        .iter()
        .flatten()
        .count()
    }
}

pub fn plan_root_signature(counts: ShaderResourceCounts) -> anyhow::Result<RootSignatureLayout> {
    let mut layout = RootSignatureLayout {
        counts,
        ..Default::default()
    };
    let mut next = 0u32;
    let mut take = |count: u32| -> Option<u32> {
        if count == 0 {
            return None;
        }
        let index = next;
        next += 1;
        Some(index)
    };
    layout.uniform_table = take(counts.uniform_buffer_count);
    layout.storage_buffer_table = take(counts.storage_buffer_count);
    layout.storage_texture_table = take(counts.storage_texture_count);
    layout.sampler_table = take(counts.sampler_count);
    if next as usize > MAX_ROOT_SIGNATURE_PARAMETERS {
        return Err(anyhow!(
            "root signature exceeds {MAX_ROOT_SIGNATURE_PARAMETERS} parameters"
        ));
    }
    Ok(layout)
}

/// Element-wise maximum of two stages' counts; graphics pipelines share one
/// signature between the vertex and fragment stage.
pub fn merged_counts(
    vertex: ShaderResourceCounts,
    fragment: ShaderResourceCounts,
) -> ShaderResourceCounts {
    ShaderResourceCounts {
        sampler_count: vertex.sampler_count.max(fragment.sampler_count),
        storage_texture_count: vertex
            .storage_texture_count
            .max(fragment.storage_texture_count),
        storage_buffer_count: vertex.storage_buffer_count.max(fragment.storage_buffer_count),
        uniform_buffer_count: vertex
            .uniform_buffer_count
            .max(fragment.uniform_buffer_count),
    }
}

pub fn create_root_signature(
    device: &ID3D12Device,
    layout: &RootSignatureLayout,
) -> anyhow::Result<ID3D12RootSignature> {
    let mut ranges: Vec<D3D12_DESCRIPTOR_RANGE> = Vec::with_capacity(4);
    let mut parameters: Vec<D3D12_ROOT_PARAMETER> = Vec::with_capacity(4);

    let mut push_table = |range_type: D3D12_DESCRIPTOR_RANGE_TYPE, count: u32| {
        ranges.push(D3D12_DESCRIPTOR_RANGE {
            RangeType: range_type,
            NumDescriptors: count,
            BaseShaderRegister: 0,
            RegisterSpace: 0,
            OffsetInDescriptorsFromTableStart: D3D12_DESCRIPTOR_RANGE_OFFSET_APPEND,
        });
    };

    if layout.uniform_table.is_some() {
        push_table(D3D12_DESCRIPTOR_RANGE_TYPE_CBV, layout.counts.uniform_buffer_count);
    }
    if layout.storage_buffer_table.is_some() {
        push_table(D3D12_DESCRIPTOR_RANGE_TYPE_UAV, layout.counts.storage_buffer_count);
    }
    if layout.storage_texture_table.is_some() {
        push_table(
            D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
            layout.counts.storage_texture_count,
        );
    }
    if layout.sampler_table.is_some() {
        push_table(D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER, layout.counts.sampler_count);
    }

    for range in &ranges {
        parameters.push(D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                    NumDescriptorRanges: 1,
                    pDescriptorRanges: range,
                },
            },
            ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
        });
    }

    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: parameters.len() as u32,
        pParameters: if parameters.is_empty() {
            std::ptr::null()
        } else {
            parameters.as_ptr()
        },
        NumStaticSamplers: 0,
        pStaticSamplers: std::ptr::null(),
        Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
    };

    let mut blob = None;
    let mut error_blob = None;
    unsafe {
        D3D12SerializeRootSignature(
            &desc,
            D3D_ROOT_SIGNATURE_VERSION_1,
            &mut blob,
            Some(&mut error_blob),
        )
    }
    .map_err(|err| {
        let detail = error_blob
            .as_ref()
            .map(blob_to_string)
            .unwrap_or_default();
        anyhow!("root signature serialization failed: {err} {detail}")
    })?;
    let blob = blob.ok_or_else(|| anyhow!("root signature serialization returned no blob"))?;

    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };
    unsafe { device.CreateRootSignature(0, bytes) }
        .map_err(|err| anyhow!("root signature creation failed: {err}"))
}

pub(crate) fn blob_to_string(blob: &windows::Win32::Graphics::Direct3D::ID3DBlob) -> String {
    let bytes = unsafe {
        std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
    };
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_is_cbv_uavsb_uavst_sampler() {
        let layout = plan_root_signature(ShaderResourceCounts {
            sampler_count: 2,
            storage_texture_count: 1,
            storage_buffer_count: 3,
            uniform_buffer_count: 1,
        })
        .unwrap();
        assert_eq!(layout.uniform_table, Some(0));
        assert_eq!(layout.storage_buffer_table, Some(1));
        assert_eq!(layout.storage_texture_table, Some(2));
        assert_eq!(layout.sampler_table, Some(3));
        assert_eq!(layout.parameter_count(), 4);
    }

    #[test]
    fn empty_categories_get_no_table() {
        let layout = plan_root_signature(ShaderResourceCounts {
            sampler_count: 1,
            storage_texture_count: 0,
            storage_buffer_count: 0,
            uniform_buffer_count: 2,
        })
        .unwrap();
        assert_eq!(layout.uniform_table, Some(0));
        assert_eq!(layout.storage_buffer_table, None);
        assert_eq!(layout.storage_texture_table, None);
        assert_eq!(layout.sampler_table, Some(1));
        assert_eq!(layout.parameter_count(), 2);
    }

    #[test]
    fn merged_counts_take_the_maximum() {
        let vertex = ShaderResourceCounts {
            uniform_buffer_count: 2,
            sampler_count: 0,
            storage_buffer_count: 1,
            storage_texture_count: 0,
        };
        let fragment = ShaderResourceCounts {
            uniform_buffer_count: 1,
            sampler_count: 4,
            storage_buffer_count: 0,
            storage_texture_count: 2,
        };
        let merged = merged_counts(vertex, fragment);
        assert_eq!(merged.uniform_buffer_count, 2);
        assert_eq!(merged.sampler_count, 4);
        assert_eq!(merged.storage_buffer_count, 1);
        assert_eq!(merged.storage_texture_count, 2);
    }
}
