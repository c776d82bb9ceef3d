//! Committed-resource creation. The heap type follows the usage: UPLOAD for
//! host-visible transfer and the uniform ring, READBACK for downloads,
//! DEFAULT for device-local images and buffers. Initial states follow the
//! same table.

use anyhow::anyhow;
use gpu_types::config::UNIFORM_BUFFER_SIZE;
use gpu_types::resources::{
    BufferCreateInfo, SamplerCreateInfo, TextureCreateInfo, TextureType, TextureUsage,
    TransferBufferCreateInfo, TransferBufferUsage,
};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC;

use super::conv;

#[derive(Debug)]
pub struct D3d12Texture {
    pub resource: ID3D12Resource,
    pub info: TextureCreateInfo,
    pub state: D3D12_RESOURCE_STATES,
    /// Swapchain back buffers carry a pre-created RTV and present-state
    /// bookkeeping.
    pub is_render_target: bool,
    pub rtv: Option<D3D12_CPU_DESCRIPTOR_HANDLE>,
}

#[derive(Debug)]
pub struct D3d12Buffer {
    pub resource: ID3D12Resource,
    pub size: u64,
    pub state: D3D12_RESOURCE_STATES,
}

#[derive(Debug)]
pub struct D3d12TransferBuffer {
    pub resource: ID3D12Resource,
    pub size: u64,
    pub usage: TransferBufferUsage,
    /// Persistently mapped pointer; UPLOAD/READBACK heaps stay mapped.
    pub ptr: *mut u8,
}

/// One lease of the device's uniform ring. Host-visible, persistently
/// mapped, `UNIFORM_BUFFER_SIZE` bytes, recycled through the free list after
/// the owning submission completes.
#[derive(Debug)]
pub struct UniformBuffer {
    pub resource: ID3D12Resource,
    pub ptr: *mut u8,
    pub write_offset: usize,
}

fn heap_properties(heap_type: D3D12_HEAP_TYPE) -> D3D12_HEAP_PROPERTIES {
    D3D12_HEAP_PROPERTIES {
        Type: heap_type,
        CPUPageProperty: D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
        MemoryPoolPreference: D3D12_MEMORY_POOL_UNKNOWN,
        CreationNodeMask: 0,
        VisibleNodeMask: 0,
    }
}

fn buffer_desc(size: u64, flags: D3D12_RESOURCE_FLAGS) -> D3D12_RESOURCE_DESC {
    D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
        Alignment: 0,
        Width: size,
        Height: 1,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_UNKNOWN,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        Flags: flags,
    }
}

fn create_committed_buffer(
    device: &ID3D12Device,
    heap_type: D3D12_HEAP_TYPE,
    size: u64,
    flags: D3D12_RESOURCE_FLAGS,
    initial_state: D3D12_RESOURCE_STATES,
) -> anyhow::Result<ID3D12Resource> {
    let mut resource: Option<ID3D12Resource> = None;
    unsafe {
        device.CreateCommittedResource(
            &heap_properties(heap_type),
            D3D12_HEAP_FLAG_NONE,
            &buffer_desc(size, flags),
            initial_state,
            None,
            &mut resource,
        )
    }
    .map_err(|err| anyhow!("buffer resource creation failed: {err}"))?;
    resource.ok_or_else(|| anyhow!("buffer resource creation returned nothing"))
}

pub fn create_texture(
    device: &ID3D12Device,
    info: &TextureCreateInfo,
) -> anyhow::Result<D3d12Texture> {
    let mut flags = D3D12_RESOURCE_FLAG_NONE;
    if info.usage.contains(TextureUsage::COLOR_TARGET) {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
    }
    if info.usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
    }
    if info.usage.contains(TextureUsage::COMPUTE_STORAGE_WRITE) {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
    }

    let (dimension, depth_or_layers) = match info.ty {
        TextureType::D3 => (D3D12_RESOURCE_DIMENSION_TEXTURE3D, info.depth as u16),
        _ => (D3D12_RESOURCE_DIMENSION_TEXTURE2D, info.layer_count as u16),
    };

    let desc = D3D12_RESOURCE_DESC {
        Dimension: dimension,
        Alignment: 0,
        Width: info.width as u64,
        Height: info.height,
        DepthOrArraySize: depth_or_layers,
        MipLevels: info.level_count as u16,
        Format: conv::texture_format(info.format),
        SampleDesc: conv::sample_desc(info.sample_count),
        Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
        Flags: flags,
    };

    let initial_state = D3D12_RESOURCE_STATE_COMMON;
    let mut resource: Option<ID3D12Resource> = None;
    unsafe {
        device.CreateCommittedResource(
            &heap_properties(D3D12_HEAP_TYPE_DEFAULT),
            D3D12_HEAP_FLAG_NONE,
            &desc,
            initial_state,
            None,
            &mut resource,
        )
    }
    .map_err(|err| anyhow!("texture resource creation failed: {err}"))?;

    Ok(D3d12Texture {
        resource: resource.ok_or_else(|| anyhow!("texture resource creation returned nothing"))?,
        info: *info,
        state: initial_state,
        is_render_target: false,
        rtv: None,
    })
}

pub fn create_buffer(device: &ID3D12Device, info: &BufferCreateInfo) -> anyhow::Result<D3d12Buffer> {
    let resource = create_committed_buffer(
        device,
        D3D12_HEAP_TYPE_DEFAULT,
        info.size,
        D3D12_RESOURCE_FLAG_NONE,
        D3D12_RESOURCE_STATE_COMMON,
    )?;
    Ok(D3d12Buffer {
        resource,
        size: info.size,
        state: D3D12_RESOURCE_STATE_COMMON,
    })
}

pub fn create_transfer_buffer(
    device: &ID3D12Device,
    info: &TransferBufferCreateInfo,
) -> anyhow::Result<D3d12TransferBuffer> {
    let (heap_type, initial_state) = match info.usage {
        TransferBufferUsage::Upload => (D3D12_HEAP_TYPE_UPLOAD, D3D12_RESOURCE_STATE_GENERIC_READ),
        TransferBufferUsage::Download => {
            (D3D12_HEAP_TYPE_READBACK, D3D12_RESOURCE_STATE_COPY_DEST)
        }
    };
    let resource = create_committed_buffer(
        device,
        heap_type,
        info.size,
        D3D12_RESOURCE_FLAG_NONE,
        initial_state,
    )?;
    let mut ptr = std::ptr::null_mut();
    unsafe { resource.Map(0, None, Some(&mut ptr)) }
        .map_err(|err| anyhow!("transfer buffer mapping failed: {err}"))?;
    Ok(D3d12TransferBuffer {
        resource,
        size: info.size,
        usage: info.usage,
        ptr: ptr as *mut u8,
    })
}

pub fn create_uniform_buffer(device: &ID3D12Device) -> anyhow::Result<UniformBuffer> {
    let resource = create_committed_buffer(
        device,
        D3D12_HEAP_TYPE_UPLOAD,
        UNIFORM_BUFFER_SIZE as u64,
        D3D12_RESOURCE_FLAG_NONE,
        D3D12_RESOURCE_STATE_GENERIC_READ,
    )?;
    let mut ptr = std::ptr::null_mut();
    unsafe { resource.Map(0, None, Some(&mut ptr)) }
        .map_err(|err| anyhow!("uniform buffer mapping failed: {err}"))?;
    Ok(UniformBuffer {
        resource,
        ptr: ptr as *mut u8,
        write_offset: 0,
    })
}

pub fn sampler_desc(info: &SamplerCreateInfo) -> D3D12_SAMPLER_DESC {
    D3D12_SAMPLER_DESC {
        Filter: conv::sampler_filter(
            info.min_filter,
            info.mag_filter,
            info.mipmap_mode,
            info.max_anisotropy.is_some(),
        ),
        AddressU: conv::address_mode(info.address_mode_u),
        AddressV: conv::address_mode(info.address_mode_v),
        AddressW: conv::address_mode(info.address_mode_w),
        MipLODBias: info.mip_lod_bias,
        MaxAnisotropy: info.max_anisotropy.unwrap_or(1),
        ComparisonFunc: info
            .compare_op
            .map(conv::compare_op)
            .unwrap_or(D3D12_COMPARISON_FUNC_ALWAYS),
        BorderColor: [0.0; 4],
        MinLOD: info.min_lod,
        MaxLOD: info.max_lod,
    }
}
