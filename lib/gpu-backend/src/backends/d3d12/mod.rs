//! Direct3D 12 driver.
//!
//! The driver owns the DXGI factory, the chosen adapter, one direct queue
//! with a single timeline fence, and one native command recorder
//! (allocator + graphics command list) that `acquire_command_buffer` resets
//! and `submit` executes. Uniform data flows through a pooled ring of
//! host-visible buffers leased per command buffer and returned once the
//! submission's fence wait completes.
//!
//! The driver is registered as implemented-but-unselected: the registry only
//! picks it on an explicit name match.

pub mod conv;
pub mod pipeline;
pub mod resources;
pub mod root_signature;
pub mod shader;
pub mod swapchain;

use std::collections::HashMap;

use anyhow::anyhow;
use gpu_backend_traits::traits::{
    DriverDescriptor, GpuDriverInterface, MappedRegion, SwapchainTexture,
};
use gpu_backend_traits::window::{DisplayRequirements, NativeWindow};
use gpu_types::config::{GpuConfig, GpuDriverKind, UNIFORM_BUFFER_SIZE};
use gpu_types::formats::{IndexElementSize, SampleCount, TextureFormat};
use gpu_types::passes::{
    BlitInfo, BufferBinding, BufferRegion, ColorTargetInfo, DepthStencilTargetInfo, LoadOp,
    PresentMode, ScissorRect, SwapchainComposition, TextureRegion, TextureSamplerBinding,
    TextureTransferInfo, TransferBufferLocation, Viewport,
};
use gpu_types::resources::{
    BufferCreateInfo, BufferId, ComputePipelineCreateInfo, ComputePipelineId, FenceId,
    GraphicsPipelineCreateInfo, GraphicsPipelineId, SamplerCreateInfo, SamplerId,
    ShaderCreateInfo, ShaderFormat, ShaderId, ShaderStage, TextureCreateInfo, TextureId,
    TextureType, TextureUsage, TransferBufferCreateInfo, TransferBufferId, WindowId,
};
use windows::core::{Interface, PCSTR, PCWSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Graphics::Direct3D::{D3D_FEATURE_LEVEL_11_1, D3D_PRIMITIVE_TOPOLOGY};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT, DXGI_FORMAT_UNKNOWN};
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use resources::{D3d12Buffer, D3d12TransferBuffer, D3d12Texture, UniformBuffer};
use swapchain::D3d12Window;

const UNIFORM_ALIGNMENT: usize = D3D12_CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT as usize;
const ROW_PITCH_ALIGNMENT: u32 = D3D12_TEXTURE_DATA_PITCH_ALIGNMENT;

const VIEW_HEAP_CAPACITY: u32 = 4096;
const SAMPLER_HEAP_CAPACITY: u32 = 2048;
const RTV_SCRATCH_CAPACITY: u32 = 64;
const DSV_SCRATCH_CAPACITY: u32 = 32;

/// Swapchain texture ids live outside the front-end's counter range.
const BACKEND_ID_BASE: u128 = 1 << 100;

/// A shader-visible descriptor heap consumed as a ring; the cursor rewinds
/// after the submit-time fence wait, when nothing in flight references it.
#[derive(Debug)]
struct DescriptorRing {
    heap: ID3D12DescriptorHeap,
    increment: u32,
    capacity: u32,
    cursor: u32,
    cpu_base: D3D12_CPU_DESCRIPTOR_HANDLE,
    gpu_base: D3D12_GPU_DESCRIPTOR_HANDLE,
}

impl DescriptorRing {
    fn new(
        device: &ID3D12Device,
        ty: D3D12_DESCRIPTOR_HEAP_TYPE,
        capacity: u32,
        shader_visible: bool,
    ) -> anyhow::Result<Self> {
        let heap: ID3D12DescriptorHeap = unsafe {
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                Type: ty,
                NumDescriptors: capacity,
                Flags: if shader_visible {
                    D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
                } else {
                    D3D12_DESCRIPTOR_HEAP_FLAG_NONE
                },
                NodeMask: 0,
            })
        }
        .map_err(|err| anyhow!("descriptor heap creation failed: {err}"))?;
        let cpu_base = unsafe { heap.GetCPUDescriptorHandleForHeapStart() };
        let gpu_base = if shader_visible {
            unsafe { heap.GetGPUDescriptorHandleForHeapStart() }
        } else {
            Default::default()
        };
        Ok(Self {
            increment: unsafe { device.GetDescriptorHandleIncrementSize(ty) },
            capacity,
            cursor: 0,
            heap,
            cpu_base,
            gpu_base,
        })
    }

    fn alloc(&mut self, count: u32) -> (D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_GPU_DESCRIPTOR_HANDLE) {
        if self.cursor + count > self.capacity {
            self.cursor = 0;
        }
        let cpu = D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.cpu_base.ptr + (self.cursor * self.increment) as usize,
        };
        let gpu = D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: self.gpu_base.ptr + (self.cursor * self.increment) as u64,
        };
        self.cursor += count;
        (cpu, gpu)
    }

    fn offset(&self, base: D3D12_CPU_DESCRIPTOR_HANDLE, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: base.ptr + (index * self.increment) as usize,
        }
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

#[derive(Debug, Default, Copy, Clone)]
struct UniformSlot {
    address: u64,
    size: u32,
}

pub struct D3d12Driver {
    factory: IDXGIFactory4,
    device: ID3D12Device,
    queue: ID3D12CommandQueue,
    fence: ID3D12Fence,
    fence_event: HANDLE,
    /// Next-expected fence value; incremented on every submission attempt,
    /// signal failure notwithstanding.
    fence_value: u64,
    allocator: ID3D12CommandAllocator,
    list: ID3D12GraphicsCommandList,
    debug_mode: bool,
    allow_tearing: bool,

    view_heap: DescriptorRing,
    sampler_heap: DescriptorRing,
    rtv_scratch: DescriptorRing,
    dsv_scratch: DescriptorRing,

    textures: HashMap<TextureId, D3d12Texture>,
    buffers: HashMap<BufferId, D3d12Buffer>,
    transfer_buffers: HashMap<TransferBufferId, D3d12TransferBuffer>,
    samplers: HashMap<SamplerId, D3D12_SAMPLER_DESC>,
    shaders: HashMap<ShaderId, shader::D3d12Shader>,
    graphics_pipelines: HashMap<GraphicsPipelineId, pipeline::D3d12GraphicsPipeline>,
    compute_pipelines: HashMap<ComputePipelineId, pipeline::D3d12ComputePipeline>,
    windows: HashMap<WindowId, D3d12Window>,
    active_windows: Vec<WindowId>,
    fences: HashMap<FenceId, u64>,
    next_backend_id: u128,

    uniform_pool: Vec<UniformBuffer>,
    used_uniform_buffers: Vec<UniformBuffer>,

    draw_signature: Option<ID3D12CommandSignature>,
    draw_indexed_signature: Option<ID3D12CommandSignature>,
    dispatch_signature: Option<ID3D12CommandSignature>,

    // recording state
    pass_color_targets: Vec<TextureId>,
    current_graphics: Option<GraphicsPipelineId>,
    current_compute: Option<ComputePipelineId>,
    bound_samplers: [Option<SamplerId>; 16],
    bound_storage_buffers: [Option<BufferId>; 8],
    bound_storage_textures: [Option<TextureId>; 8],
    bound_vertex_buffers: [Option<(BufferId, u64)>; 16],
    uniform_slots: [Option<UniformSlot>; 14],
    need_uniform_bind: bool,
    need_sampler_bind: bool,
    need_storage_buffer_bind: bool,
    need_storage_texture_bind: bool,
    need_vertex_buffer_bind: bool,
}

impl std::fmt::Debug for D3d12Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("D3d12Driver")
            .field("fence_value", &self.fence_value)
            .field("windows", &self.windows.len())
            .finish()
    }
}

pub fn driver_descriptor() -> DriverDescriptor {
    DriverDescriptor {
        name: "direct3d12",
        kind: GpuDriverKind::D3D12,
        shader_formats: ShaderFormat::DXBC | ShaderFormat::HLSL,
        selectable_by_default: false,
        prepare,
        create: |config: &GpuConfig| {
            Ok(Box::new(D3d12Driver::new(config)?) as Box<dyn GpuDriverInterface>)
        },
    }
}

fn prepare(display: &DisplayRequirements) -> bool {
    if display.headless {
        return false;
    }
    let factory: Result<IDXGIFactory4, _> = unsafe { CreateDXGIFactory2(0) };
    let Ok(_factory) = factory else {
        return false;
    };
    let mut device: Option<ID3D12Device> = None;
    unsafe { D3D12CreateDevice(None, D3D_FEATURE_LEVEL_11_1, &mut device) }.is_ok()
        && device.is_some()
}

fn transition(
    list: &ID3D12GraphicsCommandList,
    resource: &ID3D12Resource,
    from: D3D12_RESOURCE_STATES,
    to: D3D12_RESOURCE_STATES,
) {
    if from == to {
        return;
    }
    let barrier = D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: std::mem::ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: std::mem::ManuallyDrop::new(Some(resource.clone())),
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: from,
                StateAfter: to,
            }),
        },
    };
    unsafe { list.ResourceBarrier(&[barrier]) };
}

fn subresource_location(
    resource: &ID3D12Resource,
    subresource: u32,
) -> D3D12_TEXTURE_COPY_LOCATION {
    D3D12_TEXTURE_COPY_LOCATION {
        pResource: std::mem::ManuallyDrop::new(Some(resource.clone())),
        Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
        Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
            SubresourceIndex: subresource,
        },
    }
}

fn footprint_location(
    resource: &ID3D12Resource,
    offset: u64,
    format: DXGI_FORMAT,
    width: u32,
    height: u32,
    depth: u32,
    row_pitch: u32,
) -> D3D12_TEXTURE_COPY_LOCATION {
    D3D12_TEXTURE_COPY_LOCATION {
        pResource: std::mem::ManuallyDrop::new(Some(resource.clone())),
        Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
        Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
            PlacedFootprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
                Offset: offset,
                Footprint: D3D12_SUBRESOURCE_FOOTPRINT {
                    Format: format,
                    Width: width,
                    Height: height,
                    Depth: depth,
                    RowPitch: row_pitch,
                },
            },
        },
    }
}

impl D3d12Driver {
    pub fn new(config: &GpuConfig) -> anyhow::Result<Self> {
        let mut factory_flags = 0u32;
        if config.debug_mode {
            let mut debug: Option<ID3D12Debug> = None;
            if unsafe { D3D12GetDebugInterface(&mut debug) }.is_ok() {
                if let Some(debug) = debug {
                    unsafe { debug.EnableDebugLayer() };
                    factory_flags |= DXGI_CREATE_FACTORY_DEBUG;
                }
            }
        }

        let factory: IDXGIFactory4 = unsafe { CreateDXGIFactory2(factory_flags) }
            .map_err(|err| anyhow!("factory creation failed: {err}"))?;

        let adapter = Self::pick_adapter(&factory, config.prefer_low_power)?;

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_1, &mut device) }
            .map_err(|err| anyhow!("device creation failed: {err}"))?;
        let device = device.ok_or_else(|| anyhow!("device creation returned nothing"))?;

        let queue: ID3D12CommandQueue = unsafe {
            device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                Priority: D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
                Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
                NodeMask: 0,
            })
        }
        .map_err(|err| anyhow!("queue creation failed: {err}"))?;

        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }
            .map_err(|err| anyhow!("fence creation failed: {err}"))?;
        let fence_event = unsafe { CreateEventA(None, false, false, PCSTR::null()) }
            .map_err(|err| anyhow!("fence event creation failed: {err}"))?;

        let allocator: ID3D12CommandAllocator =
            unsafe { device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT) }
                .map_err(|err| anyhow!("command allocator creation failed: {err}"))?;
        let list: ID3D12GraphicsCommandList = unsafe {
            device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &allocator, None)
        }
        .map_err(|err| anyhow!("command list creation failed: {err}"))?;
        // the list is born open; close it so every acquire starts from Reset
        unsafe { list.Close() }.map_err(|err| anyhow!("command list close failed: {err}"))?;

        let view_heap = DescriptorRing::new(
            &device,
            D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
            VIEW_HEAP_CAPACITY,
            true,
        )?;
        let sampler_heap = DescriptorRing::new(
            &device,
            D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
            SAMPLER_HEAP_CAPACITY,
            true,
        )?;
        let rtv_scratch = DescriptorRing::new(
            &device,
            D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
            RTV_SCRATCH_CAPACITY,
            false,
        )?;
        let dsv_scratch = DescriptorRing::new(
            &device,
            D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
            DSV_SCRATCH_CAPACITY,
            false,
        )?;

        let allow_tearing = swapchain::supports_tearing(&factory);

        Ok(Self {
            factory,
            device,
            queue,
            fence,
            fence_event,
            fence_value: 0,
            allocator,
            list,
            debug_mode: config.debug_mode,
            allow_tearing,
            view_heap,
            sampler_heap,
            rtv_scratch,
            dsv_scratch,
            textures: Default::default(),
            buffers: Default::default(),
            transfer_buffers: Default::default(),
            samplers: Default::default(),
            shaders: Default::default(),
            graphics_pipelines: Default::default(),
            compute_pipelines: Default::default(),
            windows: Default::default(),
            active_windows: Default::default(),
            fences: Default::default(),
            next_backend_id: 0,
            uniform_pool: Default::default(),
            used_uniform_buffers: Default::default(),
            draw_signature: None,
            draw_indexed_signature: None,
            dispatch_signature: None,
            pass_color_targets: Default::default(),
            current_graphics: None,
            current_compute: None,
            bound_samplers: [None; 16],
            bound_storage_buffers: [None; 8],
            bound_storage_textures: [None; 8],
            bound_vertex_buffers: [None; 16],
            uniform_slots: [None; 14],
            need_uniform_bind: false,
            need_sampler_bind: false,
            need_storage_buffer_bind: false,
            need_storage_texture_bind: false,
            need_vertex_buffer_bind: false,
        })
    }

    fn pick_adapter(factory: &IDXGIFactory4, prefer_low_power: bool) -> anyhow::Result<IDXGIAdapter1> {
        if let Ok(factory6) = factory.cast::<IDXGIFactory6>() {
            let preference = if prefer_low_power {
                DXGI_GPU_PREFERENCE_MINIMUM_POWER
            } else {
                DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE
            };
            for index in 0.. {
                let adapter: IDXGIAdapter1 =
                    match unsafe { factory6.EnumAdapterByGpuPreference(index, preference) } {
                        Ok(adapter) => adapter,
                        Err(_) => break,
                    };
                let desc = unsafe { adapter.GetDesc1() }?;
                if desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0 {
                    continue;
                }
                return Ok(adapter);
            }
        }
        unsafe { factory.EnumAdapters1(0) }
            .map_err(|err| anyhow!("no usable adapter found: {err}"))
    }

    fn alloc_backend_id(&mut self) -> u128 {
        self.next_backend_id += 1;
        BACKEND_ID_BASE + self.next_backend_id
    }

    fn wait_for_fence_value(&self, value: u64) -> anyhow::Result<()> {
        if unsafe { self.fence.GetCompletedValue() } >= value {
            return Ok(());
        }
        unsafe { self.fence.SetEventOnCompletion(value, self.fence_event) }
            .map_err(|err| anyhow!("fence event registration failed: {err}"))?;
        unsafe { WaitForSingleObject(self.fence_event, INFINITE) };
        Ok(())
    }

    /// Lease a uniform ring buffer from the device pool, growing it when
    /// the free list is dry.
    fn lease_uniform_buffer(&mut self) -> anyhow::Result<UniformBuffer> {
        match self.uniform_pool.pop() {
            Some(mut lease) => {
                lease.write_offset = 0;
                Ok(lease)
            }
            None => resources::create_uniform_buffer(&self.device),
        }
    }

    fn write_uniform_data(&mut self, slot: u32, data: &[u8]) {
        let aligned = data.len().div_ceil(UNIFORM_ALIGNMENT) * UNIFORM_ALIGNMENT;
        let needs_new = match self.used_uniform_buffers.last() {
            Some(lease) => lease.write_offset + aligned > UNIFORM_BUFFER_SIZE,
            None => true,
        };
        if needs_new {
            match self.lease_uniform_buffer() {
                Ok(lease) => self.used_uniform_buffers.push(lease),
                Err(err) => {
                    log::error!("uniform lease failed: {err}");
                    return;
                }
            }
        }
        let lease = self.used_uniform_buffers.last_mut().unwrap();
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                lease.ptr.add(lease.write_offset),
                data.len(),
            );
        }
        let address =
            unsafe { lease.resource.GetGPUVirtualAddress() } + lease.write_offset as u64;
        self.uniform_slots[slot as usize] = Some(UniformSlot {
            address,
            size: aligned as u32,
        });
        lease.write_offset += aligned;
        self.need_uniform_bind = true;
    }

    /// Draw-time descriptor flush: every raised bind flag materializes its
    /// descriptor table using the root-slot layout the pipeline was built
    /// with, then the flag clears.
    fn flush_graphics_bindings(&mut self) {
        let Some(pipeline_id) = self.current_graphics else {
            return;
        };
        let Some(pipeline) = self.graphics_pipelines.get(&pipeline_id) else {
            return;
        };
        let layout = pipeline.layout;

        if self.need_vertex_buffer_bind {
            let strides = pipeline.vertex_strides;
            let mut views: Vec<D3D12_VERTEX_BUFFER_VIEW> = Vec::new();
            let mut first_slot = None;
            for (slot, binding) in self.bound_vertex_buffers.iter().enumerate() {
                let Some((buffer_id, offset)) = binding else {
                    continue;
                };
                let Some(buffer) = self.buffers.get(buffer_id) else {
                    continue;
                };
                if first_slot.is_none() {
                    first_slot = Some(slot as u32);
                }
                views.push(D3D12_VERTEX_BUFFER_VIEW {
                    BufferLocation: unsafe { buffer.resource.GetGPUVirtualAddress() } + offset,
                    SizeInBytes: (buffer.size - offset) as u32,
                    StrideInBytes: strides[slot],
                });
            }
            if let Some(first_slot) = first_slot {
                unsafe { self.list.IASetVertexBuffers(first_slot, Some(&views)) };
            }
            self.need_vertex_buffer_bind = false;
        }

        if self.need_uniform_bind {
            if let Some(parameter) = layout.uniform_table {
                let count = layout.counts.uniform_buffer_count;
                let (cpu, gpu) = self.view_heap.alloc(count);
                for slot in 0..count {
                    let handle = self.view_heap.offset(cpu, slot);
                    let desc = self.uniform_slots[slot as usize].map(|u| {
                        D3D12_CONSTANT_BUFFER_VIEW_DESC {
                            BufferLocation: u.address,
                            SizeInBytes: u.size,
                        }
                    });
                    unsafe {
                        self.device
                            .CreateConstantBufferView(desc.as_ref().map(|d| d as *const _), handle)
                    };
                }
                unsafe { self.list.SetGraphicsRootDescriptorTable(parameter, gpu) };
            }
            self.need_uniform_bind = false;
        }

        if self.need_storage_buffer_bind {
            if let Some(parameter) = layout.storage_buffer_table {
                let count = layout.counts.storage_buffer_count;
                let (cpu, gpu) = self.view_heap.alloc(count);
                for slot in 0..count {
                    let handle = self.view_heap.offset(cpu, slot);
                    let resource = self.bound_storage_buffers[slot as usize]
                        .and_then(|id| self.buffers.get(&id));
                    if let Some(buffer) = resource {
                        let desc = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                            Format: windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_R32_TYPELESS,
                            ViewDimension: D3D12_UAV_DIMENSION_BUFFER,
                            Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                                Buffer: D3D12_BUFFER_UAV {
                                    FirstElement: 0,
                                    NumElements: (buffer.size / 4) as u32,
                                    StructureByteStride: 0,
                                    CounterOffsetInBytes: 0,
                                    Flags: D3D12_BUFFER_UAV_FLAG_RAW,
                                },
                            },
                        };
                        unsafe {
                            self.device.CreateUnorderedAccessView(
                                &buffer.resource,
                                None,
                                Some(&desc),
                                handle,
                            )
                        };
                    }
                }
                unsafe { self.list.SetGraphicsRootDescriptorTable(parameter, gpu) };
            }
            self.need_storage_buffer_bind = false;
        }

        if self.need_storage_texture_bind {
            if let Some(parameter) = layout.storage_texture_table {
                let count = layout.counts.storage_texture_count;
                let (cpu, gpu) = self.view_heap.alloc(count);
                for slot in 0..count {
                    let handle = self.view_heap.offset(cpu, slot);
                    let resource = self.bound_storage_textures[slot as usize]
                        .and_then(|id| self.textures.get(&id));
                    if let Some(texture) = resource {
                        unsafe {
                            self.device.CreateUnorderedAccessView(
                                &texture.resource,
                                None,
                                None,
                                handle,
                            )
                        };
                    }
                }
                unsafe { self.list.SetGraphicsRootDescriptorTable(parameter, gpu) };
            }
            self.need_storage_texture_bind = false;
        }

        if self.need_sampler_bind {
            if let Some(parameter) = layout.sampler_table {
                let count = layout.counts.sampler_count;
                let (cpu, gpu) = self.sampler_heap.alloc(count);
                for slot in 0..count {
                    let handle = self.sampler_heap.offset(cpu, slot);
                    if let Some(desc) = self.bound_samplers[slot as usize]
                        .and_then(|id| self.samplers.get(&id))
                    {
                        unsafe { self.device.CreateSampler(desc, handle) };
                    }
                }
                unsafe { self.list.SetGraphicsRootDescriptorTable(parameter, gpu) };
            }
            self.need_sampler_bind = false;
        }
    }

    fn set_topology(&self) {
        if let Some(pipeline) = self
            .current_graphics
            .and_then(|id| self.graphics_pipelines.get(&id))
        {
            let topology: D3D_PRIMITIVE_TOPOLOGY = conv::topology(pipeline.primitive_type);
            unsafe { self.list.IASetPrimitiveTopology(topology) };
        }
    }

    fn set_resource_name(resource: &ID3D12Resource, name: &str) {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let _ = unsafe { resource.SetName(PCWSTR(wide.as_ptr())) };
    }

    fn command_signature(
        device: &ID3D12Device,
        argument: D3D12_INDIRECT_ARGUMENT_TYPE,
        stride: u32,
    ) -> anyhow::Result<ID3D12CommandSignature> {
        let arguments = [D3D12_INDIRECT_ARGUMENT_DESC {
            Type: argument,
            ..Default::default()
        }];
        let desc = D3D12_COMMAND_SIGNATURE_DESC {
            ByteStride: stride,
            NumArgumentDescs: arguments.len() as u32,
            pArgumentDescs: arguments.as_ptr(),
            NodeMask: 0,
        };
        let mut signature: Option<ID3D12CommandSignature> = None;
        unsafe { device.CreateCommandSignature(&desc, None, &mut signature) }
            .map_err(|err| anyhow!("command signature creation failed: {err}"))?;
        signature.ok_or_else(|| anyhow!("command signature creation returned nothing"))
    }

    fn execute_indirect(
        &mut self,
        argument: D3D12_INDIRECT_ARGUMENT_TYPE,
        buffer: BufferId,
        offset: u64,
        draw_count: u32,
    ) {
        let (slot, stride) = match argument {
            D3D12_INDIRECT_ARGUMENT_TYPE_DRAW => (&mut self.draw_signature, 16u32),
            D3D12_INDIRECT_ARGUMENT_TYPE_DRAW_INDEXED => (&mut self.draw_indexed_signature, 20),
            _ => (&mut self.dispatch_signature, 12),
        };
        if slot.is_none() {
            match Self::command_signature(&self.device, argument, stride) {
                Ok(signature) => *slot = Some(signature),
                Err(err) => {
                    log::error!("{err}");
                    return;
                }
            }
        }
        let signature = slot.as_ref().unwrap().clone();
        let Some(resource) = self.buffers.get(&buffer).map(|b| b.resource.clone()) else {
            return;
        };
        unsafe {
            self.list
                .ExecuteIndirect(&signature, draw_count, &resource, offset, None, 0)
        };
    }
}

impl GpuDriverInterface for D3d12Driver {
    fn create_texture(&mut self, id: TextureId, info: &TextureCreateInfo) -> anyhow::Result<()> {
        let texture = resources::create_texture(&self.device, info)?;
        self.textures.insert(id, texture);
        Ok(())
    }

    fn release_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn set_texture_name(&mut self, id: TextureId, name: &str) {
        if let Some(texture) = self.textures.get(&id) {
            Self::set_resource_name(&texture.resource, name);
        }
    }

    fn create_buffer(&mut self, id: BufferId, info: &BufferCreateInfo) -> anyhow::Result<()> {
        let buffer = resources::create_buffer(&self.device, info)?;
        self.buffers.insert(id, buffer);
        Ok(())
    }

    fn release_buffer(&mut self, id: BufferId) {
        self.buffers.remove(&id);
    }

    fn set_buffer_name(&mut self, id: BufferId, name: &str) {
        if let Some(buffer) = self.buffers.get(&id) {
            Self::set_resource_name(&buffer.resource, name);
        }
    }

    fn create_transfer_buffer(
        &mut self,
        id: TransferBufferId,
        info: &TransferBufferCreateInfo,
    ) -> anyhow::Result<()> {
        let buffer = resources::create_transfer_buffer(&self.device, info)?;
        self.transfer_buffers.insert(id, buffer);
        Ok(())
    }

    fn release_transfer_buffer(&mut self, id: TransferBufferId) {
        self.transfer_buffers.remove(&id);
    }

    fn map_transfer_buffer(
        &mut self,
        id: TransferBufferId,
        _cycle: bool,
    ) -> anyhow::Result<MappedRegion> {
        let buffer = self
            .transfer_buffers
            .get(&id)
            .ok_or_else(|| anyhow!("unknown transfer buffer"))?;
        Ok(MappedRegion {
            ptr: buffer.ptr,
            len: buffer.size as usize,
        })
    }

    fn unmap_transfer_buffer(&mut self, _id: TransferBufferId) {
        // upload and readback heaps stay persistently mapped
    }

    fn create_sampler(&mut self, id: SamplerId, info: &SamplerCreateInfo) -> anyhow::Result<()> {
        self.samplers.insert(id, resources::sampler_desc(info));
        Ok(())
    }

    fn release_sampler(&mut self, id: SamplerId) {
        self.samplers.remove(&id);
    }

    fn create_shader(&mut self, id: ShaderId, info: &ShaderCreateInfo) -> anyhow::Result<()> {
        let shader = shader::ingest_shader(info)?;
        self.shaders.insert(id, shader);
        Ok(())
    }

    fn release_shader(&mut self, id: ShaderId) {
        self.shaders.remove(&id);
    }

    fn create_graphics_pipeline(
        &mut self,
        id: GraphicsPipelineId,
        info: &GraphicsPipelineCreateInfo,
    ) -> anyhow::Result<()> {
        let pipeline = pipeline::create_graphics_pipeline(&self.device, info, &self.shaders)?;
        self.graphics_pipelines.insert(id, pipeline);
        Ok(())
    }

    fn release_graphics_pipeline(&mut self, id: GraphicsPipelineId) {
        self.graphics_pipelines.remove(&id);
    }

    fn create_compute_pipeline(
        &mut self,
        id: ComputePipelineId,
        info: &ComputePipelineCreateInfo,
    ) -> anyhow::Result<()> {
        let pipeline = pipeline::create_compute_pipeline(&self.device, info, &self.shaders)?;
        self.compute_pipelines.insert(id, pipeline);
        Ok(())
    }

    fn release_compute_pipeline(&mut self, id: ComputePipelineId) {
        self.compute_pipelines.remove(&id);
    }

    fn acquire_command_buffer(&mut self) -> anyhow::Result<()> {
        unsafe { self.allocator.Reset() }
            .map_err(|err| anyhow!("command allocator reset failed: {err}"))?;
        unsafe { self.list.Reset(&self.allocator, None) }
            .map_err(|err| anyhow!("command list reset failed: {err}"))?;
        let heaps = [Some(self.view_heap.heap.clone()), Some(self.sampler_heap.heap.clone())];
        unsafe { self.list.SetDescriptorHeaps(&heaps) };
        self.uniform_slots = [None; 14];
        self.current_graphics = None;
        self.current_compute = None;
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        color_targets: &[ColorTargetInfo],
        depth_stencil_target: Option<&DepthStencilTargetInfo>,
        extent: (u32, u32),
    ) -> anyhow::Result<()> {
        let mut rtv_handles: Vec<D3D12_CPU_DESCRIPTOR_HANDLE> =
            Vec::with_capacity(color_targets.len());
        self.pass_color_targets.clear();

        for target in color_targets {
            let (cpu, _) = self.rtv_scratch.alloc(1);
            let texture = self
                .textures
                .get_mut(&target.texture)
                .ok_or_else(|| anyhow!("unknown color attachment"))?;
            if !texture.info.usage.contains(TextureUsage::COLOR_TARGET)
                && !texture.is_render_target
            {
                return Err(anyhow!("texture was not created as a color target"));
            }
            transition(
                &self.list,
                &texture.resource,
                texture.state,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
            );
            texture.state = D3D12_RESOURCE_STATE_RENDER_TARGET;

            let rtv = match texture.rtv {
                Some(rtv) => rtv,
                None => {
                    let desc = D3D12_RENDER_TARGET_VIEW_DESC {
                        Format: conv::texture_format(texture.info.format),
                        ViewDimension: D3D12_RTV_DIMENSION_TEXTURE2D,
                        Anonymous: D3D12_RENDER_TARGET_VIEW_DESC_0 {
                            Texture2D: D3D12_TEX2D_RTV {
                                MipSlice: target.mip_level,
                                PlaneSlice: 0,
                            },
                        },
                    };
                    unsafe {
                        self.device
                            .CreateRenderTargetView(&texture.resource, Some(&desc), cpu)
                    };
                    cpu
                }
            };
            if target.load_op == LoadOp::Clear {
                unsafe {
                    self.list.ClearRenderTargetView(
                        rtv,
                        &target.clear_color.as_array(),
                        None,
                    )
                };
            }
            rtv_handles.push(rtv);
            self.pass_color_targets.push(target.texture);
        }

        let mut dsv_handle = None;
        if let Some(target) = depth_stencil_target {
            let (cpu, _) = self.dsv_scratch.alloc(1);
            let texture = self
                .textures
                .get_mut(&target.texture)
                .ok_or_else(|| anyhow!("unknown depth-stencil attachment"))?;
            transition(
                &self.list,
                &texture.resource,
                texture.state,
                D3D12_RESOURCE_STATE_DEPTH_WRITE,
            );
            texture.state = D3D12_RESOURCE_STATE_DEPTH_WRITE;
            unsafe {
                self.device.CreateDepthStencilView(&texture.resource, None, cpu);
            }
            let mut clear_flags = D3D12_CLEAR_FLAGS(0);
            if target.load_op == LoadOp::Clear {
                clear_flags |= D3D12_CLEAR_FLAG_DEPTH;
            }
            if target.stencil_load_op == LoadOp::Clear && texture.info.format.has_stencil() {
                clear_flags |= D3D12_CLEAR_FLAG_STENCIL;
            }
            if clear_flags.0 != 0 {
                unsafe {
                    self.list.ClearDepthStencilView(
                        cpu,
                        clear_flags,
                        target.clear_depth,
                        target.clear_stencil,
                        None,
                    )
                };
            }
            dsv_handle = Some(cpu);
        }

        unsafe {
            self.list.OMSetRenderTargets(
                rtv_handles.len() as u32,
                if rtv_handles.is_empty() {
                    None
                } else {
                    Some(rtv_handles.as_ptr())
                },
                false.into(),
                dsv_handle.as_ref().map(|h| h as *const _),
            );
        }

        // default full-framebuffer viewport and scissor
        self.set_viewport(&Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.0 as f32,
            height: extent.1 as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        self.set_scissor(&ScissorRect {
            x: 0,
            y: 0,
            width: extent.0,
            height: extent.1,
        });
        Ok(())
    }

    fn end_render_pass(&mut self) {
        let targets: Vec<TextureId> = self.pass_color_targets.drain(..).collect();
        for id in targets {
            if let Some(texture) = self.textures.get_mut(&id) {
                let back_to = if texture.is_render_target {
                    D3D12_RESOURCE_STATE_PRESENT
                } else {
                    D3D12_RESOURCE_STATE_COMMON
                };
                transition(&self.list, &texture.resource, texture.state, back_to);
                texture.state = back_to;
            }
        }
        self.current_graphics = None;
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        let vp = D3D12_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        };
        unsafe { self.list.RSSetViewports(&[vp]) };
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        let rect = windows::Win32::Foundation::RECT {
            left: scissor.x,
            top: scissor.y,
            right: scissor.x + scissor.width as i32,
            bottom: scissor.y + scissor.height as i32,
        };
        unsafe { self.list.RSSetScissorRects(&[rect]) };
    }

    fn bind_graphics_pipeline(&mut self, pipeline_id: GraphicsPipelineId) {
        let Some(pipeline) = self.graphics_pipelines.get(&pipeline_id) else {
            return;
        };
        unsafe {
            self.list.SetPipelineState(&pipeline.pso);
            self.list.SetGraphicsRootSignature(&pipeline.root_signature);
            self.list.OMSetBlendFactor(Some(&pipeline.blend_constants));
            self.list.OMSetStencilRef(pipeline.stencil_reference as u32);
        }
        self.current_graphics = Some(pipeline_id);
        // raise every bind flag so the next draw re-seeds the tables
        self.need_uniform_bind = true;
        self.need_sampler_bind = true;
        self.need_storage_buffer_bind = true;
        self.need_storage_texture_bind = true;
    }

    fn bind_vertex_buffers(&mut self, first_slot: u32, bindings: &[BufferBinding]) {
        for (index, binding) in bindings.iter().enumerate() {
            self.bound_vertex_buffers[first_slot as usize + index] =
                Some((binding.buffer, binding.offset));
        }
        self.need_vertex_buffer_bind = true;
    }

    fn bind_index_buffer(&mut self, binding: &BufferBinding, index_element_size: IndexElementSize) {
        let Some(buffer) = self.buffers.get(&binding.buffer) else {
            return;
        };
        let view = D3D12_INDEX_BUFFER_VIEW {
            BufferLocation: unsafe { buffer.resource.GetGPUVirtualAddress() } + binding.offset,
            SizeInBytes: (buffer.size - binding.offset) as u32,
            Format: conv::index_format(index_element_size),
        };
        unsafe { self.list.IASetIndexBuffer(Some(&view)) };
    }

    fn bind_vertex_samplers(&mut self, first_slot: u32, bindings: &[TextureSamplerBinding]) {
        for (index, binding) in bindings.iter().enumerate() {
            self.bound_samplers[first_slot as usize + index] = Some(binding.sampler);
        }
        self.need_sampler_bind = true;
    }

    fn bind_fragment_samplers(&mut self, first_slot: u32, bindings: &[TextureSamplerBinding]) {
        self.bind_vertex_samplers(first_slot, bindings);
    }

    fn bind_vertex_storage_textures(&mut self, first_slot: u32, textures: &[TextureId]) {
        for (index, &texture) in textures.iter().enumerate() {
            self.bound_storage_textures[first_slot as usize + index] = Some(texture);
        }
        self.need_storage_texture_bind = true;
    }

    fn bind_fragment_storage_textures(&mut self, first_slot: u32, textures: &[TextureId]) {
        self.bind_vertex_storage_textures(first_slot, textures);
    }

    fn bind_vertex_storage_buffers(&mut self, first_slot: u32, buffers: &[BufferId]) {
        for (index, &buffer) in buffers.iter().enumerate() {
            self.bound_storage_buffers[first_slot as usize + index] = Some(buffer);
        }
        self.need_storage_buffer_bind = true;
    }

    fn bind_fragment_storage_buffers(&mut self, first_slot: u32, buffers: &[BufferId]) {
        self.bind_vertex_storage_buffers(first_slot, buffers);
    }

    fn push_uniform_data(&mut self, _stage: ShaderStage, slot: u32, data: &[u8]) {
        self.write_uniform_data(slot, data);
    }

    fn draw_primitives(
        &mut self,
        num_vertices: u32,
        num_instances: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.flush_graphics_bindings();
        self.set_topology();
        unsafe {
            self.list
                .DrawInstanced(num_vertices, num_instances, first_vertex, first_instance)
        };
    }

    fn draw_indexed_primitives(
        &mut self,
        num_indices: u32,
        num_instances: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.flush_graphics_bindings();
        self.set_topology();
        unsafe {
            self.list.DrawIndexedInstanced(
                num_indices,
                num_instances,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    fn draw_primitives_indirect(&mut self, buffer: BufferId, offset: u64, draw_count: u32) {
        self.flush_graphics_bindings();
        self.set_topology();
        self.execute_indirect(D3D12_INDIRECT_ARGUMENT_TYPE_DRAW, buffer, offset, draw_count);
    }

    fn draw_indexed_primitives_indirect(
        &mut self,
        buffer: BufferId,
        offset: u64,
        draw_count: u32,
    ) {
        self.flush_graphics_bindings();
        self.set_topology();
        self.execute_indirect(
            D3D12_INDIRECT_ARGUMENT_TYPE_DRAW_INDEXED,
            buffer,
            offset,
            draw_count,
        );
    }

    fn begin_compute_pass(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn end_compute_pass(&mut self) {
        self.current_compute = None;
    }

    fn bind_compute_pipeline(&mut self, pipeline_id: ComputePipelineId) {
        let Some(pipeline) = self.compute_pipelines.get(&pipeline_id) else {
            return;
        };
        unsafe {
            self.list.SetPipelineState(&pipeline.pso);
            self.list.SetComputeRootSignature(&pipeline.root_signature);
        }
        self.current_compute = Some(pipeline_id);
        self.need_uniform_bind = true;
        self.need_storage_buffer_bind = true;
        self.need_storage_texture_bind = true;
    }

    fn bind_compute_storage_textures(&mut self, first_slot: u32, textures: &[TextureId]) {
        self.bind_vertex_storage_textures(first_slot, textures);
    }

    fn bind_compute_storage_buffers(&mut self, first_slot: u32, buffers: &[BufferId]) {
        self.bind_vertex_storage_buffers(first_slot, buffers);
    }

    fn dispatch_compute(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        let Some(pipeline) = self
            .current_compute
            .and_then(|id| self.compute_pipelines.get(&id))
        else {
            return;
        };
        let layout = pipeline.layout;
        if self.need_uniform_bind {
            if let Some(parameter) = layout.uniform_table {
                let count = layout.counts.uniform_buffer_count;
                let (cpu, gpu) = self.view_heap.alloc(count);
                for slot in 0..count {
                    let handle = self.view_heap.offset(cpu, slot);
                    let desc = self.uniform_slots[slot as usize].map(|u| {
                        D3D12_CONSTANT_BUFFER_VIEW_DESC {
                            BufferLocation: u.address,
                            SizeInBytes: u.size,
                        }
                    });
                    unsafe {
                        self.device
                            .CreateConstantBufferView(desc.as_ref().map(|d| d as *const _), handle)
                    };
                }
                unsafe { self.list.SetComputeRootDescriptorTable(parameter, gpu) };
            }
            self.need_uniform_bind = false;
        }
        unsafe {
            self.list
                .Dispatch(group_count_x, group_count_y, group_count_z)
        };
    }

    fn dispatch_compute_indirect(&mut self, buffer: BufferId, offset: u64) {
        self.execute_indirect(D3D12_INDIRECT_ARGUMENT_TYPE_DISPATCH, buffer, offset, 1);
    }

    fn begin_copy_pass(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn end_copy_pass(&mut self) {}

    fn upload_to_buffer(
        &mut self,
        source: &TransferBufferLocation,
        destination: &BufferRegion,
        _cycle: bool,
    ) -> anyhow::Result<()> {
        let transfer = self
            .transfer_buffers
            .get(&source.transfer_buffer)
            .ok_or_else(|| anyhow!("unknown transfer buffer"))?;
        let buffer = self
            .buffers
            .get_mut(&destination.buffer)
            .ok_or_else(|| anyhow!("unknown buffer"))?;
        transition(
            &self.list,
            &buffer.resource,
            buffer.state,
            D3D12_RESOURCE_STATE_COPY_DEST,
        );
        unsafe {
            self.list.CopyBufferRegion(
                &buffer.resource,
                destination.offset,
                &transfer.resource,
                source.offset,
                destination.size,
            )
        };
        transition(
            &self.list,
            &buffer.resource,
            D3D12_RESOURCE_STATE_COPY_DEST,
            D3D12_RESOURCE_STATE_COMMON,
        );
        buffer.state = D3D12_RESOURCE_STATE_COMMON;
        Ok(())
    }

    fn upload_to_texture(
        &mut self,
        source: &TextureTransferInfo,
        destination: &TextureRegion,
        _cycle: bool,
    ) -> anyhow::Result<()> {
        let transfer = self
            .transfer_buffers
            .get(&source.transfer_buffer)
            .ok_or_else(|| anyhow!("unknown transfer buffer"))?;
        let texture = self
            .textures
            .get_mut(&destination.texture)
            .ok_or_else(|| anyhow!("unknown texture"))?;

        let block = texture.info.format.texel_block_size() as u32;
        let pixels_per_row = if source.pixels_per_row == 0 {
            destination.width
        } else {
            source.pixels_per_row
        };
        let row_pitch = (pixels_per_row * block).div_ceil(ROW_PITCH_ALIGNMENT) * ROW_PITCH_ALIGNMENT;

        let subresource =
            destination.mip_level + destination.layer * texture.info.level_count;

        transition(
            &self.list,
            &texture.resource,
            texture.state,
            D3D12_RESOURCE_STATE_COPY_DEST,
        );
        let src = footprint_location(
            &transfer.resource,
            source.offset,
            conv::texture_format(texture.info.format),
            destination.width,
            destination.height,
            destination.depth.max(1),
            row_pitch,
        );
        let dst = subresource_location(&texture.resource, subresource);
        unsafe {
            self.list.CopyTextureRegion(
                &dst,
                destination.x,
                destination.y,
                destination.z,
                &src,
                None,
            )
        };
        transition(
            &self.list,
            &texture.resource,
            D3D12_RESOURCE_STATE_COPY_DEST,
            D3D12_RESOURCE_STATE_COMMON,
        );
        texture.state = D3D12_RESOURCE_STATE_COMMON;
        Ok(())
    }

    fn download_from_buffer(
        &mut self,
        source: &BufferRegion,
        destination: &TransferBufferLocation,
    ) -> anyhow::Result<()> {
        let transfer = self
            .transfer_buffers
            .get(&destination.transfer_buffer)
            .ok_or_else(|| anyhow!("unknown transfer buffer"))?;
        let buffer = self
            .buffers
            .get_mut(&source.buffer)
            .ok_or_else(|| anyhow!("unknown buffer"))?;
        transition(
            &self.list,
            &buffer.resource,
            buffer.state,
            D3D12_RESOURCE_STATE_COPY_SOURCE,
        );
        unsafe {
            self.list.CopyBufferRegion(
                &transfer.resource,
                destination.offset,
                &buffer.resource,
                source.offset,
                source.size,
            )
        };
        transition(
            &self.list,
            &buffer.resource,
            D3D12_RESOURCE_STATE_COPY_SOURCE,
            D3D12_RESOURCE_STATE_COMMON,
        );
        buffer.state = D3D12_RESOURCE_STATE_COMMON;
        Ok(())
    }

    fn download_from_texture(
        &mut self,
        source: &TextureRegion,
        destination: &TextureTransferInfo,
    ) -> anyhow::Result<()> {
        let transfer = self
            .transfer_buffers
            .get(&destination.transfer_buffer)
            .ok_or_else(|| anyhow!("unknown transfer buffer"))?;
        let texture = self
            .textures
            .get_mut(&source.texture)
            .ok_or_else(|| anyhow!("unknown texture"))?;
        let block = texture.info.format.texel_block_size() as u32;
        let pixels_per_row = if destination.pixels_per_row == 0 {
            source.width
        } else {
            destination.pixels_per_row
        };
        let row_pitch = (pixels_per_row * block).div_ceil(ROW_PITCH_ALIGNMENT) * ROW_PITCH_ALIGNMENT;
        let subresource = source.mip_level + source.layer * texture.info.level_count;

        transition(
            &self.list,
            &texture.resource,
            texture.state,
            D3D12_RESOURCE_STATE_COPY_SOURCE,
        );
        let src = subresource_location(&texture.resource, subresource);
        let dst = footprint_location(
            &transfer.resource,
            destination.offset,
            conv::texture_format(texture.info.format),
            source.width,
            source.height,
            source.depth.max(1),
            row_pitch,
        );
        let src_box = D3D12_BOX {
            left: source.x,
            top: source.y,
            front: source.z,
            right: source.x + source.width,
            bottom: source.y + source.height,
            back: source.z + source.depth.max(1),
        };
        unsafe { self.list.CopyTextureRegion(&dst, 0, 0, 0, &src, Some(&src_box)) };
        transition(
            &self.list,
            &texture.resource,
            D3D12_RESOURCE_STATE_COPY_SOURCE,
            D3D12_RESOURCE_STATE_COMMON,
        );
        texture.state = D3D12_RESOURCE_STATE_COMMON;
        Ok(())
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferRegion,
        destination: &BufferRegion,
    ) -> anyhow::Result<()> {
        let [src, dst] = [source.buffer, destination.buffer];
        let src_resource = self
            .buffers
            .get(&src)
            .ok_or_else(|| anyhow!("unknown source buffer"))?
            .resource
            .clone();
        let dst_resource = self
            .buffers
            .get(&dst)
            .ok_or_else(|| anyhow!("unknown destination buffer"))?
            .resource
            .clone();
        unsafe {
            self.list.CopyBufferRegion(
                &dst_resource,
                destination.offset,
                &src_resource,
                source.offset,
                source.size,
            )
        };
        Ok(())
    }

    fn copy_texture_to_texture(
        &mut self,
        source: &TextureRegion,
        destination: &TextureRegion,
    ) -> anyhow::Result<()> {
        let src_texture = self
            .textures
            .get(&source.texture)
            .ok_or_else(|| anyhow!("unknown source texture"))?;
        let dst_texture = self
            .textures
            .get(&destination.texture)
            .ok_or_else(|| anyhow!("unknown destination texture"))?;
        let src = subresource_location(
            &src_texture.resource,
            source.mip_level + source.layer * src_texture.info.level_count,
        );
        let dst = subresource_location(
            &dst_texture.resource,
            destination.mip_level + destination.layer * dst_texture.info.level_count,
        );
        let src_box = D3D12_BOX {
            left: source.x,
            top: source.y,
            front: source.z,
            right: source.x + source.width,
            bottom: source.y + source.height,
            back: source.z + source.depth.max(1),
        };
        unsafe {
            self.list.CopyTextureRegion(
                &dst,
                destination.x,
                destination.y,
                destination.z,
                &src,
                Some(&src_box),
            )
        };
        Ok(())
    }

    fn generate_mipmaps(&mut self, _texture: TextureId) -> anyhow::Result<()> {
        // needs the shared blit pipeline set, which this driver does not
        // carry; see the driver notes
        Err(anyhow!("mipmap generation is not available on this driver"))
    }

    fn blit(&mut self, info: &BlitInfo) -> anyhow::Result<()> {
        let source = TextureRegion {
            texture: info.source.texture,
            mip_level: info.source.mip_level,
            layer: info.source.layer,
            x: info.source.x,
            y: info.source.y,
            z: 0,
            width: info.source.width,
            height: info.source.height,
            depth: 1,
        };
        let destination = TextureRegion {
            texture: info.destination.texture,
            mip_level: info.destination.mip_level,
            layer: info.destination.layer,
            x: info.destination.x,
            y: info.destination.y,
            z: 0,
            width: info.destination.width,
            height: info.destination.height,
            depth: 1,
        };
        self.copy_texture_to_texture(&source, &destination)
    }

    fn claim_window(
        &mut self,
        id: WindowId,
        window: &NativeWindow,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> anyhow::Result<()> {
        let raw = window
            .raw
            .ok_or_else(|| anyhow!("window has no native handle"))?;
        let hwnd = swapchain::window_hwnd(raw)?;
        let back_buffer_ids = [
            TextureId(self.alloc_backend_id()),
            TextureId(self.alloc_backend_id()),
        ];
        let window_data = swapchain::create_window(
            &self.factory,
            &self.device,
            &self.queue,
            hwnd,
            window.width,
            window.height,
            composition,
            present_mode,
            self.allow_tearing,
            back_buffer_ids,
        )?;
        for back_buffer in &window_data.back_buffers {
            self.textures.insert(
                back_buffer.texture,
                D3d12Texture {
                    resource: back_buffer.resource.clone(),
                    info: TextureCreateInfo {
                        format: composition.texture_format(),
                        ty: TextureType::D2,
                        width: window.width,
                        height: window.height,
                        depth: 1,
                        layer_count: 1,
                        level_count: 1,
                        sample_count: SampleCount::S1,
                        usage: TextureUsage::COLOR_TARGET,
                    },
                    state: D3D12_RESOURCE_STATE_PRESENT,
                    is_render_target: true,
                    rtv: Some(back_buffer.rtv),
                },
            );
        }
        self.windows.insert(id, window_data);
        Ok(())
    }

    fn unclaim_window(&mut self, id: WindowId) {
        let _ = self.wait_idle();
        if let Some(window) = self.windows.remove(&id) {
            for back_buffer in &window.back_buffers {
                self.textures.remove(&back_buffer.texture);
            }
            self.active_windows.retain(|&w| w != id);
        }
    }

    fn set_swapchain_parameters(
        &mut self,
        id: WindowId,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> anyhow::Result<()> {
        let (hwnd, width, height) = {
            let window = self
                .windows
                .get(&id)
                .ok_or_else(|| anyhow!("window is not claimed"))?;
            (window.hwnd, window.width, window.height)
        };
        self.unclaim_window(id);
        let native = NativeWindow {
            raw: Some(raw_window_handle::RawWindowHandle::Win32({
                let mut handle = raw_window_handle::Win32WindowHandle::new(
                    std::num::NonZeroIsize::new(hwnd.0 as isize)
                        .ok_or_else(|| anyhow!("window handle vanished"))?,
                );
                handle.hinstance = None;
                handle
            })),
            width,
            height,
        };
        self.claim_window(id, &native, composition, present_mode)
    }

    fn swapchain_texture_format(&self, id: WindowId) -> TextureFormat {
        self.windows
            .get(&id)
            .map(|w| w.composition.texture_format())
            .unwrap_or_default()
    }

    fn supports_present_mode(&self, _id: WindowId, mode: PresentMode) -> bool {
        match mode {
            PresentMode::Vsync => true,
            PresentMode::Immediate => true,
            PresentMode::Mailbox => false,
        }
    }

    fn supports_swapchain_composition(
        &self,
        id: WindowId,
        composition: SwapchainComposition,
    ) -> bool {
        match composition {
            SwapchainComposition::Sdr | SwapchainComposition::SdrLinear => true,
            _ => {
                let Some(window) = self.windows.get(&id) else {
                    return false;
                };
                let color_space = conv::swapchain_color_space(composition);
                match unsafe { window.swapchain.CheckColorSpaceSupport(color_space) } {
                    Ok(support) => {
                        support & DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT.0 as u32 != 0
                    }
                    Err(_) => false,
                }
            }
        }
    }

    fn acquire_swapchain_texture(&mut self, id: WindowId) -> anyhow::Result<SwapchainTexture> {
        let window = self
            .windows
            .get(&id)
            .ok_or_else(|| anyhow!("window is not claimed"))?;
        if !self.active_windows.contains(&id) {
            self.active_windows.push(id);
        }
        Ok(SwapchainTexture {
            texture: window.current_back_buffer().texture,
            format: window.composition.texture_format(),
            width: window.width,
            height: window.height,
        })
    }

    fn submit(&mut self) -> anyhow::Result<()> {
        unsafe { self.list.Close() }.map_err(|err| anyhow!("command list close failed: {err}"))?;
        let lists = [Some(self.list.cast::<ID3D12CommandList>()?)];
        unsafe { self.queue.ExecuteCommandLists(&lists) };

        let presented: Vec<WindowId> = self.active_windows.drain(..).collect();
        for id in presented {
            if let Some(window) = self.windows.get_mut(&id) {
                window.present(self.allow_tearing);
            }
        }

        // the next-expected fence value advances on every attempt, even when
        // the signal itself fails
        self.fence_value += 1;
        if let Err(err) = unsafe { self.queue.Signal(&self.fence, self.fence_value) } {
            log::error!("fence signal failed: {err}");
        }
        if unsafe { self.fence.GetCompletedValue() } + 1 < self.fence_value {
            self.wait_for_fence_value(self.fence_value - 1)?;
        }

        // everything the lapsed submission leased is safe to recycle now
        let mut returned: Vec<UniformBuffer> = self.used_uniform_buffers.drain(..).collect();
        self.uniform_pool.append(&mut returned);
        self.view_heap.reset();
        self.sampler_heap.reset();
        self.rtv_scratch.reset();
        self.dsv_scratch.reset();
        Ok(())
    }

    fn submit_and_acquire_fence(&mut self) -> anyhow::Result<FenceId> {
        self.submit()?;
        let fence = FenceId(self.alloc_backend_id());
        self.fences.insert(fence, self.fence_value);
        Ok(fence)
    }

    fn wait_idle(&mut self) -> anyhow::Result<()> {
        self.fence_value += 1;
        unsafe { self.queue.Signal(&self.fence, self.fence_value) }
            .map_err(|err| anyhow!("fence signal failed: {err}"))?;
        self.wait_for_fence_value(self.fence_value)
    }

    fn wait_for_fences(&mut self, fences: &[FenceId], wait_all: bool) -> anyhow::Result<()> {
        let mut values: Vec<u64> = fences
            .iter()
            .filter_map(|fence| self.fences.get(fence).copied())
            .collect();
        if values.is_empty() {
            return Ok(());
        }
        values.sort_unstable();
        if wait_all {
            self.wait_for_fence_value(*values.last().unwrap())
        } else {
            // the single timeline completes in value order; the smallest
            // value finishes first
            self.wait_for_fence_value(values[0])
        }
    }

    fn query_fence(&mut self, fence: FenceId) -> bool {
        match self.fences.get(&fence) {
            Some(&value) => unsafe { self.fence.GetCompletedValue() } >= value,
            None => false,
        }
    }

    fn release_fence(&mut self, fence: FenceId) {
        self.fences.remove(&fence);
    }

    fn insert_debug_label(&mut self, text: &str) {
        unsafe {
            self.list
                .SetMarker(0, Some(text.as_ptr() as *const _), text.len() as u32)
        };
    }

    fn push_debug_group(&mut self, name: &str) {
        unsafe {
            self.list
                .BeginEvent(0, Some(name.as_ptr() as *const _), name.len() as u32)
        };
    }

    fn pop_debug_group(&mut self) {
        unsafe { self.list.EndEvent() };
    }

    fn supports_texture_format(
        &self,
        format: TextureFormat,
        ty: TextureType,
        usage: TextureUsage,
    ) -> bool {
        let native = conv::texture_format(format);
        if native == DXGI_FORMAT_UNKNOWN {
            return false;
        }
        if usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) && !format.is_depth_stencil() {
            return false;
        }
        if usage.contains(TextureUsage::SAMPLER) && format.is_integer() {
            return false;
        }
        if ty == TextureType::D3 && usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
            return false;
        }
        let mut support = D3D12_FEATURE_DATA_FORMAT_SUPPORT {
            Format: native,
            ..Default::default()
        };
        let ok = unsafe {
            self.device.CheckFeatureSupport(
                D3D12_FEATURE_FORMAT_SUPPORT,
                &mut support as *mut _ as *mut _,
                std::mem::size_of::<D3D12_FEATURE_DATA_FORMAT_SUPPORT>() as u32,
            )
        };
        ok.is_ok()
    }

    fn best_sample_count(&self, format: TextureFormat, desired: SampleCount) -> SampleCount {
        let native = conv::texture_format(format);
        let candidates = [
            SampleCount::S8,
            SampleCount::S4,
            SampleCount::S2,
            SampleCount::S1,
        ];
        for candidate in candidates {
            if candidate.as_u32() > desired.as_u32() {
                continue;
            }
            let mut levels = D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS {
                Format: native,
                SampleCount: candidate.as_u32(),
                Flags: D3D12_MULTISAMPLE_QUALITY_LEVELS_FLAG_NONE,
                NumQualityLevels: 0,
            };
            let ok = unsafe {
                self.device.CheckFeatureSupport(
                    D3D12_FEATURE_MULTISAMPLE_QUALITY_LEVELS,
                    &mut levels as *mut _ as *mut _,
                    std::mem::size_of::<D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS>() as u32,
                )
            };
            if ok.is_ok() && levels.NumQualityLevels > 0 {
                return candidate;
            }
        }
        SampleCount::S1
    }

    fn destroy(&mut self) {
        let _ = self.wait_idle();
        let _ = unsafe { CloseHandle(self.fence_event) };
    }
}
