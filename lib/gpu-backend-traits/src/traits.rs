use std::fmt::Debug;

use gpu_types::config::{GpuConfig, GpuDriverKind};
use gpu_types::formats::{IndexElementSize, SampleCount, TextureFormat};
use gpu_types::passes::{
    BlitInfo, BufferBinding, BufferRegion, ColorTargetInfo, DepthStencilTargetInfo, PresentMode,
    ScissorRect, SwapchainComposition, TextureRegion, TextureSamplerBinding, TextureTransferInfo,
    TransferBufferLocation, Viewport,
};
use gpu_types::resources::{
    BufferCreateInfo, BufferId, ComputePipelineCreateInfo, ComputePipelineId, FenceId,
    GraphicsPipelineCreateInfo, GraphicsPipelineId, SamplerCreateInfo, SamplerId, ShaderCreateInfo,
    ShaderFormat, ShaderId, ShaderStage, TextureCreateInfo, TextureId, TextureType,
    TextureUsage, TransferBufferCreateInfo, TransferBufferId, WindowId,
};

use crate::window::{DisplayRequirements, NativeWindow};

/// A host-visible mapping of a transfer buffer. The pointer stays valid
/// until the matching unmap call; the front-end wraps it in a guard so user
/// code never touches the raw pointer.
#[derive(Debug, Copy, Clone)]
pub struct MappedRegion {
    pub ptr: *mut u8,
    pub len: usize,
}

#[derive(Debug, Copy, Clone)]
pub struct SwapchainTexture {
    pub texture: TextureId,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

/// The capability surface one compiled-in driver exposes to the front-end.
///
/// The front-end owns the command-buffer state machine and all debug-mode
/// validation; by the time a call lands here its arguments are shape-checked
/// and the pass bracketing is known to be legal. Ids are allocated by the
/// front-end; the driver keys its native objects by them.
///
/// One native command recorder exists per device. `acquire_command_buffer`
/// resets it, recording calls append to it, `submit` executes and recycles
/// it.
pub trait GpuDriverInterface: Debug {
    // resource factory
    fn create_texture(&mut self, id: TextureId, info: &TextureCreateInfo) -> anyhow::Result<()>;
    fn release_texture(&mut self, id: TextureId);
    fn set_texture_name(&mut self, id: TextureId, name: &str);

    fn create_buffer(&mut self, id: BufferId, info: &BufferCreateInfo) -> anyhow::Result<()>;
    fn release_buffer(&mut self, id: BufferId);
    fn set_buffer_name(&mut self, id: BufferId, name: &str);

    fn create_transfer_buffer(
        &mut self,
        id: TransferBufferId,
        info: &TransferBufferCreateInfo,
    ) -> anyhow::Result<()>;
    fn release_transfer_buffer(&mut self, id: TransferBufferId);
    /// May block until the region is safe to write. `cycle` requests a fresh
    /// backing allocation when the previous contents are still in flight.
    fn map_transfer_buffer(
        &mut self,
        id: TransferBufferId,
        cycle: bool,
    ) -> anyhow::Result<MappedRegion>;
    fn unmap_transfer_buffer(&mut self, id: TransferBufferId);

    fn create_sampler(&mut self, id: SamplerId, info: &SamplerCreateInfo) -> anyhow::Result<()>;
    fn release_sampler(&mut self, id: SamplerId);

    fn create_shader(&mut self, id: ShaderId, info: &ShaderCreateInfo) -> anyhow::Result<()>;
    fn release_shader(&mut self, id: ShaderId);

    fn create_graphics_pipeline(
        &mut self,
        id: GraphicsPipelineId,
        info: &GraphicsPipelineCreateInfo,
    ) -> anyhow::Result<()>;
    fn release_graphics_pipeline(&mut self, id: GraphicsPipelineId);

    fn create_compute_pipeline(
        &mut self,
        id: ComputePipelineId,
        info: &ComputePipelineCreateInfo,
    ) -> anyhow::Result<()>;
    fn release_compute_pipeline(&mut self, id: ComputePipelineId);

    // command recording
    fn acquire_command_buffer(&mut self) -> anyhow::Result<()>;

    fn begin_render_pass(
        &mut self,
        color_targets: &[ColorTargetInfo],
        depth_stencil_target: Option<&DepthStencilTargetInfo>,
        extent: (u32, u32),
    ) -> anyhow::Result<()>;
    fn end_render_pass(&mut self);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor(&mut self, scissor: &ScissorRect);
    fn bind_graphics_pipeline(&mut self, pipeline: GraphicsPipelineId);
    fn bind_vertex_buffers(&mut self, first_slot: u32, bindings: &[BufferBinding]);
    fn bind_index_buffer(&mut self, binding: &BufferBinding, index_element_size: IndexElementSize);
    fn bind_vertex_samplers(&mut self, first_slot: u32, bindings: &[TextureSamplerBinding]);
    fn bind_vertex_storage_textures(&mut self, first_slot: u32, textures: &[TextureId]);
    fn bind_vertex_storage_buffers(&mut self, first_slot: u32, buffers: &[BufferId]);
    fn bind_fragment_samplers(&mut self, first_slot: u32, bindings: &[TextureSamplerBinding]);
    fn bind_fragment_storage_textures(&mut self, first_slot: u32, textures: &[TextureId]);
    fn bind_fragment_storage_buffers(&mut self, first_slot: u32, buffers: &[BufferId]);
    fn push_uniform_data(&mut self, stage: ShaderStage, slot: u32, data: &[u8]);
    fn draw_primitives(
        &mut self,
        num_vertices: u32,
        num_instances: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn draw_indexed_primitives(
        &mut self,
        num_indices: u32,
        num_instances: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn draw_primitives_indirect(&mut self, buffer: BufferId, offset: u64, draw_count: u32);
    fn draw_indexed_primitives_indirect(&mut self, buffer: BufferId, offset: u64, draw_count: u32);

    fn begin_compute_pass(&mut self) -> anyhow::Result<()>;
    fn end_compute_pass(&mut self);
    fn bind_compute_pipeline(&mut self, pipeline: ComputePipelineId);
    fn bind_compute_storage_textures(&mut self, first_slot: u32, textures: &[TextureId]);
    fn bind_compute_storage_buffers(&mut self, first_slot: u32, buffers: &[BufferId]);
    fn dispatch_compute(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);
    fn dispatch_compute_indirect(&mut self, buffer: BufferId, offset: u64);

    fn begin_copy_pass(&mut self) -> anyhow::Result<()>;
    fn end_copy_pass(&mut self);
    fn upload_to_buffer(
        &mut self,
        source: &TransferBufferLocation,
        destination: &BufferRegion,
        cycle: bool,
    ) -> anyhow::Result<()>;
    fn upload_to_texture(
        &mut self,
        source: &TextureTransferInfo,
        destination: &TextureRegion,
        cycle: bool,
    ) -> anyhow::Result<()>;
    fn download_from_buffer(
        &mut self,
        source: &BufferRegion,
        destination: &TransferBufferLocation,
    ) -> anyhow::Result<()>;
    fn download_from_texture(
        &mut self,
        source: &TextureRegion,
        destination: &TextureTransferInfo,
    ) -> anyhow::Result<()>;
    fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferRegion,
        destination: &BufferRegion,
    ) -> anyhow::Result<()>;
    fn copy_texture_to_texture(
        &mut self,
        source: &TextureRegion,
        destination: &TextureRegion,
    ) -> anyhow::Result<()>;
    fn generate_mipmaps(&mut self, texture: TextureId) -> anyhow::Result<()>;
    fn blit(&mut self, info: &BlitInfo) -> anyhow::Result<()>;

    // swapchain
    fn claim_window(
        &mut self,
        id: WindowId,
        window: &NativeWindow,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> anyhow::Result<()>;
    fn unclaim_window(&mut self, id: WindowId);
    fn set_swapchain_parameters(
        &mut self,
        id: WindowId,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> anyhow::Result<()>;
    fn swapchain_texture_format(&self, id: WindowId) -> TextureFormat;
    fn supports_present_mode(&self, id: WindowId, mode: PresentMode) -> bool;
    fn supports_swapchain_composition(&self, id: WindowId, composition: SwapchainComposition)
        -> bool;
    /// Enlists the window on the command buffer's present chain and returns
    /// the back buffer at the window's current frame counter.
    fn acquire_swapchain_texture(&mut self, id: WindowId) -> anyhow::Result<SwapchainTexture>;

    // submission & synchronization
    fn submit(&mut self) -> anyhow::Result<()>;
    fn submit_and_acquire_fence(&mut self) -> anyhow::Result<FenceId>;
    fn wait_idle(&mut self) -> anyhow::Result<()>;
    fn wait_for_fences(&mut self, fences: &[FenceId], wait_all: bool) -> anyhow::Result<()>;
    fn query_fence(&mut self, fence: FenceId) -> bool;
    fn release_fence(&mut self, fence: FenceId);

    // debug markers
    fn insert_debug_label(&mut self, text: &str);
    fn push_debug_group(&mut self, name: &str);
    fn pop_debug_group(&mut self);

    // capabilities
    fn supports_texture_format(
        &self,
        format: TextureFormat,
        ty: TextureType,
        usage: TextureUsage,
    ) -> bool;
    fn best_sample_count(&self, format: TextureFormat, desired: SampleCount) -> SampleCount;

    /// Device teardown; all child objects must already be released.
    fn destroy(&mut self);
}

/// One compiled-in driver in the registry, in priority order.
#[derive(Debug, Copy, Clone)]
pub struct DriverDescriptor {
    pub name: &'static str,
    pub kind: GpuDriverKind,
    pub shader_formats: ShaderFormat,
    /// Drivers may declare themselves implemented but unselected; such a
    /// driver is only chosen on an explicit name match.
    pub selectable_by_default: bool,
    /// Returns true only when the runtime environment can load the required
    /// libraries and create a minimal device.
    pub prepare: fn(&DisplayRequirements) -> bool,
    pub create: fn(&GpuConfig) -> anyhow::Result<Box<dyn GpuDriverInterface>>,
}
