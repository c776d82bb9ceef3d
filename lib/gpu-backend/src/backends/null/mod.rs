//! Headless driver. Every operation is accepted, all work completes
//! immediately, and transfer/buffer/texture bytes live host-side so upload
//! and download round-trips stay observable without a GPU.

use std::collections::{HashMap, HashSet};

use gpu_backend_traits::traits::{
    DriverDescriptor, GpuDriverInterface, MappedRegion, SwapchainTexture,
};
use gpu_backend_traits::window::{DisplayRequirements, NativeWindow};
use gpu_types::config::{GpuConfig, GpuDriverKind};
use gpu_types::formats::{IndexElementSize, SampleCount, TextureFormat};
use gpu_types::passes::{
    BlitInfo, BufferBinding, BufferRegion, ColorTargetInfo, DepthStencilTargetInfo, PresentMode,
    ScissorRect, SwapchainComposition, TextureRegion, TextureSamplerBinding, TextureTransferInfo,
    TransferBufferLocation, Viewport,
};
use gpu_types::resources::{
    BufferCreateInfo, BufferId, ComputePipelineCreateInfo, ComputePipelineId, FenceId,
    GraphicsPipelineCreateInfo, GraphicsPipelineId, SamplerCreateInfo, SamplerId,
    ShaderCreateInfo, ShaderFormat, ShaderId, ShaderStage, TextureCreateInfo, TextureId,
    TextureType, TextureUsage, TransferBufferCreateInfo, TransferBufferId, WindowId,
};

/// Swapchain texture ids are invented by the driver; keep them far away from
/// the front-end's counter so the two ranges can never collide.
const BACKEND_ID_BASE: u128 = 1 << 100;

const SWAPCHAIN_BUFFER_COUNT: usize = 2;

#[derive(Debug)]
struct NullTexture {
    info: TextureCreateInfo,
    /// Host shadow of mip 0 / layer 0.
    shadow: Vec<u8>,
}

#[derive(Debug)]
struct NullWindow {
    composition: SwapchainComposition,
    present_mode: PresentMode,
    width: u32,
    height: u32,
    frame_counter: usize,
    back_buffers: [TextureId; SWAPCHAIN_BUFFER_COUNT],
}

#[derive(Debug, Default)]
pub struct NullDriver {
    textures: HashMap<TextureId, NullTexture>,
    buffers: HashMap<BufferId, Vec<u8>>,
    transfer_buffers: HashMap<TransferBufferId, Vec<u8>>,
    samplers: HashSet<SamplerId>,
    shaders: HashSet<ShaderId>,
    graphics_pipelines: HashSet<GraphicsPipelineId>,
    compute_pipelines: HashSet<ComputePipelineId>,
    windows: HashMap<WindowId, NullWindow>,
    active_windows: Vec<WindowId>,
    fences: HashSet<FenceId>,
    next_backend_id: u128,
}

pub fn driver_descriptor() -> DriverDescriptor {
    DriverDescriptor {
        name: "null",
        kind: GpuDriverKind::Null,
        shader_formats: ShaderFormat::all(),
        selectable_by_default: true,
        prepare: |_display: &DisplayRequirements| true,
        create: |_config: &GpuConfig| {
            Ok(Box::new(NullDriver::default()) as Box<dyn GpuDriverInterface>)
        },
    }
}

impl NullDriver {
    fn alloc_backend_id(&mut self) -> u128 {
        self.next_backend_id += 1;
        BACKEND_ID_BASE + self.next_backend_id
    }

    fn shadow_size(info: &TextureCreateInfo) -> usize {
        info.format.texel_block_size() * info.width as usize * info.height as usize
    }
}

impl GpuDriverInterface for NullDriver {
    fn create_texture(&mut self, id: TextureId, info: &TextureCreateInfo) -> anyhow::Result<()> {
        self.textures.insert(
            id,
            NullTexture {
                info: *info,
                shadow: vec![0; Self::shadow_size(info)],
            },
        );
        Ok(())
    }

    fn release_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn set_texture_name(&mut self, _id: TextureId, _name: &str) {}

    fn create_buffer(&mut self, id: BufferId, info: &BufferCreateInfo) -> anyhow::Result<()> {
        self.buffers.insert(id, vec![0; info.size as usize]);
        Ok(())
    }

    fn release_buffer(&mut self, id: BufferId) {
        self.buffers.remove(&id);
    }

    fn set_buffer_name(&mut self, _id: BufferId, _name: &str) {}

    fn create_transfer_buffer(
        &mut self,
        id: TransferBufferId,
        info: &TransferBufferCreateInfo,
    ) -> anyhow::Result<()> {
        self.transfer_buffers.insert(id, vec![0; info.size as usize]);
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
        let storage = self
            .transfer_buffers
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown transfer buffer"))?;
        Ok(MappedRegion {
            ptr: storage.as_mut_ptr(),
            len: storage.len(),
        })
    }

    fn unmap_transfer_buffer(&mut self, _id: TransferBufferId) {}

    fn create_sampler(&mut self, id: SamplerId, _info: &SamplerCreateInfo) -> anyhow::Result<()> {
        self.samplers.insert(id);
        Ok(())
    }

    fn release_sampler(&mut self, id: SamplerId) {
        self.samplers.remove(&id);
    }

    fn create_shader(&mut self, id: ShaderId, _info: &ShaderCreateInfo) -> anyhow::Result<()> {
        self.shaders.insert(id);
        Ok(())
    }

    fn release_shader(&mut self, id: ShaderId) {
        self.shaders.remove(&id);
    }

    fn create_graphics_pipeline(
        &mut self,
        id: GraphicsPipelineId,
        _info: &GraphicsPipelineCreateInfo,
    ) -> anyhow::Result<()> {
        self.graphics_pipelines.insert(id);
        Ok(())
    }

    fn release_graphics_pipeline(&mut self, id: GraphicsPipelineId) {
        self.graphics_pipelines.remove(&id);
    }

    fn create_compute_pipeline(
        &mut self,
        id: ComputePipelineId,
        _info: &ComputePipelineCreateInfo,
    ) -> anyhow::Result<()> {
        self.compute_pipelines.insert(id);
        Ok(())
    }

    fn release_compute_pipeline(&mut self, id: ComputePipelineId) {
        self.compute_pipelines.remove(&id);
    }

    fn acquire_command_buffer(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        _color_targets: &[ColorTargetInfo],
        _depth_stencil_target: Option<&DepthStencilTargetInfo>,
        _extent: (u32, u32),
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn end_render_pass(&mut self) {}
    fn set_viewport(&mut self, _viewport: &Viewport) {}
    fn set_scissor(&mut self, _scissor: &ScissorRect) {}
    fn bind_graphics_pipeline(&mut self, _pipeline: GraphicsPipelineId) {}
    fn bind_vertex_buffers(&mut self, _first_slot: u32, _bindings: &[BufferBinding]) {}
    fn bind_index_buffer(&mut self, _binding: &BufferBinding, _size: IndexElementSize) {}
    fn bind_vertex_samplers(&mut self, _first_slot: u32, _bindings: &[TextureSamplerBinding]) {}
    fn bind_vertex_storage_textures(&mut self, _first_slot: u32, _textures: &[TextureId]) {}
    fn bind_vertex_storage_buffers(&mut self, _first_slot: u32, _buffers: &[BufferId]) {}
    fn bind_fragment_samplers(&mut self, _first_slot: u32, _bindings: &[TextureSamplerBinding]) {}
    fn bind_fragment_storage_textures(&mut self, _first_slot: u32, _textures: &[TextureId]) {}
    fn bind_fragment_storage_buffers(&mut self, _first_slot: u32, _buffers: &[BufferId]) {}
    fn push_uniform_data(&mut self, _stage: ShaderStage, _slot: u32, _data: &[u8]) {}

    fn draw_primitives(
        &mut self,
        _num_vertices: u32,
        _num_instances: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
    }

    fn draw_indexed_primitives(
        &mut self,
        _num_indices: u32,
        _num_instances: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
    }

    fn draw_primitives_indirect(&mut self, _buffer: BufferId, _offset: u64, _draw_count: u32) {}
    fn draw_indexed_primitives_indirect(
        &mut self,
        _buffer: BufferId,
        _offset: u64,
        _draw_count: u32,
    ) {
    }

    fn begin_compute_pass(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn end_compute_pass(&mut self) {}
    fn bind_compute_pipeline(&mut self, _pipeline: ComputePipelineId) {}
    fn bind_compute_storage_textures(&mut self, _first_slot: u32, _textures: &[TextureId]) {}
    fn bind_compute_storage_buffers(&mut self, _first_slot: u32, _buffers: &[BufferId]) {}
    fn dispatch_compute(&mut self, _x: u32, _y: u32, _z: u32) {}
    fn dispatch_compute_indirect(&mut self, _buffer: BufferId, _offset: u64) {}

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
        let src = self
            .transfer_buffers
            .get(&source.transfer_buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown transfer buffer"))?;
        let bytes =
            src[source.offset as usize..(source.offset + destination.size) as usize].to_vec();
        let dst = self
            .buffers
            .get_mut(&destination.buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown buffer"))?;
        dst[destination.offset as usize..(destination.offset + destination.size) as usize]
            .copy_from_slice(&bytes);
        Ok(())
    }

    fn upload_to_texture(
        &mut self,
        source: &TextureTransferInfo,
        destination: &TextureRegion,
        _cycle: bool,
    ) -> anyhow::Result<()> {
        let src = self
            .transfer_buffers
            .get(&source.transfer_buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown transfer buffer"))?
            .clone();
        let texture = self
            .textures
            .get_mut(&destination.texture)
            .ok_or_else(|| anyhow::anyhow!("unknown texture"))?;
        // the shadow only mirrors mip 0 / layer 0 of the base slice
        if destination.mip_level != 0 || destination.layer != 0 || destination.z != 0 {
            return Ok(());
        }
        let block = texture.info.format.texel_block_size();
        let src_pitch = if source.pixels_per_row == 0 {
            destination.width as usize * block
        } else {
            source.pixels_per_row as usize * block
        };
        let dst_pitch = texture.info.width as usize * block;
        for row in 0..destination.height as usize {
            let src_off = source.offset as usize + row * src_pitch;
            let dst_off =
                (destination.y as usize + row) * dst_pitch + destination.x as usize * block;
            let count = destination.width as usize * block;
            texture.shadow[dst_off..dst_off + count]
                .copy_from_slice(&src[src_off..src_off + count]);
        }
        Ok(())
    }

    fn download_from_buffer(
        &mut self,
        source: &BufferRegion,
        destination: &TransferBufferLocation,
    ) -> anyhow::Result<()> {
        let bytes = self
            .buffers
            .get(&source.buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown buffer"))?
            [source.offset as usize..(source.offset + source.size) as usize]
            .to_vec();
        let dst = self
            .transfer_buffers
            .get_mut(&destination.transfer_buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown transfer buffer"))?;
        dst[destination.offset as usize..destination.offset as usize + bytes.len()]
            .copy_from_slice(&bytes);
        Ok(())
    }

    fn download_from_texture(
        &mut self,
        source: &TextureRegion,
        destination: &TextureTransferInfo,
    ) -> anyhow::Result<()> {
        let texture = self
            .textures
            .get(&source.texture)
            .ok_or_else(|| anyhow::anyhow!("unknown texture"))?;
        if source.mip_level != 0 || source.layer != 0 || source.z != 0 {
            return Ok(());
        }
        let block = texture.info.format.texel_block_size();
        let src_pitch = texture.info.width as usize * block;
        let dst_pitch = if destination.pixels_per_row == 0 {
            source.width as usize * block
        } else {
            destination.pixels_per_row as usize * block
        };
        let mut rows = Vec::with_capacity(source.height as usize);
        for row in 0..source.height as usize {
            let src_off = (source.y as usize + row) * src_pitch + source.x as usize * block;
            rows.push(texture.shadow[src_off..src_off + source.width as usize * block].to_vec());
        }
        let dst = self
            .transfer_buffers
            .get_mut(&destination.transfer_buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown transfer buffer"))?;
        for (row, bytes) in rows.iter().enumerate() {
            let dst_off = destination.offset as usize + row * dst_pitch;
            dst[dst_off..dst_off + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferRegion,
        destination: &BufferRegion,
    ) -> anyhow::Result<()> {
        let bytes = self
            .buffers
            .get(&source.buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown buffer"))?
            [source.offset as usize..(source.offset + source.size) as usize]
            .to_vec();
        let dst = self
            .buffers
            .get_mut(&destination.buffer)
            .ok_or_else(|| anyhow::anyhow!("unknown buffer"))?;
        dst[destination.offset as usize..destination.offset as usize + bytes.len()]
            .copy_from_slice(&bytes);
        Ok(())
    }

    fn copy_texture_to_texture(
        &mut self,
        _source: &TextureRegion,
        _destination: &TextureRegion,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn generate_mipmaps(&mut self, _texture: TextureId) -> anyhow::Result<()> {
        Ok(())
    }

    fn blit(&mut self, _info: &BlitInfo) -> anyhow::Result<()> {
        Ok(())
    }

    fn claim_window(
        &mut self,
        id: WindowId,
        window: &NativeWindow,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> anyhow::Result<()> {
        let format = composition.texture_format();
        let mut back_buffers = [TextureId(0); SWAPCHAIN_BUFFER_COUNT];
        for slot in back_buffers.iter_mut() {
            let texture = TextureId(self.alloc_backend_id());
            let info = TextureCreateInfo {
                format,
                ty: TextureType::D2,
                width: window.width,
                height: window.height,
                depth: 1,
                layer_count: 1,
                level_count: 1,
                sample_count: SampleCount::S1,
                usage: TextureUsage::COLOR_TARGET,
            };
            self.textures.insert(
                texture,
                NullTexture {
                    shadow: vec![0; Self::shadow_size(&info)],
                    info,
                },
            );
            *slot = texture;
        }
        self.windows.insert(
            id,
            NullWindow {
                composition,
                present_mode,
                width: window.width,
                height: window.height,
                frame_counter: 0,
                back_buffers,
            },
        );
        Ok(())
    }

    fn unclaim_window(&mut self, id: WindowId) {
        if let Some(window) = self.windows.remove(&id) {
            for texture in window.back_buffers {
                self.textures.remove(&texture);
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
        let window = self
            .windows
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("window is not claimed"))?;
        window.composition = composition;
        window.present_mode = present_mode;
        Ok(())
    }

    fn swapchain_texture_format(&self, id: WindowId) -> TextureFormat {
        self.windows
            .get(&id)
            .map(|w| w.composition.texture_format())
            .unwrap_or_default()
    }

    fn supports_present_mode(&self, _id: WindowId, _mode: PresentMode) -> bool {
        true
    }

    fn supports_swapchain_composition(
        &self,
        _id: WindowId,
        _composition: SwapchainComposition,
    ) -> bool {
        true
    }

    fn acquire_swapchain_texture(&mut self, id: WindowId) -> anyhow::Result<SwapchainTexture> {
        let window = self
            .windows
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("window is not claimed"))?;
        if !self.active_windows.contains(&id) {
            self.active_windows.push(id);
        }
        Ok(SwapchainTexture {
            texture: window.back_buffers[window.frame_counter],
            format: window.composition.texture_format(),
            width: window.width,
            height: window.height,
        })
    }

    fn submit(&mut self) -> anyhow::Result<()> {
        let presented: Vec<WindowId> = self.active_windows.drain(..).collect();
        for id in presented {
            if let Some(window) = self.windows.get_mut(&id) {
                window.frame_counter = (window.frame_counter + 1) % SWAPCHAIN_BUFFER_COUNT;
            }
        }
        Ok(())
    }

    fn submit_and_acquire_fence(&mut self) -> anyhow::Result<FenceId> {
        self.submit()?;
        let fence = FenceId(self.alloc_backend_id());
        self.fences.insert(fence);
        Ok(fence)
    }

    fn wait_idle(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn wait_for_fences(&mut self, _fences: &[FenceId], _wait_all: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn query_fence(&mut self, fence: FenceId) -> bool {
        self.fences.contains(&fence)
    }

    fn release_fence(&mut self, fence: FenceId) {
        self.fences.remove(&fence);
    }

    fn insert_debug_label(&mut self, _text: &str) {}
    fn push_debug_group(&mut self, _name: &str) {}
    fn pop_debug_group(&mut self) {}

    fn supports_texture_format(
        &self,
        format: TextureFormat,
        _ty: TextureType,
        usage: TextureUsage,
    ) -> bool {
        if format == TextureFormat::Invalid {
            return false;
        }
        if usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
            return format.is_depth_stencil();
        }
        true
    }

    fn best_sample_count(&self, _format: TextureFormat, desired: SampleCount) -> SampleCount {
        desired
    }

    fn destroy(&mut self) {}
}
